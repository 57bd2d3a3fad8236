// Netlink module - rtnetlink event sources backed by kernel multicast groups

pub mod decode;
pub mod socket;

use crate::config::Config;
use crate::error::{DecodeError, MonitorError, SourceError};
use crate::events::{Category, EventSource, NetworkEvent, NetworkStateProvider};
use socket::NetlinkSocket;

/// Kernel ABI values from linux/netlink.h and linux/rtnetlink.h.
pub(crate) mod consts {
    pub const AF_INET: u8 = 2;
    pub const AF_INET6: u8 = 10;

    pub const NLMSG_NOOP: u16 = 1;
    pub const NLMSG_ERROR: u16 = 2;
    pub const NLMSG_DONE: u16 = 3;
    pub const NLMSG_OVERRUN: u16 = 4;

    pub const NLM_F_REPLACE: u16 = 0x100;

    pub const RTM_NEWLINK: u16 = 16;
    pub const RTM_DELLINK: u16 = 17;
    pub const RTM_NEWADDR: u16 = 20;
    pub const RTM_DELADDR: u16 = 21;
    pub const RTM_NEWROUTE: u16 = 24;
    pub const RTM_DELROUTE: u16 = 25;

    pub const NLA_TYPE_MASK: u16 = 0x3fff;

    pub const RTA_DST: u16 = 1;
    pub const RTA_OIF: u16 = 4;
    pub const RTA_GATEWAY: u16 = 5;
    pub const RTA_PRIORITY: u16 = 6;
    pub const RTA_MULTIPATH: u16 = 9;

    pub const IFLA_IFNAME: u16 = 3;

    pub const IFA_ADDRESS: u16 = 1;
    pub const IFA_LOCAL: u16 = 2;

    pub const RTMGRP_LINK: u32 = 0x1;
    pub const RTMGRP_IPV4_IFADDR: u32 = 0x10;
    pub const RTMGRP_IPV4_ROUTE: u32 = 0x40;
    pub const RTMGRP_IPV6_IFADDR: u32 = 0x100;
    pub const RTMGRP_IPV6_ROUTE: u32 = 0x400;
}

use consts::*;

pub const DEFAULT_RECV_BUFFER: usize = 32 * 1024;

/// Opens one route socket per category.
#[derive(Debug, Clone)]
pub struct NetlinkProvider {
    ipv6: bool,
    recv_buffer_bytes: usize,
    socket_rcvbuf: Option<usize>,
}

impl NetlinkProvider {
    pub fn new(config: &Config) -> Self {
        NetlinkProvider {
            ipv6: config.ipv6,
            recv_buffer_bytes: config.recv_buffer_bytes,
            socket_rcvbuf: config.socket_rcvbuf,
        }
    }

    /// Multicast group mask for a category.
    pub fn groups_for(&self, category: Category) -> u32 {
        match (category, self.ipv6) {
            (Category::Route, false) => RTMGRP_IPV4_ROUTE,
            (Category::Route, true) => RTMGRP_IPV4_ROUTE | RTMGRP_IPV6_ROUTE,
            (Category::Link, _) => RTMGRP_LINK,
            (Category::Address, false) => RTMGRP_IPV4_IFADDR,
            (Category::Address, true) => RTMGRP_IPV4_IFADDR | RTMGRP_IPV6_IFADDR,
        }
    }
}

impl NetworkStateProvider for NetlinkProvider {
    type Source = NetlinkSource;

    fn subscribe(&self, category: Category) -> Result<NetlinkSource, MonitorError> {
        let groups = self.groups_for(category);
        let socket = NetlinkSocket::bind(groups, self.socket_rcvbuf)
            .map_err(|source| MonitorError::Subscribe { category, source })?;

        tracing::info!("Subscribed to {} group(s) {:#x}", category, groups);

        Ok(NetlinkSource {
            category,
            socket,
            buffer: vec![0; self.recv_buffer_bytes.max(4096)],
        })
    }
}

pub struct NetlinkSource {
    category: Category,
    socket: NetlinkSocket,
    buffer: Vec<u8>,
}

impl EventSource for NetlinkSource {
    fn category(&self) -> Category {
        self.category
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        let len = self.socket.recv(&mut self.buffer).await?;
        Ok(Some(self.buffer[..len].to_vec()))
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<NetworkEvent>, DecodeError> {
        decode::decode_payload(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(ipv6: bool) -> NetlinkProvider {
        NetlinkProvider {
            ipv6,
            recv_buffer_bytes: DEFAULT_RECV_BUFFER,
            socket_rcvbuf: None,
        }
    }

    #[test]
    fn test_ipv4_groups() {
        let provider = provider(false);
        assert_eq!(provider.groups_for(Category::Route), 0x40);
        assert_eq!(provider.groups_for(Category::Link), 0x1);
        assert_eq!(provider.groups_for(Category::Address), 0x10);
    }

    #[test]
    fn test_ipv6_adds_groups() {
        let provider = provider(true);
        assert_eq!(provider.groups_for(Category::Route), 0x440);
        assert_eq!(provider.groups_for(Category::Link), 0x1);
        assert_eq!(provider.groups_for(Category::Address), 0x110);
    }
}
