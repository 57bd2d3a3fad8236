// rtnetlink payload decoding
//
// A payload is one datagram read from a NETLINK_ROUTE socket. It holds one or
// more netlink messages, each a header followed by a family-specific struct
// (rtmsg, ifinfomsg, ifaddrmsg) and a run of attributes. All fields are in
// host byte order.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::consts::*;
use crate::error::DecodeError;
use crate::events::NetworkEvent;
use crate::routes::RouteEntry;

const NLMSG_HDRLEN: usize = 16;
const RTMSG_LEN: usize = 12;
const IFINFOMSG_LEN: usize = 16;
const IFADDRMSG_LEN: usize = 8;
const RTATTR_HDRLEN: usize = 4;
const RTNEXTHOP_LEN: usize = 8;

const fn align(len: usize) -> usize {
    (len + 3) & !3
}

fn ne_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_ne_bytes([bytes[offset], bytes[offset + 1]])
}

fn ne_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn require(what: &'static str, bytes: &[u8], needed: usize) -> Result<(), DecodeError> {
    if bytes.len() < needed {
        return Err(DecodeError::Truncated {
            what,
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

/// Decode every message in a payload.
///
/// Either the whole payload decodes or nothing does, so a malformed datagram
/// never produces a partial batch.
pub fn decode_payload(payload: &[u8]) -> Result<Vec<NetworkEvent>, DecodeError> {
    let mut events = Vec::new();
    let mut offset = 0;

    while offset < payload.len() {
        let rest = &payload[offset..];
        require("netlink header", rest, NLMSG_HDRLEN)?;

        let length = ne_u32(rest, 0) as usize;
        if length < NLMSG_HDRLEN || length > rest.len() {
            return Err(DecodeError::InvalidLength { length, offset });
        }
        let message_type = ne_u16(rest, 4);
        let flags = ne_u16(rest, 6);
        let body = &rest[NLMSG_HDRLEN..length];

        if let Some(event) = decode_message(message_type, flags, body)? {
            events.push(event);
        }

        offset += align(length).min(rest.len());
    }

    Ok(events)
}

fn decode_message(
    message_type: u16,
    flags: u16,
    body: &[u8],
) -> Result<Option<NetworkEvent>, DecodeError> {
    match message_type {
        NLMSG_NOOP | NLMSG_DONE => Ok(None),
        NLMSG_ERROR => {
            require("error message", body, 4)?;
            match ne_u32(body, 0) as i32 {
                0 => Ok(None), // ack
                code => Err(DecodeError::Kernel(code)),
            }
        }
        NLMSG_OVERRUN => Err(DecodeError::Overrun),
        RTM_NEWROUTE => Ok(decode_route(body)?.map(|route| {
            if flags & NLM_F_REPLACE != 0 {
                NetworkEvent::RouteChanged(route)
            } else {
                NetworkEvent::RouteAdded(route)
            }
        })),
        RTM_DELROUTE => Ok(decode_route(body)?.map(NetworkEvent::RouteDeleted)),
        RTM_NEWLINK | RTM_DELLINK => {
            let (interface_index, name) = decode_link(body)?;
            Ok(Some(if message_type == RTM_NEWLINK {
                NetworkEvent::LinkAdded {
                    interface_index,
                    name,
                }
            } else {
                NetworkEvent::LinkDeleted {
                    interface_index,
                    name,
                }
            }))
        }
        RTM_NEWADDR | RTM_DELADDR => Ok(decode_address(body)?.map(|(interface_index, address)| {
            if message_type == RTM_NEWADDR {
                NetworkEvent::AddressAdded {
                    interface_index,
                    address,
                }
            } else {
                NetworkEvent::AddressDeleted {
                    interface_index,
                    address,
                }
            }
        })),
        other => {
            tracing::trace!("Skipping netlink message type {}", other);
            Ok(None)
        }
    }
}

/// Route messages of non-IP families decode to `None`.
fn decode_route(body: &[u8]) -> Result<Option<RouteEntry>, DecodeError> {
    require("route message", body, RTMSG_LEN)?;
    let family = body[0];
    let dst_len = body[1];
    if family != AF_INET && family != AF_INET6 {
        return Ok(None);
    }

    let mut destination = None;
    let mut interface_index = None;
    let mut gateway = None;
    let mut metric = 0;
    let mut multipath = None;

    for attribute in Attributes::new(&body[align(RTMSG_LEN).min(body.len())..]) {
        let (kind, data) = attribute?;
        match kind {
            RTA_DST => destination = Some(ip_address("route destination", family, data)?),
            RTA_OIF => interface_index = Some(fixed_u32("route oif", data)?),
            RTA_GATEWAY => gateway = Some(ip_address("route gateway", family, data)?),
            RTA_PRIORITY => metric = fixed_u32("route priority", data)?,
            RTA_MULTIPATH => multipath = first_nexthop(family, data)?,
            _ => {}
        }
    }

    if interface_index.is_none() {
        if let Some((nexthop_index, nexthop_gateway)) = multipath {
            interface_index = Some(nexthop_index);
            gateway = gateway.or(nexthop_gateway);
        }
    }

    Ok(Some(RouteEntry {
        destination: render_destination(family, destination, dst_len),
        interface_index,
        gateway,
        metric,
    }))
}

/// Interface index and gateway of the first entry in an `RTA_MULTIPATH` list.
fn first_nexthop(family: u8, data: &[u8]) -> Result<Option<(u32, Option<IpAddr>)>, DecodeError> {
    if data.is_empty() {
        return Ok(None);
    }
    require("route nexthop", data, RTNEXTHOP_LEN)?;

    let length = ne_u16(data, 0) as usize;
    if length < RTNEXTHOP_LEN || length > data.len() {
        return Err(DecodeError::InvalidAttribute {
            what: "route nexthop",
            length,
        });
    }
    let interface_index = ne_u32(data, 4);

    let mut gateway = None;
    for attribute in Attributes::new(&data[RTNEXTHOP_LEN..length]) {
        let (kind, value) = attribute?;
        if kind == RTA_GATEWAY {
            gateway = Some(ip_address("nexthop gateway", family, value)?);
        }
    }

    Ok(Some((interface_index, gateway)))
}

fn decode_link(body: &[u8]) -> Result<(u32, Option<String>), DecodeError> {
    require("link message", body, IFINFOMSG_LEN)?;
    let interface_index = ne_u32(body, 4);

    let mut name = None;
    for attribute in Attributes::new(&body[IFINFOMSG_LEN..]) {
        let (kind, data) = attribute?;
        if kind == IFLA_IFNAME {
            let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
            name = Some(String::from_utf8_lossy(&data[..end]).into_owned());
        }
    }

    Ok((interface_index, name))
}

/// Address messages without an address attribute, or of a non-IP family,
/// decode to `None`.
fn decode_address(body: &[u8]) -> Result<Option<(u32, IpAddr)>, DecodeError> {
    require("address message", body, IFADDRMSG_LEN)?;
    let family = body[0];
    let interface_index = ne_u32(body, 4);
    if family != AF_INET && family != AF_INET6 {
        return Ok(None);
    }

    let mut local = None;
    let mut address = None;
    for attribute in Attributes::new(&body[IFADDRMSG_LEN..]) {
        let (kind, data) = attribute?;
        match kind {
            IFA_LOCAL => local = Some(ip_address("local address", family, data)?),
            IFA_ADDRESS => address = Some(ip_address("interface address", family, data)?),
            _ => {}
        }
    }

    Ok(local.or(address).map(|addr| (interface_index, addr)))
}

fn fixed_u32(what: &'static str, data: &[u8]) -> Result<u32, DecodeError> {
    if data.len() != 4 {
        return Err(DecodeError::InvalidAttribute {
            what,
            length: data.len(),
        });
    }
    Ok(ne_u32(data, 0))
}

fn ip_address(what: &'static str, family: u8, data: &[u8]) -> Result<IpAddr, DecodeError> {
    match (family, data.len()) {
        (AF_INET, 4) => Ok(IpAddr::V4(Ipv4Addr::new(data[0], data[1], data[2], data[3]))),
        (AF_INET6, 16) => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(data);
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => Err(DecodeError::InvalidAttribute {
            what,
            length: data.len(),
        }),
    }
}

/// `addr/len`, or the bare address for host routes.
///
/// The rendered text is half of the cache key, so it must differ between
/// families: an IPv4 route without a destination attribute is `default`, an
/// IPv6 one is the unspecified address with its prefix (`::/0`).
fn render_destination(family: u8, destination: Option<IpAddr>, prefix_len: u8) -> String {
    let (unspecified, full_len) = if family == AF_INET6 {
        (IpAddr::V6(Ipv6Addr::UNSPECIFIED), 128)
    } else {
        (IpAddr::V4(Ipv4Addr::UNSPECIFIED), 32)
    };
    match destination {
        Some(addr) if prefix_len == full_len => addr.to_string(),
        Some(addr) => format!("{}/{}", addr, prefix_len),
        None if prefix_len == 0 && family == AF_INET => "default".to_string(),
        None => format!("{}/{}", unspecified, prefix_len),
    }
}

/// Iterator over the `rtattr` run at the end of a message.
struct Attributes<'a> {
    bytes: &'a [u8],
}

impl<'a> Attributes<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Attributes { bytes }
    }
}

impl<'a> Iterator for Attributes<'a> {
    type Item = Result<(u16, &'a [u8]), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.is_empty() {
            return None;
        }
        if let Err(e) = require("attribute header", self.bytes, RTATTR_HDRLEN) {
            self.bytes = &[];
            return Some(Err(e));
        }

        let length = ne_u16(self.bytes, 0) as usize;
        if length < RTATTR_HDRLEN || length > self.bytes.len() {
            self.bytes = &[];
            return Some(Err(DecodeError::InvalidAttribute {
                what: "rtattr",
                length,
            }));
        }
        let kind = ne_u16(self.bytes, 2) & NLA_TYPE_MASK;
        let data = &self.bytes[RTATTR_HDRLEN..length];

        self.bytes = &self.bytes[align(length).min(self.bytes.len())..];
        Some(Ok((kind, data)))
    }
}
