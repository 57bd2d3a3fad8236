// Raw NETLINK_ROUTE socket registered with the tokio reactor

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;

use crate::error::SourceError;

pub struct NetlinkSocket {
    fd: AsyncFd<OwnedFd>,
}

impl NetlinkSocket {
    /// Open a non-blocking route socket joined to the `groups` multicast mask.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(groups: u32, socket_rcvbuf: Option<usize>) -> io::Result<Self> {
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                libc::NETLINK_ROUTE,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a freshly created descriptor nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        if let Some(size) = socket_rcvbuf {
            let size = libc::c_int::try_from(size).unwrap_or(libc::c_int::MAX);
            let ret = unsafe {
                libc::setsockopt(
                    fd.as_raw_fd(),
                    libc::SOL_SOCKET,
                    libc::SO_RCVBUF,
                    &size as *const libc::c_int as *const libc::c_void,
                    mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            };
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
        }

        // SAFETY: sockaddr_nl is plain old data; all-zero is a valid value.
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_groups = groups;
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(NetlinkSocket {
            fd: AsyncFd::new(fd)?,
        })
    }

    /// Wait until a datagram is available and read it into `buf`.
    ///
    /// Cancel safe: the only suspension point is the readiness wait, the read
    /// itself never yields. A datagram larger than `buf` is consumed and
    /// reported as `SourceError::Truncated`.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize, SourceError> {
        loop {
            let mut guard = self.fd.readable().await.map_err(SourceError::Wait)?;

            let result = guard.try_io(|inner| {
                let n = unsafe {
                    libc::recv(
                        inner.as_raw_fd(),
                        buf.as_mut_ptr() as *mut libc::c_void,
                        buf.len(),
                        libc::MSG_TRUNC,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match result {
                Ok(read) => return checked_length(read.map_err(SourceError::Receive)?, buf.len()),
                Err(_would_block) => continue,
            }
        }
    }
}

/// With `MSG_TRUNC` the kernel returns the full datagram length even when it
/// exceeds the buffer.
fn checked_length(length: usize, capacity: usize) -> Result<usize, SourceError> {
    if length > capacity {
        return Err(SourceError::Truncated { length, capacity });
    }
    Ok(length)
}
