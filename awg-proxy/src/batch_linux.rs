//! Linux `recvmmsg`/`sendmmsg` batch backend. Amortizes syscall overhead
//! over up to [`BATCH`] datagrams per call; preallocated buffers are reused
//! across calls, matching the non-Linux fallback's per-message semantics
//! one-for-one so callers don't need to branch on behavior, only on which
//! function they call.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::RawFd;
use std::ptr::null_mut;

pub const BATCH: usize = 32;
/// Largest payload this backend will carry: the standard WG MTU headroom
/// plus the widest configured padding (`max(S1..S4)`), rounded up.
pub const PKT_CAP: usize = 2048;

/// Preallocated batch of receive buffers plus the per-message source
/// address captured by the kernel. Reused across `recv` calls.
pub struct RecvBatch {
    bufs: Vec<[u8; PKT_CAP]>,
    addrs: Vec<libc::sockaddr_in>,
    iovs: Vec<libc::iovec>,
    msgs: Vec<libc::mmsghdr>,
}

impl RecvBatch {
    pub fn new() -> Self {
        let mut bufs = vec![[0u8; PKT_CAP]; BATCH];
        let addrs = vec![unsafe { std::mem::zeroed::<libc::sockaddr_in>() }; BATCH];
        let mut iovs: Vec<libc::iovec> = bufs
            .iter_mut()
            .map(|b| libc::iovec { iov_base: b.as_mut_ptr() as *mut _, iov_len: PKT_CAP })
            .collect();
        let msgs: Vec<libc::mmsghdr> = (0..BATCH)
            .map(|i| libc::mmsghdr {
                msg_hdr: libc::msghdr {
                    msg_name: null_mut(),
                    msg_namelen: 0,
                    msg_iov: &mut iovs[i] as *mut _,
                    msg_iovlen: 1,
                    msg_control: null_mut(),
                    msg_controllen: 0,
                    msg_flags: 0,
                },
                msg_len: 0,
            })
            .collect();
        Self { bufs, addrs, iovs, msgs }
    }

    /// Receives without per-message source addresses (the connected remote
    /// socket never needs one).
    pub fn recv_connected(&mut self, fd: RawFd) -> io::Result<usize> {
        for (i, msg) in self.msgs.iter_mut().enumerate() {
            msg.msg_hdr.msg_name = null_mut();
            msg.msg_hdr.msg_namelen = 0;
            msg.msg_hdr.msg_iov = &mut self.iovs[i] as *mut _;
            self.iovs[i].iov_len = PKT_CAP;
        }
        self.call(fd)
    }

    /// Receives with per-message `sockaddr_in` capture (the unconnected
    /// listen socket, one client address per datagram).
    pub fn recv_with_addr(&mut self, fd: RawFd) -> io::Result<usize> {
        for (i, msg) in self.msgs.iter_mut().enumerate() {
            msg.msg_hdr.msg_name = &mut self.addrs[i] as *mut _ as *mut _;
            msg.msg_hdr.msg_namelen = std::mem::size_of::<libc::sockaddr_in>() as u32;
            msg.msg_hdr.msg_iov = &mut self.iovs[i] as *mut _;
            self.iovs[i].iov_len = PKT_CAP;
        }
        self.call(fd)
    }

    fn call(&mut self, fd: RawFd) -> io::Result<usize> {
        let n = unsafe {
            libc::recvmmsg(fd, self.msgs.as_mut_ptr(), BATCH as u32, 0, null_mut())
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    pub fn payload(&self, i: usize) -> &[u8] {
        let len = self.msgs[i].msg_len as usize;
        &self.bufs[i][..len]
    }

    /// Source address of message `i`, valid only after `recv_with_addr`.
    /// Panics (via the address family check) if the kernel returned
    /// anything but `AF_INET`, which cannot happen on a `udp4` socket.
    pub fn source_addr(&self, i: usize) -> SocketAddr {
        let sin = &self.addrs[i];
        assert_eq!(sin.sin_family as i32, libc::AF_INET, "non-IPv4 address from udp4 socket");
        let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
        let port = u16::from_be(sin.sin_port);
        SocketAddr::V4(SocketAddrV4::new(ip, port))
    }
}

/// Sends a batch of payloads with no per-message destination address (the
/// connected remote socket). Returns the number of messages actually sent;
/// on a short write the caller must retry from that index.
pub fn sendmmsg_connected(fd: RawFd, payloads: &[&[u8]]) -> io::Result<usize> {
    let mut iovs: Vec<libc::iovec> = payloads
        .iter()
        .map(|p| libc::iovec { iov_base: p.as_ptr() as *mut _, iov_len: p.len() })
        .collect();
    let mut msgs: Vec<libc::mmsghdr> = (0..payloads.len())
        .map(|i| libc::mmsghdr {
            msg_hdr: libc::msghdr {
                msg_name: null_mut(),
                msg_namelen: 0,
                msg_iov: &mut iovs[i] as *mut _,
                msg_iovlen: 1,
                msg_control: null_mut(),
                msg_controllen: 0,
                msg_flags: 0,
            },
            msg_len: 0,
        })
        .collect();

    let n = unsafe { libc::sendmmsg(fd, msgs.as_mut_ptr(), msgs.len() as u32, 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// Sends a batch of payloads to the same destination (the single learned
/// client address).
pub fn sendmmsg_to(fd: RawFd, payloads: &[&[u8]], addr: SocketAddrV4) -> io::Result<usize> {
    let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = addr.port().to_be();
    sin.sin_addr.s_addr = u32::from(*addr.ip()).to_be();

    let mut iovs: Vec<libc::iovec> = payloads
        .iter()
        .map(|p| libc::iovec { iov_base: p.as_ptr() as *mut _, iov_len: p.len() })
        .collect();
    let mut msgs: Vec<libc::mmsghdr> = (0..payloads.len())
        .map(|i| libc::mmsghdr {
            msg_hdr: libc::msghdr {
                msg_name: &mut sin as *mut _ as *mut _,
                msg_namelen: std::mem::size_of::<libc::sockaddr_in>() as u32,
                msg_iov: &mut iovs[i] as *mut _,
                msg_iovlen: 1,
                msg_control: null_mut(),
                msg_controllen: 0,
                msg_flags: 0,
            },
            msg_len: 0,
        })
        .collect();

    let n = unsafe { libc::sendmmsg(fd, msgs.as_mut_ptr(), msgs.len() as u32, 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::os::unix::io::AsRawFd;

    // P7: recvmmsg on a udp4 socket always yields AF_INET, and the
    // sockaddr_in <-> SocketAddr conversion roundtrips.
    #[test]
    fn recvmmsg_roundtrips_source_address() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client_addr = client.local_addr().unwrap();
        client.send_to(b"hello", server.local_addr().unwrap()).unwrap();

        let mut batch = RecvBatch::new();
        let n = batch.recv_with_addr(server.as_raw_fd()).unwrap();
        assert!(n >= 1);
        assert_eq!(batch.payload(0), b"hello");
        assert_eq!(batch.source_addr(0), client_addr);
    }

    #[test]
    fn sendmmsg_to_delivers_all_payloads() {
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let dest = match receiver.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            _ => unreachable!(),
        };

        let payloads: Vec<&[u8]> = vec![b"one", b"two", b"three"];
        let sent = sendmmsg_to(sender.as_raw_fd(), &payloads, dest).unwrap();
        assert_eq!(sent, 3);

        let mut buf = [0u8; 16];
        let mut seen = Vec::new();
        for _ in 0..3 {
            let (n, _) = receiver.recv_from(&mut buf).unwrap();
            seen.push(buf[..n].to_vec());
        }
        assert!(seen.contains(&b"one".to_vec()));
        assert!(seen.contains(&b"two".to_vec()));
        assert!(seen.contains(&b"three".to_vec()));
    }
}
