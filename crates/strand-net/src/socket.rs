//! Non-blocking TCP sockets bound to the fiber scheduler
//!
//! Every would-block point parks the calling fiber on the socket's
//! readiness through `scheduler::park_fd`. A socket is owned by the
//! fiber handling it; concurrent reads or writes from two fibers on
//! one socket are not supported.

use crate::error::{NetError, NetResult};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};
use strand_core::WakeCause;
use strand_runtime::{scheduler, Interest};

pub struct TcpSocket {
    fd: RawFd,
}

pub(crate) fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

pub(crate) fn sockaddr_v4(addr: SocketAddrV4) -> libc::sockaddr_in {
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    sa.sin_family = libc::AF_INET as u16;
    sa.sin_port = addr.port().to_be();
    sa.sin_addr.s_addr = u32::from_ne_bytes(addr.ip().octets());
    sa
}

pub(crate) fn addr_from_sockaddr(sa: &libc::sockaddr_in) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(
        Ipv4Addr::from(sa.sin_addr.s_addr.to_ne_bytes()),
        u16::from_be(sa.sin_port),
    ))
}

pub(crate) fn new_tcp_fd() -> NetResult<RawFd> {
    let fd = unsafe {
        libc::socket(
            libc::AF_INET,
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            0,
        )
    };
    if fd < 0 {
        return Err(NetError::Sys(errno()));
    }
    Ok(fd)
}

impl TcpSocket {
    /// Adopt an fd, forcing it non-blocking.
    pub fn from_raw(fd: RawFd) -> NetResult<Self> {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(NetError::Sys(errno()));
        }
        if flags & libc::O_NONBLOCK == 0
            && unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0
        {
            return Err(NetError::Sys(errno()));
        }
        Ok(Self { fd })
    }

    /// Connect to `addr`, parking the fiber until the handshake
    /// finishes or `timeout` passes. IPv4 only.
    pub fn connect(addr: SocketAddr, timeout: Option<Duration>) -> NetResult<Self> {
        let SocketAddr::V4(v4) = addr else {
            return Err(NetError::Sys(libc::EAFNOSUPPORT));
        };
        let fd = new_tcp_fd()?;
        let sock = Self { fd };
        sock.set_nodelay();

        let sa = sockaddr_v4(v4);
        let ret = unsafe {
            libc::connect(
                fd,
                &sa as *const _ as *const libc::sockaddr,
                std::mem::size_of_val(&sa) as libc::socklen_t,
            )
        };
        if ret == 0 {
            return Ok(sock);
        }
        if errno() != libc::EINPROGRESS {
            return Err(NetError::Sys(errno()));
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        match scheduler::park_fd(fd, Interest::Writable, deadline)? {
            WakeCause::Deadline => return Err(NetError::Timeout),
            _ => {}
        }

        let mut err: i32 = 0;
        let mut len = std::mem::size_of::<i32>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut err as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if ret != 0 {
            return Err(NetError::Sys(errno()));
        }
        if err != 0 {
            return Err(NetError::Sys(err));
        }
        Ok(sock)
    }

    /// Connected socket pair (both non-blocking). Test plumbing.
    pub fn pair() -> NetResult<(Self, Self)> {
        let mut fds = [0i32; 2];
        let ret = unsafe {
            libc::socketpair(
                libc::AF_UNIX,
                libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
                fds.as_mut_ptr(),
            )
        };
        if ret != 0 {
            return Err(NetError::Sys(errno()));
        }
        Ok((Self { fd: fds[0] }, Self { fd: fds[1] }))
    }

    pub(crate) fn set_nodelay(&self) {
        let opt: i32 = 1;
        unsafe {
            libc::setsockopt(
                self.fd,
                libc::IPPROTO_TCP,
                libc::TCP_NODELAY,
                &opt as *const _ as *const libc::c_void,
                std::mem::size_of::<i32>() as libc::socklen_t,
            );
        }
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Receive up to `buf.len()` bytes, parking the fiber until data
    /// arrives, the peer closes, or `timeout` passes. Never returns
    /// `Ok(0)`: peer close is `Err(PeerClosed)` and a deadline is
    /// `Err(Timeout)`, which the caller may retry.
    pub fn recv_timeout(&self, buf: &mut [u8], timeout: Option<Duration>) -> NetResult<usize> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let n = unsafe {
                libc::recv(
                    self.fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                )
            };
            if n > 0 {
                return Ok(n as usize);
            }
            if n == 0 {
                return Err(NetError::PeerClosed);
            }
            match errno() {
                libc::EAGAIN => match scheduler::park_fd(self.fd, Interest::Readable, deadline)? {
                    WakeCause::Deadline => return Err(NetError::Timeout),
                    _ => continue,
                },
                libc::EINTR => continue,
                libc::ECONNRESET => return Err(NetError::PeerClosed),
                e => return Err(NetError::Sys(e)),
            }
        }
    }

    /// Send the whole buffer, parking on writability as needed.
    pub fn send_all(&self, mut buf: &[u8]) -> NetResult<()> {
        while !buf.is_empty() {
            let n = unsafe {
                libc::send(
                    self.fd,
                    buf.as_ptr() as *const libc::c_void,
                    buf.len(),
                    libc::MSG_NOSIGNAL,
                )
            };
            if n > 0 {
                buf = &buf[n as usize..];
                continue;
            }
            match errno() {
                libc::EAGAIN => {
                    scheduler::park_fd(self.fd, Interest::Writable, None)?;
                }
                libc::EINTR => {}
                libc::EPIPE | libc::ECONNRESET => return Err(NetError::PeerClosed),
                e => return Err(NetError::Sys(e)),
            }
        }
        Ok(())
    }

    /// Half-close the write side.
    pub fn shutdown_write(&self) {
        unsafe { libc::shutdown(self.fd, libc::SHUT_WR) };
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

impl std::fmt::Debug for TcpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSocket").field("fd", &self.fd).finish()
    }
}

// Safety: the fd is valid until drop; the scheduler contract forbids
// concurrent use from two fibers, matching &self methods used from one
// handling fiber at a time.
unsafe impl Send for TcpSocket {}
unsafe impl Sync for TcpSocket {}
