//! TCP listener bound to the fiber scheduler

use crate::error::{NetError, NetResult};
use crate::socket::{addr_from_sockaddr, errno, new_tcp_fd, sockaddr_v4, TcpSocket};
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use strand_runtime::{scheduler, Interest};

pub struct TcpListener {
    fd: RawFd,
}

impl TcpListener {
    /// Bind and listen on `addr` (IPv4 only), SO_REUSEADDR set.
    pub fn bind(addr: SocketAddr) -> NetResult<Self> {
        let SocketAddr::V4(v4) = addr else {
            return Err(NetError::Sys(libc::EAFNOSUPPORT));
        };
        let fd = new_tcp_fd()?;

        let opt: i32 = 1;
        unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &opt as *const _ as *const libc::c_void,
                std::mem::size_of::<i32>() as libc::socklen_t,
            );
        }

        let sa = sockaddr_v4(v4);
        let ret = unsafe {
            libc::bind(
                fd,
                &sa as *const _ as *const libc::sockaddr,
                std::mem::size_of_val(&sa) as libc::socklen_t,
            )
        };
        if ret != 0 {
            let e = errno();
            unsafe { libc::close(fd) };
            return Err(NetError::Sys(e));
        }

        if unsafe { libc::listen(fd, 1024) } != 0 {
            let e = errno();
            unsafe { libc::close(fd) };
            return Err(NetError::Sys(e));
        }

        Ok(Self { fd })
    }

    /// The bound address; resolves ephemeral ports.
    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockname(self.fd, &mut sa as *mut _ as *mut libc::sockaddr, &mut len)
        };
        if ret != 0 {
            return Err(NetError::Sys(errno()));
        }
        Ok(addr_from_sockaddr(&sa))
    }

    /// Accept one connection, parking the fiber until a client arrives.
    pub fn accept(&self) -> NetResult<TcpSocket> {
        loop {
            let client = unsafe {
                libc::accept4(
                    self.fd,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                )
            };
            if client >= 0 {
                let sock = TcpSocket::from_raw(client)?;
                sock.set_nodelay();
                return Ok(sock);
            }
            match errno() {
                libc::EAGAIN => {
                    scheduler::park_fd(self.fd, Interest::Readable, None)?;
                }
                libc::EINTR | libc::ECONNABORTED => {}
                e => return Err(NetError::Sys(e)),
            }
        }
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

unsafe impl Send for TcpListener {}
unsafe impl Sync for TcpListener {}
