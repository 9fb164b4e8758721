//! ICMPv6 raw-socket injector. Unlike ICMPv4, an interface is mandatory
//! (IPv6 link-local/multicast destinations are meaningless without a
//! scope), and the destination's scope id is propagated accordingly.

use std::io;
use std::net::Ipv6Addr;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::error;

use crate::error::InjectorError;
use crate::injector::{bind_to_device, is_link_local_v6, is_multicast_v6, resolve_ifindex, Injector};

const NO_SOCKET: RawFd = -1;

pub struct Icmpv6Injector {
    interface: String,
    fd: RawFd,
    ifindex: i32,
    initialized: AtomicBool,
}

impl Icmpv6Injector {
    pub fn new(interface: impl Into<String>) -> Self {
        Self { interface: interface.into(), fd: NO_SOCKET, ifindex: 0, initialized: AtomicBool::new(false) }
    }

    pub fn send(&self, destination: &str, payload: &[u8]) -> Result<usize, InjectorError> {
        if !self.is_initialized() {
            return Err(InjectorError::NotInitialized);
        }
        send_v6(self.fd, self.ifindex, destination, payload)
    }
}

pub(crate) fn send_v6(fd: RawFd, ifindex: i32, destination: &str, payload: &[u8]) -> Result<usize, InjectorError> {
    let addr: Ipv6Addr = destination
        .parse()
        .map_err(|_| InjectorError::InvalidAddress(destination.into()))?;

    let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
    sin6.sin6_family = libc::AF_INET6 as u16;
    sin6.sin6_addr.s6_addr = addr.octets();
    sin6.sin6_scope_id = if is_link_local_v6(destination) || is_multicast_v6(destination) {
        ifindex as u32
    } else {
        0
    };

    let sa = &sin6 as *const libc::sockaddr_in6 as *const libc::sockaddr;
    let n = unsafe {
        libc::sendto(
            fd,
            payload.as_ptr() as *const libc::c_void,
            payload.len(),
            0,
            sa,
            std::mem::size_of::<libc::sockaddr_in6>() as u32,
        )
    };
    if n < 0 {
        let source = io::Error::last_os_error();
        error!(%source, %destination, "icmpv6 injector sendto failed");
        return Err(InjectorError::Send(source));
    }
    Ok(n as usize)
}

impl Injector for Icmpv6Injector {
    fn initialize(&mut self) -> Result<(), InjectorError> {
        if self.is_initialized() {
            return Err(InjectorError::AlreadyInitialized);
        }
        if self.interface.is_empty() {
            return Err(InjectorError::InterfaceRequired);
        }

        let ifindex = resolve_ifindex(&self.interface)
            .ok_or_else(|| InjectorError::InterfaceNotFound(self.interface.clone()))?;

        let fd = unsafe { libc::socket(libc::AF_INET6, libc::SOCK_RAW, libc::IPPROTO_ICMPV6) };
        if fd == -1 {
            return Err(InjectorError::SocketCreate(io::Error::last_os_error()));
        }

        if let Err(source) = bind_to_device(fd, &self.interface) {
            unsafe { libc::close(fd) };
            return Err(InjectorError::Bind { iface: self.interface.clone(), source });
        }

        self.fd = fd;
        self.ifindex = ifindex;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&mut self) {
        if self.fd != NO_SOCKET {
            unsafe {
                libc::shutdown(self.fd, libc::SHUT_RDWR);
                libc::close(self.fd);
            }
            self.fd = NO_SOCKET;
        }
        self.initialized.store(false, Ordering::Release);
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

impl Drop for Icmpv6Injector {
    fn drop(&mut self) {
        self.close();
    }
}
