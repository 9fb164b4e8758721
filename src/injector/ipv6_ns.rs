//! IPv6 Neighbor Solicitation injector.
//!
//! Address handling is identical to the plain ICMPv6 injector (required
//! interface, scope-id propagated for link-local/multicast targets); kept
//! as a distinct type since callers reason about Neighbor Solicitation as
//! its own protocol operation rather than "ICMPv6 with a particular
//! payload".

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::InjectorError;
use crate::injector::icmpv6::send_v6;
use crate::injector::{bind_to_device, resolve_ifindex, Injector};

const NO_SOCKET: RawFd = -1;

pub struct Ipv6NeighborSolicitationInjector {
    interface: String,
    fd: RawFd,
    ifindex: i32,
    initialized: AtomicBool,
}

impl Ipv6NeighborSolicitationInjector {
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

impl Injector for Ipv6NeighborSolicitationInjector {
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

impl Drop for Ipv6NeighborSolicitationInjector {
    fn drop(&mut self) {
        self.close();
    }
}
