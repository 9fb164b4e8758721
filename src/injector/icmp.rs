//! ICMPv4 raw-socket injector. Interface binding is optional: when no
//! interface is supplied the kernel routes the send by destination
//! address alone.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::error;

use crate::error::InjectorError;
use crate::injector::{bind_to_device, Injector};

const NO_SOCKET: RawFd = -1;

pub struct IcmpInjector {
    interface: Option<String>,
    fd: RawFd,
    initialized: AtomicBool,
}

impl IcmpInjector {
    pub fn new(interface: Option<String>) -> Self {
        Self { interface, fd: NO_SOCKET, initialized: AtomicBool::new(false) }
    }

    pub fn send(&self, destination: &str, payload: &[u8]) -> Result<usize, InjectorError> {
        if !self.is_initialized() {
            return Err(InjectorError::NotInitialized);
        }

        let addr = parse_ipv4(destination).ok_or_else(|| InjectorError::InvalidAddress(destination.into()))?;

        let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        sin.sin_family = libc::AF_INET as u16;
        sin.sin_addr.s_addr = u32::from_ne_bytes(addr.octets());

        let sa = &sin as *const libc::sockaddr_in as *const libc::sockaddr;
        let n = unsafe {
            libc::sendto(
                self.fd,
                payload.as_ptr() as *const libc::c_void,
                payload.len(),
                0,
                sa,
                std::mem::size_of::<libc::sockaddr_in>() as u32,
            )
        };
        if n < 0 {
            let source = io::Error::last_os_error();
            error!(%source, %destination, "icmp injector sendto failed");
            return Err(InjectorError::Send(source));
        }
        Ok(n as usize)
    }
}

fn parse_ipv4(text: &str) -> Option<std::net::Ipv4Addr> {
    text.parse().ok()
}

impl Injector for IcmpInjector {
    fn initialize(&mut self) -> Result<(), InjectorError> {
        if self.is_initialized() {
            return Err(InjectorError::AlreadyInitialized);
        }

        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_ICMP) };
        if fd == -1 {
            return Err(InjectorError::SocketCreate(io::Error::last_os_error()));
        }

        if let Some(iface) = self.interface.as_deref().filter(|s| !s.is_empty()) {
            if let Err(source) = bind_to_device(fd, iface) {
                unsafe { libc::close(fd) };
                return Err(InjectorError::Bind { iface: iface.to_string(), source });
            }
        }

        self.fd = fd;
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

impl Drop for IcmpInjector {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_initialize_rejected() {
        let injector = IcmpInjector::new(None);
        assert!(matches!(injector.send("127.0.0.1", &[8, 0, 0, 0]), Err(InjectorError::NotInitialized)));
    }

    #[test]
    fn test_double_initialize_rejected() {
        let mut injector = IcmpInjector::new(None);
        if injector.initialize().is_ok() {
            assert!(matches!(injector.initialize(), Err(InjectorError::AlreadyInitialized)));
        }
    }

    #[test]
    fn test_invalid_destination_rejected() {
        let mut injector = IcmpInjector::new(None);
        if injector.initialize().is_ok() {
            let result = injector.send("not-an-ip", &[8, 0, 0, 0]);
            assert!(matches!(result, Err(InjectorError::InvalidAddress(_))));
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut injector = IcmpInjector::new(None);
        injector.close();
        injector.close();
        assert!(!injector.is_initialized());
    }
}
