//! IPv6 Router Solicitation injector.
//!
//! Unlike the other ICMPv6 variants, `send` takes no arguments: the
//! destination is always the all-routers multicast address `ff02::2`,
//! and the 16-byte payload is synthesized on every call from the
//! interface's own hardware address rather than supplied by the caller.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::InjectorError;
use crate::injector::icmpv6::send_v6;
use crate::injector::{bind_to_device, hardware_address, mac_is_zero, resolve_ifindex, Injector};

const NO_SOCKET: RawFd = -1;
const ALL_ROUTERS: &str = "ff02::2";

pub struct Ipv6RouterSolicitationInjector {
    interface: String,
    fd: RawFd,
    ifindex: i32,
    source_mac: [u8; 6],
    initialized: AtomicBool,
}

impl Ipv6RouterSolicitationInjector {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            fd: NO_SOCKET,
            ifindex: 0,
            source_mac: [0u8; 6],
            initialized: AtomicBool::new(false),
        }
    }

    /// Sends a Router Solicitation to `ff02::2`, synthesizing the payload
    /// from the interface's source MAC captured at `initialize` time.
    pub fn send(&self) -> Result<usize, InjectorError> {
        if !self.is_initialized() {
            return Err(InjectorError::NotInitialized);
        }
        let payload = router_solicitation_payload(&self.source_mac);
        send_v6(self.fd, self.ifindex, ALL_ROUTERS, &payload)
    }
}

/// Builds the 16-byte Router Solicitation payload: ICMPv6 type 133, code
/// 0, a zeroed checksum (left for the kernel to fill), 4 reserved bytes,
/// and a source-link-layer-address option carrying `mac`.
pub(crate) fn router_solicitation_payload(mac: &[u8; 6]) -> [u8; 16] {
    let mut payload = [0u8; 16];
    payload[0] = 133; // type: router solicitation
    payload[1] = 0; // code
    // payload[2..4] checksum, payload[4..8] reserved: left zeroed
    payload[8] = 1; // option type: source link-layer address
    payload[9] = 1; // option length, in 8-byte units
    payload[10..16].copy_from_slice(mac);
    payload
}

impl Injector for Ipv6RouterSolicitationInjector {
    fn initialize(&mut self) -> Result<(), InjectorError> {
        if self.is_initialized() {
            return Err(InjectorError::AlreadyInitialized);
        }
        if self.interface.is_empty() {
            return Err(InjectorError::InterfaceRequired);
        }

        let ifindex = resolve_ifindex(&self.interface)
            .ok_or_else(|| InjectorError::InterfaceNotFound(self.interface.clone()))?;
        if ifindex == 0 {
            return Err(InjectorError::InterfaceNotFound(self.interface.clone()));
        }

        let mac = hardware_address(&self.interface)
            .map_err(|_| InjectorError::NoHardwareAddress(self.interface.clone()))?;
        if mac_is_zero(&mac) {
            return Err(InjectorError::NoHardwareAddress(self.interface.clone()));
        }

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
        self.source_mac = mac;
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

impl Drop for Ipv6RouterSolicitationInjector {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_solicitation_payload_layout() {
        let mac = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
        let payload = router_solicitation_payload(&mac);
        assert_eq!(
            payload,
            [0x85, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]
        );
    }

    #[test]
    fn test_empty_interface_rejected() {
        let mut injector = Ipv6RouterSolicitationInjector::new("");
        assert!(matches!(injector.initialize(), Err(InjectorError::InterfaceRequired)));
    }

    #[test]
    fn test_send_before_initialize_rejected() {
        let injector = Ipv6RouterSolicitationInjector::new("lo");
        assert!(matches!(injector.send(), Err(InjectorError::NotInitialized)));
    }
}
