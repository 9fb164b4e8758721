//! Raw-socket packet injectors.
//!
//! Each injector variant opens its own raw socket and constructs the
//! destination address appropriate to its protocol. They share a small
//! set of address-parsing helpers but otherwise differ enough (required
//! vs. optional interface binding, scope-id handling, payload synthesis)
//! that each gets its own type rather than one parameterized struct.

pub mod basic;
pub mod icmp;
pub mod icmpv6;
pub mod ipv6_ns;
pub mod ipv6_rs;

use std::io;
use std::os::unix::io::RawFd;

use crate::error::InjectorError;

/// Capability shared by every raw-socket sender: initialize, send, and
/// tear down. `send` takes a caller-supplied payload for every variant
/// except Router Solicitation, whose payload is always self-synthesized
/// (see [`ipv6_rs::Ipv6RouterSolicitationInjector::send`]).
pub trait Injector {
    fn initialize(&mut self) -> Result<(), InjectorError>;
    fn close(&mut self);
    fn is_initialized(&self) -> bool;
}

pub(crate) fn resolve_ifindex(name: &str) -> Option<i32> {
    if name.is_empty() || name.len() >= libc::IFNAMSIZ {
        return None;
    }
    let mut buf = [0u8; libc::IFNAMSIZ];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    let idx = unsafe { libc::if_nametoindex(buf.as_ptr() as *const libc::c_char) };
    if idx == 0 {
        None
    } else {
        Some(idx as i32)
    }
}

pub(crate) fn bind_to_device(fd: RawFd, iface: &str) -> io::Result<()> {
    let cname = format!("{iface}\0");
    let res = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            cname.as_ptr() as *const libc::c_void,
            cname.len() as u32,
        )
    };
    if res == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Returns true when `addr` (lowercased) starts with the IPv6 link-local
/// prefix `fe80`.
pub(crate) fn is_link_local_v6(addr: &str) -> bool {
    addr.len() >= 4 && addr[..4].eq_ignore_ascii_case("fe80")
}

/// Returns true when `addr` (lowercased) starts with the IPv6 multicast
/// prefix `ff`.
pub(crate) fn is_multicast_v6(addr: &str) -> bool {
    addr.len() >= 2 && addr[..2].eq_ignore_ascii_case("ff")
}

/// Parses a MAC address tolerating `:` or `-` separators (or none),
/// stopping once six bytes have been read. Returns `None` on any
/// malformed hex pair.
pub(crate) fn parse_mac(mac: &str) -> Option<[u8; 6]> {
    let cleaned: String = mac.chars().filter(|c| *c != ':' && *c != '-').collect();
    if cleaned.len() < 12 {
        return None;
    }
    let mut out = [0u8; 6];
    for (i, slot) in out.iter_mut().enumerate() {
        let byte_str = cleaned.get(i * 2..i * 2 + 2)?;
        *slot = u8::from_str_radix(byte_str, 16).ok()?;
    }
    Some(out)
}

/// Reads the hardware (MAC) address of `iface` via `SIOCGIFHWADDR`.
pub(crate) fn hardware_address(iface: &str) -> io::Result<[u8; 6]> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }

    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    let name_bytes = iface.as_bytes();
    let len = name_bytes.len().min(ifr.ifr_name.len() - 1);
    for (dst, src) in ifr.ifr_name[..len].iter_mut().zip(name_bytes) {
        *dst = *src as libc::c_char;
    }

    let res = unsafe { libc::ioctl(fd, libc::SIOCGIFHWADDR, &mut ifr as *mut libc::ifreq) };
    unsafe { libc::close(fd) };
    if res == -1 {
        return Err(io::Error::last_os_error());
    }

    let sa_data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
    let mut mac = [0u8; 6];
    for (i, slot) in mac.iter_mut().enumerate() {
        *slot = sa_data[i] as u8;
    }
    Ok(mac)
}

pub(crate) fn mac_is_zero(mac: &[u8; 6]) -> bool {
    mac.iter().all(|b| *b == 0)
}
