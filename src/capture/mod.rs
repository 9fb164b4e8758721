//! Raw `AF_PACKET` frame capture on a single interface.
//!
//! Modeled after the `mio-afpacket`/`poeschel-afpacket` style of talking to
//! `AF_PACKET` sockets directly through `libc`: no cross-platform socket
//! abstraction, because this is inherently a Linux-only mechanism.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{MAX_PACKET_SIZE, RECV_RETRY_SLEEP_US};
use crate::error::CaptureError;

/// Owns a raw socket bound to one network interface and drives a blocking
/// receive loop that hands each frame to a caller-supplied handler.
pub struct PacketCapture {
    interface: String,
    fd: AtomicI32,
    capturing: AtomicBool,
}

const NO_SOCKET: i32 = -1;

impl PacketCapture {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            fd: AtomicI32::new(NO_SOCKET),
            capturing: AtomicBool::new(false),
        }
    }

    /// Opens the raw socket and binds it to the configured interface.
    pub fn initialize(&self) -> Result<(), CaptureError> {
        if self.interface.is_empty() {
            return Err(CaptureError::EmptyInterface);
        }

        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, eth_p_all()) };
        if fd == -1 {
            let source = io::Error::last_os_error();
            error!(%source, "failed to create AF_PACKET socket (are you root / do you have CAP_NET_RAW?)");
            return Err(CaptureError::SocketCreate(source));
        }

        set_non_blocking(fd);

        let ifindex = match index_by_name(&self.interface) {
            Some(idx) => idx,
            None => {
                unsafe { libc::close(fd) };
                return Err(CaptureError::InterfaceNotFound(self.interface.clone()));
            }
        };

        if let Err(source) = bind_link_layer(fd, ifindex) {
            unsafe { libc::close(fd) };
            return Err(CaptureError::Bind { iface: self.interface.clone(), source });
        }

        self.fd.store(fd, Ordering::Release);
        info!(interface = %self.interface, "capture socket bound");
        Ok(())
    }

    /// Blocks the calling thread, invoking `handler` for every captured
    /// frame until [`Self::stop`] is called from another thread.
    pub fn start_capture(&self, mut handler: impl FnMut(&[u8])) {
        self.capturing.store(true, Ordering::Release);
        let mut buf = [0u8; MAX_PACKET_SIZE];

        loop {
            let fd = self.fd.load(Ordering::Acquire);
            if fd == NO_SOCKET {
                break;
            }

            let n = unsafe {
                libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
            };

            if n > 0 {
                handler(&buf[..n as usize]);
                continue;
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) => {
                    thread::sleep(Duration::from_micros(RECV_RETRY_SLEEP_US));
                }
                Some(libc::EBADF) | Some(libc::ENOTSOCK) => {
                    debug!("capture socket closed, ending capture loop");
                    break;
                }
                _ => {
                    warn!(%err, "capture recv failed");
                    break;
                }
            }
        }

        self.capturing.store(false, Ordering::Release);
    }

    /// Shuts down and closes the socket, unblocking a concurrent
    /// [`Self::start_capture`] call on another thread. Idempotent.
    pub fn stop(&self) {
        let fd = self.fd.swap(NO_SOCKET, Ordering::AcqRel);
        if fd != NO_SOCKET {
            unsafe {
                libc::shutdown(fd, libc::SHUT_RDWR);
                libc::close(fd);
            }
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }
}

impl Drop for PacketCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn eth_p_all() -> i32 {
    // ETH_P_ALL must be sent network-byte-order for the protocol field of
    // AF_PACKET sockets, matching what the kernel expects on the wire.
    i32::from((libc::ETH_P_ALL as u16).to_be())
}

fn set_non_blocking(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags != -1 {
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }
}

fn index_by_name(name: &str) -> Option<i32> {
    if name.len() >= libc::IFNAMSIZ {
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

fn bind_link_layer(fd: RawFd, ifindex: i32) -> io::Result<()> {
    unsafe {
        let mut storage: libc::sockaddr_storage = std::mem::zeroed();
        let sll: *mut libc::sockaddr_ll = &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_ll;
        (*sll).sll_family = libc::AF_PACKET as u16;
        (*sll).sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        (*sll).sll_ifindex = ifindex;

        let sa = &storage as *const libc::sockaddr_storage as *const libc::sockaddr;
        let res = libc::bind(fd, sa, std::mem::size_of::<libc::sockaddr_ll>() as u32);
        if res == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
