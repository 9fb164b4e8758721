//! Link-layer (`AF_PACKET`) injector: sends a caller-supplied frame
//! verbatim out a named interface.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::error;

use crate::error::InjectorError;
use crate::injector::{resolve_ifindex, Injector};

const NO_SOCKET: RawFd = -1;

pub struct BasicInjector {
    interface: String,
    fd: RawFd,
    ifindex: i32,
    initialized: AtomicBool,
}

impl BasicInjector {
    pub fn new(interface: impl Into<String>) -> Self {
        Self { interface: interface.into(), fd: NO_SOCKET, ifindex: 0, initialized: AtomicBool::new(false) }
    }

    pub fn send(&self, frame: &[u8]) -> Result<usize, InjectorError> {
        if !self.is_initialized() {
            return Err(InjectorError::NotInitialized);
        }

        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let sll: *mut libc::sockaddr_ll = &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_ll;
        unsafe {
            (*sll).sll_family = libc::AF_PACKET as u16;
            (*sll).sll_protocol = (libc::ETH_P_ALL as u16).to_be();
            (*sll).sll_ifindex = self.ifindex;
            (*sll).sll_halen = 6;
        }

        let sa = &storage as *const libc::sockaddr_storage as *const libc::sockaddr;
        let n = unsafe {
            libc::sendto(
                self.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
                sa,
                std::mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };
        if n < 0 {
            let source = io::Error::last_os_error();
            error!(%source, "basic injector sendto failed");
            return Err(InjectorError::Send(source));
        }
        Ok(n as usize)
    }
}

impl Injector for BasicInjector {
    fn initialize(&mut self) -> Result<(), InjectorError> {
        if self.is_initialized() {
            return Err(InjectorError::AlreadyInitialized);
        }
        if self.interface.is_empty() {
            return Err(InjectorError::InterfaceRequired);
        }

        let ifindex = resolve_ifindex(&self.interface)
            .ok_or_else(|| InjectorError::InterfaceNotFound(self.interface.clone()))?;

        let fd = unsafe {
            libc::socket(libc::AF_PACKET, libc::SOCK_RAW, i32::from((libc::ETH_P_ALL as u16).to_be()))
        };
        if fd == -1 {
            return Err(InjectorError::SocketCreate(io::Error::last_os_error()));
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

impl Drop for BasicInjector {
    fn drop(&mut self) {
        self.close();
    }
}
