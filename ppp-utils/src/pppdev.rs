//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

//! Access to the kernel PPP multiplexor (`/dev/ppp`).
//!
//! Every descriptor handed out by this module is close-on-exec and
//! nonblocking. The `testing` feature swaps the kernel device for a
//! deterministic in-memory mock.

use std::io;
#[cfg(feature = "testing")]
use std::collections::VecDeque;
use std::os::fd::{AsRawFd, BorrowedFd};
#[cfg(not(feature = "testing"))]
use std::os::fd::{OwnedFd, RawFd};
#[cfg(feature = "testing")]
use std::sync::Mutex;
#[cfg(feature = "testing")]
use std::sync::atomic::{AtomicI32, Ordering};

#[cfg(not(feature = "testing"))]
use tokio::io::unix::AsyncFd;

/// Maximum receive unit: upper bound on a single PPP frame.
pub const PPP_MRU: usize = 1500;

#[cfg(not(feature = "testing"))]
const PPP_DEV: &str = "/dev/ppp";

// Ioctl requests from <linux/ppp-ioctl.h>.
#[cfg(not(feature = "testing"))]
mod ioctl {
    use nix::{ioctl_read, ioctl_readwrite, ioctl_write_ptr};

    ioctl_read!(get_chan_index, b't', 55, libc::c_int); // PPPIOCGCHAN
    ioctl_write_ptr!(attach_chan, b't', 56, libc::c_int); // PPPIOCATTCHAN
    ioctl_write_ptr!(connect_chan, b't', 58, libc::c_int); // PPPIOCCONNECT
    ioctl_readwrite!(new_unit, b't', 62, libc::c_int); // PPPIOCNEWUNIT
}

/// An open descriptor on the kernel PPP multiplexor, registered with the
/// async reactor for read readiness.
#[cfg(not(feature = "testing"))]
#[derive(Debug)]
pub struct PppFd {
    fd: AsyncFd<OwnedFd>,
}

/// Mock multiplexor descriptor with scriptable reads and recorded writes.
#[cfg(feature = "testing")]
#[derive(Debug, Default)]
pub struct PppFd {
    rx: Mutex<VecDeque<RxEvent>>,
    tx: Mutex<Vec<Vec<u8>>>,
}

#[cfg(feature = "testing")]
#[derive(Debug)]
enum RxEvent {
    Frame(Vec<u8>),
    Eof,
}

#[cfg(feature = "testing")]
static NEXT_CHAN_IDX: AtomicI32 = AtomicI32::new(1);
#[cfg(feature = "testing")]
static NEXT_UNIT_IDX: AtomicI32 = AtomicI32::new(0);

// ===== impl PppFd =====

#[cfg(not(feature = "testing"))]
impl PppFd {
    /// Opens a fresh descriptor on the PPP multiplexor.
    pub fn open_mux() -> io::Result<PppFd> {
        use std::os::unix::fs::OpenOptionsExt;

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(PPP_DEV)?;
        let fd = AsyncFd::new(OwnedFd::from(file))?;

        Ok(PppFd { fd })
    }

    /// Turns this descriptor into the endpoint of the given PPP channel.
    pub fn attach_channel(&self, chan_idx: i32) -> io::Result<()> {
        let idx = chan_idx as libc::c_int;
        ioctl_result(unsafe { ioctl::attach_chan(self.as_raw_fd(), &idx) })?;
        Ok(())
    }

    /// Asks the kernel for a fresh PPP unit, returning its index.
    pub fn new_unit(&self) -> io::Result<i32> {
        let mut idx: libc::c_int = -1;
        ioctl_result(unsafe { ioctl::new_unit(self.as_raw_fd(), &mut idx) })?;
        Ok(idx)
    }

    /// Wires this channel descriptor to the given PPP unit.
    pub fn connect_unit(&self, unit_idx: i32) -> io::Result<()> {
        let idx = unit_idx as libc::c_int;
        ioctl_result(unsafe { ioctl::connect_chan(self.as_raw_fd(), &idx) })?;
        Ok(())
    }

    /// Reads a single PPP frame, without blocking.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::read(
                self.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    /// Writes a single PPP frame, without blocking.
    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::write(
                self.as_raw_fd(),
                data.as_ptr() as *const libc::c_void,
                data.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    /// Polls the descriptor for read readiness, clearing the cached readiness
    /// so the caller is expected to read until `WouldBlock`.
    pub fn poll_recv_ready(
        &self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.fd.poll_read_ready(cx) {
            std::task::Poll::Ready(Ok(mut guard)) => {
                guard.clear_ready();
                std::task::Poll::Ready(Ok(()))
            }
            std::task::Poll::Ready(Err(error)) => {
                std::task::Poll::Ready(Err(error))
            }
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

#[cfg(not(feature = "testing"))]
impl AsRawFd for PppFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

#[cfg(feature = "testing")]
impl PppFd {
    pub fn open_mux() -> io::Result<PppFd> {
        Ok(PppFd::default())
    }

    pub fn attach_channel(&self, _chan_idx: i32) -> io::Result<()> {
        Ok(())
    }

    pub fn new_unit(&self) -> io::Result<i32> {
        Ok(NEXT_UNIT_IDX.fetch_add(1, Ordering::SeqCst))
    }

    pub fn connect_unit(&self, _unit_idx: i32) -> io::Result<()> {
        Ok(())
    }

    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.lock().unwrap();
        match rx.pop_front() {
            Some(RxEvent::Frame(frame)) => {
                buf[..frame.len()].copy_from_slice(&frame);
                Ok(frame.len())
            }
            Some(RxEvent::Eof) => Ok(0),
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        self.tx.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    pub fn poll_recv_ready(
        &self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        if self.rx.lock().unwrap().is_empty() {
            std::task::Poll::Pending
        } else {
            std::task::Poll::Ready(Ok(()))
        }
    }

    /// Queues an inbound frame for the next `recv` call.
    pub fn push_frame(&self, frame: &[u8]) {
        self.rx.lock().unwrap().push_back(RxEvent::Frame(frame.to_vec()));
    }

    /// Queues an end-of-file condition for the next `recv` call.
    pub fn push_eof(&self) {
        self.rx.lock().unwrap().push_back(RxEvent::Eof);
    }

    /// Returns every frame written so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.tx.lock().unwrap().clone()
    }
}

// ===== global functions =====

/// Returns the PPP channel index behind a transport-provided descriptor.
#[cfg(not(feature = "testing"))]
pub fn channel_index(fd: BorrowedFd<'_>) -> io::Result<i32> {
    let mut idx: libc::c_int = 0;
    ioctl_result(unsafe { ioctl::get_chan_index(fd.as_raw_fd(), &mut idx) })?;
    Ok(idx)
}

#[cfg(feature = "testing")]
pub fn channel_index(_fd: BorrowedFd<'_>) -> io::Result<i32> {
    Ok(NEXT_CHAN_IDX.fetch_add(1, Ordering::SeqCst))
}

#[cfg(not(feature = "testing"))]
fn ioctl_result(result: nix::Result<libc::c_int>) -> io::Result<libc::c_int> {
    result.map_err(|errno| io::Error::from_raw_os_error(errno as i32))
}
