//! Non-blocking UDP socket that can sit in a [`WaitSet`](crate::wait::WaitSet).

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::os::fd::{AsFd, BorrowedFd};

use mio::net::UdpSocket as MioUdpSocket;

use crate::wait::{Waitable, WaitableState};

/// A non-blocking UDP socket.
///
/// Plain sends and receives return `WouldBlock` when the socket is not ready;
/// the `try_` variants turn that into `Ok(None)`. Register the socket with a
/// wait set for READ and/or WRITE to block until it is.
pub struct UdpSocket {
    inner: MioUdpSocket,
    waitable: WaitableState,
}

impl UdpSocket {
    /// Binds a socket to `addr`. Port 0 lets the OS pick.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound (e.g., address in use).
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Ok(Self {
            inner: MioUdpSocket::bind(addr)?,
            waitable: WaitableState::new(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Sends a datagram to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the socket would block.
    pub fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, dest)
    }

    /// Receives one datagram.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if no datagram is queued.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf)
    }

    /// Like [`send_to`](Self::send_to), with `Ok(None)` for `WouldBlock`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error other than `WouldBlock`.
    pub fn try_send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<Option<usize>> {
        match self.send_to(buf, dest) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                self.clear_can_write();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`recv_from`](Self::recv_from), with `Ok(None)` for `WouldBlock`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error other than `WouldBlock`.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                // Drained; the next wait re-reports readiness.
                self.clear_can_read();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl AsFd for UdpSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl Waitable for UdpSocket {
    fn wait_handle(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }

    fn waitable_state(&self) -> &WaitableState {
        &self.waitable
    }
}
