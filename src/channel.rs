//! Datagram I/O: bind, send-to, receive-from-with-deadline.
//!
//! [`UdpChannel`] is the real implementation both binaries use. The `sim`
//! submodule provides an in-memory, fault-injecting implementation of the
//! same trait so the testable properties in the design doc (reliability
//! under loss/reorder/duplication, Reno transitions, handshake and
//! teardown termination) can be driven deterministically without a real
//! socket.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::err::{Error, RecvError};

/// Bind, send-to, receive-from-with-deadline — the one suspension point
/// of either engine's event loop.
pub trait DatagramChannel {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> Result<usize, Error>;

    /// Blocks for at most `deadline` (or forever, if `None`) waiting for a
    /// datagram. Yields `RecvError::Timeout` on expiry rather than an
    /// `Error`, so retransmission logic never has to distinguish "real
    /// failure" from "nothing arrived in time" through a generic `Error`.
    fn recv_from(&self, deadline: Option<Duration>) -> Result<(Vec<u8>, SocketAddr), RecvError>;
}

/// A `UdpSocket`-backed channel.
#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
}

impl UdpChannel {
    pub fn bind(port: u16) -> Result<Self, Error> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .map_err(|e| Error::BindFailed(port, e))?;
        Ok(UdpChannel { socket })
    }

    /// Binds an ephemeral local port and fixes the peer address, as the
    /// client does once it knows who the server is.
    pub fn connect(peer: impl ToSocketAddrs) -> Result<(Self, SocketAddr), Error> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|e| Error::BindFailed(0, e))?;
        let peer = peer
            .to_socket_addrs()
            .map_err(|e| Error::ResolveFailed("peer address".to_string(), e))?
            .next()
            .ok_or_else(|| {
                Error::ResolveFailed(
                    "peer address".to_string(),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"),
                )
            })?;
        Ok((UdpChannel { socket }, peer))
    }
}

impl DatagramChannel for UdpChannel {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> Result<usize, Error> {
        Ok(self.socket.send_to(buf, peer)?)
    }

    fn recv_from(&self, deadline: Option<Duration>) -> Result<(Vec<u8>, SocketAddr), RecvError> {
        self.socket.set_read_timeout(deadline)?;

        let mut buf = [0u8; 2048];
        match self.socket.recv_from(&mut buf) {
            Ok((n, peer)) => Ok((buf[..n].to_vec(), peer)),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Err(RecvError::Timeout)
            }
            Err(e) => Err(Error::from(e).into()),
        }
    }
}

impl From<std::io::Error> for RecvError {
    fn from(e: std::io::Error) -> Self {
        RecvError::Fatal(Error::SubstrateError(e))
    }
}

pub mod sim;
pub use sim::SimChannel;
