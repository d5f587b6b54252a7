//! A reliable single-file transfer protocol over an unreliable datagram
//! substrate: a three-way handshake carries the filename, a sliding send
//! window with Reno congestion control moves the bytes, an out-of-order
//! receive buffer reassembles them, and a four-way close tears the
//! connection back down.
//!
//! [`DatagramChannel`] is the one seam between the engines in this crate
//! and the network: [`UdpChannel`] for the real binaries, [`SimChannel`]
//! for this crate's own deterministic fault-injection tests.

pub mod channel;
pub mod config;
pub mod congestion;
pub mod err;
pub mod handshake;
pub mod packet;
pub mod receiver;
pub mod recvbuf;
pub mod seq;
pub mod sender;
pub mod teardown;
pub mod telemetry;
pub mod window;

pub use channel::{DatagramChannel, UdpChannel};
pub use config::Config;
pub use err::{Error, RecvError};

use std::fs::File;
use std::io::{Read as _, Write as _};
use std::net::SocketAddr;

/// Runs the server side of one transfer end to end: waits for a client,
/// learns the requested filename from the handshake, reads it from
/// `root`, sends it, and closes the connection.
///
/// `root` is the directory the requested filename is resolved against;
/// `..`-escaping names are rejected rather than silently sandboxed.
pub fn serve_one_file(channel: &UdpChannel, root: &std::path::Path, config: &Config) -> Result<(), Error> {
    let hs = handshake::server_handshake(channel, config)?;

    if hs.filename.contains("..") {
        return Err(Error::MalformedPacket(format!(
            "refusing to serve path-escaping filename {:?}",
            hs.filename
        )));
    }

    let path = root.join(&hs.filename);
    let mut file = File::open(&path).map_err(|source| Error::FileOpenFailed {
        path: path.display().to_string(),
        source,
    })?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    sender::run_sender(channel, hs.client, hs.isn_s, hs.filename_ackno, &data, config)
}

/// Runs the client side: performs the handshake requesting `filename`,
/// receives the file in full, and writes it to `dest`.
pub fn fetch_one_file(
    channel: &UdpChannel,
    server: SocketAddr,
    filename: &str,
    dest: &std::path::Path,
    config: &Config,
) -> Result<(), Error> {
    let hs = handshake::client_handshake(channel, server, filename, config)?;

    let data = receiver::run_receiver(channel, server, hs.rcv_base as u16, hs.isn_c.wrapping_add(1), config)?;

    let mut out = File::create(dest).map_err(|source| Error::FileOpenFailed {
        path: dest.display().to_string(),
        source,
    })?;
    out.write_all(&data)?;
    Ok(())
}
