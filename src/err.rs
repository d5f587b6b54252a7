use std::net::AddrParseError;

/// Fatal and dropped-segment conditions the transport layer can hit.
///
/// `Timeout` deliberately does not live here: it is not an error, it is the
/// clock driving retransmission, and is reported through [`RecvError`]
/// instead so a stray `?` can't turn a timeout into a process exit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind udp socket on port {0}: {1}")]
    BindFailed(u16, std::io::Error),

    #[error("failed to resolve host {0}: {1}")]
    ResolveFailed(String, std::io::Error),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("unexpected packet in state {state}: {kind}")]
    UnexpectedState { state: String, kind: String },

    #[error("datagram substrate error: {0}")]
    SubstrateError(#[from] std::io::Error),

    #[error("failed to open {path}: {source}")]
    FileOpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddrParseError),

    #[error("teardown did not complete within the deadline")]
    TeardownTimedOut,
}

/// The outcome of a bounded-deadline receive.
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    #[error("no datagram arrived before the deadline")]
    Timeout,

    #[error(transparent)]
    Fatal(#[from] Error),
}
