//! The two console lines tests are allowed to rely on as observable
//! events: one per send, one per receive. Plain `println!`, matching the
//! direct, greppable progress lines this crate's transport core favors
//! over a structured-logging dependency.

/// `kind` is `Some("SYN" | "FIN" | "Retransmission")` or `None` for a
/// plain data/ACK send.
pub fn log_send(seqno: u16, cwnd: u32, ssthresh: u32, kind: Option<&str>) {
    println!(
        "Sending packet {seqno} {cwnd} {ssthresh} [{}]",
        kind.unwrap_or("")
    );
}

pub fn log_recv(ackno: u16) {
    println!("Receiving packet {ackno}");
}

/// `UnexpectedState`/drop diagnostics, printed only when `Config::debug`
/// is set — this crate carries no tracing/log framework, so "debug
/// level" is a boolean gate on the same `println!` style as above.
pub fn log_debug(debug: bool, message: &str) {
    if debug {
        eprintln!("debug: {message}");
    }
}
