//! The four-way close: the side that is finished sending signals with a
//! FIN, the far side combines its own FIN with the ack of the first into
//! a single FIN-ACK, and a final ACK plus a bounded timed-wait let a
//! retransmitted FIN still get answered after the logical close.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::channel::DatagramChannel;
use crate::config::Config;
use crate::err::{Error, RecvError};
use crate::packet::PacketKind;
use crate::telemetry::{log_debug, log_recv, log_send};

/// Hard ceiling on the whole teardown exchange: 16 retransmission
/// intervals, matching the retry budget the handshake leaves implicit
/// but this side of the protocol states explicitly.
fn hard_deadline(config: &Config) -> Instant {
    Instant::now() + config.timeout * 16
}

fn send<C: DatagramChannel>(channel: &C, peer: SocketAddr, kind: &PacketKind, config: &Config) -> Result<(), Error> {
    log_send(kind.seqno(), config.initial_cwnd, config.initial_ssthresh, Some(kind.label()));
    channel.send_to(&kind.encode(), peer)?;
    Ok(())
}

/// Initiates the close: the side with no more data to send. Used by the
/// file sender once its send window has fully drained.
pub fn close_initiator<C: DatagramChannel>(
    channel: &C,
    peer: SocketAddr,
    seqno: u16,
    config: &Config,
) -> Result<(), Error> {
    let fin = PacketKind::Fin { seqno };
    send(channel, peer, &fin, config)?;

    let deadline = hard_deadline(config);
    loop {
        if Instant::now() >= deadline {
            return Err(Error::TeardownTimedOut);
        }
        let remaining = deadline.saturating_duration_since(Instant::now()).min(config.timeout);
        match channel.recv_from(Some(remaining)) {
            Ok((bytes, from)) if from == peer => {
                let Ok(kind) = PacketKind::decode(&bytes) else {
                    continue;
                };
                match kind {
                    PacketKind::FinAck { seqno: peer_seqno, ackno } if ackno == seqno.wrapping_add(1) => {
                        log_recv(ackno);
                        let ack = PacketKind::Ack {
                            seqno: seqno.wrapping_add(1),
                            ackno: peer_seqno.wrapping_add(1),
                        };
                        send(channel, peer, &ack, config)?;
                        return Ok(());
                    }
                    other => {
                        let err = Error::UnexpectedState {
                            state: "fin-wait".to_string(),
                            kind: other.label().to_string(),
                        };
                        log_debug(config.debug, &err.to_string());
                    }
                }
            }
            Ok(_) => continue,
            Err(RecvError::Timeout) => send(channel, peer, &fin, config)?,
            Err(RecvError::Fatal(e)) => return Err(e),
        }
    }
}

/// Responds to a close: the side that receives the initiator's FIN.
/// Returns once the initiator's final ACK lands and a short timed-wait
/// has passed without a retransmitted FIN asking for another FIN-ACK.
pub fn close_responder<C: DatagramChannel>(
    channel: &C,
    peer: SocketAddr,
    isn: u16,
    config: &Config,
) -> Result<(), Error> {
    let deadline = hard_deadline(config);

    let fin_seqno = loop {
        if Instant::now() >= deadline {
            return Err(Error::TeardownTimedOut);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        match channel.recv_from(Some(remaining)) {
            Ok((bytes, from)) if from == peer => {
                match PacketKind::decode(&bytes) {
                    Ok(PacketKind::Fin { seqno }) => {
                        log_recv(seqno);
                        break seqno;
                    }
                    Ok(other) => {
                        let err = Error::UnexpectedState {
                            state: "close-wait".to_string(),
                            kind: other.label().to_string(),
                        };
                        log_debug(config.debug, &err.to_string());
                    }
                    Err(_) => {}
                }
            }
            Ok(_) => continue,
            Err(RecvError::Timeout) => return Err(Error::TeardownTimedOut),
            Err(RecvError::Fatal(e)) => return Err(e),
        }
    };

    let finack = PacketKind::FinAck {
        seqno: isn,
        ackno: fin_seqno.wrapping_add(1),
    };
    send(channel, peer, &finack, config)?;

    loop {
        if Instant::now() >= deadline {
            return Err(Error::TeardownTimedOut);
        }
        let remaining = deadline.saturating_duration_since(Instant::now()).min(config.timeout);
        match channel.recv_from(Some(remaining)) {
            Ok((bytes, from)) if from == peer => {
                let Ok(kind) = PacketKind::decode(&bytes) else {
                    continue;
                };
                match kind {
                    PacketKind::Ack { ackno, .. } if ackno == isn.wrapping_add(1) => {
                        log_recv(ackno);
                        break;
                    }
                    PacketKind::Fin { seqno } if seqno == fin_seqno => {
                        send(channel, peer, &finack, config)?;
                    }
                    other => {
                        let err = Error::UnexpectedState {
                            state: "last-ack".to_string(),
                            kind: other.label().to_string(),
                        };
                        log_debug(config.debug, &err.to_string());
                    }
                }
            }
            Ok(_) => continue,
            Err(RecvError::Timeout) => send(channel, peer, &finack, config)?,
            Err(RecvError::Fatal(e)) => return Err(e),
        }
    }

    timed_wait(channel, peer, &finack, config, deadline)
}

/// Keeps answering a stray retransmitted FIN with the same FIN-ACK for
/// one last stretch before the connection is considered fully closed.
fn timed_wait<C: DatagramChannel>(
    channel: &C,
    peer: SocketAddr,
    finack: &PacketKind,
    config: &Config,
    hard_deadline: Instant,
) -> Result<(), Error> {
    let wait_until = (Instant::now() + config.timeout * 2).min(hard_deadline);
    loop {
        let now = Instant::now();
        if now >= wait_until {
            return Ok(());
        }
        match channel.recv_from(Some(wait_until - now)) {
            Ok((bytes, from)) if from == peer => {
                match PacketKind::decode(&bytes) {
                    Ok(PacketKind::Fin { .. }) => {
                        send(channel, peer, finack, config)?;
                    }
                    Ok(other) => {
                        let err = Error::UnexpectedState {
                            state: "timed-wait".to_string(),
                            kind: other.label().to_string(),
                        };
                        log_debug(config.debug, &err.to_string());
                    }
                    Err(_) => {}
                }
            }
            Ok(_) => continue,
            Err(RecvError::Timeout) => return Ok(()),
            Err(RecvError::Fatal(e)) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::sim::SimBus;
    use crate::channel::SimChannel;
    use std::net::{IpAddr, Ipv4Addr};
    use std::thread;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn close_completes_over_a_clean_channel() {
        let bus = SimBus::new();
        let initiator = SimChannel::new(addr(1), bus.clone());
        let responder = SimChannel::new(addr(2), bus);
        let mut config = Config::default();
        config.timeout = Duration::from_millis(30);

        let responder_cfg = config;
        let responder_thread =
            thread::spawn(move || close_responder(&responder, addr(1), 500, &responder_cfg).unwrap());

        close_initiator(&initiator, addr(2), 100, &config).unwrap();
        responder_thread.join().unwrap();
    }

    #[test]
    fn initiator_retransmits_fin_on_loss() {
        use crate::channel::sim::{FaultAction, ScriptedFault};

        let bus = SimBus::new();
        let initiator = SimChannel::with_fault(
            addr(1),
            bus.clone(),
            Box::new(ScriptedFault::new().at(0, FaultAction::Drop)),
        );
        let responder = SimChannel::new(addr(2), bus);
        let mut config = Config::default();
        config.timeout = Duration::from_millis(20);

        let responder_cfg = config;
        let responder_thread =
            thread::spawn(move || close_responder(&responder, addr(1), 9, &responder_cfg).unwrap());

        close_initiator(&initiator, addr(2), 42, &config).unwrap();
        responder_thread.join().unwrap();
    }
}
