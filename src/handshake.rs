//! The three-way handshake, driven from both sides (§4.3).

use std::net::SocketAddr;
use std::time::Instant;

use rand::Rng;

use crate::channel::DatagramChannel;
use crate::config::Config;
use crate::err::{Error, RecvError};
use crate::packet::PacketKind;
use crate::telemetry::{log_debug, log_recv, log_send};

/// What the receiver (client) learns once the handshake completes.
pub struct ClientHandshake {
    pub isn_c: u16,
    pub isn_s: u16,
    /// `ISN_s + 1`, mod the sequence space: the first data seqno expected.
    pub rcv_base: u32,
}

/// What the sender (server) learns once the handshake completes.
pub struct ServerHandshake {
    pub isn_s: u16,
    pub isn_c: u16,
    pub client: SocketAddr,
    pub filename: String,
    /// The seqno the filename-carrying ACK used; cumulatively acked by
    /// the sender's first data packet.
    pub filename_ackno: u16,
}

fn nul_terminate(filename: &str) -> Vec<u8> {
    let mut bytes = filename.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

fn strip_nul(payload: &[u8]) -> String {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

/// C0/C1: the client picks an ISN, sends SYN, and retries until a
/// matching SYN-ACK arrives, then completes with the filename-carrying ACK.
pub fn client_handshake<C: DatagramChannel>(
    channel: &C,
    server: SocketAddr,
    filename: &str,
    config: &Config,
) -> Result<ClientHandshake, Error> {
    let isn_c: u16 = rand::thread_rng().gen_range(0..config.seq_space as u16);

    let syn = PacketKind::Syn { seqno: isn_c };
    send(channel, server, &syn, config, "SYN")?;

    loop {
        match channel.recv_from(Some(config.timeout)) {
            Ok((bytes, from)) if from == server => {
                let Ok(kind) = PacketKind::decode(&bytes) else {
                    continue;
                };
                if let PacketKind::SynAck { seqno, ackno } = &kind {
                    let (seqno, ackno) = (*seqno, *ackno);
                    log_recv(ackno);
                    if ackno != isn_c.wrapping_add(1) {
                        continue;
                    }

                    let isn_s = seqno;
                    let rcv_base = (isn_s as u32 + 1) % config.seq_space;

                    let ack = PacketKind::Data {
                        seqno: isn_c.wrapping_add(1),
                        ack: Some(isn_s.wrapping_add(1)),
                        payload: nul_terminate(filename),
                    };
                    send(channel, server, &ack, config, "")?;

                    return Ok(ClientHandshake {
                        isn_c,
                        isn_s,
                        rcv_base,
                    });
                } else {
                    let err = Error::UnexpectedState {
                        state: "syn-sent".to_string(),
                        kind: kind.label().to_string(),
                    };
                    log_debug(config.debug, &err.to_string());
                }
            }
            Ok(_) => continue,
            Err(RecvError::Timeout) => {
                send(channel, server, &syn, config, "SYN")?;
            }
            Err(RecvError::Fatal(e)) => return Err(e),
        }
    }
}

/// S0/S1: the server waits for a SYN, answers with SYN-ACK, and retries
/// until the filename-carrying ACK arrives.
pub fn server_handshake<C: DatagramChannel>(
    channel: &C,
    config: &Config,
) -> Result<ServerHandshake, Error> {
    let (client, isn_c) = loop {
        let (bytes, from) = channel.recv_from(None).map_err(|e| match e {
            RecvError::Timeout => unreachable!("unbounded recv cannot time out"),
            RecvError::Fatal(e) => e,
        })?;
        match PacketKind::decode(&bytes) {
            Ok(PacketKind::Syn { seqno }) => {
                log_recv(seqno);
                break (from, seqno);
            }
            Ok(other) => {
                let err = Error::UnexpectedState {
                    state: "listening".to_string(),
                    kind: other.label().to_string(),
                };
                log_debug(config.debug, &err.to_string());
            }
            Err(_) => {}
        }
    };

    let isn_s: u16 = rand::thread_rng().gen_range(0..config.seq_space as u16);
    let synack = PacketKind::SynAck {
        seqno: isn_s,
        ackno: isn_c.wrapping_add(1),
    };
    send(channel, client, &synack, config, "SYN")?;

    let mut deadline = Instant::now() + config.timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match channel.recv_from(Some(remaining)) {
            Ok((bytes, from)) if from == client => {
                let Ok(kind) = PacketKind::decode(&bytes) else {
                    continue;
                };
                match &kind {
                    PacketKind::Data {
                        seqno,
                        ack: Some(ackno),
                        payload,
                    } if *ackno == isn_s.wrapping_add(1) && !payload.is_empty() => {
                        log_recv(*ackno);
                        return Ok(ServerHandshake {
                            isn_s,
                            isn_c,
                            client,
                            filename: strip_nul(payload),
                            filename_ackno: *seqno,
                        });
                    }
                    _ => {
                        let err = Error::UnexpectedState {
                            state: "syn-rcvd".to_string(),
                            kind: kind.label().to_string(),
                        };
                        log_debug(config.debug, &err.to_string());
                    }
                }
            }
            Ok(_) => continue,
            Err(RecvError::Timeout) => {
                send(channel, client, &synack, config, "SYN")?;
                deadline = Instant::now() + config.timeout;
            }
            Err(RecvError::Fatal(e)) => return Err(e),
        }
    }
}

fn send<C: DatagramChannel>(
    channel: &C,
    peer: SocketAddr,
    kind: &PacketKind,
    config: &Config,
    label: &str,
) -> Result<(), Error> {
    log_send(kind.seqno(), config.initial_cwnd, config.initial_ssthresh, (!label.is_empty()).then_some(label));
    channel.send_to(&kind.encode(), peer)?;
    Ok(())
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
    fn handshake_completes_over_a_clean_channel() {
        let bus = SimBus::new();
        let client = SimChannel::new(addr(1), bus.clone());
        let server = SimChannel::new(addr(2), bus);
        let config = Config::default();

        let server_thread = thread::spawn(move || server_handshake(&server, &config).unwrap());

        let config = Config::default();
        let ch = client_handshake(&client, addr(2), "report.txt", &config).unwrap();
        let sh = server_thread.join().unwrap();

        assert_eq!(ch.isn_s, sh.isn_s);
        assert_eq!(ch.isn_c, sh.isn_c);
        assert_eq!(sh.filename, "report.txt");
        assert_eq!(sh.client, addr(1));
    }

    #[test]
    fn client_retries_syn_after_loss() {
        use crate::channel::sim::{FaultAction, ScriptedFault};

        let bus = SimBus::new();
        let client = SimChannel::with_fault(
            addr(1),
            bus.clone(),
            Box::new(ScriptedFault::new().at(0, FaultAction::Drop)),
        );
        let server = SimChannel::new(addr(2), bus);
        let mut config = Config::default();
        config.timeout = std::time::Duration::from_millis(30);

        let server_cfg = config;
        let server_thread = thread::spawn(move || server_handshake(&server, &server_cfg).unwrap());

        let ch = client_handshake(&client, addr(2), "f", &config).unwrap();
        let sh = server_thread.join().unwrap();
        assert_eq!(ch.isn_s, sh.isn_s);
    }
}
