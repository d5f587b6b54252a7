//! The file sender's engine: keeps the send window topped up to `cwnd`,
//! folds every arriving ACK into the congestion controller, retransmits
//! on timeout or the third duplicate ACK, and hands off to the teardown
//! FSM once every byte is cumulatively acked.

use std::net::SocketAddr;
use std::time::Instant;

use crate::channel::DatagramChannel;
use crate::config::Config;
use crate::congestion::CongestionControl;
use crate::err::{Error, RecvError};
use crate::packet::PacketKind;
use crate::seq;
use crate::teardown;
use crate::telemetry::{log_debug, log_recv, log_send};
use crate::window::SendWindow;

fn end_of(packet: &PacketKind) -> u32 {
    match packet {
        PacketKind::Data { seqno, payload, .. } => *seqno as u32 + payload.len() as u32,
        other => other.seqno() as u32,
    }
}

/// Drives `data` across the wire to `peer`, starting at `isn_s + 1` (the
/// SYN-ACK consumed one unit of the server's own sequence space), and
/// closes the connection once it has all been acked.
///
/// The first data packet carries `ackno = filename_ackno` to cumulatively
/// acknowledge the client's filename-carrying ACK, per the "admitting a
/// chunk" step of the handshake/data-phase handoff.
pub fn run_sender<C: DatagramChannel>(
    channel: &C,
    peer: SocketAddr,
    isn_s: u16,
    filename_ackno: u16,
    data: &[u8],
    config: &Config,
) -> Result<(), Error> {
    let mut cc = CongestionControl::new(
        config.initial_cwnd,
        config.initial_ssthresh,
        config.mtu as u32,
        config.fast_retransmit_threshold,
    );
    let mut window = SendWindow::new();
    let mut next_seqno: u32 = isn_s.wrapping_add(1) as u32;
    let mut sent_bytes: usize = 0;
    let mut last_ack: Option<u16> = None;
    let mut pending_first_ack = Some(filename_ackno);
    let payload_cap = config.payload_capacity();

    loop {
        top_up(
            channel,
            peer,
            &mut window,
            &mut cc,
            &mut next_seqno,
            &mut sent_bytes,
            &mut pending_first_ack,
            data,
            payload_cap,
            config,
        )?;

        if window.is_empty() {
            break;
        }

        let deadline = window.earliest_deadline().unwrap();
        let remaining = deadline.saturating_duration_since(Instant::now());

        match channel.recv_from(Some(remaining)) {
            Ok((bytes, from)) if from == peer => {
                let Ok(kind) = PacketKind::decode(&bytes) else {
                    continue;
                };
                if let PacketKind::Ack { ackno, .. } = &kind {
                    let ackno = *ackno;
                    log_recv(ackno);
                    handle_ack(channel, peer, ackno, &mut window, &mut cc, last_ack, config)?;
                    last_ack = Some(ackno);
                } else {
                    let err = Error::UnexpectedState {
                        state: "sending".to_string(),
                        kind: kind.label().to_string(),
                    };
                    log_debug(config.debug, &err.to_string());
                }
            }
            Ok(_) => continue,
            Err(RecvError::Timeout) => {
                cc.on_timeout();
                if let Some(entry) = window.oldest_mut() {
                    log_send(entry.packet.seqno(), cc.cwnd, cc.ssthresh, Some("Retransmission"));
                    channel.send_to(&entry.packet.encode(), peer)?;
                    entry.deadline = Instant::now() + config.timeout;
                }
            }
            Err(RecvError::Fatal(e)) => return Err(e),
        }
    }

    teardown::close_initiator(channel, peer, next_seqno as u16, config)
}

#[allow(clippy::too_many_arguments)]
fn top_up<C: DatagramChannel>(
    channel: &C,
    peer: SocketAddr,
    window: &mut SendWindow,
    cc: &mut CongestionControl,
    next_seqno: &mut u32,
    sent_bytes: &mut usize,
    pending_first_ack: &mut Option<u16>,
    data: &[u8],
    payload_cap: usize,
    config: &Config,
) -> Result<(), Error> {
    while window.len() < cc.window_capacity().max(1) && *sent_bytes < data.len() {
        let end = (*sent_bytes + payload_cap).min(data.len());
        let chunk = data[*sent_bytes..end].to_vec();
        let packet = PacketKind::Data {
            seqno: *next_seqno as u16,
            ack: pending_first_ack.take(),
            payload: chunk.clone(),
        };

        log_send(packet.seqno(), cc.cwnd, cc.ssthresh, None);
        channel.send_to(&packet.encode(), peer)?;
        window.push(packet, Instant::now() + config.timeout);

        *next_seqno = seq::add(*next_seqno, chunk.len() as u32, config.seq_space);
        *sent_bytes = end;
    }
    Ok(())
}

fn handle_ack<C: DatagramChannel>(
    channel: &C,
    peer: SocketAddr,
    ackno: u16,
    window: &mut SendWindow,
    cc: &mut CongestionControl,
    last_ack: Option<u16>,
    config: &Config,
) -> Result<(), Error> {
    let is_duplicate = last_ack == Some(ackno) && !window.is_empty();

    if is_duplicate {
        if cc.on_duplicate_ack() {
            if let Some(entry) = window.front_mut() {
                log_send(entry.packet.seqno(), cc.cwnd, cc.ssthresh, Some("Retransmission"));
                channel.send_to(&entry.packet.encode(), peer)?;
                entry.deadline = Instant::now() + config.timeout;
            }
        }
    } else {
        window.ack_through(ackno, config.seq_space, end_of);
        cc.on_new_ack();
    }
    Ok(())
}
