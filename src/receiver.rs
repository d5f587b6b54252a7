//! The file receiver's engine: dedups and reassembles incoming data
//! segments, emits a cumulative ACK for each, and hands off to the
//! teardown FSM once the sender's FIN arrives.

use std::net::SocketAddr;

use crate::channel::DatagramChannel;
use crate::config::Config;
use crate::err::{Error, RecvError};
use crate::packet::PacketKind;
use crate::recvbuf::{Delivery, ReceiveBuffer};
use crate::teardown;
use crate::telemetry::{log_debug, log_recv, log_send};

/// Receives data from `peer` starting at `rcv_base`, acking every segment
/// (cumulatively, with the dup-ack-on-reorder behavior the sender's fast
/// retransmit relies on), until the sender's FIN closes the connection.
/// Returns the reassembled byte stream.
pub fn run_receiver<C: DatagramChannel>(
    channel: &C,
    peer: SocketAddr,
    rcv_base: u16,
    isn: u16,
    config: &Config,
) -> Result<Vec<u8>, Error> {
    let mut buf = ReceiveBuffer::new(rcv_base as u32, config.seq_space, config.dedup_capacity());
    let mut out = Vec::new();

    loop {
        let (bytes, from) = channel.recv_from(None).map_err(|e| match e {
            RecvError::Timeout => unreachable!("unbounded recv cannot time out"),
            RecvError::Fatal(e) => e,
        })?;
        if from != peer {
            continue;
        }
        let Ok(kind) = PacketKind::decode(&bytes) else {
            continue;
        };

        match kind {
            PacketKind::Fin { seqno } => {
                log_recv(seqno);
                teardown::close_responder(channel, peer, isn, config)?;
                return Ok(out);
            }
            PacketKind::Data { seqno, payload, .. } => {
                log_recv(seqno);
                match buf.accept(seqno as u32, payload) {
                    Delivery::InOrder { bytes } => out.extend(bytes),
                    Delivery::OutOfOrder | Delivery::Duplicate | Delivery::Stale => {}
                }
                let ack = PacketKind::Ack {
                    seqno: isn,
                    ackno: buf.rcv_base() as u16,
                };
                log_send(ack.seqno(), 0, 0, None);
                channel.send_to(&ack.encode(), peer)?;
            }
            other => {
                let err = Error::UnexpectedState {
                    state: "receiving".to_string(),
                    kind: other.label().to_string(),
                };
                log_debug(config.debug, &err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::sim::SimBus;
    use crate::channel::SimChannel;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn acks_in_order_data_cumulatively() {
        let bus = SimBus::new();
        let sender_side = SimChannel::new(addr(1), bus.clone());
        let receiver_side = SimChannel::new(addr(2), bus);

        let data = PacketKind::Data {
            seqno: 100,
            ack: None,
            payload: b"hello".to_vec(),
        };
        sender_side.send_to(&data.encode(), addr(2)).unwrap();

        let (bytes, from) = receiver_side
            .recv_from(Some(std::time::Duration::from_millis(100)))
            .unwrap();
        assert_eq!(from, addr(1));
        let kind = PacketKind::decode(&bytes).unwrap();
        assert_eq!(kind, data);
    }
}
