//! The sender's send window: an ordered record of transmitted-but-not-yet-
//! cumulatively-acked packets, each carrying a retransmission deadline.

use std::collections::VecDeque;
use std::time::Instant;

use crate::packet::PacketKind;
use crate::seq;

/// One in-flight packet.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub packet: PacketKind,
    pub acked: bool,
    pub deadline: Instant,
}

/// The ordered in-flight queue. Acked entries are only ever removed from
/// the front, as a contiguous prefix — invariant (4) in the design doc.
#[derive(Debug, Default)]
pub struct SendWindow {
    entries: VecDeque<InFlight>,
}

impl SendWindow {
    pub fn new() -> Self {
        SendWindow {
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a freshly-transmitted packet. Invariant (1): callers must
    /// have already sent `packet` on the wire before calling this.
    pub fn push(&mut self, packet: PacketKind, deadline: Instant) {
        self.entries.push_back(InFlight {
            packet,
            acked: false,
            deadline,
        });
    }

    /// The seqno of the oldest unacked packet, i.e. `base_seqno`.
    pub fn base_seqno(&self) -> Option<u16> {
        self.entries.front().map(|e| e.packet.seqno())
    }

    /// The earliest deadline among all unacked in-flight packets, used to
    /// bound the next `recv_from` call.
    pub fn earliest_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// The packet with the earliest deadline, for retransmission on
    /// timeout. Only ever one packet is retransmitted per timeout.
    pub fn oldest_mut(&mut self) -> Option<&mut InFlight> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.deadline)
            .map(|(i, _)| i)?;
        self.entries.get_mut(idx)
    }

    /// The very front (oldest-seqno) entry, used for classical fast
    /// retransmit, which always resends the base of the window.
    pub fn front_mut(&mut self) -> Option<&mut InFlight> {
        self.entries.front_mut()
    }

    /// Marks the prefix covered by a new cumulative `ackno` as acked and
    /// drops it, advancing `base_seqno`. `end_of(packet)` is the modular
    /// seqno one past the packet's last byte (its coverage boundary).
    pub fn ack_through(&mut self, ackno: u16, seq_space: u32, end_of: impl Fn(&PacketKind) -> u32) {
        let ackno = ackno as u32;
        while let Some(entry) = self.entries.front() {
            let end = end_of(&entry.packet);
            if seq::precedes_or_eq(end, ackno, seq_space) {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// All unacked packets, oldest first — used when fast retransmit or a
    /// timeout requires resending everything currently outstanding.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut InFlight> {
        self.entries.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn data(seqno: u16, len: u16) -> PacketKind {
        PacketKind::Data {
            seqno,
            ack: None,
            payload: vec![0u8; len as usize],
        }
    }

    fn end_of(p: &PacketKind) -> u32 {
        match p {
            PacketKind::Data { seqno, payload, .. } => {
                *seqno as u32 + payload.len() as u32
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn push_and_base_seqno() {
        let mut w = SendWindow::new();
        assert_eq!(w.base_seqno(), None);
        w.push(data(0, 10), Instant::now());
        assert_eq!(w.base_seqno(), Some(0));
        w.push(data(10, 10), Instant::now());
        assert_eq!(w.base_seqno(), Some(0));
    }

    #[test]
    fn ack_through_pops_contiguous_prefix_only() {
        let mut w = SendWindow::new();
        w.push(data(0, 10), Instant::now());
        w.push(data(10, 10), Instant::now());
        w.push(data(20, 10), Instant::now());

        w.ack_through(10, 30720, end_of);
        assert_eq!(w.len(), 2);
        assert_eq!(w.base_seqno(), Some(10));

        w.ack_through(30, 30720, end_of);
        assert_eq!(w.len(), 0);
    }

    #[test]
    fn earliest_deadline_picks_the_minimum() {
        let mut w = SendWindow::new();
        let now = Instant::now();
        w.push(data(0, 10), now + Duration::from_millis(500));
        w.push(data(10, 10), now + Duration::from_millis(100));
        assert_eq!(w.earliest_deadline(), Some(now + Duration::from_millis(100)));
    }
}
