//! An in-memory [`DatagramChannel`] with pluggable fault injection, used
//! only by this crate's own tests to drive two engines against each other
//! without a real socket.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;

use super::DatagramChannel;
use crate::err::{Error, RecvError};

/// What happens to one outgoing datagram on a faulty link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    Deliver,
    Drop,
    Duplicate,
    /// Hold this datagram back; it is delivered immediately after the
    /// *next* datagram sent on the same link, producing an adjacent swap.
    Defer,
}

/// Decides the fate of each datagram a [`SimChannel`] sends, indexed by a
/// per-link, zero-based send counter.
pub trait FaultPolicy: Send {
    fn decide(&mut self, index: usize, bytes: &[u8]) -> FaultAction;
}

/// The default: every datagram is delivered untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFault;

impl FaultPolicy for NoFault {
    fn decide(&mut self, _index: usize, _bytes: &[u8]) -> FaultAction {
        FaultAction::Deliver
    }
}

/// A fixed, by-index script, for exercising exact scenarios (one dropped
/// packet, one duplicated packet, one adjacent swap, ...).
#[derive(Debug, Default, Clone)]
pub struct ScriptedFault {
    actions: HashMap<usize, FaultAction>,
}

impl ScriptedFault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, index: usize, action: FaultAction) -> Self {
        self.actions.insert(index, action);
        self
    }
}

impl FaultPolicy for ScriptedFault {
    fn decide(&mut self, index: usize, _bytes: &[u8]) -> FaultAction {
        self.actions
            .get(&index)
            .copied()
            .unwrap_or(FaultAction::Deliver)
    }
}

/// Independent loss/duplication probabilities applied to every datagram,
/// for the randomized-trace property tests (reliability under loss <=
/// 50%, duplication <= 50%, ...).
pub struct RandomFault<R> {
    pub loss: f64,
    pub duplicate: f64,
    pub rng: R,
}

impl<R: Rng + Send> FaultPolicy for RandomFault<R> {
    fn decide(&mut self, _index: usize, _bytes: &[u8]) -> FaultAction {
        if self.rng.gen_bool(self.loss.clamp(0.0, 1.0)) {
            FaultAction::Drop
        } else if self.rng.gen_bool(self.duplicate.clamp(0.0, 1.0)) {
            FaultAction::Duplicate
        } else {
            FaultAction::Deliver
        }
    }
}

#[derive(Default)]
struct Inbox {
    queue: VecDeque<(Vec<u8>, SocketAddr)>,
}

/// Shared mailroom for every [`SimChannel`] built from the same `Arc`.
#[derive(Default)]
pub struct SimBus {
    inboxes: Mutex<HashMap<SocketAddr, Inbox>>,
    cvar: Condvar,
}

impl SimBus {
    pub fn new() -> Arc<Self> {
        Arc::new(SimBus::default())
    }

    fn deliver(&self, to: SocketAddr, bytes: Vec<u8>, from: SocketAddr) {
        let mut inboxes = self.inboxes.lock().unwrap();
        inboxes.entry(to).or_default().queue.push_back((bytes, from));
        self.cvar.notify_all();
    }
}

/// One endpoint's handle onto a [`SimBus`]: its own address, and the
/// fault policy applied to datagrams it sends.
pub struct SimChannel {
    addr: SocketAddr,
    bus: Arc<SimBus>,
    fault: Mutex<Box<dyn FaultPolicy>>,
    sent: Mutex<usize>,
    deferred: Mutex<Option<(Vec<u8>, SocketAddr)>>,
}

impl SimChannel {
    pub fn new(addr: SocketAddr, bus: Arc<SimBus>) -> Self {
        SimChannel {
            addr,
            bus,
            fault: Mutex::new(Box::new(NoFault)),
            sent: Mutex::new(0),
            deferred: Mutex::new(None),
        }
    }

    pub fn with_fault(addr: SocketAddr, bus: Arc<SimBus>, fault: Box<dyn FaultPolicy>) -> Self {
        SimChannel {
            addr,
            bus,
            fault: Mutex::new(fault),
            sent: Mutex::new(0),
            deferred: Mutex::new(None),
        }
    }

    pub fn set_fault(&self, fault: Box<dyn FaultPolicy>) {
        *self.fault.lock().unwrap() = fault;
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl DatagramChannel for SimChannel {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> Result<usize, Error> {
        let index = {
            let mut sent = self.sent.lock().unwrap();
            let i = *sent;
            *sent += 1;
            i
        };

        let action = self.fault.lock().unwrap().decide(index, buf);

        match action {
            FaultAction::Drop => {}
            FaultAction::Deliver => {
                self.bus.deliver(peer, buf.to_vec(), self.addr);
                if let Some((bytes, to)) = self.deferred.lock().unwrap().take() {
                    self.bus.deliver(to, bytes, self.addr);
                }
            }
            FaultAction::Duplicate => {
                self.bus.deliver(peer, buf.to_vec(), self.addr);
                self.bus.deliver(peer, buf.to_vec(), self.addr);
            }
            FaultAction::Defer => {
                let previous = self.deferred.lock().unwrap().replace((buf.to_vec(), peer));
                if let Some((bytes, to)) = previous {
                    self.bus.deliver(to, bytes, self.addr);
                }
            }
        }

        Ok(buf.len())
    }

    fn recv_from(&self, deadline: Option<Duration>) -> Result<(Vec<u8>, SocketAddr), RecvError> {
        let mut inboxes = self.bus.inboxes.lock().unwrap();
        let start = Instant::now();

        loop {
            if let Some(inbox) = inboxes.get_mut(&self.addr) {
                if let Some(item) = inbox.queue.pop_front() {
                    return Ok(item);
                }
            }

            let Some(deadline) = deadline else {
                inboxes = self.bus.cvar.wait(inboxes).unwrap();
                continue;
            };

            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Err(RecvError::Timeout);
            }

            let (next, timeout) = self
                .bus
                .cvar
                .wait_timeout(inboxes, deadline - elapsed)
                .unwrap();
            inboxes = next;
            if timeout.timed_out() {
                // Loop once more: a notification could have raced the
                // timeout and still left a datagram in the queue.
                if inboxes
                    .get(&self.addr)
                    .map(|i| i.queue.is_empty())
                    .unwrap_or(true)
                {
                    return Err(RecvError::Timeout);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn delivers_in_order_with_no_fault() {
        let bus = SimBus::new();
        let a = SimChannel::new(addr(1), bus.clone());
        let b = SimChannel::new(addr(2), bus.clone());

        a.send_to(b"one", addr(2)).unwrap();
        a.send_to(b"two", addr(2)).unwrap();

        let (bytes, from) = b.recv_from(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(bytes, b"one");
        assert_eq!(from, addr(1));
        let (bytes, _) = b.recv_from(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(bytes, b"two");
    }

    #[test]
    fn recv_times_out_when_nothing_arrives() {
        let bus = SimBus::new();
        let b = SimChannel::new(addr(2), bus);
        let res = b.recv_from(Some(Duration::from_millis(20)));
        assert!(matches!(res, Err(RecvError::Timeout)));
    }

    #[test]
    fn scripted_drop_suppresses_one_datagram() {
        let bus = SimBus::new();
        let a = SimChannel::with_fault(
            addr(1),
            bus.clone(),
            Box::new(ScriptedFault::new().at(0, FaultAction::Drop)),
        );
        let b = SimChannel::new(addr(2), bus);

        a.send_to(b"dropped", addr(2)).unwrap();
        a.send_to(b"kept", addr(2)).unwrap();

        let (bytes, _) = b.recv_from(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(bytes, b"kept");
        assert!(matches!(
            b.recv_from(Some(Duration::from_millis(20))),
            Err(RecvError::Timeout)
        ));
    }

    #[test]
    fn scripted_duplicate_delivers_twice() {
        let bus = SimBus::new();
        let a = SimChannel::with_fault(
            addr(1),
            bus.clone(),
            Box::new(ScriptedFault::new().at(0, FaultAction::Duplicate)),
        );
        let b = SimChannel::new(addr(2), bus);

        a.send_to(b"dup", addr(2)).unwrap();

        let (first, _) = b.recv_from(Some(Duration::from_millis(100))).unwrap();
        let (second, _) = b.recv_from(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(first, b"dup");
        assert_eq!(second, b"dup");
    }

    #[test]
    fn deferred_swaps_adjacent_datagrams() {
        let bus = SimBus::new();
        let a = SimChannel::with_fault(
            addr(1),
            bus.clone(),
            Box::new(ScriptedFault::new().at(1, FaultAction::Defer)),
        );
        let b = SimChannel::new(addr(2), bus);

        a.send_to(b"1", addr(2)).unwrap();
        a.send_to(b"2", addr(2)).unwrap();
        a.send_to(b"3", addr(2)).unwrap();

        let (p1, _) = b.recv_from(Some(Duration::from_millis(100))).unwrap();
        let (p2, _) = b.recv_from(Some(Duration::from_millis(100))).unwrap();
        let (p3, _) = b.recv_from(Some(Duration::from_millis(100))).unwrap();
        assert_eq!((p1, p2, p3), (b"1".to_vec(), b"3".to_vec(), b"2".to_vec()));
    }
}
