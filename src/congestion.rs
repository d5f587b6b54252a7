//! TCP Reno congestion control: slow start, congestion avoidance, fast
//! recovery. Classical Reno, not the source protocol's variant that jumps
//! to fast recovery on the very first duplicate ACK (open question #3:
//! this crate counts to three).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionState {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

#[derive(Debug, Clone, Copy)]
pub struct CongestionControl {
    pub cwnd: u32,
    pub ssthresh: u32,
    pub dup_acks: u32,
    pub state: CongestionState,
    mtu: u32,
    fast_retransmit_threshold: u32,
}

/// `ssthresh` never drops below this, so `ssthresh + 3*mtu` during fast
/// retransmit stays comfortably above `cwnd`'s own floor and the
/// congestion-avoidance increment never divides by something tiny
/// (open question #4).
fn ssthresh_floor(mtu: u32) -> u32 {
    2 * mtu
}

impl CongestionControl {
    pub fn new(initial_cwnd: u32, initial_ssthresh: u32, mtu: u32, fast_retransmit_threshold: u32) -> Self {
        CongestionControl {
            cwnd: initial_cwnd.max(mtu),
            ssthresh: initial_ssthresh.max(ssthresh_floor(mtu)),
            dup_acks: 0,
            state: CongestionState::SlowStart,
            mtu,
            fast_retransmit_threshold,
        }
    }

    /// Window budget in whole packets, per invariant (3) of the send window.
    pub fn window_capacity(&self) -> usize {
        (self.cwnd / self.mtu) as usize
    }

    /// A new ACK (not a duplicate) arrived, acknowledging fresh data.
    pub fn on_new_ack(&mut self) {
        self.dup_acks = 0;

        match self.state {
            CongestionState::SlowStart => {
                self.cwnd += self.mtu;
                if self.cwnd >= self.ssthresh {
                    self.state = CongestionState::CongestionAvoidance;
                }
            }
            CongestionState::CongestionAvoidance => {
                let increment = ((self.mtu as u64 * self.mtu as u64) / self.cwnd as u64) as u32;
                self.cwnd += increment.max(1);
            }
            CongestionState::FastRecovery => {
                self.cwnd = self.ssthresh;
                self.state = CongestionState::CongestionAvoidance;
            }
        }
    }

    /// A duplicate ACK arrived. Returns `true` exactly when this call
    /// crossed the fast-retransmit threshold and the caller must
    /// retransmit the oldest unacked packet.
    pub fn on_duplicate_ack(&mut self) -> bool {
        match self.state {
            CongestionState::SlowStart | CongestionState::CongestionAvoidance => {
                self.dup_acks += 1;
                if self.dup_acks >= self.fast_retransmit_threshold {
                    self.ssthresh = (self.cwnd / 2).max(ssthresh_floor(self.mtu));
                    self.cwnd = self.ssthresh + 3 * self.mtu;
                    self.state = CongestionState::FastRecovery;
                    true
                } else {
                    false
                }
            }
            CongestionState::FastRecovery => {
                self.cwnd += self.mtu;
                false
            }
        }
    }

    /// The retransmission timer fired.
    pub fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(ssthresh_floor(self.mtu));
        self.cwnd = self.mtu;
        self.dup_acks = 0;
        self.state = CongestionState::SlowStart;
    }
}
