//! Best-effort distribution of a local state change to the configured peers.
//!
//! One cycle sends the snapshotted state to every configured peer address,
//! one peer at a time, and waits for the matching [`Message::AckState`]
//! before moving on. Peers that never answer are retried a bounded number of
//! times and then marked exhausted; an unreachable peer is an expected
//! outcome on this bus, not an error. The manager never blocks: every call
//! advances at most one peer and all waiting is a timestamp comparison.

use log::{debug, trace, warn};

use crate::telegram::{DeviceState, Message, Telegram};
use crate::types::{addr, millis, Address, Millis};

/// Number of peer slots. Unconfigured slots are marked [`PeerState::Skip`].
pub const MAX_PEERS: usize = 8;

/// Grace window after a send before timeouts are trusted. Keeps a cycle from
/// being torn down while the peer may still be answering its own bus traffic.
pub const ACK1_DELAY_MS: u16 = 20;

/// Response timeout after which the current send counts as unanswered.
pub const ACK_TIMEOUT_MS: u16 = 250;

/// Delay before a whole-cycle retry when a round left peers unresolved.
pub const ROUND_RETRY_DELAY_MS: u16 = 2_000;

/// Overall bound on one distribution cycle including its retries.
pub const CYCLE_TIMEOUT_MS: u16 = 30_000;

/// Per-peer distribution state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PeerState {
    /// Needs a send.
    Init,
    /// Sent; inside the short grace window.
    WaitAck1,
    /// Sent; waiting for the acknowledgment telegram.
    WaitAck2,
    /// Acknowledged.
    Acked,
    /// Retries used up without an acknowledgment.
    Exhausted,
    /// Unconfigured slot.
    Skip,
}

#[derive(Debug, Copy, Clone)]
struct Peer {
    addr: Address,
    max_retry: u8,
    cur_retry: u8,
    state: PeerState,
    sent_at: Millis,
}

impl Peer {
    const SKIP: Peer = Peer {
        addr: addr(0),
        max_retry: 0,
        cur_retry: 0,
        state: PeerState::Skip,
        sent_at: millis(0),
    };
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    /// Waiting out the delay before a whole-cycle retry.
    RoundWait(Millis),
}

/// The distribution manager.
pub struct Distributor {
    own_addr: Address,
    peers: [Peer; MAX_PEERS],
    current: usize,
    phase: Phase,
    /// The state being distributed in the running cycle.
    snapshot: Option<DeviceState>,
    /// A state change that arrived during the grace window.
    deferred: Option<DeviceState>,
    cycle_started: Millis,
}

impl Distributor {
    pub fn new(own_addr: Address) -> Distributor {
        Distributor {
            own_addr,
            peers: [Peer::SKIP; MAX_PEERS],
            current: 0,
            phase: Phase::Idle,
            snapshot: None,
            deferred: None,
            cycle_started: millis(0),
        }
    }

    pub fn own_address(&self) -> Address {
        self.own_addr
    }

    /// Rebuild the peer records from the configured `(address, max_retry)`
    /// list, typically read from persistent configuration. Aborts any cycle.
    pub fn configure(&mut self, config: &[(Address, u8)]) {
        if config.len() > MAX_PEERS {
            warn!("peer list truncated to {} entries", MAX_PEERS);
        }
        self.phase = Phase::Idle;
        self.snapshot = None;
        self.deferred = None;
        self.current = 0;
        for (i, slot) in self.peers.iter_mut().enumerate() {
            *slot = match config.get(i) {
                Some((address, max_retry)) => Peer {
                    addr: *address,
                    max_retry: *max_retry,
                    cur_retry: 0,
                    state: PeerState::Init,
                    sent_at: millis(0),
                },
                None => Peer::SKIP,
            };
        }
    }

    /// The local state changed. Starts a new cycle unless the active peer is
    /// inside the grace window, in which case the restart is deferred so an
    /// almost-corroborated send is not thrown away.
    pub fn announce(&mut self, state: DeviceState, now: Millis) {
        if self.in_grace_window() {
            trace!("state change deferred during ack grace window");
            self.deferred = Some(state);
        } else {
            self.start_cycle(state, now);
        }
    }

    /// Advance the current peer. Returns a telegram the caller should try to
    /// send; the caller reports the channel's verdict via
    /// [`tx_result`](Self::tx_result). While the channel stays busy the same
    /// telegram is offered again on the next tick.
    pub fn tick(&mut self, now: Millis) -> Option<Telegram> {
        if self.deferred.is_some() && !self.in_grace_window() {
            if let Some(state) = self.deferred.take() {
                self.start_cycle(state, now);
            }
        }
        match self.phase {
            Phase::Idle => None,
            Phase::RoundWait(at) => {
                if now.wrapping_since(self.cycle_started) >= CYCLE_TIMEOUT_MS {
                    debug!("distribution cycle timed out");
                    self.phase = Phase::Idle;
                } else if at.reached(now) {
                    self.restart_round();
                }
                None
            }
            Phase::Running => self.tick_current(now),
        }
    }

    /// Report whether the channel accepted the telegram returned by the last
    /// [`tick`](Self::tick). A rejected send stays in `Init` and is retried
    /// on the next tick.
    pub fn tx_result(&mut self, accepted: bool, now: Millis) {
        if self.phase == Phase::Running {
            let peer = &mut self.peers[self.current];
            if peer.state == PeerState::Init && accepted {
                peer.state = PeerState::WaitAck1;
                peer.sent_at = now;
            }
        }
    }

    /// Feed a received telegram; acknowledgments addressed to this node
    /// resolve the matching peer.
    pub fn handle_telegram(&mut self, telegram: &Telegram, now: Millis) {
        if let Message::AckState { to, state } = telegram.msg {
            if to == self.own_addr {
                self.on_ack(telegram.sender, &state, now);
            }
        }
    }

    /// An acknowledgment for `state` arrived from `from`.
    pub fn on_ack(&mut self, from: Address, state: &DeviceState, _now: Millis) {
        if self.phase != Phase::Running || self.snapshot.as_ref() != Some(state) {
            return;
        }
        for peer in self.peers.iter_mut() {
            if peer.addr == from
                && matches!(peer.state, PeerState::WaitAck1 | PeerState::WaitAck2)
            {
                debug!("peer {} acknowledged", from);
                peer.state = PeerState::Acked;
            }
        }
    }

    /// True once the cycle (and any deferred restart) is over.
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle && self.deferred.is_none()
    }

    /// Distribution state of a configured peer.
    pub fn peer_state(&self, address: Address) -> Option<PeerState> {
        self.peers
            .iter()
            .find(|p| p.state != PeerState::Skip && p.addr == address)
            .map(|p| p.state)
    }

    fn in_grace_window(&self) -> bool {
        self.phase == Phase::Running && self.peers[self.current].state == PeerState::WaitAck1
    }

    fn start_cycle(&mut self, state: DeviceState, now: Millis) {
        self.snapshot = Some(state);
        self.deferred = None;
        let mut first = None;
        for (i, peer) in self.peers.iter_mut().enumerate() {
            if peer.state != PeerState::Skip {
                peer.state = PeerState::Init;
                peer.cur_retry = 0;
                if first.is_none() {
                    first = Some(i);
                }
            }
        }
        match first {
            Some(i) => {
                self.current = i;
                self.cycle_started = now;
                self.phase = Phase::Running;
                debug!("distribution cycle started");
            }
            None => self.phase = Phase::Idle,
        }
    }

    fn restart_round(&mut self) {
        let mut first = None;
        for (i, peer) in self.peers.iter_mut().enumerate() {
            if peer.state == PeerState::Exhausted {
                peer.state = PeerState::Init;
                peer.cur_retry = 0;
                if first.is_none() {
                    first = Some(i);
                }
            }
        }
        match first {
            Some(i) => {
                debug!("retrying cycle for unresolved peers");
                self.current = i;
                self.phase = Phase::Running;
            }
            None => self.phase = Phase::Idle,
        }
    }

    fn tick_current(&mut self, now: Millis) -> Option<Telegram> {
        let current = self.current;
        let peer = self.peers[current];
        match peer.state {
            PeerState::Skip | PeerState::Acked | PeerState::Exhausted => {
                self.advance(now);
                None
            }
            PeerState::Init => match self.snapshot {
                Some(state) => Some(Telegram::new(
                    self.own_addr,
                    Message::SetState {
                        to: peer.addr,
                        state,
                    },
                )),
                None => {
                    self.phase = Phase::Idle;
                    None
                }
            },
            PeerState::WaitAck1 => {
                if now.wrapping_since(peer.sent_at) >= ACK1_DELAY_MS {
                    self.peers[current].state = PeerState::WaitAck2;
                }
                None
            }
            PeerState::WaitAck2 => {
                if now.wrapping_since(peer.sent_at) >= ACK_TIMEOUT_MS {
                    if peer.cur_retry < peer.max_retry {
                        self.peers[current].cur_retry += 1;
                        self.peers[current].state = PeerState::Init;
                        trace!("peer {} send retry", peer.addr);
                    } else {
                        debug!("peer {} exhausted", peer.addr);
                        self.peers[current].state = PeerState::Exhausted;
                    }
                }
                None
            }
        }
    }

    /// Move to the next unresolved peer, round-robin; finish the round when
    /// none remain.
    fn advance(&mut self, now: Millis) {
        for step in 1..=MAX_PEERS {
            let i = (self.current + step) % MAX_PEERS;
            if matches!(
                self.peers[i].state,
                PeerState::Init | PeerState::WaitAck1 | PeerState::WaitAck2
            ) {
                self.current = i;
                return;
            }
        }
        let unresolved = self.peers.iter().any(|p| p.state == PeerState::Exhausted);
        if unresolved && now.wrapping_since(self.cycle_started) < CYCLE_TIMEOUT_MS {
            debug!("round finished with unresolved peers");
            self.phase = Phase::RoundWait(now + ROUND_RETRY_DELAY_MS);
        } else {
            debug!("distribution cycle finished");
            self.phase = Phase::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATE_ON: DeviceState = DeviceState::Switch { on: true };
    const STATE_OFF: DeviceState = DeviceState::Switch { on: false };

    fn ack_from(peer: Address, own: Address, state: DeviceState) -> Telegram {
        Telegram::new(
            peer,
            Message::AckState {
                to: own,
                state,
            },
        )
    }

    #[test]
    fn test_single_peer_ack_flow() {
        let mut dist = Distributor::new(addr(1));
        dist.configure(&[(addr(2), 3)]);
        assert!(dist.is_idle());

        dist.announce(STATE_ON, millis(0));
        let telegram = dist.tick(millis(1)).expect("send request");
        assert_eq!(
            telegram.msg,
            Message::SetState {
                to: addr(2),
                state: STATE_ON,
            }
        );
        dist.tx_result(true, millis(1));
        assert_eq!(dist.peer_state(addr(2)), Some(PeerState::WaitAck1));

        // grace window passes without an ack
        assert_eq!(dist.tick(millis(1 + ACK1_DELAY_MS)), None);
        assert_eq!(dist.peer_state(addr(2)), Some(PeerState::WaitAck2));

        dist.handle_telegram(&ack_from(addr(2), addr(1), STATE_ON), millis(30));
        assert_eq!(dist.peer_state(addr(2)), Some(PeerState::Acked));

        // acked peer is advanced past, cycle ends
        assert_eq!(dist.tick(millis(31)), None);
        assert!(dist.is_idle());
    }

    #[test]
    fn test_busy_channel_is_retried_next_tick() {
        let mut dist = Distributor::new(addr(1));
        dist.configure(&[(addr(2), 1)]);
        dist.announce(STATE_ON, millis(0));

        assert!(dist.tick(millis(1)).is_some());
        dist.tx_result(false, millis(1));
        // still Init, offered again
        assert!(dist.tick(millis(2)).is_some());
    }

    #[test]
    fn test_announce_defers_during_grace_window() {
        let mut dist = Distributor::new(addr(1));
        dist.configure(&[(addr(2), 1)]);
        dist.announce(STATE_ON, millis(0));
        dist.tick(millis(0));
        dist.tx_result(true, millis(0));
        assert_eq!(dist.peer_state(addr(2)), Some(PeerState::WaitAck1));

        // new state arrives inside the grace window: not applied yet
        dist.announce(STATE_OFF, millis(5));
        assert_eq!(dist.tick(millis(6)), None);
        assert_eq!(dist.peer_state(addr(2)), Some(PeerState::WaitAck1));

        // window over: the promotion tick closes the window, the next tick
        // restarts with the deferred state
        assert_eq!(dist.tick(millis(ACK1_DELAY_MS + 1)), None);
        assert_eq!(dist.peer_state(addr(2)), Some(PeerState::WaitAck2));
        let telegram = dist.tick(millis(ACK1_DELAY_MS + 2)).expect("restarted");
        assert_eq!(
            telegram.msg,
            Message::SetState {
                to: addr(2),
                state: STATE_OFF,
            }
        );
    }

    #[test]
    fn test_mismatched_ack_is_ignored() {
        let mut dist = Distributor::new(addr(1));
        dist.configure(&[(addr(2), 1)]);
        dist.announce(STATE_ON, millis(0));
        dist.tick(millis(0));
        dist.tx_result(true, millis(0));

        // ack for a different state
        dist.handle_telegram(&ack_from(addr(2), addr(1), STATE_OFF), millis(1));
        assert_eq!(dist.peer_state(addr(2)), Some(PeerState::WaitAck1));
        // ack addressed to someone else
        dist.handle_telegram(&ack_from(addr(2), addr(9), STATE_ON), millis(1));
        assert_eq!(dist.peer_state(addr(2)), Some(PeerState::WaitAck1));
    }
}
