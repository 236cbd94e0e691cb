//! Medium access for the shared half-duplex wire.
//!
//! There is no bus master and no collision-detect hardware: every node's
//! transmitter is looped back into its own receiver, so the only way to spot
//! two simultaneous transmitters is to compare each echoed byte against the
//! byte just sent. On a mismatch the channel aborts the frame, jams the bus
//! so every listener (including the other transmitter) discards the merged
//! frame, and retries after a randomized, mildly growing delay.
//!
//! The channel is sans-io: the embedding calls the `on_*` methods from its
//! interrupt handlers (byte received, data register empty, transmit
//! complete, start-bit edge) and [`poll`](Channel::poll) from its main loop.
//! Received bytes travel to the poll side through a bounded ring; "waiting"
//! is always a state plus a timestamp comparison, never a sleep.

use log::{debug, trace, warn};

use crate::frame::FrameBytes;
use crate::ring::ByteRing;
use crate::types::{Millis, SendError};

/// Byte value transmitted while jamming. Zero is dominant on the wired-AND
/// bus, so a jam run overwrites whatever the other transmitter is sending.
pub const JAM_BYTE: u8 = 0x00;

/// Number of jam bytes transmitted after a detected collision.
const JAM_LEN: u8 = 3;

/// Collisions tolerated for one frame before it is dropped.
const MAX_RETRY: u8 = 5;

/// Receiving ends when the line has been quiet for this long.
pub const INTER_CHAR_TIMEOUT_MS: u16 = 5;

/// Fixed part of the post-collision backoff delay.
const BACKOFF_BASE_MS: u16 = 2;
/// Randomized part of the backoff window at the first retry; the window
/// doubles per retry up to [`BACKOFF_SHIFT_MAX`].
const BACKOFF_WINDOW_MS: u16 = 8;
const BACKOFF_SHIFT_MAX: u8 = 3;

/// Capacity of the interrupt-to-poll byte ring.
const RX_RING_LEN: usize = 64;

/// Medium access states.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Line quiet, nothing queued.
    Idle,
    /// Foreign traffic on the line.
    Receiving,
    /// This node drives the line, comparing each echoed byte.
    Transmitting,
    /// A frame is queued, waiting for the current reception to end.
    TransmitPending,
    /// Jam bytes are draining after a collision.
    Jamming,
    /// Post-collision backoff; a retry is scheduled.
    Stopped,
}

/// Asynchronous transmit outcome, surfaced by [`Channel::poll`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The frame went out unopposed.
    TxDone,
    /// The frame was dropped after the retry limit.
    TxFailed,
}

/// The arbitration channel. One outstanding frame at a time.
pub struct Channel {
    state: ChannelState,
    tx: FrameBytes,
    /// Next byte to load into the shift register.
    tx_pos: usize,
    /// Next byte expected back on the loop-back echo.
    echo_pos: usize,
    retry_count: u8,
    jam_remaining: u8,
    /// LCG state for the backoff delay.
    seed: u16,
    /// Valid while `state == Stopped`.
    retry_at: Millis,
    rx_deadline: Option<Millis>,
    rx: ByteRing<RX_RING_LEN>,
    event: Option<ChannelEvent>,
    link_error: bool,
    collisions: u8,
    overruns: u8,
}

impl Channel {
    /// `seed` randomizes the backoff; derive it from something per-node,
    /// typically the own bus address or serial number.
    pub fn new(seed: u16) -> Channel {
        Channel {
            state: ChannelState::Idle,
            tx: FrameBytes::new(),
            tx_pos: 0,
            echo_pos: 0,
            retry_count: 0,
            jam_remaining: 0,
            seed: seed | 1,
            retry_at: Millis::from(0),
            rx_deadline: None,
            rx: ByteRing::new(),
            event: None,
            link_error: false,
            collisions: 0,
            overruns: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Queue a stuffed frame for transmission. From `Idle` the transmission
    /// starts immediately (the embedding enables its line driver and begins
    /// pulling bytes via [`on_tx_ready`](Self::on_tx_ready)); while
    /// `Receiving` the frame is deferred until the line goes quiet.
    pub fn transmit(&mut self, frame: &[u8], now: Millis) -> Result<(), SendError> {
        match self.state {
            ChannelState::Idle => {
                self.load(frame)?;
                self.start_tx(now);
                Ok(())
            }
            ChannelState::Receiving => {
                self.load(frame)?;
                self.state = ChannelState::TransmitPending;
                trace!("transmit deferred, line busy");
                Ok(())
            }
            _ => Err(SendError::Busy),
        }
    }

    /// ISR: transmit data register empty, the next wire byte can be loaded.
    pub fn on_tx_ready(&mut self) -> Option<u8> {
        match self.state {
            ChannelState::Transmitting => {
                let byte = *self.tx.get(self.tx_pos)?;
                self.tx_pos += 1;
                Some(byte)
            }
            ChannelState::Jamming => {
                if self.jam_remaining > 0 {
                    self.jam_remaining -= 1;
                    Some(JAM_BYTE)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// ISR: a byte arrived in the receive register. While transmitting this
    /// is our own loop-back echo; a difference means another node is driving
    /// the line at the same time.
    pub fn on_byte_received(&mut self, byte: u8, now: Millis) {
        match self.state {
            ChannelState::Transmitting => {
                if self.tx.get(self.echo_pos) == Some(&byte) {
                    self.echo_pos += 1;
                } else {
                    self.collision(now);
                }
            }
            ChannelState::Jamming => {
                // echo of our own jam run, or the tail of the merged frame
            }
            ChannelState::Idle
            | ChannelState::Receiving
            | ChannelState::TransmitPending
            | ChannelState::Stopped => {
                if self.rx.push(byte).is_err() {
                    self.overruns = self.overruns.wrapping_add(1);
                    self.link_error = true;
                    warn!("rx ring overrun");
                }
                if self.state == ChannelState::Idle {
                    self.state = ChannelState::Receiving;
                }
                self.rx_deadline = Some(now + INTER_CHAR_TIMEOUT_MS);
            }
        }
    }

    /// ISR: start-bit edge on the line, ahead of the byte completing in the
    /// shift register. Lets a node about to transmit notice traffic early.
    pub fn on_start_edge(&mut self, now: Millis) {
        match self.state {
            ChannelState::Idle => {
                self.state = ChannelState::Receiving;
                self.rx_deadline = Some(now + INTER_CHAR_TIMEOUT_MS);
            }
            ChannelState::Receiving | ChannelState::TransmitPending | ChannelState::Stopped => {
                self.rx_deadline = Some(now + INTER_CHAR_TIMEOUT_MS);
            }
            ChannelState::Transmitting | ChannelState::Jamming => {
                // our own start bit
            }
        }
    }

    /// ISR: shift register fully drained after the last loaded byte.
    pub fn on_tx_complete(&mut self, now: Millis) {
        match self.state {
            ChannelState::Transmitting => {
                if self.tx_pos >= self.tx.len() {
                    trace!("frame transmitted, {} bytes", self.tx.len());
                    self.tx.clear();
                    self.retry_count = 0;
                    self.state = ChannelState::Idle;
                    self.event = Some(ChannelEvent::TxDone);
                }
            }
            ChannelState::Jamming => {
                if self.jam_remaining == 0 {
                    self.schedule_retry(now);
                }
            }
            _ => {}
        }
    }

    /// Poll-side bookkeeping: inter-character timeout, deferred and retried
    /// transmissions. Returns at most one transmit outcome per call.
    pub fn poll(&mut self, now: Millis) -> Option<ChannelEvent> {
        if let Some(deadline) = self.rx_deadline {
            if deadline.reached(now) {
                self.rx_deadline = None;
                match self.state {
                    ChannelState::Receiving => {
                        trace!("line idle");
                        self.state = ChannelState::Idle;
                    }
                    ChannelState::TransmitPending => self.start_tx(now),
                    _ => {}
                }
            }
        }
        if self.state == ChannelState::Stopped
            && self.rx_deadline.is_none()
            && self.retry_at.reached(now)
        {
            debug!("collision retry {}", self.retry_count);
            self.start_tx(now);
        }
        self.event.take()
    }

    /// Poll-side drain of the received byte ring.
    pub fn take_byte(&mut self) -> Option<u8> {
        self.rx.pop()
    }

    /// ISR: the UART flagged overrun, parity or framing trouble.
    pub fn on_link_error(&mut self) {
        self.link_error = true;
    }

    /// Returns and clears the link error flag. The receive ring is flushed
    /// along with it; whatever was buffered belongs to the aborted frame.
    pub fn take_link_error(&mut self) -> bool {
        if self.link_error {
            self.link_error = false;
            self.rx.clear();
            true
        } else {
            false
        }
    }

    pub fn collisions(&self) -> u8 {
        self.collisions
    }

    pub fn overruns(&self) -> u8 {
        self.overruns
    }

    fn load(&mut self, frame: &[u8]) -> Result<(), SendError> {
        if !self.tx.is_empty() {
            return Err(SendError::Busy);
        }
        self.tx
            .try_extend_from_slice(frame)
            .map_err(|_| SendError::FrameTooLong)?;
        self.retry_count = 0;
        Ok(())
    }

    fn start_tx(&mut self, _now: Millis) {
        self.tx_pos = 0;
        self.echo_pos = 0;
        self.state = ChannelState::Transmitting;
        self.rx_deadline = None;
    }

    fn collision(&mut self, _now: Millis) {
        self.collisions = self.collisions.wrapping_add(1);
        debug!("collision at byte {} of {}", self.echo_pos, self.tx.len());
        self.jam_remaining = JAM_LEN;
        self.state = ChannelState::Jamming;
    }

    fn schedule_retry(&mut self, now: Millis) {
        self.retry_count += 1;
        if self.retry_count > MAX_RETRY {
            debug!("retries exhausted, dropping frame");
            self.tx.clear();
            self.retry_count = 0;
            self.state = ChannelState::Idle;
            self.event = Some(ChannelEvent::TxFailed);
        } else {
            let delay = self.backoff_delay();
            self.retry_at = now + delay;
            self.state = ChannelState::Stopped;
            trace!("backing off {} ms", delay);
        }
    }

    fn backoff_delay(&mut self) -> u16 {
        self.seed = self.seed.wrapping_mul(25173).wrapping_add(13849);
        let shift = self.retry_count.min(BACKOFF_SHIFT_MAX);
        let window = BACKOFF_WINDOW_MS << shift;
        BACKOFF_BASE_MS + self.seed % window
    }
}
