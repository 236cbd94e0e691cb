//! The bus stack facade: one arbitration channel plus one telegram decoder,
//! owned as a single instance per node.
//!
//! The embedding forwards its UART interrupts to the `on_*` methods and runs
//! [`check`](BusStack::check) plus [`poll_tx`](BusStack::poll_tx) from its
//! main loop.
//!
//! ```
//! use hbus_proto::{addr, millis, BusStack, ChannelEvent, Message, Status, Telegram};
//!
//! let mut tx = BusStack::new(1);
//! let mut rx = BusStack::new(2);
//! let t = Telegram::new(
//!     addr(66),
//!     Message::ReqSetAddr { to: addr(67), new_addr: addr(0x56) },
//! );
//! tx.send(&t, millis(0)).unwrap();
//!
//! // the ISR glue moves bytes: each transmitted byte echoes back to the
//! // sender and arrives at the receiver
//! rx.on_start_edge(millis(0));
//! while let Some(byte) = tx.on_tx_ready() {
//!     tx.on_byte_received(byte, millis(0));
//!     rx.on_byte_received(byte, millis(0));
//! }
//! tx.on_tx_complete(millis(0));
//!
//! assert_eq!(tx.poll_tx(millis(0)), Some(ChannelEvent::TxDone));
//! assert_eq!(rx.check(), Status::Complete);
//! assert_eq!(rx.telegram(), Some(&t));
//! ```

use log::debug;

use crate::channel::{Channel, ChannelEvent, ChannelState};
use crate::decoder::{DecodeError, Progress, TelegramDecoder};
use crate::frame::{encode_frame, FrameBytes};
use crate::telegram::{LinkStatistics, Telegram};
use crate::types::{Millis, SendError};

/// Receive-side status of [`BusStack::check`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    /// Nothing buffered, no frame in flight.
    NoMessage,
    /// A frame is partially received.
    InProgress,
    /// A telegram was decoded; fetch it via [`BusStack::telegram`] before
    /// the next frame starts.
    Complete,
    /// A frame arrived intact in length but failed its checksum.
    ChecksumError,
    /// Transport, framing or catalog trouble; the decoder resynchronized.
    LinkError,
}

/// One node's bus stack.
pub struct BusStack {
    channel: Channel,
    decoder: TelegramDecoder,
    checksum_errors: u8,
}

impl BusStack {
    /// `seed` randomizes the collision backoff; derive it from the node
    /// address or serial number so colliding nodes back off differently.
    pub fn new(seed: u16) -> BusStack {
        BusStack {
            channel: Channel::new(seed),
            decoder: TelegramDecoder::new(),
            checksum_errors: 0,
        }
    }

    /// Frame and queue a telegram. Queue-time failures (catalog mismatch,
    /// busy channel) are reported here; the asynchronous arbitration outcome
    /// arrives through [`poll_tx`](Self::poll_tx).
    pub fn send(&mut self, telegram: &Telegram, now: Millis) -> Result<(), SendError> {
        let logical = telegram.to_bytes()?;
        let mut frame = FrameBytes::new();
        encode_frame(&logical, &mut frame)?;
        self.channel.transmit(&frame, now)
    }

    /// Drive the receive side: drains the byte ring into the decoder and
    /// reports at most one completed telegram or error per call.
    pub fn check(&mut self) -> Status {
        if self.channel.take_link_error() {
            debug!("link error, resynchronizing");
            self.decoder.reset();
            return Status::LinkError;
        }
        while let Some(byte) = self.channel.take_byte() {
            match self.decoder.feed(byte) {
                Ok(Progress::Complete) => return Status::Complete,
                Ok(_) => {}
                Err(DecodeError::Checksum) => {
                    self.checksum_errors = self.checksum_errors.wrapping_add(1);
                    debug!("checksum error");
                    return Status::ChecksumError;
                }
                Err(error) => {
                    debug!("decode error: {}", error);
                    return Status::LinkError;
                }
            }
        }
        if self.decoder.in_flight() {
            Status::InProgress
        } else {
            Status::NoMessage
        }
    }

    /// The buffered telegram of the last [`Status::Complete`]. Valid until
    /// the next frame starts decoding; copy out what you need.
    pub fn telegram(&self) -> Option<&Telegram> {
        self.decoder.telegram()
    }

    /// Drive the transmit side: timeouts, deferred starts, collision
    /// retries. Returns at most one transmit outcome per call.
    pub fn poll_tx(&mut self, now: Millis) -> Option<ChannelEvent> {
        self.channel.poll(now)
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Link diagnostic counters, sized for the `LinkStats` telegram payload.
    pub fn stats(&self) -> LinkStatistics {
        LinkStatistics {
            collisions: self.channel.collisions(),
            overruns: self.channel.overruns(),
            checksum_errors: self.checksum_errors,
        }
    }

    /// ISR: byte received (or looped back) by the UART.
    pub fn on_byte_received(&mut self, byte: u8, now: Millis) {
        self.channel.on_byte_received(byte, now);
    }

    /// ISR: transmit data register empty.
    pub fn on_tx_ready(&mut self) -> Option<u8> {
        self.channel.on_tx_ready()
    }

    /// ISR: transmission fully shifted out.
    pub fn on_tx_complete(&mut self, now: Millis) {
        self.channel.on_tx_complete(now);
    }

    /// ISR: start-bit edge detected on the line.
    pub fn on_start_edge(&mut self, now: Millis) {
        self.channel.on_start_edge(now);
    }

    /// ISR: the UART reported overrun, parity or framing trouble.
    pub fn on_link_error(&mut self) {
        self.channel.on_link_error();
    }
}
