//! Byte-at-a-time telegram decoder.
//!
//! Two nested state machines share each incoming byte. The framing layer
//! tracks STX resynchronization, ESC destuffing and the running checksum;
//! the shape layer counts logical bytes and resolves the expected total
//! length from the catalog, stalling variable-length types until their
//! discriminant byte arrives. Once the resolved length and a matching
//! checksum are in, the logical bytes are parsed into the single buffered
//! [`Telegram`].
//!
//! Exactly one decode is in flight at a time. The buffered telegram stays
//! valid until the next frame start; callers must copy out what they need
//! before feeding more bytes.

use snafu::Snafu;

use crate::frame::{CHECKSUM_SEED, ESC, STX};
use crate::nom_parser::parse_telegram;
use crate::telegram::{size_rule, SizeRule, Telegram, TelegramBytes};

/// Decode errors. All of them leave the decoder resynchronized: after an
/// error it is hunting for the next STX (or, for [`UnexpectedStart`], already
/// collecting the new frame).
#[derive(Debug, Snafu, PartialEq, Eq, Copy, Clone)]
#[non_exhaustive]
pub enum DecodeError {
    /// A raw STX arrived in the middle of a frame. The old frame is lost and
    /// the new one is already being received.
    #[snafu(display("Unexpected frame start, resynchronized"))]
    UnexpectedStart,
    /// The final byte did not match the running checksum.
    #[snafu(display("Checksum mismatch"))]
    Checksum,
    /// The type byte has no catalog entry; the decoder cannot know the frame
    /// length and ignores everything up to the next STX.
    #[snafu(display("Unknown message type {:#04x}", code))]
    UnknownType { code: u8 },
    /// A variable-length discriminant without a length table entry.
    #[snafu(display("Unknown length discriminant {:#04x}", value))]
    UnknownDiscriminant { value: u8 },
    /// Checksum passed but the body does not parse. Catalog and parser have
    /// drifted apart, or the bus carries a newer protocol revision.
    #[snafu(display("Telegram body failed to parse"))]
    Malformed,
    /// Logical bytes exceeded the telegram buffer.
    #[snafu(display("Telegram exceeds the receive buffer"))]
    Overflow,
}

/// Result of feeding one byte.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Progress {
    /// Hunting for a frame start; the byte was ignored.
    Idle,
    /// Mid-frame, more bytes needed.
    InProgress,
    /// A telegram was decoded and is available via [`TelegramDecoder::telegram`].
    Complete,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FrameState {
    WaitForStart,
    Receiving,
    WaitForChecksum,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum DecodeState {
    WaitSenderAddr,
    WaitType,
    WaitBody,
}

/// The streaming decoder with its single receive buffer.
pub struct TelegramDecoder {
    frame: FrameState,
    stuff_pending: bool,
    checksum: u8,
    decode: DecodeState,
    /// Index of the last logical byte, once the catalog has resolved it.
    last_index: usize,
    /// Discriminant offset and length table of an unresolved variable rule.
    pending_var: Option<(usize, &'static [(u8, u8)])>,
    buf: TelegramBytes,
    telegram: Option<Telegram>,
}

impl TelegramDecoder {
    pub fn new() -> TelegramDecoder {
        TelegramDecoder {
            frame: FrameState::WaitForStart,
            stuff_pending: false,
            checksum: 0,
            decode: DecodeState::WaitSenderAddr,
            last_index: usize::MAX,
            pending_var: None,
            buf: TelegramBytes::new(),
            telegram: None,
        }
    }

    /// Feed one wire byte.
    pub fn feed(&mut self, raw: u8) -> Result<Progress, DecodeError> {
        if self.frame == FrameState::WaitForStart {
            if raw == STX {
                self.begin_frame();
                return Ok(Progress::InProgress);
            }
            return Ok(Progress::Idle);
        }

        if raw == STX {
            self.begin_frame();
            return UnexpectedStartSnafu.fail();
        }
        if raw == ESC && !self.stuff_pending {
            self.stuff_pending = true;
            return Ok(Progress::InProgress);
        }
        let byte = if self.stuff_pending {
            self.stuff_pending = false;
            !raw
        } else {
            raw
        };

        if self.frame == FrameState::WaitForChecksum {
            self.frame = FrameState::WaitForStart;
            if byte != self.checksum {
                return ChecksumSnafu.fail();
            }
            return match parse_telegram(&self.buf) {
                Some(telegram) => {
                    self.telegram = Some(telegram);
                    Ok(Progress::Complete)
                }
                None => MalformedSnafu.fail(),
            };
        }

        self.advance(byte)
    }

    /// Abort any reception in progress and hunt for the next frame start.
    /// Used on link-level errors (overrun, parity, framing).
    pub fn reset(&mut self) {
        self.frame = FrameState::WaitForStart;
        self.stuff_pending = false;
        self.pending_var = None;
        self.buf.clear();
    }

    /// True while a frame is being received.
    pub fn in_flight(&self) -> bool {
        self.frame != FrameState::WaitForStart
    }

    /// The most recently decoded telegram. Valid until the next frame start.
    pub fn telegram(&self) -> Option<&Telegram> {
        self.telegram.as_ref()
    }

    fn begin_frame(&mut self) {
        self.frame = FrameState::Receiving;
        self.stuff_pending = false;
        self.checksum = CHECKSUM_SEED.wrapping_add(STX);
        self.decode = DecodeState::WaitSenderAddr;
        self.last_index = usize::MAX;
        self.pending_var = None;
        self.buf.clear();
        self.telegram = None;
    }

    fn advance(&mut self, byte: u8) -> Result<Progress, DecodeError> {
        self.checksum = self.checksum.wrapping_add(byte);
        let index = self.buf.len();
        if self.buf.try_push(byte).is_err() {
            self.frame = FrameState::WaitForStart;
            return OverflowSnafu.fail();
        }

        match self.decode {
            DecodeState::WaitSenderAddr => {
                self.decode = DecodeState::WaitType;
            }
            DecodeState::WaitType => {
                self.decode = DecodeState::WaitBody;
                match size_rule(byte) {
                    None => {
                        self.frame = FrameState::WaitForStart;
                        return UnknownTypeSnafu { code: byte }.fail();
                    }
                    Some(SizeRule::Fixed(len)) => {
                        self.last_index = *len as usize - 1;
                    }
                    Some(SizeRule::Variable { offset, lengths }) => {
                        self.pending_var = Some((*offset as usize, lengths));
                    }
                }
            }
            DecodeState::WaitBody => {
                if let Some((offset, lengths)) = self.pending_var {
                    if index == offset {
                        match lengths.iter().find(|(kind, _)| *kind == byte) {
                            Some((_, len)) => {
                                self.pending_var = None;
                                self.last_index = *len as usize - 1;
                            }
                            None => {
                                self.frame = FrameState::WaitForStart;
                                return UnknownDiscriminantSnafu { value: byte }.fail();
                            }
                        }
                    }
                }
            }
        }

        if self.pending_var.is_none() && index >= self.last_index {
            self.frame = FrameState::WaitForChecksum;
        }
        Ok(Progress::InProgress)
    }
}

impl Default for TelegramDecoder {
    fn default() -> Self {
        Self::new()
    }
}
