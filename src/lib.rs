//! Sans-io implementation of the HBus home-automation field bus protocol.
//!
//! HBus is a masterless, half-duplex single-wire serial bus shared by small
//! device nodes (switches, dimmers, shutters, sensors, bootloaders). Every
//! node's transmitter is looped back into its own receiver, which is what
//! makes collision detection possible at all: a transmitting node compares
//! each echoed byte with the byte it just sent, and on a mismatch jams the
//! bus so nobody accepts the merged frame, then retries after a randomized
//! backoff.
//!
//! Telegrams are STX-delimited, ESC byte-stuffed and protected by an
//! additive checksum. There is no length byte on the wire: a static catalog
//! maps the message type (and, for the device-state types, a payload
//! discriminant) to the total telegram length.
//!
//! The crate is sans-io in the same sense as its siblings: it owns no serial
//! port, no clock and no thread. The embedding forwards its UART interrupts
//! into [`BusStack`], passes timestamps into the poll-side calls, and wires
//! received telegrams into the [`Distributor`] when it uses acknowledged
//! state distribution.
//!
//! # Layers
//!
//! * [`channel`] — medium access: collision detection by echo comparison,
//!   jamming, randomized bounded retry.
//! * [`frame`] + [`decoder`] + [`telegram`] — the telegram codec: framing,
//!   stuffing, checksum and catalog-driven shape decoding.
//! * [`distributor`] — best-effort fan-out of a state change to a configured
//!   peer set with per-peer acknowledgment and retry.
//! * [`stack`] — [`BusStack`], the owned facade combining channel and codec.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod channel;
pub mod decoder;
pub mod distributor;
pub mod frame;
mod nom_parser;
mod ring;
pub mod stack;
pub mod telegram;
mod types;

pub use channel::{Channel, ChannelEvent, ChannelState};
pub use decoder::{DecodeError, Progress, TelegramDecoder};
pub use distributor::{Distributor, PeerState};
pub use stack::{BusStack, Status};
pub use telegram::{
    DeviceKind, DeviceState, KeyAction, LinkStatistics, Message, MsgType, ShutterMotion, Telegram,
};
pub use types::{addr, millis, Address, Millis, SendError};
