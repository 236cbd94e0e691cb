//! Frame layer: STX delimiting, ESC byte stuffing and the additive checksum.
//!
//! A frame is `STX` followed by the stuffed logical bytes and the stuffed
//! checksum byte. There is no terminator; the receiver infers the frame end
//! from the catalog-resolved telegram length. Any logical or checksum byte
//! equal to [`STX`] or [`ESC`] travels as `ESC, !byte`.

use arrayvec::ArrayVec;

use crate::telegram::MAX_TELEGRAM_LEN;
use crate::types::SendError;

/// Frame start delimiter.
pub const STX: u8 = 0x02;
/// Escape byte introducing a complemented stuffed byte.
pub const ESC: u8 = 0x1B;
/// Seed of the additive 8-bit checksum.
pub const CHECKSUM_SEED: u8 = 0x55;

/// Worst case wire size: STX plus every logical byte and the checksum stuffed
/// to two bytes each.
pub const MAX_FRAME_LEN: usize = 1 + 2 * MAX_TELEGRAM_LEN + 2;

/// Buffer holding one stuffed wire frame.
pub type FrameBytes = ArrayVec<u8, MAX_FRAME_LEN>;

/// The running checksum over STX and the unescaped logical bytes.
pub fn checksum(logical: &[u8]) -> u8 {
    logical
        .iter()
        .fold(CHECKSUM_SEED.wrapping_add(STX), |sum, byte| {
            sum.wrapping_add(*byte)
        })
}

/// Frame the logical bytes of one telegram into `out`.
pub fn encode_frame(logical: &[u8], out: &mut FrameBytes) -> Result<(), SendError> {
    out.clear();
    out.try_push(STX).map_err(|_| SendError::FrameTooLong)?;
    for byte in logical {
        push_stuffed(out, *byte)?;
    }
    push_stuffed(out, checksum(logical))
}

fn push_stuffed(out: &mut FrameBytes, byte: u8) -> Result<(), SendError> {
    if byte == STX || byte == ESC {
        out.try_push(ESC).map_err(|_| SendError::FrameTooLong)?;
        out.try_push(!byte).map_err(|_| SendError::FrameTooLong)
    } else {
        out.try_push(byte).map_err(|_| SendError::FrameTooLong)
    }
}
