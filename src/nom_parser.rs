//! Parser turning the validated logical bytes of one frame into a typed
//! [`Telegram`]. The decoder only calls this once the catalog-resolved
//! length has been received and the checksum has passed, so every parser
//! here works on a complete slice.

use nom::bytes::complete::take;
use nom::combinator::{all_consuming, map, map_opt};
use nom::number::complete::{be_i16, be_u16, u8 as any_byte};
use nom::IResult;

use crate::telegram::{
    DeviceKind, DeviceState, KeyAction, LinkStatistics, Message, MsgType, ShutterMotion, Telegram,
};
use crate::types::Address;

type Buf = [u8];

/// Parse a full logical frame. `None` on any structural mismatch, which the
/// decoder reports as a decode error.
pub(crate) fn parse_telegram(buf: &Buf) -> Option<Telegram> {
    match all_consuming(telegram)(buf) {
        Ok((_, telegram)) => Some(telegram),
        Err(_) => None,
    }
}

fn telegram(buf: &Buf) -> IResult<&Buf, Telegram> {
    let (buf, sender) = address(buf)?;
    let (buf, code) = map_opt(any_byte, MsgType::from_byte)(buf)?;
    let (buf, msg) = message(code, buf)?;
    Ok((buf, Telegram { sender, msg }))
}

fn message(msg_type: MsgType, buf: &Buf) -> IResult<&Buf, Message> {
    use Message::*;
    match msg_type {
        MsgType::Startup => Ok((buf, Startup)),
        MsgType::ReqDeviceType => map(address, |to| ReqDeviceType { to })(buf),
        MsgType::DeviceTypeInfo => {
            let (buf, to) = address(buf)?;
            map(device_kind, move |kind| DeviceTypeInfo { to, kind })(buf)
        }
        MsgType::ReqSwVersion => map(address, |to| ReqSwVersion { to })(buf),
        MsgType::SwVersion => {
            let (buf, to) = address(buf)?;
            let (buf, major) = any_byte(buf)?;
            let (buf, minor) = any_byte(buf)?;
            Ok((buf, SwVersion { to, major, minor }))
        }
        MsgType::ReqSetAddr => {
            let (buf, to) = address(buf)?;
            map(address, move |new_addr| ReqSetAddr { to, new_addr })(buf)
        }
        MsgType::AckSetAddr => map(address, |to| AckSetAddr { to })(buf),
        MsgType::ReqSerial => map(address, |to| ReqSerial { to })(buf),
        MsgType::SerialInfo => {
            let (buf, to) = address(buf)?;
            map(bytes4, move |serial| SerialInfo { to, serial })(buf)
        }
        MsgType::ReqConfig => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |offset| ReqConfig { to, offset })(buf)
        }
        MsgType::ConfigData => {
            let (buf, to) = address(buf)?;
            let (buf, offset) = any_byte(buf)?;
            map(bytes4, move |data| ConfigData { to, offset, data })(buf)
        }
        MsgType::WriteConfig => {
            let (buf, to) = address(buf)?;
            let (buf, offset) = any_byte(buf)?;
            map(bytes4, move |data| WriteConfig { to, offset, data })(buf)
        }
        MsgType::AckWriteConfig => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |offset| AckWriteConfig { to, offset })(buf)
        }
        MsgType::ReqState => map(address, |to| ReqState { to })(buf),
        MsgType::State => {
            let (buf, to) = address(buf)?;
            map(device_state, move |state| State { to, state })(buf)
        }
        MsgType::SetState => {
            let (buf, to) = address(buf)?;
            map(device_state, move |state| SetState { to, state })(buf)
        }
        MsgType::AckState => {
            let (buf, to) = address(buf)?;
            map(device_state, move |state| AckState { to, state })(buf)
        }
        MsgType::KeyEvent => {
            let (buf, to) = address(buf)?;
            let (buf, key) = any_byte(buf)?;
            map(key_action, move |action| KeyEvent { to, key, action })(buf)
        }
        MsgType::AckKeyEvent => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |key| AckKeyEvent { to, key })(buf)
        }
        MsgType::ReqSensor => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |channel| ReqSensor { to, channel })(buf)
        }
        MsgType::SensorValue => {
            let (buf, to) = address(buf)?;
            let (buf, channel) = any_byte(buf)?;
            map(be_u16, move |value| SensorValue { to, channel, value })(buf)
        }
        MsgType::SensorEvent => {
            let (buf, to) = address(buf)?;
            let (buf, channel) = any_byte(buf)?;
            map(any_byte, move |level| SensorEvent { to, channel, level })(buf)
        }
        MsgType::AckSensorEvent => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |channel| AckSensorEvent { to, channel })(buf)
        }
        MsgType::ReqLinkStats => map(address, |to| ReqLinkStats { to })(buf),
        MsgType::LinkStats => {
            let (buf, to) = address(buf)?;
            let (buf, collisions) = any_byte(buf)?;
            let (buf, overruns) = any_byte(buf)?;
            let (buf, checksum_errors) = any_byte(buf)?;
            Ok((
                buf,
                LinkStats {
                    to,
                    stats: LinkStatistics {
                        collisions,
                        overruns,
                        checksum_errors,
                    },
                },
            ))
        }
        MsgType::EnterBoot => {
            let (buf, to) = address(buf)?;
            map(be_u16, move |key| EnterBoot { to, key })(buf)
        }
        MsgType::AckEnterBoot => map(address, |to| AckEnterBoot { to })(buf),
        MsgType::ReqFlashPage => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |page| ReqFlashPage { to, page })(buf)
        }
        MsgType::FlashData => {
            let (buf, to) = address(buf)?;
            let (buf, page) = any_byte(buf)?;
            let (buf, seq) = any_byte(buf)?;
            map(bytes16, move |data| FlashData {
                to,
                page,
                seq,
                data,
            })(buf)
        }
        MsgType::AckFlashData => {
            let (buf, to) = address(buf)?;
            let (buf, page) = any_byte(buf)?;
            map(any_byte, move |seq| AckFlashData { to, page, seq })(buf)
        }
        MsgType::ExitBoot => map(address, |to| ExitBoot { to })(buf),
        MsgType::AckExitBoot => map(address, |to| AckExitBoot { to })(buf),
        MsgType::ReqGroup => map(address, |to| ReqGroup { to })(buf),
        MsgType::GroupInfo => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |group| GroupInfo { to, group })(buf)
        }
        MsgType::SetGroup => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |group| SetGroup { to, group })(buf)
        }
        MsgType::AckGroup => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |group| AckGroup { to, group })(buf)
        }
        MsgType::Reset => map(address, |to| Reset { to })(buf),
        MsgType::AckReset => map(address, |to| AckReset { to })(buf),
        MsgType::Ping => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |token| Ping { to, token })(buf)
        }
        MsgType::Pong => {
            let (buf, to) = address(buf)?;
            map(any_byte, move |token| Pong { to, token })(buf)
        }
        MsgType::TimeSync => {
            let (buf, hour) = any_byte(buf)?;
            map(any_byte, move |minute| TimeSync { hour, minute })(buf)
        }
    }
}

fn device_state(buf: &Buf) -> IResult<&Buf, DeviceState> {
    let (buf, kind) = device_kind(buf)?;
    match kind {
        DeviceKind::Switch => map(any_byte, |on| DeviceState::Switch { on: on != 0 })(buf),
        DeviceKind::Dimmer => {
            let (buf, level) = any_byte(buf)?;
            map(any_byte, move |ramp| DeviceState::Dimmer { level, ramp })(buf)
        }
        DeviceKind::Shutter => {
            let (buf, position) = any_byte(buf)?;
            let (buf, target) = any_byte(buf)?;
            map(shutter_motion, move |motion| DeviceState::Shutter {
                position,
                target,
                motion,
            })(buf)
        }
        DeviceKind::KeyPad => map(any_byte, |keys| DeviceState::KeyPad { keys })(buf),
        DeviceKind::Temperature => map(be_i16, |centi_celsius| DeviceState::Temperature {
            centi_celsius,
        })(buf),
        DeviceKind::Brightness => map(be_u16, |lux| DeviceState::Brightness { lux })(buf),
        DeviceKind::Wind => map(be_u16, |dm_per_s| DeviceState::Wind { dm_per_s })(buf),
    }
}

fn address(buf: &Buf) -> IResult<&Buf, Address> {
    map(any_byte, Address::from)(buf)
}

fn device_kind(buf: &Buf) -> IResult<&Buf, DeviceKind> {
    map_opt(any_byte, DeviceKind::from_byte)(buf)
}

fn key_action(buf: &Buf) -> IResult<&Buf, KeyAction> {
    map_opt(any_byte, KeyAction::from_byte)(buf)
}

fn shutter_motion(buf: &Buf) -> IResult<&Buf, ShutterMotion> {
    map_opt(any_byte, ShutterMotion::from_byte)(buf)
}

fn bytes4(buf: &Buf) -> IResult<&Buf, [u8; 4]> {
    map(take(4usize), |bytes: &Buf| {
        let mut out = [0; 4];
        out.copy_from_slice(bytes);
        out
    })(buf)
}

fn bytes16(buf: &Buf) -> IResult<&Buf, [u8; 16]> {
    map(take(16usize), |bytes: &Buf| {
        let mut out = [0; 16];
        out.copy_from_slice(bytes);
        out
    })(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::addr;

    #[test]
    fn test_parse_req_set_addr() {
        let t = parse_telegram(&[66, 0x04, 67, 0x56]).unwrap();
        assert_eq!(t.sender, addr(66));
        assert_eq!(
            t.msg,
            Message::ReqSetAddr {
                to: addr(67),
                new_addr: addr(0x56),
            }
        );
    }

    #[test]
    fn test_parse_startup() {
        let t = parse_telegram(&[9, 0xFF]).unwrap();
        assert_eq!(t.sender, addr(9));
        assert_eq!(t.msg, Message::Startup);
    }

    #[test]
    fn test_parse_device_state() {
        let t = parse_telegram(&[5, 0x0D, 6, 0x03, 10, 90, 0x01]).unwrap();
        assert_eq!(
            t.msg,
            Message::State {
                to: addr(6),
                state: DeviceState::Shutter {
                    position: 10,
                    target: 90,
                    motion: ShutterMotion::Opening,
                },
            }
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        assert!(parse_telegram(&[66, 0x04, 67, 0x56, 0x00]).is_none());
    }

    #[test]
    fn test_truncated_body_rejected() {
        assert!(parse_telegram(&[66, 0x04, 67]).is_none());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(parse_telegram(&[5, 0x0D, 6, 0x7F, 0]).is_none());
    }
}
