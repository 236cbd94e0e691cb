mod common;

use common::{init_logs, Wire};

use hbus_proto::frame::{encode_frame, FrameBytes, STX};
use hbus_proto::{
    addr, millis, BusStack, ChannelEvent, DecodeError, DeviceKind, DeviceState, KeyAction,
    LinkStatistics, Message, Progress, ShutterMotion, Status, Telegram, TelegramDecoder,
};

/// One telegram of every catalogued type, with payloads that exercise the
/// byte encodings (signed values, big-endian words, reserved byte values).
fn samples() -> Vec<Telegram> {
    use Message::*;
    let to = addr(67);
    vec![
        Startup,
        ReqDeviceType { to },
        DeviceTypeInfo {
            to,
            kind: DeviceKind::Shutter,
        },
        ReqSwVersion { to },
        SwVersion {
            to,
            major: 1,
            minor: 42,
        },
        ReqSetAddr {
            to,
            new_addr: addr(0x56),
        },
        AckSetAddr { to },
        ReqSerial { to },
        SerialInfo {
            to,
            serial: [0xDE, 0xAD, 0x02, 0x1B],
        },
        ReqConfig { to, offset: 16 },
        ConfigData {
            to,
            offset: 16,
            data: [0x02, 0x1B, 0x00, 0xFF],
        },
        WriteConfig {
            to,
            offset: 8,
            data: [1, 2, 3, 4],
        },
        AckWriteConfig { to, offset: 8 },
        ReqState { to },
        State {
            to,
            state: DeviceState::Switch { on: true },
        },
        SetState {
            to,
            state: DeviceState::Dimmer { level: 200, ramp: 5 },
        },
        AckState {
            to,
            state: DeviceState::Shutter {
                position: 33,
                target: 100,
                motion: ShutterMotion::Closing,
            },
        },
        KeyEvent {
            to,
            key: 2,
            action: KeyAction::LongPress,
        },
        AckKeyEvent { to, key: 2 },
        ReqSensor { to, channel: 1 },
        SensorValue {
            to,
            channel: 1,
            value: 0x021B,
        },
        SensorEvent {
            to,
            channel: 1,
            level: 9,
        },
        AckSensorEvent { to, channel: 1 },
        ReqLinkStats { to },
        LinkStats {
            to,
            stats: LinkStatistics {
                collisions: 3,
                overruns: 0,
                checksum_errors: 1,
            },
        },
        EnterBoot { to, key: 0xB007 },
        AckEnterBoot { to },
        ReqFlashPage { to, page: 12 },
        FlashData {
            to,
            page: 12,
            seq: 2,
            data: [
                0x02, 0x1B, 0xFF, 0x00, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
            ],
        },
        AckFlashData {
            to,
            page: 12,
            seq: 2,
        },
        ExitBoot { to },
        AckExitBoot { to },
        ReqGroup { to },
        GroupInfo { to, group: 7 },
        SetGroup { to, group: 7 },
        AckGroup { to, group: 7 },
        Reset { to },
        AckReset { to },
        Ping { to, token: 0xAA },
        Pong { to, token: 0xAA },
        TimeSync {
            hour: 23,
            minute: 59,
        },
    ]
    .into_iter()
    .map(|msg| Telegram::new(addr(66), msg))
    .collect()
}

fn wire_frame(telegram: &Telegram) -> FrameBytes {
    let mut frame = FrameBytes::new();
    encode_frame(&telegram.to_bytes().unwrap(), &mut frame).unwrap();
    frame
}

fn decode(frame: &[u8]) -> Result<Option<Telegram>, DecodeError> {
    let mut decoder = TelegramDecoder::new();
    for byte in frame {
        if decoder.feed(*byte)? == Progress::Complete {
            return Ok(decoder.telegram().copied());
        }
    }
    Ok(None)
}

#[test]
fn round_trip_every_message_type() {
    init_logs();
    for telegram in samples() {
        let frame = wire_frame(&telegram);
        let decoded = decode(&frame).expect("decode failed");
        assert_eq!(decoded, Some(telegram));
    }
}

#[test]
fn no_literal_stx_after_the_delimiter() {
    for telegram in samples() {
        let frame = wire_frame(&telegram);
        assert_eq!(frame[0], STX);
        assert!(
            !frame[1..].contains(&STX),
            "unescaped STX in {:?}",
            telegram.msg_type()
        );
    }
}

#[test]
fn reserved_bytes_survive_stuffing() {
    // payload deliberately full of STX and ESC values, sender byte included
    let telegram = Telegram::new(
        addr(0x02),
        Message::ConfigData {
            to: addr(0x1B),
            offset: 0x02,
            data: [0x02, 0x1B, 0x1B, 0x02],
        },
    );
    let frame = wire_frame(&telegram);
    assert!(!frame[1..].contains(&STX));
    assert_eq!(decode(&frame).unwrap(), Some(telegram));
}

#[test]
fn concrete_scenario_bit_exact() {
    let telegram = Telegram::new(
        addr(66),
        Message::ReqSetAddr {
            to: addr(67),
            new_addr: addr(0x56),
        },
    );
    // logical bytes and checksum exactly as on the wire
    assert_eq!(
        telegram.to_bytes().unwrap().as_slice(),
        &[66, 0x04, 67, 0x56]
    );
    let frame = wire_frame(&telegram);
    let sum = (0x55u16 + 0x02 + 66 + 0x04 + 67 + 0x56) % 256;
    assert_eq!(frame.as_slice(), &[STX, 66, 0x04, 67, 0x56, sum as u8]);
    assert_eq!(decode(&frame).unwrap(), Some(telegram));
}

#[test]
fn single_bit_flips_never_decode() {
    let telegram = Telegram::new(
        addr(66),
        Message::ReqSetAddr {
            to: addr(67),
            new_addr: addr(0x56),
        },
    );
    let frame = wire_frame(&telegram);
    for index in 0..frame.len() {
        for bit in 0..8 {
            let mut corrupted = frame.clone();
            corrupted[index] ^= 1 << bit;
            let result = decode(&corrupted);
            assert!(
                !matches!(result, Ok(Some(_))),
                "flip of bit {} in byte {} decoded silently",
                bit,
                index
            );
        }
    }
}

#[test]
fn variable_length_stalls_until_discriminant_resolves() {
    let telegram = Telegram::new(
        addr(5),
        Message::State {
            to: addr(6),
            state: DeviceState::Temperature { centi_celsius: -40 },
        },
    );
    let frame = wire_frame(&telegram);
    let mut decoder = TelegramDecoder::new();
    for byte in &frame[..frame.len() - 1] {
        assert_eq!(decoder.feed(*byte), Ok(Progress::InProgress));
    }
    assert_eq!(
        decoder.feed(frame[frame.len() - 1]),
        Ok(Progress::Complete)
    );
    assert_eq!(decoder.telegram(), Some(&telegram));
}

#[test]
fn unknown_discriminant_errors_instead_of_hanging() {
    // raw logical bytes with a device kind no catalog entry knows
    let logical = [5, 0x0D, 6, 0x7F, 0, 0];
    let mut frame = FrameBytes::new();
    encode_frame(&logical, &mut frame).unwrap();

    let mut decoder = TelegramDecoder::new();
    let mut outcome = None;
    for byte in &frame {
        match decoder.feed(*byte) {
            Ok(Progress::Complete) => panic!("corrupt frame decoded"),
            Ok(_) => {}
            Err(error) => {
                outcome = Some(error);
                break;
            }
        }
    }
    assert_eq!(
        outcome,
        Some(DecodeError::UnknownDiscriminant { value: 0x7F })
    );
}

#[test]
fn round_trip_over_the_simulated_wire() {
    init_logs();
    let mut wire = Wire::new(vec![BusStack::new(11), BusStack::new(22)]);
    for telegram in samples() {
        let now = wire.now();
        wire.ports[0].send(&telegram, now).unwrap();

        let mut sent = false;
        let mut received = None;
        for _ in 0..100 {
            let events = wire.step();
            if events[0] == Some(ChannelEvent::TxDone) {
                sent = true;
            }
            if wire.ports[1].check() == Status::Complete {
                received = wire.ports[1].telegram().copied();
            }
            if sent && received.is_some() {
                break;
            }
        }
        assert_eq!(received, Some(telegram));

        // quiet gap so the receiver's channel returns to idle
        for _ in 0..8 {
            wire.step();
        }
    }
}

#[test]
fn checksum_error_is_reported_once_then_absorbed() {
    let telegram = Telegram::new(addr(9), Message::Startup);
    let mut frame = wire_frame(&telegram);
    let last = frame.len() - 1;
    frame[last] = frame[last].wrapping_add(1);

    let mut rx = BusStack::new(2);
    rx.on_start_edge(millis(0));
    for byte in &frame {
        rx.on_byte_received(*byte, millis(0));
    }
    assert_eq!(rx.check(), Status::ChecksumError);
    assert_eq!(rx.stats().checksum_errors, 1);
    assert_eq!(rx.check(), Status::NoMessage);

    // the next clean frame decodes
    let clean = wire_frame(&telegram);
    for byte in &clean {
        rx.on_byte_received(*byte, millis(1));
    }
    assert_eq!(rx.check(), Status::Complete);
    assert_eq!(rx.telegram(), Some(&telegram));
}
