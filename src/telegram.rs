//! Telegram data model and the static size catalog.
//!
//! A [`Telegram`] is one application-level bus message: the sender address
//! plus a typed [`Message`]. On the wire the logical bytes are
//! `[sender, type, body...]`; all but the broadcast types carry the receiver
//! address as the first body byte.
//!
//! The catalog maps each type byte to a [`SizeRule`] so the decoder can infer
//! the frame end without a length byte on the wire. It is indexed at
//! `type.wrapping_add(1)`: the sentinel type `0xFF` wraps to index 0, which
//! is the address-less [`Message::Startup`] broadcast.

use arrayvec::ArrayVec;

use crate::types::{Address, SendError};

/// Upper bound on the logical length of a telegram (sender, type and body,
/// without framing). The bus is designed for small telegrams.
pub const MAX_TELEGRAM_LEN: usize = 150;

/// Buffer holding the logical bytes of one telegram.
pub type TelegramBytes = ArrayVec<u8, MAX_TELEGRAM_LEN>;

/// Offset of the device-kind discriminant inside the logical bytes of the
/// variable-length state telegrams: sender, type, receiver, kind.
pub(crate) const STATE_KIND_OFFSET: u8 = 3;

/// Message type codes as they appear on the wire.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum MsgType {
    Startup = 0xFF,
    ReqDeviceType = 0x00,
    DeviceTypeInfo = 0x01,
    ReqSwVersion = 0x02,
    SwVersion = 0x03,
    ReqSetAddr = 0x04,
    AckSetAddr = 0x05,
    ReqSerial = 0x06,
    SerialInfo = 0x07,
    ReqConfig = 0x08,
    ConfigData = 0x09,
    WriteConfig = 0x0A,
    AckWriteConfig = 0x0B,
    ReqState = 0x0C,
    State = 0x0D,
    SetState = 0x0E,
    AckState = 0x0F,
    KeyEvent = 0x10,
    AckKeyEvent = 0x11,
    ReqSensor = 0x12,
    SensorValue = 0x13,
    SensorEvent = 0x14,
    AckSensorEvent = 0x15,
    ReqLinkStats = 0x16,
    LinkStats = 0x17,
    EnterBoot = 0x18,
    AckEnterBoot = 0x19,
    ReqFlashPage = 0x1A,
    FlashData = 0x1B,
    AckFlashData = 0x1C,
    ExitBoot = 0x1D,
    AckExitBoot = 0x1E,
    ReqGroup = 0x1F,
    GroupInfo = 0x20,
    SetGroup = 0x21,
    AckGroup = 0x22,
    Reset = 0x23,
    AckReset = 0x24,
    Ping = 0x25,
    Pong = 0x26,
    TimeSync = 0x27,
}

impl MsgType {
    /// The wire byte of this message type.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire type byte.
    pub fn from_byte(byte: u8) -> Option<MsgType> {
        use MsgType::*;
        Some(match byte {
            0xFF => Startup,
            0x00 => ReqDeviceType,
            0x01 => DeviceTypeInfo,
            0x02 => ReqSwVersion,
            0x03 => SwVersion,
            0x04 => ReqSetAddr,
            0x05 => AckSetAddr,
            0x06 => ReqSerial,
            0x07 => SerialInfo,
            0x08 => ReqConfig,
            0x09 => ConfigData,
            0x0A => WriteConfig,
            0x0B => AckWriteConfig,
            0x0C => ReqState,
            0x0D => State,
            0x0E => SetState,
            0x0F => AckState,
            0x10 => KeyEvent,
            0x11 => AckKeyEvent,
            0x12 => ReqSensor,
            0x13 => SensorValue,
            0x14 => SensorEvent,
            0x15 => AckSensorEvent,
            0x16 => ReqLinkStats,
            0x17 => LinkStats,
            0x18 => EnterBoot,
            0x19 => AckEnterBoot,
            0x1A => ReqFlashPage,
            0x1B => FlashData,
            0x1C => AckFlashData,
            0x1D => ExitBoot,
            0x1E => AckExitBoot,
            0x1F => ReqGroup,
            0x20 => GroupInfo,
            0x21 => SetGroup,
            0x22 => AckGroup,
            0x23 => Reset,
            0x24 => AckReset,
            0x25 => Ping,
            0x26 => Pong,
            0x27 => TimeSync,
            _ => return None,
        })
    }
}

/// Device kind discriminant used by the variable-length state telegrams.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum DeviceKind {
    Switch = 0x01,
    Dimmer = 0x02,
    Shutter = 0x03,
    KeyPad = 0x04,
    Temperature = 0x05,
    Brightness = 0x06,
    Wind = 0x07,
}

impl DeviceKind {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<DeviceKind> {
        use DeviceKind::*;
        Some(match byte {
            0x01 => Switch,
            0x02 => Dimmer,
            0x03 => Shutter,
            0x04 => KeyPad,
            0x05 => Temperature,
            0x06 => Brightness,
            0x07 => Wind,
            _ => return None,
        })
    }
}

/// Shutter drive state.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum ShutterMotion {
    Stopped = 0x00,
    Opening = 0x01,
    Closing = 0x02,
}

impl ShutterMotion {
    pub fn from_byte(byte: u8) -> Option<ShutterMotion> {
        Some(match byte {
            0x00 => ShutterMotion::Stopped,
            0x01 => ShutterMotion::Opening,
            0x02 => ShutterMotion::Closing,
            _ => return None,
        })
    }
}

/// Key transition reported by a [`Message::KeyEvent`].
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum KeyAction {
    Released = 0x00,
    Pressed = 0x01,
    LongPress = 0x02,
}

impl KeyAction {
    pub fn from_byte(byte: u8) -> Option<KeyAction> {
        Some(match byte {
            0x00 => KeyAction::Released,
            0x01 => KeyAction::Pressed,
            0x02 => KeyAction::LongPress,
            _ => return None,
        })
    }
}

/// The device-typed state payload of the `State`/`SetState`/`AckState`
/// telegrams. The first body byte is the [`DeviceKind`] discriminant that
/// resolves the total telegram length via the catalog.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum DeviceState {
    Switch { on: bool },
    Dimmer { level: u8, ramp: u8 },
    Shutter { position: u8, target: u8, motion: ShutterMotion },
    KeyPad { keys: u8 },
    Temperature { centi_celsius: i16 },
    Brightness { lux: u16 },
    Wind { dm_per_s: u16 },
}

impl DeviceState {
    pub const fn kind(&self) -> DeviceKind {
        match self {
            DeviceState::Switch { .. } => DeviceKind::Switch,
            DeviceState::Dimmer { .. } => DeviceKind::Dimmer,
            DeviceState::Shutter { .. } => DeviceKind::Shutter,
            DeviceState::KeyPad { .. } => DeviceKind::KeyPad,
            DeviceState::Temperature { .. } => DeviceKind::Temperature,
            DeviceState::Brightness { .. } => DeviceKind::Brightness,
            DeviceState::Wind { .. } => DeviceKind::Wind,
        }
    }

    fn push_bytes(&self, out: &mut TelegramBytes) -> Result<(), SendError> {
        push(out, self.kind().code())?;
        match *self {
            DeviceState::Switch { on } => push(out, on as u8),
            DeviceState::Dimmer { level, ramp } => {
                push(out, level)?;
                push(out, ramp)
            }
            DeviceState::Shutter {
                position,
                target,
                motion,
            } => {
                push(out, position)?;
                push(out, target)?;
                push(out, motion as u8)
            }
            DeviceState::KeyPad { keys } => push(out, keys),
            DeviceState::Temperature { centi_celsius } => push_slice(out, &centi_celsius.to_be_bytes()),
            DeviceState::Brightness { lux } => push_slice(out, &lux.to_be_bytes()),
            DeviceState::Wind { dm_per_s } => push_slice(out, &dm_per_s.to_be_bytes()),
        }
    }
}

/// Link-layer diagnostic counters, the payload of [`Message::LinkStats`].
/// The counters wrap at 255, matching their one-byte wire representation.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Default)]
pub struct LinkStatistics {
    pub collisions: u8,
    pub overruns: u8,
    pub checksum_errors: u8,
}

/// The typed body of a telegram. All variants except the broadcasts
/// (`Startup`, `TimeSync`) carry the receiver address.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Message {
    /// Sent once after power-up, before the node has anything to say.
    Startup,
    ReqDeviceType { to: Address },
    DeviceTypeInfo { to: Address, kind: DeviceKind },
    ReqSwVersion { to: Address },
    SwVersion { to: Address, major: u8, minor: u8 },
    ReqSetAddr { to: Address, new_addr: Address },
    AckSetAddr { to: Address },
    ReqSerial { to: Address },
    SerialInfo { to: Address, serial: [u8; 4] },
    ReqConfig { to: Address, offset: u8 },
    ConfigData { to: Address, offset: u8, data: [u8; 4] },
    WriteConfig { to: Address, offset: u8, data: [u8; 4] },
    AckWriteConfig { to: Address, offset: u8 },
    ReqState { to: Address },
    State { to: Address, state: DeviceState },
    SetState { to: Address, state: DeviceState },
    AckState { to: Address, state: DeviceState },
    KeyEvent { to: Address, key: u8, action: KeyAction },
    AckKeyEvent { to: Address, key: u8 },
    ReqSensor { to: Address, channel: u8 },
    SensorValue { to: Address, channel: u8, value: u16 },
    SensorEvent { to: Address, channel: u8, level: u8 },
    AckSensorEvent { to: Address, channel: u8 },
    ReqLinkStats { to: Address },
    LinkStats { to: Address, stats: LinkStatistics },
    EnterBoot { to: Address, key: u16 },
    AckEnterBoot { to: Address },
    ReqFlashPage { to: Address, page: u8 },
    FlashData { to: Address, page: u8, seq: u8, data: [u8; 16] },
    AckFlashData { to: Address, page: u8, seq: u8 },
    ExitBoot { to: Address },
    AckExitBoot { to: Address },
    ReqGroup { to: Address },
    GroupInfo { to: Address, group: u8 },
    SetGroup { to: Address, group: u8 },
    AckGroup { to: Address, group: u8 },
    Reset { to: Address },
    AckReset { to: Address },
    Ping { to: Address, token: u8 },
    Pong { to: Address, token: u8 },
    TimeSync { hour: u8, minute: u8 },
}

impl Message {
    /// The wire type of this message.
    pub fn msg_type(&self) -> MsgType {
        use Message::*;
        match self {
            Startup => MsgType::Startup,
            ReqDeviceType { .. } => MsgType::ReqDeviceType,
            DeviceTypeInfo { .. } => MsgType::DeviceTypeInfo,
            ReqSwVersion { .. } => MsgType::ReqSwVersion,
            SwVersion { .. } => MsgType::SwVersion,
            ReqSetAddr { .. } => MsgType::ReqSetAddr,
            AckSetAddr { .. } => MsgType::AckSetAddr,
            ReqSerial { .. } => MsgType::ReqSerial,
            SerialInfo { .. } => MsgType::SerialInfo,
            ReqConfig { .. } => MsgType::ReqConfig,
            ConfigData { .. } => MsgType::ConfigData,
            WriteConfig { .. } => MsgType::WriteConfig,
            AckWriteConfig { .. } => MsgType::AckWriteConfig,
            ReqState { .. } => MsgType::ReqState,
            State { .. } => MsgType::State,
            SetState { .. } => MsgType::SetState,
            AckState { .. } => MsgType::AckState,
            KeyEvent { .. } => MsgType::KeyEvent,
            AckKeyEvent { .. } => MsgType::AckKeyEvent,
            ReqSensor { .. } => MsgType::ReqSensor,
            SensorValue { .. } => MsgType::SensorValue,
            SensorEvent { .. } => MsgType::SensorEvent,
            AckSensorEvent { .. } => MsgType::AckSensorEvent,
            ReqLinkStats { .. } => MsgType::ReqLinkStats,
            LinkStats { .. } => MsgType::LinkStats,
            EnterBoot { .. } => MsgType::EnterBoot,
            AckEnterBoot { .. } => MsgType::AckEnterBoot,
            ReqFlashPage { .. } => MsgType::ReqFlashPage,
            FlashData { .. } => MsgType::FlashData,
            AckFlashData { .. } => MsgType::AckFlashData,
            ExitBoot { .. } => MsgType::ExitBoot,
            AckExitBoot { .. } => MsgType::AckExitBoot,
            ReqGroup { .. } => MsgType::ReqGroup,
            GroupInfo { .. } => MsgType::GroupInfo,
            SetGroup { .. } => MsgType::SetGroup,
            AckGroup { .. } => MsgType::AckGroup,
            Reset { .. } => MsgType::Reset,
            AckReset { .. } => MsgType::AckReset,
            Ping { .. } => MsgType::Ping,
            Pong { .. } => MsgType::Pong,
            TimeSync { .. } => MsgType::TimeSync,
        }
    }

    /// The receiver address, or `None` for the broadcast types.
    pub fn receiver(&self) -> Option<Address> {
        use Message::*;
        match *self {
            Startup | TimeSync { .. } => None,
            ReqDeviceType { to }
            | DeviceTypeInfo { to, .. }
            | ReqSwVersion { to }
            | SwVersion { to, .. }
            | ReqSetAddr { to, .. }
            | AckSetAddr { to }
            | ReqSerial { to }
            | SerialInfo { to, .. }
            | ReqConfig { to, .. }
            | ConfigData { to, .. }
            | WriteConfig { to, .. }
            | AckWriteConfig { to, .. }
            | ReqState { to }
            | State { to, .. }
            | SetState { to, .. }
            | AckState { to, .. }
            | KeyEvent { to, .. }
            | AckKeyEvent { to, .. }
            | ReqSensor { to, .. }
            | SensorValue { to, .. }
            | SensorEvent { to, .. }
            | AckSensorEvent { to, .. }
            | ReqLinkStats { to }
            | LinkStats { to, .. }
            | EnterBoot { to, .. }
            | AckEnterBoot { to }
            | ReqFlashPage { to, .. }
            | FlashData { to, .. }
            | AckFlashData { to, .. }
            | ExitBoot { to }
            | AckExitBoot { to }
            | ReqGroup { to }
            | GroupInfo { to, .. }
            | SetGroup { to, .. }
            | AckGroup { to, .. }
            | Reset { to }
            | AckReset { to }
            | Ping { to, .. }
            | Pong { to, .. } => Some(to),
        }
    }

    fn push_body(&self, out: &mut TelegramBytes) -> Result<(), SendError> {
        use Message::*;
        if let Some(to) = self.receiver() {
            push(out, to.to_byte())?;
        }
        match *self {
            Startup => Ok(()),
            ReqDeviceType { .. }
            | ReqSwVersion { .. }
            | AckSetAddr { .. }
            | ReqSerial { .. }
            | ReqState { .. }
            | ReqLinkStats { .. }
            | AckEnterBoot { .. }
            | ExitBoot { .. }
            | AckExitBoot { .. }
            | ReqGroup { .. }
            | Reset { .. }
            | AckReset { .. } => Ok(()),
            DeviceTypeInfo { kind, .. } => push(out, kind.code()),
            SwVersion { major, minor, .. } => {
                push(out, major)?;
                push(out, minor)
            }
            ReqSetAddr { new_addr, .. } => push(out, new_addr.to_byte()),
            SerialInfo { serial, .. } => push_slice(out, &serial),
            ReqConfig { offset, .. } => push(out, offset),
            ConfigData { offset, data, .. } | WriteConfig { offset, data, .. } => {
                push(out, offset)?;
                push_slice(out, &data)
            }
            AckWriteConfig { offset, .. } => push(out, offset),
            State { state, .. } | SetState { state, .. } | AckState { state, .. } => {
                state.push_bytes(out)
            }
            KeyEvent { key, action, .. } => {
                push(out, key)?;
                push(out, action as u8)
            }
            AckKeyEvent { key, .. } => push(out, key),
            ReqSensor { channel, .. } => push(out, channel),
            SensorValue { channel, value, .. } => {
                push(out, channel)?;
                push_slice(out, &value.to_be_bytes())
            }
            SensorEvent { channel, level, .. } => {
                push(out, channel)?;
                push(out, level)
            }
            AckSensorEvent { channel, .. } => push(out, channel),
            LinkStats { stats, .. } => {
                push(out, stats.collisions)?;
                push(out, stats.overruns)?;
                push(out, stats.checksum_errors)
            }
            EnterBoot { key, .. } => push_slice(out, &key.to_be_bytes()),
            ReqFlashPage { page, .. } => push(out, page),
            FlashData { page, seq, data, .. } => {
                push(out, page)?;
                push(out, seq)?;
                push_slice(out, &data)
            }
            AckFlashData { page, seq, .. } => {
                push(out, page)?;
                push(out, seq)
            }
            GroupInfo { group, .. } | SetGroup { group, .. } | AckGroup { group, .. } => {
                push(out, group)
            }
            Ping { token, .. } | Pong { token, .. } => push(out, token),
            TimeSync { hour, minute } => {
                push(out, hour)?;
                push(out, minute)
            }
        }
    }
}

/// One application-level bus message.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct Telegram {
    pub sender: Address,
    pub msg: Message,
}

impl Telegram {
    pub fn new(sender: Address, msg: Message) -> Telegram {
        Telegram { sender, msg }
    }

    /// The wire type of this telegram.
    pub fn msg_type(&self) -> MsgType {
        self.msg.msg_type()
    }

    /// Serialize into logical bytes (unframed, unstuffed) and cross-check
    /// the result against the catalog entry for the type. A disagreement
    /// means the catalog and the message definitions have drifted apart.
    pub fn to_bytes(&self) -> Result<TelegramBytes, SendError> {
        let mut out = TelegramBytes::new();
        push(&mut out, self.sender.to_byte())?;
        push(&mut out, self.msg_type().code())?;
        self.msg.push_body(&mut out)?;

        let rule = size_rule(self.msg_type().code()).ok_or(SendError::UnknownType)?;
        match rule.resolve(&out) {
            Some(len) if len == out.len() => Ok(out),
            Some(_) => Err(SendError::BadLength),
            None => Err(SendError::UnresolvedLength),
        }
    }
}

fn push(out: &mut TelegramBytes, byte: u8) -> Result<(), SendError> {
    out.try_push(byte).map_err(|_| SendError::FrameTooLong)
}

fn push_slice(out: &mut TelegramBytes, bytes: &[u8]) -> Result<(), SendError> {
    out.try_extend_from_slice(bytes)
        .map_err(|_| SendError::FrameTooLong)
}

/// How the total logical length of a telegram is determined.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SizeRule {
    /// The type alone determines the length.
    Fixed(u8),
    /// The byte at `offset` selects the length from the table.
    Variable {
        offset: u8,
        lengths: &'static [(u8, u8)],
    },
}

impl SizeRule {
    /// Resolve the total length against (a prefix of) the logical bytes.
    /// `None` if a variable rule's discriminant is missing or unknown.
    pub(crate) fn resolve(&self, bytes: &[u8]) -> Option<usize> {
        match self {
            SizeRule::Fixed(len) => Some(*len as usize),
            SizeRule::Variable { offset, lengths } => {
                let discriminant = bytes.get(*offset as usize)?;
                lengths
                    .iter()
                    .find(|(kind, _)| kind == discriminant)
                    .map(|(_, len)| *len as usize)
            }
        }
    }
}

/// Length table shared by the three device-state telegram types, keyed on
/// the [`DeviceKind`] discriminant.
const STATE_LENGTHS: [(u8, u8); 7] = [
    (0x01, 5), // Switch
    (0x02, 6), // Dimmer
    (0x03, 7), // Shutter
    (0x04, 5), // KeyPad
    (0x05, 6), // Temperature
    (0x06, 6), // Brightness
    (0x07, 6), // Wind
];

const STATE_RULE: SizeRule = SizeRule::Variable {
    offset: STATE_KIND_OFFSET,
    lengths: &STATE_LENGTHS,
};

/// The telegram catalog, indexed at `type.wrapping_add(1)`. Entry 0 is the
/// sentinel `Startup` type `0xFF`.
static CATALOG: [SizeRule; 41] = [
    SizeRule::Fixed(2),  // 0xFF Startup
    SizeRule::Fixed(3),  // 0x00 ReqDeviceType
    SizeRule::Fixed(4),  // 0x01 DeviceTypeInfo
    SizeRule::Fixed(3),  // 0x02 ReqSwVersion
    SizeRule::Fixed(5),  // 0x03 SwVersion
    SizeRule::Fixed(4),  // 0x04 ReqSetAddr
    SizeRule::Fixed(3),  // 0x05 AckSetAddr
    SizeRule::Fixed(3),  // 0x06 ReqSerial
    SizeRule::Fixed(7),  // 0x07 SerialInfo
    SizeRule::Fixed(4),  // 0x08 ReqConfig
    SizeRule::Fixed(8),  // 0x09 ConfigData
    SizeRule::Fixed(8),  // 0x0A WriteConfig
    SizeRule::Fixed(4),  // 0x0B AckWriteConfig
    SizeRule::Fixed(3),  // 0x0C ReqState
    STATE_RULE,          // 0x0D State
    STATE_RULE,          // 0x0E SetState
    STATE_RULE,          // 0x0F AckState
    SizeRule::Fixed(5),  // 0x10 KeyEvent
    SizeRule::Fixed(4),  // 0x11 AckKeyEvent
    SizeRule::Fixed(4),  // 0x12 ReqSensor
    SizeRule::Fixed(6),  // 0x13 SensorValue
    SizeRule::Fixed(5),  // 0x14 SensorEvent
    SizeRule::Fixed(4),  // 0x15 AckSensorEvent
    SizeRule::Fixed(3),  // 0x16 ReqLinkStats
    SizeRule::Fixed(6),  // 0x17 LinkStats
    SizeRule::Fixed(5),  // 0x18 EnterBoot
    SizeRule::Fixed(3),  // 0x19 AckEnterBoot
    SizeRule::Fixed(4),  // 0x1A ReqFlashPage
    SizeRule::Fixed(21), // 0x1B FlashData
    SizeRule::Fixed(5),  // 0x1C AckFlashData
    SizeRule::Fixed(3),  // 0x1D ExitBoot
    SizeRule::Fixed(3),  // 0x1E AckExitBoot
    SizeRule::Fixed(3),  // 0x1F ReqGroup
    SizeRule::Fixed(4),  // 0x20 GroupInfo
    SizeRule::Fixed(4),  // 0x21 SetGroup
    SizeRule::Fixed(4),  // 0x22 AckGroup
    SizeRule::Fixed(3),  // 0x23 Reset
    SizeRule::Fixed(3),  // 0x24 AckReset
    SizeRule::Fixed(4),  // 0x25 Ping
    SizeRule::Fixed(4),  // 0x26 Pong
    SizeRule::Fixed(4),  // 0x27 TimeSync
];

/// Catalog lookup for a wire type byte. The sentinel type `0xFF` wraps to
/// index 0; bytes past the catalog end have no entry.
pub(crate) fn size_rule(type_byte: u8) -> Option<&'static SizeRule> {
    CATALOG.get(type_byte.wrapping_add(1) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::addr;

    #[test]
    fn test_type_codes_round_trip() {
        for code in (0x00..=0x27).chain([0xFFu8]) {
            let t = MsgType::from_byte(code).expect("catalogued type");
            assert_eq!(t.code(), code);
            assert!(size_rule(code).is_some());
        }
    }

    #[test]
    fn test_unknown_type_codes() {
        for code in 0x28..=0xFE {
            assert_eq!(MsgType::from_byte(code), None);
            assert!(size_rule(code).is_none());
        }
    }

    #[test]
    fn test_startup_wraps_to_catalog_start() {
        assert_eq!(size_rule(0xFF), Some(&SizeRule::Fixed(2)));
    }

    #[test]
    fn test_fixed_serialization() {
        let t = Telegram::new(
            addr(66),
            Message::ReqSetAddr {
                to: addr(67),
                new_addr: addr(0x56),
            },
        );
        assert_eq!(t.to_bytes().unwrap().as_slice(), &[66, 0x04, 67, 0x56]);

        let t = Telegram::new(addr(9), Message::Startup);
        assert_eq!(t.to_bytes().unwrap().as_slice(), &[9, 0xFF]);
    }

    #[test]
    fn test_variable_serialization_matches_table() {
        let states = [
            DeviceState::Switch { on: true },
            DeviceState::Dimmer { level: 128, ramp: 3 },
            DeviceState::Shutter {
                position: 10,
                target: 90,
                motion: ShutterMotion::Opening,
            },
            DeviceState::KeyPad { keys: 0b101 },
            DeviceState::Temperature { centi_celsius: -125 },
            DeviceState::Brightness { lux: 5000 },
            DeviceState::Wind { dm_per_s: 88 },
        ];
        for state in states {
            let t = Telegram::new(addr(1), Message::State { to: addr(2), state });
            let bytes = t.to_bytes().unwrap();
            assert_eq!(bytes[STATE_KIND_OFFSET as usize], state.kind().code());
            let expected = STATE_LENGTHS
                .iter()
                .find(|(kind, _)| *kind == state.kind().code())
                .unwrap()
                .1;
            assert_eq!(bytes.len(), expected as usize);
        }
    }

    #[test]
    fn test_resolve_missing_discriminant() {
        // discriminant byte not yet received
        assert_eq!(STATE_RULE.resolve(&[1, 0x0D, 2]), None);
        // unknown device kind
        assert_eq!(STATE_RULE.resolve(&[1, 0x0D, 2, 0x7F]), None);
        // known device kind
        assert_eq!(STATE_RULE.resolve(&[1, 0x0D, 2, 0x03]), Some(7));
    }
}
