//! Control datagram codec
//!
//! Every datagram starts with a 7-byte common header:
//!
//! ```text
//! [0..4]  "FPPD"
//! [4]     packet type (0x01 MultiSync, 0x03 Blank, 0x04 Ping)
//! [5..7]  data length, little-endian
//! ```
//!
//! Received lengths are checked before any field is read; nothing here
//! assumes a datagram is as large as the biggest packet layout.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::net::Ipv4Addr;

use crate::error::ProtocolError;

pub const PACKET_TAG: &[u8; 4] = b"FPPD";

/// Tag + type + data length
pub const COMMON_HEADER_SIZE: usize = 7;

/// Common header + action, sync type, frame number, seconds elapsed
pub const MULTISYNC_FIXED_SIZE: usize = 17;

/// Longest filename carried by a MultiSync packet
pub const MAX_FILENAME_LEN: usize = 250;

/// Common header + ping version + subtype
pub const PING_REQUEST_MIN_SIZE: usize = 9;

/// Size of an encoded ping descriptor
pub const PING_PACKET_SIZE: usize = 301;

const PING_DATA_LEN: u16 = 294;
const PING_VERSION: u8 = 0x03;
const HOSTNAME_FIELD: usize = 65;
const VERSION_FIELD: usize = 41;
const HARDWARE_FIELD: usize = 41;
const RANGES_FIELD: usize = 121;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    MultiSync = 0x01,
    Blank = 0x03,
    Ping = 0x04,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(PacketType::MultiSync),
            0x03 => Some(PacketType::Blank),
            0x04 => Some(PacketType::Ping),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncAction {
    Start = 0x00,
    Stop = 0x01,
    Sync = 0x02,
    Open = 0x03,
}

impl SyncAction {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(SyncAction::Start),
            0x01 => Some(SyncAction::Stop),
            0x02 => Some(SyncAction::Sync),
            0x03 => Some(SyncAction::Open),
            _ => None,
        }
    }
}

/// Sync target type for sequence files; media sync uses other values
pub const SYNC_TYPE_SEQUENCE: u8 = 0x00;

/// Ping subtype asking every device to announce itself
pub const PING_SUBTYPE_DISCOVER: u8 = 0x01;

/// Ping subtype of an announcement
pub const PING_SUBTYPE_ANNOUNCE: u8 = 0x00;

/// What the device reports it can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum OperatingMode {
    /// Forwards externally driven channel data; remote playback disabled
    Bridge = 0x01,
    /// Plays sequences under a leader's control
    Remote = 0x08,
}

impl OperatingMode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            OperatingMode::Bridge => "bridge",
            OperatingMode::Remote => "remote",
        }
    }
}

/// Start/stop/sync/open instruction from a leader
#[derive(Debug, Clone, PartialEq)]
pub struct MultiSyncPacket {
    pub action: SyncAction,
    pub sync_type: u8,
    pub frame: u32,
    pub seconds_elapsed: f32,
    pub filename: String,
}

/// Inbound ping; only the fields needed to answer it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
    pub version: u8,
    pub subtype: u8,
}

impl PingRequest {
    pub fn is_discover(&self) -> bool {
        self.subtype == PING_SUBTYPE_DISCOVER
    }
}

/// A decoded control datagram
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    MultiSync(MultiSyncPacket),
    Blank,
    Ping(PingRequest),
}

impl Packet {
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        require(data, COMMON_HEADER_SIZE, "control")?;

        let mut buf = data;
        if &buf[..4] != PACKET_TAG {
            return Err(ProtocolError::BadTag);
        }
        buf.advance(4);

        let raw_type = buf.get_u8();
        let declared = COMMON_HEADER_SIZE + usize::from(buf.get_u16_le());
        if declared > data.len() {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: data.len(),
            });
        }

        match PacketType::from_u8(raw_type) {
            Some(PacketType::MultiSync) => decode_multisync(data).map(Packet::MultiSync),
            Some(PacketType::Ping) => {
                require(data, PING_REQUEST_MIN_SIZE, "ping")?;
                Ok(Packet::Ping(PingRequest {
                    version: buf.get_u8(),
                    subtype: buf.get_u8(),
                }))
            }
            Some(PacketType::Blank) => Ok(Packet::Blank),
            None => Err(ProtocolError::UnknownPacketType(raw_type)),
        }
    }
}

fn require(data: &[u8], expected: usize, kind: &'static str) -> Result<(), ProtocolError> {
    if data.len() < expected {
        return Err(ProtocolError::Truncated {
            kind,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn decode_multisync(data: &[u8]) -> Result<MultiSyncPacket, ProtocolError> {
    require(data, MULTISYNC_FIXED_SIZE, "multisync")?;

    let mut buf = &data[COMMON_HEADER_SIZE..];
    let raw_action = buf.get_u8();
    let action =
        SyncAction::from_u8(raw_action).ok_or(ProtocolError::UnknownSyncAction(raw_action))?;
    let sync_type = buf.get_u8();
    let frame = buf.get_u32_le();
    let seconds_elapsed = buf.get_f32_le();

    let name_field = &buf[..buf.len().min(MAX_FILENAME_LEN)];
    Ok(MultiSyncPacket {
        action,
        sync_type,
        frame,
        seconds_elapsed,
        filename: c_string(name_field),
    })
}

/// Text up to the first NUL
fn c_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Write `text` into a fixed NUL-padded field, always leaving a terminator
fn put_c_string(buf: &mut BytesMut, text: &str, field: usize) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(field - 1);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, field - n);
}

/// The descriptor a device sends in answer to discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingDescriptor {
    pub subtype: u8,
    pub hardware_type: u8,
    pub version_major: u16,
    pub version_minor: u16,
    pub mode: OperatingMode,
    pub ip: Ipv4Addr,
    pub hostname: String,
    /// Full version text, e.g. `"4.1:2024-03-01"`
    pub version: String,
    pub hardware_variant: String,
}

impl PingDescriptor {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PING_PACKET_SIZE);
        buf.put_slice(PACKET_TAG);
        buf.put_u8(PacketType::Ping as u8);
        buf.put_u16_le(PING_DATA_LEN);
        buf.put_u8(PING_VERSION);
        buf.put_u8(self.subtype);
        buf.put_u8(self.hardware_type);
        buf.put_u16(self.version_major);
        buf.put_u16(self.version_minor);
        buf.put_u8(self.mode.code());
        buf.put_slice(&self.ip.octets());
        put_c_string(&mut buf, &self.hostname, HOSTNAME_FIELD);
        put_c_string(&mut buf, &self.version, VERSION_FIELD);
        put_c_string(&mut buf, &self.hardware_variant, HARDWARE_FIELD);
        buf.put_bytes(0, RANGES_FIELD);
        buf.put_bytes(0, PING_PACKET_SIZE - buf.len());
        buf.freeze()
    }
}

/// Build a MultiSync datagram, as a leader would send it
pub fn encode_multisync(packet: &MultiSyncPacket) -> Bytes {
    let name = packet.filename.as_bytes();
    let name_len = name.len().min(MAX_FILENAME_LEN - 1);
    let data_len = MULTISYNC_FIXED_SIZE - COMMON_HEADER_SIZE + name_len + 1;

    let mut buf = BytesMut::with_capacity(COMMON_HEADER_SIZE + data_len);
    buf.put_slice(PACKET_TAG);
    buf.put_u8(PacketType::MultiSync as u8);
    buf.put_u16_le(data_len as u16);
    buf.put_u8(packet.action as u8);
    buf.put_u8(packet.sync_type);
    buf.put_u32_le(packet.frame);
    buf.put_f32_le(packet.seconds_elapsed);
    buf.put_slice(&name[..name_len]);
    buf.put_u8(0);
    buf.freeze()
}

/// Build a Blank datagram
pub fn encode_blank() -> Bytes {
    let mut buf = BytesMut::with_capacity(COMMON_HEADER_SIZE);
    buf.put_slice(PACKET_TAG);
    buf.put_u8(PacketType::Blank as u8);
    buf.put_u16_le(0);
    buf.freeze()
}

/// Build a discovery request
pub fn encode_discover() -> Bytes {
    let mut buf = BytesMut::with_capacity(PING_REQUEST_MIN_SIZE);
    buf.put_slice(PACKET_TAG);
    buf.put_u8(PacketType::Ping as u8);
    buf.put_u16_le(2);
    buf.put_u8(PING_VERSION);
    buf.put_u8(PING_SUBTYPE_DISCOVER);
    buf.freeze()
}
