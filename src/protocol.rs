use crate::codec::{u16_le, u32_le, u64_le};
use crate::{Result, XrealError};
use std::fmt;

// -- USB identifiers --
pub const VENDOR_ID: u16 = 0x3318;

// -- Packet geometry --
pub const IMU_HEAD: u8 = 0xAA;
pub const MCU_HEAD: u8 = 0xFD;
/// Every MCU report, push or reply, is this long.
pub const MCU_PACKET_SIZE: usize = 64;
const CHECKSUM_OFFSET: usize = 1;
const LENGTH_OFFSET: usize = 5;
const MCU_TIMESTAMP_OFFSET: usize = 7;

// -- IMU message ids --
pub const IMU_MSG_GET_CAL_DATA_LENGTH: u16 = 0x14;
pub const IMU_MSG_CAL_DATA_GET_NEXT_SEGMENT: u16 = 0x15;
pub const IMU_MSG_START_IMU_DATA: u16 = 0x19;
pub const IMU_MSG_GET_STATIC_ID: u16 = 0x1A;

// -- MCU requests --
pub const MCU_MSG_R_BRIGHTNESS: u16 = 0x03;
pub const MCU_MSG_R_DISP_MODE: u16 = 0x07;
pub const MCU_MSG_W_DISP_MODE: u16 = 0x08;
pub const MCU_MSG_R_DP7911_FW_VERSION: u16 = 0x16;
pub const MCU_MSG_R_DSP_APP_FW_VERSION: u16 = 0x21;
pub const MCU_MSG_R_MCU_APP_FW_VERSION: u16 = 0x26;
pub const MCU_MSG_R_ACTIVATION_TIME: u16 = 0x29;

// -- MCU pushes --
pub const MCU_MSG_P_START_HEARTBEAT: u16 = 0x6C02;
pub const MCU_MSG_P_DISPLAY_TOGGLED: u16 = 0x6C04;
pub const MCU_MSG_P_BUTTON_PRESSED: u16 = 0x6C05;
pub const MCU_MSG_P_ASYNC_TEXT_LOG: u16 = 0x6C09;
pub const MCU_MSG_P_END_HEARTBEAT: u16 = 0x6C12;

/// Length of the MCU firmware version strings, NUL padded.
pub const MCU_VERSION_LEN: usize = 41;

/// The two HID interfaces of the glasses, each with its own envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// `[0xAA, crc(4), len(2), msg_id(1), payload...]`
    Imu,
    /// `[0xFD, crc(4), len(2), timestamp(8), msg_id(2), reserved(5), payload...]`
    Controller,
}

impl Subsystem {
    /// Marker byte that starts every packet.
    pub const fn head(self) -> u8 {
        match self {
            Subsystem::Imu => IMU_HEAD,
            Subsystem::Controller => MCU_HEAD,
        }
    }

    /// Bytes in front of the payload.
    pub const fn header_len(self) -> usize {
        match self {
            Subsystem::Imu => 8,
            Subsystem::Controller => 22,
        }
    }

    const fn msg_id_offset(self) -> usize {
        match self {
            Subsystem::Imu => 7,
            Subsystem::Controller => 15,
        }
    }

    /// Largest payload that fits a packet of `max_packet_size` bytes.
    pub fn max_payload(self, max_packet_size: usize) -> usize {
        max_packet_size.saturating_sub(self.header_len())
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subsystem::Imu => f.write_str("IMU"),
            Subsystem::Controller => f.write_str("MCU"),
        }
    }
}

/// CRC-32 (IEEE) as computed by the glasses firmware.
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// A validated inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub msg_id: u16,
    /// Device timestamp, MCU packets only.
    pub timestamp: Option<u64>,
    pub payload: &'a [u8],
}

/// Build an outbound packet.
///
/// The length field counts from itself to the end of the payload and the
/// checksum covers the same range. Timestamp and reserved bytes stay zero.
pub fn build_envelope(subsystem: Subsystem, msg_id: u16, payload: &[u8]) -> Vec<u8> {
    encode(subsystem, msg_id, 0, payload)
}

/// Reject payloads that would not fit one `max_packet_size` packet.
pub fn check_payload(
    subsystem: Subsystem,
    msg_id: u16,
    payload: &[u8],
    max_packet_size: usize,
) -> Result<()> {
    let max = subsystem.max_payload(max_packet_size);
    if payload.len() > max {
        return Err(XrealError::PayloadTooLarge {
            msg_id,
            len: payload.len(),
            max,
        });
    }
    Ok(())
}

pub(crate) fn encode(subsystem: Subsystem, msg_id: u16, timestamp: u64, payload: &[u8]) -> Vec<u8> {
    let header_len = subsystem.header_len();
    let length = header_len - LENGTH_OFFSET + payload.len();
    debug_assert!(length <= u16::MAX as usize, "payload too large for envelope");

    let mut buf = vec![0u8; header_len + payload.len()];
    buf[0] = subsystem.head();
    buf[LENGTH_OFFSET..LENGTH_OFFSET + 2].copy_from_slice(&(length as u16).to_le_bytes());

    let id_offset = subsystem.msg_id_offset();
    match subsystem {
        Subsystem::Imu => buf[id_offset] = msg_id as u8,
        Subsystem::Controller => {
            buf[MCU_TIMESTAMP_OFFSET..MCU_TIMESTAMP_OFFSET + 8]
                .copy_from_slice(&timestamp.to_le_bytes());
            buf[id_offset..id_offset + 2].copy_from_slice(&msg_id.to_le_bytes());
        }
    }
    buf[header_len..].copy_from_slice(payload);

    let crc = checksum(&buf[LENGTH_OFFSET..]);
    buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Validate marker, length and checksum of an inbound packet.
///
/// Trailing bytes past the declared length (report padding) are ignored.
pub fn parse_envelope(subsystem: Subsystem, bytes: &[u8]) -> Result<Envelope<'_>> {
    let header_len = subsystem.header_len();
    if bytes.len() < header_len {
        return Err(XrealError::Malformed(format!(
            "{} packet too short: {} bytes",
            subsystem,
            bytes.len()
        )));
    }
    if bytes[0] != subsystem.head() {
        return Err(XrealError::Malformed(format!(
            "expected head 0x{:02x}, got 0x{:02x}",
            subsystem.head(),
            bytes[0]
        )));
    }

    let length = u16_le(bytes, LENGTH_OFFSET) as usize;
    let end = LENGTH_OFFSET + length;
    if end < header_len || end > bytes.len() {
        return Err(XrealError::Malformed(format!(
            "declared length {} does not fit {} byte packet",
            length,
            bytes.len()
        )));
    }

    let expected = u32_le(bytes, CHECKSUM_OFFSET);
    let actual = checksum(&bytes[LENGTH_OFFSET..end]);
    if expected != actual {
        return Err(XrealError::Malformed(format!(
            "checksum mismatch: packet 0x{:08x}, computed 0x{:08x}",
            expected, actual
        )));
    }

    let (msg_id, timestamp) = match subsystem {
        Subsystem::Imu => (bytes[subsystem.msg_id_offset()] as u16, None),
        Subsystem::Controller => (
            u16_le(bytes, subsystem.msg_id_offset()),
            Some(u64_le(bytes, MCU_TIMESTAMP_OFFSET)),
        ),
    };

    Ok(Envelope {
        msg_id,
        timestamp,
        payload: &bytes[header_len..end],
    })
}

/// Read the message id without validating the packet. Used for routing.
pub fn peek_msg_id(subsystem: Subsystem, bytes: &[u8]) -> Option<u16> {
    if bytes.len() < subsystem.header_len() || bytes[0] != subsystem.head() {
        return None;
    }
    Some(match subsystem {
        Subsystem::Imu => bytes[subsystem.msg_id_offset()] as u16,
        Subsystem::Controller => u16_le(bytes, subsystem.msg_id_offset()),
    })
}

/// MCU pushes all live in the 0x6Cxx range.
pub fn is_push_message(msg_id: u16) -> bool {
    msg_id & 0xFF00 == 0x6C00
}

/// Read the push timestamp of an MCU packet.
///
/// Only the low 32 bits of the 8-byte field are used for pushes.
pub(crate) fn push_timestamp(bytes: &[u8]) -> u32 {
    u32_le(bytes, MCU_TIMESTAMP_OFFSET)
}

/// Extract a null-terminated string from a byte slice.
pub fn extract_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_imu_envelope() {
        let buf = build_envelope(Subsystem::Imu, IMU_MSG_START_IMU_DATA, &[0x01]);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf[0], IMU_HEAD);
        assert_eq!(u16_le(&buf, 5), 4);
        assert_eq!(buf[7], 0x19);
        assert_eq!(buf[8], 0x01);
        assert_eq!(u32_le(&buf, 1), checksum(&buf[5..]));
    }

    #[test]
    fn test_build_controller_envelope() {
        let buf = build_envelope(Subsystem::Controller, MCU_MSG_W_DISP_MODE, &[3]);
        assert_eq!(buf.len(), 23);
        assert_eq!(buf[0], MCU_HEAD);
        assert_eq!(u16_le(&buf, 5), 18);
        assert!(buf[7..15].iter().all(|&b| b == 0));
        assert_eq!(u16_le(&buf, 15), MCU_MSG_W_DISP_MODE);
        assert!(buf[17..22].iter().all(|&b| b == 0));
        assert_eq!(buf[22], 3);
        assert_eq!(u32_le(&buf, 1), checksum(&buf[5..]));
    }

    #[test]
    fn test_parse_returns_built_fields() {
        let payload = b"calibration";
        for subsystem in [Subsystem::Imu, Subsystem::Controller] {
            let mut buf = build_envelope(subsystem, 0x15, payload);
            buf.resize(64, 0);
            let env = parse_envelope(subsystem, &buf).unwrap();
            assert_eq!(env.msg_id, 0x15);
            assert_eq!(env.payload, payload);
        }
    }

    #[test]
    fn test_parse_controller_timestamp() {
        let buf = encode(Subsystem::Controller, MCU_MSG_P_BUTTON_PRESSED, 0x1_0000_0005, &[]);
        let env = parse_envelope(Subsystem::Controller, &buf).unwrap();
        assert_eq!(env.timestamp, Some(0x1_0000_0005));
        assert_eq!(push_timestamp(&buf), 5);
    }

    #[test]
    fn test_parse_rejects_bad_packets() {
        let good = build_envelope(Subsystem::Imu, 0x1A, &[1, 2, 3, 4]);

        assert!(matches!(
            parse_envelope(Subsystem::Imu, &good[..6]),
            Err(XrealError::Malformed(_))
        ));

        let mut wrong_head = good.clone();
        wrong_head[0] = 0x55;
        assert!(matches!(
            parse_envelope(Subsystem::Imu, &wrong_head),
            Err(XrealError::Malformed(_))
        ));

        let mut corrupted = good.clone();
        corrupted[9] ^= 0xFF;
        assert!(matches!(
            parse_envelope(Subsystem::Imu, &corrupted),
            Err(XrealError::Malformed(_))
        ));

        let mut overlong = good.clone();
        overlong[5] = 0xFF;
        assert!(matches!(
            parse_envelope(Subsystem::Imu, &overlong),
            Err(XrealError::Malformed(_))
        ));

        // IMU packets are not MCU packets.
        assert!(parse_envelope(Subsystem::Controller, &good).is_err());
    }

    #[test]
    fn test_peek_and_push_range() {
        let buf = build_envelope(Subsystem::Controller, MCU_MSG_P_DISPLAY_TOGGLED, &[1]);
        assert_eq!(peek_msg_id(Subsystem::Controller, &buf), Some(0x6C04));
        assert_eq!(peek_msg_id(Subsystem::Controller, &buf[..10]), None);
        assert!(is_push_message(MCU_MSG_P_END_HEARTBEAT));
        assert!(!is_push_message(MCU_MSG_R_DISP_MODE));
    }

    #[test]
    fn test_payload_bound() {
        assert!(check_payload(Subsystem::Controller, 0x50, &[0; 42], MCU_PACKET_SIZE).is_ok());
        assert!(matches!(
            check_payload(Subsystem::Controller, 0x50, &[0; 43], MCU_PACKET_SIZE),
            Err(XrealError::PayloadTooLarge { msg_id: 0x50, len: 43, max: 42 })
        ));
        assert!(check_payload(Subsystem::Imu, 0x15, &[0; 504], 512).is_ok());
        assert!(matches!(
            check_payload(Subsystem::Imu, 0x15, &[0; 600], 512),
            Err(XrealError::PayloadTooLarge { max: 504, .. })
        ));
        assert!(check_payload(Subsystem::Imu, 0x15, &[0; 57], 64).is_err());
    }

    #[test]
    fn test_checksum_known_vector() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_extract_string() {
        assert_eq!(extract_string(b"05.1.08\0\0junk"), "05.1.08");
        assert_eq!(extract_string(b"no-nul"), "no-nul");
    }
}
