//! One-shot request/response exchanges over a [`Transport`].

use crate::hid::Transport;
use crate::protocol::{self, Subsystem};
use crate::{Result, XrealError};
use std::time::Duration;

/// Send one request and wait for exactly one reply.
///
/// Returns the first `expected_len` bytes of the reply data. There is no
/// retry; a missing reply is [`XrealError::Timeout`]. A payload too large for
/// `max_packet_size` is refused before anything is written.
pub fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    subsystem: Subsystem,
    max_packet_size: usize,
    msg_id: u16,
    payload: &[u8],
    expected_len: usize,
    timeout: Duration,
) -> Result<Vec<u8>> {
    protocol::check_payload(subsystem, msg_id, payload, max_packet_size)?;
    let packet = protocol::build_envelope(subsystem, msg_id, payload);
    transport.write(&packet)?;
    log::debug!("{} request 0x{:04x} ({} bytes)", subsystem, msg_id, payload.len());

    let reply = transport
        .read_timeout(timeout)?
        .ok_or(XrealError::Timeout(msg_id))?;
    accept_reply(subsystem, &reply, msg_id, expected_len)
}

/// Fire a one-byte command and report whether anything came back.
///
/// Best-effort: the reply is neither parsed nor matched to the request,
/// because the devices do not acknowledge stream toggles consistently.
pub fn signal<T: Transport + ?Sized>(
    transport: &mut T,
    subsystem: Subsystem,
    msg_id: u16,
    value: u8,
    timeout: Duration,
) -> bool {
    let packet = protocol::build_envelope(subsystem, msg_id, &[value]);
    if let Err(e) = transport.write(&packet) {
        log::warn!("{} signal 0x{:04x} write failed: {}", subsystem, msg_id, e);
        return false;
    }
    matches!(transport.read_timeout(timeout), Ok(Some(_)))
}

/// Check that `reply` answers `msg_id` and carries at least `expected_len` data bytes.
///
/// MCU replies start with a status byte; anything other than zero is a rejection.
pub fn accept_reply(
    subsystem: Subsystem,
    reply: &[u8],
    msg_id: u16,
    expected_len: usize,
) -> Result<Vec<u8>> {
    let envelope = protocol::parse_envelope(subsystem, reply)?;
    if envelope.msg_id != msg_id {
        return Err(XrealError::Correlation(format!(
            "expected reply to 0x{:04x}, got 0x{:04x}",
            msg_id, envelope.msg_id
        )));
    }

    let data = match subsystem {
        Subsystem::Imu => envelope.payload,
        Subsystem::Controller => match envelope.payload.split_first() {
            Some((&0, rest)) => rest,
            Some((&status, _)) => return Err(XrealError::Rejected { msg_id, status }),
            None => {
                return Err(XrealError::Correlation(format!(
                    "reply to 0x{:04x} has no status byte",
                    msg_id
                )))
            }
        },
    };

    if data.len() < expected_len {
        return Err(XrealError::Correlation(format!(
            "reply to 0x{:04x} has {} data bytes, expected {}",
            msg_id,
            data.len(),
            expected_len
        )));
    }
    Ok(data[..expected_len].to_vec())
}
