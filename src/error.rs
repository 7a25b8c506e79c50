use crate::protocol::Subsystem;

/// Errors that can occur when talking to the glasses.
#[derive(Debug, thiserror::Error)]
pub enum XrealError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("No XREAL {0} interface found (VID=3318)")]
    DeviceNotFound(Subsystem),

    #[error("Timeout waiting for reply to message 0x{0:04x}")]
    Timeout(u16),

    /// A reply arrived but does not belong to the pending request.
    #[error("Reply correlation failed: {0}")]
    Correlation(String),

    /// Marker, length or checksum of an inbound packet is wrong.
    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Device rejected message 0x{msg_id:04x} with status 0x{status:02x}")]
    Rejected { msg_id: u16, status: u8 },

    /// Request payload does not fit one packet of the interface.
    #[error("Payload of {len} bytes for message 0x{msg_id:04x} exceeds the {max} byte limit")]
    PayloadTooLarge { msg_id: u16, len: usize, max: usize },

    /// Nothing arrived on a sample or event channel before the deadline.
    #[error("No data received within {0:?}")]
    RecvTimeout(std::time::Duration),

    #[error("Session closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),
}
