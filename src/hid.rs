use crate::{Result, XrealError};
use hidapi::HidDevice;
use std::time::Duration;

/// Largest HID report the glasses send (Air 2 Ultra IMU) plus a report id.
const MAX_REPORT_SIZE: usize = 513;

/// A half-duplex, ordered, packet-at-a-time channel to one HID interface.
pub trait Transport: Send {
    /// Send exactly one packet. Report-id framing is the transport's job.
    fn write(&mut self, packet: &[u8]) -> Result<usize>;

    /// Wait up to `timeout` for one inbound packet. `Ok(None)` means nothing arrived.
    fn read_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Release the handle. Safe to call more than once.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, packet: &[u8]) -> Result<usize> {
        (**self).write(packet)
    }

    fn read_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        (**self).read_timeout(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// HID transport backed by hidapi.
///
/// The glasses use unnumbered reports, so every write is prefixed with
/// report id 0x00. Some platforms hand the 0x00 back on reads; it is
/// stripped before the packet reaches the protocol layer.
pub struct HidTransport {
    device: Option<HidDevice>,
}

impl HidTransport {
    pub fn new(device: HidDevice) -> Self {
        Self {
            device: Some(device),
        }
    }

    fn device(&self) -> Result<&HidDevice> {
        self.device.as_ref().ok_or(XrealError::Closed)
    }
}

impl Transport for HidTransport {
    fn write(&mut self, packet: &[u8]) -> Result<usize> {
        let mut report = Vec::with_capacity(packet.len() + 1);
        report.push(0x00);
        report.extend_from_slice(packet);

        self.device()?
            .write(&report)
            .map_err(|e| XrealError::Transport(format!("write failed: {}", e)))
    }

    fn read_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; MAX_REPORT_SIZE];
        let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
        let len = self
            .device()?
            .read_timeout(&mut buf, millis)
            .map_err(|e| XrealError::Transport(format!("read failed: {}", e)))?;

        if len == 0 {
            return Ok(None);
        }
        Ok(Some(normalize_report(&buf[..len]).to_vec()))
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            log::debug!("HID handle closed");
        }
    }
}

/// Drop a leading report id 0x00 from a 65-byte report.
pub fn normalize_report(report: &[u8]) -> &[u8] {
    if report.len() >= 65 && report[0] == 0x00 {
        &report[1..]
    } else {
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_report() {
        let mut report = [0u8; 65];
        report[1] = 0xFD;
        assert_eq!(normalize_report(&report).len(), 64);
        assert_eq!(normalize_report(&report)[0], 0xFD);

        let plain = [0xAAu8; 64];
        assert_eq!(normalize_report(&plain).len(), 64);
    }
}
