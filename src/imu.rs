use crate::codec::{i16_be, i16_folded, i16_le, i24_le, i32_be, i32_le, u32_le, u64_le};
use crate::config::SessionConfig;
use crate::device;
use crate::engine;
use crate::hid::{HidTransport, Transport};
use crate::protocol::{
    Subsystem, IMU_MSG_CAL_DATA_GET_NEXT_SEGMENT, IMU_MSG_GET_CAL_DATA_LENGTH,
    IMU_MSG_GET_STATIC_ID, IMU_MSG_START_IMU_DATA,
};
use crate::stream::ImuStream;
use crate::types::{CalibrationStatus, ImuSample};
use crate::Result;
use std::time::Duration;

/// Reported when the device does not answer the static id request.
pub const FALLBACK_STATIC_ID: u32 = 0x2022_0101;

/// Minimum length of a sensor report.
pub const SAMPLE_SIZE: usize = 64;

const MAX_CALIBRATION_PREALLOC: usize = 64 * 1024;

const SAMPLE_SIGNATURES: [[u8; 2]; 2] = [[0x01, 0x02], [0xAA, 0x53]];

/// Die temperature scale: `raw / 132.48 + 25`.
const TEMPERATURE_SCALE: f64 = 132.48;
const TEMPERATURE_OFFSET: f64 = 25.0;

/// An opened IMU interface.
///
/// Opening stops the stream, reads the static id, pulls the calibration
/// blob and restarts the stream. None of those steps is fatal: the IMU
/// keeps working with a fallback id and without calibration.
pub struct ImuSession<T: Transport = HidTransport> {
    transport: T,
    max_packet_size: usize,
    static_id: u32,
    calibration: CalibrationStatus,
    config: SessionConfig,
}

impl ImuSession<HidTransport> {
    /// Open the IMU interface of the first connected glasses.
    pub fn open_first() -> Result<Self> {
        let (transport, product) = device::open_subsystem(Subsystem::Imu)?;
        Ok(Self::open(
            transport,
            Subsystem::Imu.max_packet_size(product),
            SessionConfig::default(),
        ))
    }
}

impl<T: Transport> ImuSession<T> {
    /// Run the open sequence on a transport bound to the IMU interface.
    pub fn open(mut transport: T, max_packet_size: usize, config: SessionConfig) -> Self {
        let timeout = config.request_timeout;

        if !engine::signal(&mut transport, Subsystem::Imu, IMU_MSG_START_IMU_DATA, 0, timeout) {
            log::debug!("IMU stream stop not acknowledged");
        }

        let static_id = match engine::exchange(
            &mut transport,
            Subsystem::Imu,
            max_packet_size,
            IMU_MSG_GET_STATIC_ID,
            &[],
            4,
            timeout,
        ) {
            Ok(data) => u32_le(&data, 0),
            Err(e) => {
                log::warn!(
                    "Static id unavailable ({}), using 0x{:08x}",
                    e,
                    FALLBACK_STATIC_ID
                );
                FALLBACK_STATIC_ID
            }
        };

        let calibration = match download_calibration(&mut transport, max_packet_size, timeout) {
            Some(cal) => cal.status(),
            None => CalibrationStatus::Unavailable,
        };

        if !engine::signal(&mut transport, Subsystem::Imu, IMU_MSG_START_IMU_DATA, 1, timeout) {
            log::warn!("IMU stream start not acknowledged");
        }

        log::info!(
            "Opened IMU: static id=0x{:08x} max packet={} calibration={:?}",
            static_id,
            max_packet_size,
            calibration
        );

        Self {
            transport,
            max_packet_size,
            static_id,
            calibration,
            config,
        }
    }

    pub fn static_id(&self) -> u32 {
        self.static_id
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// How far the calibration download got during open.
    pub fn calibration(&self) -> CalibrationStatus {
        self.calibration
    }

    /// Send a raw IMU request and return `expected_len` bytes of reply data.
    ///
    /// Sensor reports that arrive in between are not skipped, so stop the
    /// stream first.
    pub fn request(&mut self, msg_id: u16, payload: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        engine::exchange(
            &mut self.transport,
            Subsystem::Imu,
            self.max_packet_size,
            msg_id,
            payload,
            expected_len,
            self.config.request_timeout,
        )
    }

    /// Start or stop the sensor stream. Best-effort, see [`engine::signal`].
    pub fn set_streaming(&mut self, enabled: bool) -> bool {
        engine::signal(
            &mut self.transport,
            Subsystem::Imu,
            IMU_MSG_START_IMU_DATA,
            enabled as u8,
            self.config.request_timeout,
        )
    }

    /// Read one report and decode it.
    ///
    /// `Ok(None)` covers both "nothing arrived" and "not a sensor report".
    pub fn read_sample(&mut self, timeout: Duration) -> Result<Option<ImuSample>> {
        Ok(self
            .transport
            .read_timeout(timeout)?
            .and_then(|report| parse_sample(&report)))
    }

    /// Move the session onto a background reader thread.
    pub fn into_stream(self) -> Result<ImuStream>
    where
        T: 'static,
    {
        ImuStream::start(self.transport, self.config)
    }

    /// Release the transport.
    pub fn close(mut self) {
        self.transport.close();
    }
}

/// Calibration blob pulled from the IMU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calibration {
    pub data: Vec<u8>,
    /// Total length announced by the device.
    pub expected_len: usize,
}

impl Calibration {
    pub fn is_complete(&self) -> bool {
        self.data.len() >= self.expected_len
    }

    pub fn status(&self) -> CalibrationStatus {
        if self.is_complete() {
            CalibrationStatus::Complete {
                len: self.data.len(),
            }
        } else {
            CalibrationStatus::Partial {
                received: self.data.len(),
                expected: self.expected_len,
            }
        }
    }
}

/// Download the calibration blob segment by segment.
///
/// The device keeps the read cursor, so each request is a bare "next
/// segment". Returns `None` when the total length cannot be read. A failed
/// segment ends the download with whatever has been received.
pub fn download_calibration<T: Transport + ?Sized>(
    transport: &mut T,
    max_packet_size: usize,
    timeout: Duration,
) -> Option<Calibration> {
    let total = match engine::exchange(
        transport,
        Subsystem::Imu,
        max_packet_size,
        IMU_MSG_GET_CAL_DATA_LENGTH,
        &[],
        4,
        timeout,
    ) {
        Ok(data) => u32_le(&data, 0) as usize,
        Err(e) => {
            log::warn!("Calibration length unavailable: {}", e);
            return None;
        }
    };

    let segment_size = Subsystem::Imu.max_payload(max_packet_size);
    // The length comes from the device; let the buffer grow past this.
    let mut data = Vec::with_capacity(total.min(MAX_CALIBRATION_PREALLOC));

    while data.len() < total && segment_size > 0 {
        let next = segment_size.min(total - data.len());
        match engine::exchange(
            transport,
            Subsystem::Imu,
            max_packet_size,
            IMU_MSG_CAL_DATA_GET_NEXT_SEGMENT,
            &[],
            next,
            timeout,
        ) {
            Ok(segment) => data.extend_from_slice(&segment),
            Err(e) => {
                log::warn!(
                    "Calibration download stopped at {}/{} bytes: {}",
                    data.len(),
                    total,
                    e
                );
                break;
            }
        }
    }

    log::debug!("Calibration: {}/{} bytes", data.len(), total);
    Some(Calibration {
        data,
        expected_len: total,
    })
}

/// Decode a sensor report.
///
/// Returns `None` for short reports and for reports without a sample
/// signature; readers should just keep reading.
///
/// Layout:
/// - `[0..2]`: signature (0x01 0x02 or 0xAA 0x53)
/// - `[2..4]`: i16 LE temperature
/// - `[4..12]`: u64 LE timestamp (ns)
/// - `[12..27]`: gyro i16 LE multiplier, i32 LE divisor, 3x i24 LE
/// - `[27..42]`: accel, same shape
/// - `[42..54]`: mag i16 BE multiplier, i32 BE divisor, 3x folded i16
pub fn parse_sample(payload: &[u8]) -> Option<ImuSample> {
    if payload.len() < SAMPLE_SIZE {
        return None;
    }
    if !SAMPLE_SIGNATURES.contains(&[payload[0], payload[1]]) {
        return None;
    }

    let timestamp_ns = u64_le(payload, 4);
    let temperature_c = i16_le(payload, 2) as f64 / TEMPERATURE_SCALE + TEMPERATURE_OFFSET;

    let gyro_m = i16_le(payload, 12) as f64;
    let gyro_d = i32_le(payload, 14) as f64;
    let gyro_dps = [18, 21, 24].map(|o| i24_le(payload, o) as f64 * gyro_m / gyro_d);

    let accel_m = i16_le(payload, 27) as f64;
    let accel_d = i32_le(payload, 29) as f64;
    let accel_g = [33, 36, 39].map(|o| i24_le(payload, o) as f64 * accel_m / accel_d);

    let mag_m = i16_be(payload, 42) as f64;
    let mag_d = i32_be(payload, 44) as f64;
    let mag = [48, 50, 52].map(|o| i16_folded(payload, o) as f64 * mag_m / mag_d);

    Some(ImuSample {
        timestamp_ns,
        temperature_c,
        gyro_dps,
        accel_g,
        mag,
    })
}
