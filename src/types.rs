use crate::device::Product;
use crate::protocol::Subsystem;

/// One decoded IMU report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Device monotonic timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Sensor die temperature in degrees Celsius.
    pub temperature_c: f64,
    /// Angular rate [x, y, z] in degrees per second.
    pub gyro_dps: [f64; 3],
    /// Linear acceleration [x, y, z] in g.
    pub accel_g: [f64; 3],
    /// Magnetic field [x, y, z], scaled by the device multiplier/divisor.
    pub mag: [f64; 3],
}

/// Outcome of the segmented calibration download done while opening the IMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStatus {
    /// The device did not report a calibration length.
    Unavailable,
    /// All `len` bytes were received.
    Complete { len: usize },
    /// A segment request failed after `received` of `expected` bytes.
    Partial { received: usize, expected: usize },
}

/// Firmware version strings read from the MCU at open time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirmwareVersions {
    /// MCU application firmware.
    pub mcu: String,
    /// DP7911 display bridge firmware.
    pub dp: String,
    /// DSP application firmware.
    pub dsp: String,
}

/// Mutable controller fields, owned by the session worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub brightness: u8,
    pub display_mode: u8,
    /// Last known display on/off state.
    pub active: bool,
}

/// What happened on the glasses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    ScreenOn,
    ScreenOff,
    BrightnessUp,
    BrightnessDown,
    /// Text pushed by the MCU's async log channel.
    Message(String),
    DisplayMode2d,
    DisplayMode3d,
    BlendCycle,
    ControlToggle,
    VolumeUp,
    VolumeDown,
    /// Unrecognised push, tagged with its message id. An unmapped button
    /// key reports the button push id.
    Unknown(u16),
}

/// An unsolicited event decoded from an MCU push packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerEvent {
    /// Device timestamp of the push (low 32 bits).
    pub timestamp: u32,
    /// Session brightness at the moment the event was decoded.
    pub brightness: u8,
    pub kind: EventKind,
}

/// A connected HID interface belonging to XREAL glasses.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub product: Product,
    pub subsystem: Subsystem,
    pub path: std::ffi::CString,
    pub serial: Option<String>,
}
