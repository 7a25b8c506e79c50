//! # xreal-hid - protocol client for XREAL glasses
//!
//! Talks to the two HID interfaces exposed by XREAL Air glasses:
//! - the IMU: static id, calibration download, ~1 kHz sensor stream
//! - the MCU: firmware versions, brightness, display mode, button/display events
//!
//! ## Quick Start
//! ```no_run
//! use xreal_hid::{ControllerSession, ImuSession};
//! use std::time::Duration;
//!
//! let imu = ImuSession::open_first().unwrap();
//! println!("static id: {:08x}", imu.static_id());
//!
//! let stream = imu.into_stream().unwrap();
//! for _ in 0..100 {
//!     let sample = stream.recv_timeout(Duration::from_secs(1)).unwrap();
//!     println!("gyro: {:?}", sample.gyro_dps);
//! }
//!
//! let mcu = ControllerSession::open_first().unwrap();
//! println!("MCU firmware: {}", mcu.versions().mcu);
//! while let Ok(event) = mcu.recv_event() {
//!     println!("{:?}", event);
//! }
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod codec;
pub mod protocol;
pub mod hid;
pub mod device;
pub mod engine;
pub mod imu;
pub mod stream;
pub mod controller;

#[cfg(test)]
pub(crate) mod testing;

pub use config::SessionConfig;
pub use controller::ControllerSession;
pub use error::XrealError;
pub use hid::{HidTransport, Transport};
pub use imu::ImuSession;
pub use protocol::Subsystem;
pub use stream::ImuStream;
pub use types::*;

/// Result type alias for xreal-hid operations.
pub type Result<T> = std::result::Result<T, XrealError>;
