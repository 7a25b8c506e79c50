//! Stream raw IMU samples from the glasses to stdout.
//!
//! Usage: cargo run --example imu_stream
//! Press Ctrl+C to stop.

use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let imu = match xreal_hid::ImuSession::open_first() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open IMU: {}", e);
            std::process::exit(1);
        }
    };

    println!("Static ID:   0x{:08x}", imu.static_id());
    println!("Calibration: {:?}", imu.calibration());
    println!();

    let stream = match imu.into_stream() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start stream: {}", e);
            std::process::exit(1);
        }
    };

    println!("Streaming IMU (Ctrl+C to stop)...");

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        match stream.recv_timeout(Duration::from_secs(2)) {
            Ok(s) => {
                count += 1;

                // Print every ~100th sample to avoid flooding the terminal
                if count % 100 == 1 {
                    println!(
                        "ts={:<14}  gyro=[{:+8.3}, {:+8.3}, {:+8.3}]  accel=[{:+.4}, {:+.4}, {:+.4}]  T={:.1}C",
                        s.timestamp_ns,
                        s.gyro_dps[0], s.gyro_dps[1], s.gyro_dps[2],
                        s.accel_g[0], s.accel_g[1], s.accel_g[2],
                        s.temperature_c,
                    );
                }

                let now = Instant::now();
                if now.duration_since(last_report) >= Duration::from_secs(3) {
                    let elapsed = start.elapsed().as_secs_f64();
                    let hz = count as f64 / elapsed;
                    println!("--- {} samples in {:.1}s ({:.1} Hz) ---", count, elapsed, hz);
                    last_report = now;
                }
            }
            Err(xreal_hid::XrealError::RecvTimeout(_)) => {
                eprintln!("Timeout waiting for IMU data");
                break;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "\nTotal: {} samples in {:.1}s ({:.1} Hz)",
        count,
        elapsed,
        count as f64 / elapsed
    );
}
