//! Print MCU firmware info and button/display events.
//!
//! Usage: cargo run --example controller_events
//! Press Ctrl+C to stop.

use xreal_hid::{ControllerSession, EventKind};

fn main() {
    env_logger::init();

    let mcu = match ControllerSession::open_first() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open MCU: {}", e);
            std::process::exit(1);
        }
    };

    let versions = mcu.versions();
    println!("MCU firmware: {}", versions.mcu);
    println!("DP firmware:  {}", versions.dp);
    println!("DSP firmware: {}", versions.dsp);

    match mcu.poll_display_mode() {
        Ok(mode) => {
            println!("Display mode: {}", mode);
            // Writing back the current mode is a harmless round trip.
            if let Err(e) = mcu.update_display_mode(mode) {
                eprintln!("Failed to write display mode: {}", e);
            }
        }
        Err(e) => eprintln!("Failed to read display mode: {}", e),
    }
    match mcu.read_brightness() {
        Ok(level) => println!("Brightness:   {}", level),
        Err(e) => eprintln!("Failed to read brightness: {}", e),
    }
    println!();
    println!("Waiting for events (Ctrl+C to stop)...");

    loop {
        match mcu.recv_event() {
            Ok(event) => match event.kind {
                EventKind::Message(text) => println!("[{:>10}] log: {}", event.timestamp, text),
                kind => println!(
                    "[{:>10}] {:?} (brightness {})",
                    event.timestamp, kind, event.brightness
                ),
            },
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }
}
