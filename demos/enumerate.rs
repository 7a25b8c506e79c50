//! List the HID interfaces of all connected XREAL glasses.

fn main() {
    env_logger::init();

    match xreal_hid::device::list_devices() {
        Ok(devices) => {
            println!("Found {} XREAL interface(s):", devices.len());
            for (i, dev) in devices.iter().enumerate() {
                println!(
                    "  [{}] {:<14} {}  serial={}  path={}",
                    i,
                    dev.product.name(),
                    dev.subsystem,
                    dev.serial.as_deref().unwrap_or("-"),
                    dev.path.to_string_lossy(),
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
