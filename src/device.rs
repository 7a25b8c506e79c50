use crate::hid::HidTransport;
use crate::protocol::{Subsystem, MCU_PACKET_SIZE, VENDOR_ID};
use crate::types::DeviceInfo;
use crate::{Result, XrealError};
use hidapi::HidApi;

/// Supported glasses models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Product {
    Air,
    Air2,
    Air2Pro,
    Air2Ultra,
}

impl Product {
    pub const ALL: [Product; 4] = [
        Product::Air,
        Product::Air2,
        Product::Air2Pro,
        Product::Air2Ultra,
    ];

    pub fn from_product_id(pid: u16) -> Option<Product> {
        Product::ALL.into_iter().find(|p| p.product_id() == pid)
    }

    pub const fn product_id(self) -> u16 {
        match self {
            Product::Air => 0x0424,
            Product::Air2 => 0x0428,
            Product::Air2Pro => 0x0432,
            Product::Air2Ultra => 0x0426,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Product::Air => "XREAL Air",
            Product::Air2 => "XREAL Air 2",
            Product::Air2Pro => "XREAL Air 2 Pro",
            Product::Air2Ultra => "XREAL Air 2 Ultra",
        }
    }
}

impl Subsystem {
    /// USB interface number carrying this subsystem on `product`.
    pub const fn interface_number(self, product: Product) -> i32 {
        match (self, product) {
            (Subsystem::Imu, Product::Air2Ultra) => 2,
            (Subsystem::Imu, _) => 3,
            (Subsystem::Controller, Product::Air2Ultra) => 0,
            (Subsystem::Controller, _) => 4,
        }
    }

    /// Negotiated maximum packet size for this subsystem on `product`.
    pub const fn max_packet_size(self, product: Product) -> usize {
        match (self, product) {
            (Subsystem::Imu, Product::Air2Ultra) => 512,
            (Subsystem::Imu, _) => 64,
            (Subsystem::Controller, _) => MCU_PACKET_SIZE,
        }
    }
}

/// Classify a hidapi entry as one of our interfaces.
fn match_interface(d: &hidapi::DeviceInfo) -> Option<(Product, Subsystem)> {
    if d.vendor_id() != VENDOR_ID {
        return None;
    }
    let product = Product::from_product_id(d.product_id())?;
    [Subsystem::Imu, Subsystem::Controller]
        .into_iter()
        .find(|s| s.interface_number(product) == d.interface_number())
        .map(|s| (product, s))
}

/// List every IMU and MCU interface of connected glasses.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let api = HidApi::new()?;
    let devices = api
        .device_list()
        .filter_map(|d| {
            match_interface(d).map(|(product, subsystem)| DeviceInfo {
                product,
                subsystem,
                path: d.path().to_owned(),
                serial: d.serial_number().map(str::to_string),
            })
        })
        .collect();
    Ok(devices)
}

/// Open the first interface serving `subsystem`.
pub fn open_subsystem(subsystem: Subsystem) -> Result<(HidTransport, Product)> {
    let api = HidApi::new()?;

    let (hid_info, product) = api
        .device_list()
        .find_map(|d| match match_interface(d) {
            Some((product, s)) if s == subsystem => Some((d, product)),
            _ => None,
        })
        .ok_or(XrealError::DeviceNotFound(subsystem))?;

    let device = api.open_path(hid_info.path())?;
    log::info!(
        "Opened {} {} interface {}",
        product.name(),
        subsystem,
        hid_info.interface_number()
    );
    Ok((HidTransport::new(device), product))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_lookup() {
        assert_eq!(Product::from_product_id(0x0432), Some(Product::Air2Pro));
        assert_eq!(Product::from_product_id(0x1234), None);
    }

    #[test]
    fn test_interface_tables() {
        assert_eq!(Subsystem::Imu.interface_number(Product::Air), 3);
        assert_eq!(Subsystem::Imu.interface_number(Product::Air2Ultra), 2);
        assert_eq!(Subsystem::Controller.interface_number(Product::Air2), 4);
        assert_eq!(Subsystem::Controller.interface_number(Product::Air2Ultra), 0);
        assert_eq!(Subsystem::Imu.max_packet_size(Product::Air2Pro), 64);
        assert_eq!(Subsystem::Imu.max_packet_size(Product::Air2Ultra), 512);
        assert_eq!(Subsystem::Controller.max_packet_size(Product::Air2Ultra), 64);
    }
}
