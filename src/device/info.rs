//! Static accessory information service.

use crate::sensors::Characteristic;

/// Details published in the AccessoryInformation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessoryInformation {
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub serial_number: &'static str,
    pub firmware_revision: &'static str,
}

pub const ACCESSORY_INFO: AccessoryInformation = AccessoryInformation {
    manufacturer: "Robomigo",
    model: "HTTP CO2 Sensor",
    serial_number: "RBM01",
    firmware_revision: env!("CARGO_PKG_VERSION"),
};

impl AccessoryInformation {
    /// Characteristics registered on this service.
    pub const CHARACTERISTICS: &'static [Characteristic] = &[
        Characteristic::Manufacturer,
        Characteristic::Model,
        Characteristic::SerialNumber,
        Characteristic::FirmwareRevision,
    ];

    /// Value of an information characteristic, if this service carries it.
    pub fn characteristic(&self, characteristic: Characteristic) -> Option<&'static str> {
        match characteristic {
            Characteristic::Manufacturer => Some(self.manufacturer),
            Characteristic::Model => Some(self.model),
            Characteristic::SerialNumber => Some(self.serial_number),
            Characteristic::FirmwareRevision => Some(self.firmware_revision),
            _ => None,
        }
    }
}
