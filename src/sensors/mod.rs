//! Sensor state exposed to the bridge.
//!
//! This module provides shared state for sensors that can be updated from
//! various input sources (HTTP polling, notifications, MQTT) and read by the
//! bridge's device model.

pub mod co2_sensor;

pub use co2_sensor::CarbonDioxideSensor;

use strum::{Display, EnumString};

/// Characteristics known to the bridge, addressed by their HomeKit names.
///
/// Pushed updates name a characteristic as a string; it is parsed into this
/// enum and then looked up on the target service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
pub enum Characteristic {
    CarbonDioxideLevel,
    Manufacturer,
    Model,
    SerialNumber,
    FirmwareRevision,
}

/// Trait for sensors with change detection.
///
/// The version number is incremented each time the sensor value is written,
/// so readers can tell that a new value arrived even when it is unchanged.
pub trait Sensor: Send + Sync {
    fn version(&self) -> u32;
}
