//! HTTP CO2 sensor accessory.
//!
//! Exposes a carbon dioxide level polled from an HTTP endpoint, with optional
//! push updates over an HTTP notification endpoint and MQTT.

pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod input;
pub mod pattern;
pub mod pull_timer;
pub mod registry;
pub mod sensors;

use config::AccessoryConfig;
use device::http_co2::{ACCESSORY_NAME, PLUGIN_NAME};
use device::{Accessory, HttpCo2Accessory};
use registry::AccessoryRegistry;
use std::sync::Arc;

/// Plugin entry point: registers the `HTTP-CO2` accessory type.
pub fn register(registry: &mut AccessoryRegistry) {
    registry.register_accessory(
        PLUGIN_NAME,
        ACCESSORY_NAME,
        Box::new(|config: &AccessoryConfig| {
            Arc::new(HttpCo2Accessory::new(config)) as Arc<dyn Accessory>
        }),
    );
}
