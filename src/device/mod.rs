//! Accessories exposed by the bridge.
//!
//! An accessory owns its services and wires its input sources (HTTP polling,
//! push notifications, MQTT) to them. The host constructs accessories through
//! the [`crate::registry::AccessoryRegistry`] and starts them with a
//! [`BridgeContext`].

pub mod http_co2;
pub mod info;

pub use http_co2::HttpCo2Accessory;
pub use info::{ACCESSORY_INFO, AccessoryInformation};

use crate::error::Result;
use crate::input::notification::NotificationRegistry;
use crate::sensors::{CarbonDioxideSensor, Characteristic, Sensor};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A service exposed to the bridge.
#[derive(Clone)]
pub enum Service {
    AccessoryInformation(AccessoryInformation),
    CarbonDioxideSensor(Arc<CarbonDioxideSensor>),
}

impl Service {
    /// HomeKit service type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Service::AccessoryInformation(_) => "AccessoryInformation",
            Service::CarbonDioxideSensor(_) => "CarbonDioxideSensor",
        }
    }

    /// Characteristic values on one line, for logs and the command line.
    pub fn describe(&self) -> String {
        match self {
            Service::AccessoryInformation(info) => AccessoryInformation::CHARACTERISTICS
                .iter()
                .filter_map(|c| info.characteristic(*c).map(|value| format!("{}={}", c, value)))
                .collect::<Vec<_>>()
                .join(", "),
            Service::CarbonDioxideSensor(sensor) => {
                let updated = match sensor.last_updated() {
                    Some(at) => format!("updated {}", at.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    None => "never updated".to_string(),
                };
                format!(
                    "{} {}={} ppm ({} writes, {})",
                    sensor.name(),
                    Characteristic::CarbonDioxideLevel,
                    sensor.level(),
                    sensor.version(),
                    updated
                )
            }
        }
    }
}

/// Shared resources handed to accessories when they start.
#[derive(Clone)]
pub struct BridgeContext {
    pub notifications: Arc<NotificationRegistry>,
    pub cancel: CancellationToken,
}

impl BridgeContext {
    pub fn new() -> Self {
        Self {
            notifications: Arc::new(NotificationRegistry::new()),
            cancel: CancellationToken::new(),
        }
    }
}

impl Default for BridgeContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that serves a single sensor value.
///
/// `read_value` is the on-demand read; `push_update` accepts values delivered
/// by notification or MQTT and must never fail towards the transport.
#[async_trait]
pub trait SensorValueProvider: Send + Sync {
    async fn read_value(&self) -> Result<f64>;

    fn push_update(&self, characteristic: &str, value: &Value);
}

/// An accessory the host can register and run.
pub trait Accessory: SensorValueProvider {
    fn name(&self) -> &str;

    fn identify(&self);

    /// Services to publish. Empty when the accessory failed to configure.
    fn services(&self) -> Vec<Service>;

    /// Spawn background tasks (pull timer, MQTT) and register for
    /// notifications.
    fn start(self: Arc<Self>, ctx: &BridgeContext) -> Vec<JoinHandle<()>>;
}
