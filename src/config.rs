use crate::error::{Result, SensorError};
use crate::http::{UrlObject, parse_url_property};
use crate::pattern::{DEFAULT_GROUP, default_pattern, parse_pattern};
use log::{error, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default listen address of the notification server.
pub const DEFAULT_NOTIFICATION_LISTEN: &str = "0.0.0.0:8080";

/// Accessory name used when the block has none.
pub const DEFAULT_NAME: &str = "CO2 Sensor";

/// Top-level bridge configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub accessories: Vec<AccessoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    pub notification_listen: SocketAddr,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            notification_listen: DEFAULT_NOTIFICATION_LISTEN
                .parse()
                .expect("default listen address is valid"),
        }
    }
}

impl Config {
    /// Load the bridge configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// `<config_dir>/http-co2-sensor/config.json`, falling back to the
    /// working directory when the platform has no config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("http-co2-sensor"))
            .unwrap_or_default()
            .join("config.json")
    }
}

/// One accessory block as written by the user.
///
/// Optional properties are kept loosely typed so that a value of the wrong
/// type degrades to its default instead of rejecting the whole file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryConfig {
    /// Accessory type, used to select the factory in the registry.
    #[serde(default)]
    pub accessory: Option<String>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub get_url: Option<Value>,
    /// Milliseconds, `-1` for infinite.
    #[serde(default)]
    pub status_cache: Option<Value>,
    #[serde(default)]
    pub status_pattern: Option<Value>,
    #[serde(default)]
    pub pattern_group_to_extract: Option<Value>,
    /// Milliseconds
    #[serde(default)]
    pub pull_interval: Option<Value>,
    #[serde(default, rename = "notificationID")]
    pub notification_id: Option<Value>,
    #[serde(default)]
    pub notification_password: Option<Value>,
    #[serde(default)]
    pub mqtt: Option<Value>,
    #[serde(default)]
    pub debug: Option<Value>,
}

impl AccessoryConfig {
    /// Name shown in logs and on the sensor service.
    pub fn display_name(&self) -> String {
        scalar_string(self.name.as_ref()).unwrap_or_else(|| DEFAULT_NAME.to_string())
    }
}

/// Validated accessory settings.
#[derive(Debug, Clone)]
pub struct SensorSettings {
    pub name: String,
    pub debug: bool,
    pub get_url: UrlObject,
    pub status_cache: Option<i64>,
    pub status_pattern: Regex,
    pub pattern_group_to_extract: usize,
    pub pull_interval: Option<Duration>,
    pub notification_id: Option<String>,
    pub notification_password: Option<String>,
    pub mqtt: Option<MqttConfig>,
}

impl SensorSettings {
    /// Validate an accessory block.
    ///
    /// Only a missing or malformed `getUrl` is an error; every other property
    /// falls back to its default with a log message.
    pub fn parse(config: &AccessoryConfig) -> Result<Self> {
        let name = config.display_name();
        // Warns only; display_name already fell back
        optional_string(&name, "name", config.name.as_ref());

        let get_url = match &config.get_url {
            Some(property) => parse_url_property(property)?,
            None => return Err(SensorError::MissingProperty("getUrl")),
        };

        let status_cache = match &config.status_cache {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_i64() {
                Some(ms) => Some(ms),
                None => {
                    warn!(
                        "[{}] Property 'statusCache' must be a number! Using default value!",
                        name
                    );
                    None
                }
            },
        };

        let mut status_pattern = default_pattern();
        if let Some(property) = &config.status_pattern {
            match parse_pattern(property) {
                Ok(pattern) => status_pattern = pattern,
                Err(_) => warn!(
                    "[{}] Property 'statusPattern' was given in an unsupported type. Using default value!",
                    name
                ),
            }
        }

        let mut pattern_group_to_extract = DEFAULT_GROUP;
        match &config.pattern_group_to_extract {
            None | Some(Value::Null) => {}
            // Zero counts as unset
            Some(value) if value.as_u64() == Some(0) => {}
            Some(value) => match value.as_u64() {
                Some(group) => pattern_group_to_extract = group as usize,
                None => warn!(
                    "[{}] Property 'patternGroupToExtract' must be a number! Using default value!",
                    name
                ),
            },
        }

        let pull_interval = match &config.pull_interval {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_u64() {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => {
                    warn!(
                        "[{}] Property 'pullInterval' must be a positive number! Pulling disabled!",
                        name
                    );
                    None
                }
            },
        };

        let mqtt = match &config.mqtt {
            None | Some(Value::Null) => None,
            Some(property) => match parse_mqtt_options(property) {
                Ok(options) => Some(options),
                Err(e) => {
                    error!(
                        "[{}] Error occurred while parsing MQTT property: {}",
                        name, e
                    );
                    error!("[{}] MQTT will not be enabled!", name);
                    None
                }
            },
        };

        let notification_id =
            optional_string(&name, "notificationID", config.notification_id.as_ref());
        let notification_password = optional_string(
            &name,
            "notificationPassword",
            config.notification_password.as_ref(),
        );

        Ok(Self {
            debug: config.debug.as_ref().is_some_and(is_truthy),
            name,
            get_url,
            status_cache,
            status_pattern,
            pattern_group_to_extract,
            pull_interval,
            notification_id,
            notification_password,
            mqtt,
        })
    }
}

/// Text of a scalar property. Numbers and booleans are taken as written.
fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Read an optional string property, ignoring it with a warning when it is
/// a list or an object.
fn optional_string(name: &str, key: &str, value: Option<&Value>) -> Option<String> {
    let text = scalar_string(value);
    if text.is_none() && value.is_some_and(|v| !v.is_null()) {
        warn!("[{}] Property '{}' must be a string! Ignoring it!", name, key);
    }
    text
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub subscriptions: Vec<MqttSubscription>,
}

/// A topic whose messages update one characteristic.
#[derive(Debug, Clone)]
pub struct MqttSubscription {
    pub topic: String,
    pub characteristic: String,
    pub message_pattern: Option<Regex>,
    pub pattern_group_to_extract: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMqttConfig {
    #[serde(default = "default_mqtt_host")]
    host: String,
    #[serde(default = "default_mqtt_port")]
    port: u16,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    /// Seconds
    #[serde(default = "default_keep_alive")]
    keepalive: u64,
    subscriptions: Option<Vec<RawMqttSubscription>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMqttSubscription {
    topic: String,
    characteristic: String,
    #[serde(default)]
    message_pattern: Option<Value>,
    #[serde(default)]
    pattern_group_to_extract: Option<usize>,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}

/// Parse the `mqtt` property.
///
/// At least one subscription is required, otherwise the client would never
/// deliver anything.
pub fn parse_mqtt_options(property: &Value) -> Result<MqttConfig> {
    let raw: RawMqttConfig = serde_json::from_value(property.clone())
        .map_err(|e| SensorError::InvalidConfig(e.to_string()))?;

    let subscriptions = raw
        .subscriptions
        .ok_or(SensorError::MissingProperty("subscriptions"))?;
    if subscriptions.is_empty() {
        return Err(SensorError::InvalidConfig(
            "'subscriptions' must not be empty".to_string(),
        ));
    }

    let subscriptions = subscriptions
        .into_iter()
        .map(|sub| {
            let message_pattern = sub
                .message_pattern
                .as_ref()
                .map(parse_pattern)
                .transpose()?;
            Ok(MqttSubscription {
                topic: sub.topic,
                characteristic: sub.characteristic,
                message_pattern,
                pattern_group_to_extract: sub
                    .pattern_group_to_extract
                    .filter(|g| *g > 0)
                    .unwrap_or(DEFAULT_GROUP),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MqttConfig {
        broker_host: raw.host,
        broker_port: raw.port,
        client_id: raw
            .client_id
            .unwrap_or_else(|| format!("http-co2-sensor-{}", uuid::Uuid::new_v4().simple())),
        username: raw.username,
        password: raw.password,
        keep_alive: Duration::from_secs(raw.keepalive),
        subscriptions,
    })
}
