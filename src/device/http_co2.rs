//! CO2 sensor accessory fed by an HTTP endpoint.
//!
//! The level is read on demand through a cache, refreshed by an optional pull
//! timer, and can be overwritten at any time by pushed notifications or MQTT
//! messages.

use super::{ACCESSORY_INFO, Accessory, BridgeContext, SensorValueProvider, Service};
use crate::cache::Cache;
use crate::config::{AccessoryConfig, SensorSettings};
use crate::error::{Result, SensorError};
use crate::http::{build_client, http_request, is_http_success_code};
use crate::input::mqtt::MqttIntegration;
use crate::input::notification::register_if_defined;
use crate::pattern::extract_value_from_pattern;
use crate::pull_timer::PullTimer;
use crate::sensors::CarbonDioxideSensor;
use crate::sensors::co2_sensor::{check_level, parse_level};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Accessory type name used in configuration files.
pub const ACCESSORY_NAME: &str = "HTTP-CO2";

/// Plugin identifier the accessory type is registered under.
pub const PLUGIN_NAME: &str = "http-co2-sensor";

/// State of an accessory whose configuration was accepted.
struct ActiveSensor {
    settings: SensorSettings,
    client: Client,
    status_cache: Cache,
    service: Arc<CarbonDioxideSensor>,
    pull_timer: Option<PullTimer>,
}

pub struct HttpCo2Accessory {
    name: String,
    /// `None` when construction aborted; the accessory then exposes no
    /// services and every read fails.
    active: Option<ActiveSensor>,
}

impl HttpCo2Accessory {
    /// Build the accessory from its configuration block.
    ///
    /// Configuration errors are logged, never returned: an invalid `getUrl`
    /// yields an accessory without services.
    pub fn new(config: &AccessoryConfig) -> Self {
        let name = config.display_name();

        let active = match Self::configure(config) {
            Ok(active) => Some(active),
            Err(e) => {
                match e {
                    SensorError::MissingProperty("getUrl") => {
                        warn!("[{}] Property 'getUrl' is required!", name)
                    }
                    e => warn!("[{}] Error occurred while parsing 'getUrl': {}", name, e),
                }
                warn!("[{}] Aborting...", name);
                None
            }
        };

        Self { name, active }
    }

    fn configure(config: &AccessoryConfig) -> Result<ActiveSensor> {
        let settings = SensorSettings::parse(config)?;
        let client = build_client(&settings.get_url)?;

        Ok(ActiveSensor {
            status_cache: Cache::new(settings.status_cache, 0),
            service: Arc::new(CarbonDioxideSensor::new(settings.name.clone())),
            pull_timer: settings.pull_interval.map(PullTimer::new),
            client,
            settings,
        })
    }

    /// The sensor service, if the accessory is functional.
    pub fn service(&self) -> Option<&Arc<CarbonDioxideSensor>> {
        self.active.as_ref().map(|active| &active.service)
    }

    /// Resolve the current CO2 level.
    ///
    /// Returns the characteristic value while the cache is fresh; otherwise
    /// fetches the configured URL and extracts the level from the body. The
    /// pull timer is reset as soon as the request completes, before its
    /// outcome is inspected.
    pub async fn get_co2(&self) -> Result<f64> {
        let active = self.active.as_ref().ok_or(SensorError::NoService)?;
        let debug = active.settings.debug;

        if !active.status_cache.should_query() {
            let value = active.service.level();
            if debug {
                info!(
                    "[{}] Co2 returning cached value {}{}",
                    self.name,
                    value,
                    if active.status_cache.is_infinite() {
                        " (infinite cache)"
                    } else {
                        ""
                    }
                );
            }
            return Ok(value);
        }

        let result = http_request(&active.client, &active.settings.get_url).await;

        if let Some(timer) = &active.pull_timer {
            timer.reset();
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                info!("[{}] Co2 failed: {}", self.name, e);
                return Err(e);
            }
        };

        if !is_http_success_code(response.status) {
            info!("[{}] Co2 returned http error: {}", self.name, response.status);
            return Err(SensorError::HttpStatus(response.status));
        }

        let level = match extract_value_from_pattern(
            &active.settings.status_pattern,
            &response.body,
            active.settings.pattern_group_to_extract,
        )
        .and_then(|text| parse_level(&text))
        .and_then(check_level)
        {
            Ok(level) => level,
            Err(e) => {
                info!(
                    "[{}] Co2 error occurred while extracting co2 from body: {}",
                    self.name, e
                );
                return Err(SensorError::Pattern);
            }
        };

        if debug {
            info!("[{}] Co2 is currently at {}", self.name, level);
        }

        active.status_cache.queried();
        Ok(level)
    }

    /// Apply a pushed `{characteristic, value}` update.
    ///
    /// Unknown characteristics and non-numeric values are logged and dropped.
    pub fn handle_notification(&self, characteristic: &str, value: &Value) {
        let Some(active) = &self.active else {
            warn!(
                "[{}] Dropping notification, accessory has no sensor service",
                self.name
            );
            return;
        };

        let Some(resolved) = active.service.characteristic(characteristic) else {
            info!(
                "[{}] Encountered unknown characteristic when handling notification (or characteristic which wasn't added to the service): {}",
                self.name, characteristic
            );
            return;
        };

        info!("[{}] Updating {} to new value: {}", self.name, resolved, value);

        let level = match value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| SensorError::InvalidValue(n.to_string())),
            Value::String(s) => parse_level(s),
            other => Err(SensorError::InvalidValue(other.to_string())),
        };

        if let Err(e) = level.and_then(|level| active.service.set_level(level)) {
            warn!("[{}] Ignoring {} update: {}", self.name, resolved, e);
        }
    }

    /// One pull timer cycle: fetch and publish on success.
    async fn pull(&self) {
        let Some(active) = &self.active else {
            return;
        };
        // Failures are already logged by get_co2
        if let Ok(level) = self.get_co2().await
            && let Err(e) = active.service.set_level(level)
        {
            warn!("[{}] Pulled value rejected: {}", self.name, e);
        }
    }
}

#[async_trait]
impl SensorValueProvider for HttpCo2Accessory {
    /// Read as the bridge would: the resolved level becomes the
    /// characteristic value.
    async fn read_value(&self) -> Result<f64> {
        let level = self.get_co2().await?;
        if let Some(service) = self.service()
            && service.level() != level
        {
            service.set_level(level)?;
        }
        Ok(level)
    }

    fn push_update(&self, characteristic: &str, value: &Value) {
        self.handle_notification(characteristic, value);
    }
}

impl Accessory for HttpCo2Accessory {
    fn name(&self) -> &str {
        &self.name
    }

    fn identify(&self) {
        info!("[{}] Identify requested!", self.name);
    }

    fn services(&self) -> Vec<Service> {
        match &self.active {
            Some(active) => vec![
                Service::AccessoryInformation(ACCESSORY_INFO),
                Service::CarbonDioxideSensor(Arc::clone(&active.service)),
            ],
            None => Vec::new(),
        }
    }

    fn start(self: Arc<Self>, ctx: &BridgeContext) -> Vec<JoinHandle<()>> {
        let Some(active) = &self.active else {
            return Vec::new();
        };
        let mut tasks = Vec::new();

        if let Some(timer) = &active.pull_timer {
            info!(
                "[{}] Pulling every {} ms",
                self.name,
                timer.interval().as_millis()
            );
            let accessory = Arc::clone(&self);
            tasks.push(timer.start(ctx.cancel.clone(), move || {
                let accessory = Arc::clone(&accessory);
                async move { accessory.pull().await }
            }));
        }

        let provider: Arc<dyn SensorValueProvider> = self.clone();
        register_if_defined(
            &ctx.notifications,
            active.settings.notification_id.as_deref(),
            active.settings.notification_password.as_deref(),
            Arc::clone(&provider),
        );

        if let Some(mqtt) = &active.settings.mqtt {
            tasks.push(MqttIntegration::new(mqtt.clone(), provider).start(ctx.cancel.clone()));
        }

        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Sensor;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    /// Serve `body` with `status` on an ephemeral port, counting requests.
    async fn serve(status: StatusCode, body: &'static str) -> (SocketAddr, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/co2",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (status, body)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (addr, hits)
    }

    fn accessory(addr: SocketAddr, extra: Value) -> HttpCo2Accessory {
        let mut config = json!({
            "accessory": ACCESSORY_NAME,
            "name": "Test CO2",
            "getUrl": format!("http://{}/co2", addr),
        });
        if let (Some(base), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        HttpCo2Accessory::new(&serde_json::from_value(config).unwrap())
    }

    #[tokio::test]
    async fn test_fetch_extracts_default_pattern() {
        let (addr, hits) = serve(StatusCode::OK, "642 ppm").await;
        let accessory = accessory(addr, json!({}));

        assert_eq!(accessory.get_co2().await.unwrap(), 642.0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_default_pattern_takes_first_digits() {
        let (addr, _) = serve(StatusCode::OK, "CO2: 642 ppm").await;
        let accessory = accessory(addr, json!({}));

        // The "2" in "CO2" is the first run of digits in the body
        assert_eq!(accessory.get_co2().await.unwrap(), 2.0);
    }

    #[tokio::test]
    async fn test_zero_cache_fetches_every_read() {
        let (addr, hits) = serve(StatusCode::OK, "500").await;
        let accessory = accessory(addr, json!({"statusCache": 0}));

        for _ in 0..3 {
            assert_ok!(accessory.get_co2().await);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fresh_cache_returns_characteristic_value() {
        let (addr, hits) = serve(StatusCode::OK, "731").await;
        let accessory = accessory(addr, json!({"statusCache": 60_000}));

        assert_eq!(accessory.read_value().await.unwrap(), 731.0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A push lands in the characteristic; the cached read returns it
        accessory.handle_notification("CarbonDioxideLevel", &json!(455));
        assert_eq!(accessory.read_value().await.unwrap(), 455.0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_error_status_is_reported() {
        let (addr, hits) = serve(StatusCode::INTERNAL_SERVER_ERROR, "800").await;
        let accessory = accessory(addr, json!({"statusCache": 60_000}));

        let err = accessory.get_co2().await.unwrap_err();
        assert!(matches!(err, SensorError::HttpStatus(500)));
        assert_eq!(err.to_string(), "Got http error code 500");

        // No cache update: the next read goes to the network again
        assert_err!(accessory.get_co2().await);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_value_leaves_cache_stale() {
        let (addr, hits) = serve(StatusCode::OK, "150000").await;
        let accessory = accessory(
            addr,
            json!({"statusCache": 60_000, "statusPattern": "(\\d+)"}),
        );

        let err = accessory.read_value().await.unwrap_err();
        assert!(matches!(err, SensorError::Pattern));

        // Rejected values never mark the cache fresh
        let err = accessory.read_value().await.unwrap_err();
        assert!(matches!(err, SensorError::Pattern));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let service = accessory.service().unwrap();
        assert_eq!(service.level(), 0.0);
        assert_eq!(service.version(), 0);
    }

    #[tokio::test]
    async fn test_pattern_mismatch_is_generic_error() {
        let (addr, _) = serve(StatusCode::OK, "sensor warming up").await;
        let accessory = accessory(addr, json!({}));

        let err = accessory.get_co2().await.unwrap_err();
        assert!(matches!(err, SensorError::Pattern));
        assert_eq!(err.to_string(), "pattern error");
    }

    #[tokio::test]
    async fn test_custom_pattern_and_group() {
        let (addr, _) = serve(StatusCode::OK, r#"{"temp":22,"co2":1250}"#).await;
        let accessory = accessory(
            addr,
            json!({"statusPattern": "\"temp\":(\\d+),\"co2\":(\\d+)", "patternGroupToExtract": 2}),
        );

        assert_eq!(accessory.get_co2().await.unwrap(), 1250.0);
    }

    #[tokio::test]
    async fn test_transport_error_is_reported() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let accessory = accessory(addr, json!({}));
        assert!(matches!(
            accessory.get_co2().await.unwrap_err(),
            SensorError::Http(_)
        ));
    }

    #[test]
    fn test_push_overwrites_known_characteristic() {
        let accessory = HttpCo2Accessory::new(
            &serde_json::from_value(json!({"getUrl": "http://127.0.0.1:1/"})).unwrap(),
        );
        let service = Arc::clone(accessory.service().unwrap());

        accessory.handle_notification("CarbonDioxideLevel", &json!(980));
        assert_eq!(service.level(), 980.0);

        accessory.push_update("CarbonDioxideLevel", &json!("1020"));
        assert_eq!(service.level(), 1020.0);
    }

    #[test]
    fn test_push_with_unknown_characteristic_is_dropped() {
        let accessory = HttpCo2Accessory::new(
            &serde_json::from_value(json!({"getUrl": "http://127.0.0.1:1/"})).unwrap(),
        );
        let service = Arc::clone(accessory.service().unwrap());
        service.set_level(400.0).unwrap();

        accessory.handle_notification("CurrentTemperature", &json!(21));
        accessory.handle_notification("Manufacturer", &json!(999));
        accessory.handle_notification("CarbonDioxideLevel", &json!({"bad": true}));

        assert_eq!(service.level(), 400.0);
        assert_eq!(service.version(), 1);
    }

    #[test]
    fn test_missing_url_exposes_no_services() {
        let accessory =
            HttpCo2Accessory::new(&serde_json::from_value(json!({"name": "Broken"})).unwrap());
        assert_eq!(accessory.name(), "Broken");
        assert!(accessory.services().is_empty());
        assert!(accessory.service().is_none());
    }

    #[test]
    fn test_services_include_information() {
        let accessory = HttpCo2Accessory::new(
            &serde_json::from_value(json!({"getUrl": "http://127.0.0.1:1/"})).unwrap(),
        );
        let services = accessory.services();
        let names: Vec<_> = services.iter().map(Service::type_name).collect();
        assert_eq!(names, vec!["AccessoryInformation", "CarbonDioxideSensor"]);

        match &services[0] {
            Service::AccessoryInformation(info) => assert_eq!(info.serial_number, "RBM01"),
            _ => panic!("expected information service first"),
        }
    }

    #[tokio::test]
    async fn test_aborted_accessory_read_fails() {
        let accessory = HttpCo2Accessory::new(&AccessoryConfig::default());
        assert!(matches!(
            accessory.get_co2().await.unwrap_err(),
            SensorError::NoService
        ));
    }

    #[tokio::test]
    async fn test_pull_timer_publishes_values() {
        let (addr, hits) = serve(StatusCode::OK, "777").await;
        let accessory = Arc::new(accessory(addr, json!({"pullInterval": 50})));
        let service = Arc::clone(accessory.service().unwrap());

        let ctx = BridgeContext::new();
        let tasks = Arc::clone(&accessory).start(&ctx);
        assert_eq!(tasks.len(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(service.level(), 777.0);
        assert!(hits.load(Ordering::SeqCst) >= 1);

        ctx.cancel.cancel();
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_postpones_next_pull() {
        let (addr, hits) = serve(StatusCode::INTERNAL_SERVER_ERROR, "offline").await;
        let accessory = Arc::new(accessory(addr, json!({"pullInterval": 10_000})));

        let ctx = BridgeContext::new();
        let tasks = Arc::clone(&accessory).start(&ctx);
        assert_eq!(tasks.len(), 1);

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // Socket I/O runs on the real clock so it cannot auto-advance
        // paused time into the pending pull
        tokio::time::resume();
        assert!(matches!(
            accessory.get_co2().await.unwrap_err(),
            SensorError::HttpStatus(500)
        ));
        tokio::time::pause();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The pull due at 10s moved to 18s
        tokio::time::sleep(Duration::from_secs(4)).await;
        tokio::time::resume();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        ctx.cancel.cancel();
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_start_registers_notification() {
        let accessory = Arc::new(HttpCo2Accessory::new(
            &serde_json::from_value(json!({
                "getUrl": "http://127.0.0.1:1/",
                "notificationID": "co2-test"
            }))
            .unwrap(),
        ));

        let ctx = BridgeContext::new();
        let tasks = Arc::clone(&accessory).start(&ctx);
        assert!(tasks.is_empty());
        assert!(ctx.notifications.is_registered("co2-test"));
    }
}
