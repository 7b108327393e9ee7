//! Carbon dioxide sensor service state.
//!
//! Holds the CarbonDioxideLevel characteristic value in ppm. Written by the
//! value resolver, the pull timer and pushed updates; last write wins.

use super::{Characteristic, Sensor};
use crate::error::{Result, SensorError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Lowest CO2 level the characteristic accepts (ppm).
pub const MIN_LEVEL: f64 = 0.0;
/// Highest CO2 level the characteristic accepts (ppm).
pub const MAX_LEVEL: f64 = 100_000.0;

/// Thread-safe CO2 sensor state.
///
/// The level is stored as the bit pattern of an `f64` so reads never take
/// a lock.
pub struct CarbonDioxideSensor {
    name: String,
    level: AtomicU64,
    version: AtomicU32,
    last_updated: RwLock<Option<DateTime<Utc>>>,
}

impl CarbonDioxideSensor {
    /// Characteristics registered on this service.
    pub const CHARACTERISTICS: &'static [Characteristic] =
        &[Characteristic::CarbonDioxideLevel];

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: AtomicU64::new(MIN_LEVEL.to_bits()),
            version: AtomicU32::new(0),
            last_updated: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current CO2 level in ppm.
    pub fn level(&self) -> f64 {
        f64::from_bits(self.level.load(Ordering::SeqCst))
    }

    /// Overwrite the CO2 level. Always increments the version.
    pub fn set_level(&self, ppm: f64) -> Result<()> {
        let ppm = check_level(ppm)?;
        self.level.store(ppm.to_bits(), Ordering::SeqCst);
        self.version.fetch_add(1, Ordering::SeqCst);
        *self.last_updated.write() = Some(Utc::now());
        Ok(())
    }

    /// When the level was last written, if ever.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.read()
    }

    /// Resolve a characteristic by name, returning it only if this service
    /// carries it.
    pub fn characteristic(&self, name: &str) -> Option<Characteristic> {
        let characteristic = name.parse::<Characteristic>().ok()?;
        Self::CHARACTERISTICS
            .contains(&characteristic)
            .then_some(characteristic)
    }
}

impl Sensor for CarbonDioxideSensor {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

/// Parse an extracted or pushed text value into a CO2 level.
pub fn parse_level(text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| SensorError::InvalidValue(text.to_string()))
}

/// Accept `ppm` only if the characteristic can hold it.
pub fn check_level(ppm: f64) -> Result<f64> {
    if ppm.is_finite() && (MIN_LEVEL..=MAX_LEVEL).contains(&ppm) {
        Ok(ppm)
    } else {
        Err(SensorError::InvalidValue(ppm.to_string()))
    }
}
