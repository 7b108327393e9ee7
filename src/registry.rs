//! Accessory type registry.
//!
//! The host creates a registry at startup and hands it to each plugin's
//! `register` function; configured accessory blocks are then instantiated
//! by their `accessory` type name.

use crate::config::AccessoryConfig;
use crate::device::Accessory;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

pub type AccessoryFactory = Box<dyn Fn(&AccessoryConfig) -> Arc<dyn Accessory> + Send + Sync>;

struct Entry {
    plugin: String,
    factory: AccessoryFactory,
}

#[derive(Default)]
pub struct AccessoryRegistry {
    entries: HashMap<String, Entry>,
}

impl AccessoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for accessory blocks whose `accessory` is
    /// `accessory_name`.
    pub fn register_accessory(
        &mut self,
        plugin: &str,
        accessory_name: &str,
        factory: AccessoryFactory,
    ) {
        info!("Registering accessory '{}' from {}", accessory_name, plugin);
        let previous = self.entries.insert(
            accessory_name.to_string(),
            Entry {
                plugin: plugin.to_string(),
                factory,
            },
        );
        if let Some(previous) = previous {
            warn!(
                "Accessory '{}' from {} replaced by {}",
                accessory_name, previous.plugin, plugin
            );
        }
    }

    /// Instantiate an accessory block. Returns `None` for unknown or missing
    /// accessory types.
    pub fn create(&self, config: &AccessoryConfig) -> Option<Arc<dyn Accessory>> {
        let Some(kind) = config.accessory.as_deref() else {
            warn!("Accessory block without 'accessory' type, skipping");
            return None;
        };
        match self.entries.get(kind) {
            Some(entry) => Some((entry.factory)(config)),
            None => {
                warn!("No plugin provides accessory type '{}', skipping", kind);
                None
            }
        }
    }
}
