//! Push notifications.
//!
//! Accessories register a notification ID (optionally protected by a
//! password); the [`NotificationServer`] routes incoming
//! `{characteristic, value}` bodies to the registered handler.

mod server;

pub use server::{NotificationBody, NotificationServer};

use crate::device::SensorValueProvider;
use log::{info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct Registration {
    password: Option<String>,
    handler: Arc<dyn SensorValueProvider>,
}

/// Outcome of routing a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    UnknownId,
    Unauthorized,
}

/// Notification IDs and the handlers they route to.
#[derive(Default)]
pub struct NotificationRegistry {
    registrations: RwLock<HashMap<String, Registration>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `id`, replacing any previous registration.
    pub fn register(
        &self,
        id: &str,
        password: Option<&str>,
        handler: Arc<dyn SensorValueProvider>,
    ) {
        let previous = self.registrations.write().insert(
            id.to_string(),
            Registration {
                password: password.map(str::to_string),
                handler,
            },
        );
        if previous.is_some() {
            warn!("[Notify] Notification ID '{}' registered twice, replacing", id);
        } else {
            info!("[Notify] Registered notification ID '{}'", id);
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.registrations.read().contains_key(id)
    }

    /// Whether `id` is registered and `password` satisfies it.
    pub fn authorize(&self, id: &str, password: Option<&str>) -> Delivery {
        match self.registrations.read().get(id) {
            None => Delivery::UnknownId,
            Some(registration) => match &registration.password {
                Some(expected) if password != Some(expected.as_str()) => Delivery::Unauthorized,
                _ => Delivery::Delivered,
            },
        }
    }

    /// Route a notification to the handler registered under `id`.
    pub fn deliver(&self, id: &str, body: &NotificationBody) -> Delivery {
        let outcome = self.authorize(id, body.password.as_deref());
        if outcome != Delivery::Delivered {
            return outcome;
        }

        // Clone the handler so it runs without holding the lock
        let handler = match self.registrations.read().get(id) {
            Some(registration) => Arc::clone(&registration.handler),
            None => return Delivery::UnknownId,
        };
        handler.push_update(&body.characteristic, &body.value);
        Delivery::Delivered
    }
}

/// Register `handler` when a notification ID is configured.
pub fn register_if_defined(
    registry: &NotificationRegistry,
    id: Option<&str>,
    password: Option<&str>,
    handler: Arc<dyn SensorValueProvider>,
) {
    if let Some(id) = id {
        registry.register(id, password, handler);
    }
}
