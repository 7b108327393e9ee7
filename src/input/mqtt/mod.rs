//! MQTT input source.
//!
//! Subscribes to the configured topics and delivers each message to the
//! accessory's push-update handler.

mod client;
mod integration;

pub use client::{MqttClient, MqttMessage};
pub use integration::MqttIntegration;
