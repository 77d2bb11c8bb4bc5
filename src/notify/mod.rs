//! Notification channel for violation alerts.
//!
//! The pipeline only needs `Notifier::send`. Transports:
//! - `MqttNotifier`: publishes to an MQTT broker (QoS 1)
//! - `LogNotifier`: writes the alert to the log
//! - `MemoryNotifier`: keeps alerts in memory, optionally failing every send

mod mqtt;

use std::sync::Mutex;

use serde::Serialize;

use crate::error::NotifyError;

pub use mqtt::{parse_mqtt_endpoint, MqttEndpoint, MqttNotifier, MqttNotifierConfig};

/// One outgoing alert message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub camera_id: String,
    pub site: String,
    pub subject: String,
    pub body: String,
}

/// Shared across streams, so implementations must be `Sync`.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes alerts to the log at `info`.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        log::info!("{}\n{}", notification.subject, notification.body);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    fail_with: Option<String>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(reason.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(reason) = &self.fail_with {
            return Err(NotifyError::Unavailable(reason.clone()));
        }
        self.sent
            .lock()
            .map_err(|_| NotifyError::Unavailable("notifier lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}
