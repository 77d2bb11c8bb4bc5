//! MQTT alert transport.
//!
//! Alerts are published as JSON (`Notification`) with QoS 1 on
//! `{topic_prefix}/alerts/{camera}`. The connection event loop runs on its own
//! thread and keeps polling through broker errors, backing off between
//! attempts; `Drop` raises the shutdown flag, disconnects and joins it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Event, MqttOptions};
use rumqttc::Transport;

use super::{Notification, Notifier};
use crate::error::NotifyError;

const REQUEST_CAPACITY: usize = 10;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Parsed broker address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

#[derive(Clone, Debug)]
pub struct MqttNotifierConfig {
    pub broker_addr: String,
    pub client_id: String,
    pub topic_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub struct MqttNotifier {
    client: Client,
    topic_prefix: String,
    shutdown: Arc<AtomicBool>,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MqttNotifier {
    pub fn connect(config: &MqttNotifierConfig) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&config.broker_addr)?;
        let mut options = MqttOptions::new(&config.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = config.username.as_deref() {
            options.set_credentials(user, config.password.as_deref().unwrap_or_default());
        }
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_shutdown = shutdown.clone();
        let handle = std::thread::spawn(move || {
            let mut backoff = INITIAL_BACKOFF;
            // The event loop reconnects on the next poll after an error.
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => backoff = INITIAL_BACKOFF,
                    Err(e) => {
                        if loop_shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        log::warn!("MQTT connection error: {} (retrying in {:?})", e, backoff);
                        if !sleep_unless_shutdown(&loop_shutdown, backoff) {
                            break;
                        }
                        backoff = next_backoff(backoff);
                    }
                }
            }
            log::debug!("MQTT connection loop stopped");
        });

        log::info!(
            "alert notifier using MQTT broker {}:{} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            config.username.is_some()
        );
        Ok(Self {
            client,
            topic_prefix: config.topic_prefix.trim_end_matches('/').to_string(),
            shutdown,
            connection_handle: Mutex::new(Some(handle)),
        })
    }

    fn topic_for(&self, camera_id: &str) -> String {
        format!("{}/alerts/{}", self.topic_prefix, sanitize_topic_level(camera_id))
    }
}

impl Notifier for MqttNotifier {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(notification)
            .map_err(|e| NotifyError::Rejected(format!("encode notification: {}", e)))?;
        self.client
            .publish(
                self.topic_for(&notification.camera_id),
                QoS::AtLeastOnce,
                false,
                payload,
            )
            .map_err(|e| NotifyError::Unavailable(e.to_string()))
    }
}

impl Drop for MqttNotifier {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.client.disconnect();
        if let Ok(mut guard) = self.connection_handle.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Parse `host:port`, `mqtt://host:port` or `mqtts://host:port`.
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = if let Some(rest) = remainder.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        (host, port)
    } else {
        remainder
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?
    };
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))?;

    Ok(MqttEndpoint {
        host: host.to_string(),
        port,
        use_tls,
    })
}

fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_BACKOFF)
}

/// Sleep for `total`, waking early once `shutdown` is raised. Returns false if it was.
fn sleep_unless_shutdown(shutdown: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(SHUTDOWN_POLL);
        std::thread::sleep(step);
        remaining -= step;
    }
    !shutdown.load(Ordering::SeqCst)
}

fn sanitize_topic_level(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '+' | '#' | ' ' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_scheme_addresses() {
        let ep = parse_mqtt_endpoint("127.0.0.1:1883").unwrap();
        assert_eq!(ep.host, "127.0.0.1");
        assert_eq!(ep.port, 1883);
        assert!(!ep.use_tls);

        let ep = parse_mqtt_endpoint("mqtts://broker.local:8883").unwrap();
        assert_eq!(ep.host, "broker.local");
        assert!(ep.use_tls);

        let ep = parse_mqtt_endpoint("[::1]:1883").unwrap();
        assert_eq!(ep.host, "::1");
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(parse_mqtt_endpoint("broker.local").is_err());
        assert!(parse_mqtt_endpoint("http://broker:80").is_err());
        assert!(parse_mqtt_endpoint("broker:notaport").is_err());
        assert!(parse_mqtt_endpoint(":1883").is_err());
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        assert_eq!(next_backoff(INITIAL_BACKOFF), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(16)), MAX_BACKOFF);
        assert_eq!(next_backoff(MAX_BACKOFF), MAX_BACKOFF);
    }

    #[test]
    fn raised_shutdown_cuts_backoff_short() {
        let shutdown = AtomicBool::new(true);
        let started = std::time::Instant::now();
        assert!(!sleep_unless_shutdown(&shutdown, MAX_BACKOFF));
        assert!(started.elapsed() < Duration::from_secs(1));

        let running = AtomicBool::new(false);
        assert!(sleep_unless_shutdown(&running, Duration::from_millis(10)));
    }

    #[test]
    fn camera_ids_are_safe_topic_levels() {
        assert_eq!(sanitize_topic_level("/dev/video0"), "_dev_video0");
        assert_eq!(sanitize_topic_level("gate #2"), "gate__2");
    }
}
