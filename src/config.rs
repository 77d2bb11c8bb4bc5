use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::alert::{AlertContext, DEFAULT_DISPATCH_CAPACITY};
use crate::detect::{HttpDetectorConfig, PERSON_CLASS};
use crate::frame::{ResizeBounds, DEFAULT_RESIZE_MAX_HEIGHT, DEFAULT_RESIZE_MAX_WIDTH};
use crate::ingest::STUB_SCHEME;
use crate::notify::MqttNotifierConfig;
use crate::pipeline::RequiredClasses;
use crate::snapshot::DEFAULT_SNAPSHOT_DIR;

const DEFAULT_SOURCE: &str = "stub://camera";
const DEFAULT_TARGET_FPS: f64 = 3.0;
const DEFAULT_LOG_PERIOD_SECS: f64 = 5.0;
const DEFAULT_DB_PATH: &str = "ppe_watch.db";
const DEFAULT_DETECT_API_URL: &str = "https://detect.roboflow.com";
const DEFAULT_DETECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MQTT_TOPIC_PREFIX: &str = "ppe";
const SITE_PATTERN: &str = r"^[A-Za-z0-9_.-]{1,64}$";

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    source: Option<String>,
    camera_id: Option<String>,
    site: Option<String>,
    required_gear_classes: Option<Vec<String>>,
    target_analysis_fps: Option<f64>,
    log_period_seconds: Option<f64>,
    resize: Option<ResizeConfigFile>,
    db_path: Option<String>,
    snapshot_dir: Option<String>,
    detector: Option<DetectorConfigFile>,
    mqtt: Option<MqttConfigFile>,
    dispatch_queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ResizeConfigFile {
    max_width: Option<u32>,
    max_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<DetectorBackend>,
    api_url: Option<String>,
    model_id: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker_addr: Option<String>,
    topic_prefix: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    Http,
    Stub,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub source: String,
    pub camera_id: String,
    pub site: String,
    pub required_classes: RequiredClasses,
    pub target_analysis_fps: f64,
    pub log_period_seconds: f64,
    pub resize: ResizeBounds,
    pub db_path: String,
    pub snapshot_dir: String,
    pub detector: DetectorSettings,
    pub mqtt: MqttSettings,
    pub dispatch_queue_capacity: usize,
    backend_explicit: bool,
}

#[derive(Clone)]
pub struct DetectorSettings {
    pub backend: DetectorBackend,
    pub api_url: String,
    pub model_id: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for DetectorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorSettings")
            .field("backend", &self.backend)
            .field("api_url", &self.api_url)
            .field("model_id", &self.model_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct MqttSettings {
    pub broker_addr: Option<String>,
    pub topic_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSettings")
            .field("broker_addr", &self.broker_addr)
            .field("topic_prefix", &self.topic_prefix)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl MonitorConfig {
    pub fn load() -> Result<Self> {
        Self::load_with(|_| {})
    }

    /// Load, then apply `overrides` (e.g. command-line flags) before validation.
    pub fn load_with(overrides: impl FnOnce(&mut Self)) -> Result<Self> {
        let config_path = std::env::var("PPE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        overrides(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let source = file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let resize = ResizeBounds {
            max_width: file
                .resize
                .as_ref()
                .and_then(|resize| resize.max_width)
                .unwrap_or(DEFAULT_RESIZE_MAX_WIDTH),
            max_height: file
                .resize
                .as_ref()
                .and_then(|resize| resize.max_height)
                .unwrap_or(DEFAULT_RESIZE_MAX_HEIGHT),
        };
        let detector_file = file.detector.unwrap_or_default();
        let backend_explicit = detector_file.backend.is_some();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| default_backend(&source)),
            api_url: detector_file
                .api_url
                .unwrap_or_else(|| DEFAULT_DETECT_API_URL.to_string()),
            model_id: detector_file.model_id,
            api_key: None,
            timeout: Duration::from_secs(
                detector_file
                    .timeout_secs
                    .unwrap_or(DEFAULT_DETECT_TIMEOUT_SECS),
            ),
        };
        let mqtt_file = file.mqtt.unwrap_or_default();
        let mqtt = MqttSettings {
            broker_addr: mqtt_file.broker_addr,
            topic_prefix: mqtt_file
                .topic_prefix
                .unwrap_or_else(|| DEFAULT_MQTT_TOPIC_PREFIX.to_string()),
            username: None,
            password: None,
        };

        Self {
            camera_id: file.camera_id.unwrap_or_default(),
            site: file.site.unwrap_or_default(),
            required_classes: RequiredClasses::new(file.required_gear_classes.unwrap_or_default()),
            target_analysis_fps: file.target_analysis_fps.unwrap_or(DEFAULT_TARGET_FPS),
            log_period_seconds: file.log_period_seconds.unwrap_or(DEFAULT_LOG_PERIOD_SECS),
            resize,
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            snapshot_dir: file
                .snapshot_dir
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_DIR.to_string()),
            detector,
            mqtt,
            dispatch_queue_capacity: file
                .dispatch_queue_capacity
                .unwrap_or(DEFAULT_DISPATCH_CAPACITY),
            backend_explicit,
            source,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = non_empty_env("PPE_SOURCE") {
            self.source = source;
        }
        if let Some(camera_id) = non_empty_env("PPE_CAMERA_ID") {
            self.camera_id = camera_id;
        }
        if let Some(site) = non_empty_env("PPE_SITE") {
            self.site = site;
        }
        if let Some(classes) = non_empty_env("PPE_REQUIRED_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.required_classes = RequiredClasses::new(parsed);
            }
        }
        if let Some(fps) = non_empty_env("PPE_TARGET_FPS") {
            self.target_analysis_fps = fps
                .parse()
                .map_err(|_| anyhow!("PPE_TARGET_FPS must be a number"))?;
        }
        if let Some(period) = non_empty_env("PPE_LOG_PERIOD_SECS") {
            self.log_period_seconds = period
                .parse()
                .map_err(|_| anyhow!("PPE_LOG_PERIOD_SECS must be a number of seconds"))?;
        }
        if let Some(path) = non_empty_env("PPE_DB_PATH") {
            self.db_path = path;
        }
        if let Some(dir) = non_empty_env("PPE_SNAPSHOT_DIR") {
            self.snapshot_dir = dir;
        }
        if let Some(backend) = non_empty_env("PPE_DETECT_BACKEND") {
            self.set_detector_backend(match backend.to_ascii_lowercase().as_str() {
                "http" => DetectorBackend::Http,
                "stub" => DetectorBackend::Stub,
                other => return Err(anyhow!("PPE_DETECT_BACKEND must be http or stub, got '{}'", other)),
            });
        }
        if let Some(url) = non_empty_env("PPE_DETECT_API_URL") {
            self.detector.api_url = url;
        }
        if let Some(model_id) = non_empty_env("PPE_DETECT_MODEL_ID") {
            self.detector.model_id = Some(model_id);
        }
        self.detector.api_key = non_empty_env("PPE_DETECT_API_KEY");
        if let Some(addr) = non_empty_env("PPE_MQTT_BROKER_ADDR") {
            self.mqtt.broker_addr = Some(addr);
        }
        self.mqtt.username = non_empty_env("PPE_MQTT_USERNAME");
        self.mqtt.password = non_empty_env("PPE_MQTT_PASSWORD");
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.source = self.source.trim().to_string();
        if self.source.is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        if self.camera_id.trim().is_empty() {
            self.camera_id = self.source.clone();
        }
        if !self.backend_explicit {
            self.detector.backend = default_backend(&self.source);
        }
        if self.site.is_empty() {
            return Err(anyhow!("site is required (set PPE_SITE or `site`)"));
        }
        let site_re = Regex::new(SITE_PATTERN)?;
        if !site_re.is_match(&self.site) {
            return Err(anyhow!(
                "site '{}' must match {} since it names snapshot files",
                self.site,
                SITE_PATTERN
            ));
        }
        if self.required_classes.is_empty() {
            return Err(anyhow!(
                "required gear classes must be supplied (PPE_REQUIRED_CLASSES or `required_gear_classes`)"
            ));
        }
        if self.required_classes.contains(PERSON_CLASS) {
            return Err(anyhow!(
                "'{}' marks the person being checked and cannot be required gear",
                PERSON_CLASS
            ));
        }
        if !(self.target_analysis_fps.is_finite() && self.target_analysis_fps > 0.0) {
            return Err(anyhow!("target analysis fps must be greater than zero"));
        }
        if !(self.log_period_seconds.is_finite() && self.log_period_seconds > 0.0) {
            return Err(anyhow!("log period must be greater than zero"));
        }
        if self.resize.max_width == 0 || self.resize.max_height == 0 {
            return Err(anyhow!("resize bounds must be greater than zero"));
        }
        if self.dispatch_queue_capacity == 0 {
            return Err(anyhow!("dispatch queue capacity must be greater than zero"));
        }
        if self.detector.backend == DetectorBackend::Http {
            if self.detector.model_id.is_none() {
                return Err(anyhow!(
                    "http detector requires a model id (PPE_DETECT_MODEL_ID)"
                ));
            }
            if self.detector.api_key.is_none() {
                return Err(anyhow!(
                    "http detector requires an API key (PPE_DETECT_API_KEY)"
                ));
            }
        }
        Ok(())
    }

    /// Pin the detector backend instead of deriving it from the source.
    pub fn set_detector_backend(&mut self, backend: DetectorBackend) {
        self.detector.backend = backend;
        self.backend_explicit = true;
    }

    pub fn alert_context(&self) -> AlertContext {
        AlertContext {
            camera_id: self.camera_id.clone(),
            site: self.site.clone(),
            required_classes: self.required_classes.clone(),
        }
    }

    /// Settings for the hosted detector; `None` when the stub backend is selected.
    pub fn http_detector(&self) -> Option<HttpDetectorConfig> {
        if self.detector.backend != DetectorBackend::Http {
            return None;
        }
        Some(HttpDetectorConfig {
            api_url: self.detector.api_url.clone(),
            model_id: self.detector.model_id.clone()?,
            api_key: self.detector.api_key.clone()?,
            timeout: self.detector.timeout,
        })
    }

    /// MQTT settings when a broker is configured.
    pub fn mqtt_notifier(&self) -> Option<MqttNotifierConfig> {
        let broker_addr = self.mqtt.broker_addr.clone()?;
        Some(MqttNotifierConfig {
            broker_addr,
            client_id: format!("ppe-watch-{}", self.site),
            topic_prefix: self.mqtt.topic_prefix.clone(),
            username: self.mqtt.username.clone(),
            password: self.mqtt.password.clone(),
        })
    }
}

fn default_backend(source: &str) -> DetectorBackend {
    if source.trim().starts_with(STUB_SCHEME) {
        DetectorBackend::Stub
    } else {
        DetectorBackend::Http
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MonitorConfig {
        let mut cfg = MonitorConfig::from_file(MonitorConfigFile {
            site: Some("yard".to_string()),
            required_gear_classes: Some(vec!["Helmet".to_string(), "Vest".to_string()]),
            ..MonitorConfigFile::default()
        });
        cfg.validate().unwrap();
        cfg
    }

    #[test]
    fn defaults_follow_documented_values() {
        let cfg = base();
        assert_eq!(cfg.source, DEFAULT_SOURCE);
        assert_eq!(cfg.camera_id, DEFAULT_SOURCE);
        assert_eq!(cfg.target_analysis_fps, 3.0);
        assert_eq!(cfg.log_period_seconds, 5.0);
        assert_eq!(cfg.resize, ResizeBounds::default());
        assert_eq!(cfg.detector.backend, DetectorBackend::Stub);
        assert!(cfg.http_detector().is_none());
        assert!(cfg.mqtt_notifier().is_none());
        assert_eq!(cfg.dispatch_queue_capacity, DEFAULT_DISPATCH_CAPACITY);
    }

    #[test]
    fn site_must_be_safe_for_file_names() {
        let mut cfg = base();
        cfg.site = "../yard".to_string();
        assert!(cfg.validate().is_err());
        cfg.site = "yard_north-2".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn person_class_is_not_gear() {
        let mut cfg = base();
        cfg.required_classes = RequiredClasses::new(["Helmet", "Person"]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("cannot be required gear"));
    }

    #[test]
    fn http_backend_requires_credentials() {
        let mut cfg = base();
        cfg.set_detector_backend(DetectorBackend::Http);
        cfg.detector.model_id = Some("ppe-detect/3".to_string());
        assert!(cfg.validate().is_err());
        cfg.detector.api_key = Some("secret".to_string());
        cfg.validate().unwrap();
        let http = cfg.http_detector().unwrap();
        assert_eq!(http.model_id, "ppe-detect/3");
        assert!(!format!("{:?}", cfg.detector).contains("secret"));
    }

    #[test]
    fn non_stub_sources_default_to_http() {
        assert_eq!(default_backend("rtsp://cam/1"), DetectorBackend::Http);
        assert_eq!(default_backend("0"), DetectorBackend::Http);
        assert_eq!(default_backend("stub://x"), DetectorBackend::Stub);
    }

    #[test]
    fn split_csv_drops_blanks() {
        assert_eq!(split_csv(" Helmet, ,Vest ,"), vec!["Helmet", "Vest"]);
    }
}
