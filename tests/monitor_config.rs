use std::io::Write;
use std::sync::Mutex;

use tempfile::Builder;

use ppe_watch::config::{DetectorBackend, MonitorConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PPE_CONFIG",
        "PPE_SOURCE",
        "PPE_CAMERA_ID",
        "PPE_SITE",
        "PPE_REQUIRED_CLASSES",
        "PPE_TARGET_FPS",
        "PPE_LOG_PERIOD_SECS",
        "PPE_DB_PATH",
        "PPE_SNAPSHOT_DIR",
        "PPE_DETECT_BACKEND",
        "PPE_DETECT_API_URL",
        "PPE_DETECT_MODEL_ID",
        "PPE_DETECT_API_KEY",
        "PPE_MQTT_BROKER_ADDR",
        "PPE_MQTT_USERNAME",
        "PPE_MQTT_PASSWORD",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "source": "rtsp://10.0.0.7/stream1",
        "camera_id": "gate-cam",
        "site": "north_yard",
        "required_gear_classes": ["Helmet", "Vest", "Helmet"],
        "target_analysis_fps": 2.0,
        "log_period_seconds": 10.0,
        "resize": { "max_width": 640, "max_height": 480 },
        "db_path": "yard.db",
        "detector": { "model_id": "ppe-detect/3", "timeout_secs": 4 },
        "mqtt": { "broker_addr": "mqtt://broker.local:1883", "topic_prefix": "site7" }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("PPE_CONFIG", file.path());
    std::env::set_var("PPE_SITE", "south_yard");
    std::env::set_var("PPE_DETECT_API_KEY", "k-123");
    std::env::set_var("PPE_TARGET_FPS", "5");

    let cfg = MonitorConfig::load().expect("load config");

    assert_eq!(cfg.source, "rtsp://10.0.0.7/stream1");
    assert_eq!(cfg.camera_id, "gate-cam");
    assert_eq!(cfg.site, "south_yard");
    assert_eq!(cfg.required_classes.as_slice(), &["Helmet", "Vest"]);
    assert_eq!(cfg.target_analysis_fps, 5.0);
    assert_eq!(cfg.log_period_seconds, 10.0);
    assert_eq!(cfg.resize.max_width, 640);
    assert_eq!(cfg.resize.max_height, 480);
    assert_eq!(cfg.db_path, "yard.db");
    assert_eq!(cfg.snapshot_dir, "output_frames");
    assert_eq!(cfg.detector.backend, DetectorBackend::Http);

    let http = cfg.http_detector().expect("http detector settings");
    assert_eq!(http.api_url, "https://detect.roboflow.com");
    assert_eq!(http.model_id, "ppe-detect/3");
    assert_eq!(http.api_key, "k-123");
    assert_eq!(http.timeout.as_secs(), 4);

    let mqtt = cfg.mqtt_notifier().expect("mqtt settings");
    assert_eq!(mqtt.broker_addr, "mqtt://broker.local:1883");
    assert_eq!(mqtt.topic_prefix, "site7");

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
source = "stub://drill"
site = "drill_floor"
required_gear_classes = ["Helmet", "Goggles"]
log_period_seconds = 2.5

[detector]
backend = "stub"
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("PPE_CONFIG", file.path());

    let cfg = MonitorConfig::load().expect("load config");
    assert_eq!(cfg.site, "drill_floor");
    assert_eq!(cfg.camera_id, "stub://drill");
    assert_eq!(cfg.required_classes.as_slice(), &["Helmet", "Goggles"]);
    assert_eq!(cfg.log_period_seconds, 2.5);
    assert_eq!(cfg.target_analysis_fps, 3.0);
    assert!(cfg.http_detector().is_none());
    assert!(cfg.mqtt_notifier().is_none());

    clear_env();
}

#[test]
fn env_only_config_with_stub_source() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PPE_SITE", "yard");
    std::env::set_var("PPE_REQUIRED_CLASSES", "Helmet, Vest,,Helmet");

    let cfg = MonitorConfig::load().expect("load config");
    assert_eq!(cfg.source, "stub://camera");
    assert_eq!(cfg.required_classes.as_slice(), &["Helmet", "Vest"]);
    assert_eq!(cfg.detector.backend, DetectorBackend::Stub);

    clear_env();
}

#[test]
fn missing_required_settings_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PPE_REQUIRED_CLASSES", "Helmet");
    let err = MonitorConfig::load().unwrap_err();
    assert!(err.to_string().contains("site"));

    std::env::set_var("PPE_SITE", "yard");
    std::env::remove_var("PPE_REQUIRED_CLASSES");
    let err = MonitorConfig::load().unwrap_err();
    assert!(err.to_string().contains("required gear classes"));

    std::env::set_var("PPE_REQUIRED_CLASSES", "Helmet");
    std::env::set_var("PPE_LOG_PERIOD_SECS", "0");
    assert!(MonitorConfig::load().is_err());
    std::env::remove_var("PPE_LOG_PERIOD_SECS");

    std::env::set_var("PPE_SOURCE", "rtsp://cam/1");
    let err = MonitorConfig::load().unwrap_err();
    assert!(err.to_string().contains("model id"));

    clear_env();
}

#[test]
fn overrides_apply_before_validation() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PPE_SOURCE", "rtsp://cam/1");
    let cfg = MonitorConfig::load_with(|cfg| {
        cfg.source = "stub://dry-run".to_string();
        cfg.site = "yard".to_string();
        cfg.required_classes = ppe_watch::RequiredClasses::new(["Vest"]);
    })
    .expect("load config");
    assert_eq!(cfg.detector.backend, DetectorBackend::Stub);
    assert_eq!(cfg.camera_id, "stub://dry-run");

    clear_env();
}
