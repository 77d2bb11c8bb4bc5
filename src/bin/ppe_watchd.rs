//! ppe_watchd - PPE compliance monitor daemon
//!
//! This daemon:
//! 1. Loads configuration (PPE_CONFIG file, PPE_* env, then flags)
//! 2. Opens the violation store, snapshot directory and notifier
//! 3. Runs one stream until it ends, fails or Ctrl-C is received
//! 4. Drains queued alerts before exiting

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use ppe_watch::{
    alert::{AlertPipeline, QueuedAlertSink},
    config::MonitorConfig,
    detect::{DetectionAdapter, HttpDetector, ScriptedDetector},
    driver::{DriverSettings, LogSink, StreamDriver, StreamPhase},
    ingest::SourceSettings,
    notify::{LogNotifier, MqttNotifier, Notifier},
    pipeline::RequiredClasses,
    snapshot::FilesystemSnapshotStore,
    storage::SqliteViolationStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Monitor a video stream for missing PPE")]
struct Args {
    /// Stream source: stub://name, a device index (0-2), a file path or a stream URL.
    #[arg(long)]
    source: Option<String>,

    /// Site name; also prefixes snapshot file names.
    #[arg(long)]
    site: Option<String>,

    /// Comma-separated required gear classes, e.g. "Helmet,Vest".
    #[arg(long)]
    required: Option<String>,

    #[arg(long)]
    camera_id: Option<String>,

    /// Stop a synthetic source after this many frames.
    #[arg(long, env = "PPE_STUB_FRAMES")]
    stub_frames: Option<u64>,

    /// Log every analyzed frame at debug level.
    #[arg(long, default_value_t = false)]
    trace_frames: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = MonitorConfig::load_with(|cfg| {
        if let Some(source) = args.source.clone() {
            cfg.source = source;
        }
        if let Some(site) = args.site.clone() {
            cfg.site = site;
        }
        if let Some(required) = args.required.as_deref() {
            cfg.required_classes = RequiredClasses::new(required.split(','));
        }
        if let Some(camera_id) = args.camera_id.clone() {
            cfg.camera_id = camera_id;
        }
    })?;

    let detector: Box<dyn DetectionAdapter> = match cfg.http_detector() {
        Some(http) => Box::new(HttpDetector::new(http).context("configure http detector")?),
        None => {
            log::warn!("using stub detector: no detections will be produced");
            Box::new(ScriptedDetector::default())
        }
    };

    let store = Arc::new(SqliteViolationStore::open(&cfg.db_path).context("open violation store")?);
    let snapshots = Arc::new(
        FilesystemSnapshotStore::new(&cfg.snapshot_dir).context("open snapshot directory")?,
    );
    let notifier: Arc<dyn Notifier> = match cfg.mqtt_notifier() {
        Some(mqtt) => Arc::new(MqttNotifier::connect(&mqtt)?),
        None => Arc::new(LogNotifier),
    };

    log::info!(
        "ppe_watchd {} running. site={} camera={} required=[{}] db={} snapshots={} notifier={}",
        env!("CARGO_PKG_VERSION"),
        cfg.site,
        cfg.camera_id,
        cfg.required_classes.as_slice().join(", "),
        cfg.db_path,
        cfg.snapshot_dir,
        notifier.name()
    );

    let pipeline = AlertPipeline::new(store, notifier, snapshots);
    let sink = QueuedAlertSink::spawn(pipeline, cfg.dispatch_queue_capacity);

    let mut driver = StreamDriver::new(
        detector,
        Box::new(sink),
        cfg.alert_context(),
        DriverSettings {
            target_analysis_fps: cfg.target_analysis_fps,
            log_period_seconds: cfg.log_period_seconds,
            resize: cfg.resize,
        },
    );
    if args.trace_frames {
        driver = driver.with_frame_sink(Box::new(LogSink));
    }

    let stop = driver.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let source_settings = SourceSettings {
        synthetic_frames: args.stub_frames,
        ..SourceSettings::default()
    };
    let summary = driver.run(&cfg.source, &source_settings);

    log::info!("draining alert queue...");
    drop(driver.into_sink());

    log::info!(
        "frames={} analyzed={} detection_failures={} alerts={} alert_failures={}",
        summary.frames_read,
        summary.frames_analyzed,
        summary.detection_failures,
        summary.alerts_emitted,
        summary.alert_failures
    );

    if summary.phase == StreamPhase::Error {
        return Err(anyhow!(
            "stream {} failed: {}",
            cfg.source,
            summary.error.unwrap_or_default()
        ));
    }
    Ok(())
}
