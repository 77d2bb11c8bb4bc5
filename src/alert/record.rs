use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::pipeline::{should_log, FrameResult, RequiredClasses, SafetyGear};

/// Stream-level identity attached to every record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertContext {
    pub camera_id: String,
    pub site: String,
    pub required_classes: RequiredClasses,
}

/// One violator inside a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViolationEntry {
    pub person_label: String,
    pub safety_gear: SafetyGear,
}

/// The durable unit written once per alert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub camera_id: String,
    pub site: String,
    pub video_timestamp_seconds: f64,
    pub frame_name: String,
    pub required_classes: RequiredClasses,
    pub violations: Vec<ViolationEntry>,
}

/// Deterministic snapshot / frame name: `{site}_{timestamp:.2}`.
pub fn frame_name(site: &str, video_timestamp_seconds: f64) -> String {
    format!("{}_{:.2}", site, video_timestamp_seconds)
}

/// Build a record from the current frame result.
///
/// Returns `None` when no person in the result satisfies `should_log`.
pub fn build_record(
    ctx: &AlertContext,
    video_timestamp_seconds: f64,
    result: &FrameResult,
) -> Option<ViolationRecord> {
    if result.total_violating_persons == 0 {
        return None;
    }

    let violations: Vec<ViolationEntry> = result
        .persons
        .iter()
        .filter(|p| should_log(&p.safety_gear))
        .map(|p| ViolationEntry {
            person_label: p.label.clone(),
            safety_gear: p.safety_gear.clone(),
        })
        .collect();

    if violations.is_empty() {
        return None;
    }

    Some(ViolationRecord {
        camera_id: ctx.camera_id.clone(),
        site: ctx.site.clone(),
        video_timestamp_seconds,
        frame_name: frame_name(&ctx.site, video_timestamp_seconds),
        required_classes: ctx.required_classes.clone(),
        violations,
    })
}

/// Short line identifying the alert.
pub fn notification_subject(record: &ViolationRecord) -> String {
    format!(
        "PPE violation: {} person(s) at {} (camera {}, {:.2}s)",
        record.violations.len(),
        record.site,
        record.camera_id,
        record.video_timestamp_seconds
    )
}

/// Human-readable alert body.
pub fn format_notification(record: &ViolationRecord) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "Hello,\n\n\
         Camera: {}\n\
         Site: {}\n\
         Video Timestamp (seconds): {:?}\n\
         Frame Name: {}\n\
         Required Predictions: {}\n\
         Prediction Details:\n",
        record.camera_id,
        record.site,
        record.video_timestamp_seconds,
        record.frame_name,
        record.required_classes.as_slice().join(", "),
    );
    for entry in &record.violations {
        let _ = write!(
            body,
            "  Person: {}\n  Safety Gear: {}\n",
            entry.person_label, entry.safety_gear
        );
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::RawDetection;
    use crate::pipeline::evaluate;

    fn ctx() -> AlertContext {
        AlertContext {
            camera_id: "cam-1".to_string(),
            site: "yard".to_string(),
            required_classes: RequiredClasses::new(["Helmet", "Vest"]),
        }
    }

    fn violating_result() -> FrameResult {
        let detections = vec![
            RawDetection::new("Person", 0.9, 100.0, 100.0, 50.0, 100.0),
            RawDetection::new("Helmet", 0.8, 100.0, 60.0, 20.0, 15.0),
            RawDetection::new("Vest", 0.8, 100.0, 100.0, 30.0, 30.0),
            RawDetection::new("Person", 0.9, 300.0, 100.0, 50.0, 100.0),
            RawDetection::new("Helmet", 0.8, 300.0, 60.0, 20.0, 15.0),
        ];
        evaluate(&detections, &ctx().required_classes)
    }

    #[test]
    fn record_contains_only_violators() {
        let record = build_record(&ctx(), 5.0, &violating_result()).expect("record");
        assert_eq!(record.frame_name, "yard_5.00");
        assert_eq!(record.violations.len(), 1);
        assert_eq!(record.violations[0].person_label, "Person 2");
        assert!(record.violations.iter().all(|v| should_log(&v.safety_gear)));
    }

    #[test]
    fn no_record_without_violations() {
        assert!(build_record(&ctx(), 0.0, &FrameResult::default()).is_none());
    }

    #[test]
    fn record_serializes_gear_in_order() {
        let record = build_record(&ctx(), 1.5, &violating_result()).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["required_classes"], serde_json::json!(["Helmet", "Vest"]));
        assert_eq!(
            json["violations"][0]["safety_gear"],
            serde_json::json!({"Helmet": true, "Vest": false})
        );
        let back: ViolationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn notification_body_lists_every_violator() {
        let record = build_record(&ctx(), 5.0, &violating_result()).unwrap();
        let body = format_notification(&record);
        assert!(body.starts_with("Hello,\n\nCamera: cam-1\nSite: yard\n"));
        assert!(body.contains("Video Timestamp (seconds): 5.0\n"));
        assert!(body.contains("Frame Name: yard_5.00\n"));
        assert!(body.contains("Required Predictions: Helmet, Vest\n"));
        assert!(body.contains("  Person: Person 2\n  Safety Gear: {'Helmet': true, 'Vest': false}\n"));

        let subject = notification_subject(&record);
        assert!(subject.contains("yard"));
        assert!(subject.contains("cam-1"));
    }
}
