use serde::{Deserialize, Serialize};

/// Class label the model uses for people.
pub const PERSON_CLASS: &str = "Person";

/// One box returned by the detection model.
///
/// Coordinates are in pixel space of the frame that was submitted (after resize).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_label: String,
    pub confidence: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

impl RawDetection {
    pub fn new(
        class_label: impl Into<String>,
        confidence: f32,
        center_x: f32,
        center_y: f32,
        width: f32,
        height: f32,
    ) -> Self {
        Self {
            class_label: class_label.into(),
            confidence,
            center_x,
            center_y,
            width,
            height,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class_label == PERSON_CLASS
    }

    /// Geometry must be finite with non-negative size.
    pub fn check_geometry(&self) -> Result<(), String> {
        if ![
            self.confidence,
            self.center_x,
            self.center_y,
            self.width,
            self.height,
        ]
        .iter()
        .all(|v| v.is_finite())
        {
            return Err(format!("non-finite geometry for class '{}'", self.class_label));
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(format!("negative box size for class '{}'", self.class_label));
        }
        Ok(())
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox {
            x_min: self.center_x - self.width / 2.0,
            x_max: self.center_x + self.width / 2.0,
            y_min: self.center_y - self.height / 2.0,
            y_max: self.center_y + self.height / 2.0,
        }
    }

    /// `Class: 0.88`, as shown in frame logs.
    pub fn label(&self) -> String {
        format!("{}: {:.2}", self.class_label, self.confidence)
    }
}

/// Axis-aligned box derived from a detection's center and size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl BoundingBox {
    /// Inclusive on all four edges.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.x_min <= x && x <= self.x_max && self.y_min <= y && y <= self.y_max
    }
}

/// Wire shape of a single prediction as returned by hosted inference.
///
/// Every field is optional so that one bad entry can be dropped without
/// rejecting the rest of the response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct WirePrediction {
    #[serde(rename = "class")]
    class_label: Option<String>,
    confidence: Option<f32>,
    x: Option<f32>,
    y: Option<f32>,
    width: Option<f32>,
    height: Option<f32>,
}

impl TryFrom<WirePrediction> for RawDetection {
    type Error = String;

    fn try_from(wire: WirePrediction) -> Result<Self, Self::Error> {
        let class_label = wire.class_label.ok_or("missing field 'class'")?;
        let confidence = wire.confidence.ok_or("missing field 'confidence'")?;
        let center_x = wire.x.ok_or("missing field 'x'")?;
        let center_y = wire.y.ok_or("missing field 'y'")?;
        let width = wire.width.ok_or("missing field 'width'")?;
        let height = wire.height.ok_or("missing field 'height'")?;

        let detection = RawDetection {
            class_label,
            confidence,
            center_x,
            center_y,
            width,
            height,
        };
        detection.check_geometry()?;
        Ok(detection)
    }
}

/// Validate a list of raw prediction values, dropping malformed entries.
pub(crate) fn validate_predictions(predictions: Vec<serde_json::Value>) -> Vec<RawDetection> {
    predictions
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| {
            let parsed = serde_json::from_value::<WirePrediction>(value)
                .map_err(|e| e.to_string())
                .and_then(RawDetection::try_from);
            match parsed {
                Ok(detection) => Some(detection),
                Err(reason) => {
                    log::warn!("dropping malformed detection #{}: {}", idx, reason);
                    None
                }
            }
        })
        .collect()
}

/// Drop adapter output with unusable geometry, whatever adapter produced it.
pub fn retain_well_formed(detections: Vec<RawDetection>) -> Vec<RawDetection> {
    detections
        .into_iter()
        .filter(|detection| match detection.check_geometry() {
            Ok(()) => true,
            Err(reason) => {
                log::warn!("dropping detection: {}", reason);
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bounding_box_from_center_and_size() {
        let det = RawDetection::new("Person", 0.9, 100.0, 50.0, 40.0, 80.0);
        let bbox = det.bounding_box();
        assert_eq!(bbox.x_min, 80.0);
        assert_eq!(bbox.x_max, 120.0);
        assert_eq!(bbox.y_min, 10.0);
        assert_eq!(bbox.y_max, 90.0);
    }

    #[test]
    fn containment_is_inclusive_at_edges() {
        let bbox = RawDetection::new("Person", 0.9, 100.0, 50.0, 40.0, 80.0).bounding_box();
        assert!(bbox.contains(80.0, 10.0));
        assert!(bbox.contains(120.0, 90.0));
        assert!(bbox.contains(80.0, 90.0));
        assert!(!bbox.contains(79.99, 50.0));
        assert!(!bbox.contains(100.0, 90.01));
    }

    #[test]
    fn malformed_predictions_are_dropped() {
        let predictions = vec![
            json!({"class": "Person", "confidence": 0.91, "x": 10.0, "y": 20.0, "width": 5.0, "height": 8.0}),
            json!({"class": "Helmet", "confidence": 0.8, "x": 10.0, "y": 20.0, "width": 2.0}),
            json!({"confidence": 0.8, "x": 1.0, "y": 2.0, "width": 2.0, "height": 2.0}),
            json!({"class": "Vest", "confidence": "high", "x": 1.0, "y": 2.0, "width": 2.0, "height": 2.0}),
            json!("not an object"),
            json!({"class": "Vest", "confidence": 0.7, "x": 11.0, "y": 21.0, "width": 3.0, "height": 3.0, "class_id": 4}),
        ];

        let detections = validate_predictions(predictions);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_label, "Person");
        assert_eq!(detections[1].class_label, "Vest");
        assert_eq!(detections[1].center_x, 11.0);
    }

    #[test]
    fn retain_well_formed_drops_bad_geometry() {
        let detections = vec![
            RawDetection::new("Person", 0.9, 50.0, 50.0, 40.0, 40.0),
            RawDetection::new("Vest", 0.8, 50.0, 50.0, -10.0, 10.0),
            RawDetection::new("Helmet", f32::NAN, 50.0, 50.0, 10.0, 10.0),
        ];
        let kept = retain_well_formed(detections);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].is_person());
    }

    #[test]
    fn label_formats_confidence() {
        let det = RawDetection::new("Helmet", 0.876, 0.0, 0.0, 1.0, 1.0);
        assert_eq!(det.label(), "Helmet: 0.88");
    }
}
