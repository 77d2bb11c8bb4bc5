//! Groups raw detections into persons and checks which required gear each wears.
//!
//! A gear detection belongs to a person when its center lies inside the person's
//! box, edges included. A gear box overlapping two persons counts for both.

use crate::detect::RawDetection;
use crate::pipeline::model::{Person, RequiredClasses, SafetyGear};

/// Every person detection with its gear presence map, in detection order.
///
/// Labels are `"Person {ordinal}"` where the ordinal counts all person
/// detections, so the same detection order yields the same labels.
pub fn aggregate_persons(detections: &[RawDetection], required: &RequiredClasses) -> Vec<Person> {
    detections
        .iter()
        .filter(|d| d.is_person())
        .enumerate()
        .map(|(idx, person)| Person {
            label: format!("Person {}", idx + 1),
            detection: person.clone(),
            safety_gear: analyze_safety_gear(detections, person, required),
        })
        .collect()
}

/// Presence of each required class inside `person`'s box.
pub fn analyze_safety_gear(
    detections: &[RawDetection],
    person: &RawDetection,
    required: &RequiredClasses,
) -> SafetyGear {
    let person_box = person.bounding_box();
    let mut gear = SafetyGear::absent(required);

    for detection in detections {
        if detection.is_person() || !required.contains(&detection.class_label) {
            continue;
        }
        if person_box.contains(detection.center_x, detection.center_y) {
            gear.mark_present(&detection.class_label);
        }
    }
    gear
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> RequiredClasses {
        RequiredClasses::new(["Helmet", "Vest"])
    }

    #[test]
    fn gear_inside_box_is_present() {
        let detections = vec![
            RawDetection::new("Person", 0.9, 100.0, 100.0, 50.0, 100.0),
            RawDetection::new("Helmet", 0.8, 100.0, 60.0, 20.0, 15.0),
            RawDetection::new("Vest", 0.7, 300.0, 100.0, 30.0, 30.0),
        ];
        let persons = aggregate_persons(&detections, &required());
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0].label, "Person 1");
        assert_eq!(persons[0].safety_gear.is_present("Helmet"), Some(true));
        assert_eq!(persons[0].safety_gear.is_present("Vest"), Some(false));
    }

    #[test]
    fn gear_center_on_box_edge_counts() {
        // Person box spans x 75..=125, y 50..=150.
        let detections = vec![
            RawDetection::new("Person", 0.9, 100.0, 100.0, 50.0, 100.0),
            RawDetection::new("Helmet", 0.8, 125.0, 50.0, 10.0, 10.0),
            RawDetection::new("Vest", 0.8, 75.0, 150.0, 10.0, 10.0),
        ];
        let persons = aggregate_persons(&detections, &required());
        assert_eq!(persons[0].safety_gear.is_present("Helmet"), Some(true));
        assert_eq!(persons[0].safety_gear.is_present("Vest"), Some(true));
    }

    #[test]
    fn duplicate_gear_is_idempotent_and_unrequired_classes_ignored() {
        let detections = vec![
            RawDetection::new("Person", 0.9, 100.0, 100.0, 50.0, 100.0),
            RawDetection::new("Helmet", 0.8, 100.0, 60.0, 20.0, 15.0),
            RawDetection::new("Helmet", 0.6, 102.0, 62.0, 20.0, 15.0),
            RawDetection::new("Gloves", 0.6, 100.0, 120.0, 10.0, 10.0),
        ];
        let persons = aggregate_persons(&detections, &required());
        let gear: Vec<_> = persons[0].safety_gear.iter().collect();
        assert_eq!(gear, vec![("Helmet", true), ("Vest", false)]);
    }

    #[test]
    fn labels_count_every_person_in_detection_order() {
        let detections = vec![
            RawDetection::new("Helmet", 0.8, 500.0, 500.0, 10.0, 10.0),
            RawDetection::new("Person", 0.9, 100.0, 100.0, 50.0, 100.0),
            RawDetection::new("Person", 0.9, 300.0, 100.0, 50.0, 100.0),
            RawDetection::new("Person", 0.9, 500.0, 520.0, 50.0, 100.0),
        ];
        let labels: Vec<_> = aggregate_persons(&detections, &required())
            .into_iter()
            .map(|p| p.label)
            .collect();
        assert_eq!(labels, vec!["Person 1", "Person 2", "Person 3"]);
    }

    #[test]
    fn no_required_classes_yields_empty_gear() {
        let detections = vec![RawDetection::new("Person", 0.9, 1.0, 1.0, 2.0, 2.0)];
        let persons = aggregate_persons(&detections, &RequiredClasses::default());
        assert!(persons[0].safety_gear.is_empty());
    }
}
