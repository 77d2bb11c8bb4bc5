//! Per-person and per-frame compliance decisions.

use crate::detect::RawDetection;
use crate::pipeline::aggregate::aggregate_persons;
use crate::pipeline::model::{FrameResult, RequiredClasses, SafetyGear};

/// True iff at least one required class is absent.
///
/// An empty map is never a violation.
pub fn should_log(safety_gear: &SafetyGear) -> bool {
    safety_gear.iter().any(|(_, present)| !present)
}

/// Evaluate one analyzed frame. Compliant persons are counted, then discarded.
pub fn evaluate(detections: &[RawDetection], required: &RequiredClasses) -> FrameResult {
    let persons = aggregate_persons(detections, required);
    let persons_detected = persons.len();

    if required.is_empty() {
        return FrameResult {
            persons_detected,
            ..FrameResult::default()
        };
    }

    let violators: Vec<_> = persons
        .into_iter()
        .filter(|p| should_log(&p.safety_gear))
        .collect();

    FrameResult {
        total_violating_persons: violators.len(),
        persons: violators,
        persons_detected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helmet_without_vest_is_a_violation() {
        let required = RequiredClasses::new(["Helmet", "Vest"]);
        let detections = vec![
            RawDetection::new("Person", 0.92, 200.0, 150.0, 80.0, 200.0),
            RawDetection::new("Helmet", 0.85, 205.0, 70.0, 30.0, 25.0),
        ];

        let result = evaluate(&detections, &required);
        assert_eq!(result.total_violating_persons, 1);
        let person = result.person("Person 1").expect("violator retained");
        let gear: Vec<_> = person.safety_gear.iter().collect();
        assert_eq!(gear, vec![("Helmet", true), ("Vest", false)]);
    }

    #[test]
    fn compliant_persons_are_counted_but_not_retained() {
        let required = RequiredClasses::new(["Helmet"]);
        let detections = vec![
            RawDetection::new("Person", 0.9, 100.0, 100.0, 50.0, 100.0),
            RawDetection::new("Helmet", 0.8, 100.0, 60.0, 20.0, 15.0),
            RawDetection::new("Person", 0.9, 300.0, 100.0, 50.0, 100.0),
        ];

        let result = evaluate(&detections, &required);
        assert_eq!(result.persons_detected, 2);
        assert_eq!(result.total_violating_persons, 1);
        assert_eq!(result.persons.len(), 1);
        assert_eq!(result.persons[0].label, "Person 2");
        assert!(result.persons.iter().all(|p| should_log(&p.safety_gear)));
    }

    #[test]
    fn zero_detections_is_empty_result() {
        let result = evaluate(&[], &RequiredClasses::new(["Helmet", "Vest"]));
        assert_eq!(result, FrameResult::default());
        assert!(!result.has_violations());
    }

    #[test]
    fn empty_required_set_never_violates() {
        let detections = vec![RawDetection::new("Person", 0.9, 1.0, 1.0, 2.0, 2.0)];
        let result = evaluate(&detections, &RequiredClasses::default());
        assert_eq!(result.persons_detected, 1);
        assert_eq!(result.total_violating_persons, 0);
        assert!(!should_log(&SafetyGear::default()));
    }
}
