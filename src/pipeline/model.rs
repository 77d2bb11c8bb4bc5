use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::detect::RawDetection;

/// Ordered, duplicate-free list of gear classes every person must wear.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequiredClasses(Vec<String>);

impl RequiredClasses {
    /// Trims entries, drops empties and keeps the first occurrence of duplicates.
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for class in classes {
            let class = class.as_ref().trim();
            if !class.is_empty() && !out.iter().any(|c| c == class) {
                out.push(class.to_string());
            }
        }
        Self(out)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.0.iter().any(|c| c == class)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Per-person presence flag for each required class, in required-class order.
///
/// Serialized as a JSON object whose keys keep that order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SafetyGear(Vec<(String, bool)>);

impl SafetyGear {
    /// All required classes, initially absent.
    pub fn absent(required: &RequiredClasses) -> Self {
        Self(required.iter().map(|c| (c.to_string(), false)).collect())
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        Self(pairs.into_iter().map(|(c, p)| (c.into(), p)).collect())
    }

    /// Mark `class` present. Unknown classes are ignored.
    pub fn mark_present(&mut self, class: &str) {
        if let Some(entry) = self.0.iter_mut().find(|(c, _)| c == class) {
            entry.1 = true;
        }
    }

    pub fn is_present(&self, class: &str) -> Option<bool> {
        self.0.iter().find(|(c, _)| c == class).map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(c, p)| (c.as_str(), *p))
    }

    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, p)| !*p).map(|(c, _)| c.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SafetyGear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (class, present)) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}': {}", class, present)?;
        }
        f.write_str("}")
    }
}

impl Serialize for SafetyGear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (class, present) in &self.0 {
            map.serialize_entry(class, present)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SafetyGear {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GearVisitor;

        impl<'de> Visitor<'de> for GearVisitor {
            type Value = SafetyGear;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of gear class to presence flag")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((class, present)) = access.next_entry::<String, bool>()? {
                    pairs.push((class, present));
                }
                Ok(SafetyGear(pairs))
            }
        }

        deserializer.deserialize_map(GearVisitor)
    }
}

/// A detected person and the gear found inside their box.
#[derive(Clone, Debug, PartialEq)]
pub struct Person {
    /// `"Person {ordinal}"`, ordinal counting every person detection in the frame.
    pub label: String,
    pub detection: RawDetection,
    pub safety_gear: SafetyGear,
}

/// Outcome of evaluating one analyzed frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameResult {
    /// Number of persons missing at least one required class.
    pub total_violating_persons: usize,
    /// Violators only, in detection order.
    pub persons: Vec<Person>,
    /// Every person detected in the frame, compliant or not.
    pub persons_detected: usize,
}

impl FrameResult {
    pub fn has_violations(&self) -> bool {
        self.total_violating_persons > 0
    }

    pub fn person(&self, label: &str) -> Option<&Person> {
        self.persons.iter().find(|p| p.label == label)
    }
}
