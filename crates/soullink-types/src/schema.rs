//! Animation parameter schema definitions.
//!
//! A presentation client announces the parameters its currently loaded model
//! exposes. Each parameter is a named numeric control with an inclusive range.
//! The schema is opaque metadata: the hub never interprets parameter ids, it
//! only uses the ranges to clamp generated values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lower bound assumed when a client omits `min`.
pub const DEFAULT_PARAMETER_MIN: f64 = -30.0;

/// Upper bound assumed when a client omits `max`.
pub const DEFAULT_PARAMETER_MAX: f64 = 30.0;

fn default_min() -> f64 {
    DEFAULT_PARAMETER_MIN
}

fn default_max() -> f64 {
    DEFAULT_PARAMETER_MAX
}

/// Range descriptor for a single animation parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    /// Inclusive lower bound.
    #[serde(default = "default_min")]
    pub min: f64,
    /// Inclusive upper bound.
    #[serde(default = "default_max")]
    pub max: f64,
    /// Human-readable label. Older clients send this as `name`.
    #[serde(default, alias = "name")]
    pub label: String,
}

impl ParameterRange {
    pub fn new(min: f64, max: f64, label: impl Into<String>) -> Self {
        Self {
            min,
            max,
            label: label.into(),
        }
    }

    /// Returns `(low, high)` with the bounds ordered, so a client that sends
    /// them swapped still gets a usable range.
    pub fn bounds(&self) -> (f64, f64) {
        if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        }
    }

    /// Clamps `value` into this range.
    ///
    /// Returns `None` for NaN input, which has no meaningful position in the range.
    pub fn clamp(&self, value: f64) -> Option<f64> {
        if value.is_nan() {
            return None;
        }
        let (low, high) = self.bounds();
        Some(value.max(low).min(high))
    }

    /// Label to show in prompts; falls back to the parameter id.
    pub fn display_label<'a>(&'a self, id: &'a str) -> &'a str {
        if self.label.is_empty() {
            id
        } else {
            &self.label
        }
    }
}

/// The full set of parameters announced by a client, keyed by parameter id.
///
/// Ordered by id so prompts and serialized output are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSchema(BTreeMap<String, ParameterRange>);

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ParameterRange> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, range: ParameterRange) {
        self.0.insert(id.into(), range);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterRange)> {
        self.0.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl FromIterator<(String, ParameterRange)> for ParameterSchema {
    fn from_iter<I: IntoIterator<Item = (String, ParameterRange)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
