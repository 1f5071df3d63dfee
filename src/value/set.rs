//! Value and ValueSet types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator used when building aggregation keys.
const KEY_SEPARATOR: char = '|';

/// Errors raised when a value set breaks its label schema.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    /// A value carries a different number of label values than the set has labels.
    #[error("value {index} in '{set}' has {got} label values, expected {expected}")]
    LabelCardinality {
        set: String,
        index: usize,
        expected: usize,
        got: usize,
    },
}

/// A single measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    /// Measured value. Booleans are stored as 0/1.
    pub value: f64,
    /// Overrides the owning set's name for this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Label values, ordered like the owning set's `labels`.
    #[serde(default)]
    pub label_values: Vec<String>,
}

impl Value {
    /// Create an unlabeled value.
    ///
    /// Accepts anything convertible to `f64`, including `bool`.
    pub fn new(value: impl Into<f64>) -> Self {
        Self {
            value: value.into(),
            name: None,
            label_values: Vec::new(),
        }
    }

    /// Set the label values.
    pub fn with_labels<I, S>(mut self, label_values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_values = label_values.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-value name override.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Aggregation key: the name followed by every label value, `|`-separated.
    ///
    /// ```
    /// use pollect::Value;
    ///
    /// let v = Value::new(10.0).with_name("temp").with_labels(["1"]);
    /// assert_eq!(v.key(), "temp|1");
    /// ```
    pub fn key(&self) -> String {
        let mut key = self.name.clone().unwrap_or_default();
        for label in &self.label_values {
            key.push(KEY_SEPARATOR);
            key.push_str(label);
        }
        key
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        if !self.label_values.is_empty() {
            write!(f, " [{}]", self.label_values.join(", "))?;
        }
        Ok(())
    }
}

/// A named collection of values sharing one label schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueSet {
    /// Set name. The executor prefixes it with the collection name.
    pub name: String,
    /// Label names, fixed for the lifetime of the set.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Values in insertion order.
    #[serde(default)]
    pub values: Vec<Value>,
    /// Unix timestamp (seconds), assigned by the executor at merge time.
    #[serde(default)]
    pub time: i64,
}

impl ValueSet {
    /// Create an unlabeled, unnamed set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set with the given label names.
    pub fn with_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a value.
    pub fn add(&mut self, value: Value) -> &mut Self {
        self.values.push(value);
        self
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the set holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check that every value matches the label schema.
    ///
    /// Sets without labels accept any value.
    pub fn validate(&self) -> Result<(), ValueError> {
        if self.labels.is_empty() {
            return Ok(());
        }
        for (index, value) in self.values.iter().enumerate() {
            if value.label_values.len() != self.labels.len() {
                return Err(ValueError::LabelCardinality {
                    set: self.name.clone(),
                    index,
                    expected: self.labels.len(),
                    got: value.label_values.len(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.labels.join(", "))?;
        for value in &self.values {
            write!(f, "\n\t{value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_values_coerce_to_numbers() {
        assert_eq!(Value::new(true).value, 1.0);
        assert_eq!(Value::new(false).value, 0.0);
        assert_eq!(Value::new(42u32).value, 42.0);
    }

    #[test]
    fn test_value_key_without_name() {
        let v = Value::new(1.0).with_labels(["eth0", "rx"]);
        assert_eq!(v.key(), "|eth0|rx");
    }

    #[test]
    fn test_value_key_without_labels() {
        let v = Value::new(1.0).with_name("uptime");
        assert_eq!(v.key(), "uptime");
    }

    #[test]
    fn test_validate_accepts_unlabeled_set() {
        let mut set = ValueSet::new();
        set.add(Value::new(1.0).with_labels(["ignored"]));
        set.add(Value::new(2.0));
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_label_mismatch() {
        let mut set = ValueSet::with_labels(["time"]).named("load");
        set.add(Value::new(0.5).with_labels(["short"]));
        set.add(Value::new(0.7));

        let err = set.validate().unwrap_err();
        assert_eq!(
            err,
            ValueError::LabelCardinality {
                set: "load".to_string(),
                index: 1,
                expected: 1,
                got: 0,
            }
        );
    }

    #[test]
    fn test_display_lists_values() {
        let mut set = ValueSet::with_labels(["time"]).named("load");
        set.add(Value::new(0.5).with_labels(["short"]));
        let text = set.to_string();
        assert!(text.starts_with("load [time]"));
        assert!(text.contains("0.5 [short]"));
    }
}
