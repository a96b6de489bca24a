//! Error types for shift-engine operations.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::overlap::Conflict;

#[derive(Error, Debug)]
pub enum ShiftError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{0}")]
    Conflict(Box<Conflict>),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("No matching occurrence for {0}")]
    NoOccurrence(NaiveDate),
}

pub type Result<T> = std::result::Result<T, ShiftError>;

impl From<ValidationErrors> for ShiftError {
    fn from(errors: ValidationErrors) -> Self {
        ShiftError::Validation(errors)
    }
}

impl From<Conflict> for ShiftError {
    fn from(conflict: Conflict) -> Self {
        ShiftError::Conflict(Box::new(conflict))
    }
}

/// Field-level validation failures, aggregated.
///
/// Keys are dotted field paths (`"repeat.every"`, `"end"`); each field may
/// collect several messages. Ordering is stable so rendered output is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Fold another error set into this one, prefixing its field paths.
    pub fn merge_prefixed(&mut self, prefix: &str, other: ValidationErrors) {
        for (field, messages) in other.fields {
            let key = format!("{prefix}.{field}");
            self.fields.entry(key).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    /// Render as a JSON object of `field -> [messages]`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_accumulate_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("end", "must be after start");
        errors.add("end", "duration must not exceed 24 hours");
        errors.add("alert", "must not be negative");

        assert_eq!(errors.messages("end").len(), 2);
        assert!(errors.contains("alert"));
        assert!(errors.messages("start").is_empty());
    }

    #[test]
    fn test_display_is_ordered_by_field() {
        let mut errors = ValidationErrors::new();
        errors.add("end", "must be after start");
        errors.add("alert", "must not be negative");

        assert_eq!(
            errors.to_string(),
            "alert: must not be negative; end: must be after start"
        );
    }

    #[test]
    fn test_to_json_is_field_map() {
        let mut errors = ValidationErrors::new();
        errors.add("repeat.every", "must be at least 1");

        let json = errors.to_json();
        assert_eq!(json["repeat.every"][0], "must be at least 1");
    }

    #[test]
    fn test_merge_prefixed() {
        let mut inner = ValidationErrors::new();
        inner.add("weekdays", "must not be empty");
        let mut outer = ValidationErrors::new();
        outer.merge_prefixed("repeat", inner);

        assert!(outer.contains("repeat.weekdays"));
        assert!(outer.into_result().is_err());
    }
}
