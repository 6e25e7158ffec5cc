//! Query and subscription filters.
//!
//! Filters are write-only on the client side: they are serialized to compact
//! JSON and sent as the first message on a `find` or `live` connection.
//! Unset optional fields are omitted rather than sent as `null`.

// Rust guideline compliant 2026-02

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Result ordering for bounded queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Oldest first.
    Asc,
    /// Newest first.
    Desc,
}

impl std::str::FromStr for Order {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(FilterError::InvalidOrder(other.to_string())),
        }
    }
}

/// Errors building a filter from user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Order other than `asc` or `desc`.
    #[error("invalid value for order: {0}")]
    InvalidOrder(String),
    /// A time bound that is NaN or infinite.
    #[error("invalid value for {field}: {value} is not a finite number of seconds")]
    InvalidTime {
        /// `start` or `end`.
        field: &'static str,
        /// The rejected value as given.
        value: String,
    },
}

/// Which events a query or subscription should match.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventFilter {
    /// Lower time bound in seconds. `0` leaves the start open.
    #[serde(serialize_with = "serialize_seconds")]
    pub start: f64,
    /// Upper time bound in seconds.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_seconds"
    )]
    pub end: Option<f64>,
    /// Tag match patterns.
    #[serde(skip_serializing_if = "tags_unset")]
    pub tags: Option<Vec<String>>,
    /// Content match pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Result ordering; only meaningful for bounded queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
}

impl EventFilter {
    /// Filter matching everything from `start` on.
    pub fn since(start: f64) -> Self {
        Self {
            start,
            ..Self::default()
        }
    }

    /// Serialize to compact JSON.
    pub fn encode(&self) -> Vec<u8> {
        // Only plain strings, numbers and a unit enum: serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

fn tags_unset(tags: &Option<Vec<String>>) -> bool {
    tags.as_ref().map_or(true, Vec::is_empty)
}

/// Whole seconds go out as JSON integers (`10`, not `10.0`).
#[allow(clippy::cast_possible_truncation, reason = "checked to be integral and in range")]
fn serialize_seconds<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

fn serialize_optional_seconds<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serialize_seconds(v, serializer),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(filter: &EventFilter) -> String {
        String::from_utf8(filter.encode()).unwrap()
    }

    #[test]
    fn test_encode_start_and_content() {
        let filter = EventFilter {
            start: 10.0,
            content: Some("event1".to_string()),
            ..EventFilter::default()
        };
        assert_eq!(encoded(&filter), r#"{"start":10,"content":"event1"}"#);
    }

    #[test]
    fn test_encode_zero_start_always_present() {
        assert_eq!(encoded(&EventFilter::default()), r#"{"start":0}"#);
    }

    #[test]
    fn test_encode_fractional_start() {
        assert_eq!(encoded(&EventFilter::since(1.5)), r#"{"start":1.5}"#);
    }

    #[test]
    fn test_encode_all_fields() {
        let filter = EventFilter {
            start: 1.0,
            end: Some(2.25),
            tags: Some(vec!["a".to_string(), "b.*".to_string()]),
            content: Some("err".to_string()),
            order: Some(Order::Desc),
        };
        assert_eq!(
            encoded(&filter),
            r#"{"start":1,"end":2.25,"tags":["a","b.*"],"content":"err","order":"desc"}"#
        );
    }

    #[test]
    fn test_encode_empty_tags_omitted() {
        let filter = EventFilter {
            tags: Some(Vec::new()),
            ..EventFilter::default()
        };
        assert_eq!(encoded(&filter), r#"{"start":0}"#);
    }

    #[test]
    fn test_order_from_str() {
        assert_eq!("asc".parse::<Order>(), Ok(Order::Asc));
        assert_eq!("desc".parse::<Order>(), Ok(Order::Desc));
        assert_eq!(
            "sideways".parse::<Order>(),
            Err(FilterError::InvalidOrder("sideways".to_string()))
        );
    }
}
