//! Typed attribute values and well-known attribute keys.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Key under which extractors store the regulatory company identifier.
pub const EXTERNAL_ID: &str = "external_id";

/// A single extracted attribute value.
///
/// Extraction only ever yields free text or a monetary/numeric figure, so the
/// mapping is closed over these two shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    Amount(Decimal),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Amount(_) => None,
        }
    }

    pub fn as_amount(&self) -> Option<Decimal> {
        match self {
            Self::Amount(d) => Some(*d),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Amount(d) => write!(f, "{d}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Decimal> for AttributeValue {
    fn from(d: Decimal) -> Self {
        Self::Amount(d)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn accessors_match_variant() {
        let text = AttributeValue::from("BAFIN-001");
        assert_eq!(text.as_text(), Some("BAFIN-001"));
        assert_eq!(text.as_amount(), None);

        let amount = AttributeValue::from(dec!(1234.50));
        assert_eq!(amount.as_amount(), Some(dec!(1234.5)));
        assert_eq!(amount.as_text(), None);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(AttributeValue::from(dec!(12.5))).unwrap();
        assert_eq!(json["kind"], "amount");
        assert_eq!(json["value"], "12.5");

        let json = serde_json::to_value(AttributeValue::from("x")).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["value"], "x");
    }
}
