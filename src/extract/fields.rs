//! Field parsing for text pulled out of financial reporting documents.
//!
//! Recognises two line shapes:
//! - `Label: Value`
//! - table rows whose cells are separated by a tab or 2+ spaces
//!   (first cell is the label, last cell the value)

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::document::{AttributeValue, EXTERNAL_ID};

/// Labels that carry the regulatory company identifier.
static IDENTIFIER_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^bafin[\s_-]*(id|nr\.?|nummer|number)$").expect("static regex")
});

/// Cell separator for table rows.
static CELL_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\t+|\s{2,}").expect("static regex"));

/// Currency markers stripped before parsing amounts.
static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(€|\$|£|\bT?EUR\b|\bUSD\b|\bCHF\b)").expect("static regex")
});

/// Parse every recognised field in `text`.
///
/// The first occurrence of a key wins; later duplicates are ignored.
pub fn parse_fields(text: &str) -> BTreeMap<String, AttributeValue> {
    let mut fields = BTreeMap::new();

    for line in text.lines() {
        let Some((label, value)) = split_line(line) else {
            continue;
        };

        let (key, value) = if IDENTIFIER_LABEL.is_match(label) {
            let Some(id) = value.split_whitespace().next() else {
                continue;
            };
            (EXTERNAL_ID.to_string(), AttributeValue::Text(id.to_string()))
        } else {
            let key = normalize_label(label);
            if key.is_empty() {
                continue;
            }
            let value = match parse_amount(value) {
                Some(amount) => AttributeValue::Amount(amount),
                None => AttributeValue::Text(value.to_string()),
            };
            (key, value)
        };

        fields.entry(key).or_insert(value);
    }

    fields
}

/// Split a line into (label, value), or `None` if it is not a field line.
fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some((label, value)) = line.split_once(':') {
        let (label, value) = (label.trim(), value.trim());
        if !label.is_empty() && !value.is_empty() {
            return Some((label, value));
        }
    }

    let cells: Vec<&str> = CELL_SEPARATOR
        .split(line)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    match cells.as_slice() {
        [label, .., value] => Some((label, value)),
        _ => None,
    }
}

/// `"Total Assets (TEUR)"` → `"total_assets_teur"`.
pub fn normalize_label(label: &str) -> String {
    let mut key = String::with_capacity(label.len());
    let mut pending_sep = false;
    for ch in label.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !key.is_empty() {
                key.push('_');
            }
            pending_sep = false;
            key.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    key
}

/// Parse a figure written in German (`1.234,56`) or English (`1,234.56`)
/// notation. Currency markers and surrounding whitespace are ignored;
/// parentheses or a leading minus mark negatives.
///
/// A single `.` followed by exactly three digits is read as a thousands
/// separator (`1.234` → 1234), matching German reporting practice.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let stripped = CURRENCY.replace_all(raw, "");
    let mut s: String = stripped.chars().filter(|c| !c.is_whitespace()).collect();

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.to_string();
    }

    if s.is_empty() || !s.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if !s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }

    let normalized = normalize_separators(&s)?;
    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

/// Rewrite thousands/decimal separators into plain `1234.56` form.
fn normalize_separators(s: &str) -> Option<String> {
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');

    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (None, None) => None,
        (Some(_), None) => single_separator_role(s, '.'),
        (None, Some(_)) => single_separator_role(s, ','),
    };

    let thousands_sep = match decimal_sep {
        Some('.') => ',',
        Some(_) => '.',
        None => {
            // Only thousands separators present (or none at all).
            let sep = if last_dot.is_some() { '.' } else { ',' };
            if !has_thousands_grouping(s, sep) {
                return None;
            }
            return Some(s.chars().filter(|c| c.is_ascii_digit()).collect());
        }
    };

    let decimal_sep = decimal_sep?;
    if s.matches(decimal_sep).count() > 1 {
        return None;
    }
    let (int_part, frac_part) = s.split_once(decimal_sep)?;
    if frac_part.contains(thousands_sep)
        || frac_part.is_empty()
        || !has_thousands_grouping(int_part, thousands_sep)
    {
        return None;
    }
    let int_digits: String = int_part.chars().filter(|c| *c != thousands_sep).collect();
    Some(format!("{int_digits}.{frac_part}"))
}

/// `1.234.567` style grouping: a leading group of 1 to 3 digits, then
/// groups of exactly 3. Strings without `sep` pass.
fn has_thousands_grouping(s: &str, sep: char) -> bool {
    if !s.contains(sep) {
        return true;
    }
    let mut groups = s.split(sep);
    groups
        .next()
        .is_some_and(|first| (1..=3).contains(&first.len()))
        && groups.all(|g| g.len() == 3)
}

/// With only one kind of separator present, decide whether it is the
/// decimal separator (`Some(sep)`) or a thousands separator (`None`).
fn single_separator_role(s: &str, sep: char) -> Option<char> {
    if s.matches(sep).count() > 1 {
        return None;
    }
    let (_, frac) = s.split_once(sep)?;
    if frac.len() == 3 { None } else { Some(sep) }
}
