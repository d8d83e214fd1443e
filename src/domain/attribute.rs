//! Attribute accessor
//!
//! Every entity carries an ordered list of free-form name/value pairs. The compiler reads
//! them through the typed getters below, which fall back to the supplied default when an
//! attribute is missing or does not parse. A malformed value on one entity never blocks
//! compilation of anything else.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single name/value pair attached to an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// Ordered attribute list of one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self(attributes)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw value of the first attribute with this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|attribute| attribute.name == name).map(|attribute| attribute.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Value with surrounding whitespace removed; empty values count as absent.
    pub fn get_trimmed(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn get_string(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or(default).to_string()
    }

    /// Base-10 unsigned 32-bit integer, or `default` on absence or parse failure.
    pub fn get_u32(&self, name: &str, default: u32) -> u32 {
        self.get(name).and_then(|value| value.trim().parse::<u32>().ok()).unwrap_or(default)
    }

    /// Duration such as `131s`, `160ms` or `1m30s`, or `default` on absence or parse failure.
    pub fn get_duration(&self, name: &str, default: Duration) -> Duration {
        self.get(name).and_then(parse_duration).unwrap_or(default)
    }

    /// `true` only when the value is literally `true`.
    pub fn get_flag(&self, name: &str) -> bool {
        self.get(name).map(|value| value.trim() == "true").unwrap_or(false)
    }

    /// Names present on this entity that are not in `known`.
    pub fn unknown<'a>(&'a self, known: &[&str]) -> Vec<&'a str> {
        self.0
            .iter()
            .map(|attribute| attribute.name.as_str())
            .filter(|name| !known.contains(name))
            .collect()
    }
}

impl From<Vec<Attribute>> for Attributes {
    fn from(attributes: Vec<Attribute>) -> Self {
        Self(attributes)
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(name, value)| Attribute::new(name, value)).collect())
    }
}

/// Parse a duration string made of unit-suffixed decimal numbers.
///
/// Accepts a sequence of decimal numbers with a unit suffix (`ns`, `us`, `µs`, `ms`, `s`,
/// `m`, `h`). A bare `0` is zero. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return None;
    }
    if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }
    if rest == "0" {
        return Some(Duration::ZERO);
    }

    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_nanos += number * scale;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}
