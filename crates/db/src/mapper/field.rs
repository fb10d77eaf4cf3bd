use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// A decoded hash field.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Value {
    /// Canonical string stored in the backend. Decoding it with the matching [`Decoder`]
    /// yields the same value back.
    pub fn encode(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            // Debug keeps a fractional part or exponent ("1.0", "1e300"), so the coercion chain
            // never mistakes a float for an integer.
            Self::Float(value) => format!("{value:?}"),
            Self::Boolean(true) => "1".to_string(),
            Self::Boolean(false) => "0".to_string(),
            Self::Timestamp(value) => value.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Self::Text(value) => value.clone(),
        }
    }

    /// Best-effort decoding for fields without a declaration: integer, then float, then text.
    pub fn coerce(raw: &str) -> Self {
        if let Ok(value) = raw.parse::<i64>() {
            return Self::Integer(value);
        }
        if let Ok(value) = raw.parse::<f64>() {
            return Self::Float(value);
        }
        Self::Text(raw.to_string())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

/// Conversion out of a decoded [`Value`]; a value of another shape converts to `None`.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Option<Self> {
        value.as_timestamp()
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(text) => Some(text),
            other => Some(other.encode()),
        }
    }
}

/// Read-side conversion of a raw hash field.
#[derive(Clone, Copy, Debug)]
pub enum Decoder {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Custom(fn(&str) -> Option<Value>),
}

impl Decoder {
    pub fn decode(&self, raw: &str) -> Option<Value> {
        match self {
            Self::Text => Some(Value::Text(raw.to_string())),
            Self::Integer => raw.parse::<i64>().ok().map(Value::Integer),
            Self::Float => raw.parse::<f64>().ok().map(Value::Float),
            Self::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Some(Value::Boolean(true)),
                "0" | "false" => Some(Value::Boolean(false)),
                _ => None,
            },
            Self::Timestamp => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|value| Value::Timestamp(value.with_timezone(&Utc))),
            Self::Custom(decode) => decode(raw),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Custom(_) => "custom",
        }
    }
}

/// Declaration of one named attribute of an entity type.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    decoder: Decoder,
    primary: bool,
    indexed: bool,
    prefix: Option<String>,
}

impl Default for FieldDescriptor {
    fn default() -> Self {
        Self::new(Decoder::Text)
    }
}

impl FieldDescriptor {
    pub fn new(decoder: Decoder) -> Self {
        Self { decoder, primary: false, indexed: false, prefix: None }
    }

    pub fn text() -> Self {
        Self::new(Decoder::Text)
    }

    pub fn integer() -> Self {
        Self::new(Decoder::Integer)
    }

    pub fn float() -> Self {
        Self::new(Decoder::Float)
    }

    pub fn boolean() -> Self {
        Self::new(Decoder::Boolean)
    }

    pub fn timestamp() -> Self {
        Self::new(Decoder::Timestamp)
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Overrides the entity prefix (primary fields) or the index prefix (indexed fields).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn decoder(&self) -> Decoder {
        self.decoder
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn prefix_override(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|prefix| !prefix.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Decoder, FieldDescriptor, Value};

    #[test]
    fn coercion_prefers_integer_then_float_then_text() {
        assert_eq!(Value::coerce("42"), Value::Integer(42));
        assert_eq!(Value::coerce("-7"), Value::Integer(-7));
        assert_eq!(Value::coerce("2.5"), Value::Float(2.5));
        assert_eq!(Value::coerce("1e3"), Value::Float(1000.0));
        assert_eq!(Value::coerce("alice"), Value::Text("alice".to_string()));
        assert_eq!(Value::coerce(""), Value::Text(String::new()));
    }

    #[test]
    fn declared_decoders_round_trip_encoded_values() {
        let at = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let cases = [
            (Decoder::Integer, Value::Integer(i64::MIN)),
            (Decoder::Float, Value::Float(0.1 + 0.2)),
            (Decoder::Float, Value::Float(3.0)),
            (Decoder::Boolean, Value::Boolean(true)),
            (Decoder::Boolean, Value::Boolean(false)),
            (Decoder::Timestamp, Value::Timestamp(at)),
            (Decoder::Text, Value::Text("12".to_string())),
        ];

        for (decoder, value) in cases {
            assert_eq!(decoder.decode(&value.encode()), Some(value.clone()), "{}", decoder.name());
        }
    }

    #[test]
    fn floats_never_coerce_back_as_integers() {
        let encoded = Value::Float(3.0).encode();
        assert_eq!(encoded, "3.0");
        assert_eq!(Value::coerce(&encoded), Value::Float(3.0));
    }

    #[test]
    fn boolean_decoder_accepts_words_and_rejects_noise() {
        assert_eq!(Decoder::Boolean.decode("TRUE"), Some(Value::Boolean(true)));
        assert_eq!(Decoder::Boolean.decode("false"), Some(Value::Boolean(false)));
        assert_eq!(Decoder::Boolean.decode("yes"), None);
        assert_eq!(Decoder::Integer.decode("1.5"), None);
    }

    #[test]
    fn custom_decoders_are_plain_functions() {
        fn upper(raw: &str) -> Option<Value> {
            Some(Value::Text(raw.to_uppercase()))
        }

        let descriptor = FieldDescriptor::new(Decoder::Custom(upper));
        assert_eq!(descriptor.decoder().decode("ok"), Some(Value::Text("OK".to_string())));
        assert!(!descriptor.is_primary());
        assert!(!descriptor.is_indexed());
    }

    #[test]
    fn empty_prefix_override_counts_as_unset() {
        assert_eq!(FieldDescriptor::text().prefix("").prefix_override(), None);
        assert_eq!(FieldDescriptor::text().prefix("acct:").prefix_override(), Some("acct:"));
    }
}
