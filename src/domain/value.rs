//! Firestore REST value model
//!
//! Firestore's REST API encodes every field as a single-key object naming its type
//! (`{"stringValue": "..."}`, `{"timestampValue": "..."}`, ...). Keeping that tag around
//! lets validation tell a stored timestamp apart from a string that merely looks like one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field map of a Firestore document (or of a nested map value)
pub type Fields = BTreeMap<String, FirestoreValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FirestoreValue {
    NullValue(()),
    BooleanValue(bool),
    /// int64, transported as a decimal string
    IntegerValue(String),
    /// Non-finite values travel as `"NaN"`, `"Infinity"` and `"-Infinity"`
    #[serde(with = "double")]
    DoubleValue(f64),
    TimestampValue(DateTime<Utc>),
    StringValue(String),
    /// base64
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

mod double {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "Infinity" } else { "-Infinity" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => other
                    .parse()
                    .map_err(|_| D::Error::custom(format!("invalid double `{other}`"))),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<FirestoreValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: Fields,
}

impl FirestoreValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::StringValue(value.into())
    }

    pub fn timestamp(value: DateTime<Utc>) -> Self {
        Self::TimestampValue(value)
    }

    pub fn array(values: Vec<FirestoreValue>) -> Self {
        Self::ArrayValue(ArrayValue { values })
    }

    pub fn map(fields: Fields) -> Self {
        Self::MapValue(MapValue { fields })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::NullValue(()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::StringValue(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::TimestampValue(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Self::MapValue(map) => Some(&map.fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FirestoreValue]> {
        match self {
            Self::ArrayValue(array) => Some(&array.values),
            _ => None,
        }
    }

    /// Numeric value of an integer or double field
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::IntegerValue(raw) => raw.parse::<i64>().ok().map(|n| n as f64),
            Self::DoubleValue(n) => Some(*n),
            _ => None,
        }
    }
}

/// Look up a field, treating an explicit `nullValue` the same as a missing key.
pub fn present<'a>(fields: &'a Fields, key: &str) -> Option<&'a FirestoreValue> {
    fields.get(key).filter(|value| !value.is_null())
}

/// Build a field map from `(key, value)` pairs.
pub fn fields<K: Into<String>>(entries: impl IntoIterator<Item = (K, FirestoreValue)>) -> Fields {
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
