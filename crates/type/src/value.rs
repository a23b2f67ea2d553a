// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{
	collections::BTreeMap,
	fmt::{Display, Formatter},
};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// All possible value kinds a row cell or event field can carry.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ValueKind {
	/// Value is not defined (think null in common programming languages)
	Undefined,
	/// A boolean: true or false.
	Bool,
	/// An 8-byte signed integer
	Int,
	/// An 8-byte floating point
	Float,
	/// A UTF-8 encoded text.
	Text,
	/// Raw bytes
	Bytes,
	/// A UTC timestamp
	Timestamp,
	/// An ordered list of values
	Array,
	/// A string-keyed map of values
	Object,
}

impl Display for ValueKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ValueKind::Undefined => f.write_str("UNDEFINED"),
			ValueKind::Bool => f.write_str("BOOL"),
			ValueKind::Int => f.write_str("INT"),
			ValueKind::Float => f.write_str("FLOAT"),
			ValueKind::Text => f.write_str("TEXT"),
			ValueKind::Bytes => f.write_str("BYTES"),
			ValueKind::Timestamp => f.write_str("TIMESTAMP"),
			ValueKind::Array => f.write_str("ARRAY"),
			ValueKind::Object => f.write_str("OBJECT"),
		}
	}
}

/// A dialect-independent cell value.
///
/// Engines exchange rows and CDC images as maps of these; vendor
/// specific types are carried as [`Value::Text`] by the owning adapter.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
	/// Value is not defined (think null in common programming languages)
	Undefined,
	/// A boolean: true or false.
	Bool(bool),
	/// An 8-byte signed integer
	Int(i64),
	/// An 8-byte floating point
	Float(f64),
	/// A UTF-8 encoded text.
	Text(String),
	/// Raw bytes
	Bytes(Vec<u8>),
	/// A UTC timestamp
	Timestamp(DateTime<Utc>),
	/// An ordered list of values
	Array(Vec<Value>),
	/// A string-keyed map of values
	Object(BTreeMap<String, Value>),
}

impl From<&Value> for ValueKind {
	fn from(value: &Value) -> Self {
		match value {
			Value::Undefined => ValueKind::Undefined,
			Value::Bool(_) => ValueKind::Bool,
			Value::Int(_) => ValueKind::Int,
			Value::Float(_) => ValueKind::Float,
			Value::Text(_) => ValueKind::Text,
			Value::Bytes(_) => ValueKind::Bytes,
			Value::Timestamp(_) => ValueKind::Timestamp,
			Value::Array(_) => ValueKind::Array,
			Value::Object(_) => ValueKind::Object,
		}
	}
}

impl Value {
	pub fn kind(&self) -> ValueKind {
		ValueKind::from(self)
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	pub fn text(v: impl Into<String>) -> Self {
		Value::Text(v.into())
	}

	/// Render the value as SQL-compatible text, without quoting.
	pub fn as_sql_text(&self) -> String {
		match self {
			Value::Undefined => "NULL".to_string(),
			Value::Bool(true) => "true".to_string(),
			Value::Bool(false) => "false".to_string(),
			Value::Int(v) => v.to_string(),
			Value::Float(v) => v.to_string(),
			Value::Text(v) => v.clone(),
			Value::Bytes(v) => hex::encode(v),
			Value::Timestamp(v) => v.to_rfc3339_opts(SecondsFormat::Micros, true),
			Value::Array(_) | Value::Object(_) => self.to_json().to_string(),
		}
	}

	/// Convert into the JSON wire form used for commit payloads and
	/// registry metadata. Bytes become hex text, timestamps RFC 3339.
	pub fn to_json(&self) -> serde_json::Value {
		match self {
			Value::Undefined => serde_json::Value::Null,
			Value::Bool(v) => serde_json::Value::Bool(*v),
			Value::Int(v) => serde_json::Value::from(*v),
			Value::Float(v) => serde_json::Number::from_f64(*v)
				.map(serde_json::Value::Number)
				.unwrap_or(serde_json::Value::Null),
			Value::Text(v) => serde_json::Value::String(v.clone()),
			Value::Bytes(v) => serde_json::Value::String(hex::encode(v)),
			Value::Timestamp(v) => {
				serde_json::Value::String(v.to_rfc3339_opts(SecondsFormat::Micros, true))
			}
			Value::Array(values) => {
				serde_json::Value::Array(values.iter().map(Value::to_json).collect())
			}
			Value::Object(map) => serde_json::Value::Object(
				map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
			),
		}
	}

	/// Convert from the JSON wire form. Strings stay text; adapters
	/// re-type timestamp columns when they know the column type.
	pub fn from_json(value: serde_json::Value) -> Self {
		match value {
			serde_json::Value::Null => Value::Undefined,
			serde_json::Value::Bool(v) => Value::Bool(v),
			serde_json::Value::Number(n) => {
				if let Some(v) = n.as_i64() {
					Value::Int(v)
				} else {
					Value::Float(n.as_f64().unwrap_or(f64::NAN))
				}
			}
			serde_json::Value::String(v) => Value::Text(v),
			serde_json::Value::Array(values) => {
				Value::Array(values.into_iter().map(Value::from_json).collect())
			}
			serde_json::Value::Object(map) => Value::Object(
				map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect(),
			),
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Undefined => f.write_str("undefined"),
			Value::Bool(true) => f.write_str("true"),
			Value::Bool(false) => f.write_str("false"),
			Value::Int(value) => Display::fmt(value, f),
			Value::Float(value) => Display::fmt(value, f),
			Value::Text(value) => Display::fmt(value, f),
			Value::Bytes(value) => f.write_str(&hex::encode(value)),
			Value::Timestamp(value) => {
				f.write_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
			}
			Value::Array(_) | Value::Object(_) => f.write_str(&self.to_json().to_string()),
		}
	}
}

impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		self.to_json().serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for Value {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		Ok(Value::from_json(serde_json::Value::deserialize(deserializer)?))
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Value::Int(v as i64)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Float(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::Text(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::Text(v)
	}
}

impl From<DateTime<Utc>> for Value {
	fn from(v: DateTime<Utc>) -> Self {
		Value::Timestamp(v)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map(Into::into).unwrap_or(Value::Undefined)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_json_round_trip_scalars() {
		let values = vec![
			Value::Undefined,
			Value::Bool(true),
			Value::Int(-42),
			Value::Float(2.5),
			Value::Text("Ada".to_string()),
		];
		for value in values {
			assert_eq!(Value::from_json(value.to_json()), value);
		}
	}

	#[test]
	fn test_json_nested() {
		let mut map = BTreeMap::new();
		map.insert("id".to_string(), Value::Int(1));
		map.insert("tags".to_string(), Value::Array(vec![Value::Text("a".into())]));
		let value = Value::Object(map);
		assert_eq!(Value::from_json(value.to_json()), value);
	}

	#[test]
	fn test_bytes_serialize_as_hex() {
		assert_eq!(Value::Bytes(vec![0x00, 0xab]).to_json(), serde_json::json!("00ab"));
	}

	#[test]
	fn test_kind() {
		assert_eq!(Value::Int(1).kind(), ValueKind::Int);
		assert_eq!(Value::Undefined.kind(), ValueKind::Undefined);
		assert_eq!(ValueKind::Timestamp.to_string(), "TIMESTAMP");
	}
}
