//! Tagged field values.

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered field-name to value mapping, in assignment order.
pub type FieldValues = IndexMap<String, Value>;

/// A single field value.
///
/// Each [`crate::FieldKind`] accepts a fixed subset of these tags; see
/// [`crate::FieldDescriptor::coerce`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
	/// Absent value.
	#[default]
	Null,
	/// Boolean (check fields).
	Bool(bool),
	/// Integer.
	Int(i64),
	/// Floating point number (float and currency fields).
	Float(f64),
	/// String (data, text, select and link fields).
	Str(String),
	/// Calendar date.
	Date(NaiveDate),
	/// Date and time without zone.
	Datetime(NaiveDateTime),
	/// Arbitrary structured payload.
	Json(serde_json::Value),
}

impl Value {
	/// Returns the tag name, used in error messages and logs.
	pub const fn tag(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Bool(_) => "bool",
			Self::Int(_) => "int",
			Self::Float(_) => "float",
			Self::Str(_) => "str",
			Self::Date(_) => "date",
			Self::Datetime(_) => "datetime",
			Self::Json(_) => "json",
		}
	}

	/// Returns true for [`Value::Null`] and the empty string.
	pub fn is_empty(&self) -> bool {
		match self {
			Self::Null => true,
			Self::Str(s) => s.is_empty(),
			_ => false,
		}
	}

	/// Returns the string payload, if any.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	/// Returns the integer payload, if any.
	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns a numeric payload as `f64`, widening integers.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Int(v) => Some(*v as f64),
			Self::Float(v) => Some(*v),
			_ => None,
		}
	}

	/// Converts into plain JSON, dropping the tag.
	///
	/// Dates render as ISO-8601 strings; non-finite floats become `null`.
	pub fn into_json(self) -> serde_json::Value {
		use serde_json::Value as Json;
		match self {
			Self::Null => Json::Null,
			Self::Bool(v) => Json::Bool(v),
			Self::Int(v) => Json::from(v),
			Self::Float(v) => serde_json::Number::from_f64(v).map_or(Json::Null, Json::Number),
			Self::Str(v) => Json::String(v),
			Self::Date(v) => Json::String(v.to_string()),
			Self::Datetime(v) => Json::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
			Self::Json(v) => v,
		}
	}

	/// Returns the boolean payload, if any.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(v) => Some(*v),
			_ => None,
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Self::Bool(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Self::Int(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Self::Int(i64::from(v))
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Self::Float(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Self::Str(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Self::Str(v)
	}
}

impl From<NaiveDate> for Value {
	fn from(v: NaiveDate) -> Self {
		Self::Date(v)
	}
}

impl From<NaiveDateTime> for Value {
	fn from(v: NaiveDateTime) -> Self {
		Self::Datetime(v)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map_or(Self::Null, Into::into)
	}
}
