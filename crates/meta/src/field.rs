//! Field descriptors and value coercion.

use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::value::Value;

/// Storage kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
	/// Short string.
	Data,
	/// Long string.
	Text,
	/// Integer.
	Int,
	/// Floating point number.
	Float,
	/// Monetary amount, stored as a float.
	Currency,
	/// Boolean.
	Check,
	/// One of a fixed list of options.
	Select,
	/// Identifier of a document of another type.
	Link,
	/// Calendar date.
	Date,
	/// Date and time.
	Datetime,
	/// Structured JSON payload.
	Json,
	/// Ordered child rows of another type.
	Table,
}

impl FieldKind {
	/// Human-readable name of the accepted value shape.
	pub const fn expects(self) -> &'static str {
		match self {
			Self::Data | Self::Text | Self::Select | Self::Link => "a string",
			Self::Int => "an integer",
			Self::Float | Self::Currency => "a number",
			Self::Check => "a boolean",
			Self::Date => "a date",
			Self::Datetime => "a datetime",
			Self::Json => "json",
			Self::Table => "child rows",
		}
	}

	/// Returns true for kinds whose `options` name another document type.
	pub const fn targets_doctype(self) -> bool {
		matches!(self, Self::Link | Self::Table)
	}
}

/// Describes one field of a document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
	/// Field name, unique within its meta.
	pub name: String,
	/// Storage kind.
	pub kind: FieldKind,
	/// Whether `Null` (or an empty value) is acceptable on save.
	#[serde(default = "default_true")]
	pub nullable: bool,
	/// Value seeded into new documents.
	#[serde(default)]
	pub default: Option<Value>,
	/// Newline-separated select options, or the target type of link/table fields.
	#[serde(default)]
	pub options: Option<String>,
	/// Computed or otherwise not user-writable.
	#[serde(default)]
	pub readonly: bool,
	/// Excluded when a document is copied into an amendment.
	#[serde(default)]
	pub no_copy: bool,
}

fn default_true() -> bool {
	true
}

impl FieldDescriptor {
	/// Creates a nullable, writable field with no default.
	pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
		Self {
			name: name.into(),
			kind,
			nullable: true,
			default: None,
			options: None,
			readonly: false,
			no_copy: false,
		}
	}

	/// Marks the field as mandatory.
	#[must_use]
	pub fn required(mut self) -> Self {
		self.nullable = false;
		self
	}

	/// Sets the default value.
	#[must_use]
	pub fn with_default(mut self, value: impl Into<Value>) -> Self {
		self.default = Some(value.into());
		self
	}

	/// Sets select options or the target type.
	#[must_use]
	pub fn with_options(mut self, options: impl Into<String>) -> Self {
		self.options = Some(options.into());
		self
	}

	/// Marks the field read-only.
	#[must_use]
	pub fn read_only(mut self) -> Self {
		self.readonly = true;
		self
	}

	/// Excludes the field from amendment copies.
	#[must_use]
	pub fn no_copy(mut self) -> Self {
		self.no_copy = true;
		self
	}

	/// Whether this field references another document type.
	pub fn is_reference(&self) -> bool {
		self.kind == FieldKind::Link
	}

	/// Target document type of link and table fields.
	pub fn target_doctype(&self) -> Option<&str> {
		if self.kind.targets_doctype() { self.options.as_deref() } else { None }
	}

	/// Iterates select options.
	pub fn select_options(&self) -> impl Iterator<Item = &str> {
		let raw = if self.kind == FieldKind::Select { self.options.as_deref() } else { None };
		raw.into_iter()
			.flat_map(|s| s.split('\n'))
			.map(str::trim)
			.filter(|s| !s.is_empty())
	}

	/// Validates `value` for this field and normalises it.
	///
	/// Integers widen to floats for numeric kinds. `Null` is accepted for
	/// every non-table field here; mandatory checks happen at save time so
	/// a document can pass through incomplete states while being edited.
	pub fn coerce(&self, value: Value) -> Result<Value, FieldError> {
		let wrong = |got: &Value| FieldError::WrongKind {
			field: self.name.clone(),
			expected: self.kind.expects(),
			got: got.tag(),
		};

		match (self.kind, value) {
			(FieldKind::Table, _) => Err(FieldError::TableField(self.name.clone())),
			(_, Value::Null) => Ok(Value::Null),
			(FieldKind::Data | FieldKind::Text, v @ Value::Str(_)) => Ok(v),
			(FieldKind::Link, Value::Str(s)) => {
				if s.is_empty() {
					Ok(Value::Null)
				} else {
					Ok(Value::Str(s))
				}
			}
			(FieldKind::Select, Value::Str(s)) => {
				if s.is_empty() || self.select_options().any(|o| o == s) {
					Ok(Value::Str(s))
				} else {
					Err(FieldError::NotAnOption {
						field: self.name.clone(),
						value: s,
					})
				}
			}
			(FieldKind::Int, v @ Value::Int(_)) => Ok(v),
			(FieldKind::Float | FieldKind::Currency, Value::Int(i)) => Ok(Value::Float(i as f64)),
			(FieldKind::Float | FieldKind::Currency, v @ Value::Float(_)) => Ok(v),
			(FieldKind::Check, v @ Value::Bool(_)) => Ok(v),
			(FieldKind::Check, Value::Int(i)) if i == 0 || i == 1 => Ok(Value::Bool(i == 1)),
			(FieldKind::Date, v @ Value::Date(_)) => Ok(v),
			(FieldKind::Datetime, v @ Value::Datetime(_)) => Ok(v),
			(FieldKind::Datetime, Value::Date(d)) => Ok(Value::Datetime(d.and_time(chrono::NaiveTime::MIN))),
			(FieldKind::Json, v) => Ok(Value::Json(v.into_json())),
			(_, v) => Err(wrong(&v)),
		}
	}
}
