//! Immutable per-type schema.

use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{FieldError, MetaError};
use crate::field::{FieldDescriptor, FieldKind};
use crate::value::{FieldValues, Value};

/// Lifecycle event names a field may not shadow.
///
/// Field-change events are dispatched under the field's own name, so a field
/// called `validate` would be indistinguishable from the save gate.
pub const RESERVED_EVENTS: &[&str] = &[
	"setup",
	"onload",
	"refresh",
	"validate",
	"before_save",
	"after_save",
	"before_submit",
	"on_submit",
	"before_cancel",
	"on_cancel",
	"on_trash",
	"after_delete",
	"*",
];

/// Wire form of a [`Meta`], as returned by the metadata endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaSpec {
	/// Document type name.
	pub doctype: String,
	/// Fields in display order.
	#[serde(default)]
	pub fields: Vec<FieldDescriptor>,
	/// Has the draft/submitted/cancelled axis.
	#[serde(default)]
	pub submittable: bool,
	/// Exactly one instance exists, named after the type.
	#[serde(default)]
	pub singleton: bool,
	/// Rows of a child table rather than a standalone document.
	#[serde(default)]
	pub is_child: bool,
}

impl MetaSpec {
	/// Starts an empty spec for `doctype`.
	pub fn new(doctype: impl Into<String>) -> Self {
		Self {
			doctype: doctype.into(),
			fields: Vec::new(),
			submittable: false,
			singleton: false,
			is_child: false,
		}
	}

	/// Appends a field.
	#[must_use]
	pub fn field(mut self, field: FieldDescriptor) -> Self {
		self.fields.push(field);
		self
	}

	/// Marks the type submittable.
	#[must_use]
	pub fn submittable(mut self) -> Self {
		self.submittable = true;
		self
	}

	/// Marks the type a singleton.
	#[must_use]
	pub fn singleton(mut self) -> Self {
		self.singleton = true;
		self
	}

	/// Marks the type a child-table row type.
	#[must_use]
	pub fn child(mut self) -> Self {
		self.is_child = true;
		self
	}

	/// Validates and indexes the spec.
	pub fn build(self) -> Result<Meta, MetaError> {
		Meta::try_from(self)
	}
}

/// Validated, indexed schema of one document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetaSpec", into = "MetaSpec")]
pub struct Meta {
	spec: MetaSpec,
	index: HashMap<String, usize>,
}

impl TryFrom<MetaSpec> for Meta {
	type Error = MetaError;

	fn try_from(spec: MetaSpec) -> Result<Self, MetaError> {
		let mut index = HashMap::default();
		for (pos, field) in spec.fields.iter().enumerate() {
			let invalid = |reason: &str| MetaError::InvalidField {
				doctype: spec.doctype.clone(),
				field: field.name.clone(),
				reason: reason.to_string(),
			};

			if field.name.is_empty() {
				return Err(invalid("empty name"));
			}
			if RESERVED_EVENTS.contains(&field.name.as_str()) {
				return Err(MetaError::ReservedFieldName {
					doctype: spec.doctype.clone(),
					field: field.name.clone(),
				});
			}
			if index.insert(field.name.clone(), pos).is_some() {
				return Err(MetaError::DuplicateField {
					doctype: spec.doctype.clone(),
					field: field.name.clone(),
				});
			}

			let needs_options = matches!(field.kind, FieldKind::Select | FieldKind::Link | FieldKind::Table);
			if needs_options && field.options.as_deref().is_none_or(str::is_empty) {
				return Err(invalid("missing options"));
			}
			if field.kind == FieldKind::Table && field.default.is_some() {
				return Err(invalid("table fields cannot have defaults"));
			}
			if let Some(default) = &field.default {
				field.coerce(default.clone()).map_err(|e| invalid(&e.to_string()))?;
			}
		}
		Ok(Self { spec, index })
	}
}

impl From<Meta> for MetaSpec {
	fn from(meta: Meta) -> Self {
		meta.spec
	}
}

impl Meta {
	/// Document type name.
	pub fn doctype(&self) -> &str {
		&self.spec.doctype
	}

	/// Whether the type has the submission axis.
	pub fn is_submittable(&self) -> bool {
		self.spec.submittable
	}

	/// Whether the type is a singleton.
	pub fn is_singleton(&self) -> bool {
		self.spec.singleton
	}

	/// Whether the type describes child-table rows.
	pub fn is_child(&self) -> bool {
		self.spec.is_child
	}

	/// Fields in declaration order.
	pub fn fields(&self) -> &[FieldDescriptor] {
		&self.spec.fields
	}

	/// Looks up a field by name.
	pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
		self.index.get(name).map(|&i| &self.spec.fields[i])
	}

	/// Looks up a field, failing with [`FieldError::Unknown`].
	pub fn require_field(&self, name: &str) -> Result<&FieldDescriptor, FieldError> {
		self.field(name).ok_or_else(|| FieldError::Unknown(name.to_string()))
	}

	/// Whether `name` is a field of this type.
	pub fn has_field(&self, name: &str) -> bool {
		self.index.contains_key(name)
	}

	/// Child-table fields.
	pub fn table_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
		self.spec.fields.iter().filter(|f| f.kind == FieldKind::Table)
	}

	/// Values a new document starts with: declared defaults, in field order.
	pub fn defaults(&self) -> FieldValues {
		self.spec
			.fields
			.iter()
			.filter_map(|f| f.default.clone().map(|v| (f.name.clone(), v)))
			.collect()
	}

	/// Validates every entry of `values` against this meta.
	pub fn check_values(&self, values: &FieldValues) -> Result<FieldValues, FieldError> {
		values
			.iter()
			.map(|(name, value)| {
				let field = self.require_field(name)?;
				Ok((name.clone(), field.coerce(value.clone())?))
			})
			.collect()
	}

	/// Fields that are mandatory but empty in `values`.
	pub fn missing_mandatory<'a>(&'a self, values: &'a FieldValues) -> impl Iterator<Item = &'a str> + 'a {
		self.spec
			.fields
			.iter()
			.filter(|f| !f.nullable && f.kind != FieldKind::Table)
			.filter(|f| values.get(&f.name).is_none_or(Value::is_empty))
			.map(|f| f.name.as_str())
	}
}
