//! Error types for schema construction, field validation and meta fetching.

use thiserror::Error;

/// Errors raised while building or fetching a [`crate::Meta`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetaError {
	/// The document type does not exist on the server.
	#[error("document type not found: {0}")]
	NotFound(String),

	/// Two fields share a name.
	#[error("{doctype}: duplicate field `{field}`")]
	DuplicateField {
		/// Owning document type.
		doctype: String,
		/// Offending field name.
		field: String,
	},

	/// A field name collides with a lifecycle event name.
	#[error("{doctype}: field `{field}` shadows a lifecycle event")]
	ReservedFieldName {
		/// Owning document type.
		doctype: String,
		/// Offending field name.
		field: String,
	},

	/// A field descriptor is internally inconsistent.
	#[error("{doctype}: invalid field `{field}`: {reason}")]
	InvalidField {
		/// Owning document type.
		doctype: String,
		/// Offending field name.
		field: String,
		/// What is wrong with it.
		reason: String,
	},

	/// The meta source failed for a reason other than a missing type.
	#[error("meta fetch failed for {doctype}: {cause}")]
	Fetch {
		/// Requested document type.
		doctype: String,
		/// Underlying cause.
		cause: String,
	},
}

/// A value rejected by a field descriptor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldError {
	/// The field does not exist in the meta.
	#[error("unknown field `{0}`")]
	Unknown(String),

	/// The value's kind does not match the field kind.
	#[error("field `{field}` expects {expected}, got {got}")]
	WrongKind {
		/// Field name.
		field: String,
		/// Human-readable expected kind.
		expected: &'static str,
		/// Tag of the rejected value.
		got: &'static str,
	},

	/// `Null` written to a non-nullable field.
	#[error("field `{0}` is not nullable")]
	NotNullable(String),

	/// A select value outside the allowed options.
	#[error("`{value}` is not an option of `{field}`")]
	NotAnOption {
		/// Field name.
		field: String,
		/// Rejected value.
		value: String,
	},

	/// Table fields hold child rows, not scalar values.
	#[error("field `{0}` is a child table")]
	TableField(String),

	/// The field is read-only for this write.
	#[error("field `{0}` is read-only")]
	ReadOnly(String),
}

/// Result type for meta operations.
pub type Result<T> = std::result::Result<T, MetaError>;
