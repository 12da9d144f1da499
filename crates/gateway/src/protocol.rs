//! Wire types exchanged with the server.

use std::fmt;

use formwork_meta::FieldValues;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Opaque optimistic-concurrency marker; larger is newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl Revision {
	/// The revision following this one.
	#[must_use]
	pub const fn next(self) -> Self {
		Self(self.0 + 1)
	}
}

impl fmt::Display for Revision {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "r{}", self.0)
	}
}

/// Position on the submission axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
	/// The type has no submission axis.
	#[default]
	NotSubmittable,
	/// Editable, not yet submitted.
	Draft,
	/// Submitted; terminal apart from cancellation.
	Submitted,
	/// Cancelled; terminal apart from amendment.
	Cancelled,
}

impl DocStatus {
	/// Initial status for a new document of a type.
	pub const fn initial(submittable: bool) -> Self {
		if submittable { Self::Draft } else { Self::NotSubmittable }
	}

	/// Whether field edits and plain saves are still allowed.
	pub const fn is_editable(self) -> bool {
		matches!(self, Self::NotSubmittable | Self::Draft)
	}

	/// Lowercase label for logs and errors.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NotSubmittable => "not_submittable",
			Self::Draft => "draft",
			Self::Submitted => "submitted",
			Self::Cancelled => "cancelled",
		}
	}
}

impl fmt::Display for DocStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One row of a child table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChildRecord {
	/// Server-assigned row identifier.
	#[serde(default)]
	pub name: Option<String>,
	/// Row values, validated against the child type's meta.
	#[serde(default)]
	pub values: FieldValues,
}

/// A persisted document as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
	/// Document type.
	pub doctype: String,
	/// Server-assigned identifier.
	pub name: String,
	/// Creating actor, used by owner-restricted permissions.
	#[serde(default)]
	pub owner: Option<String>,
	/// Submission status.
	#[serde(default)]
	pub status: DocStatus,
	/// Revision marker for conflict detection.
	pub revision: Revision,
	/// Scalar field values.
	#[serde(default)]
	pub values: FieldValues,
	/// Child tables keyed by table field name.
	#[serde(default)]
	pub children: IndexMap<String, Vec<ChildRecord>>,
	/// Cancelled document this one amends.
	#[serde(default)]
	pub amended_from: Option<String>,
}

/// A write of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
	/// Document type.
	pub doctype: String,
	/// Identifier, absent for creation.
	pub name: Option<String>,
	/// Acting user.
	pub actor: String,
	/// Changed (or all) scalar values.
	pub values: FieldValues,
	/// Child tables to replace wholesale.
	pub children: IndexMap<String, Vec<ChildRecord>>,
	/// Revision the client last saw; absent for creation.
	pub expected: Option<Revision>,
	/// Submission status after the write.
	pub status: DocStatus,
	/// Amendment link, sent on creation.
	pub amended_from: Option<String>,
}

/// Successful write outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
	/// Authoritative document state after the write, including computed
	/// and normalised values and the new revision.
	pub record: DocumentRecord,
}

/// A server method invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
	/// Document type the method belongs to.
	pub doctype: String,
	/// Target document, absent for type-level methods.
	pub name: Option<String>,
	/// Method name.
	pub method: String,
	/// Arguments.
	#[serde(default)]
	pub args: serde_json::Value,
}
