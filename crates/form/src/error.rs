//! Form error taxonomy.

use formwork_gateway::{GatewayError, Revision};
use formwork_meta::{FieldError, MetaError};
use thiserror::Error;

/// Errors surfaced by form operations.
///
/// Local errors (schema, cycle, in-progress, transition, permission) are
/// raised before any gateway call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
	/// Unknown field, wrong value kind, read-only or table misuse.
	#[error("schema violation: {0}")]
	SchemaViolation(#[from] FieldError),
	/// The document type does not exist.
	#[error("document type not found: {0}")]
	MetaNotFound(String),
	/// The document does not exist.
	#[error("{doctype} {name} not found")]
	NotFound {
		/// Document type.
		doctype: String,
		/// Document identifier.
		name: String,
	},
	/// The actor lacks the capability, locally or per the server.
	#[error("permission denied: {0}")]
	PermissionDenied(String),
	/// A handler or the server rejected the document.
	#[error("validation failed: {0}")]
	ValidationFailed(String),
	/// The server holds a newer revision than the one edited.
	#[error("conflict: edited {expected:?}, server has {actual}")]
	ConflictDetected {
		/// Revision the local copy is based on.
		expected: Option<Revision>,
		/// Revision currently stored by the server.
		actual: Revision,
	},
	/// Transport or server fault, including timeouts.
	#[error("remote error: {0}")]
	RemoteError(String),
	/// Re-entrant dispatch exceeded the configured depth.
	#[error("dispatch cycle detected at `{event}` (depth {depth})")]
	DispatchCycleDetected {
		/// Event that would have exceeded the limit.
		event: String,
		/// Configured maximum depth.
		depth: usize,
	},
	/// Another save, submit, cancel, reload or delete is in flight.
	#[error("another operation is in progress")]
	OperationInProgress,
	/// The operation is not allowed in the document's current state.
	#[error("invalid transition: {0}")]
	InvalidTransition(String),
	/// Submit or cancel on a type without the submission axis.
	#[error("{0} is not submittable")]
	NotSubmittable(String),
	/// Row index outside a child table.
	#[error("no row {index} in table `{table}`")]
	InvalidRow {
		/// Table field name.
		table: String,
		/// Requested index.
		index: usize,
	},
}

impl From<GatewayError> for FormError {
	fn from(err: GatewayError) -> Self {
		match err {
			GatewayError::NotFound { doctype, name } => Self::NotFound { doctype, name },
			GatewayError::MetaNotFound(doctype) => Self::MetaNotFound(doctype),
			GatewayError::PermissionDenied(msg) => Self::PermissionDenied(msg),
			GatewayError::Conflict { expected, actual } => Self::ConflictDetected { expected, actual },
			GatewayError::Validation(msg) => Self::ValidationFailed(msg),
			GatewayError::Remote(msg) => Self::RemoteError(msg),
			GatewayError::Timeout => Self::RemoteError("request timed out".into()),
		}
	}
}

impl From<MetaError> for FormError {
	fn from(err: MetaError) -> Self {
		match err {
			MetaError::NotFound(doctype) => Self::MetaNotFound(doctype),
			MetaError::Fetch { cause, .. } => Self::RemoteError(cause),
			other => Self::RemoteError(other.to_string()),
		}
	}
}

/// Result type for form operations.
pub type Result<T> = std::result::Result<T, FormError>;
