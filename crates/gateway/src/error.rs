//! Gateway error taxonomy.

use thiserror::Error;

use crate::protocol::Revision;

/// Errors reported by a gateway implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
	/// The document does not exist.
	#[error("{doctype} {name} not found")]
	NotFound {
		/// Document type.
		doctype: String,
		/// Document identifier.
		name: String,
	},
	/// The document type does not exist.
	#[error("document type not found: {0}")]
	MetaNotFound(String),
	/// The server refused the request for the acting user.
	#[error("permission denied: {0}")]
	PermissionDenied(String),
	/// Optimistic-concurrency check failed.
	#[error("revision conflict: expected {expected:?}, server has {actual}")]
	Conflict {
		/// Revision the client based its write on.
		expected: Option<Revision>,
		/// Revision currently stored.
		actual: Revision,
	},
	/// Server-side business rule rejected the write.
	#[error("validation failed: {0}")]
	Validation(String),
	/// Transport or server fault.
	#[error("remote error: {0}")]
	Remote(String),
	/// The call did not complete in time.
	#[error("request timed out")]
	Timeout,
}

/// Result type for gateway calls.
pub type Result<T> = std::result::Result<T, GatewayError>;
