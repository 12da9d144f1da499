//! Remote procedure boundary.

use async_trait::async_trait;
use formwork_meta::Meta;

use crate::capability::PermissionSnapshot;
use crate::error::Result;
use crate::protocol::{DocumentRecord, MethodCall, Revision, WriteRequest, WriteResponse};

/// Remote reads, writes and method calls.
///
/// Implementations own transport concerns, including any retry policy; the
/// form engine never retries on its own.
#[async_trait]
pub trait RpcGateway: Send + Sync {
	/// Fetches the schema of `doctype`.
	async fn fetch_meta(&self, doctype: &str) -> Result<Meta>;

	/// Reads one document.
	async fn read(&self, doctype: &str, name: &str) -> Result<DocumentRecord>;

	/// Creates or updates one document.
	///
	/// Fails with [`crate::GatewayError::Conflict`] when `expected` does not
	/// match the stored revision.
	async fn write(&self, request: WriteRequest) -> Result<WriteResponse>;

	/// Deletes one document at `expected` revision.
	async fn delete(&self, doctype: &str, name: &str, expected: Revision) -> Result<()>;

	/// Invokes a server method.
	async fn invoke(&self, call: MethodCall) -> Result<serde_json::Value>;

	/// Returns the actor's roles and the rules granted to them.
	async fn fetch_permissions(&self, actor: &str) -> Result<PermissionSnapshot>;
}
