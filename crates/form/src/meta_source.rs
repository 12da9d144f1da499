//! Meta fetching through the gateway.

use std::sync::Arc;

use async_trait::async_trait;
use formwork_gateway::{GatewayError, RpcGateway};
use formwork_meta::{Meta, MetaError, MetaSource};

/// [`MetaSource`] backed by [`RpcGateway::fetch_meta`].
pub struct GatewayMetaSource {
	gateway: Arc<dyn RpcGateway>,
}

impl GatewayMetaSource {
	/// Wraps `gateway`.
	pub fn new(gateway: Arc<dyn RpcGateway>) -> Self {
		Self { gateway }
	}
}

#[async_trait]
impl MetaSource for GatewayMetaSource {
	async fn fetch_meta(&self, doctype: &str) -> Result<Meta, MetaError> {
		self.gateway.fetch_meta(doctype).await.map_err(|err| match err {
			GatewayError::MetaNotFound(doctype) => MetaError::NotFound(doctype),
			other => MetaError::Fetch {
				doctype: doctype.to_string(),
				cause: other.to_string(),
			},
		})
	}
}
