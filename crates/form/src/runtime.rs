//! Shared services and form entry points.

use std::future::Future;
use std::sync::Arc;

use formwork_dispatch::{HandlerAction, HandlerId, HandlerRegistry, Handlers};
use formwork_gateway::{Capability, GatewayError, PermissionSnapshot, RpcGateway};
use formwork_meta::{Meta, MetaRegistry};
use rustc_hash::FxHashMap as HashMap;
use tracing::{debug, warn};

use crate::config::FormConfig;
use crate::context::HandlerContext;
use crate::controller::Form;
use crate::document::Document;
use crate::error::{FormError, Result};
use crate::lifecycle::Lifecycle;
use crate::meta_source::GatewayMetaSource;
use crate::permission::PermissionEvaluator;

/// Handler registry type used by forms.
pub type FormHandlers = HandlerRegistry<HandlerContext, FormError>;

struct RuntimeInner {
	gateway: Arc<dyn RpcGateway>,
	metas: MetaRegistry,
	permissions: PermissionEvaluator,
	handlers: Arc<FormHandlers>,
	config: FormConfig,
	actor: String,
}

/// Everything forms of one actor share: gateway, meta cache, permission
/// snapshot, handler registry and configuration.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct FormRuntime {
	inner: Arc<RuntimeInner>,
}

/// Configures a [`FormRuntime`].
pub struct RuntimeBuilder {
	gateway: Arc<dyn RpcGateway>,
	actor: String,
	config: FormConfig,
	handlers: Option<Arc<FormHandlers>>,
	permissions: Option<PermissionSnapshot>,
}

impl RuntimeBuilder {
	/// Replaces the default configuration.
	#[must_use]
	pub fn config(mut self, config: FormConfig) -> Self {
		self.config = config;
		self
	}

	/// Shares an existing handler registry instead of creating one.
	#[must_use]
	pub fn handlers(mut self, handlers: Arc<FormHandlers>) -> Self {
		self.handlers = Some(handlers);
		self
	}

	/// Starts from a known permission snapshot.
	#[must_use]
	pub fn permissions(mut self, snapshot: PermissionSnapshot) -> Self {
		self.permissions = Some(snapshot);
		self
	}

	/// Builds the runtime. Without an explicit snapshot every capability is
	/// denied until [`FormRuntime::refresh_permissions`] runs.
	pub fn build(self) -> FormRuntime {
		let snapshot = self
			.permissions
			.unwrap_or_else(|| PermissionSnapshot::new(self.actor.clone(), Vec::<String>::new()));
		let metas = MetaRegistry::new(Arc::new(GatewayMetaSource::new(self.gateway.clone())));
		FormRuntime {
			inner: Arc::new(RuntimeInner {
				gateway: self.gateway,
				metas,
				permissions: PermissionEvaluator::new(snapshot),
				handlers: self.handlers.unwrap_or_default(),
				config: self.config,
				actor: self.actor,
			}),
		}
	}

	/// Builds the runtime and fetches the actor's permissions.
	pub async fn connect(self) -> Result<FormRuntime> {
		let runtime = self.build();
		runtime.refresh_permissions().await?;
		Ok(runtime)
	}
}

impl FormRuntime {
	/// Starts configuring a runtime for `actor`.
	pub fn builder(gateway: Arc<dyn RpcGateway>, actor: impl Into<String>) -> RuntimeBuilder {
		RuntimeBuilder {
			gateway,
			actor: actor.into(),
			config: FormConfig::default(),
			handlers: None,
			permissions: None,
		}
	}

	/// Acting user.
	pub fn actor(&self) -> &str {
		&self.inner.actor
	}

	/// Configuration.
	pub fn config(&self) -> &FormConfig {
		&self.inner.config
	}

	/// The gateway.
	pub fn gateway(&self) -> &Arc<dyn RpcGateway> {
		&self.inner.gateway
	}

	/// Meta cache.
	pub fn metas(&self) -> &MetaRegistry {
		&self.inner.metas
	}

	/// Permission evaluator.
	pub fn permissions(&self) -> &PermissionEvaluator {
		&self.inner.permissions
	}

	/// Handler registry.
	pub fn handlers(&self) -> &Arc<FormHandlers> {
		&self.inner.handlers
	}

	/// Registers a handler for `(doctype, event)`.
	pub fn on<F, A>(&self, doctype: &str, event: &str, handler: F) -> HandlerId
	where
		F: Fn(&HandlerContext) -> A + Send + Sync + 'static,
		A: Into<HandlerAction<FormError>>,
	{
		self.inner.handlers.register(doctype, event, handler)
	}

	/// Re-fetches the actor's permission snapshot.
	pub async fn refresh_permissions(&self) -> Result<()> {
		let inner = &self.inner;
		self.remote(inner.permissions.refresh(&*inner.gateway, &inner.actor))
			.await
	}

	/// Meta of `doctype`, fetched once and cached.
	pub async fn meta(&self, doctype: &str) -> Result<Arc<Meta>> {
		Ok(self.inner.metas.get(doctype).await?)
	}

	/// Opens a new, unsaved document of `doctype`.
	///
	/// Fires `setup`, `onload` and `refresh`.
	pub async fn new_form(&self, doctype: &str) -> Result<Form> {
		let meta = self.meta(doctype).await?;
		if meta.is_singleton() {
			return Err(FormError::InvalidTransition(format!("{doctype} is a singleton; open it instead")));
		}
		self.create(meta).await
	}

	/// Loads `doctype`/`name` from the server.
	///
	/// Fires `setup`, `onload` and `refresh`.
	pub async fn load(&self, doctype: &str, name: &str) -> Result<Form> {
		let meta = self.meta(doctype).await?;
		if !self.inner.permissions.can_any(&self.inner.actor, doctype, Capability::Read) {
			return Err(self.denied(doctype, Capability::Read));
		}
		let record = self.remote(self.inner.gateway.read(doctype, name)).await?;
		let doc = Document::from_record(&meta, record)?;
		if !self.inner.permissions.can(&self.inner.actor, doctype, Capability::Read, Some(&doc)) {
			return Err(self.denied(doctype, Capability::Read));
		}
		let children = self.child_metas(&meta).await?;
		debug!(doctype, name, "form loaded");
		let form = Form::assemble(self.clone(), meta, children, doc, Lifecycle::Clean);
		form.open().await?;
		Ok(form)
	}

	/// Opens the single document of a singleton type, creating it locally if
	/// the server has none yet.
	pub async fn open_single(&self, doctype: &str) -> Result<Form> {
		let meta = self.meta(doctype).await?;
		if !meta.is_singleton() {
			return Err(FormError::InvalidTransition(format!("{doctype} is not a singleton")));
		}
		match self.load(doctype, doctype).await {
			Err(FormError::NotFound { .. }) => self.create(meta).await,
			other => other,
		}
	}

	async fn create(&self, meta: Arc<Meta>) -> Result<Form> {
		let doctype = meta.doctype();
		if meta.is_child() {
			return Err(FormError::InvalidTransition(format!("{doctype} only exists as child rows")));
		}
		if !self.inner.permissions.can(&self.inner.actor, doctype, Capability::Create, None) {
			return Err(self.denied(doctype, Capability::Create));
		}
		let children = self.child_metas(&meta).await?;
		let doc = Document::new(&meta);
		debug!(doctype, "new form");
		let form = Form::assemble(self.clone(), meta, children, doc, Lifecycle::New);
		form.open().await?;
		Ok(form)
	}

	pub(crate) async fn child_metas(&self, meta: &Meta) -> Result<HashMap<String, Arc<Meta>>> {
		let mut children = HashMap::default();
		for table in meta.table_fields() {
			if let Some(target) = table.target_doctype() {
				children.insert(table.name.clone(), self.meta(target).await?);
			}
		}
		Ok(children)
	}

	pub(crate) fn resolve(&self, doctype: &str, event: &str) -> Handlers<HandlerContext, FormError> {
		if self.inner.config.wildcard_handlers {
			self.inner.handlers.resolve(doctype, event)
		} else {
			self.inner.handlers.resolve_exact(doctype, event)
		}
	}

	pub(crate) fn denied(&self, doctype: &str, capability: Capability) -> FormError {
		debug!(actor = %self.inner.actor, doctype, %capability, "permission denied");
		FormError::PermissionDenied(format!("{} may not {capability} {doctype}", self.inner.actor))
	}

	/// Awaits a gateway call under the configured deadline.
	pub(crate) async fn remote<T, F>(&self, call: F) -> Result<T>
	where
		F: Future<Output = std::result::Result<T, GatewayError>>,
	{
		let Some(limit) = self.inner.config.rpc_timeout() else {
			return Ok(call.await?);
		};
		match tokio::time::timeout(limit, call).await {
			Ok(result) => Ok(result?),
			Err(_) => {
				warn!(?limit, "gateway call timed out");
				Err(GatewayError::Timeout.into())
			}
		}
	}
}
