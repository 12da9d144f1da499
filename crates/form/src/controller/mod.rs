//! The form controller.
//!
//! A [`Form`] is a cheap-clone handle around one [`Document`]. Handlers
//! receive a clone through [`HandlerContext`] and may call back into it; the
//! state lock is never held while handlers run or a gateway call is awaited.

mod persist;
mod table;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use formwork_dispatch::Flow;
use formwork_gateway::{Capability, DocStatus, Push, Revision};
use formwork_meta::{FieldDescriptor, FieldError, FieldKind, FieldValues, Meta, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use tracing::{debug, trace, warn};

use crate::context::{HandlerContext, RowRef};
use crate::document::Document;
use crate::error::{FormError, Result};
use crate::events;
use crate::lifecycle::Lifecycle;
use crate::runtime::FormRuntime;

/// Per-form override of a field's static properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProperty {
	/// Reject `set_field` regardless of the meta.
	ReadOnly(bool),
	/// Require a value at save time regardless of `nullable`.
	Mandatory(bool),
	/// Presentation hint; does not affect validation.
	Hidden(bool),
}

/// Effective properties of one field on one form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldProperties {
	/// Writes through `set_field` are rejected.
	pub read_only: bool,
	/// Save fails while the field is empty.
	pub mandatory: bool,
	/// The field should not be shown.
	pub hidden: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Overrides {
	read_only: Option<bool>,
	mandatory: Option<bool>,
	hidden: Option<bool>,
}

pub(crate) struct FormState {
	pub(crate) doc: Document,
	pub(crate) lifecycle: Lifecycle,
	overrides: HashMap<String, Overrides>,
	pub(crate) pending_conflict: Option<Revision>,
	pub(crate) lock_holder: Option<String>,
}

impl FormState {
	/// Moves the form to `next`; the step must be one [`Lifecycle::allows`].
	pub(crate) fn transition(&mut self, next: Lifecycle) {
		debug_assert!(
			self.lifecycle.allows(next),
			"illegal lifecycle step {} -> {next}",
			self.lifecycle
		);
		trace!(from = %self.lifecycle, to = %next, "lifecycle");
		self.lifecycle = next;
	}

	/// A persisted form with a fresh edit becomes `Dirty`.
	pub(crate) fn mark_dirty(&mut self) {
		if self.lifecycle == Lifecycle::Clean {
			self.transition(Lifecycle::Dirty);
		}
	}
}

pub(crate) struct FormInner {
	runtime: FormRuntime,
	meta: Arc<Meta>,
	children: HashMap<String, Arc<Meta>>,
	pub(crate) state: Mutex<FormState>,
	depth: AtomicUsize,
	busy: AtomicBool,
}

/// Handle to one open document.
#[derive(Clone)]
pub struct Form {
	pub(crate) inner: Arc<FormInner>,
}

impl std::fmt::Debug for Form {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("Form")
			.field("doctype", &self.doctype())
			.field("name", &state.doc.name())
			.field("lifecycle", &state.lifecycle)
			.field("status", &state.doc.status())
			.finish()
	}
}

/// Decrements the dispatch depth on drop.
pub(crate) struct DepthGuard<'a> {
	depth: &'a AtomicUsize,
}

impl Drop for DepthGuard<'_> {
	fn drop(&mut self) {
		self.depth.fetch_sub(1, Ordering::SeqCst);
	}
}

/// One handler fan-out.
pub(crate) struct Event<'a> {
	doctype: &'a str,
	name: &'a str,
	field: Option<&'a str>,
	row: Option<RowRef>,
	push: Option<Push>,
}

impl<'a> Event<'a> {
	pub(crate) fn new(doctype: &'a str, name: &'a str) -> Self {
		Self {
			doctype,
			name,
			field: None,
			row: None,
			push: None,
		}
	}

	fn field(mut self, field: &'a str) -> Self {
		self.field = Some(field);
		self
	}

	fn row(mut self, row: RowRef) -> Self {
		self.row = Some(row);
		self
	}

	pub(crate) fn push(mut self, push: Push) -> Self {
		self.push = Some(push);
		self
	}
}

impl Form {
	pub(crate) fn assemble(
		runtime: FormRuntime,
		meta: Arc<Meta>,
		children: HashMap<String, Arc<Meta>>,
		doc: Document,
		lifecycle: Lifecycle,
	) -> Self {
		Self {
			inner: Arc::new(FormInner {
				runtime,
				meta,
				children,
				state: Mutex::new(FormState {
					doc,
					lifecycle,
					overrides: HashMap::default(),
					pending_conflict: None,
					lock_holder: None,
				}),
				depth: AtomicUsize::new(0),
				busy: AtomicBool::new(false),
			}),
		}
	}

	/// Fires the open sequence: `setup`, `onload`, `refresh`.
	pub(crate) async fn open(&self) -> Result<()> {
		for event in [events::SETUP, events::ONLOAD, events::REFRESH] {
			self.emit(event).await?;
		}
		Ok(())
	}

	/// Document type.
	pub fn doctype(&self) -> &str {
		self.inner.meta.doctype()
	}

	/// Meta the form was opened with.
	pub fn meta(&self) -> &Arc<Meta> {
		&self.inner.meta
	}

	/// Runtime the form belongs to.
	pub fn runtime(&self) -> &FormRuntime {
		&self.inner.runtime
	}

	/// Server identifier, absent until first saved.
	pub fn name(&self) -> Option<String> {
		self.inner.state.lock().doc.name().map(str::to_string)
	}

	/// Save lifecycle.
	pub fn lifecycle(&self) -> Lifecycle {
		self.inner.state.lock().lifecycle
	}

	/// Submission status.
	pub fn status(&self) -> DocStatus {
		self.inner.state.lock().doc.status()
	}

	/// Whether unsaved edits exist or the document was never saved.
	pub fn is_dirty(&self) -> bool {
		self.inner.state.lock().doc.is_dirty()
	}

	/// Server revision the local copy is based on.
	pub fn revision(&self) -> Option<Revision> {
		self.inner.state.lock().doc.revision()
	}

	/// Creating actor.
	pub fn owner(&self) -> Option<String> {
		self.inner.state.lock().doc.owner().map(str::to_string)
	}

	/// Cancelled document this one amends.
	pub fn amended_from(&self) -> Option<String> {
		self.inner.state.lock().doc.amended_from().map(str::to_string)
	}

	/// All scalar values.
	pub fn values(&self) -> FieldValues {
		self.inner.state.lock().doc.values().clone()
	}

	/// Fields and tables modified since the last reconcile.
	pub fn modified_fields(&self) -> Vec<String> {
		self.inner.state.lock().doc.modified().map(str::to_string).collect()
	}

	/// Snapshot of the underlying document.
	pub fn document(&self) -> Document {
		self.inner.state.lock().doc.clone()
	}

	/// Newer server revision seen through a push but not applied because
	/// the form had local edits. The next save reports the conflict.
	pub fn pending_conflict(&self) -> Option<Revision> {
		self.inner.state.lock().pending_conflict
	}

	/// Collaborator currently holding the edit lock.
	pub fn lock_holder(&self) -> Option<String> {
		self.inner.state.lock().lock_holder.clone()
	}

	/// Whether a save, submit, cancel, reload or delete is in flight.
	pub fn is_busy(&self) -> bool {
		self.inner.busy.load(Ordering::Acquire)
	}

	/// Reads a field.
	///
	/// Unknown fields and tables fail with `SchemaViolation`; unset fields
	/// read as `Null`.
	pub fn get_field(&self, name: &str) -> Result<Value> {
		let field = self.inner.meta.require_field(name)?;
		if field.kind == FieldKind::Table {
			return Err(FieldError::TableField(name.to_string()).into());
		}
		Ok(self.inner.state.lock().doc.get(name))
	}

	/// Writes a field and fires `"<name>"` then `"*"`.
	///
	/// The value is validated and coerced first; a rejected write leaves
	/// the document untouched. Handlers may write further fields from their
	/// async tail; each nested write counts toward `max_dispatch_depth` and
	/// the write that would exceed it fails with `DispatchCycleDetected`
	/// before being applied.
	pub async fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<()> {
		let field = self.inner.meta.require_field(name)?;
		let _depth = {
			let mut state = self.inner.state.lock();
			self.ensure_editable(&state)?;
			if self.read_only(&state, field) {
				return Err(FieldError::ReadOnly(name.to_string()).into());
			}
			let value = field.coerce(value.into())?;
			let depth = self.enter(name)?;
			let rev = state.doc.set(name, value);
			state.mark_dirty();
			trace!(doctype = %self.doctype(), field = name, local_revision = rev, "field set");
			depth
		};

		let doctype = self.doctype();
		self.fire_field(Event::new(doctype, name).field(name)).await?;
		self.fire_field(Event::new(doctype, events::ANY_FIELD).field(name)).await
	}

	/// Runs the handlers registered for `event` on this form's type.
	pub async fn trigger(&self, event: &str) -> Result<Flow> {
		self.ensure_live()?;
		self.emit(event).await
	}

	/// Overrides a static property of `field` for this form only.
	pub fn set_field_property(&self, field: &str, property: FieldProperty) -> Result<()> {
		self.inner.meta.require_field(field)?;
		let mut state = self.inner.state.lock();
		let entry = state.overrides.entry(field.to_string()).or_default();
		match property {
			FieldProperty::ReadOnly(on) => entry.read_only = Some(on),
			FieldProperty::Mandatory(on) => entry.mandatory = Some(on),
			FieldProperty::Hidden(on) => entry.hidden = Some(on),
		}
		Ok(())
	}

	/// Effective properties of `field`.
	pub fn field_properties(&self, field: &str) -> Result<FieldProperties> {
		let desc = self.inner.meta.require_field(field)?;
		let state = self.inner.state.lock();
		let o = state.overrides.get(field).copied().unwrap_or_default();
		Ok(FieldProperties {
			read_only: o.read_only.unwrap_or(desc.readonly),
			mandatory: o.mandatory.unwrap_or(!desc.nullable),
			hidden: o.hidden.unwrap_or(false),
		})
	}

	/// Releases the form. Every later mutation fails with
	/// `InvalidTransition`.
	pub fn discard(&self) {
		let mut state = self.inner.state.lock();
		if state.lifecycle != Lifecycle::Discarded {
			debug!(doctype = %self.doctype(), name = ?state.doc.name(), "form discarded");
			state.transition(Lifecycle::Discarded);
		}
	}

	fn read_only(&self, state: &FormState, field: &FieldDescriptor) -> bool {
		state
			.overrides
			.get(&field.name)
			.and_then(|o| o.read_only)
			.unwrap_or(field.readonly)
	}

	/// Mandatory fields that are still empty.
	pub(crate) fn missing_mandatory(&self, state: &FormState) -> Vec<String> {
		self.inner
			.meta
			.fields()
			.iter()
			.filter(|f| f.kind != FieldKind::Table)
			.filter(|f| {
				state
					.overrides
					.get(&f.name)
					.and_then(|o| o.mandatory)
					.unwrap_or(!f.nullable)
			})
			.filter(|f| state.doc.values().get(&f.name).is_none_or(Value::is_empty))
			.map(|f| f.name.clone())
			.collect()
	}

	pub(crate) fn ensure_live(&self) -> Result<()> {
		if self.inner.state.lock().lifecycle.is_live() {
			Ok(())
		} else {
			Err(FormError::InvalidTransition("form was discarded".into()))
		}
	}

	pub(crate) fn ensure_editable(&self, state: &FormState) -> Result<()> {
		if !state.lifecycle.is_live() {
			return Err(FormError::InvalidTransition("form was discarded".into()));
		}
		let status = state.doc.status();
		if !status.is_editable() {
			return Err(FormError::InvalidTransition(format!("{} is {status}", self.doctype())));
		}
		Ok(())
	}

	pub(crate) fn require(&self, capability: Capability) -> Result<()> {
		let runtime = &self.inner.runtime;
		let allowed = {
			let state = self.inner.state.lock();
			runtime
				.permissions()
				.can(runtime.actor(), self.doctype(), capability, Some(&state.doc))
		};
		if allowed { Ok(()) } else { Err(runtime.denied(self.doctype(), capability)) }
	}

	pub(crate) fn child_meta(&self, table: &str) -> Option<&Arc<Meta>> {
		self.inner.children.get(table)
	}

	/// Claims one level of dispatch depth.
	pub(crate) fn enter(&self, event: &str) -> Result<DepthGuard<'_>> {
		let max = self.inner.runtime.config().max_dispatch_depth;
		let depth = self.inner.depth.fetch_add(1, Ordering::SeqCst) + 1;
		if depth > max {
			self.inner.depth.fetch_sub(1, Ordering::SeqCst);
			warn!(doctype = %self.doctype(), event, max, "dispatch depth exceeded");
			return Err(FormError::DispatchCycleDetected {
				event: event.to_string(),
				depth: max,
			});
		}
		Ok(DepthGuard {
			depth: &self.inner.depth,
		})
	}

	/// Fires a lifecycle event on this form's type under a depth guard.
	pub(crate) async fn emit(&self, event: &str) -> Result<Flow> {
		let _depth = self.enter(event)?;
		self.fire(Event::new(self.doctype(), event)).await
	}

	/// Like [`Self::emit`], turning a rejection into `ValidationFailed`.
	pub(crate) async fn emit_checked(&self, event: &str) -> Result<()> {
		match self.emit(event).await? {
			Flow::Continue => Ok(()),
			Flow::Reject(reason) => {
				debug!(doctype = %self.doctype(), event, %reason, "rejected by handler");
				Err(FormError::ValidationFailed(reason))
			}
		}
	}

	/// Field events cannot veto; a rejection is only logged.
	async fn fire_field(&self, event: Event<'_>) -> Result<()> {
		let name = event.name.to_string();
		if let Flow::Reject(reason) = self.fire(event).await? {
			debug!(doctype = %self.doctype(), event = %name, %reason, "field handler rejection ignored");
		}
		Ok(())
	}

	pub(crate) async fn fire(&self, event: Event<'_>) -> Result<Flow> {
		let handlers = self.inner.runtime.resolve(event.doctype, event.name);
		if handlers.is_empty() {
			return Ok(Flow::Continue);
		}
		trace!(doctype = event.doctype, event = event.name, handlers = handlers.len(), "dispatching");
		let ctx = HandlerContext {
			form: self.clone(),
			doctype: event.doctype.to_string(),
			event: event.name.to_string(),
			field: event.field.map(str::to_string),
			row: event.row,
			push: event.push,
		};
		formwork_dispatch::run(handlers, &ctx).await
	}
}
