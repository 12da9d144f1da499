//! Operations that talk to the server.

use std::sync::atomic::Ordering;

use formwork_gateway::{Capability, ChildRecord, DocStatus, MethodCall, Revision};
use tracing::debug;

use super::{Form, FormInner, FormState};
use crate::config::WriteMode;
use crate::document::{Document, Tables};
use crate::error::{FormError, Result};
use crate::events;
use crate::lifecycle::Lifecycle;

/// Exclusive claim on a form's write path.
///
/// Dropping it, including when the operation's future is dropped mid-flight,
/// releases the claim and rolls a pending `Saving` back to the lifecycle the
/// operation started from.
struct OpGuard<'a> {
	form: &'a FormInner,
	restore: Option<Lifecycle>,
}

impl OpGuard<'_> {
	fn enter_saving(&mut self, state: &mut FormState) {
		self.restore = Some(state.lifecycle);
		state.transition(Lifecycle::Saving);
	}

	/// The operation reached a stable state; nothing to roll back.
	fn settle(&mut self) {
		self.restore = None;
	}
}

impl Drop for OpGuard<'_> {
	fn drop(&mut self) {
		if let Some(prev) = self.restore.take() {
			let mut state = self.form.state.lock();
			if state.lifecycle == Lifecycle::Saving {
				let back = match prev {
					Lifecycle::Clean if state.doc.is_dirty() => Lifecycle::Dirty,
					other => other,
				};
				state.transition(back);
			}
		}
		self.form.busy.store(false, Ordering::Release);
	}
}

impl Form {
	fn begin(&self, op: &'static str) -> Result<OpGuard<'_>> {
		if self.inner.busy.swap(true, Ordering::AcqRel) {
			debug!(doctype = %self.doctype(), op, "operation already in flight");
			return Err(FormError::OperationInProgress);
		}
		Ok(OpGuard {
			form: &self.inner,
			restore: None,
		})
	}

	/// Persists local edits.
	///
	/// Fires `validate` and `before_save` (either may reject), checks
	/// mandatory fields, writes, merges the server's answer, then fires
	/// `after_save` and `refresh`. A persisted form without edits is left
	/// alone. On failure the form keeps its local values and pre-save
	/// lifecycle.
	pub async fn save(&self) -> Result<()> {
		let mut op = self.begin("save")?;
		let capability = {
			let state = self.inner.state.lock();
			self.ensure_editable(&state)?;
			if !state.doc.is_dirty() {
				debug!(doctype = %self.doctype(), name = ?state.doc.name(), "nothing to save");
				return Ok(());
			}
			if state.doc.is_new() { Capability::Create } else { Capability::Write }
		};
		self.require(capability)?;
		self.transmit(&mut op, None, events::BEFORE_SAVE).await?;
		drop(op);

		self.emit(events::AFTER_SAVE).await?;
		self.emit(events::REFRESH).await?;
		Ok(())
	}

	/// Moves a saved draft to `Submitted`.
	///
	/// Fires `validate`, `before_submit`, then after the write `on_submit`
	/// and `refresh`. Pending edits are written along with the status.
	pub async fn submit(&self) -> Result<()> {
		let mut op = self.begin("submit")?;
		self.check_status_change(DocStatus::Draft, "submit")?;
		self.require(Capability::Submit)?;
		self.transmit(&mut op, Some(DocStatus::Submitted), events::BEFORE_SUBMIT)
			.await?;
		drop(op);

		self.emit(events::ON_SUBMIT).await?;
		self.emit(events::REFRESH).await?;
		Ok(())
	}

	/// Moves a submitted document to `Cancelled`.
	///
	/// Fires `validate`, `before_cancel`, then after the write `on_cancel`
	/// and `refresh`.
	pub async fn cancel(&self) -> Result<()> {
		let mut op = self.begin("cancel")?;
		self.check_status_change(DocStatus::Submitted, "cancel")?;
		self.require(Capability::Cancel)?;
		self.transmit(&mut op, Some(DocStatus::Cancelled), events::BEFORE_CANCEL)
			.await?;
		drop(op);

		self.emit(events::ON_CANCEL).await?;
		self.emit(events::REFRESH).await?;
		Ok(())
	}

	/// Re-reads the document, dropping local edits and any recorded
	/// conflict, then fires `refresh`.
	pub async fn reload(&self) -> Result<()> {
		self.reread(None).await.map(|_| ())
	}

	/// Re-reads the document for a push announcing `revision`.
	///
	/// Returns `false`, recording `revision` as a pending conflict instead,
	/// when the form was edited while the read was in flight.
	pub(crate) async fn refresh_for_push(&self, revision: Revision) -> Result<bool> {
		self.reread(Some(revision)).await
	}

	async fn reread(&self, pushed: Option<Revision>) -> Result<bool> {
		let op = self.begin("reload")?;
		let (name, read_at) = {
			let state = self.inner.state.lock();
			if !state.lifecycle.is_live() {
				return Err(FormError::InvalidTransition("form was discarded".into()));
			}
			let name = state
				.doc
				.name()
				.map(str::to_string)
				.ok_or_else(|| FormError::InvalidTransition("document was never saved".into()))?;
			(name, state.doc.local_revision())
		};
		self.require(Capability::Read)?;

		let runtime = self.runtime();
		let record = runtime.remote(runtime.gateway().read(self.doctype(), &name)).await?;
		{
			let mut state = self.inner.state.lock();
			if let Some(revision) = pushed
				&& (state.doc.local_revision() != read_at || state.doc.is_dirty())
			{
				state.pending_conflict = state.pending_conflict.max(Some(revision));
				debug!(doctype = %self.doctype(), name = %name, %revision, "edited during refresh; kept local values");
				return Ok(false);
			}
			state.doc.replace(self.meta(), record)?;
			if state.lifecycle.is_live() {
				state.transition(Lifecycle::Clean);
			}
			state.pending_conflict = None;
		}
		debug!(doctype = %self.doctype(), name = %name, "form reloaded");
		drop(op);

		self.emit(events::REFRESH).await?;
		Ok(true)
	}

	/// Deletes the document on the server and discards the form.
	///
	/// Submitted documents must be cancelled first. An unsaved form is
	/// simply discarded. Fires `on_trash` (may reject) before and
	/// `after_delete` after the server call.
	pub async fn delete(&self) -> Result<()> {
		let mut op = self.begin("delete")?;
		{
			let mut state = self.inner.state.lock();
			if !state.lifecycle.is_live() {
				return Err(FormError::InvalidTransition("form was discarded".into()));
			}
			if state.doc.status() == DocStatus::Submitted {
				return Err(FormError::InvalidTransition(format!(
					"submitted {} must be cancelled before deletion",
					self.doctype()
				)));
			}
			if state.doc.is_new() {
				state.transition(Lifecycle::Discarded);
				return Ok(());
			}
		}
		self.require(Capability::Delete)?;
		self.emit_checked(events::ON_TRASH).await?;

		let (name, revision) = {
			let state = self.inner.state.lock();
			let name = state.doc.name().map(str::to_string).unwrap_or_default();
			(name, state.doc.revision().unwrap_or_default())
		};
		let runtime = self.runtime();
		runtime
			.remote(runtime.gateway().delete(self.doctype(), &name, revision))
			.await?;
		{
			let mut state = self.inner.state.lock();
			if state.lifecycle.is_live() {
				state.transition(Lifecycle::Discarded);
			}
		}
		op.settle();
		debug!(doctype = %self.doctype(), name = %name, "document deleted");
		drop(op);

		self.emit(events::AFTER_DELETE).await?;
		Ok(())
	}

	/// Opens a new draft amending this cancelled document.
	///
	/// Values are copied except `no_copy` fields; the new form's
	/// `amended_from` names this document, which is left unchanged.
	pub async fn amend(&self) -> Result<Form> {
		let (name, copy) = {
			let state = self.inner.state.lock();
			if !state.lifecycle.is_live() {
				return Err(FormError::InvalidTransition("form was discarded".into()));
			}
			if state.doc.status() != DocStatus::Cancelled {
				return Err(FormError::InvalidTransition(format!(
					"only cancelled documents can be amended, this one is {}",
					state.doc.status()
				)));
			}
			let name = state.doc.name().map(str::to_string).unwrap_or_default();
			(name, state.doc.clone())
		};
		self.require(Capability::Amend)?;
		let runtime = self.runtime();
		if !runtime
			.permissions()
			.can(runtime.actor(), self.doctype(), Capability::Create, None)
		{
			return Err(runtime.denied(self.doctype(), Capability::Create));
		}

		let meta = self.meta();
		let mut doc = Document::new(meta);
		let mut children: Tables = meta.table_fields().map(|f| (f.name.clone(), Vec::new())).collect();
		for field in meta.fields().iter().filter(|f| !f.no_copy) {
			match copy.rows(&field.name) {
				Some(rows) => {
					let rows = rows
						.iter()
						.map(|row| ChildRecord {
							name: None,
							values: row.values.clone(),
						})
						.collect();
					children.insert(field.name.clone(), rows);
				}
				None => {
					let value = copy.get(&field.name);
					if !value.is_empty() {
						doc.set(&field.name, value);
					}
				}
			}
		}
		doc.set_children(children);
		doc.set_amended_from(name.as_str());
		debug!(doctype = %self.doctype(), amended_from = %name, "amendment opened");

		let form = Form::assemble(
			runtime.clone(),
			meta.clone(),
			self.inner.children.clone(),
			doc,
			Lifecycle::New,
		);
		form.open().await?;
		Ok(form)
	}

	/// Invokes a server method scoped to this document.
	pub async fn call(&self, method: &str, args: serde_json::Value) -> Result<serde_json::Value> {
		self.ensure_live()?;
		let call = MethodCall {
			doctype: self.doctype().to_string(),
			name: self.name(),
			method: method.to_string(),
			args,
		};
		let runtime = self.runtime();
		runtime.remote(runtime.gateway().invoke(call)).await
	}

	fn check_status_change(&self, from: DocStatus, op: &str) -> Result<()> {
		if !self.inner.meta.is_submittable() {
			return Err(FormError::NotSubmittable(self.doctype().to_string()));
		}
		let state = self.inner.state.lock();
		if !state.lifecycle.is_live() {
			return Err(FormError::InvalidTransition("form was discarded".into()));
		}
		if state.doc.is_new() {
			return Err(FormError::InvalidTransition(format!("save before you {op}")));
		}
		let status = state.doc.status();
		if status != from {
			return Err(FormError::InvalidTransition(format!("cannot {op} a {status} document")));
		}
		Ok(())
	}

	/// `validate`, `before`, mandatory check, write, merge.
	async fn transmit(&self, op: &mut OpGuard<'_>, target: Option<DocStatus>, before: &str) -> Result<()> {
		self.emit_checked(events::VALIDATE).await?;
		self.emit_checked(before).await?;

		let runtime = self.runtime();
		let full = runtime.config().write_mode == WriteMode::Full;
		let (request, sent_at) = {
			let mut state = self.inner.state.lock();
			self.ensure_transmittable(&state, target)?;
			let missing = self.missing_mandatory(&state);
			if !missing.is_empty() {
				return Err(FormError::ValidationFailed(format!(
					"missing mandatory fields: {}",
					missing.join(", ")
				)));
			}
			let status = target.unwrap_or(state.doc.status());
			let request = state.doc.write_request(runtime.actor(), status, full);
			let sent_at = state.doc.local_revision();
			op.enter_saving(&mut state);
			(request, sent_at)
		};
		debug!(
			doctype = %self.doctype(),
			name = ?request.name,
			fields = request.values.len(),
			status = %request.status,
			"writing"
		);

		let response = runtime.remote(runtime.gateway().write(request)).await?;
		let mut state = self.inner.state.lock();
		state.doc.merge_saved(self.meta(), response.record, sent_at)?;
		let revision = state.doc.revision();
		if state.pending_conflict.is_some_and(|seen| Some(seen) <= revision) {
			state.pending_conflict = None;
		}
		if state.lifecycle == Lifecycle::Saving {
			let settled = if state.doc.is_dirty() { Lifecycle::Dirty } else { Lifecycle::Clean };
			state.transition(settled);
		}
		op.settle();
		debug!(doctype = %self.doctype(), name = ?state.doc.name(), ?revision, "write merged");
		Ok(())
	}

	/// Handlers ran without the lock; re-check that they left the form in a
	/// state the write still applies to.
	fn ensure_transmittable(&self, state: &FormState, target: Option<DocStatus>) -> Result<()> {
		if !state.lifecycle.is_live() {
			return Err(FormError::InvalidTransition("form was discarded".into()));
		}
		if target.is_none() {
			self.ensure_editable(state)?;
		}
		Ok(())
	}
}
