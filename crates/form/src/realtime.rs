//! Applying realtime pushes to open forms.

use formwork_gateway::realtime::events as push_events;
use formwork_gateway::{Push, PushPayload, RealtimeChannel, Revision};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::controller::{Event, Form};
use crate::error::{FormError, Result};
use crate::events;
use crate::inbox::{InboxOutcome, PushInbox};
use crate::lifecycle::Lifecycle;

/// What [`Form::apply_push`] did with a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
	/// Not about this form, or not newer than what it holds.
	Ignored,
	/// The form was clean and reloaded itself.
	Refreshed,
	/// The form has local edits; the newer revision was recorded.
	ConflictRecorded(Revision),
	/// The meta cache entry of the named type was dropped.
	MetaInvalidated,
	/// The edit lock holder was updated and `realtime_lock` fired.
	LockUpdated,
	/// `realtime_progress` fired.
	Progress,
}

impl Form {
	/// Reconciles one push with this form.
	///
	/// A newer `doc_update` reloads a clean form and is only recorded for a
	/// form with local edits or a write in flight; the server's revision
	/// check on the next save reports the conflict.
	pub async fn apply_push(&self, push: &Push) -> Result<PushOutcome> {
		if let PushPayload::MetaInvalidated { doctype } = &push.payload {
			self.runtime().metas().invalidate(doctype);
			return Ok(PushOutcome::MetaInvalidated);
		}
		let Some((doctype, name)) = push.target() else {
			return Ok(PushOutcome::Ignored);
		};
		if doctype != self.doctype() || self.name().as_deref() != Some(name) {
			return Ok(PushOutcome::Ignored);
		}

		match &push.payload {
			PushPayload::DocUpdate {
				revision, modified_by, ..
			} => self.apply_update(*revision, modified_by).await,
			PushPayload::DocLock { holder, .. } => {
				self.inner.state.lock().lock_holder = holder.clone();
				self.fire(Event::new(self.doctype(), events::REALTIME_LOCK).push(push.clone()))
					.await?;
				Ok(PushOutcome::LockUpdated)
			}
			PushPayload::Progress { .. } => {
				self.fire(Event::new(self.doctype(), events::REALTIME_PROGRESS).push(push.clone()))
					.await?;
				Ok(PushOutcome::Progress)
			}
			PushPayload::MetaInvalidated { .. } | PushPayload::Other(_) => Ok(PushOutcome::Ignored),
		}
	}

	async fn apply_update(&self, revision: Revision, modified_by: &str) -> Result<PushOutcome> {
		let silent = {
			let mut state = self.inner.state.lock();
			if state.doc.revision().is_some_and(|local| local >= revision) || !state.lifecycle.is_live() {
				return Ok(PushOutcome::Ignored);
			}
			let silent =
				state.lifecycle == Lifecycle::Clean && !self.is_busy() && self.runtime().config().refresh_on_push;
			if !silent {
				state.pending_conflict = state.pending_conflict.max(Some(revision));
			}
			silent
		};

		if silent {
			match self.refresh_for_push(revision).await {
				Ok(true) => {
					debug!(doctype = %self.doctype(), %revision, modified_by, "refreshed from push");
					return Ok(PushOutcome::Refreshed);
				}
				Ok(false) => {}
				Err(FormError::OperationInProgress) => {
					let mut state = self.inner.state.lock();
					state.pending_conflict = state.pending_conflict.max(Some(revision));
				}
				Err(err) => return Err(err),
			}
		}
		debug!(doctype = %self.doctype(), %revision, modified_by, "newer revision recorded");
		Ok(PushOutcome::ConflictRecorded(revision))
	}

	/// Subscribes to the push events a form cares about and applies them in
	/// the background until the returned link is dropped.
	///
	/// Must be called inside a Tokio runtime.
	pub fn attach(&self, channel: &dyn RealtimeChannel) -> RealtimeLink {
		let cancel = CancellationToken::new();
		let inbox = PushInbox::new(self.runtime().config().inbox_capacity);
		let (applied_tx, applied) = watch::channel(0u64);
		let mut tasks = Vec::new();

		for event in [
			push_events::DOC_UPDATE,
			push_events::META_INVALIDATED,
			push_events::DOC_LOCK,
			push_events::PROGRESS,
		] {
			let mut sub = channel.subscribe(event);
			let inbox = inbox.clone();
			let cancel = cancel.clone();
			tasks.push(tokio::spawn(async move {
				loop {
					tokio::select! {
						_ = cancel.cancelled() => break,
						push = sub.recv() => match push {
							Some(push) => {
								if inbox.push(push) == InboxOutcome::Closed {
									break;
								}
							}
							None => break,
						},
					}
				}
			}));
		}

		let form = self.clone();
		let rx = inbox.clone();
		let stop = cancel.clone();
		tasks.push(tokio::spawn(async move {
			loop {
				let push = tokio::select! {
					_ = stop.cancelled() => break,
					push = rx.recv() => match push {
						Some(push) => push,
						None => break,
					},
				};
				trace!(event = %push.event, "applying push");
				if let Err(err) = form.apply_push(&push).await {
					warn!(doctype = %form.doctype(), event = %push.event, error = %err, "push not applied");
				}
				applied_tx.send_modify(|n| *n += 1);
			}
		}));

		RealtimeLink {
			cancel,
			inbox,
			applied,
			tasks,
		}
	}
}

/// Background subscription feeding pushes into a form.
///
/// Dropping it stops delivery.
pub struct RealtimeLink {
	cancel: CancellationToken,
	inbox: PushInbox,
	applied: watch::Receiver<u64>,
	tasks: Vec<JoinHandle<()>>,
}

impl RealtimeLink {
	/// Pushes waiting to be applied.
	pub fn inbox(&self) -> &PushInbox {
		&self.inbox
	}

	/// Number of pushes applied so far.
	pub fn applied(&self) -> u64 {
		*self.applied.borrow()
	}

	/// Waits until at least `count` pushes have been applied.
	pub async fn wait_applied(&mut self, count: u64) {
		let _ = self.applied.wait_for(|n| *n >= count).await;
	}

	/// Stops delivery and waits for the background tasks to finish.
	pub async fn detach(mut self) {
		self.cancel.cancel();
		self.inbox.close();
		for task in self.tasks.drain(..) {
			if let Err(err) = task.await {
				warn!(error = %err, "realtime task failed");
			}
		}
	}
}

impl Drop for RealtimeLink {
	fn drop(&mut self) {
		self.cancel.cancel();
		self.inbox.close();
	}
}
