//! Bounded push queue with per-document coalescing.

use std::collections::VecDeque;
use std::sync::Arc;

use formwork_gateway::{Push, PushPayload};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

/// Outcome of [`PushInbox::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxOutcome {
	/// Queued at the back.
	Enqueued,
	/// Replaced a queued `doc_update` for the same document in place.
	Coalesced,
	/// Queue was full; the oldest push was dropped to make room.
	DroppedOldest,
	/// The inbox is closed; the push was discarded.
	Closed,
}

struct InboxState {
	queue: VecDeque<Push>,
	closed: bool,
}

struct InboxInner {
	capacity: usize,
	state: Mutex<InboxState>,
	notify: Notify,
}

/// Pushes waiting to be applied to a form, in arrival order.
///
/// A `doc_update` replaces any queued `doc_update` for the same document,
/// so a burst of saves elsewhere costs one reload. Other pushes are never
/// coalesced.
#[derive(Clone)]
pub struct PushInbox {
	inner: Arc<InboxInner>,
}

impl PushInbox {
	/// Creates an inbox holding at most `capacity` pushes.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0, "inbox capacity must be > 0");
		Self {
			inner: Arc::new(InboxInner {
				capacity,
				state: Mutex::new(InboxState {
					queue: VecDeque::with_capacity(capacity),
					closed: false,
				}),
				notify: Notify::new(),
			}),
		}
	}

	/// Queues `push`.
	pub fn push(&self, push: Push) -> InboxOutcome {
		let outcome = {
			let mut state = self.inner.state.lock();
			if state.closed {
				return InboxOutcome::Closed;
			}
			if let Some(slot) = state.queue.iter_mut().find(|queued| same_document_update(queued, &push)) {
				*slot = push;
				InboxOutcome::Coalesced
			} else if state.queue.len() >= self.inner.capacity {
				if let Some(dropped) = state.queue.pop_front() {
					warn!(event = %dropped.event, "push inbox full; oldest push dropped");
				}
				state.queue.push_back(push);
				InboxOutcome::DroppedOldest
			} else {
				state.queue.push_back(push);
				InboxOutcome::Enqueued
			}
		};
		self.inner.notify.notify_one();
		outcome
	}

	/// Waits for the next push. Returns `None` once closed and drained.
	pub async fn recv(&self) -> Option<Push> {
		loop {
			let notified = self.inner.notify.notified();
			{
				let mut state = self.inner.state.lock();
				if let Some(push) = state.queue.pop_front() {
					return Some(push);
				}
				if state.closed {
					return None;
				}
			}
			notified.await;
		}
	}

	/// Returns a queued push without waiting.
	pub fn try_recv(&self) -> Option<Push> {
		self.inner.state.lock().queue.pop_front()
	}

	/// Stops accepting pushes; queued ones can still be received.
	pub fn close(&self) {
		self.inner.state.lock().closed = true;
		self.inner.notify.notify_waiters();
	}

	/// Number of queued pushes.
	pub fn len(&self) -> usize {
		self.inner.state.lock().queue.len()
	}

	/// Whether nothing is queued.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn same_document_update(queued: &Push, incoming: &Push) -> bool {
	matches!(
		(&queued.payload, &incoming.payload),
		(PushPayload::DocUpdate { .. }, PushPayload::DocUpdate { .. })
	) && queued.target() == incoming.target()
}
