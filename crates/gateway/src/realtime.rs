//! Realtime push subscriptions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::protocol::Revision;

/// Push event names published by the server.
pub mod events {
	/// A document was written.
	pub const DOC_UPDATE: &str = "doc_update";
	/// A document type's schema changed.
	pub const META_INVALIDATED: &str = "meta_invalidated";
	/// A collaborator took or released an edit lock.
	pub const DOC_LOCK: &str = "doc_lock";
	/// Progress of a long-running server job.
	pub const PROGRESS: &str = "progress";
}

/// Payload of a realtime push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushPayload {
	/// A document was written at `revision`.
	DocUpdate {
		/// Document type.
		doctype: String,
		/// Document identifier.
		name: String,
		/// Revision after the write.
		revision: Revision,
		/// Actor that wrote it.
		modified_by: String,
	},
	/// Cached metas of `doctype` are stale.
	MetaInvalidated {
		/// Document type.
		doctype: String,
	},
	/// Edit lock changed hands.
	DocLock {
		/// Document type.
		doctype: String,
		/// Document identifier.
		name: String,
		/// New holder, `None` when released.
		holder: Option<String>,
	},
	/// Server job progress.
	Progress {
		/// Document type.
		doctype: String,
		/// Document identifier.
		name: String,
		/// Completion percentage.
		percent: u8,
		/// Human-readable status.
		message: String,
	},
	/// Application-defined payload.
	Other(serde_json::Value),
}

/// A named push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Push {
	/// Event name the push was published under.
	pub event: String,
	/// Event payload.
	pub payload: PushPayload,
}

impl Push {
	/// A `doc_update` push.
	pub fn doc_update(doctype: impl Into<String>, name: impl Into<String>, revision: Revision, modified_by: impl Into<String>) -> Self {
		Self {
			event: events::DOC_UPDATE.to_string(),
			payload: PushPayload::DocUpdate {
				doctype: doctype.into(),
				name: name.into(),
				revision,
				modified_by: modified_by.into(),
			},
		}
	}

	/// A `meta_invalidated` push.
	pub fn meta_invalidated(doctype: impl Into<String>) -> Self {
		Self {
			event: events::META_INVALIDATED.to_string(),
			payload: PushPayload::MetaInvalidated { doctype: doctype.into() },
		}
	}

	/// A `doc_lock` push.
	pub fn doc_lock(doctype: impl Into<String>, name: impl Into<String>, holder: Option<String>) -> Self {
		Self {
			event: events::DOC_LOCK.to_string(),
			payload: PushPayload::DocLock {
				doctype: doctype.into(),
				name: name.into(),
				holder,
			},
		}
	}

	/// A `progress` push.
	pub fn progress(doctype: impl Into<String>, name: impl Into<String>, percent: u8, message: impl Into<String>) -> Self {
		Self {
			event: events::PROGRESS.to_string(),
			payload: PushPayload::Progress {
				doctype: doctype.into(),
				name: name.into(),
				percent: percent.min(100),
				message: message.into(),
			},
		}
	}

	/// Document the push is about, if any.
	pub fn target(&self) -> Option<(&str, &str)> {
		match &self.payload {
			PushPayload::DocUpdate { doctype, name, .. }
			| PushPayload::DocLock { doctype, name, .. }
			| PushPayload::Progress { doctype, name, .. } => Some((doctype, name)),
			PushPayload::MetaInvalidated { .. } | PushPayload::Other(_) => None,
		}
	}
}

/// Identifies one subscription within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receiving end of a subscription.
///
/// Unsubscribing is idempotent and also happens on drop.
pub struct Subscription {
	id: SubscriptionId,
	event: String,
	rx: mpsc::Receiver<Push>,
	cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("event", &self.event)
			.field("active", &self.cancel.is_some())
			.finish()
	}
}

impl Subscription {
	/// Assembles a subscription from a receiver and its cancellation hook.
	pub fn new(id: SubscriptionId, event: impl Into<String>, rx: mpsc::Receiver<Push>, cancel: impl FnOnce() + Send + 'static) -> Self {
		Self {
			id,
			event: event.into(),
			rx,
			cancel: Some(Box::new(cancel)),
		}
	}

	/// Subscription identifier.
	pub fn id(&self) -> SubscriptionId {
		self.id
	}

	/// Event name subscribed to.
	pub fn event(&self) -> &str {
		&self.event
	}

	/// Whether [`Self::unsubscribe`] has not been called yet.
	pub fn is_active(&self) -> bool {
		self.cancel.is_some()
	}

	/// Waits for the next push. Returns `None` after unsubscribing once
	/// buffered pushes are drained.
	pub async fn recv(&mut self) -> Option<Push> {
		self.rx.recv().await
	}

	/// Returns a buffered push without waiting.
	pub fn try_recv(&mut self) -> Option<Push> {
		self.rx.try_recv().ok()
	}

	/// Stops delivery. Calling it again is a no-op.
	pub fn unsubscribe(&mut self) {
		if let Some(cancel) = self.cancel.take() {
			cancel();
			self.rx.close();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.unsubscribe();
	}
}

/// Source of named realtime pushes.
pub trait RealtimeChannel: Send + Sync {
	/// Subscribes to pushes published under `event`.
	fn subscribe(&self, event: &str) -> Subscription;
}

type Subscribers = HashMap<String, Vec<(SubscriptionId, mpsc::Sender<Push>)>>;

struct HubInner {
	subscribers: Mutex<Subscribers>,
	next_id: AtomicU64,
	capacity: usize,
}

/// In-process fan-out channel.
///
/// Each subscription has a bounded buffer; pushes to a full buffer are
/// dropped with a warning rather than blocking the publisher.
#[derive(Clone)]
pub struct RealtimeHub {
	inner: Arc<HubInner>,
}

impl Default for RealtimeHub {
	fn default() -> Self {
		Self::new(64)
	}
}

impl RealtimeHub {
	/// Creates a hub with per-subscription buffers of `capacity` pushes.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0, "subscription capacity must be > 0");
		Self {
			inner: Arc::new(HubInner {
				subscribers: Mutex::new(HashMap::default()),
				next_id: AtomicU64::new(1),
				capacity,
			}),
		}
	}

	/// Delivers `push` to every subscriber of its event. Returns the number
	/// of subscribers that received it.
	pub fn publish(&self, push: Push) -> usize {
		let mut subscribers = self.inner.subscribers.lock();
		let Some(list) = subscribers.get_mut(&push.event) else {
			return 0;
		};

		let mut delivered = 0;
		list.retain(|(id, tx)| match tx.try_send(push.clone()) {
			Ok(()) => {
				delivered += 1;
				true
			}
			Err(mpsc::error::TrySendError::Full(_)) => {
				warn!(event = %push.event, subscription = id.0, "subscriber buffer full; push dropped");
				true
			}
			Err(mpsc::error::TrySendError::Closed(_)) => false,
		});
		trace!(event = %push.event, delivered, "push published");
		delivered
	}

	/// Number of live subscriptions for `event`.
	pub fn subscriber_count(&self, event: &str) -> usize {
		self.inner.subscribers.lock().get(event).map_or(0, Vec::len)
	}
}

impl RealtimeChannel for RealtimeHub {
	fn subscribe(&self, event: &str) -> Subscription {
		let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
		let (tx, rx) = mpsc::channel(self.inner.capacity);
		self.inner
			.subscribers
			.lock()
			.entry(event.to_string())
			.or_default()
			.push((id, tx));

		let weak = Arc::downgrade(&self.inner);
		let key = event.to_string();
		Subscription::new(id, event, rx, move || {
			let Some(inner) = weak.upgrade() else {
				return;
			};
			let mut subscribers = inner.subscribers.lock();
			if let Some(list) = subscribers.get_mut(&key) {
				list.retain(|(sid, _)| *sid != id);
				if list.is_empty() {
					subscribers.remove(&key);
				}
			}
		})
	}
}
