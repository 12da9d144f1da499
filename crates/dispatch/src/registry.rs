//! Copy-on-write handler registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap as HashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::action::{Handler, HandlerAction};

/// Document type whose handlers run for every type.
pub const WILDCARD: &str = "*";

/// Handle returned by [`HandlerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Resolved handlers for one dispatch, in invocation order.
pub type Handlers<C, E> = SmallVec<[Handler<C, E>; 4]>;

struct Entry<C, E> {
	id: HandlerId,
	handler: Handler<C, E>,
}

impl<C, E> Clone for Entry<C, E> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			handler: self.handler.clone(),
		}
	}
}

/// doctype → event → handlers in registration order.
struct Snapshot<C, E> {
	by_type: HashMap<Box<str>, HashMap<Box<str>, Vec<Entry<C, E>>>>,
	len: usize,
}

impl<C, E> Clone for Snapshot<C, E> {
	fn clone(&self) -> Self {
		Self {
			by_type: self.by_type.clone(),
			len: self.len,
		}
	}
}

impl<C, E> Default for Snapshot<C, E> {
	fn default() -> Self {
		Self {
			by_type: HashMap::default(),
			len: 0,
		}
	}
}

impl<C, E> Snapshot<C, E> {
	fn entries(&self, doctype: &str, event: &str) -> &[Entry<C, E>] {
		self.by_type
			.get(doctype)
			.and_then(|events| events.get(event))
			.map_or(&[], Vec::as_slice)
	}
}

/// Handlers keyed by `(document type, event)`.
///
/// Reads load the current snapshot without locking. Writes clone the
/// snapshot, modify the copy and publish it with compare-and-swap, retrying
/// if another writer won the race.
pub struct HandlerRegistry<C, E> {
	snap: ArcSwap<Snapshot<C, E>>,
	next_id: AtomicU64,
}

impl<C, E> Default for HandlerRegistry<C, E> {
	fn default() -> Self {
		Self::new()
	}
}

impl<C, E> HandlerRegistry<C, E> {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self {
			snap: ArcSwap::from_pointee(Snapshot::default()),
			next_id: AtomicU64::new(1),
		}
	}

	/// Appends `handler` for `(doctype, event)`. Earlier registrations for
	/// the same key keep running first.
	///
	/// Use [`WILDCARD`] as `doctype` to match every type.
	pub fn register<F, A>(&self, doctype: &str, event: &str, handler: F) -> HandlerId
	where
		F: Fn(&C) -> A + Send + Sync + 'static,
		A: Into<HandlerAction<E>>,
	{
		let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let handler: Handler<C, E> = Arc::new(move |ctx: &C| handler(ctx).into());
		self.update(|snap| {
			snap.by_type
				.entry(Box::from(doctype))
				.or_default()
				.entry(Box::from(event))
				.or_default()
				.push(Entry {
					id,
					handler: handler.clone(),
				});
			snap.len += 1;
			true
		});
		trace!(doctype, event, id = id.0, "handler registered");
		id
	}

	/// Removes a registration. Returns `false` if `id` is unknown.
	pub fn unregister(&self, id: HandlerId) -> bool {
		let removed = self.update(|snap| {
			for events in snap.by_type.values_mut() {
				for entries in events.values_mut() {
					if let Some(pos) = entries.iter().position(|e| e.id == id) {
						entries.remove(pos);
						snap.len -= 1;
						return true;
					}
				}
			}
			false
		});
		if removed {
			trace!(id = id.0, "handler unregistered");
		}
		removed
	}

	/// Handlers for `(doctype, event)`, wildcard-type handlers first.
	pub fn resolve(&self, doctype: &str, event: &str) -> Handlers<C, E> {
		let snap = self.snap.load();
		let wildcard = if doctype == WILDCARD { &[][..] } else { snap.entries(WILDCARD, event) };
		wildcard
			.iter()
			.chain(snap.entries(doctype, event))
			.map(|e| e.handler.clone())
			.collect()
	}

	/// Handlers registered for exactly `(doctype, event)`.
	pub fn resolve_exact(&self, doctype: &str, event: &str) -> Handlers<C, E> {
		self.snap
			.load()
			.entries(doctype, event)
			.iter()
			.map(|e| e.handler.clone())
			.collect()
	}

	/// Whether any handler is registered for `(doctype, event)` or its
	/// wildcard counterpart.
	pub fn has_handlers(&self, doctype: &str, event: &str) -> bool {
		let snap = self.snap.load();
		!snap.entries(doctype, event).is_empty() || !snap.entries(WILDCARD, event).is_empty()
	}

	/// Total number of registrations.
	pub fn len(&self) -> usize {
		self.snap.load().len
	}

	/// Whether nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn update(&self, mut f: impl FnMut(&mut Snapshot<C, E>) -> bool) -> bool {
		loop {
			let cur = self.snap.load_full();
			let mut next = (*cur).clone();
			if !f(&mut next) {
				return false;
			}
			let prev = self.snap.compare_and_swap(&cur, Arc::new(next));
			if Arc::ptr_eq(&prev, &cur) {
				return true;
			}
		}
	}
}
