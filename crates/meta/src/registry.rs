//! Process-wide meta cache with coalesced fetching.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;
use tokio::sync::{Mutex, watch};
use tracing::{debug, trace};

use crate::error::MetaError;
use crate::meta::Meta;

/// Where metas come from on a cache miss.
#[async_trait]
pub trait MetaSource: Send + Sync {
	/// Fetches the meta for `doctype`, failing with [`MetaError::NotFound`]
	/// when the type does not exist.
	async fn fetch_meta(&self, doctype: &str) -> Result<Meta, MetaError>;
}

type FetchResult = Result<Arc<Meta>, MetaError>;

struct InFlightFetch {
	rx: watch::Receiver<Option<FetchResult>>,
}

enum Role {
	Leader(watch::Sender<Option<FetchResult>>),
	Waiter(watch::Receiver<Option<FetchResult>>),
}

#[derive(Default)]
struct CacheState {
	entries: HashMap<String, Arc<Meta>>,
	/// Bumped per type on invalidation so an in-flight fetch started before
	/// the invalidation does not repopulate the cache.
	epochs: HashMap<String, u64>,
}

/// Caches one [`Meta`] per document type for the life of the process.
///
/// # Singleflight
///
/// 1. Fast path: return the cached entry
/// 2. Leader election: the first caller for an uncached type becomes the
///    leader and registers an in-flight entry; later callers wait on it
/// 3. The leader fetches, caches (unless invalidated meanwhile), publishes the
///    result on the `watch` channel and removes the in-flight entry
pub struct MetaRegistry {
	source: Arc<dyn MetaSource>,
	state: RwLock<CacheState>,
	inflight: Mutex<HashMap<String, Arc<InFlightFetch>>>,
}

impl MetaRegistry {
	/// Creates an empty registry backed by `source`.
	pub fn new(source: Arc<dyn MetaSource>) -> Self {
		Self {
			source,
			state: RwLock::new(CacheState::default()),
			inflight: Mutex::new(HashMap::default()),
		}
	}

	/// Returns the cached meta without fetching.
	pub fn cached(&self, doctype: &str) -> Option<Arc<Meta>> {
		self.state.read().entries.get(doctype).cloned()
	}

	/// Returns the meta for `doctype`, fetching it at most once concurrently.
	pub async fn get(&self, doctype: &str) -> Result<Arc<Meta>, MetaError> {
		if let Some(meta) = self.cached(doctype) {
			return Ok(meta);
		}

		let role = {
			let mut inflight = self.inflight.lock().await;
			match inflight.get(doctype) {
				Some(f) => Role::Waiter(f.rx.clone()),
				None => {
					let (tx, rx) = watch::channel(None);
					inflight.insert(doctype.to_string(), Arc::new(InFlightFetch { rx }));
					Role::Leader(tx)
				}
			}
		};

		let tx = match role {
			Role::Leader(tx) => tx,
			Role::Waiter(mut rx) => {
				trace!(doctype, "waiting on in-flight meta fetch");
				loop {
					let result = {
						let borrow = rx.borrow();
						borrow.as_ref().cloned()
					};
					if let Some(res) = result {
						return res;
					}
					if rx.changed().await.is_err() {
						return Err(MetaError::Fetch {
							doctype: doctype.to_string(),
							cause: "fetch abandoned".into(),
						});
					}
				}
			}
		};
		let mut guard = LeaderGuard {
			registry: self,
			doctype,
			tx: Some(tx),
		};

		// Another leader may have finished between the fast path and election.
		if let Some(meta) = self.cached(doctype) {
			return guard.complete(Ok(meta)).await;
		}

		let epoch = self.epoch(doctype);
		debug!(doctype, "fetching meta");
		let result = self.source.fetch_meta(doctype).await.map(Arc::new);

		if let Ok(meta) = &result {
			let mut state = self.state.write();
			if state.epochs.get(doctype).copied().unwrap_or(0) == epoch {
				state.entries.insert(doctype.to_string(), Arc::clone(meta));
			} else {
				debug!(doctype, "meta invalidated during fetch; not caching");
			}
		}

		guard.complete(result).await
	}

	/// Drops the cached entry for `doctype`.
	pub fn invalidate(&self, doctype: &str) {
		let mut state = self.state.write();
		state.entries.remove(doctype);
		*state.epochs.entry(doctype.to_string()).or_default() += 1;
		debug!(doctype, "meta invalidated");
	}

	/// Drops every cached entry.
	pub fn clear(&self) {
		let mut state = self.state.write();
		let doctypes: Vec<String> = state.entries.drain().map(|(k, _)| k).collect();
		for doctype in doctypes {
			*state.epochs.entry(doctype).or_default() += 1;
		}
	}

	/// Number of cached metas.
	pub fn len(&self) -> usize {
		self.state.read().entries.len()
	}

	/// Whether nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn epoch(&self, doctype: &str) -> u64 {
		self.state.read().epochs.get(doctype).copied().unwrap_or(0)
	}
}

/// Publishes the leader's result and clears the in-flight entry, also when
/// the leader future is dropped mid-fetch.
struct LeaderGuard<'a> {
	registry: &'a MetaRegistry,
	doctype: &'a str,
	tx: Option<watch::Sender<Option<FetchResult>>>,
}

impl LeaderGuard<'_> {
	async fn complete(&mut self, result: FetchResult) -> FetchResult {
		self.registry.inflight.lock().await.remove(self.doctype);
		if let Some(tx) = self.tx.take() {
			let _ = tx.send(Some(result.clone()));
		}
		result
	}
}

impl Drop for LeaderGuard<'_> {
	fn drop(&mut self) {
		if self.tx.is_none() {
			return;
		}
		// Abandoned leader: dropping the sender wakes waiters with an error.
		if let Ok(mut inflight) = self.registry.inflight.try_lock() {
			inflight.remove(self.doctype);
		}
	}
}
