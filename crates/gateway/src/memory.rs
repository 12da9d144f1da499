//! In-process server implementing [`RpcGateway`] and [`RealtimeChannel`].
//!
//! Enforces revision checks, assigns identifiers from a per-type naming
//! series, records owners, runs per-type normalisers on every write and
//! publishes `doc_update` pushes. Writes and reads can be held open with
//! [`MemoryServer::hold_writes`] and [`MemoryServer::hold_reads`], and
//! failures injected one call at a time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use formwork_meta::{Meta, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::capability::PermissionSnapshot;
use crate::error::{GatewayError, Result};
use crate::protocol::{ChildRecord, DocStatus, DocumentRecord, MethodCall, Revision, WriteRequest, WriteResponse};
use crate::realtime::{Push, RealtimeChannel, RealtimeHub, Subscription};
use crate::rpc::RpcGateway;

type Normalizer = Arc<dyn Fn(&mut DocumentRecord) + Send + Sync>;
type MethodFn = Arc<dyn Fn(&MethodCall) -> Result<serde_json::Value> + Send + Sync>;

/// Gateway operation targeted by an injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
	/// [`RpcGateway::fetch_meta`].
	FetchMeta,
	/// [`RpcGateway::read`].
	Read,
	/// [`RpcGateway::write`].
	Write,
	/// [`RpcGateway::delete`].
	Delete,
	/// [`RpcGateway::invoke`].
	Invoke,
}

#[derive(Default)]
struct ServerState {
	metas: HashMap<String, Meta>,
	docs: HashMap<(String, String), DocumentRecord>,
	series: HashMap<String, u64>,
	row_series: u64,
	permissions: HashMap<String, PermissionSnapshot>,
	normalizers: HashMap<String, Normalizer>,
	methods: HashMap<String, MethodFn>,
	faults: HashMap<Op, VecDeque<GatewayError>>,
}

/// In-memory document server.
pub struct MemoryServer {
	state: Mutex<ServerState>,
	hub: RealtimeHub,
	writes_open: watch::Sender<bool>,
	reads_open: watch::Sender<bool>,
	calls: Mutex<HashMap<Op, usize>>,
	pending_writes: AtomicUsize,
	pending_reads: AtomicUsize,
}

impl Default for MemoryServer {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryServer {
	/// Creates an empty server.
	pub fn new() -> Self {
		let (writes_open, _) = watch::channel(true);
		let (reads_open, _) = watch::channel(true);
		Self {
			state: Mutex::new(ServerState::default()),
			hub: RealtimeHub::default(),
			writes_open,
			reads_open,
			calls: Mutex::new(HashMap::default()),
			pending_writes: AtomicUsize::new(0),
			pending_reads: AtomicUsize::new(0),
		}
	}

	/// Registers a document type.
	pub fn add_meta(&self, meta: Meta) {
		self.state.lock().metas.insert(meta.doctype().to_string(), meta);
	}

	/// Replaces a document type's schema and announces it.
	pub fn replace_meta(&self, meta: Meta) {
		let doctype = meta.doctype().to_string();
		self.add_meta(meta);
		self.hub.publish(Push::meta_invalidated(doctype));
	}

	/// Stores `record` as-is, bypassing revision checks.
	pub fn insert(&self, record: DocumentRecord) {
		let key = (record.doctype.clone(), record.name.clone());
		self.state.lock().docs.insert(key, record);
	}

	/// Returns the stored record.
	pub fn record(&self, doctype: &str, name: &str) -> Option<DocumentRecord> {
		self.state.lock().docs.get(&(doctype.to_string(), name.to_string())).cloned()
	}

	/// Sets the permission snapshot returned for `snapshot.actor`.
	pub fn set_permissions(&self, snapshot: PermissionSnapshot) {
		self.state.lock().permissions.insert(snapshot.actor.clone(), snapshot);
	}

	/// Runs `f` on every record of `doctype` before it is stored.
	pub fn normalize(&self, doctype: &str, f: impl Fn(&mut DocumentRecord) + Send + Sync + 'static) {
		self.state.lock().normalizers.insert(doctype.to_string(), Arc::new(f));
	}

	/// Registers a server method under `method`.
	pub fn method(&self, method: &str, f: impl Fn(&MethodCall) -> Result<serde_json::Value> + Send + Sync + 'static) {
		self.state.lock().methods.insert(method.to_string(), Arc::new(f));
	}

	/// Makes the next call of `op` fail with `error`.
	pub fn fail_next(&self, op: Op, error: GatewayError) {
		self.state.lock().faults.entry(op).or_default().push_back(error);
	}

	/// Parks every subsequent write until [`Self::release_writes`].
	pub fn hold_writes(&self) {
		self.writes_open.send_replace(false);
	}

	/// Lets parked and future writes proceed.
	pub fn release_writes(&self) {
		self.writes_open.send_replace(true);
	}

	/// Number of writes currently parked or executing.
	pub fn pending_writes(&self) -> usize {
		self.pending_writes.load(Ordering::SeqCst)
	}

	/// Parks every subsequent document read until [`Self::release_reads`].
	pub fn hold_reads(&self) {
		self.reads_open.send_replace(false);
	}

	/// Lets parked and future reads proceed.
	pub fn release_reads(&self) {
		self.reads_open.send_replace(true);
	}

	/// Number of reads currently parked or executing.
	pub fn pending_reads(&self) -> usize {
		self.pending_reads.load(Ordering::SeqCst)
	}

	/// Number of calls made to `op`.
	pub fn calls(&self, op: Op) -> usize {
		self.calls.lock().get(&op).copied().unwrap_or(0)
	}

	/// Simulates another actor saving the document: bumps the revision,
	/// applies `changes` and publishes `doc_update`.
	pub fn touch(&self, doctype: &str, name: &str, actor: &str, changes: impl IntoIterator<Item = (String, Value)>) -> Result<Revision> {
		let revision = {
			let mut state = self.state.lock();
			let record = state
				.docs
				.get_mut(&(doctype.to_string(), name.to_string()))
				.ok_or_else(|| not_found(doctype, name))?;
			record.values.extend(changes);
			record.revision = record.revision.next();
			record.revision
		};
		self.hub.publish(Push::doc_update(doctype, name, revision, actor));
		Ok(revision)
	}

	/// Publishes an arbitrary push.
	pub fn publish(&self, push: Push) -> usize {
		self.hub.publish(push)
	}

	/// The server's realtime hub.
	pub fn hub(&self) -> &RealtimeHub {
		&self.hub
	}

	fn enter(&self, op: Op) -> Result<()> {
		*self.calls.lock().entry(op).or_default() += 1;
		match self.state.lock().faults.get_mut(&op).and_then(VecDeque::pop_front) {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	async fn wait_open(gate: &watch::Sender<bool>) -> Result<()> {
		let mut rx = gate.subscribe();
		if rx.wait_for(|open| *open).await.is_err() {
			return Err(GatewayError::Remote("server shut down".into()));
		}
		Ok(())
	}

	fn apply_write(&self, request: WriteRequest) -> Result<DocumentRecord> {
		let mut state = self.state.lock();
		let meta = state
			.metas
			.get(&request.doctype)
			.cloned()
			.ok_or_else(|| GatewayError::MetaNotFound(request.doctype.clone()))?;

		let values = meta
			.check_values(&request.values)
			.map_err(|e| GatewayError::Validation(e.to_string()))?;

		let mut record = match &request.name {
			Some(name) => {
				let key = (request.doctype.clone(), name.clone());
				let existing = state.docs.get(&key).ok_or_else(|| not_found(&request.doctype, name))?;
				if request.expected != Some(existing.revision) {
					return Err(GatewayError::Conflict {
						expected: request.expected,
						actual: existing.revision,
					});
				}
				match (existing.status, request.status) {
					(DocStatus::Cancelled, _) => {
						return Err(GatewayError::Validation(format!("{} {name} is cancelled", request.doctype)));
					}
					(DocStatus::Submitted, target) if target != DocStatus::Cancelled => {
						return Err(GatewayError::Validation(format!("{} {name} is submitted", request.doctype)));
					}
					_ => {}
				}
				let mut record = existing.clone();
				record.revision = record.revision.next();
				record
			}
			None => {
				let name = if meta.is_singleton() {
					meta.doctype().to_string()
				} else {
					let counter = state.series.entry(request.doctype.clone()).or_default();
					*counter += 1;
					format!("{}-{:05}", series_prefix(&request.doctype), counter)
				};
				if state.docs.contains_key(&(request.doctype.clone(), name.clone())) {
					return Err(GatewayError::Validation(format!("{} {name} already exists", request.doctype)));
				}
				DocumentRecord {
					doctype: request.doctype.clone(),
					name,
					owner: Some(request.actor.clone()),
					status: DocStatus::initial(meta.is_submittable()),
					revision: Revision(1),
					values: meta.defaults(),
					children: Default::default(),
					amended_from: request.amended_from.clone(),
				}
			}
		};

		record.values.extend(values);
		record.status = request.status;
		for (table, rows) in request.children {
			let rows = rows
				.into_iter()
				.map(|mut row| {
					if row.name.is_none() {
						state.row_series += 1;
						row.name = Some(format!("row-{}", state.row_series));
					}
					row
				})
				.collect::<Vec<ChildRecord>>();
			record.children.insert(table, rows);
		}

		if let Some(normalizer) = state.normalizers.get(&record.doctype).cloned() {
			normalizer(&mut record);
		}

		let missing: Vec<&str> = meta.missing_mandatory(&record.values).collect();
		if !missing.is_empty() {
			return Err(GatewayError::Validation(format!("missing mandatory fields: {}", missing.join(", "))));
		}

		state
			.docs
			.insert((record.doctype.clone(), record.name.clone()), record.clone());
		Ok(record)
	}
}

fn not_found(doctype: &str, name: &str) -> GatewayError {
	GatewayError::NotFound {
		doctype: doctype.to_string(),
		name: name.to_string(),
	}
}

/// `"Sales Invoice"` → `"SI"`, `"Invoice"` → `"INV"`.
fn series_prefix(doctype: &str) -> String {
	let words: Vec<&str> = doctype.split_whitespace().collect();
	if words.len() > 1 {
		words.iter().filter_map(|w| w.chars().next()).collect::<String>().to_uppercase()
	} else {
		doctype.chars().take(3).collect::<String>().to_uppercase()
	}
}

#[async_trait]
impl RpcGateway for MemoryServer {
	async fn fetch_meta(&self, doctype: &str) -> Result<Meta> {
		self.enter(Op::FetchMeta)?;
		self.state
			.lock()
			.metas
			.get(doctype)
			.cloned()
			.ok_or_else(|| GatewayError::MetaNotFound(doctype.to_string()))
	}

	async fn read(&self, doctype: &str, name: &str) -> Result<DocumentRecord> {
		self.pending_reads.fetch_add(1, Ordering::SeqCst);
		let result = async {
			Self::wait_open(&self.reads_open).await?;
			self.enter(Op::Read)?;
			self.record(doctype, name).ok_or_else(|| not_found(doctype, name))
		}
		.await;
		self.pending_reads.fetch_sub(1, Ordering::SeqCst);
		result
	}

	async fn write(&self, request: WriteRequest) -> Result<WriteResponse> {
		self.pending_writes.fetch_add(1, Ordering::SeqCst);
		let result = async {
			Self::wait_open(&self.writes_open).await?;
			self.enter(Op::Write)?;
			let actor = request.actor.clone();
			let record = self.apply_write(request)?;
			debug!(doctype = %record.doctype, name = %record.name, revision = %record.revision, "write applied");
			self.hub.publish(Push::doc_update(&record.doctype, &record.name, record.revision, actor));
			Ok(WriteResponse { record })
		}
		.await;
		self.pending_writes.fetch_sub(1, Ordering::SeqCst);
		result
	}

	async fn delete(&self, doctype: &str, name: &str, expected: Revision) -> Result<()> {
		self.enter(Op::Delete)?;
		let mut state = self.state.lock();
		let key = (doctype.to_string(), name.to_string());
		let existing = state.docs.get(&key).ok_or_else(|| not_found(doctype, name))?;
		if existing.revision != expected {
			return Err(GatewayError::Conflict {
				expected: Some(expected),
				actual: existing.revision,
			});
		}
		if existing.status == DocStatus::Submitted {
			return Err(GatewayError::Validation(format!("{doctype} {name} is submitted")));
		}
		state.docs.remove(&key);
		Ok(())
	}

	async fn invoke(&self, call: MethodCall) -> Result<serde_json::Value> {
		self.enter(Op::Invoke)?;
		let method = self.state.lock().methods.get(&call.method).cloned();
		match method {
			Some(f) => f(&call),
			None => Err(GatewayError::Remote(format!("unknown method {}", call.method))),
		}
	}

	async fn fetch_permissions(&self, actor: &str) -> Result<PermissionSnapshot> {
		Ok(self
			.state
			.lock()
			.permissions
			.get(actor)
			.cloned()
			.unwrap_or_else(|| PermissionSnapshot::new(actor, Vec::<String>::new())))
	}
}

impl RealtimeChannel for MemoryServer {
	fn subscribe(&self, event: &str) -> Subscription {
		self.hub.subscribe(event)
	}
}
