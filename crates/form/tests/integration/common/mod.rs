//! Fixtures shared by the form integration tests.

use std::sync::Arc;
use std::time::Duration;

use formwork_form::{Form, FormConfig, FormRuntime};
use formwork_gateway::{Capability, MemoryServer, PermissionRule, PermissionSnapshot, RpcGateway};
use formwork_meta::{FieldDescriptor, FieldKind, FieldValues, Meta, MetaSpec, Value};
use parking_lot::Mutex;

pub const ACTOR: &str = "ann";
pub const INVOICE: &str = "Invoice";
pub const ITEM: &str = "Invoice Item";
pub const NOTE: &str = "Note";
pub const SETTINGS: &str = "Settings";

pub const ALL: [Capability; 7] = [
	Capability::Read,
	Capability::Write,
	Capability::Create,
	Capability::Delete,
	Capability::Submit,
	Capability::Cancel,
	Capability::Amend,
];

/// Handler call log.
pub type Log = Arc<Mutex<Vec<String>>>;

pub struct Fixture {
	pub server: Arc<MemoryServer>,
	pub runtime: FormRuntime,
}

pub fn invoice_meta() -> Meta {
	MetaSpec::new(INVOICE)
		.submittable()
		.field(FieldDescriptor::new("customer", FieldKind::Data).required())
		.field(FieldDescriptor::new("amount", FieldKind::Currency))
		.field(FieldDescriptor::new("discount", FieldKind::Currency))
		.field(FieldDescriptor::new("total", FieldKind::Currency).read_only())
		.field(FieldDescriptor::new("notes", FieldKind::Text).no_copy())
		.field(FieldDescriptor::new("items", FieldKind::Table).with_options(ITEM))
		.build()
		.expect("invoice meta")
}

pub fn item_meta() -> Meta {
	MetaSpec::new(ITEM)
		.child()
		.field(FieldDescriptor::new("item", FieldKind::Data).required())
		.field(FieldDescriptor::new("qty", FieldKind::Int).with_default(1))
		.field(FieldDescriptor::new("rate", FieldKind::Currency))
		.build()
		.expect("item meta")
}

pub fn note_meta() -> Meta {
	MetaSpec::new(NOTE)
		.field(FieldDescriptor::new("title", FieldKind::Data).required())
		.field(FieldDescriptor::new("body", FieldKind::Text))
		.field(FieldDescriptor::new("priority", FieldKind::Int))
		.build()
		.expect("note meta")
}

pub fn settings_meta() -> Meta {
	MetaSpec::new(SETTINGS)
		.singleton()
		.field(FieldDescriptor::new("currency", FieldKind::Data).with_default("EUR"))
		.build()
		.expect("settings meta")
}

/// `actor` holds every capability on every test type.
pub fn full_access(actor: &str) -> PermissionSnapshot {
	[INVOICE, NOTE, SETTINGS]
		.into_iter()
		.fold(PermissionSnapshot::new(actor, ["Accounts"]), |snap, doctype| {
			snap.rule(PermissionRule::new(doctype, "Accounts", ALL))
		})
}

pub async fn fixture() -> Fixture {
	fixture_with(full_access(ACTOR), FormConfig::default()).await
}

pub async fn fixture_with(permissions: PermissionSnapshot, config: FormConfig) -> Fixture {
	let _ = tracing_subscriber::fmt::try_init();
	let server = Arc::new(MemoryServer::new());
	for meta in [invoice_meta(), item_meta(), note_meta(), settings_meta()] {
		server.add_meta(meta);
	}
	server.set_permissions(permissions);
	server.normalize(INVOICE, |record| {
		let amount = record.values.get("amount").and_then(Value::as_f64).unwrap_or_default();
		let discount = record.values.get("discount").and_then(Value::as_f64).unwrap_or_default();
		record.values.insert("total".into(), Value::Float(amount - discount));
	});

	let gateway: Arc<dyn RpcGateway> = server.clone();
	let runtime = FormRuntime::builder(gateway, ACTOR)
		.config(config)
		.connect()
		.await
		.expect("runtime connects");
	Fixture { server, runtime }
}

/// A saved draft invoice for `customer` with amount 100.
pub async fn saved_invoice(fx: &Fixture, customer: &str) -> Form {
	let form = fx.runtime.new_form(INVOICE).await.expect("new invoice");
	form.set_field("customer", customer).await.expect("set customer");
	form.set_field("amount", 100).await.expect("set amount");
	form.save().await.expect("save invoice");
	form
}

pub fn values<const N: usize>(pairs: [(&str, Value); N]) -> FieldValues {
	pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub fn push(log: &Log, entry: impl Into<String>) {
	log.lock().push(entry.into());
}

pub fn entries(log: &Log) -> Vec<String> {
	log.lock().clone()
}

/// Yields until the server has a write parked.
pub async fn wait_for_parked_write(server: &MemoryServer) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while server.pending_writes() == 0 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("write parked");
}

/// Yields until the server has a read parked.
pub async fn wait_for_parked_read(server: &MemoryServer) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while server.pending_reads() == 0 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("read parked");
}
