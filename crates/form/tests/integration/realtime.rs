use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use formwork_form::{FormConfig, FormError, HandlerAction, HandlerContext, Lifecycle, PushOutcome, events};
use formwork_gateway::{Push, PushPayload, Revision};
use formwork_meta::{FieldDescriptor, FieldKind, MetaSpec, Value};
use pretty_assertions::assert_eq;

use crate::common::{
	ACTOR, INVOICE, Log, NOTE, entries, fixture, fixture_with, full_access, push, saved_invoice,
	wait_for_parked_read, wait_for_parked_write,
};

const WAIT: Duration = Duration::from_secs(5);

fn amount(value: f64) -> [(String, Value); 1] {
	[("amount".to_string(), Value::Float(value))]
}

#[tokio::test]
async fn clean_form_reloads_on_a_newer_revision() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();
	let mut link = form.attach(&*fx.server);

	fx.server.touch(INVOICE, &name, "bob", amount(9.0)).unwrap();
	tokio::time::timeout(WAIT, link.wait_applied(1)).await.unwrap();

	assert_eq!(form.get_field("amount").unwrap(), Value::Float(9.0));
	assert_eq!(form.revision(), Some(Revision(2)));
	assert_eq!(form.lifecycle(), Lifecycle::Clean);
	assert_eq!(form.pending_conflict(), None);
	link.detach().await;
}

#[tokio::test]
async fn dirty_form_records_the_conflict_instead() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();
	form.set_field("amount", 42).await.unwrap();
	let mut link = form.attach(&*fx.server);

	let revision = fx.server.touch(INVOICE, &name, "bob", amount(9.0)).unwrap();
	tokio::time::timeout(WAIT, link.wait_applied(1)).await.unwrap();

	assert_eq!(form.pending_conflict(), Some(revision));
	assert_eq!(form.get_field("amount").unwrap(), Value::Float(42.0));
	assert!(matches!(form.save().await, Err(FormError::ConflictDetected { .. })));

	form.reload().await.unwrap();
	assert_eq!(form.pending_conflict(), None);
	assert_eq!(form.get_field("amount").unwrap(), Value::Float(9.0));
}

#[tokio::test]
async fn pushes_are_matched_to_the_form() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();

	let own_echo = Push::doc_update(INVOICE, &name, Revision(1), ACTOR);
	assert_eq!(form.apply_push(&own_echo).await, Ok(PushOutcome::Ignored));
	let other_doc = Push::doc_update(INVOICE, "INV-00999", Revision(7), "bob");
	assert_eq!(form.apply_push(&other_doc).await, Ok(PushOutcome::Ignored));
	let other_type = Push::doc_update(NOTE, &name, Revision(7), "bob");
	assert_eq!(form.apply_push(&other_type).await, Ok(PushOutcome::Ignored));
	assert_eq!(form.revision(), Some(Revision(1)));
}

#[tokio::test]
async fn refresh_on_push_can_be_disabled() {
	let config = FormConfig {
		refresh_on_push: false,
		..FormConfig::default()
	};
	let fx = fixture_with(full_access(ACTOR), config).await;
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();

	let revision = fx.server.touch(INVOICE, &name, "bob", amount(3.0)).unwrap();
	let outcome = form
		.apply_push(&Push::doc_update(INVOICE, &name, revision, "bob"))
		.await
		.unwrap();

	assert_eq!(outcome, PushOutcome::ConflictRecorded(revision));
	assert_eq!(form.get_field("amount").unwrap(), Value::Float(100.0));
	assert_eq!(form.lifecycle(), Lifecycle::Clean);
}

#[tokio::test]
async fn push_during_a_save_is_recorded() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();
	form.set_field("amount", 7).await.unwrap();

	fx.server.hold_writes();
	let saving = tokio::spawn({
		let form = form.clone();
		async move { form.save().await }
	});
	wait_for_parked_write(&fx.server).await;

	let revision = fx.server.touch(INVOICE, &name, "bob", amount(1.0)).unwrap();
	let outcome = form
		.apply_push(&Push::doc_update(INVOICE, &name, revision, "bob"))
		.await
		.unwrap();
	assert_eq!(outcome, PushOutcome::ConflictRecorded(revision));

	fx.server.release_writes();
	assert!(matches!(saving.await.unwrap(), Err(FormError::ConflictDetected { .. })));
	assert_eq!(form.pending_conflict(), Some(revision));
	assert_eq!(form.lifecycle(), Lifecycle::Dirty);
	assert_eq!(form.get_field("amount").unwrap(), Value::Float(7.0));
}

#[tokio::test]
async fn edits_made_during_a_push_refresh_are_kept() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();
	let revision = fx.server.touch(INVOICE, &name, "bob", amount(9.0)).unwrap();

	fx.server.hold_reads();
	let applying = tokio::spawn({
		let form = form.clone();
		let update = Push::doc_update(INVOICE, &name, revision, "bob");
		async move { form.apply_push(&update).await }
	});
	wait_for_parked_read(&fx.server).await;
	form.set_field("discount", 5).await.unwrap();
	assert_eq!(form.lifecycle(), Lifecycle::Dirty);

	fx.server.release_reads();
	assert_eq!(applying.await.unwrap(), Ok(PushOutcome::ConflictRecorded(revision)));
	assert_eq!(form.lifecycle(), Lifecycle::Dirty);
	assert!(form.is_dirty());
	assert_eq!(form.get_field("discount").unwrap(), Value::Float(5.0));
	assert_eq!(form.get_field("amount").unwrap(), Value::Float(100.0));
	assert_eq!(form.pending_conflict(), Some(revision));
	assert!(!form.is_busy());
}

#[tokio::test]
async fn lock_and_progress_pushes_reach_handlers() {
	let fx = fixture().await;
	let log = Log::default();
	for event in [events::REALTIME_LOCK, events::REALTIME_PROGRESS] {
		let log = log.clone();
		fx.runtime.on(INVOICE, event, move |ctx: &HandlerContext| {
			let entry = match ctx.push().map(|p| &p.payload) {
				Some(PushPayload::DocLock { holder, .. }) => format!("lock:{}", holder.as_deref().unwrap_or("-")),
				Some(PushPayload::Progress { percent, .. }) => format!("progress:{percent}"),
				other => format!("unexpected:{other:?}"),
			};
			push(&log, entry);
		});
	}
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();
	let mut link = form.attach(&*fx.server);

	fx.server.publish(Push::doc_lock(INVOICE, &name, Some("bob".into())));
	tokio::time::timeout(WAIT, link.wait_applied(1)).await.unwrap();
	fx.server.publish(Push::progress(INVOICE, &name, 40, "posting ledger"));
	tokio::time::timeout(WAIT, link.wait_applied(2)).await.unwrap();

	assert_eq!(form.lock_holder().as_deref(), Some("bob"));
	assert_eq!(entries(&log), ["lock:bob", "progress:40"]);

	assert_eq!(
		form.apply_push(&Push::doc_lock(INVOICE, &name, None)).await,
		Ok(PushOutcome::LockUpdated)
	);
	assert_eq!(form.lock_holder(), None);
}

#[tokio::test]
async fn meta_invalidation_drops_the_cached_schema() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	assert!(fx.runtime.metas().cached(INVOICE).is_some());
	let mut link = form.attach(&*fx.server);

	let widened = MetaSpec::from(crate::common::invoice_meta())
		.field(FieldDescriptor::new("reference", FieldKind::Data))
		.build()
		.unwrap();
	fx.server.replace_meta(widened);
	tokio::time::timeout(WAIT, link.wait_applied(1)).await.unwrap();

	assert!(fx.runtime.metas().cached(INVOICE).is_none());
	assert!(!form.meta().has_field("reference"), "open forms keep their schema");
	let next = fx.runtime.new_form(INVOICE).await.unwrap();
	assert!(next.meta().has_field("reference"));
}

#[tokio::test]
async fn dropped_link_stops_delivery() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();
	let link = form.attach(&*fx.server);
	assert!(link.inbox().is_empty());
	link.detach().await;

	fx.server.touch(INVOICE, &name, "bob", amount(2.0)).unwrap();
	tokio::task::yield_now().await;
	assert_eq!(form.revision(), Some(Revision(1)));
}

#[tokio::test]
async fn detach_survives_a_panicking_handler() {
	let fx = fixture().await;
	let reached = Arc::new(AtomicBool::new(false));
	fx.runtime.on(INVOICE, events::REALTIME_PROGRESS, {
		let reached = reached.clone();
		move |_: &HandlerContext| -> HandlerAction<FormError> {
			reached.store(true, Ordering::SeqCst);
			panic!("progress handler blew up");
		}
	});
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();
	let link = form.attach(&*fx.server);

	fx.server.publish(Push::progress(INVOICE, &name, 10, "posting"));
	tokio::time::timeout(WAIT, async {
		while !reached.load(Ordering::SeqCst) {
			tokio::task::yield_now().await;
		}
	})
	.await
	.unwrap();

	tokio::time::timeout(WAIT, link.detach()).await.unwrap();
	assert_eq!(form.lifecycle(), Lifecycle::Clean);
	assert!(!form.is_busy());
}
