use formwork_form::{FieldProperties, FieldProperty, FormConfig, FormError, Lifecycle};
use formwork_gateway::{DocStatus, GatewayError, Op, Revision};
use formwork_meta::{FieldError, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::common::{ACTOR, INVOICE, NOTE, SETTINGS, fixture, fixture_with, full_access, saved_invoice, wait_for_parked_write};

#[tokio::test]
async fn new_form_is_unsaved_and_dirty() {
	let fx = fixture().await;
	let form = fx.runtime.new_form(INVOICE).await.unwrap();

	assert_eq!(form.lifecycle(), Lifecycle::New);
	assert!(form.is_dirty());
	assert_eq!(form.name(), None);
	assert_eq!(form.status(), DocStatus::Draft);
	assert_eq!(form.get_field("customer").unwrap(), Value::Null);
}

#[tokio::test]
async fn save_assigns_name_and_cleans_the_form() {
	let fx = fixture().await;
	let form = fx.runtime.new_form(INVOICE).await.unwrap();
	form.set_field("customer", "ACME").await.unwrap();
	form.set_field("amount", 120).await.unwrap();
	form.set_field("discount", 20).await.unwrap();
	assert_eq!(form.lifecycle(), Lifecycle::New);

	form.save().await.unwrap();

	assert_eq!(form.name().as_deref(), Some("INV-00001"));
	assert_eq!(form.lifecycle(), Lifecycle::Clean);
	assert!(!form.is_dirty());
	assert!(form.modified_fields().is_empty());
	assert_eq!(form.revision(), Some(Revision(1)));
	assert_eq!(form.owner().as_deref(), Some(ACTOR));
	assert_eq!(form.get_field("amount").unwrap(), Value::Float(120.0));
	assert_eq!(form.get_field("total").unwrap(), Value::Float(100.0), "server-computed value merged");
}

#[tokio::test]
async fn schema_violation_leaves_document_untouched() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	let before = form.document();

	let err = form.set_field("amount", "lots").await.unwrap_err();
	assert!(matches!(err, FormError::SchemaViolation(FieldError::WrongKind { .. })), "{err:?}");
	assert_eq!(
		form.set_field("colour", "red").await,
		Err(FormError::SchemaViolation(FieldError::Unknown("colour".into())))
	);
	assert_eq!(
		form.set_field("total", 5).await,
		Err(FormError::SchemaViolation(FieldError::ReadOnly("total".into())))
	);

	assert_eq!(form.document(), before);
	assert_eq!(form.lifecycle(), Lifecycle::Clean);
	assert!(form.modified_fields().is_empty());
}

#[tokio::test]
async fn field_property_overrides_apply_per_form() {
	let fx = fixture().await;
	let form = fx.runtime.new_form(INVOICE).await.unwrap();
	let other = fx.runtime.new_form(INVOICE).await.unwrap();

	form.set_field_property("customer", FieldProperty::ReadOnly(true)).unwrap();
	form.set_field_property("discount", FieldProperty::Mandatory(true)).unwrap();
	form.set_field_property("notes", FieldProperty::Hidden(true)).unwrap();

	assert_eq!(
		form.field_properties("customer").unwrap(),
		FieldProperties {
			read_only: true,
			mandatory: true,
			hidden: false,
		}
	);
	assert!(form.field_properties("notes").unwrap().hidden);
	assert!(matches!(
		form.set_field("customer", "ACME").await,
		Err(FormError::SchemaViolation(FieldError::ReadOnly(_)))
	));
	other.set_field("customer", "ACME").await.unwrap();

	form.set_field_property("customer", FieldProperty::ReadOnly(false)).unwrap();
	form.set_field("customer", "ACME").await.unwrap();
	assert_eq!(
		form.save().await,
		Err(FormError::ValidationFailed("missing mandatory fields: discount".into()))
	);
}

#[tokio::test]
async fn missing_mandatory_field_fails_before_the_network() {
	let fx = fixture().await;
	let form = fx.runtime.new_form(INVOICE).await.unwrap();
	form.set_field("amount", 10).await.unwrap();

	assert_eq!(
		form.save().await,
		Err(FormError::ValidationFailed("missing mandatory fields: customer".into()))
	);
	assert_eq!(fx.server.calls(Op::Write), 0);
	assert_eq!(form.lifecycle(), Lifecycle::New);
	assert!(!form.is_busy());
}

#[tokio::test]
async fn saving_a_clean_form_does_not_write() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	assert_eq!(fx.server.calls(Op::Write), 1);

	form.save().await.unwrap();
	assert_eq!(fx.server.calls(Op::Write), 1);
}

#[tokio::test]
async fn concurrent_operations_are_rejected() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	form.set_field("amount", 10).await.unwrap();
	assert_eq!(form.lifecycle(), Lifecycle::Dirty);

	fx.server.hold_writes();
	let saving = tokio::spawn({
		let form = form.clone();
		async move { form.save().await }
	});
	wait_for_parked_write(&fx.server).await;

	assert!(form.is_busy());
	assert_eq!(form.lifecycle(), Lifecycle::Saving);
	assert_eq!(form.save().await, Err(FormError::OperationInProgress));
	assert_eq!(form.reload().await, Err(FormError::OperationInProgress));

	fx.server.release_writes();
	saving.await.unwrap().unwrap();
	assert_eq!(form.lifecycle(), Lifecycle::Clean);
	assert!(!form.is_busy());
	assert_eq!(form.revision(), Some(Revision(2)));
}

#[tokio::test]
async fn edits_made_during_a_save_survive_it() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();
	form.set_field("amount", 200).await.unwrap();

	fx.server.hold_writes();
	let saving = tokio::spawn({
		let form = form.clone();
		async move { form.save().await }
	});
	wait_for_parked_write(&fx.server).await;
	form.set_field("discount", 5).await.unwrap();
	fx.server.release_writes();
	saving.await.unwrap().unwrap();

	assert_eq!(form.get_field("amount").unwrap(), Value::Float(200.0));
	assert_eq!(form.get_field("discount").unwrap(), Value::Float(5.0));
	assert_eq!(form.modified_fields(), vec!["discount".to_string()]);
	assert_eq!(form.lifecycle(), Lifecycle::Dirty);

	let stored = fx.server.record(INVOICE, &name).unwrap();
	assert_eq!(stored.values.get("amount"), Some(&Value::Float(200.0)));
	assert_eq!(stored.values.get("discount"), None);
}

#[tokio::test]
async fn discarding_during_a_save_is_final() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	form.set_field("amount", 300).await.unwrap();

	fx.server.hold_writes();
	let saving = tokio::spawn({
		let form = form.clone();
		async move { form.save().await }
	});
	wait_for_parked_write(&fx.server).await;
	form.discard();
	assert_eq!(form.lifecycle(), Lifecycle::Discarded);

	fx.server.release_writes();
	saving.await.unwrap().unwrap();
	assert_eq!(form.lifecycle(), Lifecycle::Discarded);
	assert!(!form.is_busy());
	assert!(matches!(form.set_field("amount", 1).await, Err(FormError::InvalidTransition(_))));
}

#[tokio::test]
async fn stale_revision_is_a_conflict_and_keeps_local_values() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();
	fx.server
		.touch(INVOICE, &name, "bob", [("amount".to_string(), Value::Float(1.0))])
		.unwrap();

	form.set_field("amount", 50).await.unwrap();
	assert_eq!(
		form.save().await,
		Err(FormError::ConflictDetected {
			expected: Some(Revision(1)),
			actual: Revision(2),
		})
	);
	assert_eq!(form.get_field("amount").unwrap(), Value::Float(50.0));
	assert_eq!(form.lifecycle(), Lifecycle::Dirty);
	assert!(!form.is_busy());

	form.reload().await.unwrap();
	assert_eq!(form.get_field("amount").unwrap(), Value::Float(1.0));
	assert_eq!(form.lifecycle(), Lifecycle::Clean);
	assert!(form.modified_fields().is_empty());
}

#[tokio::test]
async fn remote_failure_restores_the_prior_lifecycle() {
	let fx = fixture().await;
	let form = fx.runtime.new_form(NOTE).await.unwrap();
	form.set_field("title", "groceries").await.unwrap();
	fx.server.fail_next(Op::Write, GatewayError::Remote("disk full".into()));

	assert_eq!(form.save().await, Err(FormError::RemoteError("disk full".into())));
	assert_eq!(form.lifecycle(), Lifecycle::New);
	assert_eq!(form.get_field("title").unwrap(), Value::from("groceries"));

	form.save().await.unwrap();
	assert_eq!(form.name().as_deref(), Some("NOT-00001"));
}

#[tokio::test]
async fn slow_gateway_times_out() {
	let config = FormConfig {
		rpc_timeout_ms: Some(20),
		..FormConfig::default()
	};
	let fx = fixture_with(full_access(ACTOR), config).await;
	let form = fx.runtime.new_form(NOTE).await.unwrap();
	form.set_field("title", "slow").await.unwrap();

	fx.server.hold_writes();
	assert_eq!(form.save().await, Err(FormError::RemoteError("request timed out".into())));
	assert_eq!(form.lifecycle(), Lifecycle::New);
	assert!(!form.is_busy());
}

#[tokio::test]
async fn submit_then_cancel() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;

	form.submit().await.unwrap();
	assert_eq!(form.status(), DocStatus::Submitted);
	assert_eq!(form.lifecycle(), Lifecycle::Clean);
	assert!(matches!(form.set_field("amount", 1).await, Err(FormError::InvalidTransition(_))));
	assert!(matches!(form.submit().await, Err(FormError::InvalidTransition(_))));
	assert!(matches!(form.delete().await, Err(FormError::InvalidTransition(_))));

	form.cancel().await.unwrap();
	assert_eq!(form.status(), DocStatus::Cancelled);
	assert!(matches!(form.submit().await, Err(FormError::InvalidTransition(_))));
	assert!(matches!(form.cancel().await, Err(FormError::InvalidTransition(_))));

	let stored = fx.server.record(INVOICE, &form.name().unwrap()).unwrap();
	assert_eq!(stored.status, DocStatus::Cancelled);
	assert_eq!(stored.revision, Revision(3));
}

#[tokio::test]
async fn status_changes_need_a_saved_submittable_document() {
	let fx = fixture().await;
	let unsaved = fx.runtime.new_form(INVOICE).await.unwrap();
	assert!(matches!(unsaved.submit().await, Err(FormError::InvalidTransition(_))));

	let note = fx.runtime.new_form(NOTE).await.unwrap();
	note.set_field("title", "x").await.unwrap();
	note.save().await.unwrap();
	assert_eq!(note.submit().await, Err(FormError::NotSubmittable(NOTE.into())));
	assert_eq!(note.status(), DocStatus::NotSubmittable);
}

#[tokio::test]
async fn amend_copies_a_cancelled_document() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	form.set_field("notes", "call first").await.unwrap();
	form.save().await.unwrap();
	assert!(matches!(form.amend().await, Err(FormError::InvalidTransition(_))));
	form.submit().await.unwrap();
	form.cancel().await.unwrap();

	let amended = form.amend().await.unwrap();
	assert_eq!(amended.lifecycle(), Lifecycle::New);
	assert_eq!(amended.status(), DocStatus::Draft);
	assert_eq!(amended.amended_from(), form.name());
	assert_eq!(amended.get_field("customer").unwrap(), Value::from("ACME"));
	assert_eq!(amended.get_field("notes").unwrap(), Value::Null);

	amended.save().await.unwrap();
	let name = amended.name().unwrap();
	assert_eq!(name, "INV-00002");
	assert_eq!(fx.server.record(INVOICE, &name).unwrap().amended_from, form.name());
	assert_eq!(form.status(), DocStatus::Cancelled);
}

#[tokio::test]
async fn delete_discards_the_form() {
	let fx = fixture().await;
	let note = fx.runtime.new_form(NOTE).await.unwrap();
	note.set_field("title", "temp").await.unwrap();
	note.save().await.unwrap();
	let name = note.name().unwrap();

	note.delete().await.unwrap();
	assert_eq!(note.lifecycle(), Lifecycle::Discarded);
	assert_eq!(fx.server.record(NOTE, &name), None);
	assert!(matches!(note.set_field("title", "again").await, Err(FormError::InvalidTransition(_))));
	assert!(matches!(note.save().await, Err(FormError::InvalidTransition(_))));

	let unsaved = fx.runtime.new_form(NOTE).await.unwrap();
	unsaved.delete().await.unwrap();
	assert_eq!(unsaved.lifecycle(), Lifecycle::Discarded);
	assert_eq!(fx.server.calls(Op::Delete), 1);
}

#[tokio::test]
async fn reload_drops_local_edits() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	form.set_field("customer", "Globex").await.unwrap();

	form.reload().await.unwrap();
	assert_eq!(form.get_field("customer").unwrap(), Value::from("ACME"));
	assert_eq!(form.lifecycle(), Lifecycle::Clean);
}

#[tokio::test]
async fn singleton_opens_by_type() {
	let fx = fixture().await;
	let settings = fx.runtime.open_single(SETTINGS).await.unwrap();
	assert_eq!(settings.lifecycle(), Lifecycle::New);
	assert_eq!(settings.get_field("currency").unwrap(), Value::from("EUR"));
	settings.set_field("currency", "USD").await.unwrap();
	settings.save().await.unwrap();
	assert_eq!(settings.name().as_deref(), Some(SETTINGS));

	let again = fx.runtime.open_single(SETTINGS).await.unwrap();
	assert_eq!(again.lifecycle(), Lifecycle::Clean);
	assert_eq!(again.get_field("currency").unwrap(), Value::from("USD"));

	assert!(matches!(fx.runtime.new_form(SETTINGS).await, Err(FormError::InvalidTransition(_))));
	assert!(matches!(fx.runtime.open_single(INVOICE).await, Err(FormError::InvalidTransition(_))));
}

#[tokio::test]
async fn unknown_types_and_documents() {
	let fx = fixture().await;
	assert_eq!(
		fx.runtime.new_form("Spaceship").await.unwrap_err(),
		FormError::MetaNotFound("Spaceship".into())
	);
	assert_eq!(
		fx.runtime.load(INVOICE, "INV-09999").await.unwrap_err(),
		FormError::NotFound {
			doctype: INVOICE.into(),
			name: "INV-09999".into(),
		}
	);
}

#[tokio::test]
async fn server_methods_are_scoped_to_the_document() {
	let fx = fixture().await;
	fx.server.method("outstanding", |call| {
		Ok(serde_json::json!({ "name": call.name, "days": call.args["days"] }))
	});
	let form = saved_invoice(&fx, "ACME").await;

	let answer = form.call("outstanding", serde_json::json!({ "days": 30 })).await.unwrap();
	assert_eq!(answer, serde_json::json!({ "name": "INV-00001", "days": 30 }));
	assert_eq!(
		form.call("missing", serde_json::Value::Null).await,
		Err(FormError::RemoteError("unknown method missing".into()))
	);
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(32))]

	#[test]
	fn dirty_set_tracks_first_touch_order(ops in proptest::collection::vec((0usize..3, any::<i32>()), 0..12)) {
		let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
		let (modified, lifecycle) = rt.block_on(async {
			let fx = fixture().await;
			let form = fx.runtime.new_form(NOTE).await.unwrap();
			form.set_field("title", "seed").await.unwrap();
			form.save().await.unwrap();

			for (field, n) in &ops {
				match field {
					0 => form.set_field("title", format!("t{n}")).await.unwrap(),
					1 => form.set_field("body", format!("b{n}")).await.unwrap(),
					_ => form.set_field("priority", *n).await.unwrap(),
				}
			}
			(form.modified_fields(), form.lifecycle())
		});

		let mut expected: Vec<String> = Vec::new();
		for (field, _) in &ops {
			let name = ["title", "body", "priority"][(*field).min(2)].to_string();
			if !expected.contains(&name) {
				expected.push(name);
			}
		}
		prop_assert_eq!(&modified, &expected);
		prop_assert_eq!(lifecycle == Lifecycle::Dirty, !ops.is_empty());
	}
}
