use formwork_form::{FormConfig, FormError, Lifecycle};
use formwork_gateway::{Capability, DocStatus, DocumentRecord, Op, PermissionRule, PermissionSnapshot, Revision};
use formwork_meta::Value;
use pretty_assertions::assert_eq;

use crate::common::{ACTOR, ALL, INVOICE, NOTE, fixture_with, full_access, values};

fn clerk(capabilities: &[Capability]) -> PermissionSnapshot {
	PermissionSnapshot::new(ACTOR, ["Clerk"]).rule(PermissionRule::new(INVOICE, "Clerk", capabilities.iter().copied()))
}

fn invoice_owned_by(owner: &str, name: &str) -> DocumentRecord {
	DocumentRecord {
		doctype: INVOICE.into(),
		name: name.into(),
		owner: Some(owner.into()),
		status: DocStatus::Draft,
		revision: Revision(1),
		values: values([("customer", Value::from("ACME"))]),
		children: Default::default(),
		amended_from: None,
	}
}

#[tokio::test]
async fn create_is_checked_before_the_form_opens() {
	let fx = fixture_with(clerk(&[Capability::Read]), FormConfig::default()).await;

	assert_eq!(
		fx.runtime.new_form(INVOICE).await.unwrap_err(),
		FormError::PermissionDenied("ann may not create Invoice".into())
	);
	assert!(matches!(fx.runtime.new_form(NOTE).await, Err(FormError::PermissionDenied(_))));
	assert_eq!(fx.server.calls(Op::Write), 0);
}

#[tokio::test]
async fn write_is_checked_before_the_network() {
	let fx = fixture_with(clerk(&[Capability::Read, Capability::Create]), FormConfig::default()).await;
	let form = fx.runtime.new_form(INVOICE).await.unwrap();
	form.set_field("customer", "ACME").await.unwrap();
	form.save().await.unwrap();
	assert_eq!(fx.server.calls(Op::Write), 1);

	form.set_field("amount", 5).await.unwrap();
	assert!(matches!(form.save().await, Err(FormError::PermissionDenied(_))));
	assert_eq!(fx.server.calls(Op::Write), 1);
	assert_eq!(form.lifecycle(), Lifecycle::Dirty);
	assert!(!form.is_busy());
}

#[tokio::test]
async fn submit_needs_its_own_capability() {
	let fx = fixture_with(
		clerk(&[Capability::Read, Capability::Create, Capability::Write]),
		FormConfig::default(),
	)
	.await;
	let form = fx.runtime.new_form(INVOICE).await.unwrap();
	form.set_field("customer", "ACME").await.unwrap();
	form.save().await.unwrap();

	assert!(matches!(form.submit().await, Err(FormError::PermissionDenied(_))));
	assert_eq!(form.status(), DocStatus::Draft);
	assert_eq!(fx.server.calls(Op::Write), 1);
}

#[tokio::test]
async fn owner_restricted_rules_follow_the_document_owner() {
	let snapshot = PermissionSnapshot::new(ACTOR, ["Clerk"])
		.rule(PermissionRule::new(INVOICE, "Clerk", ALL).owner_only());
	let fx = fixture_with(snapshot, FormConfig::default()).await;
	fx.server.insert(invoice_owned_by("bob", "INV-00100"));
	fx.server.insert(invoice_owned_by(ACTOR, "INV-00101"));

	assert!(matches!(
		fx.runtime.load(INVOICE, "INV-00100").await,
		Err(FormError::PermissionDenied(_))
	));
	let own = fx.runtime.load(INVOICE, "INV-00101").await.unwrap();
	own.set_field("amount", 3).await.unwrap();
	own.save().await.unwrap();

	let fresh = fx.runtime.new_form(INVOICE).await.unwrap();
	fresh.set_field("customer", "Globex").await.unwrap();
	fresh.save().await.unwrap();
	assert_eq!(fresh.owner().as_deref(), Some(ACTOR));
}

#[tokio::test]
async fn refreshed_snapshot_takes_effect() {
	let fx = fixture_with(clerk(&[Capability::Read]), FormConfig::default()).await;
	assert!(matches!(fx.runtime.new_form(INVOICE).await, Err(FormError::PermissionDenied(_))));

	fx.server.set_permissions(full_access(ACTOR));
	fx.runtime.refresh_permissions().await.unwrap();
	fx.runtime.new_form(INVOICE).await.unwrap();
}

#[tokio::test]
async fn delete_needs_the_delete_capability() {
	let fx = fixture_with(
		clerk(&[Capability::Read, Capability::Create, Capability::Write]),
		FormConfig::default(),
	)
	.await;
	let form = fx.runtime.new_form(INVOICE).await.unwrap();
	form.set_field("customer", "ACME").await.unwrap();
	form.save().await.unwrap();

	assert!(matches!(form.delete().await, Err(FormError::PermissionDenied(_))));
	assert_eq!(form.lifecycle(), Lifecycle::Clean);
	assert_eq!(fx.server.calls(Op::Delete), 0);
}
