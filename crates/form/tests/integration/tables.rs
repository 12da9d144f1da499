use formwork_form::{FormError, HandlerContext, Lifecycle, RowRef, events};
use formwork_meta::{FieldError, Value};
use pretty_assertions::assert_eq;

use crate::common::{INVOICE, ITEM, Log, entries, fixture, push, saved_invoice, values};

#[tokio::test]
async fn added_rows_start_from_child_defaults() {
	let fx = fixture().await;
	let log = Log::default();
	{
		let log = log.clone();
		fx.runtime.on(INVOICE, &events::row_added("items"), move |ctx: &HandlerContext| {
			let row = ctx.row().unwrap();
			push(&log, format!("{}:{}", ctx.event(), row.index));
		});
	}
	let form = fx.runtime.new_form(INVOICE).await.unwrap();

	let first = form.add_row("items", values([("item", Value::from("Widget"))])).await.unwrap();
	let second = form
		.add_row("items", values([("item", Value::from("Gadget")), ("qty", Value::Int(3))]))
		.await
		.unwrap();

	assert_eq!((first, second), (0, 1));
	let rows = form.rows("items").unwrap();
	assert_eq!(rows[0].values.get("qty"), Some(&Value::Int(1)));
	assert_eq!(rows[1].values.get("qty"), Some(&Value::Int(3)));
	assert_eq!(rows[0].name, None);
	assert_eq!(entries(&log), ["items_add:0", "items_add:1"]);
}

#[tokio::test]
async fn row_values_are_validated_against_the_child_type() {
	let fx = fixture().await;
	let form = fx.runtime.new_form(INVOICE).await.unwrap();

	assert_eq!(
		form.add_row("items", values([("colour", Value::from("red"))])).await,
		Err(FormError::SchemaViolation(FieldError::Unknown("colour".into())))
	);
	assert!(form.rows("items").unwrap().is_empty());

	form.add_row("items", values([("item", Value::from("Widget"))])).await.unwrap();
	assert!(matches!(
		form.set_row_field("items", 0, "qty", "many").await,
		Err(FormError::SchemaViolation(FieldError::WrongKind { .. }))
	));
	assert_eq!(
		form.set_row_field("items", 4, "qty", 2).await,
		Err(FormError::InvalidRow {
			table: "items".into(),
			index: 4,
		})
	);
	assert!(matches!(
		form.add_row("customer", values([])).await,
		Err(FormError::SchemaViolation(FieldError::WrongKind { .. }))
	));
}

#[tokio::test]
async fn table_fields_are_not_scalars() {
	let fx = fixture().await;
	let form = fx.runtime.new_form(INVOICE).await.unwrap();

	assert_eq!(
		form.get_field("items"),
		Err(FormError::SchemaViolation(FieldError::TableField("items".into())))
	);
	assert_eq!(
		form.set_field("items", 1).await,
		Err(FormError::SchemaViolation(FieldError::TableField("items".into())))
	);
}

#[tokio::test]
async fn row_field_handlers_run_on_the_child_type() {
	let fx = fixture().await;
	let log = Log::default();
	for event in ["qty", events::ANY_FIELD] {
		let log = log.clone();
		fx.runtime.on(ITEM, event, move |ctx: &HandlerContext| {
			let row = ctx.row().cloned().unwrap();
			push(
				&log,
				format!("{}/{}[{}].{}={:?}", ctx.doctype(), row.table, row.index, ctx.field().unwrap(), ctx.value().unwrap()),
			);
		});
	}
	let form = fx.runtime.new_form(INVOICE).await.unwrap();
	form.add_row("items", values([("item", Value::from("Widget"))])).await.unwrap();

	form.set_row_field("items", 0, "qty", 4).await.unwrap();

	assert_eq!(form.row_value("items", 0, "qty").unwrap(), Value::Int(4));
	assert_eq!(
		entries(&log),
		[
			"Invoice Item/items[0].qty=Int(4)",
			"Invoice Item/items[0].qty=Int(4)",
		]
	);
	assert_eq!(
		form.row_value("items", 0, "colour"),
		Err(FormError::SchemaViolation(FieldError::Unknown("colour".into())))
	);
}

#[tokio::test]
async fn row_changes_dirty_the_table_and_persist() {
	let fx = fixture().await;
	let form = saved_invoice(&fx, "ACME").await;
	let name = form.name().unwrap();

	form.add_row("items", values([("item", Value::from("Widget"))])).await.unwrap();
	form.add_row("items", values([("item", Value::from("Gadget"))])).await.unwrap();
	assert_eq!(form.lifecycle(), Lifecycle::Dirty);
	assert_eq!(form.modified_fields(), ["items"]);

	form.save().await.unwrap();
	let rows = form.rows("items").unwrap();
	assert!(rows.iter().all(|row| row.name.is_some()), "server names rows");
	assert_eq!(fx.server.record(INVOICE, &name).unwrap().children["items"].len(), 2);

	let removed = form.remove_row("items", 0).await.unwrap();
	assert_eq!(removed.values.get("item"), Some(&Value::from("Widget")));
	assert_eq!(
		form.remove_row("items", 5).await,
		Err(FormError::InvalidRow {
			table: "items".into(),
			index: 5,
		})
	);
	form.save().await.unwrap();
	let stored = fx.server.record(INVOICE, &name).unwrap();
	assert_eq!(stored.children["items"].len(), 1);
	assert_eq!(stored.children["items"][0].values.get("item"), Some(&Value::from("Gadget")));
}

#[tokio::test]
async fn remove_row_reports_the_removed_index() {
	let fx = fixture().await;
	let log = Log::default();
	{
		let log = log.clone();
		fx.runtime.on(INVOICE, &events::row_removed("items"), move |ctx: &HandlerContext| {
			let RowRef { table, index } = ctx.row().cloned().unwrap();
			push(&log, format!("{table}-{index}"));
		});
	}
	let form = fx.runtime.new_form(INVOICE).await.unwrap();
	form.add_row("items", values([("item", Value::from("Widget"))])).await.unwrap();
	form.remove_row("items", 0).await.unwrap();

	assert_eq!(entries(&log), ["items-0"]);
	assert!(form.rows("items").unwrap().is_empty());
}
