//! Child table rows.

use std::sync::Arc;

use formwork_gateway::ChildRecord;
use formwork_meta::{FieldError, FieldKind, FieldValues, Meta, Value};
use tracing::trace;

use super::{Event, Form};
use crate::context::RowRef;
use crate::error::{FormError, Result};
use crate::events;

impl Form {
	/// Rows of `table`.
	pub fn rows(&self, table: &str) -> Result<Vec<ChildRecord>> {
		self.table_meta(table)?;
		Ok(self
			.inner
			.state
			.lock()
			.doc
			.rows(table)
			.map(<[ChildRecord]>::to_vec)
			.unwrap_or_default())
	}

	/// One value of one row.
	pub fn row_value(&self, table: &str, index: usize, field: &str) -> Result<Value> {
		let child = self.table_meta(table)?;
		child.require_field(field)?;
		let state = self.inner.state.lock();
		let row = state
			.doc
			.rows(table)
			.and_then(|rows| rows.get(index))
			.ok_or_else(|| invalid_row(table, index))?;
		Ok(row.values.get(field).cloned().unwrap_or_default())
	}

	/// Appends a row built from the child type's defaults plus `values`,
	/// then fires `"<table>_add"`. Returns the new row's index.
	pub async fn add_row(&self, table: &str, values: FieldValues) -> Result<usize> {
		let child = self.table_meta(table)?.clone();
		let values = child.check_values(&values)?;
		let event = events::row_added(table);
		let (index, _depth) = {
			let mut state = self.inner.state.lock();
			self.ensure_table_writable(&state, table)?;
			let depth = self.enter(&event)?;
			let mut row = child.defaults();
			row.extend(values);
			let rows = state.doc.rows_mut(table);
			rows.push(ChildRecord { name: None, values: row });
			let index = rows.len() - 1;
			state.doc.touch(table);
			state.mark_dirty();
			(index, depth)
		};
		trace!(doctype = %self.doctype(), table, index, "row added");

		let row = RowRef {
			table: table.to_string(),
			index,
		};
		self.fire(Event::new(self.doctype(), &event).row(row)).await?;
		Ok(index)
	}

	/// Removes the row at `index`, then fires `"<table>_remove"`.
	pub async fn remove_row(&self, table: &str, index: usize) -> Result<ChildRecord> {
		self.table_meta(table)?;
		let event = events::row_removed(table);
		let (removed, _depth) = {
			let mut state = self.inner.state.lock();
			self.ensure_table_writable(&state, table)?;
			if state.doc.rows(table).is_none_or(|rows| index >= rows.len()) {
				return Err(invalid_row(table, index));
			}
			let depth = self.enter(&event)?;
			let removed = state.doc.rows_mut(table).remove(index);
			state.doc.touch(table);
			state.mark_dirty();
			(removed, depth)
		};
		trace!(doctype = %self.doctype(), table, index, "row removed");

		let row = RowRef {
			table: table.to_string(),
			index,
		};
		self.fire(Event::new(self.doctype(), &event).row(row)).await?;
		Ok(removed)
	}

	/// Writes one field of one row, then fires `"<field>"` and `"*"` on the
	/// child type.
	pub async fn set_row_field(&self, table: &str, index: usize, field: &str, value: impl Into<Value>) -> Result<()> {
		let child = self.table_meta(table)?.clone();
		let desc = child.require_field(field)?;
		if desc.readonly {
			return Err(FieldError::ReadOnly(field.to_string()).into());
		}
		let value = desc.coerce(value.into())?;
		let _depth = {
			let mut state = self.inner.state.lock();
			self.ensure_table_writable(&state, table)?;
			let depth = self.enter(field)?;
			let row = state
				.doc
				.rows_mut(table)
				.get_mut(index)
				.ok_or_else(|| invalid_row(table, index))?;
			row.values.insert(field.to_string(), value);
			state.doc.touch(table);
			state.mark_dirty();
			depth
		};
		trace!(doctype = %child.doctype(), table, index, field, "row field set");

		let row = RowRef {
			table: table.to_string(),
			index,
		};
		let doctype = child.doctype();
		self.fire_field(Event::new(doctype, field).field(field).row(row.clone()))
			.await?;
		self.fire_field(Event::new(doctype, events::ANY_FIELD).field(field).row(row))
			.await
	}

	fn table_meta(&self, table: &str) -> Result<&Arc<Meta>> {
		let desc = self.meta().require_field(table)?;
		if desc.kind != FieldKind::Table {
			return Err(FieldError::WrongKind {
				field: table.to_string(),
				expected: FieldKind::Table.expects(),
				got: desc.kind.expects(),
			}
			.into());
		}
		self.child_meta(table)
			.ok_or_else(|| FormError::MetaNotFound(desc.target_doctype().unwrap_or(table).to_string()))
	}

	fn ensure_table_writable(&self, state: &super::FormState, table: &str) -> Result<()> {
		self.ensure_editable(state)?;
		if self.read_only(state, self.meta().require_field(table)?) {
			return Err(FieldError::ReadOnly(table.to_string()).into());
		}
		Ok(())
	}
}

fn invalid_row(table: &str, index: usize) -> FormError {
	FormError::InvalidRow {
		table: table.to_string(),
		index,
	}
}
