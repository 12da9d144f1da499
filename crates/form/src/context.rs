//! What a handler sees when it is invoked.

use formwork_gateway::Push;
use formwork_meta::Value;

use crate::controller::Form;
use crate::error::Result;

/// Position of a child row that triggered an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRef {
	/// Table field on the parent.
	pub table: String,
	/// Index of the row within the table.
	pub index: usize,
}

/// Argument passed to every handler.
///
/// Holds a handle to the form, so a handler's async tail can clone it and
/// call back into [`Form::set_field`] or [`Form::trigger`]; such nested calls
/// count toward the form's dispatch depth.
pub struct HandlerContext {
	pub(crate) form: Form,
	pub(crate) doctype: String,
	pub(crate) event: String,
	pub(crate) field: Option<String>,
	pub(crate) row: Option<RowRef>,
	pub(crate) push: Option<Push>,
}

impl HandlerContext {
	/// The form the event fired on.
	pub fn form(&self) -> &Form {
		&self.form
	}

	/// Document type the handler was resolved for. For row field events
	/// this is the child type.
	pub fn doctype(&self) -> &str {
		&self.doctype
	}

	/// Event name.
	pub fn event(&self) -> &str {
		&self.event
	}

	/// Field whose change fired the event.
	pub fn field(&self) -> Option<&str> {
		self.field.as_deref()
	}

	/// Row whose change fired the event.
	pub fn row(&self) -> Option<&RowRef> {
		self.row.as_ref()
	}

	/// Realtime push behind a `realtime_*` event.
	pub fn push(&self) -> Option<&Push> {
		self.push.as_ref()
	}

	/// Current value of the field that fired the event, read from the row
	/// for row events.
	pub fn value(&self) -> Result<Value> {
		let Some(field) = self.field.as_deref() else {
			return Ok(Value::Null);
		};
		match &self.row {
			Some(row) => self.form.row_value(&row.table, row.index, field),
			None => self.form.get_field(field),
		}
	}
}

impl std::fmt::Debug for HandlerContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HandlerContext")
			.field("doctype", &self.doctype)
			.field("event", &self.event)
			.field("field", &self.field)
			.field("row", &self.row)
			.finish()
	}
}
