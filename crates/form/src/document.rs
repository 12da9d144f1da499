//! Local copy of one document.

use formwork_gateway::{ChildRecord, DocStatus, DocumentRecord, Revision, WriteRequest};
use formwork_meta::{FieldError, FieldValues, Meta, Value};
use indexmap::IndexMap;

/// Child tables keyed by table field name.
pub type Tables = IndexMap<String, Vec<ChildRecord>>;

/// Field values plus the bookkeeping needed to save them.
///
/// Every modification bumps a local revision counter and records, per field,
/// the counter value at which it last changed. A save remembers the counter
/// at transmission time; only fields unchanged since then are reconciled
/// with the server's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
	doctype: String,
	name: Option<String>,
	owner: Option<String>,
	status: DocStatus,
	revision: Option<Revision>,
	values: FieldValues,
	children: Tables,
	modified: IndexMap<String, u64>,
	local_revision: u64,
	amended_from: Option<String>,
}

impl Document {
	/// A never-persisted document holding `meta`'s defaults.
	pub fn new(meta: &Meta) -> Self {
		Self {
			doctype: meta.doctype().to_string(),
			name: None,
			owner: None,
			status: DocStatus::initial(meta.is_submittable()),
			revision: None,
			values: meta.defaults(),
			children: meta.table_fields().map(|f| (f.name.clone(), Vec::new())).collect(),
			modified: IndexMap::new(),
			local_revision: 0,
			amended_from: None,
		}
	}

	/// Builds a clean document from a server record.
	///
	/// Fails if the record carries fields `meta` does not know.
	pub fn from_record(meta: &Meta, record: DocumentRecord) -> Result<Self, FieldError> {
		let mut doc = Self::new(meta);
		doc.replace(meta, record)?;
		Ok(doc)
	}

	/// Overwrites everything with a server record and forgets local edits.
	pub fn replace(&mut self, meta: &Meta, record: DocumentRecord) -> Result<(), FieldError> {
		let values = meta.check_values(&record.values)?;
		for table in record.children.keys() {
			check_table(meta, table)?;
		}
		self.name = Some(record.name);
		self.owner = record.owner;
		self.status = record.status;
		self.revision = Some(record.revision);
		self.values = values;
		for (table, rows) in record.children {
			self.children.insert(table, rows);
		}
		self.modified.clear();
		self.amended_from = record.amended_from;
		Ok(())
	}

	/// Document type.
	pub fn doctype(&self) -> &str {
		&self.doctype
	}

	/// Server identifier, absent until first persisted.
	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	/// Creating actor.
	pub fn owner(&self) -> Option<&str> {
		self.owner.as_deref()
	}

	/// Submission status.
	pub fn status(&self) -> DocStatus {
		self.status
	}

	/// Server revision the local copy is based on.
	pub fn revision(&self) -> Option<Revision> {
		self.revision
	}

	/// Cancelled document this one amends.
	pub fn amended_from(&self) -> Option<&str> {
		self.amended_from.as_deref()
	}

	/// Whether the document was ever persisted.
	pub fn is_new(&self) -> bool {
		self.name.is_none()
	}

	/// Unsaved local edits exist, or the document was never persisted.
	pub fn is_dirty(&self) -> bool {
		self.is_new() || !self.modified.is_empty()
	}

	/// Local modification counter.
	pub fn local_revision(&self) -> u64 {
		self.local_revision
	}

	/// Fields and tables changed since the last reconcile, oldest first.
	pub fn modified(&self) -> impl Iterator<Item = &str> {
		self.modified.keys().map(String::as_str)
	}

	/// Scalar values.
	pub fn values(&self) -> &FieldValues {
		&self.values
	}

	/// Value of `field`, `Null` when unset.
	pub fn get(&self, field: &str) -> Value {
		self.values.get(field).cloned().unwrap_or_default()
	}

	/// Writes an already coerced value and marks the field modified.
	pub fn set(&mut self, field: &str, value: Value) -> u64 {
		self.values.insert(field.to_string(), value);
		self.touch(field)
	}

	/// Rows of `table`.
	pub fn rows(&self, table: &str) -> Option<&[ChildRecord]> {
		self.children.get(table).map(Vec::as_slice)
	}

	/// Mutable rows of `table`; the caller must [`Self::touch`] it.
	pub fn rows_mut(&mut self, table: &str) -> &mut Vec<ChildRecord> {
		self.children.entry(table.to_string()).or_default()
	}

	/// Marks `field` modified at a fresh local revision.
	pub fn touch(&mut self, field: &str) -> u64 {
		self.local_revision += 1;
		self.modified.insert(field.to_string(), self.local_revision);
		self.local_revision
	}

	/// Links this document to the cancelled one it amends.
	pub fn set_amended_from(&mut self, name: impl Into<String>) {
		self.amended_from = Some(name.into());
	}

	/// Replaces all children, e.g. when copying for an amendment.
	pub fn set_children(&mut self, children: Tables) {
		self.children = children;
	}

	/// Builds the write for this document.
	///
	/// New documents and `full` writes carry every value and table;
	/// otherwise only modified ones.
	pub fn write_request(&self, actor: &str, status: DocStatus, full: bool) -> WriteRequest {
		let full = full || self.is_new();
		let values = if full {
			self.values.clone()
		} else {
			self.values
				.iter()
				.filter(|(k, _)| self.modified.contains_key(*k))
				.map(|(k, v)| (k.clone(), v.clone()))
				.collect()
		};
		let children = self
			.children
			.iter()
			.filter(|(k, _)| full || self.modified.contains_key(*k))
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect();
		WriteRequest {
			doctype: self.doctype.clone(),
			name: self.name.clone(),
			actor: actor.to_string(),
			values,
			children,
			expected: self.revision,
			status,
			amended_from: self.amended_from.clone(),
		}
	}

	/// Folds the server's answer to a write sent at local revision `sent_at`.
	///
	/// Fields edited after `sent_at` keep their local value and stay
	/// modified; everything else takes the server value.
	pub fn merge_saved(&mut self, meta: &Meta, record: DocumentRecord, sent_at: u64) -> Result<(), FieldError> {
		let values = meta.check_values(&record.values)?;
		for table in record.children.keys() {
			check_table(meta, table)?;
		}
		let edited_since = |modified: &IndexMap<String, u64>, field: &str| modified.get(field).is_some_and(|&rev| rev > sent_at);

		for (field, value) in values {
			if !edited_since(&self.modified, &field) {
				self.values.insert(field, value);
			}
		}
		for (table, rows) in record.children {
			if !edited_since(&self.modified, &table) {
				self.children.insert(table, rows);
			}
		}
		self.modified.retain(|_, rev| *rev > sent_at);

		self.name = Some(record.name);
		self.owner = record.owner;
		self.status = record.status;
		self.revision = Some(record.revision);
		self.amended_from = record.amended_from;
		Ok(())
	}
}

fn check_table(meta: &Meta, table: &str) -> Result<(), FieldError> {
	match meta.field(table) {
		Some(f) if f.kind == formwork_meta::FieldKind::Table => Ok(()),
		Some(f) => Err(FieldError::WrongKind {
			field: f.name.clone(),
			expected: "child rows",
			got: f.kind.expects(),
		}),
		None => Err(FieldError::Unknown(table.to_string())),
	}
}
