//! Lifecycle event names.
//!
//! Field events use the field name itself; `"*"` fires after every field
//! event. Child tables fire `"<table>_add"` and `"<table>_remove"` on the
//! parent type.

/// First event of a freshly opened form.
pub const SETUP: &str = "setup";
/// After the document is available.
pub const ONLOAD: &str = "onload";
/// After open, save, submit, cancel and reload.
pub const REFRESH: &str = "refresh";
/// Before save, submit and cancel; a rejection aborts.
pub const VALIDATE: &str = "validate";
/// After `validate`, before the write.
pub const BEFORE_SAVE: &str = "before_save";
/// After a successful save.
pub const AFTER_SAVE: &str = "after_save";
/// After `validate`, before a submit.
pub const BEFORE_SUBMIT: &str = "before_submit";
/// After a successful submit.
pub const ON_SUBMIT: &str = "on_submit";
/// After `validate`, before a cancel.
pub const BEFORE_CANCEL: &str = "before_cancel";
/// After a successful cancel.
pub const ON_CANCEL: &str = "on_cancel";
/// Before a delete; a rejection aborts.
pub const ON_TRASH: &str = "on_trash";
/// After a successful delete.
pub const AFTER_DELETE: &str = "after_delete";
/// After any field event.
pub const ANY_FIELD: &str = "*";
/// A collaborator's edit lock changed.
pub const REALTIME_LOCK: &str = "realtime_lock";
/// A server job reported progress.
pub const REALTIME_PROGRESS: &str = "realtime_progress";

/// Event fired on the parent type when a row is added to `table`.
pub fn row_added(table: &str) -> String {
	format!("{table}_add")
}

/// Event fired on the parent type when a row is removed from `table`.
pub fn row_removed(table: &str) -> String {
	format!("{table}_remove")
}
