//! Save lifecycle of a form.

use std::fmt;

/// Where a form is on the save axis. The submission axis lives in
/// [`formwork_gateway::DocStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
	/// Never persisted.
	New,
	/// Matches the last known server state.
	Clean,
	/// Has unsaved local edits.
	Dirty,
	/// A write is in flight.
	Saving,
	/// Released or deleted; every further mutation fails.
	Discarded,
}

impl Lifecycle {
	/// Whether moving from `self` to `next` is a legal step.
	pub const fn allows(self, next: Lifecycle) -> bool {
		use Lifecycle::*;
		matches!(
			(self, next),
			(New, Saving | Discarded)
				| (Clean, Dirty | Saving | Clean | Discarded)
				| (Dirty, Clean | Saving | Discarded)
				| (Saving, Clean | Dirty | New | Discarded)
		)
	}

	/// Whether the form still accepts operations.
	pub const fn is_live(self) -> bool {
		!matches!(self, Self::Discarded)
	}

	/// Lowercase label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::New => "new",
			Self::Clean => "clean",
			Self::Dirty => "dirty",
			Self::Saving => "saving",
			Self::Discarded => "discarded",
		}
	}
}

impl fmt::Display for Lifecycle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
