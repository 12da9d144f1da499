//! Capabilities and role-based permission snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An action an actor may be allowed to perform on a document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
	/// Read documents.
	Read,
	/// Modify persisted documents.
	Write,
	/// Create new documents.
	Create,
	/// Delete documents.
	Delete,
	/// Move drafts to submitted.
	Submit,
	/// Cancel submitted documents.
	Cancel,
	/// Create amendments of cancelled documents.
	Amend,
}

bitflags::bitflags! {
	/// A set of document capabilities.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
	pub struct CapabilitySet: u8 {
		/// Read documents.
		const READ = 1 << 0;
		/// Modify persisted documents.
		const WRITE = 1 << 1;
		/// Create new documents.
		const CREATE = 1 << 2;
		/// Delete documents.
		const DELETE = 1 << 3;
		/// Move drafts to submitted.
		const SUBMIT = 1 << 4;
		/// Cancel submitted documents.
		const CANCEL = 1 << 5;
		/// Create amendments.
		const AMEND = 1 << 6;
	}
}

impl Capability {
	/// Returns the bitflag for this capability.
	pub const fn as_set(self) -> CapabilitySet {
		match self {
			Self::Read => CapabilitySet::READ,
			Self::Write => CapabilitySet::WRITE,
			Self::Create => CapabilitySet::CREATE,
			Self::Delete => CapabilitySet::DELETE,
			Self::Submit => CapabilitySet::SUBMIT,
			Self::Cancel => CapabilitySet::CANCEL,
			Self::Amend => CapabilitySet::AMEND,
		}
	}

	/// Lowercase label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Read => "read",
			Self::Write => "write",
			Self::Create => "create",
			Self::Delete => "delete",
			Self::Submit => "submit",
			Self::Cancel => "cancel",
			Self::Amend => "amend",
		}
	}
}

impl fmt::Display for Capability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl From<Capability> for CapabilitySet {
	fn from(cap: Capability) -> Self {
		cap.as_set()
	}
}

impl FromIterator<Capability> for CapabilitySet {
	fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
		let mut set = CapabilitySet::empty();
		for cap in iter {
			set |= cap.as_set();
		}
		set
	}
}

/// Grants `capabilities` on `doctype` to holders of `role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
	/// Document type the rule applies to.
	pub doctype: String,
	/// Role that receives the grant.
	pub role: String,
	/// Granted capabilities.
	pub capabilities: CapabilitySet,
	/// Only applies to documents owned by the actor.
	#[serde(default)]
	pub if_owner: bool,
}

impl PermissionRule {
	/// Creates an unrestricted rule.
	pub fn new(doctype: impl Into<String>, role: impl Into<String>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
		Self {
			doctype: doctype.into(),
			role: role.into(),
			capabilities: capabilities.into_iter().collect(),
			if_owner: false,
		}
	}

	/// Restricts the rule to documents the actor owns.
	#[must_use]
	pub fn owner_only(mut self) -> Self {
		self.if_owner = true;
		self
	}
}

/// Roles of one actor plus the rules that mention them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionSnapshot {
	/// Actor the snapshot was taken for.
	pub actor: String,
	/// Roles held by the actor.
	pub roles: Vec<String>,
	/// Role rules.
	pub rules: Vec<PermissionRule>,
}

impl PermissionSnapshot {
	/// Creates a snapshot for `actor` holding `roles`.
	pub fn new(actor: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			actor: actor.into(),
			roles: roles.into_iter().map(Into::into).collect(),
			rules: Vec::new(),
		}
	}

	/// Appends a rule.
	#[must_use]
	pub fn rule(mut self, rule: PermissionRule) -> Self {
		self.rules.push(rule);
		self
	}

	/// Rules for `doctype` that apply to the actor's roles.
	pub fn applicable<'a>(&'a self, doctype: &'a str) -> impl Iterator<Item = &'a PermissionRule> + 'a {
		self.rules
			.iter()
			.filter(move |r| r.doctype == doctype && self.roles.iter().any(|role| *role == r.role))
	}
}
