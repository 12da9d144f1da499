//! Role-based capability checks.

use std::sync::Arc;

use arc_swap::ArcSwap;
use formwork_gateway::{Capability, GatewayError, PermissionSnapshot, RpcGateway};
use tracing::debug;

use crate::document::Document;

/// Answers capability questions from the current [`PermissionSnapshot`].
///
/// Checks are pure reads of the snapshot and the instance's current owner,
/// so they are cheap enough to repeat before every operation. The snapshot
/// is swapped atomically by [`Self::replace`] or [`Self::refresh`].
pub struct PermissionEvaluator {
	snapshot: ArcSwap<PermissionSnapshot>,
}

impl Default for PermissionEvaluator {
	fn default() -> Self {
		Self::new(PermissionSnapshot::default())
	}
}

impl PermissionEvaluator {
	/// Creates an evaluator over `snapshot`.
	pub fn new(snapshot: PermissionSnapshot) -> Self {
		Self {
			snapshot: ArcSwap::from_pointee(snapshot),
		}
	}

	/// Current snapshot.
	pub fn snapshot(&self) -> Arc<PermissionSnapshot> {
		self.snapshot.load_full()
	}

	/// Swaps in a new snapshot.
	pub fn replace(&self, snapshot: PermissionSnapshot) {
		debug!(actor = %snapshot.actor, rules = snapshot.rules.len(), "permission snapshot replaced");
		self.snapshot.store(Arc::new(snapshot));
	}

	/// Fetches `actor`'s snapshot through `gateway` and swaps it in.
	pub async fn refresh(&self, gateway: &dyn RpcGateway, actor: &str) -> Result<(), GatewayError> {
		let snapshot = gateway.fetch_permissions(actor).await?;
		self.replace(snapshot);
		Ok(())
	}

	/// Whether `actor` may exercise `capability` on `doctype`.
	///
	/// With an `instance`, owner-restricted rules apply when the actor owns
	/// it; an unsaved instance is owned by whoever saves it. Without one,
	/// owner-restricted rules only grant [`Capability::Create`].
	pub fn can(&self, actor: &str, doctype: &str, capability: Capability, instance: Option<&Document>) -> bool {
		let snap = self.snapshot.load();
		if snap.actor != actor {
			debug!(actor, snapshot = %snap.actor, "permission snapshot belongs to another actor");
			return false;
		}
		let owns = match instance {
			Some(doc) => doc.owner().is_none_or(|owner| owner == actor),
			None => capability == Capability::Create,
		};
		snap.applicable(doctype)
			.filter(|rule| !rule.if_owner || owns)
			.any(|rule| rule.capabilities.contains(capability.as_set()))
	}

	/// Whether any rule, owner-restricted or not, could grant `capability`.
	///
	/// Used before the instance is known; [`Self::can`] must still be
	/// consulted once it is.
	pub fn can_any(&self, actor: &str, doctype: &str, capability: Capability) -> bool {
		let snap = self.snapshot.load();
		snap.actor == actor
			&& snap
				.applicable(doctype)
				.any(|rule| rule.capabilities.contains(capability.as_set()))
	}
}
