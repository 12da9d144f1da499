//! Boundary of the document runtime.
//!
//! Everything the form engine needs from the outside world goes through the
//! traits in this crate:
//! * [`RpcGateway`]: metadata, document reads/writes/deletes, method calls,
//!   permission snapshots
//! * [`RealtimeChannel`]: named push subscriptions
//!
//! [`MemoryServer`] implements both in-process for tests and demos.

#![warn(missing_docs)]

pub mod capability;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod realtime;
pub mod rpc;

pub use capability::{Capability, CapabilitySet, PermissionRule, PermissionSnapshot};
pub use error::{GatewayError, Result};
pub use memory::{MemoryServer, Op};
pub use protocol::{ChildRecord, DocStatus, DocumentRecord, MethodCall, Revision, WriteRequest, WriteResponse};
pub use realtime::{Push, PushPayload, RealtimeChannel, RealtimeHub, Subscription, SubscriptionId};
pub use rpc::RpcGateway;
