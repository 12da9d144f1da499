//! Metadata-driven form controller.
//!
//! A [`FormRuntime`] opens [`Form`]s for one actor. Each form owns a local
//! [`Document`] validated against its type's [`formwork_meta::Meta`], runs
//! registered handlers around every field change and lifecycle step, checks
//! permissions before touching the network, and persists through a
//! [`formwork_gateway::RpcGateway`].
//!
//! ```text
//! New ──save──▶ Clean ◀──save── Dirty
//!                 └──set_field──▶ ┘
//! Draft ──submit──▶ Submitted ──cancel──▶ Cancelled ──amend──▶ (new Draft)
//! ```
//!
//! Handlers are registered per `(type, event)` with [`FormRuntime::on`]; see
//! [`events`] for the lifecycle event names.

#![warn(missing_docs)]

pub mod config;
pub mod context;
mod controller;
pub mod document;
pub mod error;
pub mod events;
pub mod inbox;
pub mod lifecycle;
pub mod meta_source;
pub mod permission;
pub mod realtime;
pub mod runtime;

pub use config::{ConfigError, FormConfig, WriteMode};
pub use context::{HandlerContext, RowRef};
pub use controller::{FieldProperties, FieldProperty, Form};
pub use document::Document;
pub use error::{FormError, Result};
pub use formwork_dispatch::{Flow, HandlerAction, HandlerId};
pub use inbox::{InboxOutcome, PushInbox};
pub use lifecycle::Lifecycle;
pub use permission::PermissionEvaluator;
pub use realtime::{PushOutcome, RealtimeLink};
pub use runtime::{FormHandlers, FormRuntime, RuntimeBuilder};
