//! Event handler registry and dispatch.
//!
//! Handlers are registered per `(document type, event)` key and invoked in
//! registration order. Registration is copy-on-write: a dispatch runs against
//! the snapshot taken when it started, so handlers registered from inside a
//! running handler only see future dispatches.
//!
//! A handler returns a [`HandlerAction`]: either [`HandlerAction::Done`] for
//! synchronous completion or [`HandlerAction::Async`] carrying the rest of
//! its work as a future. See [`run`] for the ordering rules.

#![warn(missing_docs)]

mod action;
mod dispatch;
mod registry;

pub use action::{Flow, Handler, HandlerAction, HandlerFuture};
pub use dispatch::run;
pub use registry::{HandlerId, HandlerRegistry, Handlers, WILDCARD};
