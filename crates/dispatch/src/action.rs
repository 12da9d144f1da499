//! Handler return types.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Outcome of a handler that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Flow {
	/// Let the operation proceed.
	#[default]
	Continue,
	/// Veto the operation with a user-facing reason.
	Reject(String),
}

/// The asynchronous tail of a handler.
pub type HandlerFuture<E> = Pin<Box<dyn Future<Output = Result<Flow, E>> + Send + 'static>>;

/// What a handler returns when invoked.
pub enum HandlerAction<E> {
	/// Completed synchronously.
	Done(Result<Flow, E>),
	/// Needs async work; dispatch awaits the future.
	Async(HandlerFuture<E>),
}

impl<E> HandlerAction<E> {
	/// Completed synchronously, continue.
	pub fn done() -> Self {
		Self::Done(Ok(Flow::Continue))
	}

	/// Completed synchronously, veto with `reason`.
	pub fn reject(reason: impl Into<String>) -> Self {
		Self::Done(Ok(Flow::Reject(reason.into())))
	}

	/// Completed synchronously with an error.
	pub fn fail(err: E) -> Self {
		Self::Done(Err(err))
	}

	/// Boxes `fut` as the handler's async tail.
	pub fn future<F>(fut: F) -> Self
	where
		F: Future<Output = Result<Flow, E>> + Send + 'static,
	{
		Self::Async(Box::pin(fut))
	}
}

impl<E> std::fmt::Debug for HandlerAction<E>
where
	E: std::fmt::Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Done(result) => f.debug_tuple("Done").field(result).finish(),
			Self::Async(_) => f.write_str("Async(..)"),
		}
	}
}

impl<E> From<Flow> for HandlerAction<E> {
	fn from(flow: Flow) -> Self {
		Self::Done(Ok(flow))
	}
}

impl<E> From<Result<Flow, E>> for HandlerAction<E> {
	fn from(result: Result<Flow, E>) -> Self {
		Self::Done(result)
	}
}

impl<E> From<()> for HandlerAction<E> {
	fn from(_: ()) -> Self {
		Self::done()
	}
}

/// A registered callback receiving the dispatch context `C`.
pub type Handler<C, E> = Arc<dyn Fn(&C) -> HandlerAction<E> + Send + Sync>;
