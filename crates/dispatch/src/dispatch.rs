//! Cooperative, ordered handler invocation.

use std::task::Poll;

use futures::future::join_all;
use tracing::{debug, trace};

use crate::action::{Flow, Handler, HandlerAction, HandlerFuture};

enum Started<E> {
	Done(Result<Flow, E>),
	Pending(HandlerFuture<E>),
}

/// Runs `handlers` against `ctx`.
///
/// Handlers start in iteration order: each one runs until its first
/// suspension point before the next one is invoked, so an async tail is
/// polled once right after its handler returns it. Tails still pending after
/// that first poll are awaited together and may finish in any order.
///
/// An error or [`Flow::Reject`] produced before a handler first suspends
/// stops later handlers from starting; tails already started are still
/// awaited. The combined outcome is the first error in start order, else the
/// first rejection, else [`Flow::Continue`].
pub async fn run<C, E, I>(handlers: I, ctx: &C) -> Result<Flow, E>
where
	I: IntoIterator<Item = Handler<C, E>>,
{
	let mut started = Vec::new();
	for handler in handlers {
		let result = match handler(ctx) {
			HandlerAction::Done(result) => result,
			HandlerAction::Async(mut fut) => match futures::poll!(&mut fut) {
				Poll::Ready(result) => result,
				Poll::Pending => {
					started.push(Started::Pending(fut));
					continue;
				}
			},
		};
		let stop = !matches!(result, Ok(Flow::Continue));
		started.push(Started::Done(result));
		if stop {
			break;
		}
	}

	let count = started.len();
	let mut pending = Vec::new();
	let mut slots = Vec::with_capacity(count);
	for entry in started {
		match entry {
			Started::Done(result) => slots.push(Some(result)),
			Started::Pending(fut) => {
				slots.push(None);
				pending.push(fut);
			}
		}
	}
	if !pending.is_empty() {
		trace!(handlers = count, pending = pending.len(), "awaiting handler tails");
	}
	let mut finished = join_all(pending).await.into_iter();

	let mut rejection = None;
	for slot in slots {
		let result = match slot {
			Some(result) => result,
			None => match finished.next() {
				Some(result) => result,
				None => continue,
			},
		};
		match result {
			Err(err) => return Err(err),
			Ok(Flow::Reject(reason)) => {
				if rejection.is_none() {
					rejection = Some(reason);
				}
			}
			Ok(Flow::Continue) => {}
		}
	}

	Ok(match rejection {
		Some(reason) => {
			debug!(%reason, "dispatch rejected");
			Flow::Reject(reason)
		}
		None => Flow::Continue,
	})
}
