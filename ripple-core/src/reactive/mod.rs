//! Reactive Primitives
//!
//! This module implements the subscriber side of the engine: the tracking
//! context, the runtime graph, and the subscribers built on top of them.
//!
//! # Concepts
//!
//! ## Subscribers
//!
//! A [`Subscriber`] runs an evaluation function with itself on the context
//! stack. Every dependency read during that evaluation subscribes it; when
//! one of them notifies, the subscriber is marked dirty (`lazy`), re-run
//! inline (`sync`) or queued for the next flush.
//!
//! ## Memos
//!
//! A [`Memo`] is a lazy subscriber: a derived value that caches its result
//! and recomputes on the next read after a dependency changed.
//!
//! ## Effects and Watchers
//!
//! An [`Effect`] is an internal subscriber whose evaluation is the side
//! effect (rendering, typically). [`watch`] creates a `user` subscriber
//! with a `(new, old)` callback; its errors are reported instead of
//! propagated.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When an observed property is read, we check if there
//! is an active tracking context and, if so, register the dependency.

mod context;
mod effect;
mod memo;
mod runtime;
mod scope;
mod subscriber;
mod watch;

pub use context::{untracked, ReactiveContext};
pub use effect::Effect;
pub use memo::{Memo, MemoState};
pub use runtime::{Reactive, Runtime};
pub use scope::Scope;
pub use subscriber::{Callback, Getter, Subscriber, SubscriberBuilder, SubscriberId, SubscriberOptions};
pub use watch::{watch, watch_path, WatchOptions};
