//! Ripple Core
//!
//! This crate provides the core runtime for the Ripple fine-grained
//! reactivity engine. It implements:
//!
//! - Observable state (records and lists whose reads are tracked)
//! - Subscribers (derived values, watchers, render effects)
//! - A batching update scheduler and a next-tick callback buffer
//!
//! All state is per thread. Nothing here is `Send`; run the engine on one
//! thread (or inside a tokio `LocalSet`).
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `observer`: observable values, dependencies and deep traversal
//! - `reactive`: tracking context, runtime graph and subscribers
//! - `scheduler`: the update queue and the tick scheduler
//! - `config` / `error`: runtime settings and diagnostics
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{observe_root, run_pending, watch, Value, WatchOptions};
//! use serde_json::json;
//!
//! let state = Value::from(json!({"a": 1, "b": 2}));
//! observe_root(&state);
//! let record = state.as_record().cloned().unwrap();
//!
//! let r = record.clone();
//! let _sum = watch(
//!     move || {
//!         let a = r.get("a").and_then(|v| v.as_number()).unwrap_or(0.0);
//!         let b = r.get("b").and_then(|v| v.as_number()).unwrap_or(0.0);
//!         Ok(Value::from(a + b))
//!     },
//!     |new, old| {
//!         println!("sum: {old} -> {new}");
//!         Ok(())
//!     },
//!     WatchOptions::default(),
//! )?;
//!
//! record.set("a", Value::from(5))?;
//! record.set("b", Value::from(10))?;
//!
//! // One callback for the whole burst, prints "sum: 3 -> 15"
//! run_pending();
//! ```

pub mod config;
pub mod error;
pub mod observer;
pub mod reactive;
pub mod scheduler;

pub use config::{Config, TickStrategy};
pub use error::ReactiveError;
pub use observer::{
    define_reactive, explicit_delete, explicit_set, observe, observe_root, traverse, Dep, DepId, List, Record,
    Value,
};
pub use reactive::{
    untracked, watch, watch_path, Effect, Memo, Scope, Subscriber, SubscriberId, SubscriberOptions, WatchOptions,
};
pub use scheduler::{next_tick, run_pending, tick, NextTick};
