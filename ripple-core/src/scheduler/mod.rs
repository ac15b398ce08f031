//! Update Scheduler
//!
//! Notified subscribers are not re-run immediately. They are queued, and
//! the queue is flushed once per tick:
//!
//! 1. The first enqueue of a burst asks the tick scheduler for a flush.
//!    Later enqueues in the same burst just join the queue (a subscriber is
//!    queued at most once).
//! 2. The flush sorts the queue by subscriber id, so subscribers created
//!    earlier (parents) run before those created later (children).
//! 3. Subscribers queued while the flush runs are spliced into the
//!    remaining part of the queue in id order and run in the same flush.
//! 4. A subscriber that keeps re-queueing itself is dropped from the flush
//!    after `max_update_count` passes, with a warning.
//!
//! The tick scheduler is a FIFO callback buffer. With
//! [`TickStrategy::Manual`](crate::config::TickStrategy) the host drains it
//! with [`run_pending`] at its turn boundary; with `LocalTask` a tokio local
//! task drains it after the current synchronous work yields.

mod queue;
mod tick;

pub use queue::{enqueue, flush, is_flushing, queued_count};
pub use tick::{is_tick_pending, next_tick, run_pending, tick, NextTick};
