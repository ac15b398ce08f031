//! Tick Scheduler
//!
//! A FIFO buffer of callbacks to run after the current synchronous work.
//! The first callback of a burst arranges one drain; later ones just join
//! the buffer. How the drain happens depends on the configured
//! [`TickStrategy`].

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::config::{self, TickStrategy};
use crate::error::{report_error, ReactiveError};

type TickCallback = Box<dyn FnOnce() -> Result<(), ReactiveError>>;

#[derive(Default)]
struct TickQueue {
    callbacks: Vec<TickCallback>,
    /// A drain has been arranged and not started yet.
    pending: bool,
}

thread_local! {
    static TICKS: RefCell<TickQueue> = RefCell::new(TickQueue::default());
}

/// Run `callback` after the current synchronous work.
///
/// Errors it returns are reported with the info `nextTick`.
pub fn next_tick<F>(callback: F)
where
    F: FnOnce() -> Result<(), ReactiveError> + 'static,
{
    let schedule = TICKS.with(|t| {
        let mut t = t.borrow_mut();
        t.callbacks.push(Box::new(callback));
        !std::mem::replace(&mut t.pending, true)
    });
    if schedule {
        request_drain();
    }
}

fn request_drain() {
    match config::tick_strategy() {
        TickStrategy::Manual => {}
        TickStrategy::LocalTask => {
            tokio::task::spawn_local(async {
                tokio::task::yield_now().await;
                run_pending();
            });
        }
    }
}

/// Run the callbacks buffered so far, in FIFO order. Returns how many ran.
///
/// Callbacks queued while draining wait for the next drain, so a callback
/// that keeps rescheduling itself runs once per drain.
pub fn run_pending() -> usize {
    let batch = TICKS.with(|t| {
        let mut t = t.borrow_mut();
        t.pending = false;
        std::mem::take(&mut t.callbacks)
    });
    let ran = batch.len();
    for callback in batch {
        if let Err(err) = callback() {
            report_error(&err, "nextTick");
        }
    }
    if ran > 0 {
        tracing::trace!(ran, "tick drained");
    }
    ran
}

/// Whether callbacks are waiting for a drain.
pub fn is_tick_pending() -> bool {
    TICKS.with(|t| !t.borrow().callbacks.is_empty())
}

/// Wait for the next drain of the callback buffer.
///
/// Everything queued before this call (in particular a pending flush) has
/// run by the time the future resolves.
pub fn tick() -> NextTick {
    let (tx, rx) = oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
        Ok(())
    });
    NextTick { rx }
}

/// Future returned by [`tick`].
///
/// With the `Manual` strategy nothing else drains the buffer, so polling
/// drains it until this future's own callback has run.
#[must_use = "futures do nothing unless awaited"]
pub struct NextTick {
    rx: oneshot::Receiver<()>,
}

impl Future for NextTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Pin::new(&mut self.rx).poll(cx).is_ready() {
            return Poll::Ready(());
        }
        if config::tick_strategy() == TickStrategy::Manual {
            loop {
                let ran = run_pending();
                if let Poll::Ready(_) = Pin::new(&mut self.rx).poll(cx) {
                    return Poll::Ready(());
                }
                if ran == 0 {
                    break;
                }
            }
        }
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}
