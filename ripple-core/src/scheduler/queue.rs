//! Scheduler Queue
//!
//! Batches notified subscribers and re-runs them in id order.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::tick::next_tick;
use crate::config;
use crate::error::{warn, ReactiveError};
use crate::reactive::{Reactive, SubscriberId};

#[derive(Default)]
struct QueueState {
    /// Subscribers waiting to run, sorted by id once flushing starts.
    queue: Vec<Rc<dyn Reactive>>,
    /// Ids currently in `queue` and not yet run.
    has: HashSet<SubscriberId>,
    /// Re-queues per subscriber within this flush.
    circular: HashMap<SubscriberId, usize>,
    /// Subscribers cut off by the loop guard for the rest of this flush.
    dropped: HashSet<SubscriberId>,
    /// A flush has been requested and not finished yet.
    waiting: bool,
    flushing: bool,
    /// Position of the subscriber currently running.
    index: usize,
}

thread_local! {
    static QUEUE: RefCell<QueueState> = RefCell::new(QueueState::default());
}

/// Queue `subscriber` for the next flush.
///
/// Without async mode the first enqueue flushes right away, and its result is
/// returned.
pub fn enqueue(subscriber: Rc<dyn Reactive>) -> Result<(), ReactiveError> {
    let id = subscriber.subscriber_id();
    let request_flush = QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        if q.has.contains(&id) || q.dropped.contains(&id) {
            return false;
        }
        q.has.insert(id);

        if q.flushing {
            // Keep the unprocessed tail sorted.
            let mut at = q.queue.len();
            while at > q.index + 1 && q.queue[at - 1].subscriber_id() > id {
                at -= 1;
            }
            q.queue.insert(at, subscriber);
        } else {
            q.queue.push(subscriber);
        }

        !std::mem::replace(&mut q.waiting, true)
    });

    if !request_flush {
        return Ok(());
    }
    if !config::is_async() {
        return flush();
    }
    next_tick(flush);
    Ok(())
}

/// Drain the queue.
///
/// A subscriber whose run fails does not stop the rest of the queue. The
/// first error is returned once the queue has drained and been reset.
pub fn flush() -> Result<(), ReactiveError> {
    let max_updates = config::max_update_count();
    QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        q.flushing = true;
        q.index = 0;
        q.queue.sort_by_key(|s| s.subscriber_id());
    });

    let mut ran = 0usize;
    let mut first_error = None;
    loop {
        let next = QUEUE.with(|q| {
            let mut q = q.borrow_mut();
            let next = q.queue.get(q.index).cloned();
            if let Some(subscriber) = &next {
                q.has.remove(&subscriber.subscriber_id());
            }
            next
        });
        let Some(subscriber) = next else {
            break;
        };
        let id = subscriber.subscriber_id();

        subscriber.before_run();
        match subscriber.run() {
            Ok(()) => ran += 1,
            Err(err) => {
                tracing::debug!(subscriber = %subscriber.description(), "run failed during flush");
                first_error.get_or_insert(err);
            }
        }

        let tripped = QUEUE.with(|q| {
            let mut q = q.borrow_mut();
            let mut tripped = false;
            if q.has.contains(&id) {
                let count = q.circular.entry(id).or_insert(0);
                *count += 1;
                if *count > max_updates {
                    q.has.remove(&id);
                    q.dropped.insert(id);
                    let tail = q.index + 1;
                    if let Some(pos) = q.queue[tail..].iter().position(|s| s.subscriber_id() == id) {
                        q.queue.remove(tail + pos);
                    }
                    tripped = true;
                }
            }
            q.index += 1;
            tripped
        });

        if tripped {
            warn(&format!(
                "You may have an infinite update loop in watcher with expression \"{}\"",
                subscriber.description()
            ));
        }
    }

    let processed = reset();
    tracing::debug!(ran, queued = processed.len(), ok = first_error.is_none(), "flush complete");
    first_error.map_or(Ok(()), Err)
}

/// Reset the queue, handing back its contents so they are dropped outside
/// the borrow.
fn reset() -> Vec<Rc<dyn Reactive>> {
    QUEUE.with(|q| {
        let mut q = q.borrow_mut();
        q.has.clear();
        q.circular.clear();
        q.dropped.clear();
        q.waiting = false;
        q.flushing = false;
        q.index = 0;
        std::mem::take(&mut q.queue)
    })
}

/// Number of subscribers waiting in the queue.
pub fn queued_count() -> usize {
    QUEUE.with(|q| q.borrow().has.len())
}

pub fn is_flushing() -> bool {
    QUEUE.with(|q| q.borrow().flushing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::run_pending;
    use std::cell::{Cell, RefCell};

    /// Runs `body` on every run and records its id in `log`.
    struct FakeSubscriber {
        id: SubscriberId,
        log: Rc<RefCell<Vec<SubscriberId>>>,
        body: Box<dyn Fn(&FakeSubscriber) -> Result<(), ReactiveError>>,
        before: Cell<usize>,
    }

    impl FakeSubscriber {
        fn new(
            log: &Rc<RefCell<Vec<SubscriberId>>>,
            body: impl Fn(&FakeSubscriber) -> Result<(), ReactiveError> + 'static,
        ) -> Rc<Self> {
            Rc::new(Self {
                id: SubscriberId::new(),
                log: log.clone(),
                body: Box::new(body),
                before: Cell::new(0),
            })
        }
    }

    impl Reactive for FakeSubscriber {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn update(self: Rc<Self>) -> Result<(), ReactiveError> {
            enqueue(self)
        }

        fn run(&self) -> Result<(), ReactiveError> {
            self.log.borrow_mut().push(self.id);
            (self.body)(self)
        }

        fn before_run(&self) {
            self.before.set(self.before.get() + 1);
        }

        fn description(&self) -> String {
            format!("fake {}", self.id.raw())
        }
    }

    fn log() -> Rc<RefCell<Vec<SubscriberId>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn enqueue_is_idempotent_within_a_burst() {
        let log = log();
        let subscriber = FakeSubscriber::new(&log, |_| Ok(()));
        enqueue(subscriber.clone()).unwrap();
        enqueue(subscriber.clone()).unwrap();
        assert_eq!(queued_count(), 1);

        assert_eq!(run_pending(), 1);
        assert_eq!(*log.borrow(), vec![subscriber.id]);
        assert_eq!(subscriber.before.get(), 1);
        assert_eq!(queued_count(), 0);
    }

    #[test]
    fn flush_runs_in_id_order() {
        let log = log();
        let first = FakeSubscriber::new(&log, |_| Ok(()));
        let second = FakeSubscriber::new(&log, |_| Ok(()));
        let third = FakeSubscriber::new(&log, |_| Ok(()));

        enqueue(third.clone()).unwrap();
        enqueue(first.clone()).unwrap();
        enqueue(second.clone()).unwrap();
        run_pending();

        assert_eq!(*log.borrow(), vec![first.id, second.id, third.id]);
    }

    #[test]
    fn cascades_run_in_the_same_flush_in_id_order() {
        let log = log();
        let late = FakeSubscriber::new(&log, |_| Ok(()));
        let middle = FakeSubscriber::new(&log, |_| Ok(()));
        let (l, m) = (late.clone(), middle.clone());
        let trigger = FakeSubscriber::new(&log, move |_| {
            enqueue(l.clone())?;
            enqueue(m.clone())
        });

        enqueue(trigger.clone()).unwrap();
        run_pending();

        // Queued mid-flush: placed after the running subscriber, sorted.
        assert_eq!(*log.borrow(), vec![trigger.id, late.id, middle.id]);
    }

    #[test]
    fn loop_guard_drops_only_the_offender() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let w = warnings.clone();
        config::configure(|c| {
            c.max_update_count = 5;
            c.warn_handler = Some(Rc::new(move |m: &str| w.borrow_mut().push(m.to_owned())));
        });

        let log = log();
        let runaway: Rc<RefCell<Option<Rc<FakeSubscriber>>>> = Rc::new(RefCell::new(None));
        let r = runaway.clone();
        let looping = FakeSubscriber::new(&log, move |_| {
            let me = r.borrow().clone();
            match me {
                Some(me) => enqueue(me),
                None => Ok(()),
            }
        });
        *runaway.borrow_mut() = Some(looping.clone());
        let bystander = FakeSubscriber::new(&log, |_| Ok(()));

        enqueue(looping.clone()).unwrap();
        enqueue(bystander.clone()).unwrap();
        run_pending();

        let runs = log.borrow().iter().filter(|id| **id == looping.id).count();
        assert_eq!(runs, 6);
        assert!(log.borrow().contains(&bystander.id));
        assert_eq!(warnings.borrow().len(), 1);
        assert!(warnings.borrow()[0].contains("infinite update loop"));
        assert!(!is_flushing());

        // Break the cycle so it can be dropped.
        runaway.borrow_mut().take();
    }

    #[test]
    fn run_errors_reset_the_queue() {
        config::configure(|c| c.async_mode = false);
        let log = log();
        let failing = FakeSubscriber::new(&log, |_| Err(ReactiveError::msg("render failed")));

        let err = enqueue(failing.clone()).unwrap_err();
        assert_eq!(err.to_string(), "render failed");
        assert!(!is_flushing());
        assert_eq!(queued_count(), 0);

        // The queue accepts work again.
        let ok = FakeSubscriber::new(&log, |_| Ok(()));
        enqueue(ok.clone()).unwrap();
        assert_eq!(log.borrow().last(), Some(&ok.id));
    }

    #[test]
    fn failed_run_does_not_cancel_the_rest_of_the_flush() {
        let log = log();
        let failing = FakeSubscriber::new(&log, |_| Err(ReactiveError::msg("first")));
        let also_failing = FakeSubscriber::new(&log, |_| Err(ReactiveError::msg("second")));
        let healthy = FakeSubscriber::new(&log, |_| Ok(()));

        enqueue(healthy.clone()).unwrap();
        enqueue(also_failing.clone()).unwrap();
        enqueue(failing.clone()).unwrap();

        let err = flush().unwrap_err();
        assert_eq!(err.to_string(), "first");
        assert_eq!(*log.borrow(), vec![failing.id, also_failing.id, healthy.id]);
        assert!(!is_flushing());
        assert_eq!(queued_count(), 0);
    }

    #[test]
    fn sync_mode_flushes_on_first_enqueue() {
        config::configure(|c| c.async_mode = false);
        let log = log();
        let subscriber = FakeSubscriber::new(&log, |_| Ok(()));
        enqueue(subscriber.clone()).unwrap();
        assert_eq!(*log.borrow(), vec![subscriber.id]);
        assert_eq!(run_pending(), 0);
    }
}
