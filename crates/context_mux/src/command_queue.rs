//! # Command Queue
//!
//! Thread-safe FIFO of deferred actions destined for one window's render
//! thread. Any thread may enqueue; only the owning render thread drains.
//!
//! ## Semantics
//!
//! - `enqueue` appends under a short lock and never waits on execution
//! - `drain` swaps the pending list out, then runs it in insertion order with
//!   the lock released, so actions may enqueue follow-up work for the next drain
//! - A panicking action is caught and logged; the remaining actions still run
//! - The queue is unbounded; producers are paced by frame cadence and
//!   `depth` exists for observability only

use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use crate::foundation::panic::panic_message;
use crate::foundation::sync::lock;

/// A deferred zero-argument action
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Per-window FIFO of deferred actions
#[derive(Default)]
pub struct CommandQueue {
    pending: Mutex<Vec<Action>>,
}

impl CommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action; returns immediately
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue_boxed(Box::new(action));
    }

    /// Append an already boxed action
    pub fn enqueue_boxed(&self, action: Action) {
        lock(&self.pending).push(action);
    }

    /// Run every pending action in insertion order
    ///
    /// Returns the number of actions executed, including ones that panicked.
    /// Must only be called from the owning render thread.
    pub fn drain(&self) -> usize {
        let actions = std::mem::take(&mut *lock(&self.pending));
        let count = actions.len();

        for action in actions {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
                log::error!(
                    "Queued command panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }

        count
    }

    /// Discard pending actions without running them
    ///
    /// Returns how many actions were dropped.
    pub fn clear(&self) -> usize {
        let discarded = std::mem::take(&mut *lock(&self.pending));
        discarded.len()
    }

    /// Number of pending actions
    pub fn depth(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Check if no actions are pending
    pub fn is_empty(&self) -> bool {
        lock(&self.pending).is_empty()
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_drain_runs_in_insertion_order() {
        let queue = CommandQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let log = Arc::clone(&log);
            queue.enqueue(move || log.lock().unwrap().push(i));
        }

        assert_eq!(queue.depth(), 5);
        assert_eq!(queue.drain(), 5);
        assert!(queue.is_empty());
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_panicking_action_does_not_stop_drain() {
        let queue = CommandQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let before = Arc::clone(&ran);
        queue.enqueue(move || {
            before.fetch_add(1, Ordering::SeqCst);
        });
        queue.enqueue(|| panic!("bad command"));
        let after = Arc::clone(&ran);
        queue.enqueue(move || {
            after.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(queue.drain(), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_discards_without_running() {
        let queue = CommandQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            queue.enqueue(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(queue.clear(), 3);
        assert_eq!(queue.drain(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_action_enqueued_during_drain_runs_next_drain() {
        let queue = Arc::new(CommandQueue::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let inner_queue = Arc::clone(&queue);
        let inner_ran = Arc::clone(&ran);
        queue.enqueue(move || {
            let ran = Arc::clone(&inner_ran);
            inner_queue.enqueue(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(queue.drain(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(queue.depth(), 1);
        assert_eq!(queue.drain(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_producers_execute_exactly_once() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 500;

        let queue = Arc::new(CommandQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..PER_PRODUCER {
                        let counter = Arc::clone(&counter);
                        queue.enqueue(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        let mut executed = 0;
        while producers.iter().any(|p| !p.is_finished()) {
            executed += queue.drain();
        }
        for producer in producers {
            producer.join().unwrap();
        }
        executed += queue.drain();

        assert_eq!(executed, PRODUCERS * PER_PRODUCER);
        assert_eq!(counter.load(Ordering::SeqCst), PRODUCERS * PER_PRODUCER);
        assert!(queue.is_empty());
    }
}
