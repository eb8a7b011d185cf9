//! Sync Queue - Callbacks for the sync lane, drained from a microtask.
//!
//! Sync work does not go through the task queue. It is pushed here and the
//! queue is flushed from a microtask (or at the end of a passive effect flush).
//! Callbacks pushed while flushing run in the same flush.

use std::cell::{Cell, RefCell};

type SyncCallback = Box<dyn FnOnce()>;

#[derive(Default)]
pub(crate) struct SyncQueue {
    callbacks: RefCell<Vec<SyncCallback>>,
    flushing: Cell<bool>,
}

impl SyncQueue {
    pub fn push(&self, callback: SyncCallback) {
        self.callbacks.borrow_mut().push(callback);
    }

    /// Run every queued callback. Returns how many ran.
    ///
    /// A flush started from inside a callback is a no-op: the outer flush
    /// picks up whatever was pushed.
    pub fn flush(&self) -> usize {
        if self.flushing.replace(true) {
            return 0;
        }
        let mut ran = 0;
        loop {
            let batch = std::mem::take(&mut *self.callbacks.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for callback in batch {
                callback();
                ran += 1;
            }
        }
        self.flushing.set(false);
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_callbacks_pushed_during_flush_run() {
        let queue = Rc::new(SyncQueue::default());
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_queue = queue.clone();
        let inner_log = log.clone();
        queue.push(Box::new(move || {
            inner_log.borrow_mut().push(1);
            let nested_log = inner_log.clone();
            inner_queue.push(Box::new(move || nested_log.borrow_mut().push(2)));
            // Re-entrant flush defers to the outer one.
            assert_eq!(inner_queue.flush(), 0);
        }));

        assert_eq!(queue.flush(), 2);
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(queue.callbacks.borrow().len(), 0);
    }
}
