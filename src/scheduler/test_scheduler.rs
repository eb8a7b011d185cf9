//! Deterministic scheduler for tests and demos.
//!
//! Tasks are ordered by priority and then by scheduling order. Nothing runs
//! until the owner pumps the queue with [`TestScheduler::run_next_task`] or
//! [`TestScheduler::flush_all`], so every interleaving is reproducible.
//!
//! Time slicing is simulated in units of work: with `set_yield_after(Some(n))`
//! `should_yield()` answers `false` for the first `n` checks of each slice.
//! Starvation is simulated in slices: with `set_timeout_after(Some(n))` a task
//! that already ran `n` slices is resumed with `did_timeout = true`.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::{CallbackToken, HostScheduler, Microtask, Priority, Task, TaskStatus};

/// Guard against tasks that keep rescheduling themselves forever.
const MAX_FLUSH_STEPS: usize = 10_000;

struct SchedulerState {
    tasks: BTreeMap<(Priority, u64), Task>,
    priorities: BTreeMap<u64, Priority>,
    microtasks: VecDeque<Microtask>,
    next_id: u64,
    current_priority: Priority,
    yield_after: Option<usize>,
    units_in_slice: usize,
    timeout_after: Option<usize>,
    /// Slices already run per task, keyed by task id.
    slices_run: HashMap<u64, usize>,
    running: Option<CallbackToken>,
    cancelled_running: HashSet<CallbackToken>,
}

/// In-process [`HostScheduler`] with manual pumping.
pub struct TestScheduler {
    state: RefCell<SchedulerState>,
}

impl TestScheduler {
    /// Create a scheduler with no time slicing.
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(SchedulerState {
                tasks: BTreeMap::new(),
                priorities: BTreeMap::new(),
                microtasks: VecDeque::new(),
                next_id: 1,
                current_priority: Priority::Normal,
                yield_after: None,
                units_in_slice: 0,
                timeout_after: None,
                slices_run: HashMap::new(),
                running: None,
                cancelled_running: HashSet::new(),
            }),
        })
    }

    /// Yield after `units` `should_yield` checks per task slice. `None` never yields.
    pub fn set_yield_after(&self, units: Option<usize>) {
        self.state.borrow_mut().yield_after = units;
    }

    /// Mark a task as timed out once it already ran `slices` slices. `None` never times out.
    pub fn set_timeout_after(&self, slices: Option<usize>) {
        self.state.borrow_mut().timeout_after = slices;
    }

    /// Number of tasks waiting in the queue.
    pub fn pending_task_count(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    /// True if any task or microtask is waiting.
    pub fn has_pending_work(&self) -> bool {
        let state = self.state.borrow();
        !state.tasks.is_empty() || !state.microtasks.is_empty()
    }

    /// Priorities of queued tasks, most urgent first.
    pub fn queued_priorities(&self) -> Vec<Priority> {
        self.state.borrow().tasks.keys().map(|(p, _)| *p).collect()
    }

    /// Run every queued microtask, including ones queued while flushing.
    pub fn flush_microtasks(&self) {
        loop {
            let next = self.state.borrow_mut().microtasks.pop_front();
            match next {
                Some(microtask) => microtask(),
                None => break,
            }
        }
    }

    /// Run microtasks, then one slice of the most urgent task, then microtasks.
    ///
    /// Returns false when there was no task to run.
    pub fn run_next_task(&self) -> bool {
        self.flush_microtasks();

        let next = {
            let mut state = self.state.borrow_mut();
            let key = state.tasks.keys().next().copied();
            key.and_then(|key| {
                let task = state.tasks.remove(&key)?;
                state.priorities.remove(&key.1);
                Some((key, task))
            })
        };
        let Some(((priority, id), task)) = next else {
            return false;
        };

        let token = CallbackToken(id);
        let (previous_priority, did_timeout) = {
            let mut state = self.state.borrow_mut();
            state.running = Some(token);
            state.units_in_slice = 0;
            let ran = state.slices_run.get(&id).copied().unwrap_or(0);
            let did_timeout = state.timeout_after.is_some_and(|limit| ran >= limit);
            let previous = std::mem::replace(&mut state.current_priority, priority);
            (previous, did_timeout)
        };
        if did_timeout {
            tracing::trace!(id, "task resumed after timeout");
        }

        let status = task.run(did_timeout);

        {
            let mut state = self.state.borrow_mut();
            state.running = None;
            state.current_priority = previous_priority;
            let cancelled = state.cancelled_running.remove(&token);
            match status {
                TaskStatus::Continue(continuation) if !cancelled => {
                    state.tasks.insert((priority, id), continuation);
                    state.priorities.insert(id, priority);
                    *state.slices_run.entry(id).or_default() += 1;
                }
                _ => {
                    state.slices_run.remove(&id);
                }
            }
        }

        self.flush_microtasks();
        true
    }

    /// Run until no task or microtask remains.
    pub fn flush_all(&self) {
        let mut steps = 0;
        while self.has_pending_work() {
            self.flush_microtasks();
            if !self.run_next_task() {
                continue;
            }
            steps += 1;
            if steps > MAX_FLUSH_STEPS {
                tracing::error!(steps, "test scheduler did not settle");
                break;
            }
        }
    }
}

impl HostScheduler for TestScheduler {
    fn schedule_callback(&self, priority: Priority, task: Task) -> CallbackToken {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.tasks.insert((priority, id), task);
        state.priorities.insert(id, priority);
        tracing::trace!(id, ?priority, "task scheduled");
        CallbackToken(id)
    }

    fn cancel_callback(&self, token: CallbackToken) {
        let mut state = self.state.borrow_mut();
        if state.running == Some(token) {
            state.cancelled_running.insert(token);
            return;
        }
        if let Some(priority) = state.priorities.remove(&token.0) {
            state.tasks.remove(&(priority, token.0));
            state.slices_run.remove(&token.0);
            tracing::trace!(id = token.0, "task cancelled");
        }
    }

    fn should_yield(&self) -> bool {
        let mut state = self.state.borrow_mut();
        match state.yield_after {
            Some(limit) if state.units_in_slice >= limit => true,
            Some(_) => {
                state.units_in_slice += 1;
                false
            }
            None => false,
        }
    }

    fn current_priority_level(&self) -> Priority {
        self.state.borrow().current_priority
    }

    fn run_with_priority(&self, priority: Priority, scope: &mut dyn FnMut()) {
        let previous = std::mem::replace(&mut self.state.borrow_mut().current_priority, priority);
        scope();
        self.state.borrow_mut().current_priority = previous;
    }

    fn schedule_microtask(&self, microtask: Microtask) {
        self.state.borrow_mut().microtasks.push_back(microtask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn record(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Task {
        let log = log.clone();
        Task::new(move |_| {
            log.borrow_mut().push(name);
            TaskStatus::Done
        })
    }

    #[test]
    fn test_runs_by_priority_then_order() {
        let scheduler = TestScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.schedule_callback(Priority::Low, record(&log, "low"));
        scheduler.schedule_callback(Priority::Normal, record(&log, "normal-1"));
        scheduler.schedule_callback(Priority::Immediate, record(&log, "immediate"));
        scheduler.schedule_callback(Priority::Normal, record(&log, "normal-2"));

        scheduler.flush_all();
        assert_eq!(*log.borrow(), vec!["immediate", "normal-1", "normal-2", "low"]);
    }

    #[test]
    fn test_cancel_removes_queued_task() {
        let scheduler = TestScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let token = scheduler.schedule_callback(Priority::Normal, record(&log, "cancelled"));
        scheduler.schedule_callback(Priority::Normal, record(&log, "kept"));
        scheduler.cancel_callback(token);

        scheduler.flush_all();
        assert_eq!(*log.borrow(), vec!["kept"]);
    }

    #[test]
    fn test_continuation_keeps_token_and_runs_again() {
        let scheduler = TestScheduler::new();
        let runs = Rc::new(RefCell::new(0));

        let runs_clone = runs.clone();
        let runs_inner = runs.clone();
        scheduler.schedule_callback(
            Priority::Normal,
            Task::new(move |_| {
                *runs_clone.borrow_mut() += 1;
                TaskStatus::Continue(Task::new(move |_| {
                    *runs_inner.borrow_mut() += 1;
                    TaskStatus::Done
                }))
            }),
        );

        assert!(scheduler.run_next_task());
        assert_eq!(*runs.borrow(), 1);
        assert_eq!(scheduler.pending_task_count(), 1);
        assert!(scheduler.run_next_task());
        assert_eq!(*runs.borrow(), 2);
        assert!(!scheduler.run_next_task());
    }

    #[test]
    fn test_yield_budget_per_slice() {
        let scheduler = TestScheduler::new();
        scheduler.set_yield_after(Some(2));
        assert!(!scheduler.should_yield());
        assert!(!scheduler.should_yield());
        assert!(scheduler.should_yield());
    }

    #[test]
    fn test_continuation_times_out_after_slice_limit() {
        let scheduler = TestScheduler::new();
        scheduler.set_timeout_after(Some(2));
        let seen = Rc::new(RefCell::new(Vec::new()));

        fn step(seen: Rc<RefCell<Vec<bool>>>) -> Task {
            Task::new(move |did_timeout| {
                seen.borrow_mut().push(did_timeout);
                if did_timeout {
                    TaskStatus::Done
                } else {
                    TaskStatus::Continue(step(seen.clone()))
                }
            })
        }
        scheduler.schedule_callback(Priority::Normal, step(seen.clone()));

        scheduler.flush_all();
        assert_eq!(*seen.borrow(), vec![false, false, true]);
        assert_eq!(scheduler.pending_task_count(), 0);
    }

    #[test]
    fn test_microtasks_run_before_tasks() {
        let scheduler = TestScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.schedule_callback(Priority::Immediate, record(&log, "task"));
        let log_clone = log.clone();
        scheduler.schedule_microtask(Box::new(move || log_clone.borrow_mut().push("micro")));

        scheduler.flush_all();
        assert_eq!(*log.borrow(), vec!["micro", "task"]);
    }

    #[test]
    fn test_run_with_priority_restores_level() {
        let scheduler = TestScheduler::new();
        let mut seen = None;
        scheduler.run_with_priority(Priority::UserBlocking, &mut || {
            seen = Some(scheduler.current_priority_level());
        });
        assert_eq!(seen, Some(Priority::UserBlocking));
        assert_eq!(scheduler.current_priority_level(), Priority::Normal);
    }
}
