//! Host Scheduler - The cooperative task runner the work loop sits on.
//!
//! The reconciler never decides on its own when to run. It hands callbacks to
//! a [`HostScheduler`] at a [`Priority`], asks it [`HostScheduler::should_yield`]
//! between units of work, and returns a continuation when a render pass was
//! cut short.
//!
//! - [`HostScheduler`] - The contract (priority queue + cooperative yielding)
//! - [`TestScheduler`] - Deterministic in-process implementation used by tests and demos
//!
//! # Continuations
//!
//! A [`Task`] returns [`TaskStatus::Continue`] to ask the scheduler to run the
//! same callback again later. The callback keeps its [`CallbackToken`], which is
//! how the work loop recognizes that no other task superseded it.

mod test_scheduler;

pub use test_scheduler::TestScheduler;

// =============================================================================
// Priority
// =============================================================================

/// Scheduler priority levels, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Immediate,
    UserBlocking,
    #[default]
    Normal,
    Low,
    Idle,
}

// =============================================================================
// Tasks
// =============================================================================

/// Opaque identifier of a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackToken(pub u64);

/// Outcome of running a task slice.
pub enum TaskStatus {
    /// The task finished.
    Done,
    /// Run this continuation later under the same token.
    Continue(Task),
}

/// A scheduled callback. Receives `did_timeout`.
pub struct Task(Box<dyn FnOnce(bool) -> TaskStatus>);

impl Task {
    /// Wrap a closure as a task.
    pub fn new(callback: impl FnOnce(bool) -> TaskStatus + 'static) -> Self {
        Self(Box::new(callback))
    }

    /// Run the task once.
    pub fn run(self, did_timeout: bool) -> TaskStatus {
        (self.0)(did_timeout)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Task(..)")
    }
}

/// A callback queued to run before the next task.
pub type Microtask = Box<dyn FnOnce()>;

// =============================================================================
// Host Scheduler Contract
// =============================================================================

/// The capabilities the reconciler needs from its host environment.
///
/// Implementations must not hold internal borrows while running callbacks:
/// tasks routinely schedule or cancel other tasks from inside their body.
pub trait HostScheduler {
    /// Queue `task` at `priority`.
    fn schedule_callback(&self, priority: Priority, task: Task) -> CallbackToken;

    /// Drop a queued task. Cancelling a running task drops its continuation.
    fn cancel_callback(&self, token: CallbackToken);

    /// True when the current time slice is exhausted.
    fn should_yield(&self) -> bool;

    /// Priority of the task or scope currently running.
    fn current_priority_level(&self) -> Priority;

    /// Run `scope` with the current priority level set to `priority`.
    fn run_with_priority(&self, priority: Priority, scope: &mut dyn FnMut());

    /// Queue a callback that runs before any further task.
    fn schedule_microtask(&self, microtask: Microtask);
}

/// Run a closure at a priority and return its value.
pub fn run_with_priority<S, R>(scheduler: &S, priority: Priority, scope: impl FnOnce() -> R) -> Option<R>
where
    S: HostScheduler + ?Sized,
{
    let mut scope = Some(scope);
    let mut result = None;
    scheduler.run_with_priority(priority, &mut || {
        if let Some(scope) = scope.take() {
            result = Some(scope());
        }
    });
    result
}
