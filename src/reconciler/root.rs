//! Root - Mount point, scheduling state and the public entry points.
//!
//! A [`Root`] owns one output container and everything needed to keep it in
//! sync with a declarative tree:
//!
//! ```text
//! Root ──► RootInner
//!           ├── scheduling cells   pending / interleaved lanes, callback token + lane
//!           ├── root_queue         top-level updates (render / update_container)
//!           ├── tree               FiberRoot: arena, host adapter, current, session
//!           ├── passive            effects waiting for the passive flush
//!           └── sync_queue         sync-lane work drained from a microtask
//! ```
//!
//! Scheduled tasks, dispatchers and transition starters hold a `Weak` to the
//! inner record, so dropping the `Root` stops all further work.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = TestScheduler::new();
//! let host = MemoryHost::new();
//! let container = host.create_container();
//! let root = create_root(container, host.clone(), scheduler.clone());
//!
//! root.render(el("ul").child(el("li").key(1).text("one")));
//! scheduler.flush_all();
//! assert_eq!(host.render_to_string(container), "<ul><li>one</li></ul>");
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::commit_work::{CommitRecord, PendingPassiveEffects};
use super::sync_queue::SyncQueue;
use super::update_queue::{Action, QueueBase, SharedQueue, UpdateQueue};
use super::work_loop::FiberRoot;
use crate::element::Node;
use crate::error::FiberError;
use crate::fiber::{Fiber, FiberArena, FiberProps, FiberState, WorkTag};
use crate::host::{HostConfig, HostHandle};
use crate::lanes::{Lane, Lanes, NO_LANE, NO_LANES};
use crate::scheduler::{CallbackToken, HostScheduler, Priority, run_with_priority};

// =============================================================================
// Options
// =============================================================================

/// Callback invoked with every fatal render or commit error.
pub type ErrorHandler = Rc<dyn Fn(&FiberError)>;

/// Per-root configuration.
#[derive(Clone)]
pub struct RootOptions {
    /// Log development diagnostics (duplicate keys, unmounted dispatches, ...).
    pub diagnostics: bool,
    /// Called after a fatal error was logged and recorded.
    pub on_error: Option<ErrorHandler>,
}

impl Default for RootOptions {
    fn default() -> Self {
        Self {
            diagnostics: cfg!(debug_assertions),
            on_error: None,
        }
    }
}

impl fmt::Debug for RootOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootOptions")
            .field("diagnostics", &self.diagnostics)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// =============================================================================
// Root Record
// =============================================================================

pub(crate) struct RootInner {
    pub this: Weak<RootInner>,
    pub scheduler: Rc<dyn HostScheduler>,
    pub options: RootOptions,

    // Scheduling
    pub pending_lanes: Cell<Lanes>,
    /// Lanes dispatched while a render session was open.
    pub interleaved_lanes: Cell<Lanes>,
    pub render_in_progress: Cell<bool>,
    pub callback_node: Cell<Option<CallbackToken>>,
    pub callback_priority: Cell<Lane>,
    pub transition_depth: Cell<usize>,
    pub passive_scheduled: Cell<bool>,

    pub root_queue: SharedQueue<Node>,
    pub tree: RefCell<FiberRoot>,
    pub passive: RefCell<PendingPassiveEffects>,
    pub sync_queue: SyncQueue,
    pub errors: RefCell<Vec<FiberError>>,
    pub last_commit: RefCell<Option<CommitRecord>>,
}

impl RootInner {
    /// Lane for an update requested right now.
    pub fn request_update_lane(&self) -> Lane {
        if self.transition_depth.get() > 0 {
            return Lanes::TRANSITION;
        }
        crate::lanes::scheduler_priority_to_lane(self.scheduler.current_priority_level())
    }

    /// Run `scope` with every update it requests placed in the transition lane.
    pub fn with_transition(&self, scope: impl FnOnce()) {
        self.transition_depth.set(self.transition_depth.get() + 1);
        let _scope = TransitionScope(&self.transition_depth);
        scope();
    }

    /// Record a fatal error: log it, keep it for `take_errors`, notify.
    pub fn report_error(&self, err: FiberError) {
        tracing::error!(error = %err, "render aborted");
        self.errors.borrow_mut().push(err.clone());
        if let Some(on_error) = &self.options.on_error {
            on_error(&err);
        }
    }
}

/// Leaves the transition scope on drop, also when the scope unwinds.
struct TransitionScope<'a>(&'a Cell<usize>);

impl Drop for TransitionScope<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

// =============================================================================
// Public Handle
// =============================================================================

/// A mounted tree.
pub struct Root {
    inner: Rc<RootInner>,
}

/// Create a root rendering into `container` with default options.
pub fn create_root(container: HostHandle, host: impl HostConfig + 'static, scheduler: Rc<dyn HostScheduler>) -> Root {
    create_root_with_options(container, host, scheduler, RootOptions::default())
}

/// Create a root rendering into `container`.
pub fn create_root_with_options(
    container: HostHandle,
    host: impl HostConfig + 'static,
    scheduler: Rc<dyn HostScheduler>,
    options: RootOptions,
) -> Root {
    let mut arena = FiberArena::new();
    let mut host_root = Fiber::new(WorkTag::HostRoot, FiberProps::Empty, None);
    host_root.state_node = Some(container);
    host_root.memoized_state = FiberState::Root {
        base: QueueBase::new(Node::Empty),
    };
    let current = arena.alloc(host_root);

    let inner = Rc::new_cyclic(|this| RootInner {
        this: this.clone(),
        scheduler,
        options,
        pending_lanes: Cell::new(NO_LANES),
        interleaved_lanes: Cell::new(NO_LANES),
        render_in_progress: Cell::new(false),
        callback_node: Cell::new(None),
        callback_priority: Cell::new(NO_LANE),
        transition_depth: Cell::new(0),
        passive_scheduled: Cell::new(false),
        root_queue: UpdateQueue::shared(),
        tree: RefCell::new(FiberRoot::new(arena, Box::new(host), container, current)),
        passive: RefCell::new(PendingPassiveEffects::default()),
        sync_queue: SyncQueue::default(),
        errors: RefCell::new(Vec::new()),
        last_commit: RefCell::new(None),
    });
    tracing::debug!(container = %container, "root created");
    Root { inner }
}

impl Root {
    /// Render `node` into the container at the sync lane.
    pub fn render(&self, node: impl Into<Node>) {
        let inner = &self.inner;
        let lane = run_with_priority(inner.scheduler.as_ref(), Priority::Immediate, || inner.request_update_lane())
            .unwrap_or(Lanes::SYNC);
        self.update_container(node, lane);
    }

    /// Render `node` into the container at `lane`.
    pub fn update_container(&self, node: impl Into<Node>, lane: Lane) {
        self.inner.root_queue.borrow_mut().enqueue(Action::Replace(node.into()), lane);
        self.inner.schedule_update_on_fiber(lane);
    }

    /// Remove everything rendered into the container.
    pub fn unmount(&self) {
        self.render(Node::Empty);
    }

    /// Run `scope` so that the updates it requests land in the transition lane.
    pub fn start_transition(&self, scope: impl FnOnce()) {
        self.inner.with_transition(scope);
    }

    /// Lanes with unprocessed updates.
    pub fn pending_lanes(&self) -> Lanes {
        self.inner.pending_lanes.get()
    }

    /// Fatal errors recorded since the last call.
    pub fn take_errors(&self) -> Vec<FiberError> {
        std::mem::take(&mut *self.inner.errors.borrow_mut())
    }

    /// What the most recent commit applied.
    pub fn last_commit(&self) -> Option<CommitRecord> {
        self.inner.last_commit.borrow().clone()
    }

    pub fn container(&self) -> HostHandle {
        self.inner.tree.borrow().container
    }

    /// Live fibers across both generations.
    pub fn fiber_count(&self) -> usize {
        self.inner.tree.borrow().arena.len()
    }

    /// True while a render pass is open (started but not committed).
    pub fn is_rendering(&self) -> bool {
        self.inner.render_in_progress.get()
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("pending_lanes", &self.inner.pending_lanes.get())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
