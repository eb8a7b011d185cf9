//! Work Loop - Scheduling, rendering and committing a root.
//!
//! ```text
//! dispatch ─► schedule_update_on_fiber ─► ensure_root_is_scheduled
//!                                          │ sync lane: sync queue + microtask
//!                                          │ other:     scheduler task at lane priority
//!                                          ▼
//!                       perform_{sync,concurrent}_work_on_root
//!                                          │
//!                        render_root ──────┤ Incomplete: continue the same task
//!                        (unit by unit)    │ Errored:    abandon, report, reschedule
//!                                          ▼ Completed
//!                                     commit_root ─► passive flush task (Normal)
//! ```
//!
//! Nothing here holds the `tree` borrow across a call into user code other
//! than component render functions. Dispatchers, effects and error callbacks
//! only ever see the scheduling cells, so they can run at any point.

use std::rc::Weak;

use super::begin_work::begin_work;
use super::commit_work::Committer;
use super::complete_work::complete_work;
use super::context::ContextStack;
use super::root::RootInner;
use crate::error::Result;
use crate::fiber::{FiberArena, FiberId, FiberProps, create_work_in_progress};
use crate::host::{HostConfig, HostHandle};
use crate::lanes::{Lane, Lanes, NO_LANE, NO_LANES, lanes_to_scheduler_priority};
use crate::scheduler::{Priority, Task, TaskStatus};

// =============================================================================
// Root Tree State
// =============================================================================

/// State of one render pass, alive until it commits or is abandoned.
pub(crate) struct RenderSession {
    /// Next unit of work. `None` once the pass completed.
    pub wip: Option<FiberId>,
    pub wip_root: FiberId,
    pub render_lane: Lane,
    pub contexts: ContextStack,
}

/// Fibers and host adapter of a root.
pub(crate) struct FiberRoot {
    pub arena: FiberArena,
    pub host: Box<dyn HostConfig>,
    pub container: HostHandle,
    /// Committed host root fiber.
    pub current: FiberId,
    pub finished_work: Option<FiberId>,
    pub finished_lane: Lane,
    pub session: Option<RenderSession>,
}

impl FiberRoot {
    pub fn new(arena: FiberArena, host: Box<dyn HostConfig>, container: HostHandle, current: FiberId) -> Self {
        Self {
            arena,
            host,
            container,
            current,
            finished_work: None,
            finished_lane: NO_LANE,
            session: None,
        }
    }

    /// Drop the open render pass and every fiber it allocated.
    fn abandon_session(&mut self) {
        if let Some(session) = self.session.take() {
            let released = self.arena.release_fresh();
            tracing::debug!(lane = session.render_lane.name(), released, "render pass abandoned");
        }
        self.finished_work = None;
    }
}

enum RootStatus {
    Incomplete,
    Completed,
    Errored,
}

fn concurrent_task(root: Weak<RootInner>) -> Task {
    Task::new(move |did_timeout| match root.upgrade() {
        Some(root) => root.perform_concurrent_work_on_root(did_timeout),
        None => TaskStatus::Done,
    })
}

fn perform_unit_of_work(
    root: &RootInner,
    arena: &mut FiberArena,
    host: &mut dyn HostConfig,
    session: &mut RenderSession,
    unit: FiberId,
) -> Result<Option<FiberId>> {
    tracing::trace!(fiber = unit.0, label = %arena[unit].label(), "begin work");
    let next = begin_work(root, arena, session, unit)?;
    let fiber = &mut arena[unit];
    fiber.memoized_props = fiber.pending_props.clone();
    match next {
        Some(child) => Ok(Some(child)),
        None => complete_unit_of_work(root, arena, host, session, unit),
    }
}

/// Complete `unit` and its ancestors until one has a sibling left to begin.
fn complete_unit_of_work(
    root: &RootInner,
    arena: &mut FiberArena,
    host: &mut dyn HostConfig,
    session: &mut RenderSession,
    unit: FiberId,
) -> Result<Option<FiberId>> {
    let mut completed = unit;
    loop {
        complete_work(arena, host, session, completed, root.options.diagnostics)?;
        if completed == session.wip_root {
            return Ok(None);
        }
        if let Some(sibling) = arena[completed].sibling {
            return Ok(Some(sibling));
        }
        match arena[completed].parent {
            Some(parent) => completed = parent,
            None => return Ok(None),
        }
    }
}

// =============================================================================
// Scheduling
// =============================================================================

impl RootInner {
    /// Record `lane` as pending and make sure a callback will service it.
    ///
    /// State queues belong to exactly one root, so there is no tree to walk.
    pub fn schedule_update_on_fiber(&self, lane: Lane) {
        self.pending_lanes.set(self.pending_lanes.get() | lane);
        if self.render_in_progress.get() {
            self.interleaved_lanes.set(self.interleaved_lanes.get() | lane);
        }
        self.ensure_root_is_scheduled();
    }

    pub fn ensure_root_is_scheduled(&self) {
        let next_lane = self.pending_lanes.get().highest_priority();
        let existing = self.callback_node.get();

        if next_lane.is_empty() {
            if let Some(token) = existing {
                self.scheduler.cancel_callback(token);
            }
            self.callback_node.set(None);
            self.callback_priority.set(NO_LANE);
            return;
        }

        if next_lane == self.callback_priority.get() {
            return;
        }
        if let Some(token) = existing {
            self.scheduler.cancel_callback(token);
        }

        if next_lane == Lanes::SYNC {
            let root = self.this.clone();
            self.sync_queue.push(Box::new(move || {
                if let Some(root) = root.upgrade() {
                    root.perform_sync_work_on_root();
                }
            }));
            let root = self.this.clone();
            self.scheduler.schedule_microtask(Box::new(move || {
                if let Some(root) = root.upgrade() {
                    root.sync_queue.flush();
                }
            }));
            self.callback_node.set(None);
        } else {
            let priority = lanes_to_scheduler_priority(next_lane);
            let token = self.scheduler.schedule_callback(priority, concurrent_task(self.this.clone()));
            self.callback_node.set(Some(token));
        }
        tracing::debug!(lane = next_lane.name(), "root scheduled");
        self.callback_priority.set(next_lane);
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    pub fn perform_concurrent_work_on_root(&self, did_timeout: bool) -> TaskStatus {
        let original = self.callback_node.get();
        let did_flush = self.flush_passive_effects(true);
        if did_flush && self.callback_node.get() != original {
            // The flush scheduled something more urgent.
            return TaskStatus::Done;
        }

        let lane = self.pending_lanes.get().highest_priority();
        if lane.is_empty() {
            return TaskStatus::Done;
        }

        let time_slice = lane != Lanes::SYNC && !did_timeout;
        match self.render_root(lane, time_slice) {
            RootStatus::Incomplete => {
                self.ensure_root_is_scheduled();
                if self.callback_node.get() == original {
                    TaskStatus::Continue(concurrent_task(self.this.clone()))
                } else {
                    TaskStatus::Done
                }
            }
            RootStatus::Completed => {
                self.commit_root();
                TaskStatus::Done
            }
            RootStatus::Errored => TaskStatus::Done,
        }
    }

    pub fn perform_sync_work_on_root(&self) {
        self.flush_passive_effects(false);

        let lane = self.pending_lanes.get().highest_priority();
        if lane != Lanes::SYNC {
            self.ensure_root_is_scheduled();
            return;
        }
        match self.render_root(lane, false) {
            RootStatus::Completed => self.commit_root(),
            RootStatus::Incomplete => self.ensure_root_is_scheduled(),
            RootStatus::Errored => {}
        }
    }

    // =========================================================================
    // Render
    // =========================================================================

    fn prepare_fresh_stack(&self, tree: &mut FiberRoot, lane: Lane) {
        tree.abandon_session();
        let wip_root = create_work_in_progress(&mut tree.arena, tree.current, FiberProps::Empty);
        tree.session = Some(RenderSession {
            wip: Some(wip_root),
            wip_root,
            render_lane: lane,
            contexts: ContextStack::default(),
        });
        self.interleaved_lanes.set(NO_LANES);
        self.render_in_progress.set(true);
        tracing::debug!(lane = lane.name(), "render pass started");
    }

    fn render_root(&self, lane: Lane, time_slice: bool) -> RootStatus {
        let result = {
            let mut tree = self.tree.borrow_mut();
            let resumable = tree.session.as_ref().is_some_and(|session| session.render_lane == lane);
            if !resumable {
                self.prepare_fresh_stack(&mut tree, lane);
            }
            self.work_loop(&mut tree, time_slice)
        };

        match result {
            Ok(true) => RootStatus::Completed,
            Ok(false) => RootStatus::Incomplete,
            Err(err) => {
                self.handle_render_error(lane, err);
                RootStatus::Errored
            }
        }
    }

    /// Perform units until the pass completes (`true`) or the slice ends (`false`).
    fn work_loop(&self, tree: &mut FiberRoot, time_slice: bool) -> Result<bool> {
        let FiberRoot {
            arena,
            host,
            session,
            finished_work,
            finished_lane,
            ..
        } = tree;
        let Some(session) = session.as_mut() else {
            return Ok(true);
        };

        while let Some(unit) = session.wip {
            if time_slice && self.scheduler.should_yield() {
                tracing::trace!(lane = session.render_lane.name(), "render pass yielded");
                return Ok(false);
            }
            session.wip = perform_unit_of_work(self, arena, host.as_mut(), session, unit)?;
        }

        *finished_work = Some(session.wip_root);
        *finished_lane = session.render_lane;
        Ok(true)
    }

    fn handle_render_error(&self, lane: Lane, err: crate::error::FiberError) {
        self.tree.borrow_mut().abandon_session();
        self.render_in_progress.set(false);

        // No retry: the lane stays clear until something new is dispatched.
        let remaining = (self.pending_lanes.get() - lane) | self.interleaved_lanes.replace(NO_LANES);
        self.pending_lanes.set(remaining);
        if let Some(token) = self.callback_node.take() {
            self.scheduler.cancel_callback(token);
        }
        self.callback_priority.set(NO_LANE);

        self.report_error(err);
        self.ensure_root_is_scheduled();
    }

    // =========================================================================
    // Commit
    // =========================================================================

    fn mark_root_finished(&self, lane: Lane) {
        let remaining = (self.pending_lanes.get() - lane) | self.interleaved_lanes.replace(NO_LANES);
        self.pending_lanes.set(remaining);
        self.render_in_progress.set(false);
    }

    fn commit_root(&self) {
        // Effects of an earlier commit run before this one mutates anything.
        if !self.passive.borrow().is_empty() {
            self.flush_passive_effects(false);
        }

        let (finished, lane) = {
            let mut tree = self.tree.borrow_mut();
            match tree.finished_work.take() {
                Some(finished) => (finished, tree.finished_lane),
                None => return,
            }
        };
        self.mark_root_finished(lane);
        if let Some(token) = self.callback_node.take() {
            self.scheduler.cancel_callback(token);
        }
        self.callback_priority.set(NO_LANE);

        let (record, result) = {
            let mut tree = self.tree.borrow_mut();
            let mut passive = self.passive.borrow_mut();
            let tree = &mut *tree;
            let mut committer = Committer::new(&mut tree.arena, tree.host.as_mut(), tree.container, &mut passive, lane);
            let result = committer.commit_mutation_effects(finished);
            let record = committer.into_record();

            // The finished tree is current from here on, even after a host error.
            tree.current = finished;
            tree.arena.settle_fresh();
            tree.session = None;
            (record, result)
        };
        tracing::debug!(
            lane = lane.name(),
            effects = record.effects.len(),
            deletions = record.deletions.len(),
            "commit finished"
        );
        *self.last_commit.borrow_mut() = Some(record);
        if let Err(err) = result {
            self.report_error(err);
        }

        if !self.passive.borrow().is_empty() && !self.passive_scheduled.get() {
            self.passive_scheduled.set(true);
            let root = self.this.clone();
            self.scheduler.schedule_callback(
                Priority::Normal,
                Task::new(move |_| {
                    if let Some(root) = root.upgrade() {
                        root.passive_scheduled.set(false);
                        root.flush_passive_effects(true);
                    }
                    TaskStatus::Done
                }),
            );
        }

        self.ensure_root_is_scheduled();
    }

    /// Run queued passive effects: every unmount teardown, then every changed
    /// effect's teardown, then their setups. Returns false if nothing was queued.
    pub fn flush_passive_effects(&self, flush_sync: bool) -> bool {
        let pending = std::mem::take(&mut *self.passive.borrow_mut());
        let did_flush = !pending.is_empty();

        for effect in &pending.unmount {
            effect.run_teardown();
        }
        for effect in pending.update.iter().filter(|effect| effect.has_effect()) {
            effect.run_teardown();
        }
        for effect in pending.update.iter().filter(|effect| effect.has_effect()) {
            effect.run_setup();
        }

        if flush_sync {
            self.sync_queue.flush();
        }
        did_flush
    }
}
