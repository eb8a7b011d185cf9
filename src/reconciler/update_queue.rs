//! Update Queue - Buffered state transitions tagged with lanes.
//!
//! A queue is shared by both generations of its owner (the root, or one state
//! hook). Dispatching only appends to it. Rendering never consumes from it:
//! each generation keeps a [`QueueBase`] snapshot instead, so an abandoned
//! render leaves nothing behind and the committed generation is untouched.
//!
//! ```text
//! committed base:   state=0  updates=[T:+10, S:+1(replay)]  consumed_through=2
//! shared pending:   [#1 T:+10, #2 S:+1, #3 D:*2]
//!                             ^ pruned at the next render  ^ new since commit
//! ```
//!
//! Processing replays `base.updates ++ pending` in enqueue order. Updates
//! outside the render lane are skipped and retained; once something was
//! skipped, every later applied update is retained too (with no lane) so the
//! lower-priority pass replays the whole suffix from the pre-skip state.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::lanes::{Lane, Lanes, NO_LANE, NO_LANES, is_subset_of_lanes};

/// Payload of an update.
pub enum Action<S> {
    /// Replace the state.
    Replace(S),
    /// Compute the next state from the previous one.
    Reduce(Rc<dyn Fn(&S) -> S>),
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Action::Replace(state) => Action::Replace(state.clone()),
            Action::Reduce(reducer) => Action::Reduce(reducer.clone()),
        }
    }
}

impl<S: Clone> Action<S> {
    pub fn apply(&self, previous: &S) -> S {
        match self {
            Action::Replace(state) => state.clone(),
            Action::Reduce(reducer) => reducer(previous),
        }
    }
}

/// One queued transition.
pub struct Update<S> {
    pub action: Action<S>,
    pub lane: Lane,
    /// Enqueue order within the queue.
    pub(crate) seq: u64,
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            lane: self.lane,
            seq: self.seq,
        }
    }
}

/// Pending updates shared by both generations of the owner.
pub struct UpdateQueue<S> {
    pending: VecDeque<Update<S>>,
    next_seq: u64,
    detached: bool,
}

/// Queue handle held by fibers and dispatchers.
pub type SharedQueue<S> = Rc<RefCell<UpdateQueue<S>>>;

impl<S> Default for UpdateQueue<S> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            next_seq: 1,
            detached: false,
        }
    }
}

impl<S: Clone> UpdateQueue<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedQueue<S> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Append an update. O(1); the new update is the tail.
    pub fn enqueue(&mut self, action: Action<S>, lane: Lane) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push_back(Update { action, lane, seq });
        seq
    }

    /// Number of updates not yet absorbed by a committed base.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Lanes of every pending update.
    pub fn pending_lanes(&self) -> Lanes {
        self.pending.iter().fold(NO_LANES, |lanes, update| lanes | update.lane)
    }

    /// Drop updates a committed base has already absorbed.
    fn prune_through(&mut self, seq: u64) {
        while self.pending.front().is_some_and(|update| update.seq <= seq) {
            self.pending.pop_front();
        }
    }

    /// The owner unmounted. Later dispatches are dropped.
    pub fn detach(&mut self) {
        self.detached = true;
        self.pending.clear();
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

/// Per-generation snapshot of a queue.
pub struct QueueBase<S> {
    /// State before the first skipped update.
    pub state: S,
    /// Skipped updates and everything after them, in order.
    pub updates: Vec<Update<S>>,
    /// Highest pending `seq` folded into this snapshot.
    pub consumed_through: u64,
}

impl<S: Clone> Clone for QueueBase<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            updates: self.updates.clone(),
            consumed_through: self.consumed_through,
        }
    }
}

impl<S> QueueBase<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            updates: Vec::new(),
            consumed_through: 0,
        }
    }
}

/// Result of replaying a queue at one lane.
pub struct Processed<S> {
    pub memoized_state: S,
    pub base_state: S,
    pub base_queue: Vec<Update<S>>,
    /// Lanes of the updates that were skipped.
    pub skipped_lanes: Lanes,
}

/// Replay `updates` on top of `base_state`, applying those in `render_lane`.
pub fn process_update_queue<S: Clone>(
    base_state: S,
    updates: impl IntoIterator<Item = Update<S>>,
    render_lane: Lane,
) -> Processed<S> {
    let mut state = base_state;
    let mut new_base_state = None;
    let mut base_queue: Vec<Update<S>> = Vec::new();
    let mut skipped_lanes = NO_LANES;

    for update in updates {
        if !is_subset_of_lanes(render_lane, update.lane) {
            // Not enough priority: keep it, remember where the replay starts.
            if base_queue.is_empty() {
                new_base_state = Some(state.clone());
            }
            skipped_lanes |= update.lane;
            base_queue.push(update);
            continue;
        }

        if !base_queue.is_empty() {
            // Must run again after the skipped one, whatever lane renders next.
            base_queue.push(Update {
                action: update.action.clone(),
                lane: NO_LANE,
                seq: update.seq,
            });
        }
        state = update.action.apply(&state);
    }

    Processed {
        base_state: new_base_state.unwrap_or_else(|| state.clone()),
        memoized_state: state,
        base_queue,
        skipped_lanes,
    }
}

/// Compute the work-in-progress state of a queue owner.
///
/// `current` is the committed generation's snapshot. Returns the rendered
/// state and the snapshot the work-in-progress generation keeps.
pub fn rebase<S: Clone>(queue: &RefCell<UpdateQueue<S>>, current: &QueueBase<S>, render_lane: Lane) -> (S, QueueBase<S>) {
    let pending: Vec<Update<S>> = {
        let mut queue = queue.borrow_mut();
        queue.prune_through(current.consumed_through);
        queue.pending.iter().cloned().collect()
    };
    let consumed_through = pending.last().map_or(current.consumed_through, |update| update.seq);

    let updates = current.updates.iter().cloned().chain(pending);
    let processed = process_update_queue(current.state.clone(), updates, render_lane);
    if !processed.skipped_lanes.is_empty() {
        tracing::trace!(
            render = render_lane.name(),
            skipped = ?processed.skipped_lanes,
            "updates deferred to a later lane"
        );
    }

    (
        processed.memoized_state,
        QueueBase {
            state: processed.base_state,
            updates: processed.base_queue,
            consumed_through,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(n: i32) -> Action<i32> {
        Action::Reduce(Rc::new(move |s| s + n))
    }

    fn update(action: Action<i32>, lane: Lane, seq: u64) -> Update<i32> {
        Update { action, lane, seq }
    }

    #[test]
    fn test_same_lane_updates_apply_in_order() {
        let updates = vec![
            update(add(1), Lanes::DEFAULT, 1),
            update(Action::Replace(10), Lanes::DEFAULT, 2),
            update(add(1), Lanes::DEFAULT, 3),
        ];
        let processed = process_update_queue(0, updates, Lanes::DEFAULT);
        assert_eq!(processed.memoized_state, 11);
        assert_eq!(processed.base_state, 11);
        assert!(processed.base_queue.is_empty());
    }

    #[test]
    fn test_skipped_update_keeps_suffix_and_base_state() {
        let updates = vec![
            update(add(1), Lanes::SYNC, 1),
            update(add(10), Lanes::TRANSITION, 2),
            update(add(100), Lanes::SYNC, 3),
        ];
        let processed = process_update_queue(0, updates, Lanes::SYNC);
        assert_eq!(processed.memoized_state, 101);
        assert_eq!(processed.base_state, 1);
        assert_eq!(processed.skipped_lanes, Lanes::TRANSITION);

        let lanes: Vec<Lane> = processed.base_queue.iter().map(|u| u.lane).collect();
        assert_eq!(lanes, vec![Lanes::TRANSITION, NO_LANE]);

        // The transition pass replays from the pre-skip state.
        let replay = process_update_queue(processed.base_state, processed.base_queue, Lanes::TRANSITION);
        assert_eq!(replay.memoized_state, 111);
        assert!(replay.base_queue.is_empty());
    }

    #[test]
    fn test_rebase_prunes_only_committed_updates() {
        let queue = RefCell::new(UpdateQueue::new());
        queue.borrow_mut().enqueue(add(1), Lanes::DEFAULT);
        queue.borrow_mut().enqueue(add(1), Lanes::DEFAULT);

        let committed = QueueBase::new(0);
        let (state, base) = rebase(&queue, &committed, Lanes::DEFAULT);
        assert_eq!(state, 2);
        assert_eq!(base.consumed_through, 2);

        // Abandoned pass: pending is untouched.
        assert_eq!(queue.borrow().len(), 2);

        // After commit the absorbed updates go away and new ones replay on top.
        queue.borrow_mut().enqueue(add(5), Lanes::DEFAULT);
        let (state, next) = rebase(&queue, &base, Lanes::DEFAULT);
        assert_eq!(state, 7);
        assert_eq!(queue.borrow().len(), 1);
        assert_eq!(next.consumed_through, 3);
    }

    #[test]
    fn test_replay_is_idempotent_across_passes() {
        let queue = RefCell::new(UpdateQueue::new());
        queue.borrow_mut().enqueue(add(10), Lanes::TRANSITION);
        queue.borrow_mut().enqueue(add(1), Lanes::SYNC);

        let committed = QueueBase::new(0);
        let (sync_state, sync_base) = rebase(&queue, &committed, Lanes::SYNC);
        assert_eq!(sync_state, 1);

        let (final_state, final_base) = rebase(&queue, &sync_base, Lanes::TRANSITION);
        assert_eq!(final_state, 11);
        assert!(final_base.updates.is_empty());
        assert_eq!(final_base.state, 11);
    }

    #[test]
    fn test_detach_drops_pending() {
        let mut queue = UpdateQueue::new();
        queue.enqueue(add(1), Lanes::SYNC);
        assert_eq!(queue.pending_lanes(), Lanes::SYNC);
        queue.detach();
        assert!(queue.is_detached());
        assert!(queue.is_empty());
    }
}
