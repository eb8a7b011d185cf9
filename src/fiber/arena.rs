//! Fiber Arena - Index allocation for fibers.
//!
//! Fibers of both generations live in one slot table per root:
//! - `FiberId` is a plain index, so `alternate` / `parent` / `child` links are copies, not pointers
//! - Free index pool for O(1) reuse
//! - Fresh list: slots allocated by the render pass in progress, released
//!   wholesale if the pass is abandoned and settled when it commits

use std::ops::{Index, IndexMut};

use super::{Fiber, FiberId};

/// Slot table holding every fiber of one root.
#[derive(Default)]
pub(crate) struct FiberArena {
    slots: Vec<Option<Fiber>>,
    free: Vec<usize>,
    fresh: Vec<FiberId>,
    live: usize,
}

impl FiberArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fiber that outlives any single render pass.
    pub fn alloc(&mut self, fiber: Fiber) -> FiberId {
        self.live += 1;
        // Reuse free index or allocate new
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(fiber);
                FiberId(index)
            }
            None => {
                self.slots.push(Some(fiber));
                FiberId(self.slots.len() - 1)
            }
        }
    }

    /// Store a fiber created by the render pass in progress.
    pub fn alloc_fresh(&mut self, fiber: Fiber) -> FiberId {
        let id = self.alloc(fiber);
        self.fresh.push(id);
        id
    }

    /// Free a slot. Returns the fiber that lived there.
    pub fn release(&mut self, id: FiberId) -> Option<Fiber> {
        let fiber = self.slots.get_mut(id.0)?.take()?;
        self.live -= 1;
        self.free.push(id.0);
        Some(fiber)
    }

    /// Abandon the render pass in progress: free every fiber it created and
    /// unlink them from committed fibers that adopted them as alternates.
    pub fn release_fresh(&mut self) -> usize {
        let fresh = std::mem::take(&mut self.fresh);
        let count = fresh.len();
        for id in fresh {
            let Some(fiber) = self.release(id) else { continue };
            if let Some(alternate) = fiber.alternate {
                if let Some(current) = self.get_mut(alternate) {
                    if current.alternate == Some(id) {
                        current.alternate = None;
                    }
                }
            }
        }
        count
    }

    /// The render pass committed: its fibers are now permanent.
    pub fn settle_fresh(&mut self) {
        self.fresh.clear();
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Number of live fibers (both generations).
    pub fn len(&self) -> usize {
        self.live
    }
}

impl Index<FiberId> for FiberArena {
    type Output = Fiber;

    fn index(&self, id: FiberId) -> &Fiber {
        match self.get(id) {
            Some(fiber) => fiber,
            None => panic!("fiber {id:?} was released"),
        }
    }
}

impl IndexMut<FiberId> for FiberArena {
    fn index_mut(&mut self, id: FiberId) -> &mut Fiber {
        match self.get_mut(id) {
            Some(fiber) => fiber,
            None => panic!("fiber {id:?} was released"),
        }
    }
}
