//! Commit Work - Apply a finished tree to the output tree.
//!
//! One depth-first sweep over the finished tree. A subtree is entered only
//! when its `subtree_flags` carry mutation or passive work, so the cost is
//! proportional to what changed. Each visited fiber is committed post-order:
//!
//! ```text
//! 1. PLACEMENT       insert before the next settled host sibling, or append
//! 2. UPDATE          push new text or props to the host node
//! 3. REF             detach the previous ref, attach the new one
//! 4. CHILD_DELETION  remove every top-level host node of each deleted subtree
//! 5. PASSIVE         queue the fiber's effects for the passive flush
//! ```
//!
//! Effects are never run here. Deleted components queue their teardowns into
//! the unmount list, changed ones into the update list; both run later in the
//! root's passive flush.

use std::rc::Rc;

use super::hooks::{Effect, Hook, effects_of};
use crate::element::Key;
use crate::error::{FiberError, Result};
use crate::fiber::{FiberArena, FiberId, Flags, WorkTag};
use crate::host::{HostConfig, HostHandle};
use crate::lanes::Lane;

// =============================================================================
// Commit Record
// =============================================================================

/// What one commit did to the tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommitRecord {
    /// Lane that was rendered.
    pub lane: Lane,
    /// Every committed fiber that carried a flag, in commit order.
    pub effects: Vec<EffectEntry>,
    /// Every deleted subtree.
    pub deletions: Vec<DeletionEntry>,
}

/// Flags one fiber carried into the commit.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectEntry {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub label: String,
    pub flags: Flags,
    /// Placement of a fiber that already existed, i.e. a reorder.
    pub moved: bool,
    pub handle: Option<HostHandle>,
}

/// One deleted subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionEntry {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub label: String,
    /// Host nodes removed from the host parent.
    pub removed: Vec<HostHandle>,
}

impl CommitRecord {
    pub fn new(lane: Lane) -> Self {
        Self {
            lane,
            ..Self::default()
        }
    }

    /// True if the commit changed nothing.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.deletions.is_empty()
    }

    /// Entries carrying any of `flags`.
    pub fn with_flags(&self, flags: Flags) -> impl Iterator<Item = &EffectEntry> {
        self.effects.iter().filter(move |entry| entry.flags.intersects(flags))
    }

    /// Keys of reordered fibers.
    pub fn moved_keys(&self) -> Vec<&str> {
        self.effects
            .iter()
            .filter(|entry| entry.moved)
            .filter_map(|entry| entry.key.as_deref())
            .collect()
    }

    /// Keys of newly inserted fibers.
    pub fn inserted_keys(&self) -> Vec<&str> {
        self.effects
            .iter()
            .filter(|entry| entry.flags.contains(Flags::PLACEMENT) && !entry.moved)
            .filter_map(|entry| entry.key.as_deref())
            .collect()
    }

    /// Keys of deleted subtrees.
    pub fn deleted_keys(&self) -> Vec<&str> {
        self.deletions.iter().filter_map(|entry| entry.key.as_deref()).collect()
    }
}

// =============================================================================
// Passive Effects Bucket
// =============================================================================

/// Effects waiting for the passive flush.
#[derive(Default)]
pub(crate) struct PendingPassiveEffects {
    /// Effects of deleted components: teardown only.
    pub unmount: Vec<Rc<Effect>>,
    /// Effects of committed components: teardown then setup when flagged.
    pub update: Vec<Rc<Effect>>,
}

impl PendingPassiveEffects {
    pub fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }
}

// =============================================================================
// Mutation Sweep
// =============================================================================

pub(crate) struct Committer<'a> {
    arena: &'a mut FiberArena,
    host: &'a mut dyn HostConfig,
    container: HostHandle,
    passive: &'a mut PendingPassiveEffects,
    record: CommitRecord,
}

impl<'a> Committer<'a> {
    pub fn new(
        arena: &'a mut FiberArena,
        host: &'a mut dyn HostConfig,
        container: HostHandle,
        passive: &'a mut PendingPassiveEffects,
        lane: Lane,
    ) -> Self {
        Self {
            arena,
            host,
            container,
            passive,
            record: CommitRecord::new(lane),
        }
    }

    /// The record of what was applied so far.
    pub fn into_record(self) -> CommitRecord {
        self.record
    }

    /// Commit every flagged fiber under `finished`.
    ///
    /// A host error aborts the sweep. Fibers already committed stay committed.
    pub fn commit_mutation_effects(&mut self, finished: FiberId) -> Result<()> {
        let mut next = Some(finished);
        while let Some(id) = next {
            let fiber = &self.arena[id];
            if fiber.subtree_flags.intersects(Flags::MUTATION_MASK | Flags::PASSIVE_MASK) {
                if let Some(child) = fiber.child {
                    next = Some(child);
                    continue;
                }
            }

            let mut current = id;
            next = loop {
                self.commit_on_fiber(current)?;
                if current == finished {
                    break None;
                }
                if let Some(sibling) = self.arena[current].sibling {
                    break Some(sibling);
                }
                match self.arena[current].parent {
                    Some(parent) => current = parent,
                    None => break None,
                }
            };
        }
        Ok(())
    }

    fn commit_on_fiber(&mut self, id: FiberId) -> Result<()> {
        let flags = self.arena[id].flags;
        if flags.contains(Flags::PLACEMENT) {
            self.commit_placement(id)?;
        }
        if flags.contains(Flags::UPDATE) {
            self.commit_update(id)?;
        }
        if flags.contains(Flags::REF) {
            self.commit_attach_ref(id);
        }
        if flags.contains(Flags::CHILD_DELETION) {
            let deletions = std::mem::take(&mut self.arena[id].deletions);
            for deleted in deletions {
                self.commit_deletion(id, deleted)?;
            }
        }
        if flags.contains(Flags::PASSIVE) {
            let fiber = &self.arena[id];
            self.passive.update.extend(effects_of(fiber.hooks()).cloned());
        }

        let fiber = &mut self.arena[id];
        if !flags.is_empty() {
            self.record.effects.push(EffectEntry {
                tag: fiber.tag,
                key: fiber.key.clone(),
                label: fiber.label(),
                flags,
                moved: flags.contains(Flags::PLACEMENT) && fiber.alternate.is_some(),
                handle: fiber.state_node,
            });
        }
        fiber.flags = Flags::empty();
        fiber.subtree_flags = Flags::empty();
        Ok(())
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Host node that `id`'s host nodes live in, searching from `start`.
    fn host_parent_from(&self, start: Option<FiberId>, id: FiberId) -> Result<HostHandle> {
        let mut parent = start;
        while let Some(candidate) = parent {
            let fiber = &self.arena[candidate];
            match fiber.tag {
                WorkTag::HostComponent => {
                    return fiber
                        .state_node
                        .ok_or_else(|| FiberError::MissingHostParent(self.arena[id].label()));
                }
                WorkTag::HostRoot => return Ok(self.container),
                _ => parent = fiber.parent,
            }
        }
        Err(FiberError::MissingHostParent(self.arena[id].label()))
    }

    /// First host node after `id` that is already in place.
    fn host_sibling(&self, id: FiberId) -> Option<HostHandle> {
        let mut node = id;
        'siblings: loop {
            let sibling = loop {
                let fiber = &self.arena[node];
                if let Some(sibling) = fiber.sibling {
                    break sibling;
                }
                match fiber.parent {
                    Some(parent) if !matches!(self.arena[parent].tag, WorkTag::HostComponent | WorkTag::HostRoot) => {
                        node = parent;
                    }
                    _ => return None,
                }
            };
            node = sibling;

            // Descend through wrappers to their first host node.
            while !self.arena[node].tag.is_host() {
                let fiber = &self.arena[node];
                if fiber.flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                match fiber.child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }

            let fiber = &self.arena[node];
            if !fiber.flags.contains(Flags::PLACEMENT) {
                return fiber.state_node;
            }
        }
    }

    fn commit_placement(&mut self, id: FiberId) -> Result<()> {
        let parent = self.host_parent_from(self.arena[id].parent, id)?;
        let before = self.host_sibling(id);
        self.insert_or_append_placement_node(id, before, parent)
    }

    fn insert_or_append_placement_node(&mut self, id: FiberId, before: Option<HostHandle>, parent: HostHandle) -> Result<()> {
        let fiber = &self.arena[id];
        if fiber.tag.is_host() {
            let Some(handle) = fiber.state_node else {
                return Ok(());
            };
            match before {
                Some(before) => self.host.insert_child_to_container(handle, parent, before)?,
                None => self.host.append_child_to_container(parent, handle)?,
            }
            return Ok(());
        }

        let mut child = fiber.child;
        while let Some(node) = child {
            self.insert_or_append_placement_node(node, before, parent)?;
            child = self.arena[node].sibling;
        }
        Ok(())
    }

    // =========================================================================
    // Update and refs
    // =========================================================================

    fn commit_update(&mut self, id: FiberId) -> Result<()> {
        let fiber = &self.arena[id];
        let Some(handle) = fiber.state_node else {
            return Ok(());
        };
        match fiber.tag {
            WorkTag::HostText => {
                let content = fiber.memoized_props.text().unwrap_or_default();
                self.host.commit_text_update(handle, content)?;
            }
            WorkTag::HostComponent => {
                if let Some(props) = fiber.memoized_props.element() {
                    self.host.commit_update(handle, props)?;
                }
            }
            tag => tracing::warn!(?tag, "update flag on a non-host fiber"),
        }
        Ok(())
    }

    fn commit_attach_ref(&mut self, id: FiberId) {
        let fiber = &self.arena[id];
        if let Some(previous) = fiber.alternate.and_then(|current| self.arena[current].node_ref.as_ref()) {
            let kept = fiber.node_ref.as_ref().is_some_and(|next| next.ptr_eq(previous));
            if !kept {
                previous.set(None);
            }
        }
        if let Some(node_ref) = &fiber.node_ref {
            node_ref.set(fiber.state_node);
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    fn commit_deletion(&mut self, return_fiber: FiberId, deleted: FiberId) -> Result<()> {
        let host_parent = self.host_parent_from(Some(return_fiber), deleted)?;

        let mut removed = Vec::new();
        let mut doomed = Vec::new();
        self.unmount_subtree(deleted, false, &mut removed, &mut doomed);
        for handle in &removed {
            self.host.remove_child(*handle, host_parent)?;
        }

        let fiber = &self.arena[deleted];
        tracing::trace!(label = %fiber.label(), removed = removed.len(), "subtree deleted");
        self.record.deletions.push(DeletionEntry {
            tag: fiber.tag,
            key: fiber.key.clone(),
            label: fiber.label(),
            removed,
        });

        for id in doomed {
            if let Some(fiber) = self.arena.release(id) {
                if let Some(alternate) = fiber.alternate {
                    self.arena.release(alternate);
                }
            }
        }
        Ok(())
    }

    /// Walk a deleted subtree: collect its top-level host nodes, detach refs,
    /// queue effect teardowns and detach state queues.
    fn unmount_subtree(
        &mut self,
        id: FiberId,
        inside_host: bool,
        removed: &mut Vec<HostHandle>,
        doomed: &mut Vec<FiberId>,
    ) {
        doomed.push(id);
        let fiber = &self.arena[id];
        match fiber.tag {
            WorkTag::HostComponent | WorkTag::HostText => {
                if !inside_host {
                    removed.extend(fiber.state_node);
                }
                if let Some(node_ref) = &fiber.node_ref {
                    node_ref.set(None);
                }
            }
            WorkTag::FunctionComponent => {
                for hook in fiber.hooks() {
                    if let Hook::Effect(effect) = hook {
                        self.passive.unmount.push(effect.clone());
                    }
                    hook.detach();
                }
            }
            WorkTag::HostRoot | WorkTag::Fragment | WorkTag::ContextProvider => {}
        }

        let below_host = inside_host || fiber.tag.is_host();
        let mut child = fiber.child;
        while let Some(node) = child {
            self.unmount_subtree(node, below_host, removed, doomed);
            child = self.arena[node].sibling;
        }
    }
}
