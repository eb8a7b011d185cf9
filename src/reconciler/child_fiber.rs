//! Child Reconciliation - Diff new declarative children against committed fibers.
//!
//! One algorithm, two modes. With effect tracking on (the parent has a
//! committed generation) superseded children are queued for deletion and new
//! or moved ones get `PLACEMENT`. With tracking off (a subtree being mounted)
//! nothing is marked: the whole subtree is inserted by its mounted ancestor.
//!
//! Arrays use the single left-to-right `last_placed_index` pass:
//!
//! ```text
//! old: [a:0, b:1, c:2]        new: [c, a, b]
//!   c  old 2 >= last 0  -> stays,  last = 2
//!   a  old 0 <  last 2  -> moved
//!   b  old 1 <  last 2  -> moved
//! ```

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::element::{Element, ElementType, Key, Node};
use crate::fiber::{
    FiberArena, FiberId, FiberProps, Flags, WorkTag, create_fiber_from_element, create_fiber_from_fragment,
    create_fiber_from_text, create_work_in_progress,
};

/// Identity of a committed child in the lookup map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChildKey {
    Keyed(Key),
    Index(usize),
}

impl ChildKey {
    fn of(key: Option<&Key>, index: usize) -> Self {
        match key {
            Some(key) => ChildKey::Keyed(key.clone()),
            None => ChildKey::Index(index),
        }
    }
}

/// Props a fiber built from `element` works from.
fn props_for(element: &Element) -> FiberProps {
    match element.element_type {
        ElementType::Fragment => FiberProps::Fragment(element.props.children.clone()),
        _ => FiberProps::Element(element.props.clone()),
    }
}

pub(crate) struct ChildReconciler<'a> {
    arena: &'a mut FiberArena,
    should_track_effects: bool,
    diagnostics: bool,
}

impl<'a> ChildReconciler<'a> {
    pub fn new(arena: &'a mut FiberArena, should_track_effects: bool, diagnostics: bool) -> Self {
        Self {
            arena,
            should_track_effects,
            diagnostics,
        }
    }

    /// Reconcile `new_child` under `return_fiber`. Returns the new first child.
    pub fn reconcile_child_fibers(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_child: Node,
    ) -> Option<FiberId> {
        // An unkeyed fragment at the top contributes no identity.
        let new_child = match new_child {
            Node::Element(element) if element.element_type == ElementType::Fragment && element.key.is_none() => {
                element.props.children.clone()
            }
            other => other,
        };

        match new_child {
            Node::Element(element) => {
                let fiber = self.reconcile_single_element(return_fiber, current_first_child, &element);
                Some(self.place_single_child(fiber))
            }
            Node::Text(content) => {
                let fiber = self.reconcile_single_text_node(return_fiber, current_first_child, content);
                Some(self.place_single_child(fiber))
            }
            Node::List(children) => self.reconcile_children_array(return_fiber, current_first_child, &children),
            Node::Empty => {
                self.delete_remaining_children(return_fiber, current_first_child);
                None
            }
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    fn delete_child(&mut self, return_fiber: FiberId, child: FiberId) {
        if !self.should_track_effects {
            return;
        }
        let parent = &mut self.arena[return_fiber];
        if !parent.deletions.contains(&child) {
            parent.deletions.push(child);
        }
        parent.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(&mut self, return_fiber: FiberId, current_first_child: Option<FiberId>) {
        if !self.should_track_effects {
            return;
        }
        let mut child = current_first_child;
        while let Some(current) = child {
            self.delete_child(return_fiber, current);
            child = self.arena[current].sibling;
        }
    }

    // =========================================================================
    // Reuse and placement
    // =========================================================================

    /// Work-in-progress partner of `fiber`, detached from its old siblings.
    fn use_fiber(&mut self, fiber: FiberId, pending_props: FiberProps) -> FiberId {
        let clone = create_work_in_progress(self.arena, fiber, pending_props);
        let clone_fiber = &mut self.arena[clone];
        clone_fiber.index = 0;
        clone_fiber.sibling = None;
        clone
    }

    fn place_single_child(&mut self, new_fiber: FiberId) -> FiberId {
        let fiber = &mut self.arena[new_fiber];
        if self.should_track_effects && fiber.alternate.is_none() {
            fiber.flags |= Flags::PLACEMENT;
        }
        new_fiber
    }

    fn place_child(&mut self, new_fiber: FiberId, last_placed_index: usize, new_index: usize) -> usize {
        self.arena[new_fiber].index = new_index;
        if !self.should_track_effects {
            return last_placed_index;
        }
        match self.arena[new_fiber].alternate {
            Some(current) => {
                let old_index = self.arena[current].index;
                if old_index < last_placed_index {
                    // Moved backward relative to an already settled sibling.
                    self.arena[new_fiber].flags |= Flags::PLACEMENT;
                    last_placed_index
                } else {
                    old_index
                }
            }
            None => {
                self.arena[new_fiber].flags |= Flags::PLACEMENT;
                last_placed_index
            }
        }
    }

    fn same_type(&self, current: FiberId, element: &Element) -> bool {
        self.arena[current].element_type.as_ref() == Some(&element.element_type)
    }

    // =========================================================================
    // Single child
    // =========================================================================

    fn reconcile_single_element(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let mut child = current_first_child;
        while let Some(current) = child {
            if self.arena[current].key == element.key {
                if self.same_type(current, element) {
                    let rest = self.arena[current].sibling;
                    self.delete_remaining_children(return_fiber, rest);
                    let existing = self.use_fiber(current, props_for(element));
                    let fiber = &mut self.arena[existing];
                    fiber.node_ref = element.node_ref.clone();
                    fiber.parent = Some(return_fiber);
                    return existing;
                }
                // Same key, different type: nothing below can match either.
                self.delete_remaining_children(return_fiber, Some(current));
                break;
            }
            self.delete_child(return_fiber, current);
            child = self.arena[current].sibling;
        }

        let created = create_fiber_from_element(self.arena, element);
        self.arena[created].parent = Some(return_fiber);
        created
    }

    fn reconcile_single_text_node(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        content: Rc<str>,
    ) -> FiberId {
        if let Some(current) = current_first_child {
            if self.arena[current].tag == WorkTag::HostText {
                let rest = self.arena[current].sibling;
                self.delete_remaining_children(return_fiber, rest);
                let existing = self.use_fiber(current, FiberProps::Text(content));
                self.arena[existing].parent = Some(return_fiber);
                return existing;
            }
        }
        self.delete_remaining_children(return_fiber, current_first_child);
        let created = create_fiber_from_text(self.arena, content);
        self.arena[created].parent = Some(return_fiber);
        created
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    fn reconcile_children_array(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_children: &[Node],
    ) -> Option<FiberId> {
        let mut existing = self.map_remaining_children(return_fiber, current_first_child);
        let mut seen_keys: HashSet<Key> = HashSet::new();
        let mut first_new: Option<FiberId> = None;
        let mut previous: Option<FiberId> = None;
        let mut last_placed_index = 0;

        for (new_index, new_child) in new_children.iter().enumerate() {
            if self.diagnostics {
                if let Some(key) = new_child.as_element().and_then(|element| element.key.as_ref()) {
                    if !seen_keys.insert(key.clone()) {
                        tracing::warn!(key = %key, "two children share the same key");
                    }
                }
            }

            let Some(new_fiber) = self.update_from_map(&mut existing, return_fiber, new_index, new_child) else {
                continue;
            };
            last_placed_index = self.place_child(new_fiber, last_placed_index, new_index);
            match previous {
                None => first_new = Some(new_fiber),
                Some(prev) => self.arena[prev].sibling = Some(new_fiber),
            }
            previous = Some(new_fiber);
        }
        if let Some(last) = previous {
            self.arena[last].sibling = None;
        }

        for (_, leftover) in existing {
            self.delete_child(return_fiber, leftover);
        }
        first_new
    }

    fn map_remaining_children(
        &mut self,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
    ) -> IndexMap<ChildKey, FiberId> {
        let mut existing = IndexMap::new();
        let mut child = current_first_child;
        while let Some(current) = child {
            let fiber = &self.arena[current];
            let key = ChildKey::of(fiber.key.as_ref(), fiber.index);
            child = fiber.sibling;
            if let Some(displaced) = existing.insert(key.clone(), current) {
                if self.diagnostics {
                    tracing::warn!(key = ?key, "committed children share the same key");
                }
                self.delete_child(return_fiber, displaced);
            }
        }
        existing
    }

    fn update_from_map(
        &mut self,
        existing: &mut IndexMap<ChildKey, FiberId>,
        return_fiber: FiberId,
        new_index: usize,
        new_child: &Node,
    ) -> Option<FiberId> {
        let (key, new_fiber) = match new_child {
            Node::Empty => return None,
            Node::Text(content) => {
                let key = ChildKey::Index(new_index);
                let matched = existing.get(&key).copied();
                (key, self.update_text_node(return_fiber, matched, content.clone()))
            }
            Node::List(children) => {
                let key = ChildKey::Index(new_index);
                let matched = existing.get(&key).copied();
                let fragment = Node::List(children.clone());
                (key, self.update_fragment(return_fiber, matched, fragment, None))
            }
            Node::Element(element) => {
                let key = ChildKey::of(element.key.as_ref(), new_index);
                let matched = existing.get(&key).copied();
                let fiber = match element.element_type {
                    ElementType::Fragment => self.update_fragment(
                        return_fiber,
                        matched,
                        element.props.children.clone(),
                        element.key.clone(),
                    ),
                    _ => self.update_element(return_fiber, matched, element),
                };
                (key, fiber)
            }
        };

        // Only a reused child leaves the map; a mismatched one stays to be deleted.
        if self.arena[new_fiber].alternate.is_some() {
            existing.shift_remove(&key);
        }
        Some(new_fiber)
    }

    fn update_text_node(&mut self, return_fiber: FiberId, current: Option<FiberId>, content: Rc<str>) -> FiberId {
        let fiber = match current {
            Some(current) if self.arena[current].tag == WorkTag::HostText => {
                self.use_fiber(current, FiberProps::Text(content))
            }
            _ => create_fiber_from_text(self.arena, content),
        };
        self.arena[fiber].parent = Some(return_fiber);
        fiber
    }

    fn update_element(&mut self, return_fiber: FiberId, current: Option<FiberId>, element: &Element) -> FiberId {
        let fiber = match current {
            Some(current) if self.same_type(current, element) => {
                let existing = self.use_fiber(current, props_for(element));
                self.arena[existing].node_ref = element.node_ref.clone();
                existing
            }
            _ => create_fiber_from_element(self.arena, element),
        };
        self.arena[fiber].parent = Some(return_fiber);
        fiber
    }

    fn update_fragment(
        &mut self,
        return_fiber: FiberId,
        current: Option<FiberId>,
        children: Node,
        key: Option<Key>,
    ) -> FiberId {
        let fiber = match current {
            Some(current) if self.arena[current].tag == WorkTag::Fragment => {
                self.use_fiber(current, FiberProps::Fragment(children))
            }
            _ => create_fiber_from_fragment(self.arena, children, key),
        };
        self.arena[fiber].parent = Some(return_fiber);
        fiber
    }
}
