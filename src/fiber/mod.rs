//! Work-Unit Tree - Fibers and their double-buffered generations.
//!
//! One fiber mirrors one node of the declarative tree. Each logical node has
//! at most two fibers alive at once, linked through `alternate`:
//!
//! ```text
//! current (committed)  <--alternate-->  work-in-progress (being rendered)
//! ```
//!
//! All links (`parent`, `child`, `sibling`, `alternate`) are [`FiberId`]s into
//! the root's [`FiberArena`], so the pairing is a relation, not ownership.
//!
//! - [`flags`] - Effect flags (own and subtree) and effect-record tags

mod arena;
pub mod flags;

pub(crate) use arena::FiberArena;
pub use flags::{Flags, HookFlags};

use std::rc::Rc;

use crate::element::{Element, ElementType, Key, Node, NodeRef, Props};
use crate::host::HostHandle;
use crate::reconciler::hooks::Hook;
use crate::reconciler::update_queue::QueueBase;

/// Index of a fiber in its root's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId(pub(crate) usize);

/// Node category. Closed set, matched exhaustively by begin and complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTag {
    HostRoot,
    HostComponent,
    HostText,
    FunctionComponent,
    Fragment,
    ContextProvider,
}

impl WorkTag {
    pub fn is_host(self) -> bool {
        matches!(self, WorkTag::HostComponent | WorkTag::HostText)
    }
}

/// Props a fiber works from, by kind.
#[derive(Clone, Default, Debug)]
pub(crate) enum FiberProps {
    /// Root fibers take their content from the update queue.
    #[default]
    Empty,
    /// Host elements, components and providers.
    Element(Props),
    /// Text content.
    Text(Rc<str>),
    /// Fragment children.
    Fragment(Node),
}

impl FiberProps {
    /// Declarative children carried by these props.
    pub fn children(&self) -> Node {
        match self {
            FiberProps::Element(props) => props.children.clone(),
            FiberProps::Fragment(children) => children.clone(),
            FiberProps::Empty | FiberProps::Text(_) => Node::Empty,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            FiberProps::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&Props> {
        match self {
            FiberProps::Element(props) => Some(props),
            _ => None,
        }
    }
}

/// Kind-specific persisted state.
#[derive(Clone, Default)]
pub(crate) enum FiberState {
    #[default]
    None,
    /// Host root: base of the top-level update queue.
    Root { base: QueueBase<Node> },
    /// Function component: one record per hook call site, in call order.
    Hooks(Vec<Hook>),
}

/// One unit of work.
pub(crate) struct Fiber {
    pub tag: WorkTag,
    pub key: Option<Key>,
    /// What produced this fiber. `None` for root and text fibers.
    pub element_type: Option<ElementType>,
    /// Realized host node (elements and text only).
    pub state_node: Option<HostHandle>,
    pub node_ref: Option<NodeRef>,

    // Tree
    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    /// Position among its parent's children.
    pub index: usize,

    // Work unit
    pub pending_props: FiberProps,
    pub memoized_props: FiberProps,
    pub memoized_state: FiberState,
    pub alternate: Option<FiberId>,

    // Effects
    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: Vec<FiberId>,
}

impl Fiber {
    pub fn new(tag: WorkTag, pending_props: FiberProps, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            element_type: None,
            state_node: None,
            node_ref: None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: FiberProps::Empty,
            memoized_state: FiberState::None,
            alternate: None,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: Vec::new(),
        }
    }

    /// Hook records of a function component (empty for other kinds).
    pub fn hooks(&self) -> &[Hook] {
        match &self.memoized_state {
            FiberState::Hooks(hooks) => hooks,
            _ => &[],
        }
    }

    /// Name for logs and commit records.
    pub fn label(&self) -> String {
        match (&self.element_type, self.tag) {
            (Some(element_type), _) => element_type.label(),
            (None, WorkTag::HostText) => "#text".to_string(),
            (None, WorkTag::HostRoot) => "#root".to_string(),
            (None, tag) => format!("{tag:?}"),
        }
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// Get or create the work-in-progress partner of `current`.
///
/// The partner is created once and reused by every later render pass, which
/// resets its effect bookkeeping and copies the committed state over.
pub(crate) fn create_work_in_progress(
    arena: &mut FiberArena,
    current: FiberId,
    pending_props: FiberProps,
) -> FiberId {
    let wip = match arena[current].alternate {
        Some(wip) => {
            let fiber = &mut arena[wip];
            fiber.pending_props = pending_props;
            fiber.flags = Flags::empty();
            fiber.subtree_flags = Flags::empty();
            fiber.deletions.clear();
            wip
        }
        None => {
            let source = &arena[current];
            let mut fiber = Fiber::new(source.tag, pending_props, source.key.clone());
            fiber.alternate = Some(current);
            let wip = arena.alloc_fresh(fiber);
            arena[current].alternate = Some(wip);
            wip
        }
    };

    let source = &arena[current];
    let element_type = source.element_type.clone();
    let state_node = source.state_node;
    let node_ref = source.node_ref.clone();
    let child = source.child;
    let memoized_props = source.memoized_props.clone();
    let memoized_state = source.memoized_state.clone();

    let fiber = &mut arena[wip];
    fiber.element_type = element_type;
    fiber.state_node = state_node;
    fiber.node_ref = node_ref;
    fiber.child = child;
    fiber.memoized_props = memoized_props;
    fiber.memoized_state = memoized_state;
    wip
}

/// Fresh fiber for an element. Fragments go through [`create_fiber_from_fragment`].
pub(crate) fn create_fiber_from_element(arena: &mut FiberArena, element: &Element) -> FiberId {
    let tag = match &element.element_type {
        ElementType::Host(_) => WorkTag::HostComponent,
        ElementType::Component(_) => WorkTag::FunctionComponent,
        ElementType::Provider(_) => WorkTag::ContextProvider,
        ElementType::Fragment => {
            return create_fiber_from_fragment(arena, element.props.children.clone(), element.key.clone());
        }
    };
    let mut fiber = Fiber::new(tag, FiberProps::Element(element.props.clone()), element.key.clone());
    fiber.element_type = Some(element.element_type.clone());
    fiber.node_ref = element.node_ref.clone();
    arena.alloc_fresh(fiber)
}

/// Fresh fragment fiber holding `children`.
pub(crate) fn create_fiber_from_fragment(arena: &mut FiberArena, children: Node, key: Option<Key>) -> FiberId {
    let mut fiber = Fiber::new(WorkTag::Fragment, FiberProps::Fragment(children), key);
    fiber.element_type = Some(ElementType::Fragment);
    arena.alloc_fresh(fiber)
}

/// Fresh text fiber.
pub(crate) fn create_fiber_from_text(arena: &mut FiberArena, content: Rc<str>) -> FiberId {
    arena.alloc_fresh(Fiber::new(WorkTag::HostText, FiberProps::Text(content), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::el;

    #[test]
    fn test_work_in_progress_is_created_once() {
        let mut arena = FiberArena::new();
        let current = arena.alloc(Fiber::new(WorkTag::HostText, FiberProps::Text("a".into()), None));

        let wip = create_work_in_progress(&mut arena, current, FiberProps::Text("b".into()));
        assert_eq!(arena[current].alternate, Some(wip));
        assert_eq!(arena[wip].alternate, Some(current));
        assert_eq!(arena[wip].pending_props.text(), Some("b"));

        arena[wip].flags = Flags::UPDATE;
        let again = create_work_in_progress(&mut arena, current, FiberProps::Text("c".into()));
        assert_eq!(again, wip);
        assert_eq!(arena[wip].flags, Flags::empty());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_work_in_progress_copies_committed_state() {
        let mut arena = FiberArena::new();
        let child = arena.alloc(Fiber::new(WorkTag::HostText, FiberProps::Text("x".into()), None));
        let mut fiber = Fiber::new(WorkTag::HostComponent, FiberProps::Empty, Some("k".into()));
        fiber.child = Some(child);
        fiber.state_node = Some(HostHandle(7));
        let current = arena.alloc(fiber);

        let wip = create_work_in_progress(&mut arena, current, FiberProps::Empty);
        assert_eq!(arena[wip].child, Some(child));
        assert_eq!(arena[wip].state_node, Some(HostHandle(7)));
        assert_eq!(arena[wip].key.as_deref(), Some("k"));
    }

    #[test]
    fn test_fiber_from_element_kinds() {
        let mut arena = FiberArena::new();
        let host = create_fiber_from_element(&mut arena, &el("div").key("a").build());
        assert_eq!(arena[host].tag, WorkTag::HostComponent);
        assert_eq!(arena[host].key.as_deref(), Some("a"));

        let fragment = create_fiber_from_element(&mut arena, &crate::element::fragment().child("x").build());
        assert_eq!(arena[fragment].tag, WorkTag::Fragment);
        assert!(matches!(arena[fragment].pending_props, FiberProps::Fragment(Node::Text(_))));
    }
}
