//! Begin Work - Top-down half of a unit of work.
//!
//! Computes what a fiber's children should become and reconciles them.
//! Returns the first child to descend into, or `None` when the fiber is a leaf
//! for this pass.

use super::child_fiber::ChildReconciler;
use super::hooks::render_with_hooks;
use super::root::RootInner;
use super::update_queue::rebase;
use super::work_loop::RenderSession;
use crate::element::{ElementType, Node};
use crate::error::{FiberError, Result};
use crate::fiber::{FiberArena, FiberId, FiberState, WorkTag};

pub(crate) fn begin_work(
    root: &RootInner,
    arena: &mut FiberArena,
    session: &mut RenderSession,
    wip: FiberId,
) -> Result<Option<FiberId>> {
    match arena[wip].tag {
        WorkTag::HostRoot => Ok(update_host_root(root, arena, session, wip)),
        WorkTag::HostComponent | WorkTag::Fragment => {
            let children = arena[wip].pending_props.children();
            Ok(reconcile_children(root, arena, wip, children))
        }
        WorkTag::HostText => Ok(None),
        WorkTag::FunctionComponent => {
            let children = render_with_hooks(root, arena, &session.contexts, session.render_lane, wip)?;
            Ok(reconcile_children(root, arena, wip, children))
        }
        WorkTag::ContextProvider => update_context_provider(root, arena, session, wip),
    }
}

fn update_host_root(root: &RootInner, arena: &mut FiberArena, session: &RenderSession, wip: FiberId) -> Option<FiberId> {
    let FiberState::Root { base } = &arena[wip].memoized_state else {
        if root.options.diagnostics {
            tracing::warn!("host root without a root state");
        }
        return None;
    };
    let (element, base) = rebase(&root.root_queue, base, session.render_lane);
    arena[wip].memoized_state = FiberState::Root { base };
    reconcile_children(root, arena, wip, element)
}

fn update_context_provider(
    root: &RootInner,
    arena: &mut FiberArena,
    session: &mut RenderSession,
    wip: FiberId,
) -> Result<Option<FiberId>> {
    let fiber = &arena[wip];
    let Some(ElementType::Provider(context)) = fiber.element_type.clone() else {
        if root.options.diagnostics {
            tracing::warn!(label = fiber.label(), "provider fiber without a context");
        }
        return Ok(None);
    };
    let props = fiber.pending_props.element();
    let Some(value) = props.and_then(|props| props.value.clone()) else {
        return Err(FiberError::MissingContextValue {
            context: context.name(),
        });
    };
    let children = fiber.pending_props.children();

    session.contexts.push_provider(&context, value);
    Ok(reconcile_children(root, arena, wip, children))
}

/// Diff `children` against the committed children of `wip`.
///
/// Effects are tracked only when `wip` has a committed generation.
fn reconcile_children(root: &RootInner, arena: &mut FiberArena, wip: FiberId, children: Node) -> Option<FiberId> {
    let current = arena[wip].alternate;
    let current_child = current.and_then(|current| arena[current].child);
    let mut reconciler = ChildReconciler::new(arena, current.is_some(), root.options.diagnostics);
    let child = reconciler.reconcile_child_fibers(wip, current_child, children);
    arena[wip].child = child;
    child
}
