//! Complete Work - Bottom-up half of a unit of work.
//!
//! Runs once every child of a fiber has completed:
//! - Host elements and text: create the host node on mount (with the already
//!   completed host children attached), or mark `UPDATE` / `REF` on change
//! - Providers: pop the context value pushed by begin
//! - Every kind: bubble child flags into `subtree_flags`

use std::rc::Rc;

use super::work_loop::RenderSession;
use crate::element::{ElementType, same_ref};
use crate::error::Result;
use crate::fiber::{FiberArena, FiberId, Flags, WorkTag};
use crate::host::{HostConfig, HostHandle};

pub(crate) fn complete_work(
    arena: &mut FiberArena,
    host: &mut dyn HostConfig,
    session: &mut RenderSession,
    wip: FiberId,
    diagnostics: bool,
) -> Result<()> {
    match arena[wip].tag {
        WorkTag::HostComponent => complete_host_component(arena, host, wip, diagnostics)?,
        WorkTag::HostText => complete_host_text(arena, host, wip),
        WorkTag::ContextProvider => {
            if let Some(ElementType::Provider(context)) = &arena[wip].element_type {
                session.contexts.pop_provider(context);
            }
        }
        WorkTag::HostRoot | WorkTag::FunctionComponent | WorkTag::Fragment => {}
    }
    bubble_properties(arena, wip);
    Ok(())
}

fn complete_host_component(
    arena: &mut FiberArena,
    host: &mut dyn HostConfig,
    wip: FiberId,
    diagnostics: bool,
) -> Result<()> {
    let fiber = &arena[wip];
    let props = fiber.pending_props.element().cloned().unwrap_or_default();

    if let (Some(current), Some(_)) = (fiber.alternate, fiber.state_node) {
        let changed = !arena[current]
            .memoized_props
            .element()
            .is_some_and(|old| old.same_attrs(&props));
        let ref_changed = !same_ref(&arena[current].node_ref, &fiber.node_ref);

        let fiber = &mut arena[wip];
        if changed {
            fiber.flags |= Flags::UPDATE;
        }
        if ref_changed {
            fiber.flags |= Flags::REF;
        }
        return Ok(());
    }

    let Some(ElementType::Host(tag)) = &fiber.element_type else {
        if diagnostics {
            tracing::warn!(label = fiber.label(), "host component without a tag");
        }
        return Ok(());
    };
    let instance = host.create_instance(tag, &props);
    append_all_children(arena, host, instance, wip)?;

    let fiber = &mut arena[wip];
    fiber.state_node = Some(instance);
    if fiber.node_ref.is_some() {
        fiber.flags |= Flags::REF;
    }
    Ok(())
}

fn complete_host_text(arena: &mut FiberArena, host: &mut dyn HostConfig, wip: FiberId) {
    let fiber = &arena[wip];
    let content: Rc<str> = fiber.pending_props.text().unwrap_or_default().into();

    match (fiber.alternate, fiber.state_node) {
        (Some(current), Some(_)) => {
            if arena[current].memoized_props.text() != Some(&*content) {
                arena[wip].flags |= Flags::UPDATE;
            }
        }
        _ => {
            let instance = host.create_text_instance(&content);
            arena[wip].state_node = Some(instance);
        }
    }
}

/// Attach the top-level host nodes below `wip` to its new host node.
fn append_all_children(
    arena: &FiberArena,
    host: &mut dyn HostConfig,
    parent: HostHandle,
    wip: FiberId,
) -> Result<()> {
    let mut node = arena[wip].child;
    while let Some(id) = node {
        let fiber = &arena[id];
        if fiber.tag.is_host() {
            if let Some(handle) = fiber.state_node {
                host.append_initial_child(parent, handle)?;
            }
        } else if let Some(child) = fiber.child {
            node = Some(child);
            continue;
        }
        node = next_in_subtree(arena, id, wip);
    }
    Ok(())
}

/// Next sibling of `id` or of its nearest ancestor below `stop`.
pub(crate) fn next_in_subtree(arena: &FiberArena, mut id: FiberId, stop: FiberId) -> Option<FiberId> {
    loop {
        if let Some(sibling) = arena[id].sibling {
            return Some(sibling);
        }
        match arena[id].parent {
            Some(parent) if parent != stop => id = parent,
            _ => return None,
        }
    }
}

/// Fold the children's own and subtree flags into `wip.subtree_flags`.
fn bubble_properties(arena: &mut FiberArena, wip: FiberId) {
    let mut subtree_flags = Flags::empty();
    let mut child = arena[wip].child;
    while let Some(id) = child {
        let fiber = &mut arena[id];
        subtree_flags |= fiber.subtree_flags | fiber.flags;
        fiber.parent = Some(wip);
        child = fiber.sibling;
    }
    arena[wip].subtree_flags = subtree_flags;
}
