//! # spark-fiber
//!
//! Interruptible tree reconciler with lane-based scheduling.
//!
//! A declarative description of a UI ([`Node`]) is diffed against the last
//! committed one, and the minimal set of mutations is applied to an output
//! tree through a [`HostConfig`] adapter. Rendering is split into units of
//! work so a cooperative [`HostScheduler`] can interrupt a low-priority pass
//! when something more urgent arrives.
//!
//! ## Architecture
//!
//! Every node of the declarative tree is mirrored by a fiber. Two generations
//! of fibers exist at once (committed and work-in-progress) and live in one
//! arena per root, linked by index:
//!
//! ```text
//! render(node) / set_state ─► update queue (lane) ─► scheduler task / sync microtask
//!                                                           │
//!        begin_work ─► diff children ─► complete_work ◄─────┘  (unit by unit, may yield)
//!                                            │
//!                                   commit: placement / update / ref / deletion
//!                                            │
//!                                   passive effects (scheduled at Normal)
//! ```
//!
//! ## Modules
//!
//! - [`element`] - Declarative tree: elements, props, components, contexts
//! - [`lanes`] - Update priorities and their scheduler mapping
//! - [`scheduler`] - Host scheduler contract and a deterministic test scheduler
//! - [`host`] - Output adapter contract and an in-memory output tree
//! - [`fiber`] - Work units, effect flags and the fiber arena
//! - [`reconciler`] - Hooks, diffing, the work loop and commit
//! - [`error`] - Fatal render and commit errors
//!
//! ## Example
//!
//! ```ignore
//! use spark_fiber::*;
//!
//! let scheduler = TestScheduler::new();
//! let host = MemoryHost::new();
//! let container = host.create_container();
//! let root = create_root(container, host.clone(), scheduler.clone());
//!
//! let counter = Component::new("Counter", |cx, _props| {
//!     let (count, set_count) = cx.use_state(|| 0)?;
//!     cx.use_effect(move || { set_count.update(|c| c + 1); None }, Some(vec![]))?;
//!     Ok(el("span").text(count).into())
//! });
//!
//! root.render(component(&counter));
//! scheduler.flush_all();
//! assert_eq!(host.render_to_string(container), "<span>1</span>");
//! ```

pub mod element;
pub mod error;
pub mod fiber;
pub mod host;
pub mod lanes;
pub mod reconciler;
pub mod scheduler;

// Re-export commonly used items
pub use element::{
    AnyValue, Component, Context, Element, ElementBuilder, ElementType, Key, Node, NodeRef, Props, Value, component,
    el, fragment, text,
};

pub use error::{FiberError, Result};

pub use fiber::{FiberId, Flags, HookFlags, WorkTag};

pub use host::{HostConfig, HostError, HostHandle, HostOp, MemoryHost, MemoryNode};

pub use lanes::{Lane, Lanes, NO_LANE, NO_LANES, get_highest_priority_lane, is_subset_of_lanes, merge_lanes};

pub use reconciler::{
    CommitRecord, DeletionEntry, EffectEntry, RenderCx, Root, RootOptions, SetState, StartTransition, Teardown,
    create_root, create_root_with_options,
};

pub use scheduler::{CallbackToken, HostScheduler, Priority, Task, TaskStatus, TestScheduler};
