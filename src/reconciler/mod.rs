//! Reconciler - Render, diff and commit.
//!
//! - `update_queue` - Lane-tagged state transitions with base-state replay
//! - `hooks` - `RenderCx` and the mount / update dispatcher tables
//! - `child_fiber` - Keyed child diffing
//! - `begin_work` / `complete_work` - The two halves of a unit of work
//! - `work_loop` - Scheduling entry point, render passes, commit
//! - `commit_work` - Mutation sweep and passive effect bucket
//! - [`root`] - `create_root` and the [`Root`] handle

mod begin_work;
mod child_fiber;
mod commit_work;
mod complete_work;
mod context;
pub(crate) mod hooks;
pub mod root;
mod sync_queue;
pub(crate) mod update_queue;
mod work_loop;

pub use commit_work::{CommitRecord, DeletionEntry, EffectEntry};
pub use hooks::{RenderCx, SetState, StartTransition, Teardown};
pub use root::{ErrorHandler, Root, RootOptions, create_root, create_root_with_options};
pub use update_queue::{Action, Update, UpdateQueue};
