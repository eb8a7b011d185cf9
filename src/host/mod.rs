//! Output Adapter - The narrow contract between the reconciler and its target.
//!
//! The reconciler never touches a concrete output tree. Everything it does to
//! the screen (or to an off-screen stand-in) goes through [`HostConfig`]:
//!
//! ```text
//! complete phase   create_instance / create_text_instance / append_initial_child
//! commit phase     append_child_to_container / insert_child_to_container
//!                  remove_child / commit_text_update / commit_update
//! ```
//!
//! Handles are plain copyable ids. The adapter owns the nodes they refer to.
//!
//! - [`MemoryHost`] - In-memory output tree used by tests and demos

mod memory;

pub use memory::{HostOp, MemoryHost, MemoryNode};

use crate::element::Props;

/// Identifier of a node in the output tree (container, element or text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostHandle(pub u64);

impl std::fmt::Display for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Structural inconsistency detected by an output adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The child is already attached to a different parent.
    #[error("parent id mismatch: {child} belongs to {current}, not {requested}")]
    ParentMismatch {
        child: HostHandle,
        current: HostHandle,
        requested: HostHandle,
    },

    /// `insert_child_to_container` was given a reference that is not a child.
    #[error("insert before {before}: reference is not a child of {parent}")]
    ReferenceNotFound { before: HostHandle, parent: HostHandle },

    /// `remove_child` was given a node that is not a child.
    #[error("{child} is not a child of {parent}")]
    ChildNotFound { child: HostHandle, parent: HostHandle },

    /// The handle does not name a live node.
    #[error("unknown host handle {0}")]
    UnknownHandle(HostHandle),

    /// The handle names a node that cannot hold children or text.
    #[error("{0} cannot be used for this operation")]
    WrongKind(HostHandle),
}

impl HostError {
    /// The handle the error is about.
    pub fn handle(&self) -> HostHandle {
        match self {
            HostError::ParentMismatch { child, .. } => *child,
            HostError::ReferenceNotFound { before, .. } => *before,
            HostError::ChildNotFound { child, .. } => *child,
            HostError::UnknownHandle(handle) => *handle,
            HostError::WrongKind(handle) => *handle,
        }
    }
}

/// Operations the reconciler performs on an output tree.
///
/// Containers and elements are both valid parents. Moving a child that is
/// already attached to the same parent must reposition it, not duplicate it.
pub trait HostConfig {
    /// Allocate an element handle. Not attached anywhere yet.
    fn create_instance(&mut self, element_type: &str, props: &Props) -> HostHandle;

    /// Allocate a text handle. Not attached anywhere yet.
    fn create_text_instance(&mut self, content: &str) -> HostHandle;

    /// Attach a child while building an off-screen subtree.
    fn append_initial_child(&mut self, parent: HostHandle, child: HostHandle) -> Result<(), HostError>;

    /// Append (or move to the end) a child of a mounted parent.
    fn append_child_to_container(&mut self, container: HostHandle, child: HostHandle) -> Result<(), HostError>;

    /// Insert (or move) `child` immediately before `before`.
    fn insert_child_to_container(
        &mut self,
        child: HostHandle,
        container: HostHandle,
        before: HostHandle,
    ) -> Result<(), HostError>;

    /// Detach `child` from `container`.
    fn remove_child(&mut self, child: HostHandle, container: HostHandle) -> Result<(), HostError>;

    /// Replace the content of a text handle.
    fn commit_text_update(&mut self, handle: HostHandle, content: &str) -> Result<(), HostError>;

    /// Apply new props to an element handle.
    fn commit_update(&mut self, handle: HostHandle, props: &Props) -> Result<(), HostError>;
}
