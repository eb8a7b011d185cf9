//! Error types for the reconciler.
//!
//! Two families of failure are fatal for the render or commit that hits them:
//! - Contract violations by component code (hook order, missing provider value)
//! - Structural inconsistencies reported by the output adapter
//!
//! Neither is retried. The work loop abandons the in-progress tree, records the
//! error on the root and waits for the next update.

use crate::host::{HostError, HostHandle};

/// Fatal error raised while rendering or committing a root.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FiberError {
    /// A component called more hooks than during its previous render.
    #[error("{component} rendered more hooks than during the previous render")]
    TooManyHooks { component: String },

    /// A component called fewer hooks than during its previous render.
    #[error("{component} rendered fewer hooks than expected ({expected} expected, {found} called)")]
    TooFewHooks {
        component: String,
        expected: usize,
        found: usize,
    },

    /// The hook at `index` is a different kind of hook than last render.
    #[error("{component} changed the order of hooks: hook #{index} was {previous}, now {requested}")]
    HookOrderMismatch {
        component: String,
        index: usize,
        previous: &'static str,
        requested: &'static str,
    },

    /// The hook at `index` was read back as a different value type.
    #[error("{component} read hook #{index} with a different state type")]
    HookTypeMismatch { component: String, index: usize },

    /// A context provider element was rendered without a value.
    #[error("context provider for {context} is missing its `value` prop")]
    MissingContextValue { context: &'static str },

    /// Placement or deletion could not find a host ancestor.
    #[error("no host parent found above {0}")]
    MissingHostParent(String),

    /// The output adapter rejected a mutation.
    #[error(transparent)]
    Host(#[from] HostError),
}

impl FiberError {
    /// Returns true for errors caused by component code rather than the reconciler.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            FiberError::TooManyHooks { .. }
                | FiberError::TooFewHooks { .. }
                | FiberError::HookOrderMismatch { .. }
                | FiberError::HookTypeMismatch { .. }
                | FiberError::MissingContextValue { .. }
        )
    }

    /// Host handle involved in a structural error, if any.
    pub fn host_handle(&self) -> Option<HostHandle> {
        match self {
            FiberError::Host(err) => Some(err.handle()),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = FiberError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violation_classification() {
        let err = FiberError::TooManyHooks {
            component: "Counter".into(),
        };
        assert!(err.is_contract_violation());
        assert_eq!(
            err.to_string(),
            "Counter rendered more hooks than during the previous render"
        );

        let host = FiberError::from(HostError::ChildNotFound {
            child: HostHandle(4),
            parent: HostHandle(1),
        });
        assert!(!host.is_contract_violation());
        assert_eq!(host.host_handle(), Some(HostHandle(4)));
    }
}
