// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use thiserror::Error;

use crate::api::{FaultKind, LocalizedMethodFault, ManagedObjectReference};

#[derive(Debug, Error)]
pub enum VsphereError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{path:?} not found")]
    NotFound { path: String },

    #[error("{path:?} is ambiguous: {matches} objects share that name")]
    AmbiguousPath { path: String, matches: usize },

    #[error("managed object {0} no longer exists")]
    ObjectNotFound(ManagedObjectReference),

    /// A fault raised by the remote side. Displays the remote message verbatim.
    #[error("{0}")]
    Fault(LocalizedMethodFault),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("session is closed")]
    SessionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{action}: {source}")]
    Operation {
        action: String,
        #[source]
        source: Box<VsphereError>,
    },

    #[error(transparent)]
    VmRemoval(RemovalErrors),
}

impl VsphereError {
    /// Wrap this error with a description of what was being attempted.
    #[must_use]
    pub fn during(self, action: impl Into<String>) -> Self {
        VsphereError::Operation {
            action: action.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through [`VsphereError::Operation`].
    #[must_use]
    pub fn root(&self) -> &VsphereError {
        match self {
            VsphereError::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// The remote fault behind this error, if any.
    #[must_use]
    pub fn fault(&self) -> Option<&LocalizedMethodFault> {
        match self.root() {
            VsphereError::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    /// Whether the remote fault behind this error is of `kind`.
    #[must_use]
    pub fn is_fault(&self, kind: &FaultKind) -> bool {
        self.fault().is_some_and(|f| &f.kind == kind)
    }

    /// Whether a path or object lookup matched nothing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            VsphereError::NotFound { .. } | VsphereError::ObjectNotFound(_)
        )
    }

    /// Whether retrying the same call could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self.root(), VsphereError::Transport(_))
    }
}

impl From<LocalizedMethodFault> for VsphereError {
    fn from(fault: LocalizedMethodFault) -> Self {
        VsphereError::Fault(fault)
    }
}

/// A virtual machine that could not be removed, and why.
#[derive(Debug)]
pub struct RemovalFailure {
    /// VM name as observed before removal.
    pub name: String,
    /// VM reference.
    pub vm: ManagedObjectReference,
    /// What went wrong.
    pub error: VsphereError,
}

/// Every per-VM failure of one bulk removal, in input order.
#[derive(Debug, Default)]
pub struct RemovalErrors {
    /// Number of VMs the removal attempted.
    pub attempted: usize,
    /// The VMs that failed.
    pub failures: Vec<RemovalFailure>,
}

impl RemovalErrors {
    /// The first failure in input order.
    #[must_use]
    pub fn first(&self) -> Option<&RemovalFailure> {
        self.failures.first()
    }

    /// Number of failed VMs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether no VM failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the failed VMs.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.name.as_str())
    }
}

impl fmt::Display for RemovalErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to remove {} of {} virtual machines",
            self.failures.len(),
            self.attempted
        )?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.name, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemovalErrors {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.first()
            .map(|f| &f.error as &(dyn std::error::Error + 'static))
    }
}

pub type Result<T> = std::result::Result<T, VsphereError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display_is_verbatim() {
        let err = VsphereError::Fault(LocalizedMethodFault::new(
            FaultKind::NotAuthenticated,
            "nope",
        ));
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn test_during_keeps_root() {
        let err = VsphereError::NotFound {
            path: "foo/bar".to_string(),
        }
        .during("moving folder");
        assert_eq!(err.to_string(), "moving folder: \"foo/bar\" not found");
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_fault_lookup_through_context() {
        let err = VsphereError::Fault(LocalizedMethodFault::new(
            FaultKind::InvalidPowerState,
            "vm is busy",
        ))
        .during("powering off vm-1");
        assert!(err.is_fault(&FaultKind::InvalidPowerState));
        assert_eq!(err.fault().map(|f| f.localized_message.as_str()), Some("vm is busy"));
    }

    #[test]
    fn test_transport_is_transient() {
        assert!(VsphereError::Transport("reset".to_string()).is_transient());
        assert!(!VsphereError::SessionClosed.is_transient());
    }

    #[test]
    fn test_removal_errors_display() {
        let errors = RemovalErrors {
            attempted: 2,
            failures: vec![RemovalFailure {
                name: "vm-1".to_string(),
                vm: ManagedObjectReference::virtual_machine("FakeVm1"),
                error: VsphereError::Transport("reset".to_string()),
            }],
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.names().collect::<Vec<_>>(), vec!["vm-1"]);
        assert_eq!(
            errors.to_string(),
            "failed to remove 1 of 2 virtual machines; vm-1: Transport error: reset"
        );
    }
}
