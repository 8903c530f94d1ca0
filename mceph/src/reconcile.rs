//! Shared lifecycle contract for cluster resources.

use thiserror::Error;

use crate::client::ClientError;

/// Reconciliation errors, naming the operation (and property) that failed.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to create {kind} {name}: {source}")]
    Create {
        kind: &'static str,
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to set {property} on {kind} {name}: {source}")]
    SetProperty {
        kind: &'static str,
        name: String,
        property: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("failed to read {kind} {name}: {source}")]
    Observe {
        kind: &'static str,
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to update {kind} {name}: {source}")]
    Update {
        kind: &'static str,
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to delete {kind} {name}: {source}")]
    Delete {
        kind: &'static str,
        name: String,
        #[source]
        source: ClientError,
    },
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Uniform create/observe/update/delete contract over one resource kind.
///
/// `observe` distinguishes a resource the control plane no longer knows
/// (`Ok(None)`) from a failed read (`Err`), so callers can forget state for
/// deleted resources instead of failing the cycle. Creation is not
/// transactional: a failed follow-up command leaves the partially
/// configured resource in place, and the error names the property that
/// failed.
#[allow(async_fn_in_trait)]
pub trait Reconcile {
    type Spec;
    type State;

    /// Create the resource and return its initial observed state.
    async fn create(&self, spec: &Self::Spec) -> Result<Self::State>;

    /// Re-derive observed state, keyed by the prior state's identity.
    async fn observe(&self, prior: &Self::State) -> Result<Option<Self::State>>;

    /// Converge the resource toward `spec`, issuing commands only for
    /// fields that differ from `prior`.
    async fn update(&self, spec: &Self::Spec, prior: &Self::State) -> Result<Self::State>;

    /// Destroy the resource.
    async fn delete(&self, prior: &Self::State) -> Result<()>;
}
