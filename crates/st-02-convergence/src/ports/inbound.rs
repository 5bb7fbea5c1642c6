//! Inbound Ports (Driving Ports / API)

use crate::domain::entities::{
    ActualSnapshot, ConvergenceReport, DestroyReport, ExpectedSnapshot, Phase,
};
use crate::domain::errors::ReconcileError;
use crate::domain::value_objects::ChangeSet;
use async_trait::async_trait;
use shared_types::Cluster;

/// Reconciler contract for one cluster run.
///
/// Operations must be called in order; out-of-order calls fail with
/// `ReconcileError::InvalidTransition`.
#[async_trait]
pub trait Reconciler: Send {
    /// Validate the document, build the graph, authenticate.
    async fn init(&mut self) -> Result<(), ReconcileError>;

    /// Observe every resource in topological order.
    async fn get_actual(&mut self) -> Result<&ActualSnapshot, ReconcileError>;

    /// Derive desired state and the change set.
    async fn get_expected(&mut self) -> Result<&ExpectedSnapshot, ReconcileError>;

    /// Apply creates and updates in dependency order, then deletes in
    /// reverse order.
    async fn reconcile(&mut self) -> Result<ConvergenceReport, ReconcileError>;

    /// Delete every observed resource in reverse dependency order.
    async fn destroy(&mut self) -> Result<DestroyReport, ReconcileError>;

    fn phase(&self) -> Phase;

    fn changes(&self) -> Option<&ChangeSet>;

    fn document(&self) -> &Cluster;
}
