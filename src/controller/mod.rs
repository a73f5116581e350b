//! Controller module for Application reconciliation
//! This module contains the controller loop, the convergence engine,
//! the resource builders and the object store it works against.

pub mod conditions;
mod derived;
#[cfg(feature = "metrics")]
pub mod metrics;
mod reconciler;
pub mod resources;
#[cfg(test)]
mod resources_test;
pub mod store;

pub use derived::DerivedResource;
pub use reconciler::{
    reconcile_application, run_controller, ControllerConfig, ControllerState, ReconcileOutcome,
    ResourceOperation, CONTROLLER_NAME,
};
pub use store::{ClusterStore, KubeStore, ObjectKey, ObjectStore, StatusStore};
