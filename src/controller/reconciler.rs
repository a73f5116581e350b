//! Main reconciler for Application resources
//!
//! [`reconcile_application`] is the convergence engine: it loads one
//! Application, derives the ConfigMap, Deployment and Service it should own,
//! creates or updates each in that order and records their names in status.
//! [`run_controller`] wires it into the kube-rs runtime.

use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "metrics")]
use std::time::Instant;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Resource, ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{Application, ApplicationStatus};
use crate::error::{Error, ResourceKind, Result, StoreOp};

use super::conditions::{
    set_condition, CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_TYPE_READY,
};
use super::derived::DerivedResource;
#[cfg(feature = "metrics")]
use super::metrics;
use super::resources::{
    derive_config_map, derive_deployment, derive_service, set_controller_reference,
};
use super::store::{ClusterStore, KubeStore, ObjectKey, ObjectStore, StatusStore};

/// Name used for this controller in metrics
pub const CONTROLLER_NAME: &str = "application";

/// Tunables for the controller loop
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Requeue delay after a retriable error
    pub retry_interval: Duration,
    /// Requeue delay after an error that needs user action
    pub fatal_retry_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            retry_interval: Duration::from_secs(15),
            fatal_retry_interval: Duration::from_secs(300),
        }
    }
}

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub store: KubeStore,
    pub config: ControllerConfig,
}

/// What a single derived-resource step did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceOperation {
    Created,
    Updated,
    Unchanged,
}

impl ResourceOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceOperation::Created => "created",
            ResourceOperation::Updated => "updated",
            ResourceOperation::Unchanged => "unchanged",
        }
    }
}

/// Successful result of one reconciliation
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// The Application no longer exists; nothing was done
    Absent,
    /// Every derived resource matches the Application
    Converged {
        status: ApplicationStatus,
        operations: Vec<(ResourceKind, ResourceOperation)>,
    },
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let namespace = state.config.namespace.clone();
    let applications: Api<Application> = scoped_api(&client, namespace.as_deref());

    info!(
        "Starting Application controller (namespace: {})",
        namespace.as_deref().unwrap_or("<all>")
    );

    // Verify CRD exists
    match applications.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("Application CRD is available"),
        Err(e) => {
            error!(
                "Application CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "Application CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(applications, Config::default())
        // Watch owned resources so drift triggers reconciliation
        .owns::<ConfigMap>(scoped_api(&client, namespace.as_deref()), Config::default())
        .owns::<Deployment>(scoped_api(&client, namespace.as_deref()), Config::default())
        .owns::<Service>(scoped_api(&client, namespace.as_deref()), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled {}", obj),
                Err(e) => warn!("Reconcile error: {}", e),
            }
        })
        .await;

    info!("Application controller terminated");
    Ok(())
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Controller callback, invoked for the Application and for its owned resources
#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = %obj.namespace().unwrap_or_default()))]
async fn reconcile(obj: Arc<Application>, ctx: Arc<ControllerState>) -> Result<Action> {
    let key = ObjectKey::of(obj.as_ref());

    #[cfg(feature = "metrics")]
    let started = Instant::now();

    let result = reconcile_application(&ctx.store, &key).await;

    #[cfg(feature = "metrics")]
    metrics::observe_reconcile_duration_seconds(
        CONTROLLER_NAME,
        started.elapsed().as_secs_f64(),
    );

    match result? {
        ReconcileOutcome::Absent => debug!("Application {} is gone", key),
        ReconcileOutcome::Converged { operations, .. } => {
            let changed = operations
                .iter()
                .filter(|(_, op)| *op != ResourceOperation::Unchanged)
                .count();
            info!("Application {} converged ({} resources changed)", key, changed);
        }
    }

    // Owned resources are watched, so no periodic requeue is needed
    Ok(Action::await_change())
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(app: Arc<Application>, error: &Error, ctx: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {}", app.name_any(), error);

    #[cfg(feature = "metrics")]
    metrics::inc_reconcile_error(CONTROLLER_NAME, error.metric_label());

    if error.is_retriable() {
        Action::requeue(ctx.config.retry_interval)
    } else {
        Action::requeue(ctx.config.fatal_retry_interval)
    }
}

/// Converge one Application
///
/// A missing Application is not an error. Any store failure aborts the
/// remaining steps; steps already applied stay applied and are safe to
/// repeat. Status is written last, and only when it changed.
#[instrument(skip(store), fields(namespace = %key.namespace, name = %key.name))]
pub async fn reconcile_application<S>(store: &S, key: &ObjectKey) -> Result<ReconcileOutcome>
where
    S: ClusterStore + ?Sized,
{
    let app = <S as ObjectStore<Application>>::get(store, &key.namespace, &key.name)
        .await
        .map_err(|e| e.in_step(ResourceKind::Application, StoreOp::Get, &key.name))?;

    let Some(app) = app else {
        info!("Application {} not found, nothing to reconcile", key);
        return Ok(ReconcileOutcome::Absent);
    };

    info!("Reconciling Application {}", key);

    let mut status = app.status.clone().unwrap_or_default();
    status.observed_generation = app.metadata.generation;

    if let Err(errors) = app.spec.validate() {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        warn!("Validation failed for {}: {}", key, message);

        set_condition(
            &mut status.conditions,
            CONDITION_TYPE_READY,
            CONDITION_STATUS_FALSE,
            "InvalidSpec",
            &message,
            app.metadata.generation,
        );
        if let Err(e) = persist_status(store, &app, status).await {
            warn!("Failed to record validation failure for {}: {}", key, e);
        }
        return Err(Error::InvalidSpec(message));
    }

    let mut operations = Vec::with_capacity(3);

    let (name, op) = reconcile_owned(store, &app, derive_config_map(&app)).await?;
    status.config_name = Some(name);
    operations.push((ConfigMap::KIND, op));

    let (name, op) = reconcile_owned(store, &app, derive_deployment(&app)?).await?;
    status.workload_name = Some(name);
    operations.push((Deployment::KIND, op));

    let (name, op) = reconcile_owned(store, &app, derive_service(&app)).await?;
    status.exposure_name = Some(name);
    operations.push((Service::KIND, op));

    set_condition(
        &mut status.conditions,
        CONDITION_TYPE_READY,
        CONDITION_STATUS_TRUE,
        "Reconciled",
        "ConfigMap, Deployment and Service match the Application",
        app.metadata.generation,
    );
    persist_status(store, &app, status.clone()).await?;

    Ok(ReconcileOutcome::Converged { status, operations })
}

/// Create `desired` if absent, update it if its owned fields drifted
///
/// The owner reference is attached before anything is written, so a
/// created object is garbage-collectable from the moment it exists.
#[instrument(skip_all, fields(kind = %K::KIND))]
async fn reconcile_owned<K, S>(
    store: &S,
    app: &Application,
    mut desired: K,
) -> Result<(String, ResourceOperation)>
where
    K: DerivedResource,
    S: ObjectStore<K> + ?Sized,
{
    let key = ObjectKey::of(&desired);
    set_controller_reference(app, desired.meta_mut())?;

    let observed = store
        .get(&key.namespace, &key.name)
        .await
        .map_err(|e| e.in_step(K::KIND, StoreOp::Get, &key.name))?;

    let operation = match observed {
        None => {
            info!("Creating {} {}", K::KIND, key);
            store
                .create(&desired)
                .await
                .map_err(|e| e.in_step(K::KIND, StoreOp::Create, &key.name))?;
            ResourceOperation::Created
        }
        Some(mut observed) if observed.drifted_from(&desired) => {
            info!("Updating existing {} {}", K::KIND, key);
            observed.absorb(desired);
            store
                .update(&observed)
                .await
                .map_err(|e| e.in_step(K::KIND, StoreOp::Update, &key.name))?;
            ResourceOperation::Updated
        }
        Some(_) => {
            debug!("{} {} is up to date", K::KIND, key);
            ResourceOperation::Unchanged
        }
    };

    #[cfg(feature = "metrics")]
    metrics::inc_resource_operation(&K::KIND.to_string(), operation.as_str());

    Ok((key.name, operation))
}

async fn persist_status<S>(store: &S, app: &Application, status: ApplicationStatus) -> Result<()>
where
    S: StatusStore + ?Sized,
{
    if app.status.as_ref() == Some(&status) {
        debug!("Status of {} unchanged", app.name_any());
        return Ok(());
    }

    let mut updated = app.clone();
    updated.status = Some(status);
    store
        .update_status(&updated)
        .await
        .map_err(|e| e.in_step(ResourceKind::Application, StoreOp::UpdateStatus, app.name_any()))?;
    Ok(())
}
