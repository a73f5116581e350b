//! Kubernetes resource builders for Application
//!
//! Pure functions that derive the ConfigMap, Deployment and Service an
//! Application should own. Nothing here talks to the cluster.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapKeySelector, Container, ContainerPort, EnvVar, EnvVarSource, PodSpec,
    PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use crate::crd::Application;
use crate::error::{Error, Result};

/// Label key carrying the Application name on every derived object
pub const APP_LABEL: &str = "app";

/// Port the derived Service listens on
pub const SERVICE_PORT: i32 = 80;

/// Labels and selectors shared by every derived resource
///
/// Always `{"app": <application name>}`. Selectors and pod template labels
/// must come from here so they can never drift apart.
pub fn labels_for(app: &Application) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), app.name_any())])
}

pub fn config_map_name(app: &Application) -> String {
    format!("{}-config", app.name_any())
}

pub fn workload_name(app: &Application) -> String {
    app.name_any()
}

pub fn service_name(app: &Application) -> String {
    app.name_any()
}

/// Create a controller OwnerReference for garbage collection
pub fn owner_reference(app: &Application) -> Result<OwnerReference> {
    let uid = app
        .metadata
        .uid
        .clone()
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| {
            Error::OwnershipAssignmentFailed(format!(
                "Application {} has no uid",
                app.name_any()
            ))
        })?;

    Ok(OwnerReference {
        api_version: Application::api_version(&()).to_string(),
        kind: Application::kind(&()).to_string(),
        name: app.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Record `app` as the controlling owner in `meta`
///
/// Fails when another object already controls the resource; an existing
/// reference to the same Application is refreshed in place.
pub fn set_controller_reference(app: &Application, meta: &mut ObjectMeta) -> Result<()> {
    let owner = owner_reference(app)?;
    let refs = meta.owner_references.get_or_insert_with(Vec::new);

    if let Some(other) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(Error::OwnershipAssignmentFailed(format!(
            "{} is already controlled by {} {}",
            meta.name.as_deref().unwrap_or_default(),
            other.kind,
            other.name
        )));
    }

    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) => *existing = owner,
        None => refs.push(owner),
    }
    Ok(())
}

fn object_meta(app: &Application, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: app.namespace(),
        labels: Some(labels_for(app)),
        ..Default::default()
    }
}

// ============================================================================
// ConfigMap
// ============================================================================

/// Build the ConfigMap holding the Application environment
pub fn derive_config_map(app: &Application) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(app, config_map_name(app)),
        data: Some(app.spec.environment.clone()),
        ..Default::default()
    }
}

/// One env var per environment key, read from the derived ConfigMap
///
/// Values are referenced rather than inlined so edits to the ConfigMap
/// reach the pods without touching the Deployment.
pub fn env_bindings(app: &Application) -> Vec<EnvVar> {
    let config_name = config_map_name(app);
    app.spec
        .environment
        .keys()
        .map(|key| EnvVar {
            name: key.clone(),
            value_from: Some(EnvVarSource {
                config_map_key_ref: Some(ConfigMapKeySelector {
                    name: Some(config_name.clone()),
                    key: key.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect()
}

// ============================================================================
// Deployment
// ============================================================================

/// Build the Deployment running the Application's first process
///
/// Only `processes[0]` is used; additional processes are not yet deployed.
pub fn derive_deployment(app: &Application) -> Result<Deployment> {
    let process = app.spec.processes.first().ok_or_else(|| {
        Error::InvalidSpec(format!(
            "Application {} declares no processes",
            app.name_any()
        ))
    })?;

    let labels = labels_for(app);
    let container = Container {
        name: format!("{}-{}", app.name_any(), process.name),
        image: Some(process.image.clone()),
        ports: Some(vec![ContainerPort {
            container_port: process.port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env_bindings(app)),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: object_meta(app, workload_name(app)),
        spec: Some(DeploymentSpec {
            replicas: Some(process.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

// ============================================================================
// Service
// ============================================================================

/// Build the NodePort Service exposing port 80
///
/// Traffic is forwarded to the first process's port when one is declared.
pub fn derive_service(app: &Application) -> Service {
    let target_port = app
        .spec
        .processes
        .first()
        .map(|p| IntOrString::Int(p.port));

    Service {
        metadata: object_meta(app, service_name(app)),
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(labels_for(app)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                protocol: Some("TCP".to_string()),
                port: SERVICE_PORT,
                target_port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
