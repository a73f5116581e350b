//! Drift detection for derived resources
//!
//! Each derived kind declares which fields the operator owns. Observed
//! objects carry server-populated defaults (cluster IPs, node ports,
//! termination message paths), so only operator-owned fields are compared
//! and only those are overwritten on update.

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{ConfigMap, Container, Service, ServicePort};
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ResourceKind;

/// A resource derived from an Application and reconciled by the engine
pub trait DerivedResource:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    const KIND: ResourceKind;

    /// Whether any operator-owned field of `self` differs from `desired`
    fn drifted_from(&self, desired: &Self) -> bool;

    /// Overwrite operator-owned fields with `desired`, keeping identity,
    /// ownership and server-populated fields
    fn absorb(&mut self, desired: Self);
}

/// Desired labels must all be present with the same values
fn labels_drifted(
    observed: &Option<BTreeMap<String, String>>,
    desired: &Option<BTreeMap<String, String>>,
) -> bool {
    let observed = observed.as_ref();
    desired
        .iter()
        .flatten()
        .any(|(k, v)| observed.and_then(|labels| labels.get(k)) != Some(v))
}

fn absorb_labels(
    observed: &mut Option<BTreeMap<String, String>>,
    desired: Option<BTreeMap<String, String>>,
) {
    if let Some(desired) = desired {
        observed.get_or_insert_with(BTreeMap::new).extend(desired);
    }
}

impl DerivedResource for ConfigMap {
    const KIND: ResourceKind = ResourceKind::ConfigMap;

    fn drifted_from(&self, desired: &Self) -> bool {
        let observed_data = self.data.clone().unwrap_or_default();
        let desired_data = desired.data.clone().unwrap_or_default();
        observed_data != desired_data
            || labels_drifted(&self.metadata.labels, &desired.metadata.labels)
    }

    fn absorb(&mut self, desired: Self) {
        self.data = desired.data;
        absorb_labels(&mut self.metadata.labels, desired.metadata.labels);
    }
}

fn protocol_or_tcp(protocol: &Option<String>) -> &str {
    protocol.as_deref().unwrap_or("TCP")
}

fn template_labels(spec: &DeploymentSpec) -> Option<BTreeMap<String, String>> {
    spec.template
        .metadata
        .as_ref()
        .and_then(|m| m.labels.clone())
}

fn containers(spec: &DeploymentSpec) -> Vec<Container> {
    spec.template
        .spec
        .as_ref()
        .map(|p| p.containers.clone())
        .unwrap_or_default()
}

fn container_drifted(observed: &Container, desired: &Container) -> bool {
    let ports = |c: &Container| -> Vec<(i32, String)> {
        c.ports
            .iter()
            .flatten()
            .map(|p| (p.container_port, protocol_or_tcp(&p.protocol).to_string()))
            .collect()
    };

    observed.name != desired.name
        || observed.image != desired.image
        || observed.env.clone().unwrap_or_default() != desired.env.clone().unwrap_or_default()
        || ports(observed) != ports(desired)
}

impl DerivedResource for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;

    fn drifted_from(&self, desired: &Self) -> bool {
        if labels_drifted(&self.metadata.labels, &desired.metadata.labels) {
            return true;
        }
        let (Some(observed), Some(desired)) = (self.spec.as_ref(), desired.spec.as_ref()) else {
            return self.spec.is_none() != desired.spec.is_none();
        };

        if observed.replicas != desired.replicas
            || template_labels(observed) != template_labels(desired)
        {
            return true;
        }

        let (observed, desired) = (containers(observed), containers(desired));
        observed.len() != desired.len()
            || observed
                .iter()
                .zip(desired.iter())
                .any(|(o, d)| container_drifted(o, d))
    }

    fn absorb(&mut self, desired: Self) {
        absorb_labels(&mut self.metadata.labels, desired.metadata.labels);
        let Some(desired) = desired.spec else {
            return;
        };
        match self.spec.as_mut() {
            // The selector is immutable once created and stays as observed
            Some(observed) => {
                observed.replicas = desired.replicas;
                observed.template = desired.template;
            }
            None => self.spec = Some(desired),
        }
    }
}

fn port_drifted(observed: &ServicePort, desired: &ServicePort) -> bool {
    observed.port != desired.port
        || protocol_or_tcp(&observed.protocol) != protocol_or_tcp(&desired.protocol)
        || desired
            .target_port
            .as_ref()
            .is_some_and(|target| observed.target_port.as_ref() != Some(target))
}

impl DerivedResource for Service {
    const KIND: ResourceKind = ResourceKind::Service;

    fn drifted_from(&self, desired: &Self) -> bool {
        if labels_drifted(&self.metadata.labels, &desired.metadata.labels) {
            return true;
        }
        let (Some(observed), Some(desired)) = (self.spec.as_ref(), desired.spec.as_ref()) else {
            return self.spec.is_none() != desired.spec.is_none();
        };

        let observed_ports = observed.ports.clone().unwrap_or_default();
        let desired_ports = desired.ports.clone().unwrap_or_default();

        observed.type_ != desired.type_
            || observed.selector != desired.selector
            || observed_ports.len() != desired_ports.len()
            || observed_ports
                .iter()
                .zip(desired_ports.iter())
                .any(|(o, d)| port_drifted(o, d))
    }

    fn absorb(&mut self, desired: Self) {
        absorb_labels(&mut self.metadata.labels, desired.metadata.labels);
        let Some(desired) = desired.spec else {
            return;
        };
        let observed = match self.spec.as_mut() {
            Some(observed) => observed,
            None => {
                self.spec = Some(desired);
                return;
            }
        };

        // Keep allocated node ports so clients are not moved
        let previous = observed.ports.take().unwrap_or_default();
        let ports = desired.ports.map(|ports| {
            ports
                .into_iter()
                .map(|mut port| {
                    port.node_port = previous
                        .iter()
                        .find(|p| p.port == port.port)
                        .and_then(|p| p.node_port);
                    port
                })
                .collect()
        });

        observed.type_ = desired.type_;
        observed.selector = desired.selector;
        observed.ports = ports;
    }
}
