//! Object store abstraction used by the convergence engine
//!
//! The engine never talks to the API server directly. It reads and writes
//! through [`ObjectStore`] so the same logic runs against a live cluster
//! ([`KubeStore`]) or an in-memory store in tests.

use std::fmt;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::crd::Application;
use crate::error::{Error, Result};

/// Field manager recorded on status patches
pub const FIELD_MANAGER: &str = "app-operator";

/// Identifies an Application to reconcile
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object, defaulting the namespace like the API server does
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_else(|| "default".to_string()),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Get/create/update access to one kind of namespaced object
///
/// `get` maps a missing object to `Ok(None)`; every other failure is an error.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create(&self, obj: &K) -> Result<K>;

    /// Replace the object. Identity and ownership come from `obj` as observed.
    async fn update(&self, obj: &K) -> Result<K>;
}

/// Status writes for Applications, kept apart from spec updates
#[async_trait]
pub trait StatusStore: ObjectStore<Application> {
    async fn update_status(&self, app: &Application) -> Result<Application>;
}

/// Everything the convergence engine needs from a store
pub trait ClusterStore:
    StatusStore + ObjectStore<ConfigMap> + ObjectStore<Deployment> + ObjectStore<Service>
{
}

impl<T> ClusterStore for T where
    T: StatusStore + ObjectStore<ConfigMap> + ObjectStore<Deployment> + ObjectStore<Service>
{
}

/// Store backed by the Kubernetes API
///
/// Every call is bounded by `timeout`; an elapsed call surfaces as
/// [`Error::Timeout`], which is retriable.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    timeout: Duration,
}

impl KubeStore {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, kube::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(res) => res.map_err(Error::KubeError),
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let api: Api<K> = self.api(namespace);
        self.bounded(api.get_opt(name)).await
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::of(obj);
        let api: Api<K> = self.api(&key.namespace);
        debug!("Creating {} {}", K::kind(&()), key);
        self.bounded(api.create(&PostParams::default(), obj)).await
    }

    async fn update(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::of(obj);
        let api: Api<K> = self.api(&key.namespace);
        debug!("Replacing {} {}", K::kind(&()), key);
        self.bounded(api.replace(&key.name, &PostParams::default(), obj))
            .await
    }
}

#[async_trait]
impl StatusStore for KubeStore {
    async fn update_status(&self, app: &Application) -> Result<Application> {
        let key = ObjectKey::of(app);
        let api: Api<Application> = self.api(&key.namespace);
        let patch = serde_json::json!({ "status": app.status });
        self.bounded(api.patch_status(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        ))
        .await
    }
}
