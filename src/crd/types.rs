//! Shared types for Application specifications
//!
//! These types are used across the CRD definition and controller logic.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single process of an Application
///
/// Each process runs as one container image exposing one port.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    /// Process name, used to name the container
    #[serde(default)]
    pub name: String,

    /// Container image in `repository:tag` form
    #[serde(default)]
    #[schemars(regex(pattern = r".+:.+"))]
    pub image: String,

    /// Port the process listens on
    pub port: i32,

    /// Desired number of running copies
    #[schemars(range(min = 1))]
    pub replicas: i32,
}

/// Kubernetes-style condition for Application status
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Ready")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
