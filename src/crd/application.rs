//! Application Custom Resource Definition
//!
//! An Application declares a set of processes and the environment they
//! share. The operator derives a ConfigMap, a Deployment and a Service from it.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ProcessSpec};

/// Structured validation error for `ApplicationSpec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
}

impl SpecValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "app.example.com",
    version = "v1alpha1",
    kind = "Application",
    namespaced,
    status = "ApplicationStatus",
    shortname = "app",
    printcolumn = r#"{"name":"Workload","type":"string","jsonPath":".status.workloadName"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Environment shared by every process, delivered through the derived ConfigMap
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Processes to run. Only the first one currently drives the Deployment.
    #[serde(default)]
    #[schemars(length(min = 1))]
    pub processes: Vec<ProcessSpec>,
}

impl ApplicationSpec {
    /// Validate the spec
    ///
    /// Collects every problem instead of stopping at the first, so the
    /// status message lists all fields that need fixing.
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.processes.is_empty() {
            errors.push(SpecValidationError::new(
                "spec.processes",
                "at least one process is required",
            ));
        }

        let mut seen = HashSet::new();
        for (i, process) in self.processes.iter().enumerate() {
            let field = |name: &str| format!("spec.processes[{}].{}", i, name);

            if process.name.is_empty() {
                errors.push(SpecValidationError::new(field("name"), "must not be empty"));
            } else if !seen.insert(process.name.as_str()) {
                errors.push(SpecValidationError::new(
                    field("name"),
                    format!("duplicate process name {:?}", process.name),
                ));
            }

            if !is_tagged_image(&process.image) {
                errors.push(SpecValidationError::new(
                    field("image"),
                    format!("{:?} must have the form repository:tag", process.image),
                ));
            }

            if process.replicas < 1 {
                errors.push(SpecValidationError::new(
                    field("replicas"),
                    format!("must be at least 1, got {}", process.replicas),
                ));
            }

            if !(1..=65535).contains(&process.port) {
                errors.push(SpecValidationError::new(
                    field("port"),
                    format!("must be between 1 and 65535, got {}", process.port),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Matches `.+:.+`: a colon with at least one character on each side.
fn is_tagged_image(image: &str) -> bool {
    image
        .char_indices()
        .any(|(i, c)| c == ':' && i > 0 && i + 1 < image.len())
}

/// Observed state of an Application, written only by the operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    /// Name of the derived ConfigMap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,

    /// Name of the derived Deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload_name: Option<String>,

    /// Name of the derived Service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_name: Option<String>,

    /// Generation of the spec last acted upon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
