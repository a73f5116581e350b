//! Application operator
//!
//! Converges `Application` custom resources into a ConfigMap, a Deployment
//! and a Service, and reports the names of those resources on the
//! Application's status.

pub mod controller;
pub mod crd;
pub mod error;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
