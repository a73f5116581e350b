//! Custom Resource Definitions for the Application operator
//!
//! This module defines the Kubernetes CRD describing an Application.

mod application;
pub mod types;


pub use application::{Application, ApplicationSpec, ApplicationStatus, SpecValidationError};
pub use types::*;
