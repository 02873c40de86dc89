//! tfcheck - Terraform module lifecycle checks
//!
//! Drives Terraform / OpenTofu configuration directories through init,
//! validate, apply with an idempotency check, and an unconditional destroy.

pub mod lifecycle;
pub mod output;
pub mod suite;
pub mod terraform;

mod error;

pub use error::TfcheckError;
pub use lifecycle::{LifecycleError, LifecycleReport, LifecycleRunner, Step, StepStatus};
pub use suite::{CaseSpec, Suite, SuiteReport};
pub use terraform::{Options, Terraform, TerraformError, with_default_retryable_errors};
