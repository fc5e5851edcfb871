//! Pipeline module.
//!
//! This module provides the reconciliation pipeline and its builder.

mod builder;

pub use builder::{Pipeline, PipelineBuilder};
