//! Axum handlers, one module per resource.

pub mod features;
pub mod project;
pub mod records;
