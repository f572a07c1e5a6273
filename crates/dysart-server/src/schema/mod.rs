//! Request and response types of the HTTP API.

pub mod features;
pub mod project;
pub mod records;
