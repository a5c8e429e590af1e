//! Host document model and the value types derived from it.

pub mod document;
pub mod errors;
pub mod model;
