//! Infrastructure adapters for snapshots, config, storage, logging, and highlighting.

pub mod config;
pub mod highlight;
pub mod logging;
pub mod snapshot;
pub mod storage;
