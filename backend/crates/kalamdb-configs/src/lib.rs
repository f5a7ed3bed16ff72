//! kalamdb-configs
//!
//! Configuration types, loader and logging setup for the KalamDB schema layer
//! and row indexing pipeline.

pub mod config;
pub mod logging;

pub use config::defaults;
pub use config::*;
