//! Configuration management
//!
//! Node settings loaded from an optional TOML file and overridden by
//! environment variables. A single global instance is shared by the
//! transports and workers.

pub mod settings;

pub use settings::{Config, Settings, GLOBAL_CONFIG};
