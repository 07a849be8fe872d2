//! The process environment surface (spec §6): recognised configuration
//! keys, their defaults, and scan-engine tuning.

pub mod env;
pub mod error;
pub mod scan;

pub use env::{EnvConfig, NodeEnv};
pub use error::{ConfigError, ConfigResult};
pub use scan::scan_config_from_env;
