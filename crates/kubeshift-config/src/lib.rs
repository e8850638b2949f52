//! KubeShift configuration
//!
//! Layered configuration (TOML file under environment overrides), per-user
//! storage locations and tracing setup.

pub mod error;
pub mod logging;
pub mod manager;
pub mod paths;
pub mod types;

pub use error::{ConfigError, Result};
pub use logging::init_logging;
pub use manager::{ConfigManager, ENV_PREFIX};
pub use paths::{default_config_path, default_progress_dir, resolve_home, HOME_ENV_VAR};
pub use types::{KubeshiftConfig, LoggingConfig, PersistFormat, ProgressConfig, QueueConfig};
