//! FireSense basic library
//!
//! Provides functions shared by the FireSense tools:
//! - logging bootstrap (console + optional daily file)
//! - layered configuration loading
//! - shutdown signal handling

pub mod config_loader;
pub mod error;
pub mod logging;
pub mod shutdown;

pub use config_loader::{load_config, load_config_from_file};
pub use error::{Error, Result};
pub use logging::LogConfig;
