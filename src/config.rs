//! Configuration module for pollect.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Global settings (default tick time, worker threads)
//! - Global and per-executor writers
//! - Executor definitions (collection, interval, sources)
//!
//! String values may reference the environment with `${VAR}` or
//! `${VAR:-default}`; `$$` produces a literal `$`.

mod app;
mod setup;
mod validation;

pub use app::{AppConfig, DEFAULT_TICK_TIME, ExecutorConfig, MIN_TICK_TIME};
pub use setup::Configuration;
pub use validation::{ConfigError, expand_env_vars, parse_duration};
