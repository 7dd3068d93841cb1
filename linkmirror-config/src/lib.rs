//! Configuration loading for linkmirror.
//!
//! Reads an optional `.env`, then a TOML or JSON file (or inline JSON from the
//! environment), applies environment overrides, and validates the result.
//! Problems that make startup pointless are errors; everything else is
//! returned as [`ConfigWarnings`] for the binary to log.

#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{Config, ConfigMetadata, ConfigSource, DatabaseSettings, NotificationSettings};
pub use validation::{ConfigValidationError, ConfigWarning, ConfigWarnings};
