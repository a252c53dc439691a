//! Configuration resolution.
//!
//! Assembles one [`ConfigStore`] per load cycle from layered sources, lowest
//! priority first:
//! - Setting defaults
//! - Values returned by the application hook
//! - Configuration file or registered module
//! - Command-line flags (highest priority)

mod error;
mod loader;
pub mod registry;
mod resolver;
mod store;

use std::fmt;

pub use error::ConfigurationError;
pub use loader::{default_config_candidates, ConfigLocation, ConfigSourceLoader, ModuleRegistry};
pub use registry::{SettingSpec, SettingValue, Validator};
pub use resolver::{ConfigResolver, Resolved};
pub use store::{ConfigStore, Setting};

/// Plain name → value mapping produced by every configuration source.
pub type ConfigMapping = toml::Table;

/// Origin of a batch of values. The derived order is the merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigSource {
    Default,
    AppHook,
    File,
    Module,
    Cli,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigSource::Default => "default",
            ConfigSource::AppHook => "app-hook",
            ConfigSource::File => "file",
            ConfigSource::Module => "module",
            ConfigSource::Cli => "cli",
        };
        f.write_str(label)
    }
}
