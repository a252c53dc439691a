//! Turns a configuration location into a plain name → value mapping.
//!
//! Locations use a small prefix protocol:
//! - `module:<name>` looks up a module registered with [`ModuleRegistry`]
//! - `file:<path>` or a bare path reads a TOML document
//!
//! Configuration files are data only. Nothing in them is executed; every
//! top-level key is a candidate binding and the store decides which ones it
//! knows.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use super::{ConfigMapping, ConfigSource, ConfigurationError};

pub const CONFIG_FILE_NAME: &str = "apphost.toml";
const MODULE_PREFIX: &str = "module:";
const FILE_PREFIX: &str = "file:";
const PROJECT_QUALIFIER: &str = "org";
const PROJECT_ORGANIZATION: &str = "apphost";
const PROJECT_APPLICATION: &str = "apphost";

/// Where a configuration tier comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    File(PathBuf),
    Module(String),
}

impl ConfigLocation {
    pub fn parse(location: &str) -> Self {
        if let Some(name) = location.strip_prefix(MODULE_PREFIX) {
            ConfigLocation::Module(name.trim().to_string())
        } else if let Some(path) = location.strip_prefix(FILE_PREFIX) {
            ConfigLocation::File(PathBuf::from(path))
        } else {
            ConfigLocation::File(PathBuf::from(location))
        }
    }

    /// The tier this location feeds.
    pub fn source(&self) -> ConfigSource {
        match self {
            ConfigLocation::File(_) => ConfigSource::File,
            ConfigLocation::Module(_) => ConfigSource::Module,
        }
    }
}

impl fmt::Display for ConfigLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLocation::File(path) => write!(f, "{FILE_PREFIX}{}", path.display()),
            ConfigLocation::Module(name) => write!(f, "{MODULE_PREFIX}{name}"),
        }
    }
}

type ModuleFactory = Box<dyn Fn() -> ConfigMapping + Send + Sync>;

/// Named configuration modules declared at startup.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any earlier registration.
    #[must_use]
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> ConfigMapping + Send + Sync + 'static,
    {
        self.modules.insert(name.into(), Box::new(factory));
        self
    }

    fn namespace(&self, name: &str) -> Result<ConfigMapping, ConfigurationError> {
        self.modules
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ConfigurationError::UnknownModule {
                name: name.to_string(),
            })
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolves [`ConfigLocation`]s to mappings.
#[derive(Debug, Default)]
pub struct ConfigSourceLoader {
    modules: ModuleRegistry,
}

impl ConfigSourceLoader {
    pub fn new(modules: ModuleRegistry) -> Self {
        Self { modules }
    }

    pub fn load(&self, location: &ConfigLocation) -> Result<ConfigMapping, ConfigurationError> {
        match location {
            ConfigLocation::Module(name) => {
                debug!(module = %name, "loading configuration module");
                self.modules.namespace(name)
            }
            ConfigLocation::File(path) => read_config_file(path),
        }
    }
}

fn read_config_file(path: &Path) -> Result<ConfigMapping, ConfigurationError> {
    if !path.exists() {
        return Err(ConfigurationError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    debug!(path = %path.display(), "reading configuration file");
    let contents = fs::read_to_string(path).map_err(|source| ConfigurationError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigurationError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}

fn default_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(PROJECT_QUALIFIER, PROJECT_ORGANIZATION, PROJECT_APPLICATION)
}

/// Conventional file locations probed when no location is given, in order.
pub fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(CONFIG_FILE_NAME));
    }
    if let Some(dirs) = default_project_dirs() {
        candidates.push(dirs.config_dir().join(CONFIG_FILE_NAME));
    }
    candidates
}
