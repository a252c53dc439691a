//! # apphost
//!
//! Configuration resolution and process bootstrap for a server application
//! host.
//!
//! Settings are merged from four tiers, lowest to highest:
//!
//! 1. registry defaults
//! 2. the application's own hook ([`Application::init`])
//! 3. a TOML file or a named built-in module (`--config`)
//! 4. command-line flags
//!
//! [`ApplicationHost`] then validates only, detaches into the background, or
//! hands the process to a [`Supervisor`].

pub mod cli;
pub mod config;
pub mod daemon;
pub mod host;
pub mod logging;
pub mod search_path;

pub use cli::Cli;
pub use config::{
    ConfigLocation, ConfigMapping, ConfigResolver, ConfigSource, ConfigSourceLoader, ConfigStore,
    ConfigurationError, ModuleRegistry, SettingValue,
};
pub use daemon::{Daemonizer, ReexecDaemonizer};
pub use host::{
    conclude, Application, ApplicationHost, HostError, HostState, RunOutcome, Supervisor,
    SupervisorStartupError,
};
pub use logging::{init_tracing, TraceSwitch};
pub use search_path::SearchPath;
