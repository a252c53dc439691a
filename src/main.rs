//! # apphost
//!
//! Reference binary for the application host.
//!
//! Resolves the layered configuration, then either checks it, detaches into
//! the background, or runs an idle supervisor until Ctrl-C.
//!
//! ## Usage
//!
//! ```bash
//! # Serve the echo handler with the development preset
//! apphost -c module:apphost.development echo
//!
//! # Print the resolved configuration and exit
//! apphost -c ./apphost.toml --print-config health
//!
//! # Run as daemon
//! apphost --daemon --pid /tmp/apphost.pid echo
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::{CommandFactory, Parser};
use tokio::runtime::Builder;
use toml::Value;
use tracing::{info, warn};

use apphost::cli::format_duration;
use apphost::config::{ConfigMapping, ConfigResolver, ConfigSourceLoader, ModuleRegistry};
use apphost::{
    conclude, init_tracing, Application, ApplicationHost, Cli, HostError, RunOutcome, SearchPath,
    Supervisor, SupervisorStartupError,
};

const DEVELOPMENT_MODULE: &str = "apphost.development";
const PRODUCTION_MODULE: &str = "apphost.production";

fn main() -> ExitCode {
    let cli = Cli::parse();
    let resolver = ConfigResolver::new(ConfigSourceLoader::new(builtin_modules()));
    conclude(run(cli, resolver))
}

fn run(cli: Cli, resolver: ConfigResolver) -> Result<RunOutcome, HostError> {
    let host = ApplicationHost::new(BuiltinApp::default(), cli, resolver)?;
    let trace = init_tracing(host.config()).map_err(HostError::Launch)?;
    let usage = Cli::command().render_usage().to_string();
    let mut host = host
        .with_trace_switch(trace)
        .with_identity(usage, env!("CARGO_PKG_NAME"));

    announce_configuration(&host);
    host.run(&mut IdleSupervisor)
}

fn builtin_modules() -> ModuleRegistry {
    ModuleRegistry::new()
        .register(DEVELOPMENT_MODULE, || {
            preset(&[
                ("loglevel", Value::String("debug".into())),
                ("workers", Value::Integer(1)),
                ("timeout", Value::String("5m".into())),
            ])
        })
        .register(PRODUCTION_MODULE, || {
            preset(&[
                ("loglevel", Value::String("warn".into())),
                ("workers", Value::Integer(4)),
                ("worker_class", Value::String("gthread".into())),
                ("threads", Value::Integer(4)),
                ("preload_app", Value::Boolean(true)),
            ])
        })
}

fn preset(entries: &[(&str, Value)]) -> ConfigMapping {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn announce_configuration(host: &ApplicationHost<BuiltinApp>) {
    let config = host.config();

    info!("Starting application host.");
    match host.config_location() {
        Some(location) => info!("Config: {location}"),
        None => info!("Config: none (using defaults)"),
    }
    info!("Bind: {}", config.bind().join(", "));
    info!("Worker timeout: {}", format_duration(config.timeout()));
    info!(
        "Workers: {} x {} ({})",
        config.workers(),
        config.worker_class(),
        host.app().handler_name().unwrap_or("no handler selected")
    );
}

/// Request handlers shipped with the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinHandler {
    Echo,
    Health,
}

impl BuiltinHandler {
    fn from_name(name: &str) -> Result<Self> {
        match name {
            "echo" => Ok(BuiltinHandler::Echo),
            "health" => Ok(BuiltinHandler::Health),
            other => bail!("unknown handler {other:?}; expected `echo` or `health`"),
        }
    }

    fn respond(&self, request: &str) -> String {
        match self {
            BuiltinHandler::Echo => request.to_string(),
            BuiltinHandler::Health => "ok".to_string(),
        }
    }
}

/// Picks its handler from the first positional argument.
#[derive(Debug, Default)]
struct BuiltinApp {
    handler_name: Option<String>,
}

impl BuiltinApp {
    fn handler_name(&self) -> Option<&str> {
        self.handler_name.as_deref()
    }
}

impl Application for BuiltinApp {
    type Handler = BuiltinHandler;

    fn init(&mut self, cli: &Cli) -> Result<Option<ConfigMapping>> {
        let Some(name) = cli.args.first() else {
            return Ok(None);
        };
        self.handler_name = Some(name.clone());

        let mut mapping = ConfigMapping::new();
        mapping.insert(
            "proc_name".into(),
            Value::String(format!("{}-{name}", env!("CARGO_PKG_NAME"))),
        );
        Ok(Some(mapping))
    }

    fn load(&mut self) -> Result<BuiltinHandler> {
        let name = self
            .handler_name
            .as_deref()
            .ok_or_else(|| anyhow!("no handler given; pass `echo` or `health`"))?;
        BuiltinHandler::from_name(name)
    }
}

/// Holds the pid file and waits for Ctrl-C; SIGHUP reloads the configuration.
struct IdleSupervisor;

impl Supervisor<BuiltinApp> for IdleSupervisor {
    fn run(
        &mut self,
        host: &mut ApplicationHost<BuiltinApp>,
        search_path: &SearchPath,
    ) -> Result<(), SupervisorStartupError> {
        let _pid_guard = match host.config().pidfile() {
            Some(path) => {
                write_pid_file(path, std::process::id())?;
                Some(PidFileGuard::new(path.to_path_buf()))
            }
            None => None,
        };

        if host.config().preload_app() {
            let handler = host.handler().context("failed to preload application")?;
            info!(response = %handler.respond("ping"), "application preloaded");
        }

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build runtime")?;

        info!(
            search_path = ?search_path.entries(),
            proc_name = host.config().proc_name().unwrap_or("-"),
            "supervisor idle; press Ctrl-C to stop"
        );
        runtime.block_on(wait_for_shutdown(host))?;
        info!("shutdown requested");
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_shutdown(host: &mut ApplicationHost<BuiltinApp>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to listen for SIGHUP")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                return result.context("failed to listen for Ctrl-C");
            }
            _ = hangup.recv() => {
                if let Err(err) = host.reload() {
                    warn!(error = %err, "reload failed; keeping previous configuration");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_host: &mut ApplicationHost<BuiltinApp>) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")
}

struct PidFileGuard {
    path: PathBuf,
}

impl PidFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn write_pid_file(pid_path: &Path, pid: u32) -> Result<()> {
    if let Some(parent) = pid_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create pid directory {}", parent.display()))?;
    }
    fs::write(pid_path, pid.to_string()).with_context(|| {
        format!(
            "failed to write pid file {} for pid {pid}",
            pid_path.display()
        )
    })?;
    Ok(())
}
