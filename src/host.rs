//! Application lifecycle: load the configuration, optionally validate only,
//! optionally detach, then hand the process over to the supervisor.
//!
//! ```text
//! Unloaded ─► ConfigLoaded ─► CallableLoaded ─► Running
//!     └──────────────┴───────────────┴────────────┴──► Failed
//! ```
//!
//! Every step returns a `Result`; [`conclude`] is the one place that prints a
//! fatal diagnostic and picks the exit status.

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use thiserror::Error;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::{ConfigLocation, ConfigMapping, ConfigResolver, ConfigStore, ConfigurationError};
use crate::daemon::{Daemonizer, ReexecDaemonizer};
use crate::logging::TraceSwitch;
use crate::search_path::SearchPath;

/// Hooks an application provides to the host.
pub trait Application {
    /// The request-handling callable the supervisor serves with.
    type Handler;

    /// Optional settings derived from the parsed command line. Merged above
    /// the defaults and below every other tier.
    fn init(&mut self, _cli: &Cli) -> anyhow::Result<Option<ConfigMapping>> {
        Ok(None)
    }

    /// Materializes the request handler.
    fn load(&mut self) -> anyhow::Result<Self::Handler>;
}

/// The external component that owns workers, sockets and signals.
pub trait Supervisor<A: Application> {
    /// Runs for the remainder of the process's useful life.
    ///
    /// Only failures to start are reported back; anything after serving
    /// begins is the supervisor's own business.
    fn run(
        &mut self,
        host: &mut ApplicationHost<A>,
        search_path: &SearchPath,
    ) -> Result<(), SupervisorStartupError>;
}

/// The supervisor could not acquire what it needs to start.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct SupervisorStartupError(#[from] anyhow::Error);

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("error while loading the application: {0:#}")]
    AppLoad(anyhow::Error),

    #[error("failed to prepare launch: {0:#}")]
    Launch(anyhow::Error),

    #[error("supervisor failed to start: {0:#}")]
    SupervisorStartup(#[from] SupervisorStartupError),
}

impl HostError {
    pub fn exit_code(&self) -> u8 {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Unloaded,
    ConfigLoaded,
    CallableLoaded,
    Running,
    Failed,
}

/// How [`ApplicationHost::run`] finished when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Validate-only mode: the configuration and the application load.
    ConfigChecked,
    /// This process started the detached daemon and has nothing left to do.
    Detached { pid: u32 },
    /// The supervisor returned control.
    SupervisorExited,
}

/// Owns the resolved configuration and drives the lifecycle.
pub struct ApplicationHost<A: Application> {
    app: A,
    cli: Cli,
    resolver: ConfigResolver,
    store: ConfigStore,
    location: Option<ConfigLocation>,
    handler: Option<A::Handler>,
    state: HostState,
    usage: Option<String>,
    prog: Option<String>,
    search_path: SearchPath,
    trace: TraceSwitch,
    daemonizer: Box<dyn Daemonizer>,
}

impl<A: Application> ApplicationHost<A> {
    /// Creates the host and performs the first configuration load.
    pub fn new(app: A, cli: Cli, resolver: ConfigResolver) -> Result<Self, HostError> {
        let mut host = Self {
            app,
            cli,
            resolver,
            store: ConfigStore::with_defaults(),
            location: None,
            handler: None,
            state: HostState::Unloaded,
            usage: None,
            prog: None,
            search_path: SearchPath::new(),
            trace: TraceSwitch::detached(),
            daemonizer: Box::new(ReexecDaemonizer),
        };
        host.do_load_config()?;
        Ok(host)
    }

    #[must_use]
    pub fn with_identity(mut self, usage: impl Into<String>, prog: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self.prog = Some(prog.into());
        self
    }

    /// Directories already on the search path before `search_path` entries
    /// are prepended at launch.
    #[must_use]
    pub fn with_search_path(mut self, search_path: SearchPath) -> Self {
        self.search_path = search_path;
        self
    }

    #[must_use]
    pub fn with_trace_switch(mut self, trace: TraceSwitch) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub fn with_daemonizer(mut self, daemonizer: impl Daemonizer + 'static) -> Self {
        self.daemonizer = Box::new(daemonizer);
        self
    }

    pub fn config(&self) -> &ConfigStore {
        &self.store
    }

    /// Where the file/module tier of the current store came from.
    pub fn config_location(&self) -> Option<&ConfigLocation> {
        self.location.as_ref()
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn usage(&self) -> Option<&str> {
        self.usage.as_deref()
    }

    pub fn prog(&self) -> Option<&str> {
        self.prog.as_deref()
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn trace_switch(&self) -> &TraceSwitch {
        &self.trace
    }

    /// Rebuilds the store from the defaults up. The current store is only
    /// replaced once the whole sequence succeeded.
    pub fn do_load_config(&mut self) -> Result<(), HostError> {
        match self.resolver.resolve(&mut self.app, &self.cli) {
            Ok(resolved) => {
                self.store = resolved.store;
                self.location = resolved.location;
                self.state = match self.state {
                    HostState::Running => HostState::Running,
                    _ if self.handler.is_some() => HostState::CallableLoaded,
                    _ => HostState::ConfigLoaded,
                };
                Ok(())
            }
            Err(err) => {
                self.state = HostState::Failed;
                Err(err.into())
            }
        }
    }

    /// Recomputes the configuration from scratch.
    ///
    /// The cached handler survives: the first successful load serves for the
    /// lifetime of the host.
    pub fn reload(&mut self) -> Result<(), HostError> {
        self.do_load_config()?;
        info!(location = ?self.location, "configuration reloaded");
        if let Err(err) = self.trace.apply(&self.store) {
            warn!(error = %err, "failed to retune log filter after reload");
        }
        Ok(())
    }

    /// The request handler, loaded on first use and cached afterwards.
    pub fn handler(&mut self) -> anyhow::Result<&A::Handler> {
        let handler = match self.handler.take() {
            Some(handler) => handler,
            None => self.app.load()?,
        };
        if self.state == HostState::ConfigLoaded {
            self.state = HostState::CallableLoaded;
        }
        Ok(self.handler.insert(handler))
    }

    pub fn handler_loaded(&self) -> bool {
        self.handler.is_some()
    }

    /// Validates only, detaches, or hands the process to `supervisor`.
    pub fn run<S>(&mut self, supervisor: &mut S) -> Result<RunOutcome, HostError>
    where
        S: Supervisor<A>,
    {
        let result = self.run_inner(supervisor);
        if result.is_err() {
            self.state = HostState::Failed;
        }
        result
    }

    fn run_inner<S>(&mut self, supervisor: &mut S) -> Result<RunOutcome, HostError>
    where
        S: Supervisor<A>,
    {
        if self.store.check_config() || self.store.print_config() {
            return self.check();
        }

        if self.store.spew() {
            if let Err(err) = self.trace.activate_spew() {
                warn!(error = %err, "failed to activate spew tracing");
            }
        }

        if self.store.daemon() && !self.cli.daemon_child {
            let pid = self
                .daemonizer
                .detach(self.store.enable_stdio_inheritance())
                .map_err(HostError::Launch)?;
            info!(pid, "started daemon child");
            return Ok(RunOutcome::Detached { pid });
        }

        let search_path = self
            .search_path
            .with_prepended(self.store.search_path())
            .map_err(HostError::Launch)?;

        self.state = HostState::Running;
        supervisor.run(self, &search_path)?;
        Ok(RunOutcome::SupervisorExited)
    }

    fn check(&mut self) -> Result<RunOutcome, HostError> {
        if self.store.print_config() {
            let rendered = self.store.render_toml().map_err(HostError::Launch)?;
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(rendered.as_bytes())
                .and_then(|()| stdout.flush())
                .context("failed to write resolved configuration")
                .map_err(HostError::Launch)?;
        }
        self.handler().map_err(HostError::AppLoad)?;
        Ok(RunOutcome::ConfigChecked)
    }
}

/// Writes the diagnostic for a fatal error: the full cause chain when the
/// application failed to load, the one-line message otherwise.
pub fn write_fatal<W: Write>(out: &mut W, err: &HostError) -> std::io::Result<()> {
    match err {
        HostError::AppLoad(source) => {
            writeln!(out, "\nError while loading the application:\n\n{source:?}")?
        }
        other => writeln!(out, "\nError: {other}")?,
    }
    out.flush()
}

/// Prints a fatal error to stderr and flushes it.
pub fn report_fatal(err: &HostError) {
    let _ = write_fatal(&mut std::io::stderr().lock(), err);
}

/// Turns the outcome of the bootstrap into the process exit status.
pub fn conclude(result: Result<RunOutcome, HostError>) -> ExitCode {
    match result {
        Ok(outcome) => {
            if let RunOutcome::Detached { pid } = outcome {
                info!(pid, "detached; parent exiting");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report_fatal(&err);
            ExitCode::from(err.exit_code())
        }
    }
}
