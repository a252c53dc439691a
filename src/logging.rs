//! Tracing subscriber setup and the switch that retunes it after a reload.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::config::ConfigStore;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const SPEW_FILTER: &str = "trace";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Adjusts the live log filter. A detached switch only records requests.
///
/// When `RUST_LOG` chose the starting filter, configured levels never
/// replace it; only spew does.
#[derive(Clone, Default)]
pub struct TraceSwitch {
    handle: Option<FilterHandle>,
    spewing: Arc<AtomicBool>,
    env_override: bool,
}

impl std::fmt::Debug for TraceSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceSwitch")
            .field("attached", &self.handle.is_some())
            .field("spewing", &self.is_spewing())
            .field("env_override", &self.env_override)
            .finish()
    }
}

impl TraceSwitch {
    pub fn detached() -> Self {
        Self::default()
    }

    fn attached(handle: FilterHandle, env_override: bool) -> Self {
        Self {
            handle: Some(handle),
            spewing: Arc::new(AtomicBool::new(false)),
            env_override,
        }
    }

    /// Whether `loglevel` from the configuration drives the filter.
    pub fn follows_loglevel(&self) -> bool {
        !self.env_override && !self.is_spewing()
    }

    pub fn is_spewing(&self) -> bool {
        self.spewing.load(Ordering::SeqCst)
    }

    /// Raises the filter to trace level for every target.
    pub fn activate_spew(&self) -> Result<()> {
        self.spewing.store(true, Ordering::SeqCst);
        self.reload(SPEW_FILTER)
    }

    /// Re-applies the configured level unless spew or `RUST_LOG` owns the
    /// filter.
    pub fn apply_level(&self, level: &str) -> Result<()> {
        if !self.follows_loglevel() {
            return Ok(());
        }
        self.reload(level)
    }

    /// Brings the filter in line with a freshly resolved store.
    pub fn apply(&self, store: &ConfigStore) -> Result<()> {
        if store.spew() {
            self.activate_spew()
        } else {
            self.apply_level(store.loglevel())
        }
    }

    fn reload(&self, directives: &str) -> Result<()> {
        if let Some(handle) = &self.handle {
            handle
                .reload(EnvFilter::new(directives))
                .with_context(|| format!("failed to switch log filter to {directives}"))?;
        }
        Ok(())
    }
}

/// Installs the global subscriber for the resolved configuration.
///
/// `RUST_LOG`, when set, decides the starting filter; otherwise the store's
/// `loglevel` does. Logs go to `errorlog` when it names a file.
pub fn init_tracing(store: &ConfigStore) -> Result<TraceSwitch> {
    let (filter, env_override) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(store.loglevel()), false),
    };
    let (filter_layer, handle) = reload::Layer::new(filter);
    let registry = tracing_subscriber::registry().with(filter_layer);

    let init_result = if let Some(path) = store.errorlog() {
        let file = open_log_file(path)?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        let _ = LOG_GUARD.set(guard);
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if init_result.is_err() {
        // Another subscriber already owns the process (tests, embedding hosts).
        return Ok(TraceSwitch::detached());
    }

    let switch = TraceSwitch::attached(handle, env_override);
    if store.spew() {
        switch.activate_spew()?;
    }
    Ok(switch)
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}
