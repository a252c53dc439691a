//! One optional command-line flag per known setting.
//!
//! The defaults published here are the ones the setting registry starts every
//! load cycle from; the help text repeats them so `--help` stays truthful.

use std::time::Duration;

use clap::{builder::BoolishValueParser, Args};
use toml::Value;

use super::{format_duration, parse_duration};
use crate::config::ConfigMapping;

macro_rules! define_str_default_with_help {
    ($value_ident:ident, $help_ident:ident, $value:literal, $help_prefix:literal) => {
        pub const $value_ident: &str = $value;
        pub const $help_ident: &str = concat!($help_prefix, $value, "]");
    };
}

macro_rules! define_u32_default_with_help {
    ($value_ident:ident, $help_ident:ident, $value:literal, $help_prefix:literal) => {
        pub const $value_ident: u32 = $value;
        pub const $help_ident: &str = concat!($help_prefix, stringify!($value), "]");
    };
}

macro_rules! define_secs_default_with_help {
    ($value_ident:ident, $help_ident:ident, $value:literal, $help_prefix:literal) => {
        pub const $value_ident: u64 = $value;
        pub const $help_ident: &str = concat!($help_prefix, stringify!($value), "s]");
    };
}

define_str_default_with_help!(
    DEFAULT_BIND,
    HELP_BIND,
    "127.0.0.1:8000",
    "Optional. Socket address to bind; repeat to bind several. [default: "
);
define_u32_default_with_help!(
    DEFAULT_BACKLOG,
    HELP_BACKLOG,
    2048,
    "Optional. Maximum number of pending connections. [default: "
);
define_u32_default_with_help!(
    DEFAULT_WORKERS,
    HELP_WORKERS,
    1,
    "Optional. Number of worker processes. [default: "
);
define_str_default_with_help!(
    DEFAULT_WORKER_CLASS,
    HELP_WORKER_CLASS,
    "sync",
    "Optional. Worker type the supervisor spawns. [default: "
);
define_u32_default_with_help!(
    DEFAULT_THREADS,
    HELP_THREADS,
    1,
    "Optional. Handler threads per worker. [default: "
);
define_u32_default_with_help!(
    DEFAULT_WORKER_CONNECTIONS,
    HELP_WORKER_CONNECTIONS,
    1000,
    "Optional. Maximum simultaneous clients per worker. [default: "
);
define_u32_default_with_help!(
    DEFAULT_MAX_REQUESTS,
    HELP_MAX_REQUESTS,
    0,
    "Optional. Requests a worker serves before it is recycled; 0 disables recycling. [default: "
);
define_secs_default_with_help!(
    DEFAULT_TIMEOUT_SECS,
    HELP_TIMEOUT,
    30,
    "Optional. Silent workers are restarted after this long; accepts human-friendly durations. [default: "
);
define_secs_default_with_help!(
    DEFAULT_GRACEFUL_TIMEOUT_SECS,
    HELP_GRACEFUL_TIMEOUT,
    30,
    "Optional. Grace period for workers to finish in-flight requests on restart. [default: "
);
define_secs_default_with_help!(
    DEFAULT_KEEPALIVE_SECS,
    HELP_KEEPALIVE,
    2,
    "Optional. Time to wait for requests on a keep-alive connection. [default: "
);
define_str_default_with_help!(
    DEFAULT_LOGLEVEL,
    HELP_LOGLEVEL,
    "info",
    "Optional. Log verbosity: trace, debug, info, warn or error. [default: "
);
define_str_default_with_help!(
    DEFAULT_ERRORLOG,
    HELP_ERRORLOG,
    "-",
    "Optional. Error log file; `-` writes to stderr. [default: "
);

pub const DEFAULT_DAEMON: bool = false;
pub const DEFAULT_SPEW: bool = false;
pub const DEFAULT_CHECK_CONFIG: bool = false;
pub const DEFAULT_PRINT_CONFIG: bool = false;
pub const DEFAULT_ENABLE_STDIO_INHERITANCE: bool = false;
pub const DEFAULT_PRELOAD_APP: bool = false;

#[derive(Args, Debug, Clone, Default)]
#[command(next_help_heading = "Settings")]
pub struct SettingOptions {
    #[arg(
        short = 'b',
        long = "bind",
        value_name = "ADDRESS",
        help = HELP_BIND
    )]
    pub bind: Vec<String>,

    #[arg(long = "backlog", value_name = "INT", help = HELP_BACKLOG)]
    pub backlog: Option<u32>,

    #[arg(short = 'w', long = "workers", value_name = "INT", help = HELP_WORKERS)]
    pub workers: Option<u32>,

    #[arg(
        short = 'k',
        long = "worker_class",
        alias = "worker-class",
        value_name = "CLASS",
        help = HELP_WORKER_CLASS
    )]
    pub worker_class: Option<String>,

    #[arg(long = "threads", value_name = "INT", help = HELP_THREADS)]
    pub threads: Option<u32>,

    #[arg(
        long = "worker_connections",
        alias = "worker-connections",
        value_name = "INT",
        help = HELP_WORKER_CONNECTIONS
    )]
    pub worker_connections: Option<u32>,

    #[arg(
        long = "max_requests",
        alias = "max-requests",
        value_name = "INT",
        help = HELP_MAX_REQUESTS
    )]
    pub max_requests: Option<u32>,

    #[arg(
        short = 't',
        long = "timeout",
        value_name = "DURATION",
        value_parser = parse_duration,
        help = HELP_TIMEOUT
    )]
    pub timeout: Option<Duration>,

    #[arg(
        long = "graceful_timeout",
        alias = "graceful-timeout",
        value_name = "DURATION",
        value_parser = parse_duration,
        help = HELP_GRACEFUL_TIMEOUT
    )]
    pub graceful_timeout: Option<Duration>,

    #[arg(
        long = "keepalive",
        alias = "keep-alive",
        value_name = "DURATION",
        value_parser = parse_duration,
        help = HELP_KEEPALIVE
    )]
    pub keepalive: Option<Duration>,

    #[arg(
        short = 'D',
        long = "daemon",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        help = "Optional. Detach from the controlling terminal before starting the supervisor. [default: false]"
    )]
    pub daemon: Option<bool>,

    #[arg(
        short = 'p',
        long = "pid",
        alias = "pidfile",
        value_name = "FILE",
        help = "Optional. File the supervisor writes its pid to. [default: none]"
    )]
    pub pidfile: Option<String>,

    #[arg(
        long = "search_path",
        alias = "search-path",
        value_name = "DIRS",
        help = "Optional. Comma-separated directories prepended to the application search path; later entries take priority. [default: none]"
    )]
    pub search_path: Option<String>,

    #[arg(
        long = "spew",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        help = "Optional. Emit trace-level instrumentation for every event. [default: false]"
    )]
    pub spew: Option<bool>,

    #[arg(
        long = "check_config",
        alias = "check-config",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        help = "Optional. Check the configuration and that the application loads, then exit. [default: false]"
    )]
    pub check_config: Option<bool>,

    #[arg(
        long = "print_config",
        alias = "print-config",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        help = "Optional. Print the resolved configuration, check it, then exit. [default: false]"
    )]
    pub print_config: Option<bool>,

    #[arg(
        long = "enable_stdio_inheritance",
        alias = "enable-stdio-inheritance",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        help = "Optional. Keep stdio attached when running as a daemon. [default: false]"
    )]
    pub enable_stdio_inheritance: Option<bool>,

    #[arg(
        long = "preload",
        alias = "preload_app",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        help = "Optional. Load the application before the supervisor starts its workers. [default: false]"
    )]
    pub preload_app: Option<bool>,

    #[arg(
        long = "log_level",
        alias = "log-level",
        alias = "loglevel",
        value_name = "LEVEL",
        help = HELP_LOGLEVEL
    )]
    pub loglevel: Option<String>,

    #[arg(
        long = "error_logfile",
        alias = "error-logfile",
        alias = "log-file",
        value_name = "FILE",
        help = HELP_ERRORLOG
    )]
    pub errorlog: Option<String>,

    #[arg(
        short = 'n',
        long = "name",
        alias = "proc_name",
        value_name = "NAME",
        help = "Optional. Process name reported by the supervisor. [default: none]"
    )]
    pub proc_name: Option<String>,

    #[arg(
        short = 'e',
        long = "env",
        value_name = "KEY=VALUE",
        help = "Optional. Environment entry handed to the workers; repeat for several. [default: none]"
    )]
    pub raw_env: Vec<String>,
}

impl SettingOptions {
    /// Collects every flag that was actually given, keyed by setting name.
    ///
    /// Flags left unset produce no entry, so they can never clear a value an
    /// earlier tier established.
    pub fn into_mapping(self) -> ConfigMapping {
        let mut mapping = ConfigMapping::new();

        put(&mut mapping, "bind", non_empty(self.bind).map(string_array));
        put(&mut mapping, "backlog", self.backlog.map(integer));
        put(&mut mapping, "workers", self.workers.map(integer));
        put(&mut mapping, "worker_class", self.worker_class.map(Value::String));
        put(&mut mapping, "threads", self.threads.map(integer));
        put(
            &mut mapping,
            "worker_connections",
            self.worker_connections.map(integer),
        );
        put(&mut mapping, "max_requests", self.max_requests.map(integer));
        put(&mut mapping, "timeout", self.timeout.map(duration));
        put(
            &mut mapping,
            "graceful_timeout",
            self.graceful_timeout.map(duration),
        );
        put(&mut mapping, "keepalive", self.keepalive.map(duration));
        put(&mut mapping, "daemon", self.daemon.map(Value::Boolean));
        put(&mut mapping, "pidfile", self.pidfile.map(Value::String));
        put(&mut mapping, "search_path", self.search_path.map(Value::String));
        put(&mut mapping, "spew", self.spew.map(Value::Boolean));
        put(&mut mapping, "check_config", self.check_config.map(Value::Boolean));
        put(&mut mapping, "print_config", self.print_config.map(Value::Boolean));
        put(
            &mut mapping,
            "enable_stdio_inheritance",
            self.enable_stdio_inheritance.map(Value::Boolean),
        );
        put(&mut mapping, "preload_app", self.preload_app.map(Value::Boolean));
        put(&mut mapping, "loglevel", self.loglevel.map(Value::String));
        put(&mut mapping, "errorlog", self.errorlog.map(Value::String));
        put(&mut mapping, "proc_name", self.proc_name.map(Value::String));
        put(&mut mapping, "raw_env", non_empty(self.raw_env).map(string_array));

        mapping
    }
}

fn put(mapping: &mut ConfigMapping, name: &str, value: Option<Value>) {
    if let Some(value) = value {
        mapping.insert(name.to_string(), value);
    }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

fn string_array(values: Vec<String>) -> Value {
    Value::Array(values.into_iter().map(Value::String).collect())
}

fn integer(value: u32) -> Value {
    Value::Integer(i64::from(value))
}

fn duration(value: Duration) -> Value {
    Value::String(format_duration(value))
}
