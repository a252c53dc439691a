//! The canonical set of known settings, their defaults and validators.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use toml::Value;

use super::ConfigurationError;
use crate::cli::{
    parse_duration, DEFAULT_BACKLOG, DEFAULT_BIND, DEFAULT_CHECK_CONFIG, DEFAULT_DAEMON,
    DEFAULT_ENABLE_STDIO_INHERITANCE, DEFAULT_ERRORLOG, DEFAULT_GRACEFUL_TIMEOUT_SECS,
    DEFAULT_KEEPALIVE_SECS, DEFAULT_LOGLEVEL, DEFAULT_MAX_REQUESTS, DEFAULT_PRELOAD_APP,
    DEFAULT_PRINT_CONFIG, DEFAULT_SPEW, DEFAULT_THREADS, DEFAULT_TIMEOUT_SECS,
    DEFAULT_WORKERS, DEFAULT_WORKER_CLASS, DEFAULT_WORKER_CONNECTIONS,
};

pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A validated setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(u64),
    Str(String),
    OptStr(Option<String>),
    List(Vec<String>),
    Paths(Vec<PathBuf>),
    OptPath(Option<PathBuf>),
    Duration(#[serde(with = "humantime_serde")] Duration),
}

impl SettingValue {
    /// `true` for optional values that hold nothing.
    pub fn is_unset(&self) -> bool {
        matches!(self, SettingValue::OptStr(None) | SettingValue::OptPath(None))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            SettingValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Str(value) => Some(value),
            SettingValue::OptStr(value) => value.as_deref(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            SettingValue::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_paths(&self) -> Option<&[PathBuf]> {
        match self {
            SettingValue::Paths(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            SettingValue::OptPath(value) => value.as_deref(),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            SettingValue::Duration(value) => Some(*value),
            _ => None,
        }
    }
}

/// Coercion rule applied to every raw value before it reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    Bool,
    PositiveInt,
    NonNegativeInt,
    NonEmptyString,
    OptionalString,
    Choice(&'static [&'static str]),
    StringList,
    PathList,
    OptionalPath,
    Duration,
    EnvList,
}

impl Validator {
    /// Coerces `raw` into a [`SettingValue`] or explains why `name` rejects it.
    pub fn validate(&self, name: &str, raw: &Value) -> Result<SettingValue, ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::invalid(name, raw, reason);

        match self {
            Validator::Bool => coerce_bool(raw)
                .map(SettingValue::Bool)
                .ok_or_else(|| invalid("expected a boolean")),
            Validator::PositiveInt => match coerce_int(raw) {
                Some(value) if value > 0 => Ok(SettingValue::Int(value as u64)),
                Some(_) => Err(invalid("must be a positive integer")),
                None => Err(invalid("expected an integer")),
            },
            Validator::NonNegativeInt => match coerce_int(raw) {
                Some(value) if value >= 0 => Ok(SettingValue::Int(value as u64)),
                Some(_) => Err(invalid("must not be negative")),
                None => Err(invalid("expected an integer")),
            },
            Validator::NonEmptyString => match raw.as_str().map(str::trim) {
                Some(value) if !value.is_empty() => Ok(SettingValue::Str(value.to_string())),
                Some(_) => Err(invalid("must not be empty")),
                None => Err(invalid("expected a string")),
            },
            Validator::OptionalString => match raw.as_str().map(str::trim) {
                Some("") => Ok(SettingValue::OptStr(None)),
                Some(value) => Ok(SettingValue::OptStr(Some(value.to_string()))),
                None => Err(invalid("expected a string")),
            },
            Validator::Choice(choices) => {
                let value = raw
                    .as_str()
                    .map(|value| value.trim().to_lowercase())
                    .ok_or_else(|| invalid("expected a string"))?;
                if choices.contains(&value.as_str()) {
                    Ok(SettingValue::Str(value))
                } else {
                    Err(invalid(&format!("expected one of {}", choices.join(", "))))
                }
            }
            Validator::StringList => coerce_list(raw)
                .map(SettingValue::List)
                .ok_or_else(|| invalid("expected a list of strings")),
            Validator::PathList => coerce_list(raw)
                .map(|entries| SettingValue::Paths(entries.into_iter().map(PathBuf::from).collect()))
                .ok_or_else(|| invalid("expected a list of paths")),
            Validator::OptionalPath => match raw.as_str().map(str::trim) {
                Some("") => Ok(SettingValue::OptPath(None)),
                Some(value) => Ok(SettingValue::OptPath(Some(PathBuf::from(value)))),
                None => Err(invalid("expected a path")),
            },
            Validator::Duration => coerce_duration(raw)
                .map(SettingValue::Duration)
                .map_err(|reason| invalid(&reason)),
            Validator::EnvList => {
                let entries = coerce_list(raw).ok_or_else(|| invalid("expected a list of KEY=VALUE entries"))?;
                if let Some(bad) = entries.iter().find(|entry| !is_env_entry(entry)) {
                    return Err(invalid(&format!("{bad:?} is not a KEY=VALUE entry")));
                }
                Ok(SettingValue::List(entries))
            }
        }
    }
}

fn coerce_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Boolean(value) => Some(*value),
        Value::Integer(1) => Some(true),
        Value::Integer(0) => Some(false),
        Value::String(value) => match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_int(raw: &Value) -> Option<i64> {
    match raw {
        Value::Integer(value) => Some(*value),
        Value::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_list(raw: &Value) -> Option<Vec<String>> {
    match raw {
        Value::String(value) => Some(
            value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Value::Array(values) => values
            .iter()
            .map(|value| value.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

fn coerce_duration(raw: &Value) -> Result<Duration, String> {
    match raw {
        Value::Integer(secs) if *secs >= 0 => Ok(Duration::from_secs(*secs as u64)),
        Value::Integer(_) => Err("must not be negative".to_string()),
        Value::Float(secs) => Duration::try_from_secs_f64(*secs).map_err(|err| err.to_string()),
        Value::String(value) => parse_duration(value),
        _ => Err("expected a duration".to_string()),
    }
}

fn is_env_entry(entry: &str) -> bool {
    matches!(entry.split_once('='), Some((key, _)) if !key.trim().is_empty())
}

/// Static description of one known setting.
#[derive(Debug, Clone, Copy)]
pub struct SettingSpec {
    pub name: &'static str,
    pub validator: Validator,
    default: fn() -> SettingValue,
}

impl SettingSpec {
    const fn new(name: &'static str, validator: Validator, default: fn() -> SettingValue) -> Self {
        Self {
            name,
            validator,
            default,
        }
    }

    pub fn default_value(&self) -> SettingValue {
        (self.default)()
    }
}

const KNOWN_SETTINGS: &[SettingSpec] = &[
    SettingSpec::new("bind", Validator::StringList, || {
        SettingValue::List(vec![DEFAULT_BIND.to_string()])
    }),
    SettingSpec::new("backlog", Validator::PositiveInt, || {
        SettingValue::Int(u64::from(DEFAULT_BACKLOG))
    }),
    SettingSpec::new("workers", Validator::PositiveInt, || {
        SettingValue::Int(u64::from(DEFAULT_WORKERS))
    }),
    SettingSpec::new("worker_class", Validator::NonEmptyString, || {
        SettingValue::Str(DEFAULT_WORKER_CLASS.to_string())
    }),
    SettingSpec::new("threads", Validator::PositiveInt, || {
        SettingValue::Int(u64::from(DEFAULT_THREADS))
    }),
    SettingSpec::new("worker_connections", Validator::PositiveInt, || {
        SettingValue::Int(u64::from(DEFAULT_WORKER_CONNECTIONS))
    }),
    SettingSpec::new("max_requests", Validator::NonNegativeInt, || {
        SettingValue::Int(u64::from(DEFAULT_MAX_REQUESTS))
    }),
    SettingSpec::new("timeout", Validator::Duration, || {
        SettingValue::Duration(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }),
    SettingSpec::new("graceful_timeout", Validator::Duration, || {
        SettingValue::Duration(Duration::from_secs(DEFAULT_GRACEFUL_TIMEOUT_SECS))
    }),
    SettingSpec::new("keepalive", Validator::Duration, || {
        SettingValue::Duration(Duration::from_secs(DEFAULT_KEEPALIVE_SECS))
    }),
    SettingSpec::new("daemon", Validator::Bool, || SettingValue::Bool(DEFAULT_DAEMON)),
    SettingSpec::new("pidfile", Validator::OptionalPath, || SettingValue::OptPath(None)),
    SettingSpec::new("search_path", Validator::PathList, || SettingValue::Paths(Vec::new())),
    SettingSpec::new("spew", Validator::Bool, || SettingValue::Bool(DEFAULT_SPEW)),
    SettingSpec::new("check_config", Validator::Bool, || {
        SettingValue::Bool(DEFAULT_CHECK_CONFIG)
    }),
    SettingSpec::new("print_config", Validator::Bool, || {
        SettingValue::Bool(DEFAULT_PRINT_CONFIG)
    }),
    SettingSpec::new("enable_stdio_inheritance", Validator::Bool, || {
        SettingValue::Bool(DEFAULT_ENABLE_STDIO_INHERITANCE)
    }),
    SettingSpec::new("preload_app", Validator::Bool, || {
        SettingValue::Bool(DEFAULT_PRELOAD_APP)
    }),
    SettingSpec::new("loglevel", Validator::Choice(LOG_LEVELS), || {
        SettingValue::Str(DEFAULT_LOGLEVEL.to_string())
    }),
    SettingSpec::new("errorlog", Validator::NonEmptyString, || {
        SettingValue::Str(DEFAULT_ERRORLOG.to_string())
    }),
    SettingSpec::new("proc_name", Validator::OptionalString, || SettingValue::OptStr(None)),
    SettingSpec::new("raw_env", Validator::EnvList, || SettingValue::List(Vec::new())),
];

/// Every setting this host knows about.
pub fn known_settings() -> &'static [SettingSpec] {
    KNOWN_SETTINGS
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use toml::Value;

    use super::*;

    fn string(value: &str) -> Value {
        Value::String(value.to_string())
    }

    #[test]
    fn names_are_canonical_and_unique() {
        let mut names: Vec<&str> = known_settings().iter().map(|spec| spec.name).collect();
        for name in &names {
            assert_eq!(*name, name.to_lowercase(), "{name} must be lowercase");
        }
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total, "setting names must be unique");
    }

    #[test]
    fn defaults_satisfy_their_own_validators() {
        for spec in known_settings() {
            let default = spec.default_value();
            if let SettingValue::Str(value) = &default {
                assert_eq!(
                    spec.validator.validate(spec.name, &string(value)).expect("default validates"),
                    default
                );
            }
        }
    }

    #[test]
    fn bool_accepts_common_spellings() {
        for (raw, expected) in [
            (Value::Boolean(true), true),
            (string("yes"), true),
            (string(" On "), true),
            (string("0"), false),
            (Value::Integer(0), false),
        ] {
            assert_eq!(
                Validator::Bool.validate("daemon", &raw).expect("boolean"),
                SettingValue::Bool(expected)
            );
        }
        assert!(Validator::Bool.validate("daemon", &string("maybe")).is_err());
    }

    #[test]
    fn positive_int_rejects_zero_and_text() {
        assert_eq!(
            Validator::PositiveInt
                .validate("workers", &string("4"))
                .expect("numeric string"),
            SettingValue::Int(4)
        );
        assert!(Validator::PositiveInt.validate("workers", &Value::Integer(0)).is_err());
        assert!(Validator::PositiveInt.validate("workers", &string("four")).is_err());
        assert_eq!(
            Validator::NonNegativeInt
                .validate("max_requests", &Value::Integer(0))
                .expect("zero allowed"),
            SettingValue::Int(0)
        );
        assert!(Validator::NonNegativeInt
            .validate("max_requests", &Value::Integer(-1))
            .is_err());
    }

    #[test]
    fn durations_accept_seconds_and_human_forms() {
        let cases = [
            (Value::Integer(45), Duration::from_secs(45)),
            (Value::Float(1.5), Duration::from_millis(1_500)),
            (string("120"), Duration::from_secs(120)),
            (string("2m"), Duration::from_secs(120)),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                Validator::Duration.validate("timeout", &raw).expect("duration"),
                SettingValue::Duration(expected)
            );
        }
        assert!(Validator::Duration.validate("timeout", &Value::Integer(-5)).is_err());
        assert!(Validator::Duration.validate("timeout", &Value::Boolean(true)).is_err());
    }

    #[test]
    fn lists_split_comma_separated_strings() {
        assert_eq!(
            Validator::PathList
                .validate("search_path", &string("/srv/app, ./lib,,"))
                .expect("path list"),
            SettingValue::Paths(vec![PathBuf::from("/srv/app"), PathBuf::from("./lib")])
        );
        let array = Value::Array(vec![string("a:1"), Value::Integer(2)]);
        assert!(Validator::StringList.validate("bind", &array).is_err());
    }

    #[test]
    fn choice_is_case_insensitive() {
        assert_eq!(
            Validator::Choice(LOG_LEVELS)
                .validate("loglevel", &string("DEBUG"))
                .expect("choice"),
            SettingValue::Str("debug".to_string())
        );
        let err = Validator::Choice(LOG_LEVELS)
            .validate("loglevel", &string("loud"))
            .expect_err("unknown level");
        assert!(err.to_string().contains("expected one of trace"));
    }

    #[test]
    fn env_list_requires_key_value_entries() {
        assert_eq!(
            Validator::EnvList
                .validate("raw_env", &string("A=1,B="))
                .expect("entries"),
            SettingValue::List(vec!["A=1".to_string(), "B=".to_string()])
        );
        assert!(Validator::EnvList.validate("raw_env", &string("=1")).is_err());
        assert!(Validator::EnvList.validate("raw_env", &string("NOEQUALS")).is_err());
    }

    #[test]
    fn empty_optional_values_clear_the_setting() {
        assert_eq!(
            Validator::OptionalPath
                .validate("pidfile", &string(""))
                .expect("empty path"),
            SettingValue::OptPath(None)
        );
        assert!(SettingValue::OptStr(None).is_unset());
        assert!(!SettingValue::Bool(false).is_unset());
    }
}
