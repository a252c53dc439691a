//! The authoritative name → value mapping for one load cycle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use toml::Value;
use tracing::debug;

use super::registry::{known_settings, SettingValue, Validator};
use super::{ConfigMapping, ConfigSource, ConfigurationError};

/// One known setting: fixed identity, mutable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    name: &'static str,
    validator: Validator,
    default: SettingValue,
    value: Option<SettingValue>,
}

impl Setting {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current value, or the default when nothing assigned one.
    pub fn value(&self) -> &SettingValue {
        self.value.as_ref().unwrap_or(&self.default)
    }

    pub fn default_value(&self) -> &SettingValue {
        &self.default
    }

    /// Whether a source other than the defaults assigned this setting.
    pub fn is_assigned(&self) -> bool {
        self.value.is_some()
    }
}

/// Resolved configuration, rebuilt from scratch on every load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    settings: BTreeMap<&'static str, Setting>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConfigStore {
    /// Builds a store holding every known setting at its default value.
    pub fn with_defaults() -> Self {
        let settings = known_settings()
            .iter()
            .map(|spec| {
                let setting = Setting {
                    name: spec.name,
                    validator: spec.validator,
                    default: spec.default_value(),
                    value: None,
                };
                (spec.name, setting)
            })
            .collect();
        Self { settings }
    }

    /// Lowercases `name`, the only form the store looks settings up by.
    pub fn canonicalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.settings.contains_key(Self::canonicalize(name).as_str())
    }

    /// Assigns a single setting; unknown names are an error here.
    pub fn set(&mut self, name: &str, raw: &Value) -> Result<(), ConfigurationError> {
        let canonical = Self::canonicalize(name);
        let setting = self
            .settings
            .get_mut(canonical.as_str())
            .ok_or(ConfigurationError::UnknownSetting { name: canonical.clone() })?;
        let value = setting.validator.validate(setting.name, raw)?;
        setting.value = Some(value);
        Ok(())
    }

    /// Applies a whole source, skipping names the registry does not know.
    ///
    /// Every known entry is validated before any is applied, so one bad value
    /// leaves the store exactly as it was.
    pub fn merge(
        &mut self,
        source: ConfigSource,
        mapping: &ConfigMapping,
    ) -> Result<usize, ConfigurationError> {
        let mut accepted = Vec::with_capacity(mapping.len());
        for (key, raw) in mapping {
            let canonical = Self::canonicalize(key);
            let Some(setting) = self.settings.get(canonical.as_str()) else {
                debug!(%source, key = %key, "ignoring unknown setting");
                continue;
            };
            let value = setting.validator.validate(setting.name, raw)?;
            accepted.push((setting.name, value));
        }

        let applied = accepted.len();
        for (name, value) in accepted {
            if let Some(setting) = self.settings.get_mut(name) {
                debug!(%source, setting = name, "applied setting");
                setting.value = Some(value);
            }
        }
        Ok(applied)
    }

    /// Current value of `name`, falling back to its default.
    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.settings
            .get(Self::canonicalize(name).as_str())
            .map(Setting::value)
    }

    pub fn setting(&self, name: &str) -> Option<&Setting> {
        self.settings.get(Self::canonicalize(name).as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.settings.values()
    }

    /// Renders every setting that holds a value as a TOML document.
    pub fn render_toml(&self) -> anyhow::Result<String> {
        let present: BTreeMap<&str, &SettingValue> = self
            .iter()
            .map(|setting| (setting.name(), setting.value()))
            .filter(|(_, value)| !value.is_unset())
            .collect();
        toml::to_string(&present).context("failed to render resolved configuration")
    }

    fn bool_setting(&self, name: &str) -> bool {
        self.get(name)
            .and_then(SettingValue::as_bool)
            .unwrap_or(false)
    }

    fn str_setting(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(SettingValue::as_str)
    }

    pub fn check_config(&self) -> bool {
        self.bool_setting("check_config")
    }

    pub fn print_config(&self) -> bool {
        self.bool_setting("print_config")
    }

    pub fn daemon(&self) -> bool {
        self.bool_setting("daemon")
    }

    pub fn enable_stdio_inheritance(&self) -> bool {
        self.bool_setting("enable_stdio_inheritance")
    }

    pub fn spew(&self) -> bool {
        self.bool_setting("spew")
    }

    pub fn preload_app(&self) -> bool {
        self.bool_setting("preload_app")
    }

    pub fn worker_class(&self) -> &str {
        self.str_setting("worker_class").unwrap_or_default()
    }

    pub fn workers(&self) -> u64 {
        self.get("workers")
            .and_then(SettingValue::as_int)
            .unwrap_or(1)
    }

    pub fn bind(&self) -> &[String] {
        self.get("bind")
            .and_then(SettingValue::as_list)
            .unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        self.get("timeout")
            .and_then(SettingValue::as_duration)
            .unwrap_or_default()
    }

    pub fn loglevel(&self) -> &str {
        self.str_setting("loglevel").unwrap_or("info")
    }

    /// Error log destination; `None` means stderr.
    pub fn errorlog(&self) -> Option<&Path> {
        self.str_setting("errorlog")
            .filter(|target| *target != "-")
            .map(Path::new)
    }

    pub fn pidfile(&self) -> Option<&Path> {
        self.get("pidfile").and_then(SettingValue::as_path)
    }

    pub fn proc_name(&self) -> Option<&str> {
        self.str_setting("proc_name")
    }

    pub fn search_path(&self) -> &[PathBuf] {
        self.get("search_path")
            .and_then(SettingValue::as_paths)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use toml::Value;

    use super::ConfigStore;
    use crate::config::{ConfigMapping, ConfigSource, ConfigurationError, SettingValue};

    fn mapping(entries: &[(&str, Value)]) -> ConfigMapping {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn string(value: &str) -> Value {
        Value::String(value.to_string())
    }

    #[test]
    fn defaults_are_reported_until_assigned() {
        let store = ConfigStore::with_defaults();
        let setting = store.setting("worker_class").expect("known setting");

        assert_eq!(store.worker_class(), "sync");
        assert!(!setting.is_assigned());
        assert_eq!(setting.value(), setting.default_value());
    }

    #[test]
    fn names_are_canonicalized_before_assignment() {
        let mut upper = ConfigStore::with_defaults();
        let mut lower = ConfigStore::with_defaults();

        upper.set("Worker_Class", &string("gevent")).expect("set upper");
        lower.set("worker_class", &string("gevent")).expect("set lower");

        assert_eq!(upper, lower);
        assert_eq!(upper.get("WORKER_CLASS"), Some(&SettingValue::Str("gevent".into())));
    }

    #[test]
    fn direct_set_rejects_unknown_names() {
        let mut store = ConfigStore::with_defaults();
        let err = store
            .set("bogus_key", &string("foo"))
            .expect_err("unknown setting");

        assert!(matches!(err, ConfigurationError::UnknownSetting { ref name } if name == "bogus_key"));
        assert_eq!(store, ConfigStore::with_defaults());
    }

    #[test]
    fn direct_set_validates_values() {
        let mut store = ConfigStore::with_defaults();
        let err = store
            .set("workers", &string("many"))
            .expect_err("invalid workers");

        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
        assert_eq!(store.workers(), 1);
    }

    #[test]
    fn merge_skips_unknown_names_silently() {
        let mut store = ConfigStore::with_defaults();
        let applied = store
            .merge(
                ConfigSource::File,
                &mapping(&[("bogus_key", string("foo")), ("WORKERS", Value::Integer(3))]),
            )
            .expect("merge");

        assert_eq!(applied, 1);
        assert_eq!(store.workers(), 3);
        assert!(!store.contains("bogus_key"));
        assert!(store.get("bogus_key").is_none());
    }

    #[test]
    fn merge_with_invalid_value_applies_nothing() {
        let mut store = ConfigStore::with_defaults();
        let before = store.clone();

        let err = store
            .merge(
                ConfigSource::File,
                &mapping(&[
                    ("workers", Value::Integer(8)),
                    ("timeout", string("soon")),
                    ("worker_class", string("gevent")),
                ]),
            )
            .expect_err("invalid timeout");

        assert!(err.to_string().contains("invalid value for timeout"));
        assert_eq!(store, before, "no partial application of the source");
    }

    #[test]
    fn typed_accessors_read_resolved_values() {
        let mut store = ConfigStore::with_defaults();
        store
            .merge(
                ConfigSource::Cli,
                &mapping(&[
                    ("search_path", string("/a,/b")),
                    ("errorlog", string("/var/log/app.log")),
                    ("pidfile", string("/run/app.pid")),
                    ("daemon", Value::Boolean(true)),
                ]),
            )
            .expect("merge");

        assert_eq!(store.search_path(), &[PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(store.errorlog(), Some(PathBuf::from("/var/log/app.log").as_path()));
        assert_eq!(store.pidfile(), Some(PathBuf::from("/run/app.pid").as_path()));
        assert!(store.daemon());
        assert_eq!(ConfigStore::with_defaults().errorlog(), None);
    }

    #[test]
    fn render_toml_lists_present_values() {
        let mut store = ConfigStore::with_defaults();
        store.set("worker_class", &string("gevent")).expect("set");

        let rendered = store.render_toml().expect("render");

        assert!(rendered.contains("worker_class = \"gevent\""), "{rendered}");
        assert!(rendered.contains("timeout = \"30s\""), "{rendered}");
        assert!(!rendered.contains("pidfile"), "unset optionals are omitted");
    }
}
