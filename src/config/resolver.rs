//! Merges every configuration tier into a fresh [`ConfigStore`].
//!
//! ```text
//! defaults ─► app hook ─► file / module ─► CLI flags
//!  lowest                                   highest
//! ```
//!
//! Each tier overwrites the keys it names and leaves the rest alone.

use std::path::PathBuf;

use tracing::{debug, info};

use super::{
    default_config_candidates, ConfigLocation, ConfigMapping, ConfigSource, ConfigSourceLoader,
    ConfigStore, ConfigurationError,
};
use crate::cli::Cli;
use crate::host::Application;

/// Outcome of one full resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub store: ConfigStore,
    /// Location the file/module tier was read from, if that tier applied.
    pub location: Option<ConfigLocation>,
}

#[derive(Debug)]
pub struct ConfigResolver {
    loader: ConfigSourceLoader,
    default_candidates: Vec<PathBuf>,
}

impl ConfigResolver {
    pub fn new(loader: ConfigSourceLoader) -> Self {
        Self {
            loader,
            default_candidates: default_config_candidates(),
        }
    }

    /// Replaces the conventional file locations probed when `--config` is absent.
    #[must_use]
    pub fn with_default_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.default_candidates = candidates;
        self
    }

    /// Location for the file/module tier: the explicit one, else the first
    /// default candidate present on disk.
    pub fn config_location(&self, cli: &Cli) -> Option<ConfigLocation> {
        if let Some(explicit) = cli.config.as_deref() {
            return Some(ConfigLocation::parse(explicit));
        }

        self.default_candidates
            .iter()
            .find(|candidate| candidate.exists())
            .map(|candidate| ConfigLocation::File(candidate.clone()))
    }

    /// Runs the full precedence sequence from the defaults up.
    ///
    /// The configured location is read before anything is merged, so a
    /// missing or malformed file fails without touching any store.
    pub fn resolve<A>(&self, app: &mut A, cli: &Cli) -> Result<Resolved, ConfigurationError>
    where
        A: Application + ?Sized,
    {
        let location = self.config_location(cli);
        let namespace = location
            .as_ref()
            .map(|location| self.loader.load(location).map(|mapping| (location.source(), mapping)))
            .transpose()?;

        let mut store = ConfigStore::with_defaults();

        let hook_values = app.init(cli).map_err(ConfigurationError::AppHook)?;
        if let Some(mapping) = hook_values {
            let applied = store.merge(ConfigSource::AppHook, &mapping)?;
            debug!(applied, "merged application hook values");
        }

        match (&location, namespace) {
            (Some(location), Some((source, mapping))) => {
                let applied = store.merge(source, &mapping)?;
                info!(%location, applied, "merged configuration");
            }
            _ => debug!("no configuration file or module; skipping tier"),
        }

        let cli_values: ConfigMapping = cli.settings.clone().into_mapping();
        let applied = store.merge(ConfigSource::Cli, &cli_values)?;
        debug!(applied, "merged command-line flags");

        Ok(Resolved { store, location })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use clap::Parser;
    use tempfile::TempDir;
    use toml::Value;

    use super::*;
    use crate::config::{ModuleRegistry, SettingValue};
    use crate::host::Application;

    #[derive(Default)]
    struct HookApp {
        values: Option<ConfigMapping>,
        fail: bool,
        init_calls: usize,
    }

    impl Application for HookApp {
        type Handler = ();

        fn init(&mut self, _cli: &Cli) -> anyhow::Result<Option<ConfigMapping>> {
            self.init_calls += 1;
            if self.fail {
                anyhow::bail!("hook refused");
            }
            Ok(self.values.clone())
        }

        fn load(&mut self) -> anyhow::Result<Self::Handler> {
            Ok(())
        }
    }

    fn hook(entries: &[(&str, Value)]) -> HookApp {
        HookApp {
            values: Some(
                entries
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.clone()))
                    .collect(),
            ),
            ..HookApp::default()
        }
    }

    fn resolver() -> ConfigResolver {
        ConfigResolver::new(ConfigSourceLoader::default()).with_default_candidates(Vec::new())
    }

    fn write_config(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write config");
        path
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["apphost"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse cli")
    }

    fn timeout(store: &ConfigStore) -> Option<Duration> {
        store.get("timeout").and_then(SettingValue::as_duration)
    }

    #[test]
    fn precedence_is_cli_over_file_over_hook_over_default() {
        let temp = TempDir::new().expect("temp dir");
        let config = write_config(temp.path(), "app.toml", "timeout = 20\nworkers = 3\n");
        let config = config.to_str().expect("utf-8 path");
        let mut app = hook(&[
            ("timeout", Value::Integer(10)),
            ("workers", Value::Integer(2)),
            ("threads", Value::Integer(5)),
        ]);

        let all = resolver()
            .resolve(&mut app, &cli(&["-c", config, "--timeout", "40s"]))
            .expect("resolve");
        assert_eq!(timeout(&all.store), Some(Duration::from_secs(40)), "CLI wins");
        assert_eq!(all.store.workers(), 3, "file beats hook");
        assert_eq!(all.store.get("threads"), Some(&SettingValue::Int(5)), "hook beats default");
        assert_eq!(all.store.get("backlog"), Some(&SettingValue::Int(2048)), "default remains");

        let without_cli = resolver()
            .resolve(&mut app, &cli(&["-c", config]))
            .expect("resolve");
        assert_eq!(timeout(&without_cli.store), Some(Duration::from_secs(20)));

        let hook_only = resolver().resolve(&mut app, &cli(&[])).expect("resolve");
        assert_eq!(timeout(&hook_only.store), Some(Duration::from_secs(10)));

        let defaults = resolver()
            .resolve(&mut HookApp::default(), &cli(&[]))
            .expect("resolve");
        assert_eq!(timeout(&defaults.store), Some(Duration::from_secs(30)));
    }

    #[test]
    fn file_scenario_ignores_unknown_keys() {
        let temp = TempDir::new().expect("temp dir");
        let config = write_config(
            temp.path(),
            "app.toml",
            "worker_class = \"gevent\"\nbogus_key = \"foo\"\n",
        );
        let cli = Cli {
            config: Some(config.display().to_string()),
            ..Cli::default()
        };

        let resolved = resolver()
            .resolve(&mut HookApp::default(), &cli)
            .expect("resolve");

        assert_eq!(resolved.store.worker_class(), "gevent");
        assert!(!resolved.store.contains("bogus_key"));
        assert!(!resolved.store.check_config());
        assert_eq!(resolved.location, Some(ConfigLocation::File(config)));
    }

    #[test]
    fn unset_flags_leave_file_values_alone() {
        let temp = TempDir::new().expect("temp dir");
        let config = write_config(
            temp.path(),
            "app.toml",
            "daemon = true\nspew = true\nbind = [\"0.0.0.0:9000\"]\nraw_env = [\"A=1\"]\n",
        );
        let config = config.to_str().expect("utf-8 path");

        let resolved = resolver()
            .resolve(&mut HookApp::default(), &cli(&["-c", config]))
            .expect("resolve");

        assert!(resolved.store.daemon());
        assert!(resolved.store.spew());
        assert_eq!(resolved.store.bind(), &["0.0.0.0:9000".to_string()]);
        assert_eq!(
            resolved.store.get("raw_env"),
            Some(&SettingValue::List(vec!["A=1".to_string()]))
        );
    }

    #[test]
    fn explicit_false_flag_overrides_file() {
        let temp = TempDir::new().expect("temp dir");
        let config = write_config(temp.path(), "app.toml", "daemon = true\n");
        let config = config.to_str().expect("utf-8 path");

        let resolved = resolver()
            .resolve(&mut HookApp::default(), &cli(&["-c", config, "--daemon=false"]))
            .expect("resolve");

        assert!(!resolved.store.daemon());
    }

    #[test]
    fn missing_explicit_file_fails_before_the_hook_runs() {
        let temp = TempDir::new().expect("temp dir");
        let missing = temp.path().join("missing.conf");
        let mut app = hook(&[("workers", Value::Integer(2))]);

        let err = resolver()
            .resolve(&mut app, &cli(&["--config", missing.to_str().expect("utf-8")]))
            .expect_err("missing file");

        assert!(matches!(err, ConfigurationError::MissingFile { .. }));
        assert_eq!(app.init_calls, 0, "nothing merged before the failure");
    }

    #[test]
    fn default_candidate_is_used_when_present() {
        let temp = TempDir::new().expect("temp dir");
        let absent = temp.path().join("first.toml");
        let present = write_config(temp.path(), "second.toml", "workers = 6\n");

        let resolver = resolver().with_default_candidates(vec![absent, present.clone()]);
        let resolved = resolver
            .resolve(&mut HookApp::default(), &cli(&[]))
            .expect("resolve");

        assert_eq!(resolved.store.workers(), 6);
        assert_eq!(resolved.location, Some(ConfigLocation::File(present)));
    }

    #[test]
    fn absent_default_candidates_skip_the_tier() {
        let temp = TempDir::new().expect("temp dir");
        let resolver = resolver().with_default_candidates(vec![temp.path().join("none.toml")]);

        let resolved = resolver
            .resolve(&mut HookApp::default(), &cli(&[]))
            .expect("resolve");

        assert_eq!(resolved.location, None);
        assert_eq!(resolved.store, ConfigStore::with_defaults());
    }

    #[test]
    fn module_location_feeds_the_file_tier() {
        let modules = ModuleRegistry::new().register("tuned", || {
            let mut mapping = ConfigMapping::new();
            mapping.insert("Worker_Class".into(), Value::String("gthread".into()));
            mapping.insert("unrelated".into(), Value::Boolean(true));
            mapping
        });
        let resolver = ConfigResolver::new(ConfigSourceLoader::new(modules))
            .with_default_candidates(Vec::new());

        let resolved = resolver
            .resolve(&mut HookApp::default(), &cli(&["-c", "module:tuned"]))
            .expect("resolve");

        assert_eq!(resolved.store.worker_class(), "gthread");
    }

    #[test]
    fn invalid_file_value_aborts_resolution() {
        let temp = TempDir::new().expect("temp dir");
        let config = write_config(temp.path(), "app.toml", "workers = 0\n");

        let err = resolver()
            .resolve(&mut HookApp::default(), &cli(&["-c", config.to_str().expect("utf-8")]))
            .expect_err("invalid workers");

        assert!(err.to_string().starts_with("invalid value for workers"));
    }

    #[test]
    fn failing_hook_is_a_configuration_error() {
        let mut app = HookApp {
            fail: true,
            ..HookApp::default()
        };

        let err = resolver().resolve(&mut app, &cli(&[])).expect_err("hook error");

        assert!(matches!(err, ConfigurationError::AppHook(_)));
        assert!(err.to_string().contains("hook refused"));
    }
}
