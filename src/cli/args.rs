use clap::Parser;

use super::SettingOptions;

/// Command-line interface definition.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "apphost",
    author,
    version,
    about = "Resolve the application host configuration and hand off to the supervisor"
)]
pub struct Cli {
    /// Location of the configuration: `file:<path>`, `module:<name>` or a bare path.
    #[arg(
        short = 'c',
        long = "config",
        alias = "config-file",
        value_name = "CONFIG",
        help = "Optional. Configuration location (`file:<path>`, `module:<name>` or a bare path); defaults to ./apphost.toml, then the platform-specific user config directory (ProjectDirs)."
    )]
    pub config: Option<String>,

    #[command(flatten)]
    pub settings: SettingOptions,

    /// Internal flag used to mark the detached daemon child.
    #[arg(long = "daemon-child", hide = true)]
    pub daemon_child: bool,

    /// Extra positional arguments handed to the application hook untouched.
    #[arg(value_name = "ARGS")]
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::Cli;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_config_and_positional_args() {
        let cli = Cli::try_parse_from(["apphost", "-c", "file:/etc/app.toml", "echo", "extra"])
            .expect("parse cli");

        assert_eq!(cli.config.as_deref(), Some("file:/etc/app.toml"));
        assert_eq!(cli.args, vec!["echo".to_string(), "extra".to_string()]);
        assert!(!cli.daemon_child);
    }

    #[test]
    fn hidden_daemon_child_marker_parses() {
        let cli = Cli::try_parse_from(["apphost", "--daemon-child"]).expect("parse cli");
        assert!(cli.daemon_child);
    }

    #[test]
    fn unknown_flag_is_a_usage_error() {
        let err = Cli::try_parse_from(["apphost", "--no-such-flag"]).expect_err("usage error");
        assert_eq!(err.exit_code(), 2);
    }
}
