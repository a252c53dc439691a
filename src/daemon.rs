//! Detaching the host from its controlling terminal.
//!
//! The running binary re-executes itself with `--daemon-child` in a new
//! session; the parent only reports the child's pid.

use std::env;
use std::ffi::OsString;
use std::process::{Command as ProcessCommand, Stdio};

use anyhow::{Context, Result};

pub const DAEMON_CHILD_FLAG: &str = "--daemon-child";

/// Starts the detached copy of the host.
pub trait Daemonizer {
    /// Spawns the detached child and returns its pid.
    fn detach(&self, inherit_stdio: bool) -> Result<u32>;
}

/// Re-runs the current executable with the same arguments plus
/// [`DAEMON_CHILD_FLAG`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReexecDaemonizer;

impl Daemonizer for ReexecDaemonizer {
    fn detach(&self, inherit_stdio: bool) -> Result<u32> {
        let exec_path = env::current_exe().context("failed to resolve current executable path")?;
        let mut command = ProcessCommand::new(exec_path);
        command.args(child_args(env::args_os().skip(1)));
        command.stdin(Stdio::null());
        if !inherit_stdio {
            command.stdout(Stdio::null());
            command.stderr(Stdio::null());
        }
        new_session(&mut command)?;

        let child = command.spawn().context("failed to spawn daemon child")?;
        Ok(child.id())
    }
}

/// Arguments for the child: the originals with the child marker appended once.
fn child_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let daemon_child_flag = OsString::from(DAEMON_CHILD_FLAG);
    let mut child_args: Vec<OsString> = args
        .into_iter()
        .filter(|arg| arg != &daemon_child_flag)
        .collect();
    child_args.push(daemon_child_flag);
    child_args
}

#[cfg(unix)]
fn new_session(command: &mut ProcessCommand) -> Result<()> {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid is async-signal-safe and touches no state of the parent.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn new_session(_command: &mut ProcessCommand) -> Result<()> {
    anyhow::bail!("Daemon mode is only supported on Unix-like systems");
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::{child_args, DAEMON_CHILD_FLAG};

    #[test]
    fn child_marker_is_appended_once() {
        let args = vec![
            OsString::from("-c"),
            OsString::from("app.toml"),
            OsString::from(DAEMON_CHILD_FLAG),
            OsString::from("--daemon"),
        ];

        let child = child_args(args);

        assert_eq!(
            child,
            vec![
                OsString::from("-c"),
                OsString::from("app.toml"),
                OsString::from("--daemon"),
                OsString::from(DAEMON_CHILD_FLAG),
            ]
        );
    }

    #[test]
    fn child_marker_is_added_to_empty_args() {
        assert_eq!(child_args(Vec::new()), vec![OsString::from(DAEMON_CHILD_FLAG)]);
    }
}
