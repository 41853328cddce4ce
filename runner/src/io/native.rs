//! Run a program under the native VM binary instead of an in-process session.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};
use wait_timeout::ChildExt;

use crate::exit_codes;

/// Port the native VM listens on when no serial port is given.
pub const DEFAULT_TCP_PORT: &str = "8082";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeRun {
    pub binary: PathBuf,
    pub program: PathBuf,
    pub serial_port: Option<String>,
    pub test_mode: bool,
    pub timeout: Option<Duration>,
}

impl NativeRun {
    /// Arguments passed to the native binary: serial port if given, the TCP
    /// port unless in test mode, then the program path.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(2);
        match &self.serial_port {
            Some(port) => args.push(port.clone()),
            None if !self.test_mode => args.push(DEFAULT_TCP_PORT.to_string()),
            None => {}
        }
        args.push(self.program.display().to_string());
        args
    }

    /// Run the binary with inherited stdio and return its exit code.
    #[instrument(skip_all, fields(binary = %self.binary.display()))]
    pub fn run(&self) -> Result<i32> {
        let args = self.args();
        println!("run {}", args.join(" "));
        let mut child = Command::new(&self.binary)
            .args(&args)
            .spawn()
            .with_context(|| format!("spawn {}", self.binary.display()))?;

        let status = match self.timeout {
            None => child.wait().context("wait for native VM")?,
            Some(timeout) => match child.wait_timeout(timeout).context("wait for native VM")? {
                Some(status) => status,
                None => {
                    warn!(timeout_secs = timeout.as_secs(), "native VM timed out, killing");
                    child.kill().context("kill native VM")?;
                    child.wait().context("wait native VM after kill")?
                }
            },
        };
        // Killed by a signal: no code to pass through.
        let code = status.code().unwrap_or(exit_codes::UNCAUGHT);
        info!(code, "native VM exited");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(serial: Option<&str>, test_mode: bool) -> NativeRun {
        NativeRun {
            binary: PathBuf::from("built/jdcli"),
            program: PathBuf::from("built/compiled.jacs"),
            serial_port: serial.map(str::to_string),
            test_mode,
            timeout: None,
        }
    }

    #[test]
    fn tcp_port_is_default_outside_test_mode() {
        assert_eq!(native(None, false).args(), vec!["8082", "built/compiled.jacs"]);
    }

    #[test]
    fn test_mode_drops_the_port() {
        assert_eq!(native(None, true).args(), vec!["built/compiled.jacs"]);
    }

    #[test]
    fn serial_port_wins() {
        assert_eq!(
            native(Some("/dev/ttyACM0"), true).args(),
            vec!["/dev/ttyACM0", "built/compiled.jacs"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_is_passed_through() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = temp.path().join("compiled.jacs");
        std::fs::write(&program, "exit 7\n").expect("write");
        let run = NativeRun {
            binary: PathBuf::from("sh"),
            program,
            ..native(None, true)
        };
        assert_eq!(run.run().expect("run"), 7);
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_child() {
        let run = NativeRun {
            binary: PathBuf::from("sleep"),
            program: PathBuf::from("5"),
            serial_port: None,
            test_mode: true,
            timeout: Some(Duration::from_millis(100)),
        };
        assert_eq!(run.run().expect("run"), exit_codes::UNCAUGHT);
    }
}
