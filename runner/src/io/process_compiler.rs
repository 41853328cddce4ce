//! Compiler adapter that shells out to an external compiler command.
//!
//! Protocol: source text on stdin, program image on stdout, non-zero exit on
//! failure. Diagnostics on stderr are forwarded to [`Host::log`]. The file being
//! compiled is exported as `JACS_MAIN_FILE`.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::compiler::{CompileOutput, Compiler, Host};
use crate::error::HarnessError;
use crate::io::config::CompilerConfig;
use crate::io::process::{CommandOutput, command_from_argv, run_command_with_timeout};

pub const MAIN_FILE_ENV: &str = "JACS_MAIN_FILE";

pub struct ProcessCompiler {
    command: Vec<String>,
    test_args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ProcessCompiler {
    pub fn from_config(cfg: &CompilerConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            test_args: cfg.test_args.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn invoke(&self, host: &dyn Host, extra_args: &[String], source: &str) -> Result<CommandOutput> {
        let mut cmd = command_from_argv(&self.command)?;
        cmd.args(extra_args)
            .env(MAIN_FILE_ENV, host.main_file_name());
        let output = run_command_with_timeout(
            cmd,
            Some(source.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run compiler")?;
        let stderr = output.stderr_lossy();
        for line in stderr.lines() {
            host.log(line);
        }
        Ok(output)
    }
}

impl Compiler for ProcessCompiler {
    #[instrument(skip_all, fields(main_file = %host.main_file_name()))]
    fn compile(&self, host: &dyn Host, source: &str) -> Result<CompileOutput> {
        let output = self.invoke(host, &[], source)?;
        if !output.success() {
            debug!(summary = %output.failure_summary("compiler"), "compile failed");
            return Ok(CompileOutput {
                success: false,
                binary: None,
            });
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow::anyhow!(
                "compiler output exceeded {} bytes",
                self.output_limit_bytes
            ));
        }
        Ok(CompileOutput {
            success: true,
            binary: Some(output.stdout),
        })
    }

    #[instrument(skip_all, fields(main_file = %host.main_file_name()))]
    fn test_compiler(&self, host: &dyn Host, source: &str) -> crate::error::Result<()> {
        let output = self.invoke(host, &self.test_args, source)?;
        if output.success() {
            return Ok(());
        }
        Err(HarnessError::compilation(format!(
            "{}: {}",
            host.main_file_name(),
            output.failure_summary("compiler")
        )))
    }
}
