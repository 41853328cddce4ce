//! The build: prelude, bundle steps, type-check.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use runner::io::process::{command_from_argv, run_command_with_timeout};

use crate::config::{BuildConfig, StepConfig};
use crate::prelude::{PreludeUpdate, build_prelude};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Skip the type-check step.
    pub fast: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub prelude: PreludeUpdate,
    /// Names of the steps that ran, in order.
    pub steps: Vec<String>,
}

/// Run the whole build with paths resolved against `root`.
#[instrument(skip_all, fields(root = %root.display(), fast = options.fast))]
pub fn run_build<W: Write>(
    root: &Path,
    cfg: &BuildConfig,
    options: BuildOptions,
    out: &mut W,
) -> Result<BuildReport> {
    let prelude_out = root.join(&cfg.prelude.out);
    let prelude = build_prelude(&root.join(&cfg.prelude.dir), &prelude_out)?;
    if prelude == PreludeUpdate::Written {
        writeln!(out, "updating {}", cfg.prelude.out.display()).context("write progress")?;
    }

    let mut steps = Vec::new();
    for step in &cfg.steps {
        run_step(root, step, cfg.output_limit_bytes, out)?;
        steps.push(step.name.clone());
    }
    writeln!(out, "bundle done").context("write progress")?;

    if options.fast {
        debug!("type-check skipped");
    } else {
        run_step(root, &cfg.typecheck, cfg.output_limit_bytes, out)?;
        steps.push(cfg.typecheck.name.clone());
    }

    info!(steps = steps.len(), "build finished");
    Ok(BuildReport { prelude, steps })
}

fn run_step<W: Write>(
    root: &Path,
    step: &StepConfig,
    output_limit_bytes: usize,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "run {} {}", step.name, step.command.join(" ")).context("write progress")?;
    let mut cmd = command_from_argv(&step.command)?;
    cmd.current_dir(root);
    let output = run_command_with_timeout(cmd, None, step.timeout(), output_limit_bytes)
        .with_context(|| format!("run step {}", step.name))?;
    if !output.success() {
        bail!("{}", output.failure_summary(&format!("step {}", step.name)));
    }
    if !output.stdout.is_empty() {
        debug!(step = %step.name, stdout = %String::from_utf8_lossy(&output.stdout), "step output");
    }
    Ok(())
}
