//! Build configuration stored in `build.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "build.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    pub prelude: PreludeConfig,
    /// Bundle steps, run in order after the prelude.
    pub steps: Vec<StepConfig>,
    /// Skipped by `--fast`.
    pub typecheck: StepConfig,
    /// Captured stdout/stderr per step is capped at this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PreludeConfig {
    /// Template directory.
    pub dir: PathBuf,
    /// Generated module.
    pub out: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StepConfig {
    pub name: String,
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            prelude: PreludeConfig::default(),
            steps: vec![
                bundle_step("bundle-browser", "built/jacscript-compiler.bundle.js", "browser", "iife"),
                bundle_step("bundle-node", "built/jacscript-compiler.node.cjs", "node", "cjs"),
            ],
            typecheck: StepConfig {
                name: "typecheck".to_string(),
                command: argv(&["node", "node_modules/typescript/lib/tsc.js", "-b", "src"]),
                timeout_secs: 600,
            },
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for PreludeConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("lib"),
            out: PathBuf::from("src/prelude.ts"),
        }
    }
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: Vec::new(),
            timeout_secs: 300,
        }
    }
}

fn argv(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| word.to_string()).collect()
}

fn bundle_step(name: &str, outfile: &str, platform: &str, format: &str) -> StepConfig {
    StepConfig {
        name: name.to_string(),
        command: vec![
            "npx".to_string(),
            "esbuild".to_string(),
            "src/jacscript.ts".to_string(),
            "--bundle".to_string(),
            "--sourcemap".to_string(),
            format!("--outfile={outfile}"),
            format!("--platform={platform}"),
            "--target=es2019".to_string(),
            format!("--format={format}"),
            "--log-level=warning".to_string(),
        ],
        timeout_secs: 300,
    }
}

impl StepConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, label: &str) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("{label}.name must be non-empty"));
        }
        if self.command.first().is_none_or(|exe| exe.trim().is_empty()) {
            return Err(anyhow!("{label}.command must be a non-empty array"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("{label}.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

impl BuildConfig {
    pub fn validate(&self) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            step.validate(&format!("steps[{index}]"))?;
        }
        self.typecheck.validate("typecheck")?;
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BuildConfig::default()`.
pub fn load_config(path: &Path) -> Result<BuildConfig> {
    if !path.exists() {
        return Ok(BuildConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BuildConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
