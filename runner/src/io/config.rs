//! Harness configuration stored in `jacs.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::device_id::DEFAULT_DEVICE_ID;

pub const DEFAULT_CONFIG_PATH: &str = "jacs.toml";

/// Harness configuration (TOML).
///
/// Every field is optional; missing fields fall back to the layout of a
/// standard checkout (`built/`, `compiler/run-tests`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Directory receiving compiler outputs and the native VM binary.
    pub dist_dir: PathBuf,

    /// Identity assigned to every test session (16 hex digits or any string).
    pub device_id: String,

    /// How long a run case may take to report its verdict.
    pub verdict_timeout_ms: u64,

    /// Service specification JSON handed to the compiler.
    pub specs_path: PathBuf,

    pub cases: CasesConfig,
    pub compiler: CompilerConfig,
    pub vm: VmConfig,
    pub native: NativeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CasesConfig {
    /// Directories whose files only go through the compiler self-check.
    pub compile_only: Vec<PathBuf>,
    /// Directories whose files are compiled, deployed and judged.
    pub run: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Compiler command; source on stdin, program image on stdout.
    pub command: Vec<String>,
    /// Extra arguments selecting the self-check mode.
    pub test_args: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VmConfig {
    /// VM host command; emits raw frames on stdout.
    pub command: Vec<String>,
    pub tcp_host: String,
    pub tcp_port: u16,
    /// Bound on the load-only run that checks each program before deploy.
    pub verify_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NativeConfig {
    /// Native VM binary, relative to `dist_dir` unless absolute.
    pub binary: PathBuf,
    /// Kill the native VM after this long (unbounded when unset).
    pub timeout_secs: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            dist_dir: PathBuf::from("built"),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            verdict_timeout_ms: 2000,
            specs_path: PathBuf::from("jacdac-c/jacdac/dist/services.json"),
            cases: CasesConfig::default(),
            compiler: CompilerConfig::default(),
            vm: VmConfig::default(),
            native: NativeConfig::default(),
        }
    }
}

impl Default for CasesConfig {
    fn default() -> Self {
        Self {
            compile_only: vec![
                PathBuf::from("compiler/compiler-tests"),
                PathBuf::from("samples"),
            ],
            run: vec![PathBuf::from("compiler/run-tests")],
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "node".to_string(),
                "compiler/built/jacscript-compiler.node.cjs".to_string(),
            ],
            test_args: vec!["--test".to_string()],
            timeout_secs: 60,
            output_limit_bytes: 4_000_000,
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            command: vec!["built/jdsim".to_string()],
            tcp_host: "localhost".to_string(),
            tcp_port: 8082,
            verify_timeout_secs: 30,
        }
    }
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("jdcli"),
            timeout_secs: None,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.verdict_timeout_ms == 0 {
            return Err(anyhow!("verdict_timeout_ms must be > 0"));
        }
        if self.device_id.trim().is_empty() {
            return Err(anyhow!("device_id must be non-empty"));
        }
        if self.compiler.command.is_empty() || self.compiler.command[0].trim().is_empty() {
            return Err(anyhow!("compiler.command must be a non-empty array"));
        }
        if self.compiler.timeout_secs == 0 {
            return Err(anyhow!("compiler.timeout_secs must be > 0"));
        }
        if self.compiler.output_limit_bytes == 0 {
            return Err(anyhow!("compiler.output_limit_bytes must be > 0"));
        }
        if self.vm.command.is_empty() || self.vm.command[0].trim().is_empty() {
            return Err(anyhow!("vm.command must be a non-empty array"));
        }
        if self.vm.verify_timeout_secs == 0 {
            return Err(anyhow!("vm.verify_timeout_secs must be > 0"));
        }
        if self.native.timeout_secs == Some(0) {
            return Err(anyhow!("native.timeout_secs must be > 0 when set"));
        }
        Ok(())
    }

    pub fn verdict_timeout(&self) -> Duration {
        Duration::from_millis(self.verdict_timeout_ms)
    }

    pub fn native_binary(&self) -> PathBuf {
        if self.native.binary.is_absolute() {
            self.native.binary.clone()
        } else {
            self.dist_dir.join(&self.native.binary)
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
        assert_eq!(cfg.verdict_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("jacs.toml");
        fs::write(
            &path,
            "verdict_timeout_ms = 500\n[cases]\nrun = [\"tests/run\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.verdict_timeout_ms, 500);
        assert_eq!(cfg.cases.run, vec![PathBuf::from("tests/run")]);
        assert_eq!(cfg.cases.compile_only, CasesConfig::default().compile_only);
        assert_eq!(cfg.device_id, DEFAULT_DEVICE_ID);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("jacs.toml");
        fs::write(&path, "verdict_timeout_ms = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("verdict_timeout_ms"));
    }

    #[test]
    fn native_binary_resolves_under_dist() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.native_binary(), PathBuf::from("built/jdcli"));
    }
}
