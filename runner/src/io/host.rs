//! Filesystem-backed host capabilities shared by every compilation in a run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::compiler::{BytecodeVerifier, Host, SignatureVerifier};

/// Host handed to the compiler; built once per process invocation.
pub struct RunnerHost {
    dist_dir: PathBuf,
    specs_path: PathBuf,
    verbose: bool,
    main_file: Mutex<String>,
    specs: OnceLock<Value>,
    verifier: Box<dyn BytecodeVerifier>,
}

impl RunnerHost {
    pub fn new(dist_dir: impl Into<PathBuf>, specs_path: impl Into<PathBuf>) -> Self {
        Self {
            dist_dir: dist_dir.into(),
            specs_path: specs_path.into(),
            verbose: false,
            main_file: Mutex::new(String::new()),
            specs: OnceLock::new(),
            verifier: Box::new(SignatureVerifier),
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_verifier(mut self, verifier: Box<dyn BytecodeVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Record which file the next compilation belongs to.
    pub fn set_main_file(&self, path: &Path) {
        let mut main_file = match self.main_file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *main_file = path.display().to_string();
    }

    pub fn dist_dir(&self) -> &Path {
        &self.dist_dir
    }
}

impl Host for RunnerHost {
    fn write(&self, filename: &str, content: &[u8]) -> Result<()> {
        let path = self.dist_dir.join(filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        debug!(path = %path.display(), bytes = content.len(), "host write");
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))
    }

    fn log(&self, message: &str) {
        if self.verbose {
            println!("{message}");
        }
    }

    fn main_file_name(&self) -> String {
        match self.main_file.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn get_specs(&self) -> Result<Value> {
        if let Some(specs) = self.specs.get() {
            return Ok(specs.clone());
        }
        let raw = fs::read_to_string(&self.specs_path)
            .with_context(|| format!("read specs {}", self.specs_path.display()))?;
        let parsed: Value = serde_json::from_str(&raw)
            .with_context(|| format!("parse specs {}", self.specs_path.display()))?;
        Ok(self.specs.get_or_init(|| parsed).clone())
    }

    fn verify_bytecode(&self, binary: &[u8]) -> crate::error::Result<()> {
        self.verifier.verify(binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact::MAGIC;

    #[test]
    fn write_lands_in_dist_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let host = RunnerHost::new(temp.path().join("built"), temp.path().join("specs.json"));
        host.write("prog.lst", b"listing").expect("write");
        let written = fs::read(temp.path().join("built/prog.lst")).expect("read");
        assert_eq!(written, b"listing");
    }

    #[test]
    fn specs_are_loaded_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let specs_path = temp.path().join("specs.json");
        fs::write(&specs_path, r#"[{"name":"button"}]"#).expect("write");
        let host = RunnerHost::new(temp.path(), &specs_path);

        let first = host.get_specs().expect("specs");
        fs::remove_file(&specs_path).expect("remove");
        let second = host.get_specs().expect("cached specs");
        assert_eq!(first, second);
        assert_eq!(first[0]["name"], "button");
    }

    #[test]
    fn missing_specs_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let host = RunnerHost::new(temp.path(), temp.path().join("nope.json"));
        let err = host.get_specs().unwrap_err();
        assert!(format!("{err:#}").contains("read specs"));
    }

    #[test]
    fn main_file_tracks_latest_compilation() {
        let host = RunnerHost::new("built", "specs.json");
        host.set_main_file(Path::new("samples/blink.ts"));
        assert_eq!(host.main_file_name(), "samples/blink.ts");
    }

    #[test]
    fn verify_uses_signature_check_by_default() {
        let host = RunnerHost::new("built", "specs.json");
        let mut image = MAGIC.to_vec();
        image.push(1);
        assert!(host.verify_bytecode(&image).is_ok());
        assert!(host.verify_bytecode(b"source").is_err());
    }
}
