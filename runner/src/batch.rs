//! Sequential batch of compile-only and run cases (`jacs-run test`).
//!
//! Cases run one at a time so console output stays attributable to the file
//! that produced it. A failing case never stops its siblings; it only clears
//! the batch's overall success.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::compiler::Compiler;
use crate::core::verdict::Verdict;
use crate::error::HarnessError;
use crate::exit_codes;
use crate::harness::{HarnessOptions, TestHarness};
use crate::io::host::RunnerHost;
use crate::session::VmFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    CompileOnly,
    Run,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    /// Program reported a non-zero code.
    Failed { code: u8 },
    /// No verdict arrived in time.
    TimedOut,
    /// Compilation, verification, deploy or I/O error.
    Errored { message: String },
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CaseOutcome::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    pub path: PathBuf,
    pub kind: CaseKind,
    pub outcome: CaseOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub cases: Vec<CaseReport>,
}

impl BatchReport {
    pub fn passed(&self) -> bool {
        self.cases.iter().all(|case| case.outcome.passed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|case| !case.outcome.passed())
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            exit_codes::OK
        } else {
            exit_codes::FAILED
        }
    }
}

/// Case files of each kind, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseSet {
    pub compile_only: Vec<PathBuf>,
    pub run: Vec<PathBuf>,
}

impl CaseSet {
    pub fn discover(compile_only_dirs: &[PathBuf], run_dirs: &[PathBuf]) -> Result<Self> {
        Ok(Self {
            compile_only: discover_cases(compile_only_dirs)?,
            run: discover_cases(run_dirs)?,
        })
    }
}

/// List the files directly inside each directory, sorted per directory.
/// Symlinks count as the file they point at.
///
/// A missing directory is an error.
pub fn discover_cases(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut cases = Vec::new();
    for dir in dirs {
        let mut found = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
            let entry = entry.with_context(|| format!("read case dir {}", dir.display()))?;
            if entry.file_type().is_file() {
                found.push(entry.into_path());
            }
        }
        if found.is_empty() && !dir.is_dir() {
            anyhow::bail!("case dir {} not found", dir.display());
        }
        found.sort();
        cases.extend(found);
    }
    Ok(cases)
}

/// Sequential runner over a [`CaseSet`].
pub struct BatchRunner<'a, C: ?Sized, F> {
    compiler: &'a C,
    host: &'a RunnerHost,
    harness: TestHarness<'a, C, F>,
}

impl<'a, C, F> BatchRunner<'a, C, F>
where
    C: Compiler + ?Sized,
    F: VmFactory,
{
    pub fn new(
        compiler: &'a C,
        host: &'a RunnerHost,
        factory: &'a F,
        options: HarnessOptions,
    ) -> Self {
        Self {
            compiler,
            host,
            harness: TestHarness::new(compiler, host, factory, options),
        }
    }

    #[instrument(skip_all, fields(compile_only = cases.compile_only.len(), run = cases.run.len()))]
    pub async fn run<W: Write>(&self, cases: &CaseSet, out: &mut W) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for path in &cases.compile_only {
            writeln!(out, "*** test {}", path.display()).context("write progress")?;
            let outcome = self.compile_only(path);
            print_outcome(out, CaseKind::CompileOnly, &outcome)?;
            report.cases.push(CaseReport {
                path: path.clone(),
                kind: CaseKind::CompileOnly,
                outcome,
            });
        }

        for path in &cases.run {
            writeln!(out, "*** run {}", path.display()).context("write progress")?;
            let outcome = match self.harness.run_file(path).await {
                Ok(Verdict::Pass) => CaseOutcome::Passed,
                Ok(Verdict::Fail { code }) => CaseOutcome::Failed { code },
                Err(HarnessError::Timeout { .. }) => CaseOutcome::TimedOut,
                Err(err) => CaseOutcome::Errored {
                    message: err.to_string(),
                },
            };
            print_outcome(out, CaseKind::Run, &outcome)?;
            report.cases.push(CaseReport {
                path: path.clone(),
                kind: CaseKind::Run,
                outcome,
            });
        }

        let failed = report.failures().count();
        writeln!(
            out,
            "{} cases, {} passed, {} failed",
            report.cases.len(),
            report.cases.len() - failed,
            failed
        )
        .context("write summary")?;
        info!(total = report.cases.len(), failed, "batch finished");
        Ok(report)
    }

    fn compile_only(&self, path: &Path) -> CaseOutcome {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(source) => {
                let err = HarnessError::Io {
                    path: path.to_path_buf(),
                    source,
                };
                return CaseOutcome::Errored {
                    message: err.to_string(),
                };
            }
        };
        self.host.set_main_file(path);
        match self.compiler.test_compiler(self.host, &source) {
            Ok(()) => CaseOutcome::Passed,
            Err(err) => {
                debug!(path = %path.display(), err = %err, "compile-only case failed");
                CaseOutcome::Errored {
                    message: err.to_string(),
                }
            }
        }
    }
}

fn print_outcome<W: Write>(out: &mut W, kind: CaseKind, outcome: &CaseOutcome) -> Result<()> {
    match outcome {
        CaseOutcome::Passed if kind == CaseKind::Run => writeln!(out, "{}", Verdict::Pass),
        CaseOutcome::Passed => Ok(()),
        CaseOutcome::Failed { code } => writeln!(out, "{}", Verdict::Fail { code: *code }),
        CaseOutcome::TimedOut => writeln!(out, "timeout"),
        CaseOutcome::Errored { message } => writeln!(out, "error: {message}"),
    }
    .context("write outcome")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CaseDir;

    #[test]
    fn discover_sorts_and_skips_subdirs() {
        let dir = CaseDir::new().expect("dir");
        dir.write("cases/b.ts", b"").expect("write");
        dir.write("cases/a.ts", b"").expect("write");
        dir.write("cases/nested/c.ts", b"").expect("write");

        let cases = discover_cases(&[dir.path().join("cases")]).expect("discover");
        let names: Vec<_> = cases
            .iter()
            .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.ts", "b.ts"]);
    }

    #[test]
    fn discover_keeps_directory_order() {
        let dir = CaseDir::new().expect("dir");
        dir.write("z/1.ts", b"").expect("write");
        dir.write("a/2.ts", b"").expect("write");
        let cases =
            discover_cases(&[dir.path().join("z"), dir.path().join("a")]).expect("discover");
        assert!(cases[0].ends_with("z/1.ts"));
        assert!(cases[1].ends_with("a/2.ts"));
    }

    #[cfg(unix)]
    #[test]
    fn discover_includes_symlinked_cases() {
        let dir = CaseDir::new().expect("dir");
        dir.write("shared/linked.ts", b"").expect("write");
        dir.write("cases/own.ts", b"").expect("write");
        std::os::unix::fs::symlink("../shared/linked.ts", dir.path().join("cases/linked.ts"))
            .expect("symlink");

        let cases = discover_cases(&[dir.path().join("cases")]).expect("discover");
        assert_eq!(
            cases,
            vec![
                dir.path().join("cases/linked.ts"),
                dir.path().join("cases/own.ts"),
            ]
        );
    }

    #[test]
    fn discover_missing_dir_errors() {
        let dir = CaseDir::new().expect("dir");
        assert!(discover_cases(&[dir.path().join("missing")]).is_err());
    }

    #[test]
    fn empty_dir_yields_no_cases() {
        let dir = CaseDir::new().expect("dir");
        std::fs::create_dir(dir.path().join("empty")).expect("mkdir");
        assert!(
            discover_cases(&[dir.path().join("empty")])
                .expect("discover")
                .is_empty()
        );
    }

    #[test]
    fn exit_code_reflects_failures() {
        let mut report = BatchReport::default();
        assert_eq!(report.exit_code(), exit_codes::OK);
        report.cases.push(CaseReport {
            path: PathBuf::from("a.ts"),
            kind: CaseKind::Run,
            outcome: CaseOutcome::TimedOut,
        });
        assert_eq!(report.exit_code(), exit_codes::FAILED);
    }
}
