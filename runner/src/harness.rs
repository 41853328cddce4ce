//! Deploy a program into a fresh VM session and judge it by the packets it emits.
//!
//! The verdict is settled by whichever happens first: the program's verdict
//! signal or the timeout. Both sources race on one [`Settlement`]; the loser's
//! attempt is a no-op. Once settled, the packet hook is detached and the
//! timer aborted.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info, instrument, trace, warn};

use crate::compiler::Compiler;
use crate::core::device_id::DeviceId;
use crate::core::verdict::{Verdict, verdict_signal};
use crate::error::{HarnessError, Result};
use crate::io::artifact_store::prepare_binary;
use crate::io::config::RunnerConfig;
use crate::io::host::RunnerHost;
use crate::session::{VmFactory, VmSession};
use crate::settle::Settlement;

/// Per-run knobs for the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessOptions {
    pub device_id: DeviceId,
    pub timeout: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            device_id: DeviceId::default(),
            timeout: Duration::from_millis(2000),
        }
    }
}

impl HarnessOptions {
    pub fn from_config(cfg: &RunnerConfig) -> Self {
        Self {
            device_id: DeviceId::parse(&cfg.device_id),
            timeout: cfg.verdict_timeout(),
        }
    }
}

/// What settled a pending run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Signal(Verdict),
    TimedOut,
}

/// Runs programs against sessions produced by `factory`, one session per run.
pub struct TestHarness<'a, C: ?Sized, F> {
    compiler: &'a C,
    host: &'a RunnerHost,
    factory: &'a F,
    options: HarnessOptions,
}

impl<'a, C, F> TestHarness<'a, C, F>
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
            factory,
            options,
        }
    }

    /// Read and run the program stored at `path`.
    pub async fn run_file(&self, path: &Path) -> Result<Verdict> {
        let buf = fs::read(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.run_program(buf, path).await
    }

    /// Compile if needed, deploy, and wait for the verdict.
    ///
    /// Compilation and verification happen before any session exists, so a
    /// broken program never instantiates a VM.
    #[instrument(skip_all, fields(name = %name.display(), device = %self.options.device_id))]
    pub async fn run_program(&self, buf: Vec<u8>, name: &Path) -> Result<Verdict> {
        let binary = prepare_binary(buf, name, self.compiler, self.host)?;

        let mut session = self.factory.instantiate().await?;
        let outcome = self.deploy_and_await(&mut session, &binary).await;
        // Detach even on deploy failure so nothing outlives this run.
        session.set_packet_hook(None);

        match outcome? {
            Settled::Signal(verdict) => {
                info!(%verdict, "verdict received");
                Ok(verdict)
            }
            Settled::TimedOut => {
                warn!(timeout_ms = self.options.timeout.as_millis(), "timeout");
                Err(HarnessError::Timeout {
                    after: self.options.timeout,
                })
            }
        }
    }

    async fn deploy_and_await(&self, session: &mut F::Session, binary: &[u8]) -> Result<Settled> {
        let device = self.options.device_id;
        let (cell, pending) = Settlement::new();

        session.set_device_id(&device);
        let observer = Arc::clone(&cell);
        session.set_packet_hook(Some(Box::new(move |frame: &[u8]| {
            let Some(verdict) = verdict_signal(frame, &device) else {
                return;
            };
            if observer.settle(Settled::Signal(verdict)) {
                debug!(%verdict, "verdict signal settled run");
            } else {
                trace!(%verdict, "verdict signal after settlement ignored");
            }
        })));
        session.start();

        let code = session.deploy(binary);
        if code != 0 {
            return Err(HarnessError::Deploy { code });
        }
        debug!(bytes = binary.len(), "program deployed");

        let timer_cell = Arc::clone(&cell);
        let timeout = self.options.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if timer_cell.settle(Settled::TimedOut) {
                debug!("timer settled run");
            }
        });

        let settled = pending.await;
        timer.abort();
        settled.map_err(|_| HarnessError::Other(anyhow!("verdict slot dropped before settling")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::encode_frame;
    use crate::test_support::{
        CaseDir, ScriptedCompiler, ScriptedFactory, ScriptedFrame, VmCall, compiled_image,
        verdict_frame,
    };

    fn device() -> DeviceId {
        DeviceId::parse("12abdd2289421234")
    }

    fn host(dir: &CaseDir) -> RunnerHost {
        RunnerHost::new(dir.path().join("built"), dir.path().join("specs.json"))
    }

    #[tokio::test(start_paused = true)]
    async fn pass_verdict_resolves_pass() {
        let dir = CaseDir::new().expect("dir");
        let host = host(&dir);
        let compiler = ScriptedCompiler::new();
        let factory = ScriptedFactory::new(vec![ScriptedFrame::after(10, verdict_frame(&device(), 0))]);
        let harness = TestHarness::new(&compiler, &host, &factory, HarnessOptions::default());

        let verdict = harness
            .run_program(compiled_image("ok"), Path::new("ok.jacs"))
            .await
            .expect("verdict");
        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(compiler.compile_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_verdict_wins_over_later_ones() {
        let dir = CaseDir::new().expect("dir");
        let host = host(&dir);
        let compiler = ScriptedCompiler::new();
        let factory = ScriptedFactory::new(vec![
            ScriptedFrame::after(10, verdict_frame(&device(), 5)),
            ScriptedFrame::after(20, verdict_frame(&device(), 0)),
        ]);
        let harness = TestHarness::new(&compiler, &host, &factory, HarnessOptions::default());

        let verdict = harness
            .run_program(compiled_image("x"), Path::new("x.jacs"))
            .await
            .expect("verdict");
        assert_eq!(verdict, Verdict::Fail { code: 5 });
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_packets_do_not_settle() {
        let dir = CaseDir::new().expect("dir");
        let host = host(&dir);
        let compiler = ScriptedCompiler::new();
        let factory = ScriptedFactory::new(vec![
            ScriptedFrame::after(5, encode_frame(&device(), 0, 0x0001, &[1])),
            ScriptedFrame::after(6, encode_frame(&device(), 2, 0x0080, &[1])),
            ScriptedFrame::after(7, vec![0u8; 4]),
        ]);
        let options = HarnessOptions {
            timeout: Duration::from_millis(100),
            ..HarnessOptions::default()
        };
        let harness = TestHarness::new(&compiler, &host, &factory, options);

        let err = harness
            .run_program(compiled_image("x"), Path::new("x.jacs"))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn session_is_wired_in_order_and_hook_detached() {
        let dir = CaseDir::new().expect("dir");
        let host = host(&dir);
        let compiler = ScriptedCompiler::new();
        let factory = ScriptedFactory::new(vec![ScriptedFrame::after(1, verdict_frame(&device(), 0))]);
        let harness = TestHarness::new(&compiler, &host, &factory, HarnessOptions::default());

        let image = compiled_image("p");
        harness
            .run_program(image.clone(), Path::new("p.jacs"))
            .await
            .expect("verdict");
        assert_eq!(
            factory.calls(),
            vec![
                VmCall::Init,
                VmCall::SetDeviceId(device()),
                VmCall::HookInstalled,
                VmCall::Start,
                VmCall::Deploy(image.len()),
                VmCall::HookCleared,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_deploy_is_deploy_error() {
        let dir = CaseDir::new().expect("dir");
        let host = host(&dir);
        let compiler = ScriptedCompiler::new();
        let factory = ScriptedFactory::new(Vec::new()).with_deploy_code(-7);
        let harness = TestHarness::new(&compiler, &host, &factory, HarnessOptions::default());

        let err = harness
            .run_program(compiled_image("p"), Path::new("p.jacs"))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Deploy { code: -7 }));
        assert_eq!(factory.calls().last(), Some(&VmCall::HookCleared));
    }

    #[tokio::test(start_paused = true)]
    async fn run_file_reads_from_disk() {
        let dir = CaseDir::new().expect("dir");
        let host = host(&dir);
        let path = dir.write("run-tests/a.ts", b"assert(true)").expect("write");
        let compiler = ScriptedCompiler::new();
        let factory = ScriptedFactory::new(vec![ScriptedFrame::after(3, verdict_frame(&device(), 0))]);
        let harness = TestHarness::new(&compiler, &host, &factory, HarnessOptions::default());

        assert_eq!(harness.run_file(&path).await.expect("verdict"), Verdict::Pass);
        assert_eq!(compiler.compile_calls(), 1);
    }
}
