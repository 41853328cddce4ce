//! VM sessions backed by an external VM host process.
//!
//! Each deploy launches `command [transport args] <program>` with the device
//! identity in `JACS_DEVICE_ID`. The host writes every frame the VM sends to
//! stdout back to back; frames are split on their size byte and handed to the
//! packet hook from a reader task.
//!
//! Bytecode checks run the same command with `JACS_DEPLOY_MODE=verify`: the
//! host loads the program without starting it and exits with the deploy code.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use crate::core::device_id::DeviceId;
use crate::core::frame::FrameSplitter;
use crate::io::config::RunnerConfig;
use crate::io::process::run_command_with_timeout;
use crate::session::{PacketHook, Transport, VmFactory, VmSession};

pub const DEVICE_ID_ENV: &str = "JACS_DEVICE_ID";
pub const DEPLOY_MODE_ENV: &str = "JACS_DEPLOY_MODE";

/// Deploy codes for failures on this side of the process boundary.
pub const DEPLOY_NOT_STARTED: i32 = -1;
pub const DEPLOY_SPAWN_FAILED: i32 = -2;

const VERIFY_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

type SharedHook = Arc<Mutex<Option<PacketHook>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeployMode {
    Direct,
    Client,
    Verify,
}

impl DeployMode {
    fn as_str(self) -> &'static str {
        match self {
            DeployMode::Direct => "direct",
            DeployMode::Client => "client",
            DeployMode::Verify => "verify",
        }
    }
}

pub struct ProcessVm {
    command: Vec<String>,
    work_dir: PathBuf,
    device: DeviceId,
    transport: Option<Transport>,
    started: bool,
    hook: SharedHook,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

impl ProcessVm {
    pub fn new(command: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            work_dir: work_dir.into(),
            device: DeviceId::default(),
            transport: None,
            started: false,
            hook: Arc::new(Mutex::new(None)),
            child: None,
            reader: None,
        }
    }

    fn transport_args(&self) -> Vec<String> {
        match &self.transport {
            None => Vec::new(),
            Some(Transport::Tcp { host, port }) => vec!["--tcp".into(), format!("{host}:{port}")],
        }
    }

    fn write_program(&self, binary: &[u8]) -> Result<PathBuf> {
        write_program(
            &self.work_dir,
            &format!("deploy-{}.jacs", self.device.to_hex()),
            binary,
        )
    }

    #[instrument(skip_all, fields(device = %self.device, mode = mode.as_str(), bytes = binary.len()))]
    fn launch(&mut self, binary: &[u8], mode: DeployMode) -> i32 {
        if !self.started {
            warn!("deploy before start");
            return DEPLOY_NOT_STARTED;
        }
        self.stop();
        match self.spawn(binary, mode) {
            Ok(()) => 0,
            Err(err) => {
                error!(err = %format!("{err:#}"), "failed to launch VM host");
                DEPLOY_SPAWN_FAILED
            }
        }
    }

    fn spawn(&mut self, binary: &[u8], mode: DeployMode) -> Result<()> {
        let program = self.write_program(binary)?;
        let (exe, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("empty vm command"))?;
        let mut cmd = Command::new(exe);
        cmd.args(args)
            .args(self.transport_args())
            .arg(&program)
            .env(DEVICE_ID_ENV, self.device.to_hex())
            .env(DEPLOY_MODE_ENV, mode.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().with_context(|| format!("spawn {exe}"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        debug!(pid = ?child.id(), program = %program.display(), "VM host running");
        self.reader = Some(tokio::spawn(pump_frames(stdout, Arc::clone(&self.hook))));
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.take()
            && let Err(err) = child.start_kill()
        {
            trace!(err = %err, "VM host already gone");
        }
    }
}

fn write_program(dir: &Path, file_name: &str, binary: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(file_name);
    fs::write(&path, binary).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

impl Drop for ProcessVm {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn pump_frames(mut stdout: ChildStdout, hook: SharedHook) {
    let mut splitter = FrameSplitter::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!(err = %err, "VM host stream failed");
                break;
            }
        };
        for frame in splitter.push(&chunk[..n]) {
            let mut slot = match hook.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(hook) = slot.as_mut() {
                hook(&frame);
            }
        }
    }
    if splitter.buffered() > 0 {
        debug!(bytes = splitter.buffered(), "VM host stream ended mid-frame");
    }
}

impl VmSession for ProcessVm {
    fn init(&mut self) -> Result<()> {
        if self.command.first().is_none_or(|exe| exe.trim().is_empty()) {
            return Err(anyhow!("vm command must be a non-empty array"));
        }
        Ok(())
    }

    fn set_device_id(&mut self, id: &DeviceId) {
        self.device = *id;
    }

    fn start(&mut self) {
        self.started = true;
    }

    fn deploy(&mut self, binary: &[u8]) -> i32 {
        self.launch(binary, DeployMode::Direct)
    }

    fn client_deploy(&mut self, binary: &[u8]) -> i32 {
        self.launch(binary, DeployMode::Client)
    }

    fn set_packet_hook(&mut self, hook: Option<PacketHook>) {
        let mut slot = match self.hook.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = hook;
    }

    fn setup_transport(&mut self, transport: &Transport) -> Result<()> {
        debug!(?transport, "transport configured");
        self.transport = Some(transport.clone());
        Ok(())
    }
}

/// Produces [`ProcessVm`] sessions from the `[vm]` config section.
#[derive(Debug, Clone)]
pub struct ProcessVmFactory {
    command: Vec<String>,
    work_dir: PathBuf,
    verify_timeout: Duration,
}

impl ProcessVmFactory {
    pub fn new(command: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            work_dir: work_dir.into(),
            verify_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    pub fn from_config(cfg: &RunnerConfig) -> Self {
        Self::new(cfg.vm.command.clone(), cfg.dist_dir.clone())
            .with_verify_timeout(Duration::from_secs(cfg.vm.verify_timeout_secs))
    }
}

impl VmFactory for ProcessVmFactory {
    type Session = ProcessVm;

    async fn instantiate(&self) -> Result<ProcessVm> {
        let mut vm = ProcessVm::new(self.command.clone(), self.work_dir.clone());
        vm.init()?;
        Ok(vm)
    }

    #[instrument(skip_all, fields(bytes = binary.len()))]
    fn check_deploy(&self, binary: &[u8]) -> Result<i32> {
        let (exe, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("empty vm command"))?;
        let program = write_program(&self.work_dir, "verify.jacs", binary)?;
        let mut cmd = std::process::Command::new(exe);
        cmd.args(args)
            .arg(&program)
            .env(DEVICE_ID_ENV, DeviceId::default().to_hex())
            .env(DEPLOY_MODE_ENV, DeployMode::Verify.as_str());

        let output =
            run_command_with_timeout(cmd, None, self.verify_timeout, VERIFY_OUTPUT_LIMIT_BYTES)?;
        if output.timed_out {
            return Err(anyhow!(output.failure_summary("bytecode check")));
        }
        let code = output
            .status
            .code()
            .ok_or_else(|| anyhow!(output.failure_summary("bytecode check")))?;
        if code != 0 {
            debug!(code, stderr = %output.stderr_lossy(), "VM host rejected program");
        }
        Ok(code)
    }
}
