//! Scripted compiler and VM doubles for harness tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};

use crate::compiler::{CompileOutput, Compiler, Host};
use crate::core::artifact::MAGIC;
use crate::core::device_id::DeviceId;
use crate::core::frame::encode_frame;
use crate::core::verdict::{EVENT_FLAG, PANIC_EVENT_CODE, VERDICT_SERVICE_INDEX};
use crate::error::HarnessError;
use crate::logparse::{ByteSource, Generation, LogHandle};
use crate::session::{PacketHook, Transport, VmFactory, VmSession};

/// Marker that makes [`ScriptedCompiler`] reject a source.
pub const SYNTAX_ERROR: &str = "syntax error";

/// Program image the scripted compiler produces for `source`.
pub fn compiled_image(source: &str) -> Vec<u8> {
    let mut image = MAGIC.to_vec();
    image.extend_from_slice(&(source.len() as u32).to_le_bytes());
    image.extend_from_slice(source.as_bytes());
    image
}

/// Verdict frame as emitted by a finishing test program.
pub fn verdict_frame(device: &DeviceId, code: u8) -> Vec<u8> {
    encode_frame(
        device,
        VERDICT_SERVICE_INDEX,
        EVENT_FLAG | u16::from(PANIC_EVENT_CODE),
        &[code],
    )
}

/// Compiler double: sources containing [`SYNTAX_ERROR`] fail, everything
/// else compiles to [`compiled_image`].
#[derive(Default)]
pub struct ScriptedCompiler {
    raw_output: Option<Vec<u8>>,
    log: Option<ScriptedLog>,
    compile_calls: AtomicUsize,
    test_calls: AtomicUsize,
}

impl ScriptedCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `bytes` verbatim from every successful compile.
    pub fn with_raw_output(mut self, bytes: Vec<u8>) -> Self {
        self.raw_output = Some(bytes);
        self
    }

    pub fn with_log(mut self, log: ScriptedLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn compile_calls(&self) -> usize {
        self.compile_calls.load(Ordering::SeqCst)
    }

    pub fn test_calls(&self) -> usize {
        self.test_calls.load(Ordering::SeqCst)
    }
}

impl Compiler for ScriptedCompiler {
    fn compile(&self, host: &dyn Host, source: &str) -> Result<CompileOutput> {
        self.compile_calls.fetch_add(1, Ordering::SeqCst);
        host.log(&format!("compiling {}", host.main_file_name()));
        if source.contains(SYNTAX_ERROR) {
            return Ok(CompileOutput {
                success: false,
                binary: None,
            });
        }
        let binary = self
            .raw_output
            .clone()
            .unwrap_or_else(|| compiled_image(source));
        Ok(CompileOutput {
            success: true,
            binary: Some(binary),
        })
    }

    fn test_compiler(&self, host: &dyn Host, source: &str) -> crate::error::Result<()> {
        self.test_calls.fetch_add(1, Ordering::SeqCst);
        if source.contains(SYNTAX_ERROR) {
            return Err(HarnessError::compilation(host.main_file_name()));
        }
        Ok(())
    }

    fn parse_log(&self, source: Box<dyn ByteSource>) -> Result<Box<dyn LogHandle>> {
        let Some(log) = &self.log else {
            anyhow::bail!("no scripted log");
        };
        Ok(Box::new(ScriptedLogHandle {
            source,
            log: log.clone(),
        }))
    }
}

/// Log double: each generation is a list of event lines.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLog {
    pub generations: Vec<Vec<String>>,
}

struct ScriptedLogHandle {
    source: Box<dyn ByteSource>,
    log: ScriptedLog,
}

impl LogHandle for ScriptedLogHandle {
    fn dump(&self) -> Result<String> {
        let head = self.source.read_at(0, 4)?;
        Ok(format!(
            "log {} generations={}",
            String::from_utf8_lossy(&head),
            self.log.generations.len()
        ))
    }

    fn generation(&self, index: usize) -> Result<Box<dyn Generation + '_>> {
        let events = self
            .log
            .generations
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("no generation {index}"))?;
        Ok(Box::new(ScriptedGeneration { events }))
    }
}

struct ScriptedGeneration<'a> {
    events: &'a [String],
}

impl Generation for ScriptedGeneration<'_> {
    fn compute_stats(&self) -> Result<Value> {
        Ok(json!({ "events": self.events.len() }))
    }

    fn for_each_event(&self, visit: &mut dyn FnMut(&str) -> Result<()>) -> Result<()> {
        for event in self.events {
            visit(event.as_str())?;
        }
        Ok(())
    }
}

/// Frame a scripted VM emits `delay` after deploy.
#[derive(Debug, Clone)]
pub struct ScriptedFrame {
    pub delay: Duration,
    pub frame: Vec<u8>,
}

impl ScriptedFrame {
    pub fn after(delay_ms: u64, frame: Vec<u8>) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            frame,
        }
    }
}

/// Calls observed by scripted sessions, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmCall {
    Init,
    SetDeviceId(DeviceId),
    Start,
    Deploy(usize),
    ClientDeploy(usize),
    SetupTransport(Transport),
    /// Load-only deploy used for bytecode checks.
    CheckDeploy(usize),
    HookInstalled,
    HookCleared,
}

type SharedHook = Arc<Mutex<Option<PacketHook>>>;

/// VM double that replays scripted frames after deploy.
pub struct ScriptedVm {
    script: Vec<ScriptedFrame>,
    deploy_code: i32,
    hook: SharedHook,
    calls: Arc<Mutex<Vec<VmCall>>>,
}

impl ScriptedVm {
    fn record(&self, call: VmCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn schedule_script(&self) {
        for scripted in self.script.clone() {
            let hook = Arc::clone(&self.hook);
            tokio::spawn(async move {
                tokio::time::sleep(scripted.delay).await;
                if let Ok(mut hook) = hook.lock()
                    && let Some(hook) = hook.as_mut()
                {
                    hook(scripted.frame.as_slice());
                }
            });
        }
    }
}

impl VmSession for ScriptedVm {
    fn init(&mut self) -> Result<()> {
        self.record(VmCall::Init);
        Ok(())
    }

    fn set_device_id(&mut self, id: &DeviceId) {
        self.record(VmCall::SetDeviceId(*id));
    }

    fn start(&mut self) {
        self.record(VmCall::Start);
    }

    fn deploy(&mut self, binary: &[u8]) -> i32 {
        self.record(VmCall::Deploy(binary.len()));
        if self.deploy_code == 0 {
            self.schedule_script();
        }
        self.deploy_code
    }

    fn client_deploy(&mut self, binary: &[u8]) -> i32 {
        self.record(VmCall::ClientDeploy(binary.len()));
        if self.deploy_code == 0 {
            self.schedule_script();
        }
        self.deploy_code
    }

    fn set_packet_hook(&mut self, hook: Option<PacketHook>) {
        self.record(if hook.is_some() {
            VmCall::HookInstalled
        } else {
            VmCall::HookCleared
        });
        if let Ok(mut slot) = self.hook.lock() {
            *slot = hook;
        }
    }

    fn setup_transport(&mut self, transport: &Transport) -> Result<()> {
        self.record(VmCall::SetupTransport(transport.clone()));
        Ok(())
    }
}

/// Factory handing out [`ScriptedVm`]s that all replay the same script.
#[derive(Default)]
pub struct ScriptedFactory {
    script: Vec<ScriptedFrame>,
    deploy_code: i32,
    instances: AtomicUsize,
    calls: Arc<Mutex<Vec<VmCall>>>,
}

impl ScriptedFactory {
    pub fn new(script: Vec<ScriptedFrame>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn with_deploy_code(mut self, code: i32) -> Self {
        self.deploy_code = code;
        self
    }

    pub fn instances(&self) -> usize {
        self.instances.load(Ordering::SeqCst)
    }

    /// Calls recorded across every session this factory produced.
    pub fn calls(&self) -> Vec<VmCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl VmFactory for ScriptedFactory {
    type Session = ScriptedVm;

    async fn instantiate(&self) -> Result<ScriptedVm> {
        self.instances.fetch_add(1, Ordering::SeqCst);
        let mut vm = ScriptedVm {
            script: self.script.clone(),
            deploy_code: self.deploy_code,
            hook: Arc::new(Mutex::new(None)),
            calls: Arc::clone(&self.calls),
        };
        vm.init()?;
        Ok(vm)
    }

    fn check_deploy(&self, binary: &[u8]) -> Result<i32> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(VmCall::CheckDeploy(binary.len()));
        }
        Ok(self.deploy_code)
    }
}

/// Temporary directory with helpers for writing case files.
pub struct CaseDir {
    dir: tempfile::TempDir,
}

impl CaseDir {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Write `contents` to `rel` (creating parents) and return the full path.
    pub fn write(&self, rel: &str, contents: &[u8]) -> Result<std::path::PathBuf> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}
