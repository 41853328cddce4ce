//! Serve mode: start a VM session, optionally deploy a program into it, and
//! keep it running for external tooling.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::compiler::Compiler;
use crate::core::device_id::DeviceId;
use crate::error::HarnessError;
use crate::io::artifact_store::load_artifact;
use crate::io::host::RunnerHost;
use crate::session::{Transport, VmFactory, VmSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOptions {
    /// Program to deploy; `None` waits for a remote deployer.
    pub file: Option<PathBuf>,
    /// Deploy through the client-side path.
    pub client_deploy: bool,
    /// Skip the transport and return once deployed.
    pub test_mode: bool,
    pub device_id: DeviceId,
    pub transport: Transport,
}

/// Bring up a session and deploy `options.file` into it.
///
/// The returned session must be kept alive for as long as it should serve.
#[instrument(skip_all, fields(file = ?options.file, test_mode = options.test_mode))]
pub async fn start_session<C, F, W>(
    compiler: &C,
    host: &RunnerHost,
    factory: &F,
    options: &ServeOptions,
    out: &mut W,
) -> Result<F::Session>
where
    C: Compiler + ?Sized,
    F: VmFactory,
    W: Write,
{
    let mut session = factory.instantiate().await.context("instantiate VM")?;
    session.set_device_id(&options.device_id);
    if !options.test_mode {
        session
            .setup_transport(&options.transport)
            .context("set up transport")?;
    }
    session.start();

    match &options.file {
        Some(path) => {
            let binary = load_artifact(path, compiler, host)?;
            let code = if options.client_deploy {
                session.client_deploy(&binary)
            } else {
                session.deploy(&binary)
            };
            if code != 0 {
                return Err(HarnessError::Deploy { code }.into());
            }
            info!(path = %path.display(), bytes = binary.len(), "deployed");
            writeln!(out, "deployed {}", path.display()).context("write progress")?;
        }
        None => {
            writeln!(out, "waiting for external deploy").context("write progress")?;
        }
    }
    Ok(session)
}

/// [`start_session`], then serve until Ctrl-C unless in test mode.
pub async fn serve<C, F, W>(
    compiler: &C,
    host: &RunnerHost,
    factory: &F,
    options: &ServeOptions,
    out: &mut W,
) -> Result<()>
where
    C: Compiler + ?Sized,
    F: VmFactory,
    W: Write,
{
    let session = start_session(compiler, host, factory, options, out).await?;
    if !options.test_mode {
        out.flush().context("flush output")?;
        tokio::signal::ctrl_c()
            .await
            .context("wait for interrupt")?;
        debug!("interrupted");
    }
    drop(session);
    Ok(())
}
