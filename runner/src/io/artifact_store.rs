//! Loading program artifacts: reuse compiled images, compile everything else.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::compiler::{Compiler, Host, compile_binary};
use crate::core::artifact::{ArtifactKind, classify};
use crate::error::{HarnessError, Result};
use crate::io::host::RunnerHost;

/// File name the native path hands to the VM binary.
pub const COMPILED_FILE_NAME: &str = "compiled.jacs";

/// Turn a raw artifact into a verified program image.
///
/// Compiled images are passed through untouched; anything else is compiled as
/// source named `name`. Both paths end with the host's bytecode verification.
#[instrument(skip_all, fields(name = %name.display(), bytes = buf.len()))]
pub fn prepare_binary<C: Compiler + ?Sized>(
    buf: Vec<u8>,
    name: &Path,
    compiler: &C,
    host: &RunnerHost,
) -> Result<Vec<u8>> {
    let binary = match classify(&buf) {
        ArtifactKind::Compiled => {
            debug!("artifact already compiled");
            buf
        }
        ArtifactKind::Source => {
            debug!("compiling source artifact");
            host.set_main_file(name);
            let source = String::from_utf8_lossy(&buf);
            compile_binary(compiler, host, &source)?
        }
    };
    host.verify_bytecode(&binary)?;
    Ok(binary)
}

/// Read `path` and prepare it with [`prepare_binary`].
pub fn load_artifact<C: Compiler + ?Sized>(
    path: &Path,
    compiler: &C,
    host: &RunnerHost,
) -> Result<Vec<u8>> {
    let buf = fs::read(path).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    prepare_binary(buf, path, compiler, host)
}

/// Persist a program image under the dist directory for external runners.
pub fn write_compiled(dist_dir: &Path, binary: &[u8]) -> anyhow::Result<PathBuf> {
    use anyhow::Context;

    fs::create_dir_all(dist_dir)
        .with_context(|| format!("create dist dir {}", dist_dir.display()))?;
    let path = dist_dir.join(COMPILED_FILE_NAME);
    fs::write(&path, binary).with_context(|| format!("write {}", path.display()))?;
    info!(path = %path.display(), bytes = binary.len(), "wrote compiled program");
    Ok(path)
}
