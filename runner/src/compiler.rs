//! Compiler adapter and the host capabilities handed to it.

use anyhow::{Result, bail};
use serde_json::Value;

use crate::core::artifact::{ArtifactKind, MAGIC, classify};
use crate::error::HarnessError;
use crate::logparse::{ByteSource, LogHandle};
use crate::session::VmFactory;

/// Capabilities the compiler may call back into while compiling.
pub trait Host: Send + Sync {
    /// Write a compiler output file (listings, debug info) next to build outputs.
    fn write(&self, filename: &str, content: &[u8]) -> Result<()>;

    fn log(&self, message: &str);

    /// Name of the file currently being compiled.
    fn main_file_name(&self) -> String;

    /// Service specifications the compiler resolves roles against.
    fn get_specs(&self) -> Result<Value>;

    /// Sanity-check a program image before it is trusted.
    fn verify_bytecode(&self, binary: &[u8]) -> crate::error::Result<()>;
}

/// Raw result of a compile call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    pub success: bool,
    pub binary: Option<Vec<u8>>,
}

pub trait Compiler {
    fn compile(&self, host: &dyn Host, source: &str) -> Result<CompileOutput>;

    /// Run the compiler's self-check over `source` without producing a program.
    fn test_compiler(&self, host: &dyn Host, source: &str) -> crate::error::Result<()>;

    fn parse_log(&self, _source: Box<dyn ByteSource>) -> Result<Box<dyn LogHandle>> {
        bail!("this compiler backend cannot parse logs")
    }
}

/// Compile `source`, mapping an unsuccessful result to a compilation error.
pub fn compile_binary<C: Compiler + ?Sized>(
    compiler: &C,
    host: &dyn Host,
    source: &str,
) -> crate::error::Result<Vec<u8>> {
    let output = compiler.compile(host, source)?;
    match output {
        CompileOutput {
            success: true,
            binary: Some(binary),
        } => Ok(binary),
        CompileOutput { success: true, .. } => Err(HarnessError::compilation(
            "compiler reported success without a binary",
        )),
        CompileOutput { success: false, .. } => {
            Err(HarnessError::compilation(host.main_file_name()))
        }
    }
}

/// Structural check applied to every program image before deploy.
pub trait BytecodeVerifier: Send + Sync {
    fn verify(&self, binary: &[u8]) -> crate::error::Result<()>;
}

/// Accepts images that carry the bytecode signature and a non-empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier;

impl BytecodeVerifier for SignatureVerifier {
    fn verify(&self, binary: &[u8]) -> crate::error::Result<()> {
        if classify(binary) != ArtifactKind::Compiled {
            return Err(HarnessError::verification("missing bytecode signature"));
        }
        if binary.len() <= MAGIC.len() {
            return Err(HarnessError::verification(format!(
                "truncated image ({} bytes)",
                binary.len()
            )));
        }
        Ok(())
    }
}

/// Signature check followed by a deploy into a scratch VM; any non-zero
/// deploy code rejects the image.
#[derive(Debug, Clone)]
pub struct DeployVerifier<F> {
    factory: F,
}

impl<F> DeployVerifier<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F: VmFactory + Send + Sync> BytecodeVerifier for DeployVerifier<F> {
    fn verify(&self, binary: &[u8]) -> crate::error::Result<()> {
        SignatureVerifier.verify(binary)?;
        let code = self
            .factory
            .check_deploy(binary)
            .map_err(|err| HarnessError::Other(err.context("bytecode check")))?;
        if code != 0 {
            return Err(HarnessError::verification(code.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedFactory, VmCall, compiled_image};

    #[test]
    fn signature_verifier_accepts_image() {
        let mut image = MAGIC.to_vec();
        image.push(0);
        assert!(SignatureVerifier.verify(&image).is_ok());
    }

    #[test]
    fn signature_verifier_rejects_source_and_bare_header() {
        let err = SignatureVerifier.verify(b"let x = 1").unwrap_err();
        assert!(matches!(err, HarnessError::Verification { .. }));
        let err = SignatureVerifier.verify(&MAGIC).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn deploy_verifier_rejects_nonzero_deploy_code() {
        let mut image = MAGIC.to_vec();
        image.extend_from_slice(b"\xff\xff not bytecode at all");
        let verifier = DeployVerifier::new(ScriptedFactory::new(Vec::new()).with_deploy_code(4));
        let err = verifier.verify(&image).unwrap_err();
        assert!(matches!(err, HarnessError::Verification { .. }));
        assert_eq!(err.to_string(), "verification error: 4");
    }

    #[test]
    fn deploy_verifier_accepts_what_the_vm_loads() {
        let factory = ScriptedFactory::new(Vec::new());
        let verifier = DeployVerifier::new(factory);
        assert!(verifier.verify(&compiled_image("led.on()")).is_ok());
        assert_eq!(
            verifier.factory.calls(),
            vec![VmCall::CheckDeploy(compiled_image("led.on()").len())]
        );
    }

    #[test]
    fn deploy_verifier_skips_the_vm_without_a_signature() {
        let verifier = DeployVerifier::new(ScriptedFactory::new(Vec::new()));
        assert!(verifier.verify(b"led.on()").is_err());
        assert!(verifier.factory.calls().is_empty());
    }
}
