//! Content-based detection of compiled bytecode vs source text.

/// Leading signature of every compiled program image.
pub const MAGIC: [u8; 8] = [0x4a, 0x61, 0x63, 0x53, 0x0a, 0x7e, 0x6a, 0x9a];

/// What a raw artifact buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Already-compiled bytecode; must not be recompiled.
    Compiled,
    /// Source text that still needs compilation.
    Source,
}

/// Classify a buffer by its leading bytes only.
///
/// Buffers shorter than the signature are always `Source`. File names and
/// extensions play no part in the decision.
pub fn classify(buf: &[u8]) -> ArtifactKind {
    match buf.get(..MAGIC.len()) {
        Some(prefix) if prefix == MAGIC => ArtifactKind::Compiled,
        _ => ArtifactKind::Source,
    }
}
