//! `jacs-run empty`: the image of an empty program as a C array, for firmware
//! that boots with a program preloaded.

use std::path::Path;

use crate::compiler::Compiler;
use crate::error::Result;
use crate::io::artifact_store::prepare_binary;
use crate::io::host::RunnerHost;

const ARRAY_NAME: &str = "jacs_empty_program";
const ITEMS_PER_LINE: usize = 16;

/// Compile (and verify) the empty program.
pub fn empty_program<C: Compiler + ?Sized>(compiler: &C, host: &RunnerHost) -> Result<Vec<u8>> {
    prepare_binary(Vec::new(), Path::new("empty.ts"), compiler, host)
}

/// Render `image` as an aligned C byte array, without a trailing newline.
pub fn render_c_array(image: &[u8]) -> String {
    let mut out = format!(
        "__attribute__((aligned(sizeof(void *)))) static const uint8_t {ARRAY_NAME}[{}] = {{",
        image.len()
    );
    for (i, byte) in image.iter().enumerate() {
        if i % ITEMS_PER_LINE == 0 {
            out.push('\n');
        }
        out.push_str(&format!("0x{byte:02x}, "));
    }
    out.push_str("\n};");
    out
}
