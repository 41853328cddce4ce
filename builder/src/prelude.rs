//! Prelude embedding: a directory of template files becomes a generated
//! `prelude` mapping from file name to file text.
//!
//! The output is deterministic (entries sorted by name, fixed layout), and the
//! file is only rewritten when its content changes so downstream builds keep
//! their caches.

use std::borrow::Cow;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

pub const HEADER: &str = "export const prelude: Record<string, string> = {\n";
pub const FOOTER: &str = "}\n";

static EMBED_HAZARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$`\\]").expect("escape pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreludeUpdate {
    Written,
    Unchanged,
}

/// One template file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub text: String,
}

/// Prefix `$`, backtick and backslash with a backslash.
pub fn escape_line(line: &str) -> Cow<'_, str> {
    EMBED_HAZARD_RE.replace_all(line, r"\$0")
}

/// Escaped body of one entry: every line newline-terminated, trailing blank
/// lines dropped. Lines end at `\n` or `\r\n`.
pub fn embed_text(text: &str) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len() - 1;
    for line in &mut lines[..last] {
        let raw: &str = *line;
        *line = raw.strip_suffix('\r').unwrap_or(raw);
    }
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    let mut body = String::with_capacity(text.len() + lines.len());
    for line in lines {
        body.push_str(&escape_line(line));
        body.push('\n');
    }
    body
}

/// Regular files directly inside `dir` (symlinks resolved), sorted by name.
pub fn read_templates(dir: &Path) -> Result<Vec<Template>> {
    let mut templates = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.with_context(|| format!("read template dir {}", dir.display()))?;
        if !entry.file_type().is_file() {
            debug!(path = %entry.path().display(), "skipping non-file entry");
            continue;
        }
        let name = entry
            .file_name()
            .to_str()
            .ok_or_else(|| anyhow!("template name is not UTF-8: {}", entry.path().display()))?
            .to_string();
        let text = fs::read_to_string(entry.path())
            .with_context(|| format!("read {}", entry.path().display()))?;
        templates.push(Template { name, text });
    }
    Ok(templates)
}

pub fn render_prelude(templates: &[Template]) -> String {
    let mut out = String::from(HEADER);
    for template in templates {
        out.push_str("    \"");
        out.push_str(&template.name);
        out.push_str("\":\n`");
        out.push_str(&embed_text(&template.text));
        out.push_str("`,\n");
    }
    out.push_str(FOOTER);
    out
}

/// Regenerate `out` from the templates in `dir`, writing only on change.
#[instrument(skip_all, fields(dir = %dir.display(), out = %out.display()))]
pub fn build_prelude(dir: &Path, out: &Path) -> Result<PreludeUpdate> {
    let templates = read_templates(dir)?;
    let rendered = render_prelude(&templates);

    match fs::read_to_string(out) {
        Ok(current) if current == rendered => {
            debug!(entries = templates.len(), "prelude up to date");
            return Ok(PreludeUpdate::Unchanged);
        }
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err).with_context(|| format!("read {}", out.display())),
    }

    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(out, &rendered).with_context(|| format!("write {}", out.display()))?;
    info!(entries = templates.len(), "prelude updated");
    Ok(PreludeUpdate::Written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_each_hazard() {
        assert_eq!(escape_line("a${b}`c`\\d"), "a\\${b}\\`c\\`\\\\d");
        assert!(matches!(escape_line("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn trailing_blank_lines_are_dropped() {
        assert_eq!(embed_text("a\nb\n\n\n"), "a\nb\n");
        assert_eq!(embed_text(""), "");
        assert_eq!(embed_text("\n\n"), "");
    }

    #[test]
    fn interior_blank_lines_are_kept() {
        assert_eq!(embed_text("a\n\nb"), "a\n\nb\n");
    }

    #[test]
    fn crlf_is_normalized() {
        assert_eq!(embed_text("a\r\nb\r\n"), "a\nb\n");
    }

    #[test]
    fn renders_fixed_layout() {
        let rendered = render_prelude(&[Template {
            name: "a.ts".to_string(),
            text: "x\n".to_string(),
        }]);
        assert_eq!(
            rendered,
            "export const prelude: Record<string, string> = {\n    \"a.ts\":\n`x\n`,\n}\n"
        );
    }

    #[test]
    fn empty_dir_renders_empty_mapping() {
        assert_eq!(render_prelude(&[]), format!("{HEADER}{FOOTER}"));
    }
}
