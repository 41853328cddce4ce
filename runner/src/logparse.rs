//! Replay of device event logs through the compiler's log parser.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::compiler::Compiler;

/// Random-access reader over a log.
pub trait ByteSource: Send + Sync {
    /// Read `size` bytes starting at `offset`. Reads past the end are zero-filled.
    fn read_at(&self, offset: u64, size: usize) -> Result<Vec<u8>>;
}

/// Parsed log, split into generations.
pub trait LogHandle {
    /// Human-readable overview of the whole log.
    fn dump(&self) -> Result<String>;

    fn generation(&self, index: usize) -> Result<Box<dyn Generation + '_>>;
}

/// One bounded window of events.
pub trait Generation {
    fn compute_stats(&self) -> Result<Value>;

    fn for_each_event(&self, visit: &mut dyn FnMut(&str) -> Result<()>) -> Result<()>;
}

/// [`ByteSource`] over a file on disk.
pub struct FileByteSource {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileByteSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }
}

impl ByteSource for FileByteSource {
    fn read_at(&self, offset: u64, size: usize) -> Result<Vec<u8>> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("log file lock poisoned"))?;
        file.seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek {} in {}", offset, self.path.display()))?;
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let n = file
                .read(&mut buf[filled..])
                .with_context(|| format!("read {}", self.path.display()))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    Events,
    Stats,
}

/// Which part of the log to replay after the overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRequest {
    pub path: PathBuf,
    /// Generation to open; `None` prints only the overview.
    pub generation: Option<usize>,
    pub mode: ReplayMode,
}

impl ReplayRequest {
    /// Build from trailing CLI words: `[GEN] [stats]`. A generation of `0` or a
    /// non-numeric word means "overview only".
    pub fn from_args(path: PathBuf, args: &[String]) -> Self {
        let generation = args
            .first()
            .and_then(|word| word.parse::<usize>().ok())
            .filter(|index| *index != 0);
        let mode = if args.get(1).is_some_and(|word| word == "stats") {
            ReplayMode::Stats
        } else {
            ReplayMode::Events
        };
        Self {
            path,
            generation,
            mode,
        }
    }
}

#[instrument(skip_all, fields(path = %request.path.display(), generation = ?request.generation))]
pub fn replay_log<C: Compiler + ?Sized, W: Write>(
    compiler: &C,
    request: &ReplayRequest,
    out: &mut W,
) -> Result<()> {
    let source = FileByteSource::open(&request.path)?;
    let log = compiler
        .parse_log(Box::new(source))
        .with_context(|| format!("parse log {}", request.path.display()))?;
    writeln!(out, "{}", log.dump()?).context("write dump")?;

    let Some(index) = request.generation else {
        return Ok(());
    };
    debug!(index, mode = ?request.mode, "opening generation");
    let generation = log.generation(index)?;
    match request.mode {
        ReplayMode::Stats => {
            let stats = generation.compute_stats()?;
            let rendered = serde_json::to_string_pretty(&stats).context("render stats")?;
            writeln!(out, "{rendered}").context("write stats")?;
        }
        ReplayMode::Events => {
            generation.for_each_event(&mut |event: &str| {
                writeln!(out, "{event}").context("write event")
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_source_reads_ranges_and_zero_fills_past_end() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("log.bin");
        std::fs::write(&path, b"0123456789").expect("write");

        let source = FileByteSource::open(&path).expect("open");
        assert_eq!(source.read_at(2, 3).expect("read"), b"234");
        assert_eq!(source.read_at(8, 4).expect("read"), b"89\0\0");
    }

    #[test]
    fn request_parses_generation_and_mode() {
        let path = PathBuf::from("log.bin");
        let req = ReplayRequest::from_args(path.clone(), &["3".into(), "stats".into()]);
        assert_eq!(req.generation, Some(3));
        assert_eq!(req.mode, ReplayMode::Stats);

        let req = ReplayRequest::from_args(path.clone(), &["2".into()]);
        assert_eq!(req.generation, Some(2));
        assert_eq!(req.mode, ReplayMode::Events);

        let req = ReplayRequest::from_args(path.clone(), &["0".into()]);
        assert_eq!(req.generation, None);

        let req = ReplayRequest::from_args(path, &[]);
        assert_eq!(req.generation, None);
    }
}
