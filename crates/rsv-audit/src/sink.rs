use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Destination for canonical JSON lines. Implementations only ever append.
pub trait LineSink: Send {
    fn append_line(&mut self, line: &str) -> Result<()>;
}

pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Ensures parent dirs exist; the file itself is created on first append.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {:?}", parent))?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSink for FileSink {
    fn append_line(&mut self, line: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open diagnostics log {:?}", self.path))?;
        f.write_all(line.as_bytes())
            .context("write diagnostics line failed")?;
        f.write_all(b"\n").context("write newline failed")?;
        Ok(())
    }
}

/// In-memory sink. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Contents as JSONL text, trailing newline included.
    pub fn contents(&self) -> String {
        self.lines
            .lock()
            .iter()
            .map(|l| format!("{l}\n"))
            .collect()
    }
}

impl LineSink for MemorySink {
    fn append_line(&mut self, line: &str) -> Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}
