//! Bounded, timestamped activity log persisted to a text file.
//!
//! One entry per line, `[YYYY-MM-DD HH:MM:SS] text`, oldest first. Each append
//! rewrites the file with at most `capacity` lines (the newest ones). Writes go
//! through an exclusive `fs2` lock plus a temp-file rename, so a crash mid-write
//! leaves either the old or the new file.
//!
//! Logging must never take the controller down: [`ActivityLog::append`]
//! reports I/O trouble through `log::warn!` and carries on. Use
//! [`ActivityLog::try_append`] when the caller wants the error.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use fs2::FileExt;
use log::{info, warn};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::GateError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Placeholder returned by reads when the log is empty or missing.
pub const EMPTY_PLACEHOLDER: &str = "No log entries yet.";

/// One parsed log line. Lines that do not carry a timestamp are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: Option<NaiveDateTime>,
    pub text: String,
}

impl LogEntry {
    fn parse(line: &str) -> Self {
        if let Some(rest) = line.strip_prefix('[') {
            if let Some((stamp, text)) = rest.split_once("] ") {
                if let Ok(ts) = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT) {
                    return Self {
                        timestamp: Some(ts),
                        text: text.to_string(),
                    };
                }
            }
        }
        Self {
            timestamp: None,
            text: line.to_string(),
        }
    }

    fn placeholder() -> Self {
        Self {
            timestamp: None,
            text: EMPTY_PLACEHOLDER.to_string(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp {
            Some(ts) => write!(f, "[{}] {}", ts.format(TIMESTAMP_FORMAT), self.text),
            None => f.write_str(&self.text),
        }
    }
}

#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    capacity: usize,
    offset: FixedOffset,
    /// Serialises appends from this process; the file lock covers other processes.
    write_lock: Mutex<()>,
}

impl ActivityLog {
    /// Create a handle for `path`. The file is created lazily on first append.
    pub fn open(path: impl Into<PathBuf>, capacity: usize, offset: FixedOffset) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
            offset,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `text` stamped with the current local time. Never fails.
    pub fn append(&self, text: &str) {
        info!("{}", text);
        if let Err(e) = self.try_append(text) {
            warn!("Activity log write to {} failed: {}", self.path.display(), e);
        }
    }

    pub fn try_append(&self, text: &str) -> Result<(), GateError> {
        self.try_append_at(text, Utc::now())
    }

    /// Append with an explicit instant; the stamp is rendered in the log's offset.
    pub fn try_append_at(&self, text: &str, at: DateTime<Utc>) -> Result<(), GateError> {
        let stamp = at.with_timezone(&self.offset).format(TIMESTAMP_FORMAT);
        // Embedded newlines would split one entry into several.
        let line = format!("[{}] {}", stamp, text.replace(['\r', '\n'], " "));

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)?;
        lock_file.lock_exclusive()?;

        let mut existing = String::new();
        (&lock_file).read_to_string(&mut existing)?;
        let mut lines: Vec<&str> = existing.lines().filter(|l| !l.is_empty()).collect();
        lines.push(&line);
        let skip = lines.len().saturating_sub(self.capacity);

        let mut content = String::with_capacity(existing.len() + line.len() + 1);
        for l in &lines[skip..] {
            content.push_str(l);
            content.push('\n');
        }
        let result = self.replace_contents(&content);
        let _ = lock_file.unlock();
        result
    }

    fn replace_contents(&self, content: &str) -> Result<(), GateError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let base = self
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("activity.log");
        let tmp_path = dir.join(format!(".{}.tmp-{}", base, std::process::id()));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(content.as_bytes())?;
            tmp.flush()?;
            let _ = tmp.sync_all();
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn read_lines(&self) -> Vec<String> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };
        if file.lock_shared().is_err() {
            return Vec::new();
        }
        let mut content = String::new();
        let read = (&file).read_to_string(&mut content);
        let _ = file.unlock();
        if let Err(e) = read {
            warn!("Activity log read from {} failed: {}", self.path.display(), e);
            return Vec::new();
        }
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Up to `k` most recent entries, newest first. An empty or unreadable log
    /// yields a single placeholder entry.
    pub fn tail(&self, k: usize) -> Vec<LogEntry> {
        let lines = self.read_lines();
        if lines.is_empty() {
            return vec![LogEntry::placeholder()];
        }
        lines.iter().rev().take(k).map(|l| LogEntry::parse(l)).collect()
    }

    /// Up to `k` most recent lines joined newest first, for display refreshes.
    pub fn recent_block(&self, k: usize) -> String {
        self.tail(k)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Total stored entries.
    pub fn len(&self) -> usize {
        self.read_lines().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
