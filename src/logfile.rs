//! Append-only run log
//!
//! Every line survives across runs so a technician with only SSH access can
//! reconstruct what the device did overnight. Entries also mirror to the
//! `log` facade for interactive `-v` sessions.

use anyhow::{Context, Result};
use chrono::Local;
use converge::RunLog;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

pub struct FileLog {
    file: File,
}

impl FileLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Could not open log file {}", path.display()))?;
        Ok(Self { file })
    }

    fn append(&mut self, level: &str, message: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let line = format_line(&timestamp, level, message);
        // A full disk must not abort convergence; the run itself matters more
        // than its trace.
        let _ = self.file.write_all(line.as_bytes());
    }
}

impl RunLog for FileLog {
    fn info(&mut self, message: &str) {
        log::info!("{message}");
        self.append("INFO", message);
    }

    fn warn(&mut self, message: &str) {
        log::warn!("{message}");
        self.append("WARN", message);
    }

    fn error(&mut self, message: &str) {
        log::error!("{message}");
        self.append("ERROR", message);
    }
}

fn format_line(timestamp: &str, level: &str, message: &str) -> String {
    format!("[{timestamp}] [{level}] {message}\n")
}
