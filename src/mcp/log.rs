//! Append-only protocol log for the responders.
//!
//! Every event is written as a timestamp line followed by the event's JSON,
//! pretty-printed:
//!
//! ```text
//! 2026-10-19T10:42:07.113+02:00 REQUEST tools/call (id 3)
//! {
//!   "jsonrpc": "2.0",
//!   ...
//! }
//! ```
//!
//! Events are mirrored to `tracing`: the summary line at `info`, the full
//! structure at `debug`. The file is opened once and closed on drop.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ServerError;

/// Protocol log sink shared by the iterations of one dispatch loop.
#[derive(Debug)]
pub struct ProtocolLog {
    sink: Option<Sink>,
}

#[derive(Debug)]
struct Sink {
    path: PathBuf,
    file: File,
}

impl ProtocolLog {
    /// Opens (creating if needed) the log file at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Log`] if the directory or file cannot be
    /// created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let path = path.into();
        let log_error = |source| ServerError::Log {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(log_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(log_error)?;

        Ok(Self {
            sink: Some(Sink { path, file }),
        })
    }

    /// A log that only mirrors events to `tracing`.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { sink: None }
    }

    /// Path of the log file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|s| s.path.as_path())
    }

    /// Records one event.
    ///
    /// Write failures are reported through `tracing` and do not interrupt
    /// the caller.
    pub fn record<T: Serialize>(&mut self, summary: &str, body: &T) {
        let pretty = serde_json::to_string_pretty(body)
            .unwrap_or_else(|e| format!("<unserialisable: {e}>"));

        info!("{summary}");
        debug!("{summary}\n{pretty}");

        if let Some(sink) = &mut self.sink {
            let timestamp = Local::now().to_rfc3339();
            if let Err(e) = writeln!(sink.file, "{timestamp} {summary}\n{pretty}") {
                warn!(path = %sink.path.display(), error = %e, "Failed to write protocol log");
            }
        }
    }
}
