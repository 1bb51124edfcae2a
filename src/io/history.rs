//! Score history - appends completed sessions to a JSONL file
//!
//! One `SessionRecord` JSON object per line. Consumes the analysis event
//! channel until every sender is gone.

use crate::io::events::{AnalysisEvent, SessionRecord};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// History writer for completed sessions
pub struct HistoryWriter {
    file_path: String,
}

impl HistoryWriter {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "history_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Append one session record. Returns true on success.
    pub fn write_record(&self, record: &SessionRecord) -> bool {
        match self.append_line(&record.to_json()) {
            Ok(()) => {
                info!(
                    session_id = %record.session_id,
                    overall_score = ?record.overall_score,
                    findings = %record.findings.len(),
                    "session_recorded"
                );
                true
            }
            Err(e) => {
                error!(session_id = %record.session_id, error = %e, "session_record_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "history_written");
        Ok(())
    }

    /// Drain the event channel; returns the number of records written
    pub async fn run(self, mut rx: mpsc::Receiver<AnalysisEvent>) -> usize {
        let mut written = 0;
        while let Some(event) = rx.recv().await {
            match event {
                AnalysisEvent::Completed(record) => {
                    if self.write_record(&record) {
                        written += 1;
                    }
                }
            }
        }
        debug!(written = %written, "history_writer_stopped");
        written
    }
}
