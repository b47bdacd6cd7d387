use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::PilotResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: i64,
    pub role: String,
    pub turn: u32,
    pub content: Option<String>,
    pub artifact: Option<String>,
}

impl JournalEntry {
    pub fn new(role: &str, turn: u32, content: impl Into<String>) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            role: role.into(),
            turn,
            content: Some(content.into()),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, location: Option<String>) -> Self {
        self.artifact = location;
        self
    }
}

/// Per-task JSONL record of planning decisions and outcomes.
pub struct TaskJournal {
    pub task_id: String,
    entries: Vec<JournalEntry>,
    file_path: Option<PathBuf>,
}

impl TaskJournal {
    /// Journal written to `<dir>/task_<id>.jsonl`.
    pub fn in_dir(dir: &Path) -> Self {
        let task_id = uuid::Uuid::new_v4().to_string();
        let file_path = dir.join(format!("task_{task_id}.jsonl"));
        Self {
            task_id,
            entries: Vec::new(),
            file_path: Some(file_path),
        }
    }

    /// Journal kept in memory only.
    pub fn in_memory() -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            entries: Vec::new(),
            file_path: None,
        }
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Record an entry; write failures are logged, never propagated.
    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
        if let Err(e) = self.flush() {
            tracing::warn!(task = %self.task_id, error = %e, "journal flush failed");
        }
    }

    /// Append the latest entry to the JSONL file.
    fn flush(&self) -> PilotResult<()> {
        let (Some(path), Some(last)) = (&self.file_path, self.entries.last()) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(last)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        tracing::debug!(path = %path.display(), "journal entry flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_append_as_jsonl() {
        let dir = std::env::temp_dir().join(format!("framepilot-journal-{}", uuid::Uuid::new_v4()));
        let mut journal = TaskJournal::in_dir(&dir);
        journal.record(JournalEntry::new("goal", 0, "open the terminal"));
        journal.record(JournalEntry::new("planner", 0, "complete").with_artifact(Some("a.png".into())));

        let text = std::fs::read_to_string(journal.path().unwrap()).unwrap();
        let lines: Vec<JournalEntry> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].role, "planner");
        assert_eq!(lines[1].artifact.as_deref(), Some("a.png"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn in_memory_journal_keeps_entries() {
        let mut journal = TaskJournal::in_memory();
        journal.record(JournalEntry::new("planner", 1, "click OK"));
        assert_eq!(journal.entries().len(), 1);
        assert!(journal.path().is_none());
    }
}
