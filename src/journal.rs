//! Sleep journal.
//!
//! One editable entry per day at ~/.wakeflow-history/{date}-sleep.json.
//! Saving the same day again replaces the text and keeps the creation time.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub date: NaiveDate,
    pub content: String,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to write journal {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize journal entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SleepJournal {
    dir: PathBuf,
}

impl Default for SleepJournal {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".wakeflow-history"))
    }
}

impl SleepJournal {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn file(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}-sleep.json", date.format("%Y-%m-%d")))
    }

    pub fn get(&self, date: NaiveDate) -> Option<JournalEntry> {
        let path = self.file(date);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to parse journal {}: {e}", path.display());
                None
            }
        }
    }

    /// Create or replace the entry for `date`. Surrounding whitespace is trimmed.
    pub fn save(&self, date: NaiveDate, content: &str) -> Result<JournalEntry, JournalError> {
        let now = Local::now();
        let entry = JournalEntry {
            date,
            content: content.trim().to_string(),
            created_at: self.get(date).map_or(now, |e| e.created_at),
            updated_at: now,
        };

        let path = self.file(date);
        let json = serde_json::to_string_pretty(&entry)?;
        fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(&path, json))
            .map_err(|source| JournalError::Write {
                path: path.clone(),
                source,
            })?;

        info!("Sleep journal saved for {date} ({} chars)", entry.content.chars().count());
        Ok(entry)
    }
}
