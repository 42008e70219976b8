//! Wake cycle history.
//!
//! One record per closed cycle, appended to JSONL files at
//! ~/.wakeflow-history/{date}-wake.jsonl.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechOutcome {
    Spoken,
    Cancelled,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeRecord {
    pub timestamp: DateTime<Local>,
    pub rang_at: Option<DateTime<Local>>,
    pub confirmed_at: Option<DateTime<Local>>,
    pub briefing: String,
    pub speech: SpeechOutcome,
    pub anomalies: u32,
}

#[derive(Debug, Clone)]
pub struct WakeHistory {
    dir: PathBuf,
}

impl Default for WakeHistory {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".wakeflow-history"))
    }
}

impl WakeHistory {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn file(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{date}-wake.jsonl"))
    }

    pub fn append(&self, record: &WakeRecord) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!("Failed to create wake history dir: {e}");
            return;
        }

        let date = record.timestamp.format("%Y-%m-%d").to_string();
        let path = self.file(&date);

        let mut file = match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Failed to open wake history file: {e}");
                return;
            }
        };

        match serde_json::to_string(record) {
            Ok(line) => {
                if let Err(e) = writeln!(file, "{line}") {
                    warn!("Failed to write wake history record: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize wake record: {e}"),
        }
    }

    /// Records for `date` (`YYYY-MM-DD`); unreadable lines are skipped.
    pub fn load(&self, date: &str) -> Vec<WakeRecord> {
        let contents = match fs::read_to_string(self.file(date)) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn dates(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };

        let mut dates: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.strip_suffix("-wake.jsonl").map(str::to_string)
            })
            .collect();
        dates.sort();
        dates
    }
}
