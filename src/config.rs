//! Configuration management for wakeflow-rs.
//!
//! Loads config from YAML files in standard locations. Every section falls
//! back to defaults, so an empty or missing file is a valid configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Daily wake time, local `HH:MM`.
    pub time: String,
    /// Arm the next series at startup and after every completed ritual.
    pub auto_arm: bool,
    pub sound_path: String,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            time: "07:00".into(),
            auto_arm: true,
            sound_path: String::new(),
        }
    }
}

impl AlarmConfig {
    pub fn sound_path(&self) -> PathBuf {
        if self.sound_path.is_empty() {
            config_dir().join("alarm.mp3")
        } else {
            PathBuf::from(&self.sound_path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BriefingConfig {
    pub user_name: String,
    pub max_todo_spoken: usize,
    pub todo_fetch_limit: usize,
    pub include_closing: bool,
    pub todos_path: String,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self {
            user_name: "朋友".into(),
            max_todo_spoken: 5,
            todo_fetch_limit: 7,
            include_closing: true,
            todos_path: String::new(),
        }
    }
}

impl BriefingConfig {
    pub fn todos_path(&self) -> PathBuf {
        if self.todos_path.is_empty() {
            data_dir().join("todos.json")
        } else {
            PathBuf::from(&self.todos_path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// `none`, `fixed` or `wttr`.
    pub provider: String,
    pub fixed_text: String,
    pub location: String,
    pub host: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider: "none".into(),
            fixed_text: String::new(),
            location: String::new(),
            host: "https://wttr.in".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// Language code the briefing voice must speak (espeak-ng naming).
    pub locale: String,
    pub espeak_binary: String,
    pub preferences_path: String,
    /// Identifier fragment marking a curated voice tier; taken before scoring.
    pub curated_hint: String,
    /// Identifier fragment of the preferred voice vendor.
    pub vendor_hint: String,
    pub speak_delay_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            locale: "cmn".into(),
            espeak_binary: "espeak-ng".into(),
            preferences_path: String::new(),
            curated_hint: "premium".into(),
            vendor_hint: "mb-".into(),
            speak_delay_ms: 250,
        }
    }
}

impl SpeechConfig {
    pub fn preferences_path(&self) -> PathBuf {
        if self.preferences_path.is_empty() {
            config_dir().join("speech.json")
        } else {
            PathBuf::from(&self.preferences_path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub notifications: bool,
    pub log_path: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            notifications: true,
            log_path: String::new(),
        }
    }
}

impl AlertsConfig {
    pub fn log_path(&self) -> PathBuf {
        if self.log_path.is_empty() {
            data_dir().join("alerts.json")
        } else {
            PathBuf::from(&self.log_path)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Bedtime track, played once (not looped).
    pub track_path: String,
}

impl SleepConfig {
    pub fn track_path(&self) -> PathBuf {
        if self.track_path.is_empty() {
            config_dir().join("sleep.mp3")
        } else {
            PathBuf::from(&self.track_path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8768,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Treat daemon start as the app becoming active (runs reconciliation).
    pub start_active: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { start_active: true }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub alarm: AlarmConfig,
    pub briefing: BriefingConfig,
    pub weather: WeatherConfig,
    pub speech: SpeechConfig,
    pub alerts: AlertsConfig,
    pub sleep: SleepConfig,
    pub api: ApiConfig,
    pub lifecycle: LifecycleConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/wakeflow/config.yaml
    /// 3. /etc/wakeflow/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/wakeflow/config.yaml")),
                Some(PathBuf::from("/etc/wakeflow/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wakeflow")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wakeflow")
}
