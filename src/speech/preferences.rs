//! Persisted voice preferences: preferred voice plus rate, pitch and volume.

use std::fs;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const RATE_RANGE: RangeInclusive<f32> = 0.40..=0.55;
pub const PITCH_RANGE: RangeInclusive<f32> = 0.85..=1.15;
pub const VOLUME_RANGE: RangeInclusive<f32> = 0.60..=1.00;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicePreferences {
    pub preferred_voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self {
            preferred_voice: None,
            rate: 0.48,
            pitch: 1.0,
            volume: 0.90,
        }
    }
}

impl VoicePreferences {
    /// Pull every scalar back into its valid range.
    pub fn clamped(mut self) -> Self {
        self.rate = clamp(self.rate, &RATE_RANGE);
        self.pitch = clamp(self.pitch, &PITCH_RANGE);
        self.volume = clamp(self.volume, &VOLUME_RANGE);
        self.preferred_voice = self.preferred_voice.filter(|v| !v.trim().is_empty());
        self
    }
}

fn clamp(value: f32, range: &RangeInclusive<f32>) -> f32 {
    if value.is_nan() {
        return *range.start();
    }
    value.clamp(*range.start(), *range.end())
}

/// A partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferenceUpdate {
    /// `Some("")` clears the preferred voice.
    pub voice: Option<String>,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
}

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("failed to write preferences: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode preferences: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct PreferenceStore {
    path: Option<PathBuf>,
    current: Mutex<VoicePreferences>,
}

impl PreferenceStore {
    /// Load from `path`; a missing or unreadable file yields defaults.
    pub fn load(path: Option<PathBuf>) -> Self {
        let current = path
            .as_deref()
            .and_then(|p| match fs::read_to_string(p) {
                Ok(contents) => match serde_json::from_str::<VoicePreferences>(&contents) {
                    Ok(prefs) => {
                        info!("Loaded voice preferences from {}", p.display());
                        Some(prefs)
                    }
                    Err(e) => {
                        warn!("Failed to parse {}: {e}, using defaults", p.display());
                        None
                    }
                },
                Err(_) => None,
            })
            .unwrap_or_default()
            .clamped();

        Self {
            path,
            current: Mutex::new(current),
        }
    }

    pub fn get(&self) -> VoicePreferences {
        self.current.lock().unwrap().clone()
    }

    /// Apply an update, clamp it, and persist. The in-memory value changes
    /// even when the write fails.
    pub fn update(&self, update: PreferenceUpdate) -> Result<VoicePreferences, PreferenceError> {
        let updated = {
            let mut current = self.current.lock().unwrap();
            let mut next = current.clone();
            if let Some(voice) = update.voice {
                next.preferred_voice = Some(voice);
            }
            if let Some(rate) = update.rate {
                next.rate = rate;
            }
            if let Some(pitch) = update.pitch {
                next.pitch = pitch;
            }
            if let Some(volume) = update.volume {
                next.volume = volume;
            }
            *current = next.clamped();
            current.clone()
        };

        self.save(&updated)?;
        Ok(updated)
    }

    fn save(&self, prefs: &VoicePreferences) -> Result<(), PreferenceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(prefs)?)?;
        Ok(())
    }
}
