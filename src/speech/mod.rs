//! Speech delivery: segmentation, voice choice, preferences and playback.
//!
//! Components:
//! - `segment`: split text into short units that end in "。"
//! - `voice`: pick the best installed voice for the briefing locale
//! - `preferences`: persisted voice, rate, pitch and volume
//! - `speaker`: sequential, cancellable playback of segmented text
//! - `espeak`: espeak-ng renderer played through the shared rodio output

pub mod espeak;
pub mod preferences;
pub mod segment;
pub mod speaker;
pub mod voice;

use thiserror::Error;

use crate::audio::AudioError;
use voice::VoiceInfo;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech engine failed: {0}")]
    Engine(String),
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Parameters for one spoken unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Selected voice; `None` means the engine default for `locale`.
    pub voice: Option<String>,
    pub locale: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// A speech engine that can render and play one unit at a time.
pub trait SpeechSynthesizer: Send + Sync + 'static {
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Claim the spoken-audio output. Called before each speak request;
    /// must be idempotent.
    fn activate_output(&self) -> Result<(), SpeechError> {
        Ok(())
    }

    fn deactivate_output(&self) {}

    /// Render and play `text`, blocking until playback ends or `stop` is called.
    fn speak_unit(&self, text: &str, utterance: &Utterance) -> Result<(), SpeechError>;

    /// Stop the unit currently playing, if any.
    fn stop(&self);
}
