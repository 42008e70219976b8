//! Sequential speech playback with cancellation.
//!
//! Pipeline:
//! 1. Claim the spoken-audio output (best-effort)
//! 2. Text → units (`segment`)
//! 3. Pick a voice from the engine catalog and the user's preference
//! 4. Units → engine, strictly one after another

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::preferences::PreferenceStore;
use super::segment::segment;
use super::voice::{VoiceInfo, VoiceSelector};
use super::{SpeechSynthesizer, Utterance};

/// Result of a speak operation.
#[derive(Debug, Clone, Serialize)]
pub struct SpeakResult {
    pub units: usize,
    pub spoken: usize,
    pub cancelled: bool,
    pub voice: Option<String>,
    pub elapsed_ms: f64,
}

pub struct Speaker {
    synth: Arc<dyn SpeechSynthesizer>,
    preferences: Arc<PreferenceStore>,
    selector: VoiceSelector,

    cancel_flag: Arc<AtomicBool>,
    speaking: Arc<AtomicBool>,
    speak_lock: AsyncMutex<()>,
}

impl Speaker {
    pub fn new(
        synth: Arc<dyn SpeechSynthesizer>,
        preferences: Arc<PreferenceStore>,
        selector: VoiceSelector,
    ) -> Self {
        Self {
            synth,
            preferences,
            selector,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            speaking: Arc::new(AtomicBool::new(false)),
            speak_lock: AsyncMutex::new(()),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    pub async fn voices(&self) -> Vec<VoiceInfo> {
        let synth = self.synth.clone();
        tokio::task::spawn_blocking(move || synth.voices())
            .await
            .unwrap_or_default()
    }

    /// Catalog dump for the briefing locale.
    pub async fn describe_voices(&self) -> String {
        self.selector.dump(&self.voices().await)
    }

    /// Speak `text`, cutting off anything already being spoken.
    pub async fn speak(&self, text: &str) -> SpeakResult {
        if self.is_speaking() {
            info!("Already speaking, interrupting");
            self.interrupt();
        }

        let _guard = self.speak_lock.lock().await;
        self.cancel_flag.store(false, Ordering::Relaxed);
        self.speaking.store(true, Ordering::Relaxed);

        let result = self.speak_inner(text).await;

        self.speaking.store(false, Ordering::Relaxed);
        self.synth.deactivate_output();
        result
    }

    async fn speak_inner(&self, text: &str) -> SpeakResult {
        let t0 = Instant::now();
        let units = segment(text);
        if units.is_empty() {
            return SpeakResult {
                units: 0,
                spoken: 0,
                cancelled: false,
                voice: None,
                elapsed_ms: 0.0,
            };
        }

        if let Err(e) = self.synth.activate_output() {
            warn!("Spoken audio output unavailable, continuing with default routing: {e}");
        }

        let prefs = self.preferences.get();
        let catalog = self.voices().await;
        let voice = self
            .selector
            .best_voice(prefs.preferred_voice.as_deref(), &catalog);
        if voice.is_none() {
            info!("No {} voice found, using engine default", self.selector.locale());
        }

        let utterance = Utterance {
            voice: voice.clone(),
            locale: self.selector.locale().to_string(),
            rate: prefs.rate,
            pitch: prefs.pitch,
            volume: prefs.volume,
        };

        let mut spoken = 0;
        let mut cancelled = false;
        for (i, unit) in units.iter().enumerate() {
            if self.cancel_flag.load(Ordering::Relaxed) {
                cancelled = true;
                info!("Cancelled before unit {}/{}", i + 1, units.len());
                break;
            }

            let synth = self.synth.clone();
            let text = unit.clone();
            let utt = utterance.clone();
            match tokio::task::spawn_blocking(move || synth.speak_unit(&text, &utt)).await {
                Ok(Ok(())) => {
                    spoken += 1;
                    debug!("Unit {}/{}: {unit}", i + 1, units.len());
                }
                Ok(Err(e)) => warn!("Speech failed for unit {}: {e}", i + 1),
                Err(e) => warn!("Speech task for unit {} panicked: {e}", i + 1),
            }

            if self.cancel_flag.load(Ordering::Relaxed) {
                cancelled = true;
                info!("Cancelled during unit {}/{}", i + 1, units.len());
                break;
            }
        }

        SpeakResult {
            units: units.len(),
            spoken,
            cancelled,
            voice,
            elapsed_ms: t0.elapsed().as_secs_f64() * 1000.0,
        }
    }

    /// Stop current speech immediately and skip its remaining units.
    pub fn interrupt(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        self.synth.stop();
        self.speaking.store(false, Ordering::Relaxed);
        info!("Speech interrupted");
    }
}
