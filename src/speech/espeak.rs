//! espeak-ng speech engine.
//!
//! Each unit is rendered to WAV with `espeak-ng --stdout` (text on stdin),
//! then played through the shared rodio output with the utterance volume.
//! Playback polls for completion or a stop request, like any other sink.

use std::io::{Cursor, Write};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::{Decoder, Sink};
use tracing::{debug, warn};

use super::voice::VoiceInfo;
use super::{SpeechError, SpeechSynthesizer, Utterance};
use crate::audio::{AudioError, OutputClient, OutputDevice};

pub struct EspeakSynthesizer {
    binary: String,
    locale: String,
    device: Arc<OutputDevice>,
    stop_flag: Arc<AtomicBool>,
    active_sink: Arc<Mutex<Option<Sink>>>,
}

impl EspeakSynthesizer {
    pub fn new(binary: &str, locale: &str, device: Arc<OutputDevice>) -> Self {
        Self {
            binary: binary.to_string(),
            locale: locale.to_string(),
            device,
            stop_flag: Arc::new(AtomicBool::new(false)),
            active_sink: Arc::new(Mutex::new(None)),
        }
    }

    fn render(&self, text: &str, utterance: &Utterance) -> Result<Vec<u8>, SpeechError> {
        let voice = utterance.voice.as_deref().unwrap_or(&utterance.locale);
        let speed = words_per_minute(utterance.rate).to_string();
        let pitch = espeak_pitch(utterance.pitch).to_string();
        let mut child = Command::new(&self.binary)
            .args(["--stdout", "-b", "1", "-v", voice, "-s", speed.as_str(), "-p", pitch.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SpeechError::Engine(format!("failed to spawn {}: {e}", self.binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| SpeechError::Engine(format!("failed to write text: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SpeechError::Engine(format!("{} failed: {e}", self.binary)))?;
        if !output.status.success() {
            return Err(SpeechError::Engine(format!(
                "{} exited with {}",
                self.binary, output.status
            )));
        }
        if output.stdout.is_empty() {
            return Err(SpeechError::Engine("engine produced no audio".into()));
        }
        Ok(output.stdout)
    }

    fn play(&self, wav: Vec<u8>, volume: f32) -> Result<(), SpeechError> {
        let mixer = self.device.acquire(OutputClient::Speech)?;
        let source = Decoder::new(Cursor::new(wav)).map_err(|e| AudioError::Decode(e.to_string()))?;

        let sink = Sink::connect_new(&mixer);
        sink.set_volume(volume);
        sink.append(source);
        *self.active_sink.lock().unwrap() = Some(sink);

        loop {
            let is_empty = match self.active_sink.lock().unwrap().as_ref() {
                Some(s) => s.empty(),
                None => true,
            };
            if is_empty {
                break;
            }

            if self.stop_flag.load(Ordering::Relaxed) {
                if let Some(sink) = self.active_sink.lock().unwrap().take() {
                    sink.stop();
                }
                break;
            }

            std::thread::sleep(Duration::from_millis(50));
        }

        *self.active_sink.lock().unwrap() = None;
        Ok(())
    }
}

impl SpeechSynthesizer for EspeakSynthesizer {
    fn voices(&self) -> Vec<VoiceInfo> {
        let output = match Command::new(&self.binary)
            .arg(format!("--voices={}", self.locale))
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                warn!("Failed to list {} voices: {e}", self.binary);
                return Vec::new();
            }
        };
        parse_voice_list(&String::from_utf8_lossy(&output.stdout))
    }

    fn activate_output(&self) -> Result<(), SpeechError> {
        self.device.acquire(OutputClient::Speech)?;
        Ok(())
    }

    fn deactivate_output(&self) {
        self.device.release(OutputClient::Speech);
    }

    fn speak_unit(&self, text: &str, utterance: &Utterance) -> Result<(), SpeechError> {
        self.stop_flag.store(false, Ordering::Relaxed);

        let wav = self.render(text, utterance)?;
        if self.stop_flag.load(Ordering::Relaxed) {
            debug!("Stopped before playback: {text}");
            return Ok(());
        }
        self.play(wav, utterance.volume)
    }

    fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(sink) = self.active_sink.lock().unwrap().take() {
            sink.stop();
        }
    }
}

/// Map a 0.0–1.0 speaking rate (0.5 = normal) onto espeak words per minute.
pub fn words_per_minute(rate: f32) -> u32 {
    (80.0 + rate.clamp(0.0, 1.0) * 190.0).round() as u32
}

/// Map a pitch multiplier (1.0 = normal) onto espeak's 0–99 pitch scale.
pub fn espeak_pitch(pitch: f32) -> u32 {
    (pitch * 50.0).round().clamp(0.0, 99.0) as u32
}

/// Parse `espeak-ng --voices` output.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  cmn             M  Chinese_(Mandarin)  sit/cmn              (zh-cmn 5)(zh 5)
/// ```
pub fn parse_voice_list(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return None;
            }
            Some(VoiceInfo {
                identifier: fields[4].to_string(),
                name: fields[3].to_string(),
                language: fields[1].to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_voice_listing() {
        let listing = "Pty Language       Age/Gender VoiceName          File                 Other Languages\n \
                       5  cmn             M  Chinese_(Mandarin)  sit/cmn              (zh-cmn 5)(zh 5)\n \
                       5  cmn             M  mbrola-cn1          mb/mb-cn1\n\
                       \n";
        let voices = parse_voice_list(listing);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].identifier, "sit/cmn");
        assert_eq!(voices[0].name, "Chinese_(Mandarin)");
        assert_eq!(voices[0].language, "cmn");
        assert_eq!(voices[1].identifier, "mb/mb-cn1");
    }

    #[test]
    fn rate_and_pitch_mapping() {
        assert_eq!(words_per_minute(0.5), 175);
        assert_eq!(words_per_minute(0.48), 171);
        assert_eq!(words_per_minute(7.0), 270);
        assert_eq!(espeak_pitch(1.0), 50);
        assert_eq!(espeak_pitch(1.1), 55);
        assert_eq!(espeak_pitch(3.0), 99);
    }
}
