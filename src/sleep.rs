//! Bedtime track: play, pause and stop a single non-looping track on the
//! shared output. Stopping rewinds; the next play starts from the beginning.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rodio::Sink;
use serde::Serialize;
use tracing::{debug, info};

use crate::audio::{decode_file, AudioError, OutputClient, OutputDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

pub trait SleepSound: Send + Sync {
    /// Resume a paused track, or start it from the beginning.
    fn play(&self) -> Result<(), AudioError>;
    fn pause(&self);
    fn stop(&self);
    fn state(&self) -> PlaybackState;
}

pub struct SleepPlayer {
    device: Arc<OutputDevice>,
    track_path: PathBuf,
    sink: Mutex<Option<Sink>>,
}

impl SleepPlayer {
    pub fn new(device: Arc<OutputDevice>, track_path: PathBuf) -> Self {
        Self {
            device,
            track_path,
            sink: Mutex::new(None),
        }
    }
}

impl SleepSound for SleepPlayer {
    fn play(&self) -> Result<(), AudioError> {
        let mut slot = self.sink.lock().unwrap();
        if let Some(sink) = slot.as_ref() {
            if !sink.empty() {
                sink.play();
                debug!("Sleep track resumed");
                return Ok(());
            }
        }

        let source = decode_file(&self.track_path)?;
        if let Some(finished) = slot.take() {
            finished.stop();
            self.device.release(OutputClient::Sleep);
        }
        let mixer = self.device.acquire(OutputClient::Sleep)?;
        let sink = Sink::connect_new(&mixer);
        sink.append(source);
        *slot = Some(sink);

        info!("Sleep track started ({})", self.track_path.display());
        Ok(())
    }

    fn pause(&self) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.pause();
            debug!("Sleep track paused");
        }
    }

    fn stop(&self) {
        let Some(sink) = self.sink.lock().unwrap().take() else {
            return;
        };
        sink.stop();
        self.device.release(OutputClient::Sleep);
        info!("Sleep track stopped");
    }

    fn state(&self) -> PlaybackState {
        match self.sink.lock().unwrap().as_ref() {
            None => PlaybackState::Stopped,
            Some(sink) if sink.empty() => PlaybackState::Stopped,
            Some(sink) if sink.is_paused() => PlaybackState::Paused,
            Some(_) => PlaybackState::Playing,
        }
    }
}
