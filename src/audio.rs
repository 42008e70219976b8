//! Audio output shared by the alarm loop and speech playback.
//!
//! rodio's `OutputStream` must stay on the thread that opened it, so a
//! dedicated thread owns the stream and hands out its mixer. The stream is
//! opened on first acquire and closed when the last holder releases it.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};

use rodio::mixer::Mixer;
use rodio::{Decoder, OutputStreamBuilder, Sink, Source};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("failed to open sound file {path}: {source}")]
    SoundFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode audio: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputClient {
    Alarm,
    Speech,
    Sleep,
}

#[derive(Default)]
struct DeviceInner {
    mixer: Option<Mixer>,
    close_tx: Option<std_mpsc::Sender<()>>,
    holders: HashSet<OutputClient>,
}

#[derive(Default)]
pub struct OutputDevice {
    inner: Mutex<DeviceInner>,
}

impl OutputDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the output for `client`, opening the default device if needed.
    /// Acquiring twice for the same client is a no-op.
    pub fn acquire(&self, client: OutputClient) -> Result<Mixer, AudioError> {
        let mut inner = self.inner.lock().unwrap();
        let mixer = match &inner.mixer {
            Some(mixer) => mixer.clone(),
            None => {
                let (mixer, close_tx) = open_stream()?;
                inner.mixer = Some(mixer.clone());
                inner.close_tx = Some(close_tx);
                info!("Audio output opened");
                mixer
            }
        };
        if inner.holders.insert(client) {
            debug!("Audio output acquired by {client:?}");
        }
        Ok(mixer)
    }

    pub fn release(&self, client: OutputClient) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.holders.remove(&client) {
            return;
        }
        debug!("Audio output released by {client:?}");

        if inner.holders.is_empty() {
            inner.mixer = None;
            if let Some(close_tx) = inner.close_tx.take() {
                let _ = close_tx.send(());
            }
            info!("Audio output closed");
        }
    }
}

fn open_stream() -> Result<(Mixer, std_mpsc::Sender<()>), AudioError> {
    let (ready_tx, ready_rx) = std_mpsc::channel::<Result<Mixer, String>>();
    let (close_tx, close_rx) = std_mpsc::channel::<()>();

    std::thread::Builder::new()
        .name("audio-output".into())
        .spawn(move || match OutputStreamBuilder::open_default_stream() {
            Ok(mut stream) => {
                stream.log_on_drop(false);
                let _ = ready_tx.send(Ok(stream.mixer().clone()));
                // Hold the stream until released (or every sender is gone).
                let _ = close_rx.recv();
                drop(stream);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e.to_string()));
            }
        })
        .map_err(|e| AudioError::Output(format!("failed to spawn output thread: {e}")))?;

    let mixer = ready_rx
        .recv()
        .map_err(|_| AudioError::Output("output thread exited".into()))?
        .map_err(AudioError::Output)?;
    Ok((mixer, close_tx))
}

/// The alarm sound as seen by the session binding.
pub trait AlarmSound: Send + Sync {
    /// Start looping. Starting while already playing is a no-op.
    ///
    /// Returns once playback is queued, so callers see `is_playing()` right away.
    fn start(&self) -> Result<(), AudioError>;
    /// Stop and release the output. Stopping while stopped is a no-op.
    fn stop(&self);
    fn is_playing(&self) -> bool;
}

/// Loops a sound file forever on the shared output.
pub struct LoopingAlarm {
    device: Arc<OutputDevice>,
    sound_path: PathBuf,
    sink: Mutex<Option<Sink>>,
}

impl LoopingAlarm {
    pub fn new(device: Arc<OutputDevice>, sound_path: PathBuf) -> Self {
        Self {
            device,
            sound_path,
            sink: Mutex::new(None),
        }
    }

}

/// Open and decode a sound file without touching the output.
pub fn decode_file(path: &Path) -> Result<Decoder<BufReader<File>>, AudioError> {
    let file = File::open(path).map_err(|source| AudioError::SoundFile {
        path: path.to_path_buf(),
        source,
    })?;
    Decoder::new(BufReader::new(file)).map_err(|e| AudioError::Decode(e.to_string()))
}

impl AlarmSound for LoopingAlarm {
    fn start(&self) -> Result<(), AudioError> {
        let mut slot = self.sink.lock().unwrap();
        if slot.is_some() {
            return Ok(());
        }

        // Decode first so a missing file does not claim the output.
        let source = decode_file(&self.sound_path)?;
        let mixer = self.device.acquire(OutputClient::Alarm)?;

        let sink = Sink::connect_new(&mixer);
        sink.append(source.repeat_infinite());
        *slot = Some(sink);

        info!("Alarm started ({})", self.sound_path.display());
        Ok(())
    }

    fn stop(&self) {
        let Some(sink) = self.sink.lock().unwrap().take() else {
            return;
        };
        sink.stop();
        self.device.release(OutputClient::Alarm);
        info!("Alarm stopped");
    }

    fn is_playing(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }
}
