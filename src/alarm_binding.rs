//! Alarm audio driven purely by session state.
//!
//! Ringing starts the loop; Completed or Idle stops it. Entering the wake
//! flow leaves it ringing: only the confirmation gesture silences the alarm.

use std::sync::Arc;

use tracing::warn;

use crate::audio::AlarmSound;
use crate::session::{SessionObserver, SessionState, Transition};

pub struct AlarmAudioBinding {
    sound: Arc<dyn AlarmSound>,
}

impl AlarmAudioBinding {
    pub fn new(sound: Arc<dyn AlarmSound>) -> Self {
        Self { sound }
    }
}

impl SessionObserver for AlarmAudioBinding {
    // Called on the owner loop. `start` blocks for the file header decode and
    // the output thread handshake (a few ms), which keeps start and stop
    // ordered with the transitions that caused them.
    fn on_transition(&self, transition: Transition) {
        match transition.to {
            SessionState::Ringing => {
                if !self.sound.is_playing() {
                    if let Err(e) = self.sound.start() {
                        warn!("Alarm audio failed to start: {e}");
                    }
                }
            }
            SessionState::Completed | SessionState::Idle => {
                if self.sound.is_playing() {
                    self.sound.stop();
                }
            }
            SessionState::WakeFlowActive => {}
        }
    }
}
