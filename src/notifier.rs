//! Desktop notifications via notify-rust (D-Bus).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use notify_rust::{Notification, Timeout};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::alerts::{AlertEvent, AlertEventKind, AlertRequest, AlertSound};

/// Freedesktop sound theme name used for wake-ritual alerts.
const WAKE_SOUND_NAME: &str = "alarm-clock-elapsed";
const DEFAULT_ACTION: &str = "default";

pub struct Notifier {
    enabled: bool,
    /// Alert id → server notification id, for notifications still on screen.
    shown: Arc<Mutex<HashMap<String, u32>>>,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            shown: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Show a delivered alert. Invoking the notification's default action is
    /// reported back as [`AlertEventKind::ActedOn`] unless the alert has been
    /// retracted in the meantime.
    pub fn present(&self, request: &AlertRequest, events: UnboundedSender<AlertEvent>) {
        if !self.enabled {
            return;
        }

        debug!("Notification: {} ({})", request.title, request.id);

        let mut notification = Notification::new();
        notification
            .appname("wakeflow")
            .summary(&request.title)
            .body(&request.body)
            .icon("alarm-clock")
            .action(DEFAULT_ACTION, "起床确认")
            .timeout(Timeout::Never);
        if request.sound == AlertSound::WakeRitual {
            notification.sound_name(WAKE_SOUND_NAME);
        }
        // A re-delivered id replaces its earlier notification in place.
        if let Some(&previous) = self.shown.lock().unwrap().get(&request.id) {
            notification.id(previous);
        }

        let handle = match notification.show() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to show notification: {e}");
                return;
            }
        };
        self.shown
            .lock()
            .unwrap()
            .insert(request.id.clone(), handle.id());

        let id = request.id.clone();
        let payload_tag = request.payload_tag.clone();
        let shown = self.shown.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("notify-{id}"))
            .spawn(move || {
                handle.wait_for_action(|action| {
                    if action != DEFAULT_ACTION {
                        return;
                    }
                    if !shown.lock().unwrap().contains_key(&id) {
                        debug!("Ignoring action on retracted notification {id}");
                        return;
                    }
                    let _ = events.send(AlertEvent {
                        kind: AlertEventKind::ActedOn,
                        id: id.clone(),
                        payload_tag: payload_tag.clone(),
                    });
                });
            });
        if let Err(e) = spawned {
            warn!("Failed to watch notification actions: {e}");
        }
    }

    /// Take the notifications for `ids` off the screen. Later clicks on them
    /// are not reported.
    pub fn retract(&self, ids: &[String]) {
        let retracted: Vec<(String, u32)> = {
            let mut shown = self.shown.lock().unwrap();
            ids.iter()
                .filter_map(|id| shown.remove(id).map(|n| (id.clone(), n)))
                .collect()
        };

        for (id, notification_id) in retracted {
            // Replacing the notification with one that expires at once closes
            // it and ends the action watcher.
            let closed = Notification::new()
                .appname("wakeflow")
                .summary("")
                .id(notification_id)
                .timeout(Timeout::Milliseconds(1))
                .show();
            match closed {
                Ok(_) => debug!("Notification for {id} retracted"),
                Err(e) => warn!("Failed to retract notification for {id}: {e}"),
            }
        }
    }

    pub fn is_shown(&self, id: &str) -> bool {
        self.shown.lock().unwrap().contains_key(id)
    }
}
