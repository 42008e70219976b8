//! Local timed alerts: the alert delivery system the wake ritual schedules into.
//!
//! Each pending request gets its own tokio timer. Registering an identifier
//! that is already pending replaces the earlier request. Fired alerts move to
//! the delivered log, are shown as desktop notifications, and are reported on
//! the event channel. Pending and delivered entries are written to a JSON log
//! so a restarted daemon can still see what fired while it was gone.
//!
//! Timers re-read the wall clock in bounded steps. Tokio's clock does not
//! advance while the machine is suspended, so a single long sleep would fire
//! late by the length of the suspend.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::notifier::Notifier;

/// Payload tag carried by every alert that belongs to the wake ritual.
pub const WAKE_PAYLOAD_TAG: &str = "wakeflow";

/// Longest single sleep between wall-clock checks in an alert timer.
const WALL_CLOCK_RECHECK: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSound {
    Default,
    WakeRitual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub id: String,
    pub fire_at: DateTime<Local>,
    pub title: String,
    pub body: String,
    pub sound: AlertSound,
    pub payload_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredAlert {
    pub id: String,
    pub payload_tag: String,
    pub title: String,
    pub delivered_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEventKind {
    /// The alert fired.
    Delivered,
    /// The user invoked the alert (clicked the notification or acknowledged it).
    ActedOn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub kind: AlertEventKind,
    pub id: String,
    pub payload_tag: String,
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert request has an empty identifier")]
    EmptyIdentifier,
    #[error("no async runtime available to arm alert `{0}`")]
    NoRuntime(String),
}

/// The alert delivery system as seen by the scheduler and the router.
pub trait AlertCenter: Send + Sync {
    /// Register a request. An existing pending request with the same id is replaced.
    fn add(&self, request: AlertRequest) -> Result<(), AlertError>;
    fn remove_pending(&self, ids: &[String]);
    fn remove_delivered(&self, ids: &[String]);
    fn pending_ids(&self) -> Vec<String>;
    /// Delivered alerts that have not been removed yet, oldest first.
    fn delivered(&self) -> Vec<DeliveredAlert>;
    /// Deliver every pending request whose fire time has already passed.
    fn deliver_overdue(&self) {}
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AlertLog {
    #[serde(default)]
    pending: Vec<AlertRequest>,
    #[serde(default)]
    delivered: Vec<DeliveredAlert>,
}

impl AlertLog {
    fn record_delivery(&mut self, request: &AlertRequest, at: DateTime<Local>) {
        self.delivered.retain(|d| d.id != request.id);
        self.delivered.push(DeliveredAlert {
            id: request.id.clone(),
            payload_tag: request.payload_tag.clone(),
            title: request.title.clone(),
            delivered_at: at,
        });
    }
}

struct Shared {
    log: Mutex<AlertLog>,
    notifier: Notifier,
    events: UnboundedSender<AlertEvent>,
    log_path: Option<PathBuf>,
}

impl Shared {
    fn deliver(&self, request: &AlertRequest) {
        {
            let mut log = self.log.lock().unwrap();
            // A replaced or cancelled request must not fire.
            let Some(pos) = log.pending.iter().position(|p| p == request) else {
                debug!("Alert {} no longer pending, not delivering", request.id);
                return;
            };
            log.pending.remove(pos);
            log.record_delivery(request, Local::now());
            self.save(&log);
        }

        info!("Alert delivered: {} [{}]", request.id, request.payload_tag);
        self.notifier.present(request, self.events.clone());

        let _ = self.events.send(AlertEvent {
            kind: AlertEventKind::Delivered,
            id: request.id.clone(),
            payload_tag: request.payload_tag.clone(),
        });
    }

    fn save(&self, log: &AlertLog) {
        let Some(path) = &self.log_path else {
            return;
        };

        if let Some(dir) = path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!("Failed to create alert log dir: {e}");
                return;
            }
        }

        match serde_json::to_string_pretty(log) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("Failed to write alert log {}: {e}", path.display());
                }
            }
            Err(e) => warn!("Failed to serialize alert log: {e}"),
        }
    }
}

pub struct LocalAlertCenter {
    shared: Arc<Shared>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl LocalAlertCenter {
    /// Open the alert center, restoring the alert log from `log_path` if present.
    ///
    /// Pending alerts whose fire time passed while nothing was running are
    /// treated as delivered; the rest are re-armed. Must be called from
    /// within a tokio runtime.
    pub fn open(
        log_path: Option<PathBuf>,
        notifier: Notifier,
        events: UnboundedSender<AlertEvent>,
    ) -> Self {
        let restored = log_path.as_deref().map(load_log).unwrap_or_default();

        let now = Local::now();
        let mut log = AlertLog {
            pending: Vec::new(),
            delivered: restored.delivered,
        };
        let mut rearm = Vec::new();
        for request in restored.pending {
            if request.fire_at <= now {
                info!("Alert {} fired while offline, marking delivered", request.id);
                log.record_delivery(&request, request.fire_at);
            } else {
                rearm.push(request);
            }
        }
        log.pending = rearm.clone();

        let center = Self {
            shared: Arc::new(Shared {
                log: Mutex::new(log),
                notifier,
                events,
                log_path,
            }),
            timers: Mutex::new(HashMap::new()),
        };

        {
            let log = center.shared.log.lock().unwrap();
            center.shared.save(&log);
        }
        for request in rearm {
            if let Err(e) = center.arm(request) {
                warn!("Failed to re-arm alert: {e}");
            }
        }

        center
    }

    fn arm(&self, request: AlertRequest) -> Result<(), AlertError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AlertError::NoRuntime(request.id.clone()))?;

        debug!(
            "Arming alert {} in {:.0}s",
            request.id,
            until(request.fire_at).as_secs_f64()
        );

        let id = request.id.clone();
        let shared = self.shared.clone();
        let handle = runtime.spawn(async move {
            loop {
                let remaining = until(request.fire_at);
                if remaining.is_zero() {
                    break;
                }
                tokio::time::sleep(remaining.min(WALL_CLOCK_RECHECK)).await;
            }
            shared.deliver(&request);
        });

        if let Some(previous) = self.timers.lock().unwrap().insert(id, handle) {
            previous.abort();
        }
        Ok(())
    }
}

impl AlertCenter for LocalAlertCenter {
    fn add(&self, request: AlertRequest) -> Result<(), AlertError> {
        if request.id.trim().is_empty() {
            return Err(AlertError::EmptyIdentifier);
        }

        {
            let mut log = self.shared.log.lock().unwrap();
            log.pending.retain(|p| p.id != request.id);
            log.pending.push(request.clone());
            self.shared.save(&log);
        }

        let id = request.id.clone();
        if let Err(e) = self.arm(request) {
            let mut log = self.shared.log.lock().unwrap();
            log.pending.retain(|p| p.id != id);
            self.shared.save(&log);
            return Err(e);
        }
        Ok(())
    }

    fn remove_pending(&self, ids: &[String]) {
        {
            let mut timers = self.timers.lock().unwrap();
            for id in ids {
                if let Some(handle) = timers.remove(id) {
                    handle.abort();
                }
            }
        }

        {
            let mut log = self.shared.log.lock().unwrap();
            log.pending.retain(|p| !ids.contains(&p.id));
            self.shared.save(&log);
        }
        self.shared.notifier.retract(ids);
    }

    fn remove_delivered(&self, ids: &[String]) {
        {
            let mut log = self.shared.log.lock().unwrap();
            log.delivered.retain(|d| !ids.contains(&d.id));
            self.shared.save(&log);
        }
        self.shared.notifier.retract(ids);
    }

    fn pending_ids(&self) -> Vec<String> {
        let log = self.shared.log.lock().unwrap();
        log.pending.iter().map(|p| p.id.clone()).collect()
    }

    fn delivered(&self) -> Vec<DeliveredAlert> {
        self.shared.log.lock().unwrap().delivered.clone()
    }

    fn deliver_overdue(&self) {
        let now = Local::now();
        let overdue: Vec<AlertRequest> = {
            let log = self.shared.log.lock().unwrap();
            log.pending
                .iter()
                .filter(|p| p.fire_at <= now)
                .cloned()
                .collect()
        };

        for request in overdue {
            info!("Alert {} overdue, delivering now", request.id);
            if let Some(handle) = self.timers.lock().unwrap().remove(&request.id) {
                handle.abort();
            }
            self.shared.deliver(&request);
        }
    }
}

/// Wall-clock time left until `at`, zero once it has passed.
fn until(at: DateTime<Local>) -> Duration {
    (at - Local::now()).to_std().unwrap_or(Duration::ZERO)
}

fn load_log(path: &std::path::Path) -> AlertLog {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return AlertLog::default(),
    };

    match serde_json::from_str(&contents) {
        Ok(log) => log,
        Err(e) => {
            warn!("Failed to parse alert log {}: {e}, starting empty", path.display());
            AlertLog::default()
        }
    }
}
