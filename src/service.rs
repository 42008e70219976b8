//! Wake ritual orchestration.
//!
//! IDLE → RINGING → WAKE_FLOW_ACTIVE → COMPLETED → IDLE
//!
//! A single owner loop holds the session, the navigator and the speech gate.
//! Alert callbacks, HTTP handlers, timers and speech completion never touch
//! them directly: they send a `WakeEvent` and the loop applies it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::alarm_binding::AlarmAudioBinding;
use crate::alerts::{AlertCenter, AlertEvent, AlertEventKind, WAKE_PAYLOAD_TAG};
use crate::audio::AlarmSound;
use crate::config::Config;
use crate::escalation::{next_occurrence, series_ids, EscalationScheduler};
use crate::history::{SpeechOutcome, WakeHistory, WakeRecord};
use crate::router::{AlertRouter, LifecyclePhase, Navigator, Route, RouteOutcome};
use crate::session::{AlarmSession, SessionState, TransitionMonitor};
use crate::sources::BriefingSources;
use crate::speech::speaker::{SpeakResult, Speaker};

const TEST_ALARM_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_ALARM_TIME: (u32, u32) = (7, 0);

/// Answer to a control command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub accepted: bool,
    pub detail: String,
}

impl CommandOutcome {
    fn accepted(detail: impl Into<String>) -> Self {
        Self {
            accepted: true,
            detail: detail.into(),
        }
    }

    fn rejected(detail: impl Into<String>) -> Self {
        Self {
            accepted: false,
            detail: detail.into(),
        }
    }
}

pub type Reply = Option<oneshot::Sender<CommandOutcome>>;

#[derive(Debug)]
pub enum WakeEvent {
    Alert(AlertEvent),
    Lifecycle(LifecyclePhase),
    /// The confirmation gesture on the wake flow.
    ConfirmAwake(Reply),
    /// Arm the series at the given anchor, or at the next configured alarm time.
    ScheduleAlarm(Option<DateTime<Local>>, Reply),
    CancelAlarm(Reply),
    TestAlarm(Reply),
    /// The user acted on a delivered alert.
    AckAlert(String, Reply),
    Reset(Reply),
    Speak(String),
    CancelSpeech,
    BriefingReady { cycle: u64, text: String },
    SpeechDue { cycle: u64 },
    SpeechFinished { cycle: u64, result: SpeakResult },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub session: SessionState,
    pub lifecycle: LifecyclePhase,
    pub route: Route,
    pub alarm_playing: bool,
    pub speaking: bool,
    pub speech_pending: bool,
    pub pending_alerts: Vec<String>,
    pub next_alarm: Option<DateTime<Local>>,
    pub anomalies: u32,
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub alarm_time: NaiveTime,
    pub auto_arm: bool,
    pub speak_delay: Duration,
    pub start_active: bool,
}

impl ServiceOptions {
    pub fn from_config(config: &Config, background: bool) -> Self {
        let alarm_time = parse_alarm_time(&config.alarm.time).unwrap_or_else(|| {
            warn!("Invalid alarm time '{}', using 07:00", config.alarm.time);
            default_alarm_time()
        });
        Self {
            alarm_time,
            auto_arm: config.alarm.auto_arm,
            speak_delay: Duration::from_millis(config.speech.speak_delay_ms),
            start_active: config.lifecycle.start_active && !background,
        }
    }
}

/// Parse a local `HH:MM` alarm time.
pub fn parse_alarm_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M").ok()
}

fn default_alarm_time() -> NaiveTime {
    NaiveTime::from_hms_opt(DEFAULT_ALARM_TIME.0, DEFAULT_ALARM_TIME.1, 0).unwrap_or(NaiveTime::MIN)
}

/// Collaborators the service drives.
pub struct WakeParts {
    pub center: Arc<dyn AlertCenter>,
    pub alert_events: mpsc::UnboundedReceiver<AlertEvent>,
    pub sound: Arc<dyn AlarmSound>,
    /// `None` when speech is disabled; briefings are then recorded as skipped.
    pub speaker: Option<Arc<Speaker>>,
    pub briefing: Arc<BriefingSources>,
    pub history: WakeHistory,
}

/// Cloneable entry point for everything outside the owner loop.
#[derive(Clone)]
pub struct WakeHandle {
    events: mpsc::UnboundedSender<WakeEvent>,
    status: watch::Receiver<StatusSnapshot>,
}

impl WakeHandle {
    pub fn send(&self, event: WakeEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Send a command and wait for the owner loop's answer.
    pub async fn request(&self, make: impl FnOnce(Reply) -> WakeEvent) -> Option<CommandOutcome> {
        let (tx, rx) = oneshot::channel();
        if !self.send(make(Some(tx))) {
            return None;
        }
        rx.await.ok()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }
}

#[derive(Default)]
struct SpeechGate {
    pending: Option<String>,
    in_flight: bool,
}

#[derive(Default)]
struct Cycle {
    id: u64,
    rang_at: Option<DateTime<Local>>,
    confirmed_at: Option<DateTime<Local>>,
    briefing: Option<String>,
}

pub struct WakeService {
    options: ServiceOptions,
    session: AlarmSession,
    monitor: Arc<TransitionMonitor>,
    sound: Arc<dyn AlarmSound>,
    center: Arc<dyn AlertCenter>,
    scheduler: EscalationScheduler,
    navigator: Navigator,
    lifecycle: LifecyclePhase,
    speaker: Option<Arc<Speaker>>,
    briefing: Arc<BriefingSources>,
    history: WakeHistory,
    gate: SpeechGate,
    cycle: Cycle,
    next_alarm: Option<DateTime<Local>>,

    events_tx: mpsc::UnboundedSender<WakeEvent>,
    events_rx: mpsc::UnboundedReceiver<WakeEvent>,
    alert_rx: mpsc::UnboundedReceiver<AlertEvent>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl WakeService {
    pub fn new(parts: WakeParts, options: ServiceOptions) -> (Self, WakeHandle) {
        let monitor = Arc::new(TransitionMonitor::new());
        let mut session = AlarmSession::new();
        session.subscribe(monitor.clone());
        session.subscribe(Arc::new(AlarmAudioBinding::new(parts.sound.clone())));

        let lifecycle = if options.start_active {
            LifecyclePhase::Active
        } else {
            LifecyclePhase::Background
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StatusSnapshot {
            session: session.state(),
            lifecycle,
            route: Route::Home,
            alarm_playing: false,
            speaking: false,
            speech_pending: false,
            pending_alerts: parts.center.pending_ids(),
            next_alarm: None,
            anomalies: 0,
        });

        let service = Self {
            options,
            session,
            monitor,
            sound: parts.sound,
            scheduler: EscalationScheduler::new(parts.center.clone()),
            center: parts.center,
            navigator: Navigator::new(),
            lifecycle,
            speaker: parts.speaker,
            briefing: parts.briefing,
            history: parts.history,
            gate: SpeechGate::default(),
            cycle: Cycle::default(),
            next_alarm: None,
            events_tx: events_tx.clone(),
            events_rx,
            alert_rx: parts.alert_events,
            status_tx,
        };
        let handle = WakeHandle {
            events: events_tx,
            status: status_rx,
        };
        (service, handle)
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            session: self.session.state(),
            lifecycle: self.lifecycle,
            route: self.navigator.route(),
            alarm_playing: self.sound.is_playing(),
            speaking: self.speaker.as_ref().is_some_and(|s| s.is_speaking()),
            speech_pending: self.gate.pending.is_some() || self.gate.in_flight,
            pending_alerts: self.center.pending_ids(),
            next_alarm: self.next_alarm,
            anomalies: self.monitor.anomaly_count(),
        }
    }

    /// Startup work: arm the daily series unless one is already pending, and
    /// reconcile when starting in the foreground.
    pub fn start(&mut self) {
        let has_pending = self
            .center
            .pending_ids()
            .iter()
            .any(|id| series_ids().contains(id));
        if self.options.auto_arm && !has_pending {
            self.arm_next();
        }
        if self.lifecycle == LifecyclePhase::Active {
            self.on_activate();
        }
        self.publish();
    }

    pub async fn run(mut self) {
        self.start();
        info!("Wake service ready (lifecycle: {})", self.lifecycle);

        while self.step().await {}
        warn!("Event channels closed, wake service stopping");
    }

    /// Wait for the next event and apply it. Returns false once every
    /// event source is gone.
    pub async fn step(&mut self) -> bool {
        let event = tokio::select! {
            Some(alert) = self.alert_rx.recv() => WakeEvent::Alert(alert),
            Some(event) = self.events_rx.recv() => event,
            else => return false,
        };
        self.dispatch(event);
        true
    }

    pub fn dispatch(&mut self, event: WakeEvent) {
        debug!("Event: {event:?}");
        match event {
            WakeEvent::Alert(alert) => self.on_alert(alert),
            WakeEvent::Lifecycle(phase) => self.set_lifecycle(phase),
            WakeEvent::ConfirmAwake(reply) => self.confirm(reply),
            WakeEvent::ScheduleAlarm(at, reply) => {
                let anchor =
                    at.unwrap_or_else(|| next_occurrence(self.options.alarm_time, Local::now()));
                let outcome = if self.schedule(anchor) > 0 {
                    CommandOutcome::accepted(anchor.to_rfc3339())
                } else {
                    CommandOutcome::rejected("no alert could be scheduled")
                };
                respond(reply, outcome);
            }
            WakeEvent::CancelAlarm(reply) => {
                self.scheduler.cancel_series();
                self.next_alarm = None;
                respond(reply, CommandOutcome::accepted("cancelled"));
            }
            WakeEvent::TestAlarm(reply) => {
                let outcome = if self.scheduler.schedule_test(TEST_ALARM_DELAY) {
                    CommandOutcome::accepted(format!("test alarm in {}s", TEST_ALARM_DELAY.as_secs()))
                } else {
                    CommandOutcome::rejected("test alarm could not be scheduled")
                };
                respond(reply, outcome);
            }
            WakeEvent::AckAlert(id, reply) => self.ack_alert(id, reply),
            WakeEvent::Reset(reply) => {
                self.reset();
                respond(reply, CommandOutcome::accepted("idle"));
            }
            WakeEvent::Speak(text) => self.speak_now(text),
            WakeEvent::CancelSpeech => {
                if let Some(speaker) = &self.speaker {
                    speaker.interrupt();
                }
            }
            WakeEvent::BriefingReady { cycle, text } => self.on_briefing(cycle, text),
            WakeEvent::SpeechDue { cycle } => self.on_speech_due(cycle),
            WakeEvent::SpeechFinished { cycle, result } => self.on_speech_finished(cycle, result),
        }
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.snapshot());
    }

    // --- Alerts and lifecycle ---

    fn on_alert(&mut self, alert: AlertEvent) {
        // Signals for alerts already retracted (a cancelled series, a closed
        // cycle, a reset) belong to no cycle.
        if alert.payload_tag == WAKE_PAYLOAD_TAG
            && !self.center.delivered().iter().any(|d| d.id == alert.id)
        {
            debug!("Dropping {:?} for retracted alert {}", alert.kind, alert.id);
            return;
        }

        // Acting on a wake alert brings the app to the foreground.
        if alert.kind == AlertEventKind::ActedOn
            && alert.payload_tag == WAKE_PAYLOAD_TAG
            && self.lifecycle != LifecyclePhase::Active
        {
            self.set_lifecycle(LifecyclePhase::Active);
        }

        let outcome = AlertRouter::classify(&alert, self.session.state(), self.lifecycle);
        debug!("Alert {} ({:?}) → {outcome:?}", alert.id, alert.kind);
        self.apply(outcome);
    }

    fn apply(&mut self, outcome: RouteOutcome) {
        match outcome {
            RouteOutcome::Triggered => {
                self.session.notification_triggered();
                self.cycle.rang_at = Some(Local::now());
                self.navigator
                    .open_wake_flow(&mut self.session, self.lifecycle);
            }
            RouteOutcome::Duplicate => {
                self.navigator
                    .open_wake_flow(&mut self.session, self.lifecycle);
            }
            RouteOutcome::Ignored | RouteOutcome::Deferred => {}
        }
    }

    fn set_lifecycle(&mut self, phase: LifecyclePhase) {
        if phase != self.lifecycle {
            info!("Lifecycle: {} → {phase}", self.lifecycle);
        }
        self.lifecycle = phase;
        if phase == LifecyclePhase::Active {
            self.on_activate();
        }
    }

    fn on_activate(&mut self) {
        self.center.deliver_overdue();
        if let Some(outcome) = AlertRouter::reconcile(&self.center.delivered(), self.session.state()) {
            self.apply(outcome);
        }
        self.navigator
            .present_if_active(&mut self.session, self.lifecycle);
        self.try_dispatch_speech();
    }

    fn ack_alert(&mut self, id: String, reply: Reply) {
        let Some(delivered) = self.center.delivered().into_iter().find(|d| d.id == id) else {
            respond(reply, CommandOutcome::rejected(format!("no delivered alert '{id}'")));
            return;
        };
        self.on_alert(AlertEvent {
            kind: AlertEventKind::ActedOn,
            id,
            payload_tag: delivered.payload_tag,
        });
        respond(reply, CommandOutcome::accepted(self.session.state().to_string()));
    }

    // --- Alarm series ---

    fn schedule(&mut self, anchor: DateTime<Local>) -> usize {
        let registered = self.scheduler.schedule_series(anchor);
        if registered > 0 {
            self.next_alarm = Some(anchor);
        }
        registered
    }

    fn arm_next(&mut self) {
        let anchor = next_occurrence(self.options.alarm_time, Local::now());
        self.schedule(anchor);
    }

    // --- Wake confirmation and briefing ---

    fn confirm(&mut self, reply: Reply) {
        if !self.navigator.is_presenting_wake_flow() {
            respond(reply, CommandOutcome::rejected("wake flow is not on screen"));
            return;
        }

        self.session.completed_wake_flow();
        self.scheduler.cancel_series();
        self.next_alarm = None;
        self.navigator.go_home();
        self.cycle.confirmed_at = Some(Local::now());

        let cycle = self.cycle.id;
        let sources = self.briefing.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let text = sources.assemble(Local::now()).await;
            let _ = tx.send(WakeEvent::BriefingReady { cycle, text });
        });

        respond(reply, CommandOutcome::accepted("awake"));
    }

    fn on_briefing(&mut self, cycle: u64, text: String) {
        if cycle != self.cycle.id {
            debug!("Dropping briefing from a closed cycle");
            return;
        }
        self.cycle.briefing = Some(text.clone());

        if self.speaker.is_none() {
            self.close_cycle(SpeechOutcome::Skipped);
            return;
        }
        self.gate.pending = Some(text);
        self.try_dispatch_speech();
    }

    /// Start the speak delay if a briefing is waiting, the app is in the
    /// foreground, and nothing is in flight.
    fn try_dispatch_speech(&mut self) {
        if self.lifecycle != LifecyclePhase::Active
            || self.gate.in_flight
            || self.gate.pending.is_none()
        {
            return;
        }
        self.gate.in_flight = true;

        let cycle = self.cycle.id;
        let delay = self.options.speak_delay;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(WakeEvent::SpeechDue { cycle });
        });
    }

    fn on_speech_due(&mut self, cycle: u64) {
        if cycle != self.cycle.id {
            return;
        }
        let Some(text) = self.gate.pending.take() else {
            self.gate.in_flight = false;
            return;
        };
        // Skipped, not re-queued: a briefing heard an hour later is noise.
        if self.lifecycle != LifecyclePhase::Active {
            info!("App left the foreground before speech started, skipping briefing");
            self.gate.in_flight = false;
            self.close_cycle(SpeechOutcome::Skipped);
            return;
        }
        let Some(speaker) = self.speaker.clone() else {
            self.gate.in_flight = false;
            self.close_cycle(SpeechOutcome::Skipped);
            return;
        };

        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = speaker.speak(&text).await;
            let _ = tx.send(WakeEvent::SpeechFinished { cycle, result });
        });
    }

    fn on_speech_finished(&mut self, cycle: u64, result: SpeakResult) {
        if cycle != self.cycle.id {
            return;
        }
        self.gate.in_flight = false;
        info!(
            "Briefing speech: {}/{} units in {:.0}ms{}",
            result.spoken,
            result.units,
            result.elapsed_ms,
            if result.cancelled { " (cancelled)" } else { "" }
        );
        let outcome = if result.cancelled {
            SpeechOutcome::Cancelled
        } else {
            SpeechOutcome::Spoken
        };
        self.close_cycle(outcome);
    }

    fn close_cycle(&mut self, speech: SpeechOutcome) {
        let record = WakeRecord {
            timestamp: Local::now(),
            rang_at: self.cycle.rang_at,
            confirmed_at: self.cycle.confirmed_at,
            briefing: self.cycle.briefing.take().unwrap_or_default(),
            speech,
            anomalies: self.monitor.anomaly_count(),
        };
        self.history.append(&record);

        self.session.reset();
        self.begin_cycle();
        if self.options.auto_arm {
            self.arm_next();
        }
    }

    fn begin_cycle(&mut self) {
        self.cycle = Cycle {
            id: self.cycle.id + 1,
            ..Cycle::default()
        };
        self.gate = SpeechGate::default();
    }

    fn reset(&mut self) {
        if let Some(speaker) = &self.speaker {
            if speaker.is_speaking() {
                speaker.interrupt();
            }
        }
        self.center.remove_delivered(&series_ids());
        self.navigator.go_home();
        self.session.reset();
        self.begin_cycle();
    }

    fn speak_now(&self, text: String) {
        let Some(speaker) = self.speaker.clone() else {
            warn!("Speech is disabled, ignoring speak request");
            return;
        };
        tokio::spawn(async move {
            let result = speaker.speak(&text).await;
            info!(
                "Spoke {}/{} units{}",
                result.spoken,
                result.units,
                if result.cancelled { " (cancelled)" } else { "" }
            );
        });
    }
}

fn respond(reply: Reply, outcome: CommandOutcome) {
    if let Some(tx) = reply {
        let _ = tx.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_time_parsing() {
        assert_eq!(parse_alarm_time("06:30"), NaiveTime::from_hms_opt(6, 30, 0));
        assert_eq!(parse_alarm_time(" 07:05 "), NaiveTime::from_hms_opt(7, 5, 0));
        assert_eq!(parse_alarm_time("25:00"), None);
        assert_eq!(parse_alarm_time("soon"), None);
    }

    #[test]
    fn options_follow_config_and_background_flag() {
        let mut config = Config::default();
        config.alarm.time = "bogus".into();
        config.speech.speak_delay_ms = 100;

        let options = ServiceOptions::from_config(&config, false);
        assert_eq!(options.alarm_time, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(options.speak_delay, Duration::from_millis(100));
        assert!(options.start_active);
        assert!(!ServiceOptions::from_config(&config, true).start_active);
    }
}
