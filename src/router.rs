//! Alert routing and wake-flow navigation.
//!
//! The router decides what an alert signal means for the session; the
//! navigator tracks which screen is current and presents the wake flow only
//! while the app is in the foreground.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alerts::{AlertEvent, AlertEventKind, DeliveredAlert, WAKE_PAYLOAD_TAG};
use crate::session::{AlarmSession, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Active,
    Inactive,
    Background,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Background => write!(f, "background"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Home,
    WakeFlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Start ringing and open the wake flow.
    Triggered,
    /// Session already ringing or in the wake flow: open it, nothing else.
    Duplicate,
    /// Not a wake-ritual alert.
    Ignored,
    /// Fired while not in the foreground; picked up by reconciliation.
    Deferred,
}

pub struct AlertRouter;

impl AlertRouter {
    pub fn classify(
        event: &AlertEvent,
        session: SessionState,
        lifecycle: LifecyclePhase,
    ) -> RouteOutcome {
        if event.payload_tag != WAKE_PAYLOAD_TAG {
            debug!("Ignoring alert {} with tag '{}'", event.id, event.payload_tag);
            return RouteOutcome::Ignored;
        }
        if event.kind == AlertEventKind::Delivered && lifecycle != LifecyclePhase::Active {
            return RouteOutcome::Deferred;
        }
        Self::by_state(session)
    }

    /// Outcome of a relaunch/foreground pass over the delivered log.
    /// `None` when no wake-ritual alert is waiting.
    pub fn reconcile(delivered: &[DeliveredAlert], session: SessionState) -> Option<RouteOutcome> {
        let waiting = delivered
            .iter()
            .filter(|d| d.payload_tag == WAKE_PAYLOAD_TAG)
            .count();
        if waiting == 0 {
            return None;
        }
        info!("Reconciling {waiting} delivered wake alert(s) in state {session}");
        Some(Self::by_state(session))
    }

    fn by_state(session: SessionState) -> RouteOutcome {
        match session {
            SessionState::Ringing | SessionState::WakeFlowActive => RouteOutcome::Duplicate,
            SessionState::Idle | SessionState::Completed => RouteOutcome::Triggered,
        }
    }
}

pub struct Navigator {
    route: Route,
    presented: bool,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self {
            route: Route::Home,
            presented: false,
        }
    }

    pub fn route(&self) -> Route {
        self.route
    }

    /// True when the wake flow is on screen and can take the confirmation gesture.
    pub fn is_presenting_wake_flow(&self) -> bool {
        self.route == Route::WakeFlow && self.presented
    }

    /// Make the wake flow the current route and present it if possible.
    pub fn open_wake_flow(&mut self, session: &mut AlarmSession, lifecycle: LifecyclePhase) {
        if self.route != Route::WakeFlow {
            self.route = Route::WakeFlow;
            self.presented = false;
        }
        self.present_if_active(session, lifecycle);
    }

    /// Present a not-yet-shown wake flow. Each presentation enters the flow once.
    pub fn present_if_active(&mut self, session: &mut AlarmSession, lifecycle: LifecyclePhase) {
        if self.route != Route::WakeFlow || self.presented {
            return;
        }
        if lifecycle != LifecyclePhase::Active {
            debug!("Wake flow queued until the app is active");
            return;
        }
        self.presented = true;
        session.entered_wake_flow();
    }

    pub fn go_home(&mut self) {
        self.route = Route::Home;
        self.presented = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn event(kind: AlertEventKind, tag: &str) -> AlertEvent {
        AlertEvent {
            kind,
            id: "alarm_0".into(),
            payload_tag: tag.into(),
        }
    }

    fn delivered(tag: &str) -> DeliveredAlert {
        DeliveredAlert {
            id: "alarm_0".into(),
            payload_tag: tag.into(),
            title: "起床时间到了".into(),
            delivered_at: Local::now(),
        }
    }

    #[test]
    fn foreign_alerts_are_ignored() {
        let outcome = AlertRouter::classify(
            &event(AlertEventKind::ActedOn, "calendar"),
            SessionState::Idle,
            LifecyclePhase::Active,
        );
        assert_eq!(outcome, RouteOutcome::Ignored);
    }

    #[test]
    fn background_delivery_is_deferred_but_a_tap_is_not() {
        let delivered = event(AlertEventKind::Delivered, WAKE_PAYLOAD_TAG);
        let tapped = event(AlertEventKind::ActedOn, WAKE_PAYLOAD_TAG);
        assert_eq!(
            AlertRouter::classify(&delivered, SessionState::Idle, LifecyclePhase::Background),
            RouteOutcome::Deferred
        );
        assert_eq!(
            AlertRouter::classify(&tapped, SessionState::Idle, LifecyclePhase::Background),
            RouteOutcome::Triggered
        );
    }

    #[test]
    fn second_signal_while_ringing_is_a_duplicate() {
        let tapped = event(AlertEventKind::ActedOn, WAKE_PAYLOAD_TAG);
        for state in [SessionState::Ringing, SessionState::WakeFlowActive] {
            assert_eq!(
                AlertRouter::classify(&tapped, state, LifecyclePhase::Active),
                RouteOutcome::Duplicate
            );
        }
    }

    #[test]
    fn reconcile_only_counts_wake_alerts() {
        assert_eq!(AlertRouter::reconcile(&[delivered("other")], SessionState::Idle), None);
        assert_eq!(
            AlertRouter::reconcile(&[delivered("other"), delivered(WAKE_PAYLOAD_TAG)], SessionState::Idle),
            Some(RouteOutcome::Triggered)
        );
        assert_eq!(
            AlertRouter::reconcile(&[delivered(WAKE_PAYLOAD_TAG)], SessionState::WakeFlowActive),
            Some(RouteOutcome::Duplicate)
        );
    }

    #[test]
    fn wake_flow_is_presented_once_and_only_in_foreground() {
        let mut session = AlarmSession::new();
        let mut nav = Navigator::new();
        session.notification_triggered();

        nav.open_wake_flow(&mut session, LifecyclePhase::Background);
        assert_eq!(nav.route(), Route::WakeFlow);
        assert!(!nav.is_presenting_wake_flow());
        assert_eq!(session.state(), SessionState::Ringing);

        nav.present_if_active(&mut session, LifecyclePhase::Active);
        assert!(nav.is_presenting_wake_flow());
        assert_eq!(session.state(), SessionState::WakeFlowActive);

        session.completed_wake_flow();
        nav.open_wake_flow(&mut session, LifecyclePhase::Active);
        nav.present_if_active(&mut session, LifecyclePhase::Active);
        assert_eq!(session.state(), SessionState::Completed);

        nav.go_home();
        assert_eq!(nav.route(), Route::Home);
        assert!(!nav.is_presenting_wake_flow());
    }
}
