//! Alarm session state machine.
//!
//! IDLE → RINGING → WAKE_FLOW_ACTIVE → COMPLETED → IDLE
//!
//! Transitions are unconditional: every call sets its target state no matter
//! where the session currently is. Observers are notified synchronously, in
//! call order, before the transition method returns.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Ringing,
    WakeFlowActive,
    Completed,
}

impl SessionState {
    /// The state that follows this one in the daily cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::Ringing,
            Self::Ringing => Self::WakeFlowActive,
            Self::WakeFlowActive => Self::Completed,
            Self::Completed => Self::Idle,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Ringing => write!(f, "RINGING"),
            Self::WakeFlowActive => write!(f, "WAKE_FLOW_ACTIVE"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

impl Transition {
    /// True when `to` directly follows `from` in the cycle.
    pub fn is_adjacent(&self) -> bool {
        self.from.next() == self.to
    }
}

pub trait SessionObserver: Send + Sync {
    fn on_transition(&self, transition: Transition);
}

pub struct AlarmSession {
    state: SessionState,
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl Default for AlarmSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Register an observer for the lifetime of the session.
    pub fn subscribe(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn notification_triggered(&mut self) {
        self.transition(SessionState::Ringing);
    }

    pub fn entered_wake_flow(&mut self) {
        self.transition(SessionState::WakeFlowActive);
    }

    pub fn completed_wake_flow(&mut self) {
        self.transition(SessionState::Completed);
    }

    pub fn reset(&mut self) {
        self.transition(SessionState::Idle);
    }

    fn transition(&mut self, to: SessionState) {
        let transition = Transition {
            from: self.state,
            to,
        };
        self.state = to;
        info!("Session: {} → {}", transition.from, transition.to);

        for observer in &self.observers {
            observer.on_transition(transition);
        }
    }
}

/// Flags transitions that skip or repeat a step of the cycle.
///
/// Anomalies are counted and logged, never rejected: the ritual must keep
/// moving even when a lifecycle race drops an intermediate step.
#[derive(Default)]
pub struct TransitionMonitor {
    anomalies: AtomicU32,
}

impl TransitionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anomaly_count(&self) -> u32 {
        self.anomalies.load(Ordering::Relaxed)
    }
}

impl SessionObserver for TransitionMonitor {
    fn on_transition(&self, transition: Transition) {
        if !transition.is_adjacent() {
            let n = self.anomalies.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Non-adjacent session transition #{n}: {} → {}",
                transition.from, transition.to
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Transition>>,
    }

    impl SessionObserver for Recorder {
        fn on_transition(&self, transition: Transition) {
            self.seen.lock().unwrap().push(transition);
        }
    }

    fn session_with_recorders(n: usize) -> (AlarmSession, Vec<Arc<Recorder>>) {
        let mut session = AlarmSession::new();
        let recorders: Vec<Arc<Recorder>> = (0..n).map(|_| Arc::new(Recorder::default())).collect();
        for r in &recorders {
            session.subscribe(r.clone());
        }
        (session, recorders)
    }

    #[test]
    fn starts_idle() {
        assert_eq!(AlarmSession::new().state(), SessionState::Idle);
    }

    #[test]
    fn natural_call_order_walks_the_cycle_twice() {
        let (mut session, recorders) = session_with_recorders(1);
        for _ in 0..2 {
            session.notification_triggered();
            session.entered_wake_flow();
            session.completed_wake_flow();
            session.reset();
        }

        let seen = recorders[0].seen.lock().unwrap();
        let states: Vec<SessionState> = seen.iter().map(|t| t.to).collect();
        let mut expected = Vec::new();
        let mut s = SessionState::Idle;
        for _ in 0..8 {
            s = s.next();
            expected.push(s);
        }
        assert_eq!(states, expected);
        assert!(seen.iter().all(Transition::is_adjacent));
    }

    #[test]
    fn every_subscriber_sees_every_transition_before_return() {
        let (mut session, recorders) = session_with_recorders(3);

        session.notification_triggered();
        for r in &recorders {
            assert_eq!(r.seen.lock().unwrap().len(), 1);
        }

        session.entered_wake_flow();
        for r in &recorders {
            let seen = r.seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!(
                seen[1],
                Transition {
                    from: SessionState::Ringing,
                    to: SessionState::WakeFlowActive
                }
            );
        }
    }

    #[test]
    fn out_of_order_calls_are_accepted_and_flagged() {
        let mut session = AlarmSession::new();
        let monitor = Arc::new(TransitionMonitor::new());
        session.subscribe(monitor.clone());

        session.completed_wake_flow();
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(monitor.anomaly_count(), 1);

        // Completed → Idle is the legal closing edge.
        session.reset();
        assert_eq!(monitor.anomaly_count(), 1);

        // Repeating a state is not adjacent either.
        session.reset();
        assert_eq!(monitor.anomaly_count(), 2);
    }

    #[test]
    fn repeated_trigger_is_broadcast_not_coalesced() {
        let (mut session, recorders) = session_with_recorders(1);
        session.notification_triggered();
        session.notification_triggered();
        assert_eq!(recorders[0].seen.lock().unwrap().len(), 2);
    }
}
