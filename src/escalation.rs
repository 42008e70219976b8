//! Escalating alarm series.
//!
//! One alarm is easy to sleep through, so the wake ritual registers a burst
//! of five alerts forty seconds apart (about a three minute window). The slot
//! identifiers never change, which lets a second `schedule_series` replace
//! the first through the alert center's replace-by-id behavior.

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use tracing::{info, warn};

use crate::alerts::{AlertCenter, AlertRequest, AlertSound, WAKE_PAYLOAD_TAG};

pub const SERIES_LEN: usize = 5;
pub const SERIES_SPACING_SECS: i64 = 40;
pub const TEST_ALERT_ID: &str = "alarm_test";

const ALARM_TITLE: &str = "起床时间到了";
const ALARM_BODY: &str = "点击进入完成起床确认";

/// Identifier of escalation slot `i`.
pub fn slot_id(i: usize) -> String {
    format!("alarm_{i}")
}

/// Identifiers of every alert the ritual may have registered.
pub fn series_ids() -> Vec<String> {
    let mut ids: Vec<String> = (0..SERIES_LEN).map(slot_id).collect();
    ids.push(TEST_ALERT_ID.to_string());
    ids
}

/// Fire times of the series anchored at `anchor`.
pub fn series_fire_times(anchor: DateTime<Local>) -> Vec<DateTime<Local>> {
    (0..SERIES_LEN)
        .map(|i| anchor + Duration::seconds(i as i64 * SERIES_SPACING_SECS))
        .collect()
}

/// Next local occurrence of `time` strictly after `now`.
pub fn next_occurrence(time: NaiveTime, now: DateTime<Local>) -> DateTime<Local> {
    let mut date = now.date_naive();
    loop {
        // A local time that does not exist on a DST-change day is skipped.
        if let Some(candidate) = Local.from_local_datetime(&date.and_time(time)).earliest() {
            if candidate > now {
                return candidate;
            }
        }
        date = date.succ_opt().unwrap_or(date);
    }
}

pub struct EscalationScheduler {
    center: Arc<dyn AlertCenter>,
}

impl EscalationScheduler {
    pub fn new(center: Arc<dyn AlertCenter>) -> Self {
        Self { center }
    }

    /// Register the five-alert series starting at `anchor`.
    ///
    /// Returns how many slots were registered; a failed slot only means one
    /// fewer retry.
    pub fn schedule_series(&self, anchor: DateTime<Local>) -> usize {
        let mut registered = 0;
        for (i, fire_at) in series_fire_times(anchor).into_iter().enumerate() {
            let request = AlertRequest {
                id: slot_id(i),
                fire_at,
                title: ALARM_TITLE.to_string(),
                body: ALARM_BODY.to_string(),
                sound: AlertSound::WakeRitual,
                payload_tag: WAKE_PAYLOAD_TAG.to_string(),
            };
            match self.center.add(request) {
                Ok(()) => registered += 1,
                Err(e) => warn!("Failed to schedule escalation slot {i}: {e}"),
            }
        }

        info!(
            "Escalation series armed: {registered}/{SERIES_LEN} alerts from {}",
            anchor.format("%Y-%m-%d %H:%M:%S")
        );
        registered
    }

    /// Register a single wake-ritual alert after `delay`, for manual testing.
    pub fn schedule_test(&self, delay: std::time::Duration) -> bool {
        let fire_at = Local::now() + Duration::from_std(delay).unwrap_or_else(|_| Duration::zero());
        let request = AlertRequest {
            id: TEST_ALERT_ID.to_string(),
            fire_at,
            title: "Test Alarm".to_string(),
            body: "This is a test alarm notification.".to_string(),
            sound: AlertSound::WakeRitual,
            payload_tag: WAKE_PAYLOAD_TAG.to_string(),
        };
        match self.center.add(request) {
            Ok(()) => {
                info!("Test alarm armed for {}", fire_at.format("%H:%M:%S"));
                true
            }
            Err(e) => {
                warn!("Failed to schedule test alarm: {e}");
                false
            }
        }
    }

    /// Retract the whole series: pending alerts and ones already sitting in
    /// the notification tray.
    pub fn cancel_series(&self) {
        let ids = series_ids();
        self.center.remove_pending(&ids);
        self.center.remove_delivered(&ids);
        info!("Escalation series cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertError, DeliveredAlert};
    use std::sync::Mutex;

    /// In-memory alert center with replace-by-id semantics.
    #[derive(Default)]
    struct MemoryCenter {
        pending: Mutex<Vec<AlertRequest>>,
        delivered: Mutex<Vec<DeliveredAlert>>,
        fail_ids: Vec<String>,
    }

    impl MemoryCenter {
        fn deliver_all(&self) {
            let fired: Vec<AlertRequest> = self.pending.lock().unwrap().drain(..).collect();
            let mut delivered = self.delivered.lock().unwrap();
            for r in fired {
                delivered.push(DeliveredAlert {
                    id: r.id,
                    payload_tag: r.payload_tag,
                    title: r.title,
                    delivered_at: r.fire_at,
                });
            }
        }
    }

    impl AlertCenter for MemoryCenter {
        fn add(&self, request: AlertRequest) -> Result<(), AlertError> {
            if self.fail_ids.contains(&request.id) {
                return Err(AlertError::NoRuntime(request.id));
            }
            let mut pending = self.pending.lock().unwrap();
            pending.retain(|p| p.id != request.id);
            pending.push(request);
            Ok(())
        }
        fn remove_pending(&self, ids: &[String]) {
            self.pending.lock().unwrap().retain(|p| !ids.contains(&p.id));
        }
        fn remove_delivered(&self, ids: &[String]) {
            self.delivered.lock().unwrap().retain(|d| !ids.contains(&d.id));
        }
        fn pending_ids(&self) -> Vec<String> {
            self.pending.lock().unwrap().iter().map(|p| p.id.clone()).collect()
        }
        fn delivered(&self) -> Vec<DeliveredAlert> {
            self.delivered.lock().unwrap().clone()
        }
    }

    fn anchor() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 2, 19, 7, 0, 0).unwrap()
    }

    #[test]
    fn series_is_five_alerts_forty_seconds_apart() {
        let center = Arc::new(MemoryCenter::default());
        let scheduler = EscalationScheduler::new(center.clone());
        assert_eq!(scheduler.schedule_series(anchor()), 5);

        let pending = center.pending.lock().unwrap();
        let ids: Vec<&str> = pending.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["alarm_0", "alarm_1", "alarm_2", "alarm_3", "alarm_4"]);
        for (i, p) in pending.iter().enumerate() {
            assert_eq!(p.fire_at, anchor() + Duration::seconds(40 * i as i64));
            assert_eq!(p.payload_tag, "wakeflow");
            assert_eq!(p.sound, AlertSound::WakeRitual);
        }
    }

    #[test]
    fn rescheduling_replaces_the_slots() {
        let center = Arc::new(MemoryCenter::default());
        let scheduler = EscalationScheduler::new(center.clone());
        scheduler.schedule_series(anchor());
        scheduler.schedule_series(anchor() + Duration::hours(24));

        let pending = center.pending.lock().unwrap();
        assert_eq!(pending.len(), 5);
        assert!(pending.iter().all(|p| p.fire_at >= anchor() + Duration::hours(24)));
    }

    #[test]
    fn cancel_clears_pending_and_delivered() {
        let center = Arc::new(MemoryCenter::default());
        let scheduler = EscalationScheduler::new(center.clone());
        scheduler.schedule_series(anchor());
        center.deliver_all();
        scheduler.schedule_series(anchor() + Duration::minutes(10));
        scheduler.schedule_test(std::time::Duration::from_secs(10));

        scheduler.cancel_series();
        assert!(center.pending_ids().is_empty());
        assert!(center.delivered().is_empty());
    }

    #[test]
    fn failed_slot_degrades_to_fewer_retries() {
        let center = Arc::new(MemoryCenter {
            fail_ids: vec!["alarm_2".into()],
            ..Default::default()
        });
        let scheduler = EscalationScheduler::new(center.clone());
        assert_eq!(scheduler.schedule_series(anchor()), 4);
        assert_eq!(center.pending_ids().len(), 4);
    }

    #[test]
    fn next_occurrence_rolls_to_tomorrow_once_passed() {
        let seven = NaiveTime::from_hms_opt(7, 0, 0).unwrap();
        let before = Local.with_ymd_and_hms(2026, 2, 19, 6, 30, 0).unwrap();
        let after = Local.with_ymd_and_hms(2026, 2, 19, 7, 0, 0).unwrap();

        assert_eq!(next_occurrence(seven, before), anchor());
        assert_eq!(next_occurrence(seven, after), anchor() + Duration::days(1));
    }
}
