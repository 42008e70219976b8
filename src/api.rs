//! HTTP control API for the wake ritual.
//!
//! Stands in for the app surface: foreground/background lifecycle, the wake
//! confirmation gesture, bedtime controls and debug actions. Runs on 127.0.0.1:8768
//! (configurable) using axum. Anything that changes the ritual is forwarded
//! to the owner loop; read-only routes answer directly.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::escalation::next_occurrence;
use crate::history::{WakeHistory, WakeRecord};
use crate::journal::{JournalEntry, SleepJournal};
use crate::router::LifecyclePhase;
use crate::service::{parse_alarm_time, CommandOutcome, StatusSnapshot, WakeEvent, WakeHandle};
use crate::sleep::{PlaybackState, SleepSound};
use crate::sources::BriefingSources;
use crate::speech::preferences::{PreferenceStore, PreferenceUpdate, VoicePreferences};
use crate::speech::speaker::Speaker;
use crate::speech::voice::VoiceInfo;

#[derive(Clone)]
pub struct ApiState {
    pub wake: WakeHandle,
    pub speaker: Option<Arc<Speaker>>,
    pub preferences: Arc<PreferenceStore>,
    pub briefing: Arc<BriefingSources>,
    pub history: WakeHistory,
    pub sleep: Arc<dyn SleepSound>,
    pub journal: SleepJournal,
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct LifecycleRequest {
    phase: LifecyclePhase,
}

#[derive(Deserialize)]
struct AlarmRequest {
    /// RFC 3339 timestamp or local `HH:MM`.
    #[serde(default)]
    at: Option<String>,
}

#[derive(Deserialize)]
struct AckRequest {
    id: String,
}

#[derive(Deserialize)]
struct SpeakRequest {
    text: String,
}

#[derive(Deserialize)]
struct HistoryQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
struct JournalQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
struct JournalRequest {
    #[serde(default)]
    date: Option<String>,
    content: String,
}

#[derive(Serialize)]
struct SleepResponse {
    state: PlaybackState,
}

#[derive(Serialize)]
struct BriefingResponse {
    text: String,
}

#[derive(Serialize)]
struct VoicesResponse {
    voices: Vec<VoiceInfo>,
    dump: String,
}

#[derive(Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            detail: None,
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            detail: None,
            error: Some(message.into()),
        }
    }

    fn from_outcome(outcome: Option<CommandOutcome>) -> Self {
        match outcome {
            Some(o) if o.accepted => Self {
                detail: Some(o.detail),
                ..Self::ok("ok")
            },
            Some(o) => Self {
                status: "rejected".into(),
                detail: None,
                error: Some(o.detail),
            },
            None => Self::err("wake service unavailable"),
        }
    }
}

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/lifecycle", post(handle_lifecycle))
        .route("/confirm", post(handle_confirm))
        .route("/alarm", post(handle_alarm))
        .route("/alarm/cancel", post(handle_alarm_cancel))
        .route("/alarm/test", post(handle_alarm_test))
        .route("/alerts/ack", post(handle_ack))
        .route("/reset", post(handle_reset))
        .route("/briefing", get(handle_briefing))
        .route("/speak", post(handle_speak))
        .route("/cancel-speech", post(handle_cancel_speech))
        .route("/voices", get(handle_voices))
        .route("/preferences", get(handle_get_preferences).post(handle_set_preferences))
        .route("/history", get(handle_history))
        .route("/history/dates", get(handle_history_dates))
        .route("/sleep", get(handle_sleep_status))
        .route("/sleep/play", post(handle_sleep_play))
        .route("/sleep/pause", post(handle_sleep_pause))
        .route("/sleep/stop", post(handle_sleep_stop))
        .route("/journal", get(handle_get_journal).post(handle_save_journal))
        .with_state(state)
}

/// Start the control API as a background tokio task.
pub async fn start_control_api(state: ApiState, port: u16) {
    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind control API on {addr}: {e}");
            return;
        }
    };
    info!("Control API listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Control API server error: {e}");
        }
    });
}

/// Resolve an alarm anchor: RFC 3339, or the next local occurrence of `HH:MM`.
pub fn parse_anchor(text: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text.trim()) {
        return Some(at.with_timezone(&Local));
    }
    parse_alarm_time(text).map(|time| next_occurrence(time, now))
}

/// Journal day: `YYYY-MM-DD`, or today when absent or blank.
fn parse_journal_date(text: Option<&str>, now: DateTime<Local>) -> Result<NaiveDate, String> {
    match text.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|_| format!("invalid date: {text}")),
        None => Ok(now.date_naive()),
    }
}

// --- Handlers ---

async fn handle_status(State(state): State<ApiState>) -> Json<StatusSnapshot> {
    Json(state.wake.status())
}

async fn handle_lifecycle(
    State(state): State<ApiState>,
    Json(req): Json<LifecycleRequest>,
) -> Json<SimpleResponse> {
    if state.wake.send(WakeEvent::Lifecycle(req.phase)) {
        Json(SimpleResponse::ok(&req.phase.to_string()))
    } else {
        Json(SimpleResponse::err("wake service unavailable"))
    }
}

async fn handle_confirm(State(state): State<ApiState>) -> Json<SimpleResponse> {
    let outcome = state.wake.request(WakeEvent::ConfirmAwake).await;
    Json(SimpleResponse::from_outcome(outcome))
}

async fn handle_alarm(
    State(state): State<ApiState>,
    Json(req): Json<AlarmRequest>,
) -> Json<SimpleResponse> {
    let anchor = match req.at.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => match parse_anchor(text, Local::now()) {
            Some(at) => Some(at),
            None => return Json(SimpleResponse::err(format!("invalid alarm time: {text}"))),
        },
        None => None,
    };

    let outcome = state
        .wake
        .request(|reply| WakeEvent::ScheduleAlarm(anchor, reply))
        .await;
    Json(SimpleResponse::from_outcome(outcome))
}

async fn handle_alarm_cancel(State(state): State<ApiState>) -> Json<SimpleResponse> {
    let outcome = state.wake.request(WakeEvent::CancelAlarm).await;
    Json(SimpleResponse::from_outcome(outcome))
}

async fn handle_alarm_test(State(state): State<ApiState>) -> Json<SimpleResponse> {
    let outcome = state.wake.request(WakeEvent::TestAlarm).await;
    Json(SimpleResponse::from_outcome(outcome))
}

async fn handle_ack(
    State(state): State<ApiState>,
    Json(req): Json<AckRequest>,
) -> Json<SimpleResponse> {
    let outcome = state
        .wake
        .request(|reply| WakeEvent::AckAlert(req.id, reply))
        .await;
    Json(SimpleResponse::from_outcome(outcome))
}

async fn handle_reset(State(state): State<ApiState>) -> Json<SimpleResponse> {
    let outcome = state.wake.request(WakeEvent::Reset).await;
    Json(SimpleResponse::from_outcome(outcome))
}

async fn handle_briefing(State(state): State<ApiState>) -> Json<BriefingResponse> {
    Json(BriefingResponse {
        text: state.briefing.assemble(Local::now()).await,
    })
}

async fn handle_speak(
    State(state): State<ApiState>,
    Json(req): Json<SpeakRequest>,
) -> Json<SimpleResponse> {
    if req.text.trim().is_empty() {
        return Json(SimpleResponse::err("empty text"));
    }
    if state.speaker.is_none() {
        return Json(SimpleResponse::err("speech is disabled"));
    }

    let preview: String = req.text.chars().take(40).collect();
    info!("HTTP /speak: \"{}\" ({} chars)", preview, req.text.chars().count());

    if state.wake.send(WakeEvent::Speak(req.text)) {
        Json(SimpleResponse::ok("speaking"))
    } else {
        Json(SimpleResponse::err("wake service unavailable"))
    }
}

async fn handle_cancel_speech(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.wake.send(WakeEvent::CancelSpeech);
    Json(SimpleResponse::ok("cancelled"))
}

async fn handle_voices(State(state): State<ApiState>) -> Result<Json<VoicesResponse>, Json<SimpleResponse>> {
    let Some(speaker) = &state.speaker else {
        return Err(Json(SimpleResponse::err("speech is disabled")));
    };
    Ok(Json(VoicesResponse {
        voices: speaker.voices().await,
        dump: speaker.describe_voices().await,
    }))
}

async fn handle_get_preferences(State(state): State<ApiState>) -> Json<VoicePreferences> {
    Json(state.preferences.get())
}

async fn handle_set_preferences(
    State(state): State<ApiState>,
    Json(update): Json<PreferenceUpdate>,
) -> Result<Json<VoicePreferences>, Json<SimpleResponse>> {
    state
        .preferences
        .update(update)
        .map(Json)
        .map_err(|e| Json(SimpleResponse::err(e.to_string())))
}

async fn handle_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<WakeRecord>> {
    let date = query
        .date
        .unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string());
    Json(state.history.load(&date))
}

async fn handle_history_dates(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.history.dates())
}

async fn handle_sleep_status(State(state): State<ApiState>) -> Json<SleepResponse> {
    Json(SleepResponse {
        state: state.sleep.state(),
    })
}

async fn handle_sleep_play(State(state): State<ApiState>) -> Json<SimpleResponse> {
    match state.sleep.play() {
        Ok(()) => Json(SimpleResponse::ok("playing")),
        Err(e) => {
            warn!("Sleep track failed to start: {e}");
            Json(SimpleResponse::err(e.to_string()))
        }
    }
}

async fn handle_sleep_pause(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.sleep.pause();
    Json(SimpleResponse::ok("paused"))
}

async fn handle_sleep_stop(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.sleep.stop();
    Json(SimpleResponse::ok("stopped"))
}

async fn handle_get_journal(
    State(state): State<ApiState>,
    Query(query): Query<JournalQuery>,
) -> Result<Json<Option<JournalEntry>>, Json<SimpleResponse>> {
    let date = parse_journal_date(query.date.as_deref(), Local::now())
        .map_err(|e| Json(SimpleResponse::err(e)))?;
    Ok(Json(state.journal.get(date)))
}

async fn handle_save_journal(
    State(state): State<ApiState>,
    Json(req): Json<JournalRequest>,
) -> Result<Json<JournalEntry>, Json<SimpleResponse>> {
    let date = parse_journal_date(req.date.as_deref(), Local::now())
        .map_err(|e| Json(SimpleResponse::err(e)))?;
    state
        .journal
        .save(date, &req.content)
        .map(Json)
        .map_err(|e| Json(SimpleResponse::err(e.to_string())))
}
