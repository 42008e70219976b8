//! wakeflow-ctl: command-line client for the wakeflow-rs control API.
//!
//! Each subcommand maps to one HTTP route; the JSON answer is printed as-is.
//! Exits with status 1 when the daemon cannot be reached.

use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::{Client, Method};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "wakeflow-ctl", about = "Control a running wakeflow-rs daemon")]
struct Args {
    /// Control API port
    #[arg(short, long, default_value_t = 8768)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show session, lifecycle and alarm status
    Status,
    /// Report an app lifecycle change: active, inactive or background
    Lifecycle { phase: String },
    /// Confirm you are awake (only while the wake flow is on screen)
    Confirm,
    /// Arm the escalation series at HH:MM or an RFC 3339 time (default: configured time)
    Alarm { at: Option<String> },
    /// Cancel every pending and delivered wake alert
    CancelAlarm,
    /// Fire a single test alarm in a few seconds
    TestAlarm,
    /// Act on a delivered alert, as if its notification was clicked
    Ack { id: String },
    /// Force the session back to idle
    Reset,
    /// Preview today's briefing text
    Briefing,
    /// Speak arbitrary text
    Speak { text: String },
    /// Stop speech in progress
    CancelSpeech,
    /// List installed voices for the briefing locale
    Voices,
    /// Show or update voice preferences
    Prefs {
        /// Preferred voice identifier ("" clears it)
        #[arg(long)]
        voice: Option<String>,
        #[arg(long)]
        rate: Option<f32>,
        #[arg(long)]
        pitch: Option<f32>,
        #[arg(long)]
        volume: Option<f32>,
    },
    /// Show wake history for a date (YYYY-MM-DD, default today)
    History {
        #[arg(long)]
        date: Option<String>,
        /// List the dates that have history instead
        #[arg(long, conflicts_with = "date")]
        list: bool,
    },
    /// Control the bedtime track (no action shows its state)
    Sleep {
        #[command(subcommand)]
        action: Option<SleepAction>,
    },
    /// Show or write the sleep journal for a date (default today)
    Journal {
        #[arg(long)]
        date: Option<String>,
        /// Replace the day's entry with this text
        #[arg(long)]
        text: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SleepAction {
    Play,
    Pause,
    Stop,
}

/// Method, path and optional JSON body for a subcommand.
fn request_for(command: Command) -> (Method, String, Option<Value>) {
    match command {
        Command::Status => (Method::GET, "/status".into(), None),
        Command::Lifecycle { phase } => {
            (Method::POST, "/lifecycle".into(), Some(json!({ "phase": phase })))
        }
        Command::Confirm => (Method::POST, "/confirm".into(), None),
        Command::Alarm { at } => (Method::POST, "/alarm".into(), Some(json!({ "at": at }))),
        Command::CancelAlarm => (Method::POST, "/alarm/cancel".into(), None),
        Command::TestAlarm => (Method::POST, "/alarm/test".into(), None),
        Command::Ack { id } => (Method::POST, "/alerts/ack".into(), Some(json!({ "id": id }))),
        Command::Reset => (Method::POST, "/reset".into(), None),
        Command::Briefing => (Method::GET, "/briefing".into(), None),
        Command::Speak { text } => (Method::POST, "/speak".into(), Some(json!({ "text": text }))),
        Command::CancelSpeech => (Method::POST, "/cancel-speech".into(), None),
        Command::Voices => (Method::GET, "/voices".into(), None),
        Command::Prefs {
            voice,
            rate,
            pitch,
            volume,
        } => {
            if voice.is_none() && rate.is_none() && pitch.is_none() && volume.is_none() {
                (Method::GET, "/preferences".into(), None)
            } else {
                let body = json!({ "voice": voice, "rate": rate, "pitch": pitch, "volume": volume });
                (Method::POST, "/preferences".into(), Some(body))
            }
        }
        Command::History { date, list } => {
            let path = match (list, date) {
                (true, _) => "/history/dates".into(),
                (false, Some(d)) => format!("/history?date={d}"),
                (false, None) => "/history".into(),
            };
            (Method::GET, path, None)
        }
        Command::Sleep { action } => match action {
            None => (Method::GET, "/sleep".into(), None),
            Some(SleepAction::Play) => (Method::POST, "/sleep/play".into(), None),
            Some(SleepAction::Pause) => (Method::POST, "/sleep/pause".into(), None),
            Some(SleepAction::Stop) => (Method::POST, "/sleep/stop".into(), None),
        },
        Command::Journal { date, text } => match text {
            Some(content) => (
                Method::POST,
                "/journal".into(),
                Some(json!({ "date": date, "content": content })),
            ),
            None => {
                let path = match date {
                    Some(d) => format!("/journal?date={d}"),
                    None => "/journal".into(),
                };
                (Method::GET, path, None)
            }
        },
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let base = format!("http://127.0.0.1:{}", args.port);
    let (method, path, body) = request_for(args.command);

    let client = Client::builder()
        .connect_timeout(Duration::from_millis(500))
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_else(|_| Client::new());

    let mut request = client.request(method, format!("{base}{path}"));
    if let Some(body) = body {
        request = request.json(&body);
    }

    let resp = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("wakeflow-rs is not reachable at {base}: {e}");
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or(text)
        ),
        Err(_) => println!("{text}"),
    }
    if !status.is_success() {
        eprintln!("HTTP {status}");
        std::process::exit(1);
    }
}
