//! wakeflow-rs: wake-up ritual daemon for Linux.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wakeflow_rs::alerts::{AlertCenter, LocalAlertCenter};
use wakeflow_rs::api::{self, ApiState};
use wakeflow_rs::audio::{AlarmSound, LoopingAlarm, OutputDevice};
use wakeflow_rs::config::Config;
use wakeflow_rs::history::WakeHistory;
use wakeflow_rs::journal::SleepJournal;
use wakeflow_rs::notifier::Notifier;
use wakeflow_rs::service::{ServiceOptions, WakeParts, WakeService};
use wakeflow_rs::sleep::{SleepPlayer, SleepSound};
use wakeflow_rs::sources::{BriefingSources, TaskSource, TodoFile, WeatherSource};
use wakeflow_rs::speech::espeak::EspeakSynthesizer;
use wakeflow_rs::speech::preferences::PreferenceStore;
use wakeflow_rs::speech::speaker::Speaker;
use wakeflow_rs::speech::voice::{HeuristicScorer, VoiceSelector};

#[derive(Parser, Debug)]
#[command(name = "wakeflow-rs", about = "Wake-up ritual daemon")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start as if the app were in the background (no reconciliation until activated)
    #[arg(long)]
    background: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy rodio internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,rodio=info")
    } else {
        EnvFilter::new("info,rodio=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("wakeflow-rs starting");

    let config = Config::load(args.config.as_deref());
    info!("Alarm: {} (auto-arm: {})", config.alarm.time, config.alarm.auto_arm);

    // Alert delivery
    let (alert_tx, alert_rx) = mpsc::unbounded_channel();
    let center: Arc<dyn AlertCenter> = Arc::new(LocalAlertCenter::open(
        Some(config.alerts.log_path()),
        Notifier::new(config.alerts.notifications),
        alert_tx,
    ));

    // Audio
    let device = Arc::new(OutputDevice::new());
    let sound_path = config.alarm.sound_path();
    if !sound_path.exists() {
        warn!("Alarm sound {} not found, alarm will ring silently", sound_path.display());
    }
    let sound: Arc<dyn AlarmSound> = Arc::new(LoopingAlarm::new(device.clone(), sound_path));
    let sleep: Arc<dyn SleepSound> =
        Arc::new(SleepPlayer::new(device.clone(), config.sleep.track_path()));

    // Speech
    let preferences = Arc::new(PreferenceStore::load(Some(config.speech.preferences_path())));
    let speaker = if config.speech.enabled {
        let synth = Arc::new(EspeakSynthesizer::new(
            &config.speech.espeak_binary,
            &config.speech.locale,
            device,
        ));
        let selector = VoiceSelector::new(
            &config.speech.locale,
            Box::new(HeuristicScorer::new(
                &config.speech.curated_hint,
                &config.speech.vendor_hint,
            )),
        );
        let speaker = Arc::new(Speaker::new(synth, preferences.clone(), selector));
        info!("Speech enabled ({} via {})", config.speech.locale, config.speech.espeak_binary);
        Some(speaker)
    } else {
        info!("Speech disabled, briefings will not be spoken");
        None
    };

    // Briefing data
    let tasks: Arc<dyn TaskSource> = Arc::new(TodoFile::new(config.briefing.todos_path()));
    let briefing = Arc::new(BriefingSources::new(
        tasks,
        WeatherSource::from_config(&config.weather),
        config.briefing.clone(),
    ));
    let history = WakeHistory::default();

    let options = ServiceOptions::from_config(&config, args.background);
    let (service, handle) = WakeService::new(
        WakeParts {
            center,
            alert_events: alert_rx,
            sound,
            speaker: speaker.clone(),
            briefing: briefing.clone(),
            history: history.clone(),
        },
        options,
    );

    if config.api.enabled {
        let api_state = ApiState {
            wake: handle,
            speaker,
            preferences,
            briefing,
            history,
            sleep,
            journal: SleepJournal::default(),
        };
        api::start_control_api(api_state, config.api.port).await;
    }

    service.run().await;

    Ok(())
}
