//! wakeflow-rs: wake-up ritual daemon for Linux.
//!
//! An escalating alarm series rings until the user confirms they are awake,
//! then a spoken morning briefing is built from the date, the weather and
//! unfinished tasks. At bedtime a sleep track and a per-day journal round
//! out the ritual.

pub mod alarm_binding;
pub mod alerts;
pub mod api;
pub mod audio;
pub mod briefing;
pub mod config;
pub mod escalation;
pub mod history;
pub mod journal;
pub mod notifier;
pub mod router;
pub mod service;
pub mod session;
pub mod sleep;
pub mod sources;
pub mod speech;
