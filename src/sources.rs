//! Live data behind the morning briefing: unfinished tasks and weather.
//!
//! Both sources are best-effort. A failed read becomes an empty task list or
//! an unknown weather summary; the briefing is always produced.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::briefing::{self, BriefingInput};
use crate::config::{BriefingConfig, WeatherConfig};

const WEATHER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed todo file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only view of the task store.
pub trait TaskSource: Send + Sync {
    /// Up to `limit` unfinished task titles, highest priority first.
    fn unfinished_titles(&self, limit: usize) -> Result<Vec<String>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct TodoItem {
    title: String,
    #[serde(default)]
    order_index: i64,
    #[serde(default)]
    is_done: bool,
}

/// Todo list kept as a JSON array of `{title, order_index, is_done}`.
pub struct TodoFile {
    path: PathBuf,
}

impl TodoFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TaskSource for TodoFile {
    fn unfinished_titles(&self, limit: usize) -> Result<Vec<String>, SourceError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| SourceError::Read {
            path: self.path.clone(),
            source,
        })?;
        let mut items: Vec<TodoItem> =
            serde_json::from_str(&contents).map_err(|source| SourceError::Parse {
                path: self.path.clone(),
                source,
            })?;

        items.retain(|item| !item.is_done);
        // Stable sort: equal indices keep file order.
        items.sort_by_key(|item| item.order_index);

        Ok(items
            .into_iter()
            .take(limit)
            .map(|item| item.title.trim().to_string())
            .collect())
    }
}

pub enum WeatherSource {
    Unavailable,
    Fixed(String),
    Wttr {
        client: Client,
        host: String,
        location: String,
    },
}

impl WeatherSource {
    pub fn from_config(config: &WeatherConfig) -> Self {
        match config.provider.as_str() {
            "fixed" => Self::Fixed(config.fixed_text.clone()),
            "wttr" => {
                let client = Client::builder()
                    .timeout(WEATHER_TIMEOUT)
                    .build()
                    .unwrap_or_default();
                Self::Wttr {
                    client,
                    host: config.host.trim_end_matches('/').to_string(),
                    location: config.location.clone(),
                }
            }
            "none" | "" => Self::Unavailable,
            other => {
                warn!("Unknown weather provider '{other}', weather disabled");
                Self::Unavailable
            }
        }
    }

    /// Short condition text for `date`, or `None` when unknown.
    pub async fn fetch_summary(&self, date: NaiveDate) -> Option<String> {
        match self {
            Self::Unavailable => None,
            Self::Fixed(text) => Some(text.clone()).filter(|t| !t.trim().is_empty()),
            Self::Wttr {
                client,
                host,
                location,
            } => {
                let url = format!("{host}/{location}");
                let resp = match client
                    .get(&url)
                    .query(&[("format", "%C"), ("lang", "zh")])
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Weather request for {date} failed: {e}");
                        return None;
                    }
                };
                if !resp.status().is_success() {
                    warn!("Weather service returned status {}", resp.status());
                    return None;
                }
                match resp.text().await {
                    Ok(body) => {
                        let summary = body.trim().to_string();
                        debug!("Weather for {date}: {summary}");
                        Some(summary).filter(|s| !s.is_empty())
                    }
                    Err(e) => {
                        warn!("Failed to read weather response: {e}");
                        None
                    }
                }
            }
        }
    }
}

/// Gathers briefing inputs and renders the briefing text.
pub struct BriefingSources {
    tasks: Arc<dyn TaskSource>,
    weather: WeatherSource,
    config: BriefingConfig,
}

impl BriefingSources {
    pub fn new(tasks: Arc<dyn TaskSource>, weather: WeatherSource, config: BriefingConfig) -> Self {
        Self {
            tasks,
            weather,
            config,
        }
    }

    pub async fn assemble(&self, now: DateTime<Local>) -> String {
        let todos = match self.tasks.unfinished_titles(self.config.todo_fetch_limit) {
            Ok(titles) => titles,
            Err(e) => {
                warn!("Task fetch failed, briefing without tasks: {e}");
                Vec::new()
            }
        };
        let weather = self.weather.fetch_summary(now.date_naive()).await;

        let input = BriefingInput::new(now, weather, todos, self.config.user_name.clone())
            .with_max_todo_spoken(self.config.max_todo_spoken)
            .with_closing(self.config.include_closing);
        let text = briefing::build(&input);
        info!("Briefing assembled ({} chars)", text.chars().count());
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn todo_file(json: &str) -> (tempfile::NamedTempFile, TodoFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        let source = TodoFile::new(file.path().to_path_buf());
        (file, source)
    }

    fn morning() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 9, 7, 0, 0).unwrap()
    }

    #[test]
    fn unfinished_titles_filtered_sorted_and_limited() {
        let (_file, source) = todo_file(
            r#"[
                {"title": " 写周报 ", "order_index": 2, "is_done": false},
                {"title": "晨跑", "order_index": 0, "is_done": true},
                {"title": "买菜", "order_index": 1, "is_done": false},
                {"title": "读书", "order_index": 3}
            ]"#,
        );
        assert_eq!(source.unfinished_titles(7).unwrap(), vec!["买菜", "写周报", "读书"]);
        assert_eq!(source.unfinished_titles(2).unwrap(), vec!["买菜", "写周报"]);
    }

    #[test]
    fn missing_or_malformed_file_is_an_error() {
        let source = TodoFile::new(PathBuf::from("/nonexistent/wakeflow/todos.json"));
        assert!(matches!(source.unfinished_titles(7), Err(SourceError::Read { .. })));

        let (_file, source) = todo_file("{not json");
        assert!(matches!(source.unfinished_titles(7), Err(SourceError::Parse { .. })));
    }

    #[tokio::test]
    async fn fixed_weather_blank_is_unknown() {
        let date = morning().date_naive();
        assert_eq!(
            WeatherSource::Fixed("多云".into()).fetch_summary(date).await.as_deref(),
            Some("多云")
        );
        assert_eq!(WeatherSource::Fixed("  ".into()).fetch_summary(date).await, None);
        assert_eq!(WeatherSource::Unavailable.fetch_summary(date).await, None);
    }

    #[tokio::test]
    async fn wttr_reads_condition_text() {
        use axum::extract::Query;
        use axum::routing::get;
        use std::collections::HashMap;

        let app = axum::Router::new().route(
            "/Beijing",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                if q.get("format").map(String::as_str) == Some("%C") {
                    "晴\n".to_string()
                } else {
                    String::new()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let source = WeatherSource::from_config(&WeatherConfig {
            provider: "wttr".into(),
            location: "Beijing".into(),
            host: format!("http://{addr}/"),
            ..Default::default()
        });
        assert_eq!(source.fetch_summary(morning().date_naive()).await.as_deref(), Some("晴"));
    }

    #[tokio::test]
    async fn wttr_unreachable_is_unknown() {
        let source = WeatherSource::from_config(&WeatherConfig {
            provider: "wttr".into(),
            location: "Nowhere".into(),
            host: "http://127.0.0.1:9".into(),
            ..Default::default()
        });
        assert_eq!(source.fetch_summary(morning().date_naive()).await, None);
    }

    #[tokio::test]
    async fn assemble_substitutes_defaults_on_failure() {
        let sources = BriefingSources::new(
            Arc::new(TodoFile::new(PathBuf::from("/nonexistent/todos.json"))),
            WeatherSource::Unavailable,
            BriefingConfig {
                user_name: "里昂".into(),
                ..Default::default()
            },
        );
        assert_eq!(
            sources.assemble(morning()).await,
            "里昂，早上好。今天是3月9号，天气未知。今天任务已清空。保持节奏就好。"
        );
    }

    #[tokio::test]
    async fn assemble_uses_tasks_and_weather() {
        let (_file, todos) = todo_file(r#"[{"title": "买菜", "order_index": 0, "is_done": false}]"#);
        let sources = BriefingSources::new(
            Arc::new(todos),
            WeatherSource::Fixed("晴天".into()),
            BriefingConfig {
                user_name: "里昂".into(),
                ..Default::default()
            },
        );
        assert_eq!(
            sources.assemble(morning()).await,
            "里昂，早上好。今天是3月9号，晴天。你今天的重点是：买菜。我们开始吧。"
        );
    }
}
