//! Morning briefing text.
//!
//! Deterministic: the same input always produces the same sentence. Task
//! titles are normalized one by one before they are joined.

use chrono::{DateTime, Datelike, Local};

const WEATHER_UNKNOWN: &str = "天气未知";
const MAX_TITLE_CHARS: usize = 30;

/// Literal substitutions applied to each task title, in order.
const SPEECH_REPLACEMENTS: &[(&str, &str)] = &[
    ("Agentic Coding", "智能体编程"),
    ("agentic coding", "智能体编程"),
    ("Codex Hackathon", "Codex 黑客松"),
    ("hackathon", "黑客松"),
    ("Codex", "Codex"),
    ("TTS", "语音播报"),
    ("UI", "界面"),
    ("APP", "应用"),
    ("App", "应用"),
    ("GPT", "GPT"),
];

#[derive(Debug, Clone)]
pub struct BriefingInput {
    pub now: DateTime<Local>,
    /// Short weather summary such as "晴天"; `None` when unknown.
    pub weather: Option<String>,
    /// Unfinished task titles in priority order.
    pub unfinished_todos: Vec<String>,
    pub user_name: String,
    pub max_todo_spoken: usize,
    pub include_closing: bool,
}

impl BriefingInput {
    pub fn new(
        now: DateTime<Local>,
        weather: Option<String>,
        unfinished_todos: Vec<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            now,
            weather,
            unfinished_todos,
            user_name: user_name.into(),
            max_todo_spoken: 5,
            include_closing: true,
        }
    }

    pub fn with_max_todo_spoken(mut self, max: usize) -> Self {
        self.max_todo_spoken = max;
        self
    }

    pub fn with_closing(mut self, include: bool) -> Self {
        self.include_closing = include;
        self
    }
}

pub fn build(input: &BriefingInput) -> String {
    let date_text = format_chinese_date(input.now);

    let weather = input
        .weather
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .unwrap_or(WEATHER_UNKNOWN);

    let cleaned: Vec<String> = input
        .unfinished_todos
        .iter()
        .map(|t| normalize_for_speech(t))
        .filter(|t| !t.is_empty())
        .collect();

    let greeting = format!("{}，早上好。", input.user_name);
    let date_line = format!("今天是{date_text}，{weather}。");

    let task_line = if cleaned.is_empty() {
        if input.include_closing {
            "今天任务已清空。保持节奏就好。".to_string()
        } else {
            "今天任务已清空。".to_string()
        }
    } else {
        let max_n = input.max_todo_spoken.max(1);
        let spoken = &cleaned[..cleaned.len().min(max_n)];
        let mut line = format!("你今天的重点是：{}。", spoken.join("，"));

        let remaining = cleaned.len() - spoken.len();
        if remaining > 0 {
            line.push_str(&format!("另外还有{remaining}项未完成。"));
        }
        if input.include_closing {
            line.push_str("我们开始吧。");
        }
        line
    };

    format!("{greeting}{date_line}{task_line}")
}

/// Prepare one task title for speech. Returns an empty string for blank titles.
pub fn normalize_for_speech(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut s = trimmed.replace(':', "：").replace('-', "—");
    for (from, to) in SPEECH_REPLACEMENTS {
        s = s.replace(from, to);
    }

    if s.chars().count() > MAX_TITLE_CHARS {
        let mut truncated: String = s.chars().take(MAX_TITLE_CHARS).collect();
        truncated.push('…');
        s = truncated;
    }
    s
}

/// "2月19号"
fn format_chinese_date(now: DateTime<Local>) -> String {
    format!("{}月{}号", now.month(), now.day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn morning() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 2, 19, 7, 0, 0).unwrap()
    }

    fn todos(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("任务{i}")).collect()
    }

    #[test]
    fn empty_list_with_closing() {
        let input = BriefingInput::new(morning(), Some("晴天".into()), vec![], "里昂");
        assert_eq!(
            build(&input),
            "里昂，早上好。今天是2月19号，晴天。今天任务已清空。保持节奏就好。"
        );
    }

    #[test]
    fn empty_list_without_closing() {
        let input =
            BriefingInput::new(morning(), Some("多云".into()), vec![], "里昂").with_closing(false);
        assert_eq!(build(&input), "里昂，早上好。今天是2月19号，多云。今天任务已清空。");
    }

    #[test]
    fn missing_or_blank_weather_reads_as_unknown() {
        let none = BriefingInput::new(morning(), None, vec![], "A").with_closing(false);
        let blank = BriefingInput::new(morning(), Some("  ".into()), vec![], "A").with_closing(false);
        assert!(build(&none).contains("今天是2月19号，天气未知。"));
        assert_eq!(build(&none), build(&blank));
    }

    #[test]
    fn caps_spoken_tasks_and_counts_the_rest() {
        let input = BriefingInput::new(morning(), Some("晴天".into()), todos(7), "里昂");
        assert_eq!(
            build(&input),
            "里昂，早上好。今天是2月19号，晴天。\
             你今天的重点是：任务1，任务2，任务3，任务4，任务5。\
             另外还有2项未完成。我们开始吧。"
        );
    }

    #[test]
    fn cap_has_a_floor_of_one() {
        let input = BriefingInput::new(morning(), None, todos(3), "A")
            .with_max_todo_spoken(0)
            .with_closing(false);
        assert!(build(&input).ends_with("你今天的重点是：任务1。另外还有2项未完成。"));
    }

    #[test]
    fn blank_titles_are_dropped_before_counting() {
        let input = BriefingInput::new(
            morning(),
            None,
            vec!["  ".into(), "写周报".into(), "".into()],
            "A",
        )
        .with_closing(false);
        assert!(build(&input).ends_with("你今天的重点是：写周报。"));
    }

    #[test]
    fn normalization_replaces_punctuation_and_jargon() {
        assert_eq!(normalize_for_speech("  Todo #1: Review UI  "), "Todo #1： Review 界面");
        assert_eq!(normalize_for_speech("学习 Agentic Coding"), "学习 智能体编程");
        assert_eq!(normalize_for_speech("完成 Codex Hackathon"), "完成 Codex 黑客松");
        assert_eq!(normalize_for_speech("TTS-App"), "语音播报—应用");
    }

    #[test]
    fn long_titles_are_truncated_with_ellipsis() {
        let long = "一".repeat(40);
        let normalized = normalize_for_speech(&long);
        assert_eq!(normalized.chars().count(), 31);
        assert!(normalized.ends_with('…'));
        assert_eq!(normalize_for_speech(&"二".repeat(30)), "二".repeat(30));
    }
}
