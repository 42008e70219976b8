//! Split text into short speakable units.
//!
//! Sentences are kept whole when short. Long sentences are re-split on
//! clause punctuation and whole clauses are packed back together up to a
//! soft bound, so the engine pauses between thoughts without chopping a
//! clause in half.

/// Sentences up to this many characters are spoken as-is.
pub const SENTENCE_MAX_CHARS: usize = 22;
/// Packed clause groups stay within this many characters.
pub const CLAUSE_PACK_MAX_CHARS: usize = 26;

const SENTENCE_BREAKS: &[char] = &['。', '！', '？', '!', '?', '；', ';'];
const CLAUSE_BREAKS: &[char] = &['，', '、', ','];
const CLAUSE_JOINER: &str = "，";
const UNIT_END: char = '。';

pub fn segment(text: &str) -> Vec<String> {
    let mut sentences = split_trimmed(text, SENTENCE_BREAKS);
    if sentences.is_empty() {
        let whole = text.trim();
        if whole.is_empty() {
            return Vec::new();
        }
        sentences.push(whole);
    }

    let mut units = Vec::new();
    for sentence in sentences {
        if char_len(sentence) <= SENTENCE_MAX_CHARS {
            units.push(sentence.to_string());
        } else {
            pack_clauses(sentence, &mut units);
        }
    }

    for unit in &mut units {
        unit.push(UNIT_END);
    }
    units
}

fn pack_clauses(sentence: &str, units: &mut Vec<String>) {
    let clauses = split_trimmed(sentence, CLAUSE_BREAKS);
    if clauses.is_empty() {
        units.push(sentence.to_string());
        return;
    }

    let mut buffer = String::new();
    for clause in clauses {
        if buffer.is_empty() {
            buffer.push_str(clause);
            continue;
        }

        let joined_len = char_len(&buffer) + char_len(CLAUSE_JOINER) + char_len(clause);
        if joined_len <= CLAUSE_PACK_MAX_CHARS {
            buffer.push_str(CLAUSE_JOINER);
            buffer.push_str(clause);
        } else {
            units.push(std::mem::take(&mut buffer));
            buffer.push_str(clause);
        }
    }
    if !buffer.is_empty() {
        units.push(buffer);
    }
}

fn split_trimmed<'a>(text: &'a str, breaks: &[char]) -> Vec<&'a str> {
    text.split(|c: char| breaks.contains(&c))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_len(unit: &str) -> usize {
        char_len(unit.trim_end_matches(UNIT_END))
    }

    #[test]
    fn short_sentence_is_one_unit() {
        let sentence = "今天是二月十九号晴天";
        assert_eq!(char_len(sentence), 10);
        assert_eq!(segment(sentence), vec![format!("{sentence}。")]);
        assert_eq!(segment(&format!("{sentence}。")), vec![format!("{sentence}。")]);
    }

    #[test]
    fn terminators_are_normalized_to_full_stop() {
        assert_eq!(
            segment("早上好！准备好了吗？开始吧; 走"),
            vec!["早上好。", "准备好了吗。", "开始吧。", "走。"]
        );
    }

    #[test]
    fn empty_pieces_are_dropped() {
        assert_eq!(segment("。。 好的 。！"), vec!["好的。"]);
    }

    #[test]
    fn punctuation_only_input_falls_back_to_whole_text() {
        assert_eq!(segment("。。"), vec!["。。。"]);
        assert!(segment("   ").is_empty());
    }

    #[test]
    fn long_sentence_packs_whole_clauses() {
        // 4 clauses of 10 chars: two fit per unit (10 + 1 + 10 = 21).
        let clause = "一二三四五六七八九十";
        let sentence = [clause; 4].join("，");
        let units = segment(&sentence);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0], format!("{clause}，{clause}。"));
        assert!(units.iter().all(|u| content_len(u) <= CLAUSE_PACK_MAX_CHARS));
    }

    #[test]
    fn packing_flushes_before_exceeding_bound() {
        let a = "甲".repeat(12);
        let b = "乙".repeat(13);
        let c = "丙".repeat(5);
        // a + b = 26 fits exactly; adding c would not.
        let units = segment(&format!("{a}、{b},{c}"));
        assert_eq!(units, vec![format!("{a}，{b}。"), format!("{c}。")]);
    }

    #[test]
    fn unsplittable_long_sentence_stays_whole() {
        let long = "长".repeat(40);
        let units = segment(&long);
        assert_eq!(units, vec![format!("{long}。")]);
    }

    #[test]
    fn briefing_sized_text_stays_within_bounds() {
        let text = "里昂，早上好。今天是2月19号，晴天。你今天的重点是：学习智能体编程，完成Codex黑客松，\
                    写周报，回顾今天的计划，开始第一个锁定专注。另外还有2项未完成。我们开始吧。";
        let units = segment(text);
        assert!(units.len() >= 6);
        assert!(units.iter().all(|u| u.ends_with('。')));
        assert!(units.iter().all(|u| content_len(u) <= CLAUSE_PACK_MAX_CHARS));
        assert_eq!(units[0], "里昂，早上好。");
    }
}
