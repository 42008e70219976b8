//! Voice selection for the briefing locale.
//!
//! Speech engines publish no authoritative quality metadata, so ranking is a
//! heuristic over identifiers and display names. Results may change whenever
//! the installed voice catalog changes.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceInfo {
    pub identifier: String,
    pub name: String,
    pub language: String,
}

/// Ranking strategy used when the user has no usable preference.
pub trait VoiceScorer: Send + Sync {
    /// Voices from a curated tier are taken before any scoring happens.
    fn is_curated(&self, voice: &VoiceInfo) -> bool;
    fn score(&self, voice: &VoiceInfo) -> i32;
}

/// Token weights plus a length bonus of up to 10.
///
/// The bonus can outweigh the 5-point gap between "premium" and "enhanced":
/// a long enhanced id may outscore a short premium one. "Premium first" is
/// guaranteed only when the curated hint is "premium" (the default), since
/// curated voices are taken before scoring.
pub struct HeuristicScorer {
    curated_hint: String,
    vendor_hint: String,
}

impl HeuristicScorer {
    pub fn new(curated_hint: &str, vendor_hint: &str) -> Self {
        Self {
            curated_hint: curated_hint.to_lowercase(),
            vendor_hint: vendor_hint.to_lowercase(),
        }
    }
}

impl VoiceScorer for HeuristicScorer {
    fn is_curated(&self, voice: &VoiceInfo) -> bool {
        !self.curated_hint.is_empty() && voice.identifier.to_lowercase().contains(&self.curated_hint)
    }

    fn score(&self, voice: &VoiceInfo) -> i32 {
        let id = voice.identifier.to_lowercase();
        let name = voice.name.to_lowercase();
        let mut score = 0;

        if id.contains("premium") || name.contains("premium") {
            score += 30;
        }
        if id.contains("enhanced") || name.contains("enhanced") {
            score += 25;
        }
        if !self.vendor_hint.is_empty() && id.contains(&self.vendor_hint) {
            score += 10;
        }
        if name.contains("novelty") {
            score -= 10;
        }
        // Longer identifiers tend to be newer variants.
        score += (id.chars().count() / 10).min(10) as i32;

        score
    }
}

pub struct VoiceSelector {
    locale: String,
    scorer: Box<dyn VoiceScorer>,
}

impl VoiceSelector {
    pub fn new(locale: &str, scorer: Box<dyn VoiceScorer>) -> Self {
        Self {
            locale: locale.to_string(),
            scorer,
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Voices in the catalog that speak the selector's locale.
    pub fn locale_voices<'a>(&self, catalog: &'a [VoiceInfo]) -> Vec<&'a VoiceInfo> {
        catalog
            .iter()
            .filter(|v| v.language.eq_ignore_ascii_case(&self.locale))
            .collect()
    }

    pub fn best_voice(&self, preferred: Option<&str>, catalog: &[VoiceInfo]) -> Option<String> {
        let candidates = self.locale_voices(catalog);

        if let Some(preferred) = preferred {
            if candidates.iter().any(|v| v.identifier == preferred) {
                return Some(preferred.to_string());
            }
        }

        if let Some(curated) = candidates.iter().find(|v| self.scorer.is_curated(v)) {
            return Some(curated.identifier.clone());
        }

        let mut best: Option<(&VoiceInfo, i32)> = None;
        for voice in candidates {
            let score = self.scorer.score(voice);
            // Strictly greater: ties keep catalog order.
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((voice, score));
            }
        }
        best.map(|(v, _)| v.identifier.clone())
    }

    /// One `name=… | id=…` line per locale voice.
    pub fn dump(&self, catalog: &[VoiceInfo]) -> String {
        let voices = self.locale_voices(catalog);
        if voices.is_empty() {
            return format!("No {} voices available.", self.locale);
        }
        voices
            .iter()
            .map(|v| format!("name={} | id={}", v.name, v.identifier))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: &str, name: &str, language: &str) -> VoiceInfo {
        VoiceInfo {
            identifier: id.into(),
            name: name.into(),
            language: language.into(),
        }
    }

    fn selector() -> VoiceSelector {
        VoiceSelector::new("zh-CN", Box::new(HeuristicScorer::new("siri", "com.vendor")))
    }

    fn catalog() -> Vec<VoiceInfo> {
        vec![
            voice("com.vendor.voice.compact.zh-CN.Tingting", "Tingting", "zh-CN"),
            voice("com.vendor.voice.enhanced.zh-CN.Lili", "Lili", "zh-CN"),
            voice("com.vendor.voice.premium.zh-CN.Yue", "Yue", "zh-CN"),
            voice("com.vendor.voice.premium.en-US.Ava", "Ava", "en-US"),
        ]
    }

    #[test]
    fn preferred_voice_wins_when_still_installed() {
        let id = "com.vendor.voice.compact.zh-CN.Tingting";
        assert_eq!(selector().best_voice(Some(id), &catalog()).as_deref(), Some(id));
    }

    #[test]
    fn stale_or_foreign_preference_is_ignored() {
        let best = selector().best_voice(Some("com.vendor.voice.premium.en-US.Ava"), &catalog());
        assert_eq!(best.as_deref(), Some("com.vendor.voice.premium.zh-CN.Yue"));
    }

    #[test]
    fn curated_tier_short_circuits_scoring() {
        let mut voices = catalog();
        voices.push(voice("com.vendor.ttsbundle.siri_female_zh-CN", "Siri Voice", "zh-CN"));
        assert_eq!(
            selector().best_voice(None, &voices).as_deref(),
            Some("com.vendor.ttsbundle.siri_female_zh-CN")
        );
    }

    #[test]
    fn premium_outranks_enhanced_outranks_plain() {
        let s = selector();
        let all = catalog();
        assert_eq!(
            s.best_voice(None, &all).as_deref(),
            Some("com.vendor.voice.premium.zh-CN.Yue")
        );

        let without_premium: Vec<VoiceInfo> =
            all.iter().filter(|v| !v.identifier.contains("premium")).cloned().collect();
        assert_eq!(
            s.best_voice(None, &without_premium).as_deref(),
            Some("com.vendor.voice.enhanced.zh-CN.Lili")
        );
    }

    #[test]
    fn premium_hint_beats_length_bonus() {
        let short_premium = voice("mb-premium-a", "A", "cmn");
        let long_id = format!("mb-enhanced-{}", "variant".repeat(10));
        let long_enhanced = voice(&long_id, "B", "cmn");
        let catalog = vec![long_enhanced.clone(), short_premium.clone()];

        let scorer = HeuristicScorer::new("premium", "mb-");
        assert!(scorer.score(&long_enhanced) > scorer.score(&short_premium));
        let selector = VoiceSelector::new("cmn", Box::new(scorer));
        assert_eq!(selector.best_voice(None, &catalog).as_deref(), Some("mb-premium-a"));

        let plain = VoiceSelector::new("cmn", Box::new(HeuristicScorer::new("", "mb-")));
        assert_eq!(
            plain.best_voice(None, &catalog).as_deref(),
            Some(long_enhanced.identifier.as_str())
        );
    }

    #[test]
    fn novelty_voices_are_penalized() {
        let scorer = HeuristicScorer::new("", "com.vendor");
        let plain = voice("com.vendor.voice.zh-CN.a", "A", "zh-CN");
        let novelty = voice("com.vendor.voice.zh-CN.b", "Bubbles Novelty", "zh-CN");
        assert_eq!(scorer.score(&plain) - scorer.score(&novelty), 10);
    }

    #[test]
    fn empty_catalog_selects_nothing() {
        assert_eq!(selector().best_voice(Some("x"), &[]), None);
        assert_eq!(selector().dump(&[]), "No zh-CN voices available.");
    }
}
