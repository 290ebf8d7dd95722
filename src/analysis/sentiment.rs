//! Emotional read of story sections, for picking reaction images.
//!
//! Each section is scored against ten emotions by counting word-bounded
//! keyword hits, then weighted by where the section sits in the story, by
//! its kind, and by the overall lexicon sentiment. The winning emotion maps
//! to a list of reaction-image search terms and a caption line.
//!
//! Everything is deterministic except [`pick_search_term`], which takes the
//! caller's RNG.

use crate::analysis::lexicon;
use crate::analysis::quality::QualityTier;
use crate::models::SectionKind;
use once_cell::sync::Lazy;
use rand::Rng;
use rand::seq::IndexedRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed emotion set, in tie-breaking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionType {
    OpeningTension,
    EscalatingDrama,
    PeakChaos,
    ShockedRealization,
    SatisfiedResolution,
    AwkwardSilence,
    CollectiveCringe,
    HereForIt,
    MildConcern,
    PureEntertainment,
}

impl EmotionType {
    pub const ALL: [EmotionType; 10] = [
        EmotionType::OpeningTension,
        EmotionType::EscalatingDrama,
        EmotionType::PeakChaos,
        EmotionType::ShockedRealization,
        EmotionType::SatisfiedResolution,
        EmotionType::AwkwardSilence,
        EmotionType::CollectiveCringe,
        EmotionType::HereForIt,
        EmotionType::MildConcern,
        EmotionType::PureEntertainment,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            EmotionType::OpeningTension => &[
                "started", "began", "innocent", "simple", "thought", "decided", "posted",
                "tweeted", "asked", "poll", "question",
            ],
            EmotionType::EscalatingDrama => &[
                "replies", "quote tweets", "heated", "descended", "battlefield", "vultures",
                "argue", "debate", "angry", "furious", "rage",
            ],
            EmotionType::PeakChaos => &[
                "meltdown", "chaos", "exploded", "viral", "trending", "disaster", "complete",
                "total", "absolute", "nuclear", "peak", "maximum",
            ],
            EmotionType::ShockedRealization => &[
                "turns out", "realized", "actually", "plot twist", "discovered", "revelation",
                "suddenly", "meanwhile", "however", "but then",
            ],
            EmotionType::SatisfiedResolution => &[
                "finally", "eventually", "concluded", "ended", "aftermath", "settled", "dust",
                "moral", "lesson", "learned",
            ],
            EmotionType::AwkwardSilence => &[
                "silence", "quiet", "nobody", "crickets", "uncomfortable", "awkward", "pause",
                "moment", "beat", "wait",
            ],
            EmotionType::CollectiveCringe => &[
                "cringe", "secondhand", "embarrassing", "painful", "yikes", "oof", "imagine",
                "watching", "witnessing",
            ],
            EmotionType::HereForIt => &[
                "popcorn", "tea", "drama", "entertainment", "here for", "living for",
                "obsessed", "fascinating", "mesmerizing",
            ],
            EmotionType::MildConcern => &[
                "concerning", "worried", "troubling", "problematic", "red flag", "alarm",
                "warning", "careful", "caution",
            ],
            EmotionType::PureEntertainment => &[
                "hilarious", "brilliant", "perfect", "amazing", "incredible", "spectacular",
                "beautiful", "chef kiss", "magnificent",
            ],
        }
    }

    /// Reaction-image search terms.
    pub fn search_terms(self) -> &'static [&'static str] {
        match self {
            EmotionType::OpeningTension => &[
                "here we go again", "brace yourself", "oh boy here we go", "this should be good",
                "buckle up",
            ],
            EmotionType::EscalatingDrama => &[
                "popcorn eating", "drama intensifies", "things heating up", "oh snap",
                "tea spilling",
            ],
            EmotionType::PeakChaos => &[
                "this is fine fire", "chaos everywhere", "what just happened", "absolute madness",
                "world burning",
            ],
            EmotionType::ShockedRealization => &[
                "plot twist", "mind blown", "wait what", "hold up", "record scratch",
            ],
            EmotionType::SatisfiedResolution => &[
                "mic drop", "well that happened", "and scene", "case closed", "dust settling",
            ],
            EmotionType::AwkwardSilence => &[
                "awkward silence", "cricket sounds", "uncomfortable", "yikes", "that was awkward",
            ],
            EmotionType::CollectiveCringe => &[
                "secondhand embarrassment", "cringe watching", "painful to watch",
                "hiding behind hands", "oh no",
            ],
            EmotionType::HereForIt => &[
                "living for this drama", "here for it", "absolutely fascinated",
                "can't look away", "obsessed with this",
            ],
            EmotionType::MildConcern => &[
                "side eye", "raised eyebrow", "concerning behavior", "red flag alert",
                "worry face",
            ],
            EmotionType::PureEntertainment => &[
                "chef kiss perfection", "absolutely brilliant", "pure comedy gold", "masterpiece",
                "standing ovation",
            ],
        }
    }

    fn food_search_terms(self) -> &'static [&'static str] {
        match self {
            EmotionType::OpeningTension => &["innocent food question"],
            EmotionType::EscalatingDrama => &["food fight", "kitchen drama"],
            EmotionType::PeakChaos => &["cooking disaster", "chef meltdown"],
            EmotionType::PureEntertainment => &["chef kiss", "delicious drama"],
            _ => &[],
        }
    }

    /// Caption shown above the reaction image.
    pub fn caption(self) -> &'static str {
        match self {
            EmotionType::OpeningTension => "Everyone sensing something's about to go down:",
            EmotionType::EscalatingDrama => "Viewers watching this unfold:",
            EmotionType::PeakChaos => "The internet right now:",
            EmotionType::ShockedRealization => "Everyone when the plot twist hits:",
            EmotionType::SatisfiedResolution => "Readers after that conclusion:",
            EmotionType::AwkwardSilence => "The collective reaction:",
            EmotionType::CollectiveCringe => "All of us watching this:",
            EmotionType::HereForIt => "The audience absolutely living for this:",
            EmotionType::MildConcern => "Everyone's internal reaction:",
            EmotionType::PureEntertainment => "The unanimous response:",
        }
    }

    fn is_high_intensity(self) -> bool {
        matches!(
            self,
            EmotionType::PeakChaos | EmotionType::ShockedRealization | EmotionType::PureEntertainment
        )
    }
}

impl fmt::Display for EmotionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmotionType::OpeningTension => "opening_tension",
            EmotionType::EscalatingDrama => "escalating_drama",
            EmotionType::PeakChaos => "peak_chaos",
            EmotionType::ShockedRealization => "shocked_realization",
            EmotionType::SatisfiedResolution => "satisfied_resolution",
            EmotionType::AwkwardSilence => "awkward_silence",
            EmotionType::CollectiveCringe => "collective_cringe",
            EmotionType::HereForIt => "here_for_it",
            EmotionType::MildConcern => "mild_concern",
            EmotionType::PureEntertainment => "pure_entertainment",
        };
        f.write_str(name)
    }
}

/// One compiled `\bkeyword\b` pattern per keyword, per emotion.
static KEYWORD_PATTERNS: Lazy<Vec<Vec<Regex>>> = Lazy::new(|| {
    EmotionType::ALL
        .iter()
        .map(|e| {
            e.keywords()
                .iter()
                .filter_map(|k| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(k))).ok())
                .collect()
        })
        .collect()
});

static TWITTER_ATTRIBUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[—–-]\s*@\w+").expect("valid attribution regex"));

/// Where a section sits and what surrounds it.
#[derive(Debug, Clone, Copy)]
pub struct SectionContext<'a> {
    pub category: &'a str,
    pub kind: &'a SectionKind,
    pub index: usize,
    pub total: usize,
    pub tier: QualityTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalAnalysis {
    pub emotion: EmotionType,
    /// In `[0, 1]`.
    pub intensity: f64,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub search_terms: Vec<String>,
    pub caption: String,
    pub sentiment_score: i32,
}

/// Relative position in `[0, 1]`; a single-section story counts as the start.
pub fn story_position(index: usize, total: usize) -> f64 {
    if total <= 1 {
        0.0
    } else {
        (index as f64 / (total - 1) as f64).clamp(0.0, 1.0)
    }
}

fn preprocess(content: &str) -> String {
    let stripped = TWITTER_ATTRIBUTION.replace_all(content, "");
    stripped
        .trim()
        .trim_start_matches('"')
        .trim_end_matches('"')
        .to_lowercase()
}

fn keyword_matches(content: &str, emotion: EmotionType) -> usize {
    KEYWORD_PATTERNS[emotion.index()]
        .iter()
        .map(|re| re.find_iter(content).count())
        .sum()
}

fn determine_emotion(content: &str, sentiment: i32, ctx: &SectionContext<'_>) -> EmotionType {
    use EmotionType::*;

    let position = story_position(ctx.index, ctx.total);
    let mut scores = [0.0f64; 10];
    for emotion in EmotionType::ALL {
        scores[emotion.index()] = keyword_matches(content, emotion) as f64;
    }
    let mut scale = |e: EmotionType, by: f64| scores[e.index()] *= by;

    if position < 0.2 {
        scale(OpeningTension, 3.0);
    } else if position < 0.4 {
        scale(EscalatingDrama, 2.0);
    } else if position < 0.7 {
        scale(PeakChaos, 2.0);
        scale(ShockedRealization, 2.0);
    } else {
        scale(SatisfiedResolution, 2.0);
        scale(PureEntertainment, 1.5);
    }

    match ctx.kind {
        SectionKind::Quotes => {
            scale(HereForIt, 2.0);
            scale(CollectiveCringe, 1.5);
        }
        SectionKind::Comments(1 | 2) => {
            scale(EscalatingDrama, 1.5);
            scale(PeakChaos, 1.5);
        }
        SectionKind::Outro => {
            scale(SatisfiedResolution, 2.0);
            scale(PureEntertainment, 1.5);
        }
        _ => {}
    }

    if sentiment > 3 {
        scale(PureEntertainment, 1.5);
        scale(HereForIt, 1.3);
    } else if sentiment < -3 {
        scale(PeakChaos, 1.5);
        scale(CollectiveCringe, 1.3);
    }

    // Strictly greater keeps the earlier emotion on ties.
    let mut best = OpeningTension;
    for emotion in EmotionType::ALL {
        if scores[emotion.index()] > scores[best.index()] {
            best = emotion;
        }
    }

    if scores[best.index()] > 0.0 {
        return best;
    }
    if position < 0.3 {
        OpeningTension
    } else if position < 0.6 {
        EscalatingDrama
    } else if position < 0.8 {
        PeakChaos
    } else {
        SatisfiedResolution
    }
}

fn intensity(sentiment: i32, emotion: EmotionType, tier: QualityTier) -> f64 {
    let mut value = (f64::from(sentiment.abs()) / 10.0).min(1.0);
    if emotion.is_high_intensity() {
        value = value.max(0.7);
    }
    if tier == QualityTier::Premium {
        value *= 1.2;
    }
    value.min(1.0)
}

fn confidence(content: &str, emotion: EmotionType, sentiment: i32) -> f64 {
    let keyword = (keyword_matches(content, emotion) as f64 / 3.0).min(1.0);
    let lexical = (f64::from(sentiment.abs()) / 5.0).min(1.0);
    (keyword + lexical) / 2.0
}

fn search_terms(emotion: EmotionType, category: &str) -> Vec<String> {
    let mut terms: Vec<String> = emotion.search_terms().iter().map(|s| s.to_string()).collect();
    if category == "Food Wars" {
        terms.extend(emotion.food_search_terms().iter().map(|s| s.to_string()));
    }
    terms
}

/// Score one section of a story.
pub fn analyze_section(content: &str, ctx: &SectionContext<'_>) -> EmotionalAnalysis {
    let clean = preprocess(content);
    let sentiment = lexicon::score(&clean).score;
    let emotion = determine_emotion(&clean, sentiment, ctx);

    EmotionalAnalysis {
        emotion,
        intensity: intensity(sentiment, emotion, ctx.tier),
        confidence: confidence(&clean, emotion, sentiment),
        search_terms: search_terms(emotion, ctx.category),
        caption: emotion.caption().to_string(),
        sentiment_score: sentiment,
    }
}

/// Choose one reaction-image term. Deterministic for a seeded `rng`.
pub fn pick_search_term<'a, R: Rng + ?Sized>(terms: &'a [String], rng: &mut R) -> Option<&'a str> {
    terms.choose(rng).map(String::as_str)
}
