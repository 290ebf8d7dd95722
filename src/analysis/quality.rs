//! Content quality scoring.
//!
//! Five sub-scores in `[0, 1]` are combined into an overall quality figure:
//!
//! ```text
//! overall = 0.25·readability + 0.30·engagement + 0.20·narrative
//!         + 0.15·originality + 0.10·social_proof
//! ```
//!
//! Everything here is pure text statistics and keyword matching; the same
//! input always yields the same report. Length statistics are taken with
//! recognized keywords removed, so adding a keyword can only raise the
//! overall score.

use crate::models::SectionKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;

const TRANSITION_WORDS: &[&str] = &[
    "however",
    "meanwhile",
    "furthermore",
    "additionally",
    "consequently",
    "therefore",
    "nevertheless",
    "ultimately",
    "initially",
    "subsequently",
];

const EMOTIONAL_TITLE_WORDS: &[&str] = &[
    "shocking",
    "unbelievable",
    "hilarious",
    "devastating",
    "outrageous",
    "genius",
    "epic",
    "disaster",
    "perfect",
    "insane",
    "brilliant",
    "discovers",
    "mandatory",
    "literally",
    "artisanal",
    "spends",
];

const CONTROVERSY_WORDS: &[&str] = &[
    "drama",
    "controversy",
    "war",
    "battle",
    "fight",
    "clash",
    "debate",
    "outrage",
    "backlash",
    "scandal",
    "meltdown",
    "chaos",
];

const HIGH_ENGAGEMENT_CATEGORIES: &[&str] = &[
    "Food Wars",
    "Relationship Drama",
    "Workplace Drama",
    "Family Drama",
    "Internet Drama",
    "Celebrity Drama",
    "Tech Drama",
];

const COMMENTARY_PHRASES: &[&str] = &[
    "the terry",
    "notes",
    "observes",
    "analysis",
    "fascinating",
    "properly",
    "brilliant",
    "mental",
    "peak internet",
    "honestly",
    "literally",
    "exactly",
    "perfect",
    "dystopian",
    "absurd",
    "artificial",
    "reveals",
    "phenomenon",
    "suggests",
    "fundamentally",
    "accidentally",
    "metaphor",
    "camaraderie",
];

const PERSPECTIVE_PHRASES: &[&str] = &[
    "what really happened",
    "the real story",
    "here's what actually",
    "the thing is",
    "plot twist",
    "turns out",
    "the bigger picture",
    "reveals something deeper",
    "isn't just",
    "that's not just",
];

const VOICE_MARKERS: &[&str] = &[
    "the terry",
    "properly",
    "mental",
    "peak internet",
    "dystopian",
    "artificial",
];

/// Every keyword and phrase the scorers reward, as whole words, longest first.
static KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    let mut words: Vec<&str> = [
        TRANSITION_WORDS,
        EMOTIONAL_TITLE_WORDS,
        CONTROVERSY_WORDS,
        COMMENTARY_PHRASES,
        PERSPECTIVE_PHRASES,
        VOICE_MARKERS,
    ]
    .concat();
    words.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    words.dedup();
    let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("valid keyword regex")
});

fn without_keywords(text: &str) -> Cow<'_, str> {
    KEYWORDS.replace_all(text, " ")
}

/// Characters left once whitespace runs collapse to single spaces.
fn visible_len(text: &str) -> usize {
    let (chars, words) = text
        .split_whitespace()
        .fold((0usize, 0usize), |(chars, words), w| (chars + w.chars().count(), words + 1));
    chars + words.saturating_sub(1)
}

/// Engagement counters from the page a story is published on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialMetrics {
    pub views: u64,
    pub upvotes: u64,
    pub comments: u64,
    pub shares: u64,
    pub bookmarks: u64,
}

/// Everything the checker looks at.
#[derive(Debug, Clone, Default)]
pub struct QualityInput<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub sections: &'a [SectionKind],
    pub social: Option<SocialMetrics>,
    /// `"reddit"`, `"twitter"`, ...
    pub source: Option<&'a str>,
    pub category: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Premium,
    Standard,
    Basic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Expand,
    Standard,
    Shorten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionArea {
    Readability,
    Engagement,
    Narrative,
    Originality,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub area: SuggestionArea,
    pub issue: String,
    pub suggestion: String,
    pub priority: Priority,
    pub target_score: f64,
}

/// Section budget for a tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedStructure {
    pub min_sections: usize,
    pub max_sections: usize,
    pub avg_section_length: usize,
    pub sections: Vec<SectionKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub readability: f64,
    pub engagement: f64,
    pub narrative: f64,
    pub originality: f64,
    pub social_proof: f64,
    pub overall: f64,
    pub tier: QualityTier,
    pub recommended_action: RecommendedAction,
    pub suggestions: Vec<Suggestion>,
    pub passes_publishing_threshold: bool,
}

/// Scores stories against a publishing and a premium threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityChecker {
    publish_threshold: f64,
    premium_threshold: f64,
}

impl Default for QualityChecker {
    fn default() -> Self {
        Self::new(0.70, 0.85)
    }
}

/// Occurrences of `needle` in `haystack`, non-overlapping.
fn occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

fn mean(total: f64, n: usize) -> f64 {
    if n == 0 { 0.0 } else { total / n as f64 }
}

impl QualityChecker {
    pub fn new(publish_threshold: f64, premium_threshold: f64) -> Self {
        Self {
            publish_threshold,
            premium_threshold: premium_threshold.max(publish_threshold),
        }
    }

    pub fn publish_threshold(&self) -> f64 {
        self.publish_threshold
    }

    pub fn analyze(&self, input: &QualityInput<'_>) -> QualityReport {
        let readability = readability(input.content, input.title);
        let engagement = engagement(input);
        let narrative = narrative(input.sections);
        let originality = originality(input.content);
        let social_proof = social_proof(input.social.as_ref());

        let overall = readability * 0.25
            + engagement * 0.3
            + narrative * 0.2
            + originality * 0.15
            + social_proof * 0.1;

        let tier = self.tier(overall);
        let recommended_action =
            recommended_action(overall, input.content.chars().count(), input.sections.len());

        let scores = [readability, engagement, narrative, originality];
        let suggestions = self.suggestions(scores, overall, input);

        QualityReport {
            readability,
            engagement,
            narrative,
            originality,
            social_proof,
            overall,
            tier,
            recommended_action,
            suggestions,
            passes_publishing_threshold: overall >= self.publish_threshold,
        }
    }

    pub fn tier(&self, overall: f64) -> QualityTier {
        if overall >= self.premium_threshold {
            QualityTier::Premium
        } else if overall >= self.publish_threshold {
            QualityTier::Standard
        } else {
            QualityTier::Basic
        }
    }

    /// Whether a story has earned a longer format.
    pub fn allows_extended_length(&self, report: &QualityReport) -> bool {
        match report.tier {
            QualityTier::Premium => true,
            QualityTier::Standard => report.overall > 0.65,
            QualityTier::Basic => false,
        }
    }

    fn suggestions(
        &self,
        [readability, engagement, narrative, originality]: [f64; 4],
        overall: f64,
        input: &QualityInput<'_>,
    ) -> Vec<Suggestion> {
        let mut out = Vec::new();
        let mut push = |area, priority, issue: &str, suggestion: &str, target_score| {
            out.push(Suggestion {
                area,
                issue: issue.to_string(),
                suggestion: suggestion.to_string(),
                priority,
                target_score,
            })
        };

        if readability < 0.5 {
            push(
                SuggestionArea::Readability,
                Priority::High,
                "Poor sentence structure and flow",
                "Rewrite with shorter, punchier sentences (15-20 words). Add transition words like \"meanwhile\", \"however\", \"ultimately\". Break up long paragraphs.",
                0.8,
            );
        } else if readability < 0.75 {
            push(
                SuggestionArea::Readability,
                Priority::Medium,
                "Text flow could be smoother",
                "Add more transition words between paragraphs and vary sentence length. Aim for 100-300 character paragraphs.",
                0.8,
            );
        }

        if engagement < 0.5 {
            push(
                SuggestionArea::Engagement,
                Priority::High,
                "Low viral potential and emotional hooks",
                "Add emotional keywords like \"shocking\", \"unbelievable\", \"genius\", \"disaster\". Build tension around the conflict and the people in it.",
                0.8,
            );
        } else if engagement < 0.75 {
            push(
                SuggestionArea::Engagement,
                Priority::Medium,
                "Needs stronger emotional hooks",
                "Raise the stakes. Add specific details that reveal motivations, or the social media context around the story.",
                0.8,
            );
        }

        if narrative < 0.75 {
            let sections = input.sections;
            if sections.is_empty() {
                push(
                    SuggestionArea::Narrative,
                    Priority::High,
                    "Poor story structure",
                    "Restructure with clear sections: setup, escalation, peak moment with quotes, reactions, bigger picture, resolution.",
                    0.8,
                );
            } else {
                if !sections.iter().any(SectionKind::is_quote) {
                    push(
                        SuggestionArea::Narrative,
                        Priority::High,
                        "Missing dramatic quotes or key moments",
                        "Add a quote section that captures the peak moment of the drama.",
                        0.8,
                    );
                }
                if !sections.iter().any(SectionKind::is_comments) {
                    push(
                        SuggestionArea::Narrative,
                        Priority::Medium,
                        "Missing social proof and reactions",
                        "Add a comments section showing how people reacted: outrage, support and the best one-liners.",
                        0.8,
                    );
                }
                if !sections.contains(&SectionKind::Discussion) {
                    push(
                        SuggestionArea::Narrative,
                        Priority::Medium,
                        "Needs deeper analysis section",
                        "Add a discussion section about what the story says about people or modern life.",
                        0.8,
                    );
                }
            }
        }

        if originality < 0.75 {
            if originality < 0.5 {
                push(
                    SuggestionArea::Voice,
                    Priority::High,
                    "Missing the persona's signature commentary",
                    "Add the persona's observations and sardonic asides on the absurdity of the situation.",
                    0.8,
                );
            } else {
                push(
                    SuggestionArea::Voice,
                    Priority::Medium,
                    "Needs stronger unique perspective",
                    "Amplify the persona's voice with specific observations and metaphors to wider social phenomena.",
                    0.8,
                );
            }

            let lowered = input.content.to_lowercase();
            let markers: usize = VOICE_MARKERS.iter().map(|m| occurrences(&lowered, m)).sum();
            if markers < 3 {
                push(
                    SuggestionArea::Voice,
                    Priority::High,
                    "Insufficient persona markers",
                    "Use more of the persona's recurring phrases and observations.",
                    0.8,
                );
            }
        }

        if overall < self.publish_threshold {
            let issue = format!(
                "Overall quality too low ({}%) for publishing",
                (overall * 100.0).round()
            );
            push(
                SuggestionArea::Originality,
                Priority::High,
                issue.as_str(),
                "Focus on the high priority items above. Make sure the story has clear stakes and consequences.",
                self.publish_threshold,
            );
        }

        // Stable, so equal priorities keep their discovery order.
        out.sort_by(|a, b| b.priority.cmp(&a.priority));
        out
    }
}

fn readability(content: &str, title: &str) -> f64 {
    let mut score = 0.0;
    let plain = without_keywords(content);

    let sentence_words: Vec<usize> = plain
        .split(['.', '!', '?'])
        .map(|s| s.split_whitespace().count())
        .filter(|&n| n > 0)
        .collect();
    let avg_sentence = mean(sentence_words.iter().sum::<usize>() as f64, sentence_words.len());
    score += if (15.0..=20.0).contains(&avg_sentence) {
        0.3
    } else if (10.0..=25.0).contains(&avg_sentence) {
        0.2
    } else {
        0.1
    };

    let paragraphs: Vec<usize> = plain
        .split("\n\n")
        .map(visible_len)
        .filter(|&len| len > 0)
        .collect();
    let avg_paragraph = mean(paragraphs.iter().sum::<usize>() as f64, paragraphs.len());
    if (100.0..=300.0).contains(&avg_paragraph) {
        score += 0.25;
    } else if (50.0..=400.0).contains(&avg_paragraph) {
        score += 0.15;
    }

    let title_words = without_keywords(title).split_whitespace().count();
    if (6..=12).contains(&title_words) {
        score += 0.2;
    } else if (4..=15).contains(&title_words) {
        score += 0.1;
    }

    let lowered = content.to_lowercase();
    let transitions: usize = TRANSITION_WORDS
        .iter()
        .map(|w| occurrences(&lowered, w))
        .sum();
    if transitions >= 3 {
        score += 0.25;
    } else if transitions >= 1 {
        score += 0.15;
    }

    f64::min(score, 1.0)
}

fn engagement(input: &QualityInput<'_>) -> f64 {
    let title = input.title.to_lowercase();
    let content = input.content.to_lowercase();
    let mut score = 0.0;

    let emotional = EMOTIONAL_TITLE_WORDS
        .iter()
        .filter(|w| title.contains(*w))
        .count();
    score += f64::min(emotional as f64 * 0.15, 0.3);

    let controversy = CONTROVERSY_WORDS
        .iter()
        .filter(|w| title.contains(*w) || content.contains(*w))
        .count();
    score += f64::min(controversy as f64 * 0.1, 0.25);

    if matches!(input.source, Some("reddit" | "twitter" | "twitter_drama")) {
        score += 0.2;
    }

    if input
        .category
        .is_some_and(|c| HIGH_ENGAGEMENT_CATEGORIES.contains(&c))
    {
        score += 0.15;
    }

    if (1500..=4000).contains(&visible_len(&without_keywords(input.content))) {
        score += 0.1;
    }

    f64::min(score, 1.0)
}

fn narrative(sections: &[SectionKind]) -> f64 {
    if sections.is_empty() {
        return 0.0;
    }
    let mut score = 0.0;

    let kinds: BTreeSet<&SectionKind> = sections.iter().collect();
    if kinds.len() >= 4 {
        score += 0.3;
    } else if kinds.len() >= 3 {
        score += 0.2;
    }

    if kinds.iter().any(|k| k.is_quote()) {
        score += 0.15;
    }
    if kinds.contains(&SectionKind::Comments(1)) || kinds.contains(&SectionKind::Comments(2)) {
        score += 0.15;
    }
    if kinds.contains(&SectionKind::Discussion) {
        score += 0.1;
    }
    if kinds.contains(&SectionKind::Outro) {
        score += 0.1;
    }

    let describes = sections.iter().filter(|k| k.is_describe()).count();
    if (2..=4).contains(&describes) {
        score += 0.2;
    }

    f64::min(score, 1.0)
}

fn originality(content: &str) -> f64 {
    let lowered = content.to_lowercase();
    let mut score = 0.5;

    let commentary: usize = COMMENTARY_PHRASES
        .iter()
        .map(|p| occurrences(&lowered, p))
        .sum();
    score += f64::min(commentary as f64 * 0.1, 0.3);

    if PERSPECTIVE_PHRASES.iter().any(|p| lowered.contains(p)) {
        score += 0.2;
    }

    f64::min(score, 1.0)
}

fn social_proof(metrics: Option<&SocialMetrics>) -> f64 {
    let Some(m) = metrics else {
        return 0.3;
    };
    let mut score = 0.0;

    let views = m.views;
    if views > 5000 {
        score += 0.3;
    } else if views > 1000 {
        score += 0.2;
    } else if views > 500 {
        score += 0.1;
    }

    let rate = |n: u64| if views > 0 { n as f64 / views as f64 } else { 0.0 };

    let engagement_rate = rate(m.upvotes + m.comments + m.shares + m.bookmarks);
    if engagement_rate > 0.1 {
        score += 0.3;
    } else if engagement_rate > 0.05 {
        score += 0.2;
    } else if engagement_rate > 0.02 {
        score += 0.1;
    }

    let keep_rate = rate(m.shares + m.bookmarks);
    if keep_rate > 0.05 {
        score += 0.2;
    } else if keep_rate > 0.02 {
        score += 0.1;
    }

    let comment_rate = rate(m.comments);
    if comment_rate > 0.03 {
        score += 0.2;
    } else if comment_rate > 0.01 {
        score += 0.1;
    }

    f64::min(score, 1.0)
}

fn recommended_action(overall: f64, content_len: usize, section_count: usize) -> RecommendedAction {
    if overall >= 0.8 && section_count < 6 {
        RecommendedAction::Expand
    } else if overall < 0.5 && content_len > 2000 {
        RecommendedAction::Shorten
    } else {
        RecommendedAction::Standard
    }
}

/// Section plan for a given quality tier.
pub fn recommended_structure(tier: QualityTier) -> RecommendedStructure {
    use SectionKind::*;

    let mut sections = vec![Describe(1), Quotes, Describe(2), Outro];
    let (min_sections, max_sections, avg_section_length) = match tier {
        QualityTier::Premium => {
            sections.extend([Image, TwitterQuote, Comments(1), Discussion, Comments(2)]);
            (3, 12, 800)
        }
        QualityTier::Standard => {
            sections.extend([Comments(1), Discussion]);
            (3, 8, 500)
        }
        QualityTier::Basic => (2, 6, 300),
    };

    RecommendedStructure {
        min_sections,
        max_sections,
        avg_section_length,
        sections,
    }
}
