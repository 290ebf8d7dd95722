//! Keeps the feed light: blocks political, religious, racial and violent
//! content, plus anything on a configurable blocklist.
//!
//! Terms match case-insensitively on word boundaries. Each distinct term hit
//! adds its category weight to a risk score. Strict mode blocks on any hit;
//! lenient mode blocks once the score reaches [`LENIENT_BLOCK_SCORE`]. A
//! configured exception anywhere in the text lets it through regardless.

use crate::config::ModerationConfig;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use tracing::debug;

pub const LENIENT_BLOCK_SCORE: u32 = 20;

const POLITICAL: &[&str] = &[
    "republican", "democrat", "conservative", "liberal", "progressive", "libertarian",
    "socialism", "capitalism", "communist", "fascist", "marxist", "antifa", "maga", "blm",
    "alt-right", "alt-left", "gop", "trump", "biden", "harris", "obama", "clinton", "bush",
    "reagan", "pelosi", "mcconnell", "aoc", "sanders", "warren", "desantis", "pence", "cheney",
    "cruz", "rubio", "schumer", "manchin", "election", "voting", "ballot", "congress", "senate",
    "house of representatives", "impeachment", "filibuster", "gerrymandering", "voter fraud",
    "rigged election", "deep state", "swamp", "establishment", "coup", "insurrection",
    "immigration", "border wall", "deportation", "sanctuary city", "gun control",
    "second amendment", "nra", "assault weapon", "abortion", "roe v wade", "pro-life",
    "pro-choice", "climate change", "green new deal", "fossil fuels", "healthcare", "obamacare",
    "medicare for all", "taxes", "tax cuts", "wealthy tax", "minimum wage",
];

const RELIGIOUS: &[&str] = &[
    "christian", "christianity", "catholic", "protestant", "evangelical", "muslim", "islam",
    "islamic", "jewish", "judaism", "hindu", "hinduism", "buddhist", "buddhism", "sikh",
    "mormon", "scientology", "jesus", "christ", "mohammed", "muhammad", "allah", "buddha",
    "pope", "pastor", "priest", "imam", "rabbi", "guru", "prophet", "bible", "quran", "torah",
    "scripture", "prayer", "worship", "salvation", "heaven", "hell", "sin", "blessed", "holy",
    "church", "mosque", "temple", "synagogue", "cathedral", "crusade", "jihad", "pilgrimage",
    "missionary", "evangelist", "christmas", "easter", "ramadan", "hanukkah", "diwali",
    "passover",
];

const RACIAL: &[&str] = &[
    "race", "racial", "racism", "racist", "white supremacy", "black lives matter", "ethnic",
    "ethnicity", "minority", "majority", "discrimination", "white privilege",
    "systemic racism", "institutional racism", "racial profiling", "hate crime",
    "civil rights", "segregation", "integration", "apartheid", "n-word", "racial slur",
    "ethnic slur",
];

const VIOLENT: &[&str] = &[
    "murder", "kill", "death", "violence", "assault", "abuse", "terrorist", "terrorism", "bomb",
    "shooting", "war", "genocide",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationCategory {
    Political,
    Religious,
    Racial,
    Violent,
    Custom,
}

impl ModerationCategory {
    pub fn weight(self) -> u32 {
        match self {
            ModerationCategory::Political | ModerationCategory::Religious => 10,
            ModerationCategory::Racial => 15,
            ModerationCategory::Violent => 12,
            ModerationCategory::Custom => 8,
        }
    }
}

impl fmt::Display for ModerationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModerationCategory::Political => "political",
            ModerationCategory::Religious => "religious",
            ModerationCategory::Racial => "racial",
            ModerationCategory::Violent => "violent",
            ModerationCategory::Custom => "custom",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationResult {
    pub is_allowed: bool,
    pub blocked_categories: Vec<ModerationCategory>,
    pub score: u32,
    /// Distinct terms that matched, in list order.
    pub flagged_terms: Vec<String>,
}

impl ModerationResult {
    pub fn category_names(&self) -> Vec<String> {
        self.blocked_categories.iter().map(ToString::to_string).collect()
    }
}

struct TermList {
    category: ModerationCategory,
    terms: Vec<(String, Regex)>,
}

impl TermList {
    fn new<S: AsRef<str>>(category: ModerationCategory, terms: &[S]) -> Self {
        let terms = terms
            .iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .filter_map(|t| {
                let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&t))).ok()?;
                Some((t, re))
            })
            .collect();
        Self { category, terms }
    }

    fn hits(&self, text: &str) -> Vec<&str> {
        self.terms
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(t, _)| t.as_str())
            .collect()
    }
}

/// Compiled term lists plus the mode they are applied in.
pub struct Moderator {
    strict: bool,
    lists: Vec<TermList>,
    exceptions: Vec<String>,
}

impl fmt::Debug for Moderator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Moderator")
            .field("strict", &self.strict)
            .field("lists", &self.lists.len())
            .field("exceptions", &self.exceptions)
            .finish()
    }
}

impl Default for Moderator {
    fn default() -> Self {
        Self::new(&ModerationConfig::default())
    }
}

impl Moderator {
    pub fn new(config: &ModerationConfig) -> Self {
        let lists = vec![
            TermList::new(ModerationCategory::Political, POLITICAL),
            TermList::new(ModerationCategory::Religious, RELIGIOUS),
            TermList::new(ModerationCategory::Racial, RACIAL),
            TermList::new(ModerationCategory::Violent, VIOLENT),
            TermList::new(ModerationCategory::Custom, &config.custom_blocklist),
        ];
        Self {
            strict: config.strict_mode,
            lists,
            exceptions: config
                .allowed_exceptions
                .iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn moderate(&self, content: &str) -> ModerationResult {
        let normalized = content.to_lowercase();
        let mut blocked_categories = Vec::new();
        let mut flagged_terms: Vec<String> = Vec::new();
        let mut score = 0;

        for list in &self.lists {
            let hits = list.hits(&normalized);
            if hits.is_empty() {
                continue;
            }
            blocked_categories.push(list.category);
            score += hits.len() as u32 * list.category.weight();
            for term in hits {
                if !flagged_terms.iter().any(|t| t == term) {
                    flagged_terms.push(term.to_string());
                }
            }
        }

        let has_exception = self.exceptions.iter().any(|e| normalized.contains(e));
        let is_allowed = has_exception
            || if self.strict {
                blocked_categories.is_empty()
            } else {
                score < LENIENT_BLOCK_SCORE
            };

        if !is_allowed {
            debug!(score, terms = ?flagged_terms, "Content blocked by moderation");
        }

        ModerationResult {
            is_allowed,
            blocked_categories,
            score,
            flagged_terms,
        }
    }

    pub fn is_safe(&self, content: &str) -> bool {
        self.moderate(content).is_allowed
    }

    /// One-paragraph human-readable verdict.
    pub fn report(&self, content: &str) -> String {
        let result = self.moderate(content);
        if result.is_allowed {
            return "Content approved".to_string();
        }
        format!(
            "Content blocked\nCategories: {}\nRisk score: {}\nFlagged terms: {}",
            result.category_names().join(", "),
            result.score,
            result.flagged_terms.len()
        )
    }
}
