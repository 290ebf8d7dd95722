//! Word-valence sentiment scoring.
//!
//! A small AFINN-style lexicon maps words to integer valences in `-5..=5`.
//! A text's score is the sum of the valences of its tokens; a token directly
//! after a negator ("not", "never", "don't", ...) counts with its sign
//! flipped.

use once_cell::sync::Lazy;
use std::collections::HashMap;

#[rustfmt::skip]
const AFINN: &[(&str, i32)] = &[
    // negative
    ("abandon", -2), ("abuse", -3), ("absurd", -1), ("accident", -2), ("accuse", -2),
    ("afraid", -2), ("aggressive", -2), ("agony", -3), ("alarm", -2), ("anger", -3),
    ("angry", -3), ("annoyed", -2), ("annoying", -2), ("anxious", -2), ("argue", -2),
    ("argument", -2), ("arrogant", -2), ("ashamed", -2), ("awful", -3), ("awkward", -2),
    ("bad", -3), ("betray", -3), ("betrayed", -3), ("bitter", -2), ("blame", -2),
    ("boring", -3), ("broke", -1), ("broken", -1), ("bully", -2), ("chaos", -2),
    ("cheat", -3), ("cheated", -3), ("clash", -2), ("complain", -2), ("confused", -2),
    ("crazy", -2), ("cringe", -2), ("crisis", -3), ("cruel", -3), ("cry", -1),
    ("damn", -4), ("dead", -3), ("destroy", -3), ("destroyed", -3), ("disappointed", -2),
    ("disaster", -2), ("disgusting", -3), ("dishonest", -2), ("disrespect", -2), ("drama", -2),
    ("dumb", -3), ("embarrassed", -2), ("embarrassing", -2), ("enraged", -2), ("evil", -3),
    ("fail", -2), ("failed", -2), ("fake", -3), ("fear", -2), ("fight", -1),
    ("fired", -2), ("fool", -2), ("frustrated", -2), ("furious", -3), ("gross", -2),
    ("guilty", -3), ("hate", -3), ("hated", -3), ("horrible", -3), ("hurt", -2),
    ("idiot", -3), ("ignored", -2), ("insane", -2), ("jealous", -2), ("liar", -3),
    ("lie", -2), ("lied", -2), ("lonely", -2), ("loser", -3), ("mad", -3),
    ("mess", -2), ("miserable", -3), ("nasty", -3), ("nightmare", -3), ("outrage", -3),
    ("painful", -2), ("panic", -3), ("pathetic", -2), ("problem", -2), ("rage", -2),
    ("rude", -2), ("ruined", -2), ("sad", -2), ("scandal", -3), ("scared", -2),
    ("selfish", -3), ("shame", -2), ("shocked", -2), ("sick", -2), ("stupid", -2),
    ("terrible", -3), ("toxic", -3), ("ugly", -3), ("unfair", -2), ("upset", -2),
    ("worried", -3), ("worse", -3), ("worst", -3), ("wrong", -2), ("yikes", -2),
    // positive
    ("agree", 1), ("amazing", 4), ("amused", 3), ("awesome", 4), ("beautiful", 3),
    ("best", 3), ("better", 2), ("brave", 2), ("brilliant", 4), ("calm", 2),
    ("celebrate", 3), ("cheer", 2), ("clever", 2), ("cool", 1), ("cute", 2),
    ("delight", 3), ("delighted", 3), ("delicious", 3), ("enjoy", 2), ("excellent", 3),
    ("excited", 3), ("fantastic", 4), ("fascinating", 3), ("fine", 2), ("fun", 4),
    ("funny", 4), ("genius", 3), ("glad", 3), ("good", 3), ("great", 3),
    ("happy", 3), ("hero", 2), ("hilarious", 2), ("honest", 2), ("hope", 2),
    ("impressed", 3), ("incredible", 3), ("kind", 2), ("laugh", 1), ("legend", 3),
    ("like", 2), ("love", 3), ("loved", 3), ("lucky", 3), ("magnificent", 3),
    ("nice", 3), ("perfect", 3), ("pleased", 3), ("proud", 2), ("relief", 1),
    ("respect", 2), ("satisfied", 2), ("spectacular", 3), ("success", 2), ("support", 2),
    ("sweet", 2), ("thank", 2), ("thanks", 2), ("top", 2), ("win", 4),
    ("winner", 4), ("wonderful", 4), ("wow", 4), ("yay", 3), ("yes", 1),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "nobody", "nothing", "neither", "nor", "don't", "doesn't",
    "didn't", "isn't", "wasn't", "aren't", "weren't", "can't", "cannot", "won't",
    "wouldn't", "shouldn't", "couldn't",
];

static LEXICON: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| AFINN.iter().copied().collect());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentimentScore {
    /// Sum of token valences.
    pub score: i32,
    /// `score` divided by the number of tokens.
    pub comparative: f64,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

/// Lowercased word tokens; apostrophes stay inside words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn valence(word: &str) -> Option<i32> {
    LEXICON.get(word).copied()
}

pub fn score(text: &str) -> SentimentScore {
    let tokens = tokenize(text);
    let mut result = SentimentScore::default();

    for (i, token) in tokens.iter().enumerate() {
        let Some(mut v) = valence(token) else {
            continue;
        };
        if i > 0 && NEGATORS.contains(&tokens[i - 1].as_str()) {
            v = -v;
        }
        result.score += v;
        if v > 0 {
            result.positive.push(token.clone());
        } else if v < 0 {
            result.negative.push(token.clone());
        }
    }

    if !tokens.is_empty() {
        result.comparative = f64::from(result.score) / tokens.len() as f64;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sums_valences() {
        let s = score("What an amazing, hilarious mess.");
        assert_eq!(s.score, 4 + 2 - 2);
        assert_eq!(s.positive, vec!["amazing", "hilarious"]);
        assert_eq!(s.negative, vec!["mess"]);
        assert!((s.comparative - 4.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_negation_flips_sign() {
        assert_eq!(score("this is good").score, 3);
        assert_eq!(score("this is not good").score, -3);
        assert_eq!(score("I don't hate it").score, 3);
    }

    #[test]
    fn test_unknown_words_are_neutral() {
        let s = score("The quarterly spreadsheet arrived on Tuesday");
        assert_eq!(s.score, 0);
        assert!(s.positive.is_empty() && s.negative.is_empty());
        assert_eq!(score("").comparative, 0.0);
    }

    #[test]
    fn test_tokenize_keeps_contractions() {
        assert_eq!(tokenize("Don't 'quote' me!"), vec!["don't", "quote", "me"]);
    }
}
