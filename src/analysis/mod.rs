//! Text analysis: everything here is pure and synchronous.
//!
//! - [`quality`]: weighted quality report and publishing gate
//! - [`sentiment`]: per-section emotion and reaction-image terms
//! - [`lexicon`]: word-valence sentiment score used by [`sentiment`]
//! - [`moderation`]: topic blocklists applied before and after generation
//!
//! [`score_story`] combines quality and moderation for a stored story.

pub mod lexicon;
pub mod moderation;
pub mod quality;
pub mod sentiment;

use crate::models::Story;
use serde::Serialize;

pub use moderation::{ModerationResult, Moderator};
pub use quality::{QualityChecker, QualityInput, QualityReport};
pub use sentiment::{EmotionType, EmotionalAnalysis, SectionContext};

/// Quality and moderation verdicts for a finished story, as printed by
/// `threadjuice score`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryScore {
    pub title: String,
    pub category: String,
    pub quality: QualityReport,
    pub moderation: ModerationResult,
}

/// Score a story without its source thread (no social proof).
pub fn score_story(story: &Story, category: &str, checker: &QualityChecker, moderator: &Moderator) -> StoryScore {
    let body = story.body_text();
    let kinds = story.section_kinds();
    let quality = checker.analyze(&QualityInput {
        title: &story.title,
        content: &body,
        sections: &kinds,
        source: story.source_platform.as_deref(),
        category: Some(category),
        ..Default::default()
    });
    let moderation = moderator.moderate(&format!("{} {} {}", story.title, story.excerpt, body));
    StoryScore {
        title: story.title.clone(),
        category: category.to_string(),
        quality,
        moderation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Persona, Platform};
    use crate::outputs::json::write_story;
    use crate::pipeline::enrich::{EnrichContext, enrich};
    use crate::pipeline::generate::{parse_story, parse_story_file, tests::{STORY_JSON, source}};
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_score_story() {
        let story = parse_story(STORY_JSON).unwrap();
        let score = score_story(&story, "Relationship Drama", &QualityChecker::default(), &Moderator::default());
        assert!(score.moderation.is_allowed);
        assert!((0.0..=1.0).contains(&score.quality.overall));
        // No source thread, so social proof sits at its neutral value.
        assert_eq!(score.quality.social_proof, 0.3);

        let mut blocked = story.clone();
        blocked.content.sections[0].content.push_str(" Then the election came up.");
        let score = score_story(&blocked, "Relationship Drama", &QualityChecker::default(), &Moderator::default());
        assert!(!score.moderation.is_allowed);
    }

    #[tokio::test]
    async fn test_stored_story_rescores_like_enrich() {
        let dir = tempfile::tempdir().unwrap();
        let persona = Persona::default();
        let category = Category {
            name: "Relationship Drama".into(),
            slug: "relationship-drama".into(),
            color: "#ec4899".into(),
        };
        let checker = QualityChecker::default();
        let ctx = EnrichContext {
            category: &category,
            persona: &persona,
            checker: &checker,
            max_comments: 6,
            now: Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap(),
        };
        let published = enrich(parse_story(STORY_JSON).unwrap(), &source(), &ctx, &mut StdRng::seed_from_u64(1));
        let path = write_story(&published, dir.path()).await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let (story, stored_category) = parse_story_file(&raw).unwrap();
        assert_eq!(stored_category.as_deref(), Some("Relationship Drama"));
        assert_eq!(story.source_platform.as_deref(), Some("reddit"));

        // Scored against the default category, the category and source bonuses go missing.
        let default_score = score_story(&story, "Viral", &checker, &Moderator::default());
        assert!(default_score.quality.overall < published.quality.overall);

        let score = score_story(&story, "Relationship Drama", &checker, &Moderator::default());
        assert_eq!(score.quality, published.quality);
        assert_eq!(published.source.platform, Platform::Reddit);
    }

    #[test]
    fn test_raw_reply_has_no_stored_category() {
        let (story, category) = parse_story_file(STORY_JSON).unwrap();
        assert!(category.is_none());
        assert_eq!(story, parse_story(STORY_JSON).unwrap());
        assert!(parse_story_file("{\"title\": \"x\"}").is_err());
    }
}
