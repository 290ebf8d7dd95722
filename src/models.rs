//! Data models shared across the pipeline.
//!
//! - [`SourcePost`] / [`SourceComment`]: a scraped thread, normalized across platforms
//! - [`Story`]: what the LLM returns, validated before anything else touches it
//! - [`SectionKind`]: the tagged union over story section types
//! - [`Persona`], [`Category`], [`StoryComment`]: the rows a story references
//! - [`PublishedStory`]: the enriched, scored document written to disk
//!
//! Field names on [`Story`] are camelCase to match the JSON shape the story
//! template asks the model for.

use crate::analysis::quality::QualityReport;
use crate::analysis::sentiment::EmotionType;
use crate::error::StoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a story came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Reddit,
    Twitter,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Reddit => f.write_str("reddit"),
            Platform::Twitter => f.write_str("twitter"),
        }
    }
}

/// A comment on a scraped thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceComment {
    pub id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub is_submitter: bool,
    pub depth: u32,
}

/// A scraped thread, normalized across Reddit and Twitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePost {
    pub platform: Platform,
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: String,
    /// Subreddit name for Reddit posts.
    pub community: Option<String>,
    pub url: String,
    pub score: i64,
    pub num_comments: u64,
    pub awards: u64,
    pub top_comments: Vec<SourceComment>,
}

impl SourcePost {
    /// Title and body, as fed to moderation.
    pub fn moderation_text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }

    /// `score + 3·comments + 100·awards`, the ranking used across sources.
    pub fn engagement_score(&self) -> i64 {
        engagement_score(self.score, self.num_comments, self.awards)
    }

    pub fn username(&self) -> String {
        match self.platform {
            Platform::Reddit => format!("u/{}", self.author),
            Platform::Twitter => format!("@{}", self.author),
        }
    }
}

pub fn engagement_score(score: i64, comments: u64, awards: u64) -> i64 {
    score + 3 * comments as i64 + 100 * awards as i64
}

/// The type of a story section.
///
/// Serialized as the plain strings the story template uses
/// (`"describe-2"`, `"quotes"`, `"comments-1"`, ...). Unknown strings are
/// kept verbatim in [`SectionKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SectionKind {
    Describe(u32),
    Quotes,
    TwitterQuote,
    Comments(u32),
    Discussion,
    Outro,
    Image,
    Other(String),
}

impl SectionKind {
    pub fn is_describe(&self) -> bool {
        matches!(self, SectionKind::Describe(_))
    }

    pub fn is_quote(&self) -> bool {
        matches!(self, SectionKind::Quotes | SectionKind::TwitterQuote)
    }

    pub fn is_comments(&self) -> bool {
        matches!(self, SectionKind::Comments(_))
    }

    /// Sections that must carry prose.
    pub fn requires_content(&self) -> bool {
        !matches!(self, SectionKind::Image)
    }
}

fn numbered(s: &str, prefix: &str) -> Option<u32> {
    if s == prefix {
        return Some(1);
    }
    s.strip_prefix(prefix)?.strip_prefix('-')?.parse().ok()
}

impl From<String> for SectionKind {
    fn from(s: String) -> Self {
        let normalized = s.trim().to_lowercase();
        if let Some(n) = numbered(&normalized, "describe") {
            return SectionKind::Describe(n);
        }
        if let Some(n) = numbered(&normalized, "comments") {
            return SectionKind::Comments(n);
        }
        match normalized.as_str() {
            "quotes" | "quote" => SectionKind::Quotes,
            "twitter-quote" => SectionKind::TwitterQuote,
            "discussion" => SectionKind::Discussion,
            "outro" => SectionKind::Outro,
            "image" => SectionKind::Image,
            _ => SectionKind::Other(s),
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionKind::Describe(n) => write!(f, "describe-{n}"),
            SectionKind::Quotes => f.write_str("quotes"),
            SectionKind::TwitterQuote => f.write_str("twitter-quote"),
            SectionKind::Comments(n) => write!(f, "comments-{n}"),
            SectionKind::Discussion => f.write_str("discussion"),
            SectionKind::Outro => f.write_str("outro"),
            SectionKind::Image => f.write_str("image"),
            SectionKind::Other(s) => f.write_str(s),
        }
    }
}

impl From<SectionKind> for String {
    fn from(kind: SectionKind) -> Self {
        kind.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteMetadata {
    #[serde(default)]
    pub attribution: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub user_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySection {
    #[serde(rename = "type")]
    pub kind: SectionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<QuoteMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryContent {
    pub sections: Vec<StorySection>,
}

/// A story as returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub source_username: Option<String>,
    #[serde(default)]
    pub source_platform: Option<String>,
    pub content: StoryContent,
}

impl Story {
    /// Reject model output that would render as an empty or broken page.
    pub fn validate(&self) -> Result<(), StoryError> {
        if self.title.trim().is_empty() {
            return Err(StoryError::Invalid("empty title".into()));
        }
        if self.content.sections.is_empty() {
            return Err(StoryError::Invalid("no sections".into()));
        }
        for (i, section) in self.content.sections.iter().enumerate() {
            if section.kind.requires_content() && section.content.trim().is_empty() {
                return Err(StoryError::Invalid(format!(
                    "section {i} ({}) has no content",
                    section.kind
                )));
            }
        }
        Ok(())
    }

    /// All section prose joined with blank lines.
    pub fn body_text(&self) -> String {
        self.content
            .sections
            .iter()
            .map(|s| s.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn section_kinds(&self) -> Vec<SectionKind> {
        self.content.sections.iter().map(|s| s.kind.clone()).collect()
    }
}

/// A named writing-style profile applied to generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar: String,
    pub tone: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "The Terry".into(),
            slug: "the-terry".into(),
            bio: "Acerbic, witty, and emotionally intelligent. Weaponises irritation for comedy while staying baffled by modern life.".into(),
            avatar: "/assets/img/personas/the-terry.svg".into(),
            tone: "Acerbic, funny, witty, overstimulated but emotionally intelligent. World-weary, hyper-observant, baffled by modern life. Mixes short clipped sentences with long winding ones. Refers to himself as \"The Terry\" very sparingly.".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub slug: String,
    pub color: String,
}

/// A reader-facing comment attached to a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryComment {
    pub author: String,
    pub content: String,
    pub upvotes: i64,
    pub is_op: bool,
}

/// A `[MEDIA: type="..." query="..." context="..."]` marker in section text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPlaceholder {
    pub section_index: usize,
    pub media_type: String,
    pub query: String,
    pub context: String,
    pub full_match: String,
    pub position: usize,
}

/// The emotional read of one section and the reaction image it calls for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionReaction {
    pub section_index: usize,
    pub emotion: EmotionType,
    pub intensity: f64,
    pub confidence: f64,
    pub search_term: String,
    pub caption: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Published,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub platform: Platform,
    pub id: String,
    pub url: String,
    pub username: String,
    pub community: Option<String>,
}

/// An enriched, scored story ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedStory {
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub category: String,
    pub persona: Persona,
    pub source: SourceRef,
    pub content: StoryContent,
    pub comments: Vec<StoryComment>,
    pub media_placeholders: Vec<MediaPlaceholder>,
    pub reactions: Vec<SectionReaction>,
    pub quality: QualityReport,
    pub engagement_score: i64,
    pub status: PublishStatus,
    pub created_at: DateTime<Utc>,
}

impl PublishedStory {
    /// The story as generated, with its source fields taken from [`SourceRef`].
    pub fn to_story(&self) -> Story {
        Story {
            title: self.title.clone(),
            excerpt: self.excerpt.clone(),
            source_url: Some(self.source.url.clone()),
            source_username: Some(self.source.username.clone()),
            source_platform: Some(self.source.platform.to_string()),
            content: self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_kind_parsing() {
        assert_eq!(SectionKind::from("describe-3".to_string()), SectionKind::Describe(3));
        assert_eq!(SectionKind::from("describe".to_string()), SectionKind::Describe(1));
        assert_eq!(SectionKind::from("Comments-2".to_string()), SectionKind::Comments(2));
        assert_eq!(SectionKind::from("quotes".to_string()), SectionKind::Quotes);
        assert_eq!(SectionKind::from("twitter-quote".to_string()), SectionKind::TwitterQuote);
        assert_eq!(SectionKind::from("outro".to_string()), SectionKind::Outro);
        assert_eq!(
            SectionKind::from("describe-x".to_string()),
            SectionKind::Other("describe-x".to_string())
        );
    }

    #[test]
    fn test_section_kind_serializes_as_string() {
        let section = StorySection {
            kind: SectionKind::Comments(1),
            title: None,
            content: "hot takes".into(),
            metadata: None,
        };
        let json = serde_json::to_string(&section).unwrap();
        assert_eq!(json, r#"{"type":"comments-1","content":"hot takes"}"#);
    }

    #[test]
    fn test_story_deserializes_from_template_shape() {
        let json = r#"{
            "title": "Man Discovers His Roommate Has Been Charging Him Rent For The Hallway",
            "excerpt": "It started with a spreadsheet.",
            "sourceUrl": "https://reddit.com/r/tifu/comments/abc123",
            "sourceUsername": "u/throwaway12345",
            "sourcePlatform": "reddit",
            "content": {
                "sections": [
                    {"type": "describe-1", "content": "Originally posted by u/throwaway12345 on r/tifu."},
                    {"type": "quotes", "content": "The hallway is a shared amenity.",
                     "metadata": {"attribution": "the roommate", "userUrl": "reddit.com/u/roomie"}},
                    {"type": "outro", "title": "Aftermath", "content": "He moved out."}
                ]
            }
        }"#;
        let story: Story = serde_json::from_str(json).unwrap();
        assert!(story.validate().is_ok());
        assert_eq!(
            story.section_kinds(),
            vec![SectionKind::Describe(1), SectionKind::Quotes, SectionKind::Outro]
        );
        let meta = story.content.sections[1].metadata.as_ref().unwrap();
        assert_eq!(meta.user_url.as_deref(), Some("reddit.com/u/roomie"));
    }

    #[test]
    fn test_story_validation_failures() {
        let mut story = Story {
            title: "A title".into(),
            excerpt: String::new(),
            source_url: None,
            source_username: None,
            source_platform: None,
            content: StoryContent { sections: vec![] },
        };
        assert!(matches!(story.validate(), Err(StoryError::Invalid(m)) if m == "no sections"));

        story.content.sections.push(StorySection {
            kind: SectionKind::Describe(1),
            title: None,
            content: "   ".into(),
            metadata: None,
        });
        assert!(story.validate().is_err());

        story.content.sections[0].kind = SectionKind::Image;
        assert!(story.validate().is_ok());

        story.title = " ".into();
        assert!(matches!(story.validate(), Err(StoryError::Invalid(m)) if m == "empty title"));
    }

    #[test]
    fn test_source_post_username() {
        let post = SourcePost {
            platform: Platform::Twitter,
            id: "1".into(),
            title: String::new(),
            body: "tweet".into(),
            author: "dramauser".into(),
            community: None,
            url: "https://twitter.com/dramauser/status/1".into(),
            score: 10,
            num_comments: 0,
            awards: 0,
            top_comments: vec![],
        };
        assert_eq!(post.username(), "@dramauser");
        assert_eq!(post.moderation_text(), " tweet");
    }
}
