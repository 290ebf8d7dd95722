//! Turn a validated [`Story`] plus its source thread into a [`PublishedStory`].
//!
//! Also home to the source-side helpers the prompt is built from: body
//! segmentation and the controversial-comment pick.

use crate::analysis::quality::{QualityChecker, QualityInput, QualityReport};
use crate::analysis::sentiment::{self, SectionContext};
use crate::models::{
    Category, MediaPlaceholder, Persona, PublishStatus, PublishedStory, SectionReaction,
    SourceComment, SourcePost, SourceRef, Story, StoryComment, StoryContent,
};
use crate::utils::create_slug;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use tracing::{debug, info};

const MAX_SEGMENTS: usize = 4;
const SHORT_POST_CHARS: usize = 200;
const SEGMENT_CHARS: usize = 400;
const CONTROVERSIAL_MAX_SCORE: i64 = 5;
const EXCERPT_CHARS: usize = 200;

static MEDIA_URLS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"https?://preview\.redd\.it/\S+",
        r"https?://i\.redd\.it/\S+",
        r"https?://v\.redd\.it/\S+",
        r"https?://reddit\.com/media\S+",
        r"https?://external-preview\.redd\.it/\S+",
        r"(?i)https?://\S*\.(jpg|jpeg|png|gif|webp|mp4|webm)(\?\S*)?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid media url regex"))
    .collect()
});

static EXTRA_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").expect("valid regex"));

static MEDIA_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[MEDIA:\s*type="([^"]+)"\s*query="([^"]+)"\s*context="([^"]+)"\]"#)
        .expect("valid media placeholder regex")
});

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split a post body into 2 to 4 readable chunks.
///
/// Media links are stripped first. Bodies under 200 characters come back as
/// a single chunk; bodies without paragraph breaks are cut at sentence ends
/// into roughly 400-character pieces; otherwise whole paragraphs are grouped.
pub fn segment_post(body: &str) -> Vec<String> {
    let mut content = body.trim().to_string();
    if content.is_empty() {
        return Vec::new();
    }
    for re in MEDIA_URLS.iter() {
        content = re.replace_all(&content, "").into_owned();
    }
    let content = EXTRA_NEWLINES.replace_all(&content, "\n\n").trim().to_string();

    if char_len(&content) < SHORT_POST_CHARS {
        return vec![content];
    }

    let paragraphs: Vec<&str> = content.split("\n\n").filter(|p| !p.trim().is_empty()).collect();

    if paragraphs.len() <= 1 {
        let mut segments = Vec::new();
        let mut current = String::new();
        for sentence in SENTENCE_END.split(&content).filter(|s| !s.trim().is_empty()) {
            if char_len(&current) + char_len(sentence) > SEGMENT_CHARS {
                if !current.is_empty() {
                    segments.push(current.trim().to_string());
                }
                current = format!("{sentence}.");
            } else {
                current.push_str(sentence);
                current.push('.');
            }
        }
        if !current.is_empty() {
            segments.push(current.trim().to_string());
        }
        segments.truncate(MAX_SEGMENTS);
        return segments;
    }

    let target = paragraphs.len().div_ceil(2).clamp(2, MAX_SEGMENTS);
    let size = paragraphs.len().div_ceil(target);
    paragraphs
        .chunks(size)
        .map(|group| group.join("\n\n"))
        .take(MAX_SEGMENTS)
        .collect()
}

/// The lowest-scored comment not written by OP, if it scored under 5.
pub fn controversial_comment(post: &SourcePost) -> Option<&SourceComment> {
    post.top_comments
        .iter()
        .filter(|c| {
            let body = c.body.trim();
            !body.is_empty()
                && body != "[deleted]"
                && body != "[removed]"
                && c.author != post.author
                && !c.is_submitter
        })
        .min_by_key(|c| c.score)
        .filter(|c| c.score < CONTROVERSIAL_MAX_SCORE)
}

/// Every `[MEDIA: ...]` marker, in section order then text order.
/// `position` is the byte offset of the marker within its section.
pub fn parse_media_placeholders(content: &StoryContent) -> Vec<MediaPlaceholder> {
    content
        .sections
        .iter()
        .enumerate()
        .flat_map(|(section_index, section)| {
            MEDIA_PLACEHOLDER
                .captures_iter(&section.content)
                .map(move |caps| MediaPlaceholder {
                    section_index,
                    media_type: caps[1].to_string(),
                    query: caps[2].to_string(),
                    context: caps[3].to_string(),
                    full_match: caps[0].to_string(),
                    position: caps.get(0).map_or(0, |m| m.start()),
                })
        })
        .collect()
}

/// Up to `max` of the source thread's comments, best first. Repeated
/// comment text is kept once.
pub fn story_comments(post: &SourcePost, max: usize) -> Vec<StoryComment> {
    let mut comments: Vec<&SourceComment> = post
        .top_comments
        .iter()
        .filter(|c| !matches!(c.body.trim(), "" | "[deleted]" | "[removed]"))
        .collect();
    comments.sort_by(|a, b| b.score.cmp(&a.score));
    comments
        .into_iter()
        .unique_by(|c| c.body.trim().to_lowercase())
        .take(max)
        .map(|c| StoryComment {
            author: c.author.clone(),
            content: c.body.clone(),
            upvotes: c.score,
            is_op: c.is_submitter || c.author == post.author,
        })
        .collect()
}

/// Per-section emotion and one picked reaction-image term.
pub fn section_reactions<R: Rng + ?Sized>(
    content: &StoryContent,
    category: &Category,
    report: &QualityReport,
    rng: &mut R,
) -> Vec<SectionReaction> {
    let total = content.sections.len();
    content
        .sections
        .iter()
        .enumerate()
        .filter(|(_, s)| s.kind.requires_content() && !s.content.trim().is_empty())
        .filter_map(|(index, section)| {
            let ctx = SectionContext {
                category: &category.name,
                kind: &section.kind,
                index,
                total,
                tier: report.tier,
            };
            let analysis = sentiment::analyze_section(&section.content, &ctx);
            let term = sentiment::pick_search_term(&analysis.search_terms, &mut *rng)?.to_string();
            debug!(index, emotion = %analysis.emotion, term = %term, "Section reaction");
            Some(SectionReaction {
                section_index: index,
                emotion: analysis.emotion,
                intensity: analysis.intensity,
                confidence: analysis.confidence,
                search_term: term,
                caption: analysis.caption,
            })
        })
        .collect()
}

/// Slug for a story title; falls back to the source id when the title has
/// nothing sluggable in it.
pub fn story_slug(title: &str, post: &SourcePost) -> String {
    let slug = create_slug(title);
    if slug.is_empty() {
        format!("story-{}", create_slug(&post.id))
    } else {
        slug
    }
}

fn excerpt(story: &Story) -> String {
    let given = story.excerpt.trim();
    if !given.is_empty() {
        return given.to_string();
    }
    let first = story
        .content
        .sections
        .iter()
        .map(|s| s.content.trim())
        .find(|c| !c.is_empty())
        .unwrap_or("");
    if char_len(first) <= EXCERPT_CHARS {
        return first.to_string();
    }
    let cut: String = first.chars().take(EXCERPT_CHARS).collect();
    match cut.rfind(' ') {
        Some(i) => format!("{}…", &cut[..i]),
        None => format!("{cut}…"),
    }
}

/// Everything [`enrich`] needs besides the story and its source.
#[derive(Debug)]
pub struct EnrichContext<'a> {
    pub category: &'a Category,
    pub persona: &'a Persona,
    pub checker: &'a QualityChecker,
    pub max_comments: usize,
    pub now: DateTime<Utc>,
}

/// Score and decorate a generated story.
pub fn enrich<R: Rng + ?Sized>(
    story: Story,
    post: &SourcePost,
    ctx: &EnrichContext<'_>,
    rng: &mut R,
) -> PublishedStory {
    let body = story.body_text();
    let kinds = story.section_kinds();
    let platform = post.platform.to_string();
    let report = ctx.checker.analyze(&QualityInput {
        title: &story.title,
        content: &body,
        sections: &kinds,
        // Source-thread votes are not page metrics; social proof stays neutral
        // until the published page has views.
        social: None,
        source: Some(platform.as_str()),
        category: Some(ctx.category.name.as_str()),
    });

    let reactions = section_reactions(&story.content, ctx.category, &report, rng);
    let media_placeholders = parse_media_placeholders(&story.content);
    let status = if report.passes_publishing_threshold {
        PublishStatus::Published
    } else {
        PublishStatus::Rejected
    };

    info!(
        title = %story.title,
        overall = report.overall,
        tier = ?report.tier,
        reactions = reactions.len(),
        media = media_placeholders.len(),
        ?status,
        "Story enriched"
    );

    PublishedStory {
        slug: story_slug(&story.title, post),
        excerpt: excerpt(&story),
        category: ctx.category.name.clone(),
        persona: ctx.persona.clone(),
        source: SourceRef {
            platform: post.platform,
            id: post.id.clone(),
            url: post.url.clone(),
            username: post.username(),
            community: post.community.clone(),
        },
        comments: story_comments(post, ctx.max_comments),
        media_placeholders,
        reactions,
        quality: report,
        engagement_score: post.engagement_score(),
        status,
        created_at: ctx.now,
        title: story.title,
        content: story.content,
    }
}
