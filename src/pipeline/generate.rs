//! Prompting the model and turning its reply into a validated [`Story`].

use crate::analysis::Moderator;
use crate::error::StoryError;
use crate::llm::AskAsync;
use crate::models::{Persona, Platform, PublishedStory, SourcePost, Story};
use crate::pipeline::enrich::{controversial_comment, segment_post};
use crate::utils::{looks_truncated, strip_code_fences, truncate_for_log};
use std::error::Error;
use std::fmt::Write as _;
use tracing::{info, instrument, warn};

const REDDIT_BODY_CHARS: usize = 2000;
const TWEET_BODY_CHARS: usize = 1000;
const PROMPT_COMMENTS: usize = 3;

fn clip(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// The user message for one story: the source thread and the persona to
/// write it in. Style and output format live in the prompt template.
pub fn build_prompt(post: &SourcePost, persona: &Persona) -> String {
    let mut prompt = String::new();
    // Writing to a String cannot fail.
    match post.platform {
        Platform::Reddit => {
            let _ = writeln!(prompt, "REAL REDDIT POST:");
            let _ = writeln!(prompt, "Title: {}", post.title);
            let _ = writeln!(prompt, "Subreddit: r/{}", post.community.as_deref().unwrap_or("reddit"));
            let _ = writeln!(prompt, "Author: {}", post.username());
            let _ = writeln!(prompt, "Upvotes: {}", post.score);
            let _ = writeln!(prompt, "Comments: {}", post.num_comments);
            let _ = writeln!(prompt, "URL: {}", post.url);

            let segments = segment_post(clip(&post.body, REDDIT_BODY_CHARS));
            let _ = writeln!(prompt, "\nBody:");
            for (i, segment) in segments.iter().enumerate() {
                let _ = writeln!(prompt, "[Part {}]\n{}\n", i + 1, segment);
            }

            if let Some(c) = controversial_comment(post) {
                let _ = writeln!(prompt, "Controversial comment (u/{}, {} points):\n{}\n", c.author, c.score, c.body);
            }
            let top: Vec<_> = post.top_comments.iter().filter(|c| !c.is_submitter).take(PROMPT_COMMENTS).collect();
            if !top.is_empty() {
                let _ = writeln!(prompt, "Top comments:");
                for c in top {
                    let _ = writeln!(prompt, "- u/{} ({} points): {}", c.author, c.score, c.body);
                }
                prompt.push('\n');
            }
        }
        Platform::Twitter => {
            let _ = writeln!(prompt, "REAL TWEET:");
            let _ = writeln!(prompt, "Author: {}", post.username());
            let _ = writeln!(prompt, "Engagement: {} likes and retweets, {} replies", post.score, post.num_comments);
            let _ = writeln!(prompt, "URL: {}", post.url);
            let _ = writeln!(prompt, "\nContent:\n{}\n", clip(&post.body, TWEET_BODY_CHARS));
        }
    }

    let _ = writeln!(prompt, "Writer persona: {} - {}", persona.name, persona.tone);
    let _ = write!(prompt, "Platform: {}", post.platform.to_string().to_uppercase());
    prompt
}

/// Parse a model reply into a [`Story`] and check its structure.
pub fn parse_story(reply: &str) -> Result<Story, StoryError> {
    let story: Story = serde_json::from_str(strip_code_fences(reply))?;
    story.validate()?;
    Ok(story)
}

/// Read a story file for rescoring: a stored [`PublishedStory`] or a raw
/// model reply.
///
/// # Returns
///
/// The story plus the category it was stored under. Raw replies carry no
/// category.
///
/// # Errors
///
/// Whatever [`parse_story`] returns when the text is not a stored story.
pub fn parse_story_file(raw: &str) -> Result<(Story, Option<String>), StoryError> {
    match serde_json::from_str::<PublishedStory>(raw) {
        Ok(stored) => {
            let story = stored.to_story();
            story.validate()?;
            Ok((story, Some(stored.category)))
        }
        Err(_) => parse_story(raw).map(|story| (story, None)),
    }
}

/// Ask the model for a story about `post`.
///
/// A reply cut off mid-JSON is asked for once more. The parsed story gets
/// its source fields from `post` (the model's are not trusted) and must pass
/// `moderator` before it is returned.
///
/// # Errors
///
/// LLM failures after retries, [`StoryError::Parse`] / [`StoryError::Invalid`]
/// for unusable replies, and [`StoryError::Moderated`] for blocked content.
#[instrument(level = "info", skip_all, fields(source = %post.id, platform = %post.platform))]
pub async fn generate_story<A>(
    client: &A,
    post: &SourcePost,
    persona: &Persona,
    moderator: &Moderator,
) -> Result<Story, Box<dyn Error>>
where
    A: AskAsync<Response = String>,
{
    let prompt = build_prompt(post, persona);
    let reply = client.ask(&prompt).await?;

    let mut parsed = parse_story(&reply);
    if let Err(StoryError::Parse(e)) = &parsed {
        if looks_truncated(e) {
            warn!(error = %e, "EOF while parsing; re-asking once");
            let retry = client.ask(&prompt).await?;
            parsed = parse_story(&retry);
        }
    }

    let mut story = match parsed {
        Ok(story) => story,
        Err(e) => {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&reply, 300),
                "Model returned non-conforming story"
            );
            return Err(e.into());
        }
    };

    story.source_url = Some(post.url.clone());
    story.source_username = Some(post.username());
    story.source_platform = Some(post.platform.to_string());

    let verdict = moderator.moderate(&format!("{} {} {}", story.title, story.excerpt, story.body_text()));
    if !verdict.is_allowed {
        warn!(categories = ?verdict.category_names(), "Generated story blocked by moderation");
        return Err(StoryError::Moderated {
            categories: verdict.category_names(),
        }
        .into());
    }

    info!(title = %story.title, sections = story.content.sections.len(), "Story generated");
    Ok(story)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::testing::ScriptedAsk;
    use crate::models::{SectionKind, SourceComment};

    pub(crate) const STORY_JSON: &str = r#"{
        "title": "Man Discovers Roommate Has Been Charging Him Rent for the Hallway",
        "excerpt": "A floor plan, a spreadsheet, and a very long hallway.",
        "sourceUrl": "https://reddit.com/r/AmItheAsshole/comments/xyz123",
        "sourceUsername": "u/throwaway12345",
        "sourcePlatform": "reddit",
        "content": {
            "sections": [
                {"type": "describe-1", "content": "Originally posted by u/hall_renter on r/AmItheAsshole, this one starts with a lease."},
                {"type": "quotes", "content": "The hallway is a shared amenity.", "metadata": {"attribution": "u/hall_renter", "context": "During the negotiation"}},
                {"type": "describe-2", "title": "The Spreadsheet", "content": "Then the spreadsheet arrived, with a tab for each doorway."},
                {"type": "outro", "title": "Where Things Stand", "content": "The hallway is now neutral territory."}
            ]
        }
    }"#;

    pub(crate) fn source() -> SourcePost {
        SourcePost {
            platform: Platform::Reddit,
            id: "abc123".into(),
            title: "AITA for refusing to pay hallway rent?".into(),
            body: "My roommate says the hallway is his. He made a spreadsheet.".into(),
            author: "hall_renter".into(),
            community: Some("AmItheAsshole".into()),
            url: "https://reddit.com/r/AmItheAsshole/comments/abc123/aita/".into(),
            score: 5400,
            num_comments: 1200,
            awards: 3,
            top_comments: vec![
                SourceComment {
                    id: "c1".into(),
                    author: "judge".into(),
                    body: "NTA. Hallways are not rentable.".into(),
                    score: 3000,
                    is_submitter: false,
                    depth: 0,
                },
                SourceComment {
                    id: "c2".into(),
                    author: "contrarian".into(),
                    body: "Honestly the spreadsheet is impressive.".into(),
                    score: -3,
                    is_submitter: false,
                    depth: 0,
                },
            ],
        }
    }

    #[test]
    fn test_build_prompt_reddit() {
        let prompt = build_prompt(&source(), &Persona::default());
        assert!(prompt.contains("Subreddit: r/AmItheAsshole"));
        assert!(prompt.contains("Author: u/hall_renter"));
        assert!(prompt.contains("[Part 1]"));
        assert!(prompt.contains("Controversial comment (u/contrarian, -3 points)"));
        assert!(prompt.contains("- u/judge (3000 points)"));
        assert!(prompt.contains("Writer persona: The Terry"));
        assert!(prompt.ends_with("Platform: REDDIT"));
    }

    #[test]
    fn test_build_prompt_twitter_clips_body() {
        let mut post = source();
        post.platform = Platform::Twitter;
        post.body = "é".repeat(1500);
        let prompt = build_prompt(&post, &Persona::default());
        assert!(prompt.contains("Author: @hall_renter"));
        assert_eq!(prompt.matches('é').count(), TWEET_BODY_CHARS);
        assert!(!prompt.contains("Controversial"));
    }

    #[test]
    fn test_parse_story() {
        let story = parse_story(&format!("```json\n{STORY_JSON}\n```")).unwrap();
        assert_eq!(story.content.sections.len(), 4);
        assert_eq!(story.content.sections[0].kind, SectionKind::Describe(1));

        assert!(matches!(parse_story("not json"), Err(StoryError::Parse(_))));
        assert!(matches!(
            parse_story(r#"{"title": "", "content": {"sections": []}}"#),
            Err(StoryError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_overrides_source_fields() {
        let client = ScriptedAsk::new([Ok(STORY_JSON)]);
        let story = generate_story(&client, &source(), &Persona::default(), &Moderator::default())
            .await
            .unwrap();
        assert_eq!(story.source_username.as_deref(), Some("u/hall_renter"));
        assert_eq!(
            story.source_url.as_deref(),
            Some("https://reddit.com/r/AmItheAsshole/comments/abc123/aita/")
        );
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_generate_reasks_once_on_truncation() {
        let truncated = &STORY_JSON[..STORY_JSON.len() / 2];
        let client = ScriptedAsk::new([Ok(truncated), Ok(STORY_JSON)]);
        let story = generate_story(&client, &source(), &Persona::default(), &Moderator::default())
            .await
            .unwrap();
        assert!(story.title.starts_with("Man Discovers"));
        assert_eq!(client.calls(), 2);

        // A second truncation is not retried.
        let client = ScriptedAsk::new([Ok(truncated), Ok(truncated), Ok(STORY_JSON)]);
        let err = generate_story(&client, &source(), &Persona::default(), &Moderator::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not valid story JSON"));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_generate_does_not_reask_on_syntax_error() {
        let client = ScriptedAsk::new([Ok("{\"title\": nope}"), Ok(STORY_JSON)]);
        let result = generate_story(&client, &source(), &Persona::default(), &Moderator::default()).await;
        assert!(result.is_err());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_generate_blocks_moderated_story() {
        let political = STORY_JSON.replace("neutral territory", "a campaign issue before the election");
        let client = ScriptedAsk::new([Ok(political.as_str())]);
        let err = generate_story(&client, &source(), &Persona::default(), &Moderator::default())
            .await
            .unwrap_err();
        let err = err.downcast::<StoryError>().unwrap();
        assert!(matches!(*err, StoryError::Moderated { ref categories } if categories == &["political"]));
    }
}
