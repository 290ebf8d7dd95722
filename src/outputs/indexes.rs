//! `index.json`: one entry per stored story.
//!
//! The index is read, updated and rewritten on every store, which is fine for
//! a single sequential pipeline. It doubles as the duplicate check: a source
//! thread already in the index is not turned into a second story, and a new
//! story never takes a slug that belongs to another source.

use crate::models::{Platform, PublishedStory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub const INDEX_FILE: &str = "index.json";

/// Summary row for one stored story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub slug: String,
    pub title: String,
    pub category: String,
    /// Overall quality score at the time of storing.
    pub quality: f64,
    pub platform: Platform,
    pub source_id: String,
    /// Relative to the output directory.
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory copy of `index.json`, newest story first.
///
/// Load it, query or [`upsert`](StoryIndex::upsert), then [`save`](StoryIndex::save);
/// nothing is written back implicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryIndex {
    pub stories: Vec<IndexEntry>,
}

impl StoryIndex {
    /// `{output_dir}/index.json`.
    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(INDEX_FILE)
    }

    /// Read the index, or an empty one if none has been written yet.
    ///
    /// # Errors
    ///
    /// I/O errors other than a missing file, and malformed JSON.
    #[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
    pub async fn load(output_dir: &Path) -> Result<Self, Box<dyn Error>> {
        let path = Self::path(output_dir);
        match fs::read_to_string(&path).await {
            Ok(raw) => {
                let index: StoryIndex = serde_json::from_str(&raw)?;
                debug!(entries = index.stories.len(), "Loaded story index");
                Ok(index)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the index as pretty JSON, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Any I/O or serialization failure.
    #[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
    pub async fn save(&self, output_dir: &Path) -> Result<(), Box<dyn Error>> {
        fs::create_dir_all(output_dir).await?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(output_dir), json).await?;
        info!(entries = self.stories.len(), "Wrote story index");
        Ok(())
    }

    /// Whether a story from this source thread is already stored.
    pub fn contains_source(&self, platform: Platform, source_id: &str) -> bool {
        self.stories
            .iter()
            .any(|e| e.platform == platform && e.source_id == source_id)
    }

    pub fn contains_slug(&self, slug: &str) -> bool {
        self.stories.iter().any(|e| e.slug == slug)
    }

    /// Source ids already stored for `platform`.
    pub fn source_ids(&self, platform: Platform) -> HashSet<String> {
        self.stories
            .iter()
            .filter(|e| e.platform == platform)
            .map(|e| e.source_id.clone())
            .collect()
    }

    /// `slug`, or `slug-2`, `slug-3`, ... if another source already has it.
    pub fn unique_slug(&self, slug: &str, platform: Platform, source_id: &str) -> String {
        let taken_by_other = |candidate: &str| {
            self.stories.iter().any(|e| {
                e.slug == candidate && !(e.platform == platform && e.source_id == source_id)
            })
        };
        if !taken_by_other(slug) {
            return slug.to_string();
        }
        (2..)
            .map(|n| format!("{slug}-{n}"))
            .find(|candidate| !taken_by_other(candidate))
            .unwrap_or_else(|| slug.to_string())
    }

    /// Add or replace the entry for `story`. Entries for the same source or
    /// the same slug are replaced; the newest entry goes first.
    pub fn upsert(&mut self, story: &PublishedStory, output_dir: &Path, written: &Path) {
        let path = written
            .strip_prefix(output_dir)
            .unwrap_or(written)
            .to_string_lossy()
            .replace('\\', "/");

        let before = self.stories.len();
        self.stories.retain(|e| {
            e.slug != story.slug
                && !(e.platform == story.source.platform && e.source_id == story.source.id)
        });
        if self.stories.len() < before {
            warn!(slug = %story.slug, "Replacing existing index entry");
        }

        self.stories.insert(
            0,
            IndexEntry {
                slug: story.slug.clone(),
                title: story.title.clone(),
                category: story.category.clone(),
                quality: story.quality.overall,
                platform: story.source.platform,
                source_id: story.source.id.clone(),
                path,
                created_at: story.created_at,
            },
        );
    }
}

/// Read-modify-write `index.json` for a freshly written story.
#[instrument(level = "info", skip_all, fields(slug = %story.slug))]
pub async fn update_story_index(
    output_dir: &Path,
    story: &PublishedStory,
    written: &Path,
) -> Result<(), Box<dyn Error>> {
    let mut index = StoryIndex::load(output_dir).await?;
    index.upsert(story, output_dir, written);
    index.save(output_dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::json::tests::published;
    use crate::outputs::json::write_story;

    #[tokio::test]
    async fn test_update_story_index_creates_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();

        assert!(StoryIndex::load(out).await.unwrap().stories.is_empty());

        let first = published("hallway-rent", "abc123");
        let path = write_story(&first, out).await.unwrap();
        update_story_index(out, &first, &path).await.unwrap();

        let second = published("egg-ledger", "def456");
        let path = write_story(&second, out).await.unwrap();
        update_story_index(out, &second, &path).await.unwrap();

        // Regenerating the first source replaces its entry.
        let mut again = published("hallway-rent-redux", "abc123");
        again.title = "Hallway, again".into();
        let path = write_story(&again, out).await.unwrap();
        update_story_index(out, &again, &path).await.unwrap();

        let index = StoryIndex::load(out).await.unwrap();
        let slugs: Vec<&str> = index.stories.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["hallway-rent-redux", "egg-ledger"]);
        assert_eq!(index.stories[0].path, "2026-10-16/hallway-rent-redux.json");
        assert!(index.contains_source(Platform::Reddit, "abc123"));
        assert!(!index.contains_source(Platform::Twitter, "abc123"));
        assert!(index.contains_slug("egg-ledger"));
        assert_eq!(
            index.source_ids(Platform::Reddit),
            HashSet::from(["abc123".to_string(), "def456".to_string()])
        );
    }

    #[test]
    fn test_unique_slug() {
        let mut index = StoryIndex::default();
        let out = Path::new("/out");
        let story = published("egg-ledger", "abc123");
        index.upsert(&story, out, Path::new("/out/2026-10-16/egg-ledger.json"));

        assert_eq!(index.unique_slug("egg-ledger", Platform::Reddit, "abc123"), "egg-ledger");
        assert_eq!(index.unique_slug("egg-ledger", Platform::Reddit, "zzz999"), "egg-ledger-2");

        let taken = published("egg-ledger-2", "zzz999");
        index.upsert(&taken, out, Path::new("/out/2026-10-16/egg-ledger-2.json"));
        assert_eq!(index.unique_slug("egg-ledger", Platform::Twitter, "t1"), "egg-ledger-3");
        assert_eq!(index.unique_slug("fresh", Platform::Reddit, "zzz999"), "fresh");
    }
}
