//! Story JSON files.
//!
//! ```text
//! output_dir/
//! ├── index.json
//! └── 2026-10-16/
//!     ├── the-egg-ledger.json
//!     └── man-discovers-roommate-charging-hallway-rent.json
//! ```
//!
//! The date directory comes from the story's `created_at` (UTC), so a story
//! lands in the same place no matter where the pipeline runs.

use crate::models::PublishedStory;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Where [`write_story`] puts a story.
pub fn story_path(story: &PublishedStory, output_dir: &Path) -> PathBuf {
    output_dir
        .join(story.created_at.format("%Y-%m-%d").to_string())
        .join(format!("{}.json", story.slug))
}

/// Write a [`PublishedStory`] to `{output_dir}/{date}/{slug}.json`.
///
/// # Returns
///
/// The path written, or an error if directory creation or writing fails.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), slug = %story.slug))]
pub async fn write_story(story: &PublishedStory, output_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(story)?;
    let path = story_path(story, output_dir);

    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create story dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote story JSON");
    Ok(path)
}
