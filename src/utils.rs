//! Small helpers shared across the pipeline.
//!
//! - String truncation for log previews
//! - JSON error classification and code-fence stripping for LLM responses
//! - Slug generation for story file names
//! - File system validation for output directories

use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Longest slug [`create_slug`] produces.
pub const MAX_SLUG_LEN: usize = 60;

/// Truncate a string for logging purposes.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of bytes to keep (rounded down to a char boundary)
///
/// # Returns
///
/// The original string if short enough, otherwise a truncated version with
/// `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated JSON.
///
/// A model response cut off by its token limit fails to parse with an EOF
/// error; those are worth asking for again.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Remove a surrounding markdown code fence (` ```json ... ``` `) if present.
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Convert a title to a URL slug.
///
/// Lowercases, drops anything outside `[a-z0-9 -]`, turns spaces into
/// hyphens, collapses hyphen runs, trims hyphens from both ends, and caps
/// the result at [`MAX_SLUG_LEN`] characters.
///
/// ```ignore
/// assert_eq!(create_slug("AITA for   charging rent?!"), "aita-for-charging-rent");
/// ```
pub fn create_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        let c = match c {
            'a'..='z' | '0'..='9' => c,
            ' ' | '-' => '-',
            _ => continue,
        };
        if c == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(c);
    }

    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a scratch file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch_path = path.join("..__write_check__");
    match stdfs::File::create(&scratch_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        // 'é' is two bytes; cutting at byte 3 would split the second one.
        let result = truncate_for_log("éééé", 3);
        assert_eq!(result, "é…(+6 bytes)");
    }

    #[test]
    fn test_create_slug() {
        assert_eq!(create_slug("Hello World"), "hello-world");
        assert_eq!(create_slug("AITA for   charging rent?!"), "aita-for-charging-rent");
        assert_eq!(create_slug("  -- Leading and trailing --  "), "leading-and-trailing");
        assert_eq!(create_slug("Special@#$Characters"), "specialcharacters");
        assert_eq!(create_slug("Café owner's 'secret' menu"), "caf-owners-secret-menu");
        assert_eq!(create_slug("!!!"), "");
    }

    #[test]
    fn test_create_slug_caps_length() {
        let title = "word ".repeat(30);
        let slug = create_slug(&title);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
        assert!(slug.starts_with("word-word"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
        // Unterminated fence: keep what follows the opening line.
        assert_eq!(strip_code_fences("```json\n{\"a\":"), "{\"a\":");
    }

    #[test]
    fn test_looks_truncated() {
        let err = serde_json::from_str::<serde_json::Value>(r#"{"field": "value"#).unwrap_err();
        assert!(looks_truncated(&err));

        let err = serde_json::from_str::<serde_json::Value>(r#"{"field": nope}"#).unwrap_err();
        assert!(!looks_truncated(&err));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__write_check__").exists());
    }
}
