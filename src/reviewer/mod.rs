//! The reviewer seam: what it is shown and how its answer is read back.

use std::collections::BTreeMap;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ReviewConfig;
use crate::host::FileChange;
use crate::reconcile::CandidateComment;

#[derive(Debug, Error)]
pub enum ReviewerError {
    #[error("Reviewer failed: {0}")]
    Failed(String),

    #[error("Invalid ignore pattern: {0}")]
    IgnorePattern(#[from] regex::Error),
}

/// Everything the reviewer needs to produce anchored comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewRequest {
    /// Formatted diff blocks, see `format_diff`
    pub diff_text: String,
    /// New-file lines that can carry a comment, per file
    pub visible_lines: BTreeMap<String, Vec<usize>>,
}

/// Produces candidate comments for a merge request diff.
/// Must be Send + Sync so a review pass can be driven from any task.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> Result<Vec<CandidateComment>, ReviewerError>;
}

/// Pick the files the reviewer gets to see: ignored paths are dropped, then
/// at most `max_files` are kept in host order.
pub fn select_for_review<'a>(
    changes: &'a [FileChange],
    config: &ReviewConfig,
) -> Result<Vec<&'a FileChange>, ReviewerError> {
    let ignore = config
        .ignore_patterns
        .iter()
        .map(|pattern| Regex::new(pattern))
        .collect::<Result<Vec<_>, _>>()?;

    let selected: Vec<_> = changes
        .iter()
        .filter(|change| {
            let path = change.display_path();
            let ignored = ignore.iter().any(|re| re.is_match(path));
            if ignored {
                debug!(path, "ignoring file for review");
            }
            !ignored
        })
        .take(config.max_files)
        .collect();
    Ok(selected)
}

/// Render diffs as fenced blocks:
///
/// File: src/lib.rs
/// ```diff
/// @@ -1,2 +1,3 @@
/// ...
/// ```
///
/// Each diff is cut to `max_lines` lines. Returns a placeholder when
/// nothing is left to show.
pub fn format_diff(changes: &[&FileChange], max_lines: usize) -> String {
    let blocks: Vec<String> = changes
        .iter()
        .filter_map(|change| {
            let diff = change.diff.trim_end();
            if diff.trim().is_empty() {
                return None;
            }
            let total = diff.lines().count();
            let mut shown: Vec<&str> = diff.lines().take(max_lines).collect();
            if total > max_lines {
                shown.push("... (diff truncated)");
            }
            Some(format!(
                "File: {}\n```diff\n{}\n```\n",
                change.display_path(),
                shown.join("\n")
            ))
        })
        .collect();

    if blocks.is_empty() {
        "No changes found in the diff".to_string()
    } else {
        blocks.join("\n")
    }
}

/// Content inside markdown code fences; the closing fence must start a line.
static FENCE_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").unwrap());

/// Start of an array of objects, as opposed to a "[Lines 3-5]" marker.
static ARRAY_START_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"\[\s*\{").unwrap());

/// Read candidate comments back out of free-form reviewer output.
///
/// Tries fenced blocks (last first) and the whole text, then the last array
/// of objects embedded in prose. A `{"comments": [...]}` wrapper is accepted
/// too. Elements that are not comment objects are dropped with a warning.
/// Returns an empty list when no array is found.
pub fn extract_candidates(text: &str) -> Vec<CandidateComment> {
    let Some(items) = find_comment_array(text) else {
        warn!(
            preview = %text.chars().take(120).collect::<String>(),
            "no comment array in reviewer output"
        );
        return Vec::new();
    };

    let comments: Vec<CandidateComment> = items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value(item) {
            Ok(comment) => Some(comment),
            Err(err) => {
                warn!(element = i, error = %err, "dropping unreadable reviewer comment");
                None
            }
        })
        .collect();
    debug!(comments = comments.len(), "extracted reviewer comments");
    comments
}

fn find_comment_array(text: &str) -> Option<Vec<serde_json::Value>> {
    let mut fenced: Vec<&str> = FENCE_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|inner| inner.as_str().trim())
        .filter(|inner| !inner.is_empty())
        .collect();
    fenced.reverse();

    fenced
        .into_iter()
        .chain([text.trim()])
        .find_map(parse_array)
        .or_else(|| last_embedded_array(text))
}

/// The last top-level `[{...}]` in the text that parses as JSON. Parsing
/// stops at the end of the array, so prose after it is ignored.
fn last_embedded_array(text: &str) -> Option<Vec<serde_json::Value>> {
    let mut found = None;
    let mut resume = 0;
    for start in ARRAY_START_RE.find_iter(text).map(|m| m.start()) {
        if start < resume {
            continue;
        }
        let mut stream =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<Vec<serde_json::Value>>();
        if let Some(Ok(items)) = stream.next() {
            resume = start + stream.byte_offset();
            found = Some(items);
        }
    }
    found
}

fn parse_array(candidate: &str) -> Option<Vec<serde_json::Value>> {
    match serde_json::from_str::<serde_json::Value>(candidate).ok()? {
        serde_json::Value::Array(items) => Some(items),
        serde_json::Value::Object(mut wrapper) => match wrapper.remove("comments")? {
            serde_json::Value::Array(items) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(path: &str, diff: &str) -> FileChange {
        FileChange {
            new_path: path.to_string(),
            old_path: Some(path.to_string()),
            diff: diff.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_for_review_applies_ignore_patterns_and_limit() {
        let changes = vec![
            change("Cargo.lock", "@@ -1 +1 @@\n-a\n+b\n"),
            change("web/dist/app.js", "@@ -1 +1 @@\n-a\n+b\n"),
            change("src/a.rs", "@@ -1 +1 @@\n-a\n+b\n"),
            change("src/b.rs", "@@ -1 +1 @@\n-a\n+b\n"),
            change("src/c.rs", "@@ -1 +1 @@\n-a\n+b\n"),
        ];
        let config = ReviewConfig {
            max_files: 2,
            ..ReviewConfig::default()
        };
        let selected = select_for_review(&changes, &config).unwrap();
        let paths: Vec<_> = selected.iter().map(|c| c.new_path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.rs", "src/b.rs"]);
    }

    #[test]
    fn test_select_for_review_rejects_bad_pattern() {
        let config = ReviewConfig {
            ignore_patterns: vec!["(".to_string()],
            ..ReviewConfig::default()
        };
        assert!(matches!(
            select_for_review(&[], &config),
            Err(ReviewerError::IgnorePattern(_))
        ));
    }

    #[test]
    fn test_format_diff_blocks() {
        let a = change("a.py", "@@ -1,1 +1,2 @@\n x\n+y\n");
        let empty = change("b.py", "");
        let text = format_diff(&[&a, &empty], 300);
        assert_eq!(text, "File: a.py\n```diff\n@@ -1,1 +1,2 @@\n x\n+y\n```\n");
    }

    #[test]
    fn test_format_diff_truncates() {
        let a = change("a.py", "@@ -1,1 +1,3 @@\n x\n+y\n+z\n");
        let text = format_diff(&[&a], 2);
        assert!(text.contains(" x\n... (diff truncated)"));
        assert!(!text.contains("+z"));
    }

    #[test]
    fn test_format_diff_placeholder() {
        assert_eq!(format_diff(&[], 10), "No changes found in the diff");
    }

    #[test]
    fn test_extract_candidates_from_fenced_block() {
        let output = "Here is my review.\n```json\n[{\"new_path\": \"a.py\", \"line\": \"2\", \"comment\": \"AI Review [Lines 2-3]: x\"}]\n```\nThanks!";
        let comments = extract_candidates(output);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].new_path.as_deref(), Some("a.py"));
        assert_eq!(comments[0].line, Some(2));
    }

    #[test]
    fn test_extract_candidates_prefers_last_fence() {
        let output = "```json\n[{\"new_path\": \"draft.py\", \"line\": 1}]\n```\nrevised:\n```json\n[{\"new_path\": \"final.py\", \"line\": 1}]\n```";
        let comments = extract_candidates(output);
        assert_eq!(comments[0].new_path.as_deref(), Some("final.py"));
    }

    #[test]
    fn test_extract_candidates_bare_and_wrapped() {
        let bare = extract_candidates("[{\"new_path\": \"a.py\", \"line\": 4, \"comment\": \"x\"}]");
        assert_eq!(bare.len(), 1);
        let wrapped = extract_candidates("{\"comments\": [{\"new_path\": \"a.py\"}]}");
        assert_eq!(wrapped.len(), 1);
        let inline = extract_candidates("Comments: [{\"new_path\": \"a.py\", \"line\": 1}] done");
        assert_eq!(inline.len(), 1);
    }

    #[test]
    fn test_extract_candidates_ignores_line_markers_in_prose() {
        let output = "I checked [Lines 1-3] first.\n[{\"new_path\":\"a.py\",\"line\":2,\"comment\":\"x\"}]";
        let comments = extract_candidates(output);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].line, Some(2));
    }

    #[test]
    fn test_extract_candidates_takes_last_inline_array() {
        let output = "draft: [{\"new_path\": \"a.py\", \"line\": 1}]\nfinal: [{\"new_path\": \"b.py\", \"line\": 1, \"comment\": \"[Lines 1-2] y\"}] done";
        let comments = extract_candidates(output);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].new_path.as_deref(), Some("b.py"));
    }

    #[test]
    fn test_extract_candidates_skips_nested_arrays() {
        let output = "Result: [{\"new_path\": \"a.py\", \"line\": 1, \"extra\": [{\"k\": 1}]}, {\"new_path\": \"c.py\", \"line\": 2}]";
        let comments = extract_candidates(output);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[1].new_path.as_deref(), Some("c.py"));
    }

    #[test]
    fn test_extract_candidates_drops_non_objects() {
        let comments = extract_candidates("[{\"new_path\": \"a.py\"}, \"stray\", 3]");
        assert_eq!(comments.len(), 1);
    }

    #[test]
    fn test_extract_candidates_without_json() {
        assert!(extract_candidates("Looks good to me.").is_empty());
        assert!(extract_candidates("").is_empty());
    }
}
