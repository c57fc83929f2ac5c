//! Final position payloads for inline merge request comments.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::index::LineKind;
use crate::reconcile::{Anchor, ReconciledComment};

/// What a discussion position points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionKind {
    #[default]
    Text,
    Image,
    File,
}

impl std::fmt::Display for PositionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionKind::Text => write!(f, "text"),
            PositionKind::Image => write!(f, "image"),
            PositionKind::File => write!(f, "file"),
        }
    }
}

impl std::str::FromStr for PositionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(PositionKind::Text),
            "image" => Ok(PositionKind::Image),
            "file" => Ok(PositionKind::File),
            other => Err(format!("unknown position type: {other}")),
        }
    }
}

/// The three revisions a merge request diff is computed from.
/// Fetched once per merge request and shared by every position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRefs {
    pub base: String,
    pub start: String,
    pub head: String,
}

/// One end of a multi-line range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeEndpoint {
    /// Identifies the diff line to the host, see `line_code`
    pub line_code: String,
    /// "new" for added lines, "old" otherwise
    #[serde(rename = "type")]
    pub side: &'static str,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

impl RangeEndpoint {
    pub fn new(path: &str, anchor: &Anchor) -> Self {
        Self {
            line_code: line_code(path, anchor.old_line, anchor.new_line),
            side: match anchor.kind {
                Some(LineKind::Added) => "new",
                _ => "old",
            },
            old_line: anchor.old_line,
            new_line: anchor.new_line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: RangeEndpoint,
    pub end: RangeEndpoint,
}

/// GitLab's diff line identifier: `<sha1(path)>_<old_line>_<new_line>`,
/// with 0 for a side the line does not exist on.
pub fn line_code(path: &str, old_line: Option<usize>, new_line: Option<usize>) -> String {
    let digest = hex::encode(Sha1::digest(path.as_bytes()));
    format!(
        "{digest}_{}_{}",
        old_line.unwrap_or_default(),
        new_line.unwrap_or_default()
    )
}

/// Where an inline comment attaches, serialized with the host's field names.
///
/// `new_line`/`old_line` are always emitted (as `null` when absent): the host
/// tells added, removed and unchanged lines apart by which of them is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionRecord {
    #[serde(rename = "position_type")]
    pub position_kind: PositionKind,
    #[serde(rename = "base_sha")]
    pub base_revision: String,
    #[serde(rename = "start_sha")]
    pub start_revision: String,
    #[serde(rename = "head_sha")]
    pub head_revision: String,
    pub new_path: String,
    pub old_path: String,
    pub new_line: Option<usize>,
    pub old_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_range: Option<LineRange>,
}

/// Combine a reconciled comment with the merge request's diff refs.
pub fn build_position(comment: &ReconciledComment, refs: &DiffRefs) -> PositionRecord {
    let line_range = comment.range_end.as_ref().map(|end| LineRange {
        start: RangeEndpoint::new(&comment.new_path, &comment.anchor),
        end: RangeEndpoint::new(&comment.new_path, end),
    });

    PositionRecord {
        position_kind: comment.position_kind,
        base_revision: refs.base.clone(),
        start_revision: refs.start.clone(),
        head_revision: refs.head.clone(),
        new_path: comment.new_path.clone(),
        old_path: comment
            .old_path
            .clone()
            .unwrap_or_else(|| comment.new_path.clone()),
        new_line: comment.anchor.new_line,
        old_line: comment.anchor.old_line,
        line_range,
    }
}
