use serde::{Deserialize, Deserializer, Serialize};

use crate::index::LineKind;
use crate::position::PositionKind;

/// A comment as claimed by the reviewer.
///
/// Every field is optional here: reviewer output is free-form and the
/// reconciler reports whatever is missing instead of failing to parse.
/// Numbers may arrive as strings ("12") and are accepted either way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateComment {
    #[serde(default)]
    pub new_path: Option<String>,
    #[serde(default, alias = "new_line", deserialize_with = "lenient_line")]
    pub line: Option<usize>,
    #[serde(default, alias = "body")]
    pub comment: Option<String>,
    #[serde(default)]
    pub old_path: Option<String>,
    #[serde(default, alias = "type", deserialize_with = "lenient_parse")]
    pub kind: Option<LineKind>,
    #[serde(default, deserialize_with = "lenient_line")]
    pub old_line: Option<usize>,
    #[serde(default, deserialize_with = "lenient_line")]
    pub end_line: Option<usize>,
    #[serde(default, alias = "position_type", deserialize_with = "lenient_parse")]
    pub position_kind: Option<PositionKind>,
}

/// Any JSON value, with numbers and strings kept.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseField {
    Number(u64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

fn lenient_line<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LooseField>::deserialize(deserializer)? {
        Some(LooseField::Number(n)) => usize::try_from(n).ok(),
        Some(LooseField::Text(s)) => s.trim().parse().ok(),
        Some(LooseField::Other(_)) | None => None,
    })
}

fn lenient_parse<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
{
    Ok(match Option::<LooseField>::deserialize(deserializer)? {
        Some(LooseField::Text(s)) => s.parse().ok(),
        _ => None,
    })
}

/// What to do with a claimed line that is not visible in the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapPolicy {
    /// Move the comment to the closest visible line at or above it
    #[default]
    NearestAbove,
    /// Skip the comment
    Drop,
}

/// Whether a comment whose kind or old line cannot be resolved is still posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BestEffortPolicy {
    /// Post with whatever could be resolved and flag it
    #[default]
    Allow,
    /// Skip the comment
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ReconcileOptions {
    #[serde(default)]
    pub snap: SnapPolicy,
    #[serde(default)]
    pub best_effort: BestEffortPolicy,
}

/// A resolved line on one or both sides of the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub kind: Option<LineKind>,
    pub new_line: Option<usize>,
    pub old_line: Option<usize>,
}

/// A comment that passed validation and has a concrete anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledComment {
    /// Position of the comment in the reviewer's output (0-based)
    pub ordinal: usize,
    pub new_path: String,
    pub old_path: Option<String>,
    pub body: String,
    pub position_kind: PositionKind,
    pub anchor: Anchor,
    /// Last line of a multi-line comment
    pub range_end: Option<Anchor>,
    /// The claimed line, when the anchor was moved to a visible line
    pub snapped_from: Option<usize>,
    /// Kind or old line could not be resolved
    pub best_effort: bool,
}

/// Why a candidate comment was not positioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    MissingField(&'static str),
    UnsupportedPositionKind(PositionKind),
    NoAddressableLine,
    UnresolvedKind,
    UnresolvedOldLine,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingField(field) => write!(f, "missing_field({field})"),
            SkipReason::UnsupportedPositionKind(kind) => {
                write!(f, "unsupported_position_kind({kind})")
            }
            SkipReason::NoAddressableLine => write!(f, "no_addressable_line"),
            SkipReason::UnresolvedKind => write!(f, "unresolved_kind"),
            SkipReason::UnresolvedOldLine => write!(f, "unresolved_old_line"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedComment {
    pub ordinal: usize,
    pub new_path: Option<String>,
    pub line: Option<usize>,
    /// Serialized inline as `reason` plus an optional `detail`
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Outcome of one reconciliation pass, in reviewer order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub accepted: Vec<ReconciledComment>,
    pub skipped: Vec<SkippedComment>,
}
