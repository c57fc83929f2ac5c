use serde::{Deserialize, Serialize};

/// Kind of a line a comment can be anchored to.
///
/// Reviewers and GitLab spell these differently, so the common aliases are
/// accepted when deserializing (`"new"` for added, `"old"` for deleted, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    #[serde(alias = "new")]
    Added,
    #[serde(alias = "old", alias = "removed")]
    Deleted,
    #[serde(alias = "context")]
    Unchanged,
}

impl std::fmt::Display for LineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineKind::Added => write!(f, "added"),
            LineKind::Deleted => write!(f, "deleted"),
            LineKind::Unchanged => write!(f, "unchanged"),
        }
    }
}

impl std::str::FromStr for LineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "added" | "new" => Ok(LineKind::Added),
            "deleted" | "old" | "removed" => Ok(LineKind::Deleted),
            "unchanged" | "context" => Ok(LineKind::Unchanged),
            other => Err(format!("unknown line kind: {other}")),
        }
    }
}

/// What a new-file line corresponds to on the old side.
///
/// `Unpaired` is a definite answer (the line was added), not missing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OldLine {
    Paired(usize),
    Unpaired,
}

impl OldLine {
    pub fn paired(self) -> Option<usize> {
        match self {
            OldLine::Paired(line) => Some(line),
            OldLine::Unpaired => None,
        }
    }
}
