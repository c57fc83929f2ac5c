use serde::Serialize;

use crate::reconcile::SkippedComment;

/// A comment that became a discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostedComment {
    /// Position of the comment in the reviewer's output
    pub ordinal: usize,
    /// Thread id returned by the host
    pub thread_id: String,
    pub new_path: String,
    pub new_line: Option<usize>,
    pub old_line: Option<usize>,
    /// Claimed line, when the comment was moved to a visible line
    pub snapped_from: Option<usize>,
    pub best_effort: bool,
}

/// A positioned comment the host refused or never answered for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPosting {
    pub ordinal: usize,
    pub new_path: String,
    /// HTTP status, when the host answered
    pub status: Option<u16>,
    /// Error message, including the host's response body
    pub message: String,
}

/// Result of submitting one positioned comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Posted(PostedComment),
    Failed(FailedPosting),
}

impl Submission {
    pub fn ordinal(&self) -> usize {
        match self {
            Submission::Posted(posted) => posted.ordinal,
            Submission::Failed(failed) => failed.ordinal,
        }
    }
}

/// Per-comment outcome of a review pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewManifest {
    pub posted: Vec<PostedComment>,
    pub skipped: Vec<SkippedComment>,
    pub failed: Vec<FailedPosting>,
}

impl ReviewManifest {
    /// True when every candidate comment was posted.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.posted.len() + self.skipped.len() + self.failed.len()
    }
}

impl std::fmt::Display for ReviewManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} posted, {} skipped, {} failed",
            self.posted.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}
