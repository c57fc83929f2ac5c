pub mod gitlab;
pub mod types;

pub use gitlab::GitLabClient;
pub use types::{FileChange, MergeRequestRef, RawDiffRefs};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::position::{DiffRefs, PositionRecord};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("GitLab API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("GitLab API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid merge request URL: {0}")]
    InvalidUrl(String),

    #[error("GitLab token not found in config or environment")]
    MissingToken,

    #[error("Merge request has no {0} revision")]
    MissingRevision(&'static str),

    #[error("GitLab API call timed out after {0:?}")]
    Timeout(Duration),
}

impl HostError {
    /// HTTP status of the failed call, when the host answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            HostError::Status { status, .. } => Some(*status),
            HostError::ApiRequest(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// The source-control host: diff retrieval and comment thread creation.
/// Implementations must be Send + Sync so comments can be posted concurrently.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// Base/start/head revisions of the merge request diff.
    async fn diff_refs(&self, mr: &MergeRequestRef) -> Result<DiffRefs, HostError>;

    /// Every changed file with its unified diff text.
    async fn changes(&self, mr: &MergeRequestRef) -> Result<Vec<FileChange>, HostError>;

    /// Open an inline discussion thread and return its id.
    async fn create_thread(
        &self,
        mr: &MergeRequestRef,
        body: &str,
        position: &PositionRecord,
    ) -> Result<String, HostError>;
}

/// Parse a merge request URL into its project path and iid.
///
/// Expected format: https://{host}/{group}/.../{project}/-/merge_requests/{iid}
/// (the `-` segment is optional, older GitLab versions omit it).
pub fn parse_mr_url(url: &str) -> Result<MergeRequestRef, HostError> {
    let invalid = || HostError::InvalidUrl(url.to_string());
    let parsed = reqwest::Url::parse(url).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|segment| !segment.is_empty())
        .collect();

    let marker = segments
        .iter()
        .position(|segment| *segment == "merge_requests")
        .ok_or_else(invalid)?;
    let project_end = if marker > 0 && segments[marker - 1] == "-" {
        marker - 1
    } else {
        marker
    };
    if project_end < 2 {
        return Err(invalid());
    }

    let iid = segments
        .get(marker + 1)
        .ok_or_else(invalid)?
        .parse::<u64>()
        .map_err(|_| invalid())?;

    Ok(MergeRequestRef {
        project: segments[..project_end].join("/"),
        iid,
    })
}
