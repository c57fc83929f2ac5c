use serde::Deserialize;

use crate::diff::{self, FileDiff};
use crate::position::DiffRefs;

use super::HostError;

/// Identifies a merge request on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestRef {
    /// Numeric project id or full project path (e.g., "group/sub/project")
    pub project: String,
    /// Project-scoped merge request number
    pub iid: u64,
}

/// One changed file as returned by the "merge request changes" call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileChange {
    pub new_path: String,
    #[serde(default)]
    pub old_path: Option<String>,
    /// Unified diff text without file headers; empty when the host omits it
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
    #[serde(default)]
    pub renamed_file: bool,
}

impl FileChange {
    /// Path shown to the reviewer: the new path, or the old one if it is blank.
    pub fn display_path(&self) -> &str {
        if self.new_path.is_empty() {
            self.old_path.as_deref().unwrap_or_default()
        } else {
            &self.new_path
        }
    }

    pub fn to_file_diff(&self) -> FileDiff {
        FileDiff {
            new_path: self.new_path.clone(),
            old_path: self.old_path.clone().filter(|p| !p.is_empty()),
            is_new: self.new_file,
            is_deleted: self.deleted_file,
            is_renamed: self.renamed_file,
            lines: diff::parse_lines(&self.diff),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChangesResponse {
    #[serde(default)]
    pub changes: Vec<FileChange>,
}

/// `diff_refs` as the host reports them; any of them may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDiffRefs {
    pub base_sha: Option<String>,
    pub start_sha: Option<String>,
    pub head_sha: Option<String>,
}

impl TryFrom<RawDiffRefs> for DiffRefs {
    type Error = HostError;

    fn try_from(raw: RawDiffRefs) -> Result<Self, Self::Error> {
        let present = |sha: Option<String>, name: &'static str| {
            sha.filter(|s| !s.trim().is_empty())
                .ok_or(HostError::MissingRevision(name))
        };
        Ok(DiffRefs {
            base: present(raw.base_sha, "base")?,
            start: present(raw.start_sha, "start")?,
            head: present(raw.head_sha, "head")?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MergeRequestResponse {
    #[serde(default)]
    pub diff_refs: Option<RawDiffRefs>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThreadResponse {
    pub id: String,
}
