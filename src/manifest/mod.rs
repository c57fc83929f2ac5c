pub mod types;

pub use types::{FailedPosting, PostedComment, ReviewManifest, Submission};

use tracing::debug;

use crate::reconcile::SkippedComment;

/// Merge skipped comments and submission outcomes into a manifest.
/// Every list is sorted by ordinal, so the manifest does not depend on the
/// order in which concurrent submissions finished.
pub fn build(mut skipped: Vec<SkippedComment>, submissions: Vec<Submission>) -> ReviewManifest {
    let mut manifest = ReviewManifest::default();
    for submission in submissions {
        match submission {
            Submission::Posted(posted) => manifest.posted.push(posted),
            Submission::Failed(failed) => manifest.failed.push(failed),
        }
    }

    skipped.sort_by_key(|s| s.ordinal);
    manifest.skipped = skipped;
    manifest.posted.sort_by_key(|p| p.ordinal);
    manifest.failed.sort_by_key(|f| f.ordinal);

    debug!(
        posted = manifest.posted.len(),
        skipped = manifest.skipped.len(),
        failed = manifest.failed.len(),
        "built review manifest"
    );
    manifest
}
