//! Anchors reviewer comments on GitLab merge request diffs.
//!
//! A review pass fetches the merge request diff, asks a [`Reviewer`] for
//! comments, snaps each comment onto a line GitLab can address and posts it
//! as an inline discussion thread. The outcome of every comment ends up in a
//! [`ReviewManifest`].

pub mod config;
pub mod diff;
pub mod host;
pub mod index;
pub mod manifest;
pub mod pipeline;
pub mod position;
pub mod reconcile;
pub mod reviewer;

pub use config::Config;
pub use host::{GitLabClient, HostApi, HostError, MergeRequestRef};
pub use index::{DiffIndex, LineKind};
pub use manifest::ReviewManifest;
pub use pipeline::{post_candidates, review_pass, PassError};
pub use position::{build_position, DiffRefs, PositionRecord};
pub use reconcile::{reconcile, CandidateComment, ReconcileOptions};
pub use reviewer::{Reviewer, ReviewerError};
