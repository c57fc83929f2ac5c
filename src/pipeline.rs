//! One review pass over a merge request: fetch, review, position, post.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::config::{Config, SubmitConfig};
use crate::diff::FileDiff;
use crate::host::{FileChange, HostApi, HostError, MergeRequestRef};
use crate::index::DiffIndex;
use crate::manifest::{self, FailedPosting, PostedComment, ReviewManifest, Submission};
use crate::position::{build_position, DiffRefs, PositionRecord};
use crate::reconcile::{self, CandidateComment, ReconcileOptions, ReconciledComment, SkippedComment};
use crate::reviewer::{self, ReviewRequest, Reviewer, ReviewerError};

#[derive(Debug, Error)]
pub enum PassError {
    #[error("Cannot position comments without diff refs: {0}")]
    DiffRefs(#[source] HostError),

    #[error("Failed to fetch merge request changes: {0}")]
    Changes(#[source] HostError),

    #[error(transparent)]
    Reviewer(#[from] ReviewerError),
}

/// A reconciled comment together with its final position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedComment {
    pub comment: ReconciledComment,
    pub position: PositionRecord,
}

/// Run a full review pass.
///
/// Diff refs are fetched first: without them no position can be built, so
/// their absence fails the pass before the reviewer is even asked.
#[instrument(skip_all, fields(project = %mr.project, iid = mr.iid))]
pub async fn review_pass(
    host: Arc<dyn HostApi>,
    reviewer: &dyn Reviewer,
    mr: &MergeRequestRef,
    config: &Config,
) -> Result<ReviewManifest, PassError> {
    info!("fetching diff refs");
    let refs = host.diff_refs(mr).await.map_err(PassError::DiffRefs)?;

    info!("fetching changes");
    let changes = host.changes(mr).await.map_err(PassError::Changes)?;
    info!(files = changes.len(), "fetched changes");

    let files: Vec<FileDiff> = changes.iter().map(FileChange::to_file_diff).collect();
    let index = DiffIndex::build(&files);

    let request = review_request(&changes, &index, config)?;
    info!(files = request.visible_lines.len(), "requesting review");
    let candidates = reviewer.review(&request).await?;
    info!(candidates = candidates.len(), "received candidate comments");

    Ok(post_candidates(host, mr, &refs, &index, &candidates, config).await)
}

/// Build what the reviewer is shown: selected diffs plus their visible lines.
pub fn review_request(
    changes: &[FileChange],
    index: &DiffIndex,
    config: &Config,
) -> Result<ReviewRequest, ReviewerError> {
    let selected = reviewer::select_for_review(changes, &config.review)?;
    let selected_paths: BTreeSet<&str> = selected.iter().map(|c| c.new_path.as_str()).collect();
    let visible_lines = index
        .visible_table()
        .into_iter()
        .filter(|(path, _)| selected_paths.contains(path.as_str()))
        .collect();

    Ok(ReviewRequest {
        diff_text: reviewer::format_diff(&selected, config.review.max_lines_per_file),
        visible_lines,
    })
}

/// Reconcile candidates, position them and post every accepted one.
pub async fn post_candidates(
    host: Arc<dyn HostApi>,
    mr: &MergeRequestRef,
    refs: &DiffRefs,
    index: &DiffIndex,
    candidates: &[CandidateComment],
    config: &Config,
) -> ReviewManifest {
    let (positioned, skipped) = position_comments(candidates, index, refs, &config.positioning);
    info!(
        accepted = positioned.len(),
        skipped = skipped.len(),
        "reconciled comments"
    );
    let submissions = submit_all(host, mr, positioned, &config.submit).await;
    let manifest = manifest::build(skipped, submissions);
    info!(%manifest, "review pass finished");
    manifest
}

/// Pure part of the pass: reconcile and build positions.
pub fn position_comments(
    candidates: &[CandidateComment],
    index: &DiffIndex,
    refs: &DiffRefs,
    options: &ReconcileOptions,
) -> (Vec<PositionedComment>, Vec<SkippedComment>) {
    let outcome = reconcile::reconcile(candidates, index, options);
    let positioned = outcome
        .accepted
        .into_iter()
        .map(|comment| PositionedComment {
            position: build_position(&comment, refs),
            comment,
        })
        .collect();
    (positioned, outcome.skipped)
}

/// Post every positioned comment, at most `max_concurrent` at a time.
///
/// Each call is independent: a failure is recorded for that comment and the
/// others carry on. Dropping the returned future aborts outstanding calls.
pub async fn submit_all(
    host: Arc<dyn HostApi>,
    mr: &MergeRequestRef,
    comments: Vec<PositionedComment>,
    settings: &SubmitConfig,
) -> Vec<Submission> {
    let semaphore = Arc::new(Semaphore::new(permit_count(settings.max_concurrent)));
    let timeout = settings.timeout();
    let mut pending: Vec<(usize, String)> = Vec::with_capacity(comments.len());
    let mut join_set = JoinSet::new();

    for PositionedComment { comment, position } in comments {
        pending.push((comment.ordinal, comment.new_path.clone()));
        let host = Arc::clone(&host);
        let semaphore = Arc::clone(&semaphore);
        let mr = mr.clone();
        let span = info_span!("submit", ordinal = comment.ordinal, path = %comment.new_path);

        join_set.spawn(
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return failed(&comment, None, "submission cancelled".to_string());
                };
                debug!("posting comment");
                let result =
                    tokio::time::timeout(timeout, host.create_thread(&mr, &comment.body, &position))
                        .await
                        .unwrap_or(Err(HostError::Timeout(timeout)));
                match result {
                    Ok(thread_id) => {
                        info!(thread = %thread_id, "posted comment");
                        Submission::Posted(PostedComment {
                            ordinal: comment.ordinal,
                            thread_id,
                            new_path: comment.new_path,
                            new_line: position.new_line,
                            old_line: position.old_line,
                            snapped_from: comment.snapped_from,
                            best_effort: comment.best_effort,
                        })
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to post comment");
                        failed(&comment, err.status(), err.to_string())
                    }
                }
            }
            .instrument(span),
        );
    }

    let mut submissions = Vec::with_capacity(pending.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(submission) => submissions.push(submission),
            Err(err) => warn!(error = %err, "submission task did not finish"),
        }
    }

    // Tasks that panicked still get an entry
    for (ordinal, new_path) in pending {
        if !submissions.iter().any(|s| s.ordinal() == ordinal) {
            submissions.push(Submission::Failed(FailedPosting {
                ordinal,
                new_path,
                status: None,
                message: "submission task did not finish".to_string(),
            }));
        }
    }
    submissions
}

fn permit_count(max_concurrent: usize) -> usize {
    max_concurrent.clamp(1, Semaphore::MAX_PERMITS)
}

fn failed(comment: &ReconciledComment, status: Option<u16>, message: String) -> Submission {
    Submission::Failed(FailedPosting {
        ordinal: comment.ordinal,
        new_path: comment.new_path.clone(),
        status,
        message,
    })
}
