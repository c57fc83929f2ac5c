pub mod types;

pub use types::{
    Anchor, BestEffortPolicy, CandidateComment, ReconcileOptions, ReconciledComment,
    Reconciliation, SkipReason, SkippedComment, SnapPolicy,
};

use regex::Regex;
use tracing::{debug, info};

use crate::index::{DiffIndex, FileIndex, LineKind, OldLine};
use crate::position::PositionKind;

/// Matches the "[Lines 15-25]" marker reviewers put in comment bodies.
static LINE_SPAN_RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"\[Lines?\s+(\d+)\s*-\s*(\d+)\]").unwrap()
});

/// Resolve every candidate comment against the diff index.
///
/// Comments keep their reviewer order; nothing is deduplicated. The result
/// only depends on the inputs, so running it twice gives the same answer.
pub fn reconcile(
    candidates: &[CandidateComment],
    index: &DiffIndex,
    options: &ReconcileOptions,
) -> Reconciliation {
    let mut outcome = Reconciliation::default();

    for (ordinal, candidate) in candidates.iter().enumerate() {
        match reconcile_one(ordinal, candidate, index, options) {
            Ok(comment) => {
                debug!(
                    ordinal,
                    path = %comment.new_path,
                    new_line = ?comment.anchor.new_line,
                    old_line = ?comment.anchor.old_line,
                    snapped_from = ?comment.snapped_from,
                    best_effort = comment.best_effort,
                    "reconciled comment"
                );
                outcome.accepted.push(comment);
            }
            Err(reason) => {
                info!(ordinal, path = ?candidate.new_path, line = ?candidate.line, %reason, "skipping comment");
                outcome.skipped.push(SkippedComment {
                    ordinal,
                    new_path: candidate.new_path.clone(),
                    line: candidate.line,
                    reason,
                });
            }
        }
    }

    outcome
}

fn reconcile_one(
    ordinal: usize,
    candidate: &CandidateComment,
    index: &DiffIndex,
    options: &ReconcileOptions,
) -> Result<ReconciledComment, SkipReason> {
    let new_path = required_text(&candidate.new_path).ok_or(SkipReason::MissingField("new_path"))?;
    let line = candidate
        .line
        .filter(|line| *line > 0)
        .ok_or(SkipReason::MissingField("line"))?;
    let body = required_text(&candidate.comment).ok_or(SkipReason::MissingField("comment"))?;

    let position_kind = candidate.position_kind.unwrap_or_default();
    if position_kind != PositionKind::Text {
        return Err(SkipReason::UnsupportedPositionKind(position_kind));
    }

    let mut comment = ReconciledComment {
        ordinal,
        new_path: new_path.to_string(),
        old_path: candidate.old_path.clone(),
        body: body.to_string(),
        position_kind,
        anchor: Anchor {
            kind: candidate.kind,
            new_line: Some(line),
            old_line: candidate.old_line,
        },
        range_end: None,
        snapped_from: None,
        best_effort: false,
    };

    // No diff for this file (too large, binary or unparseable upstream)
    let Some(file) = index.file(new_path) else {
        permit(options, SkipReason::NoAddressableLine)?;
        if candidate.kind == Some(LineKind::Deleted) {
            comment.anchor = deleted_anchor(candidate, line);
        }
        comment.best_effort = true;
        return Ok(comment);
    };

    if comment.old_path.is_none() {
        comment.old_path = file.old_path.clone();
    }

    // A deleted file has only an old side and a new file only a new side
    let deleted = file.is_deleted
        || (!file.is_new
            && match candidate.kind {
                Some(kind) => kind == LineKind::Deleted,
                None => file.kinds.get(line) == Some(LineKind::Deleted),
            });
    if deleted {
        comment.anchor = deleted_anchor(candidate, line);
        if let Some(old_line) = comment.anchor.old_line {
            if !file.kinds.is_deleted(old_line) {
                permit(options, SkipReason::UnresolvedOldLine)?;
                comment.best_effort = true;
            }
        }
        return Ok(comment);
    }

    let anchor_line = if file.visible.contains(line) {
        line
    } else {
        let snapped = match options.snap {
            SnapPolicy::NearestAbove => file.visible.nearest_at_or_below(line),
            SnapPolicy::Drop => None,
        };
        let snapped = snapped.ok_or(SkipReason::NoAddressableLine)?;
        comment.snapped_from = Some(line);
        snapped
    };

    // Hints describe the claimed line, so they only apply when it was not moved
    let (kind_hint, old_line_hint) = match comment.snapped_from {
        None if !file.is_new => (candidate.kind, candidate.old_line),
        _ => (None, None),
    };

    let kind = match kind_hint.or_else(|| file.kinds.get_new(anchor_line)) {
        Some(kind) => Some(kind),
        None => {
            permit(options, SkipReason::UnresolvedKind)?;
            comment.best_effort = true;
            None
        }
    };

    let old_line = match kind {
        Some(LineKind::Added) => None,
        Some(_) => match old_line_hint.or_else(|| paired_old_line(file, anchor_line)) {
            Some(old_line) => Some(old_line),
            None => {
                permit(options, SkipReason::UnresolvedOldLine)?;
                comment.best_effort = true;
                None
            }
        },
        None => old_line_hint,
    };

    comment.anchor = Anchor {
        kind,
        new_line: Some(anchor_line),
        old_line,
    };
    comment.range_end = range_end(candidate, body, anchor_line, file);
    Ok(comment)
}

/// Deleted lines are anchored on the old side only: the claimed line is the
/// old line number unless the reviewer supplied one explicitly.
fn deleted_anchor(candidate: &CandidateComment, line: usize) -> Anchor {
    Anchor {
        kind: Some(LineKind::Deleted),
        new_line: None,
        old_line: Some(candidate.old_line.unwrap_or(line)),
    }
}

fn paired_old_line(file: &FileIndex, new_line: usize) -> Option<usize> {
    file.correspondence.get(new_line).and_then(OldLine::paired)
}

/// Last line of a multi-line comment, clamped to the visible lines.
fn range_end(
    candidate: &CandidateComment,
    body: &str,
    anchor_line: usize,
    file: &FileIndex,
) -> Option<Anchor> {
    let end = candidate.end_line.or_else(|| line_span(body).map(|(_, end)| end))?;
    let end = file.visible.nearest_at_or_below(end)?;
    if end <= anchor_line {
        return None;
    }
    Some(Anchor {
        kind: file.kinds.get_new(end),
        new_line: Some(end),
        old_line: paired_old_line(file, end),
    })
}

/// Parse a "[Lines X-Y]" marker out of a comment body.
pub fn line_span(body: &str) -> Option<(usize, usize)> {
    let captures = LINE_SPAN_RE.captures(body)?;
    let start = captures.get(1)?.as_str().parse().ok()?;
    let end = captures.get(2)?.as_str().parse().ok()?;
    Some((start, end))
}

fn permit(options: &ReconcileOptions, reason: SkipReason) -> Result<(), SkipReason> {
    match options.best_effort {
        BestEffortPolicy::Allow => Ok(()),
        BestEffortPolicy::Reject => Err(reason),
    }
}

fn required_text(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
