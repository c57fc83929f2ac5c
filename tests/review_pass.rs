use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mr_anchor::config::Config;
use mr_anchor::diff::{parse_patch, FileDiff};
use mr_anchor::host::{FileChange, HostApi, HostError, MergeRequestRef};
use mr_anchor::index::{DiffIndex, LineKind};
use mr_anchor::manifest::ReviewManifest;
use mr_anchor::position::{DiffRefs, PositionRecord};
use mr_anchor::reconcile::{BestEffortPolicy, CandidateComment, SkipReason};
use mr_anchor::reviewer::{extract_candidates, ReviewRequest, Reviewer, ReviewerError};
use mr_anchor::pipeline::{review_pass, PassError};

const CHANGES: &str = include_str!("fixtures/mr_changes.json");
const PATCH: &str = include_str!("fixtures/sample_diff.patch");

const REVIEW_OUTPUT: &str = r#"I looked at the changes.

```json
[
  {"new_path": "src/app.py", "line": 2, "comment": "Prefer one import per line."},
  {"new_path": "src/app.py", "line": "10", "comment": "main() never returns a status."},
  {"new_path": "src/app.py", "line": 23, "comment": "[Lines 23-24] z is unused."},
  {"new_path": "src/app.py", "line": 2, "type": "deleted", "comment": "sys was still used."},
  {"new_path": "docs/old.md", "line": 1, "comment": "Is this documented elsewhere?"},
  {"new_path": "src/helpers.rs", "line": 5, "comment": "Missing doc comment."},
  {"new_path": "src/app.py", "comment": "No line here."},
  {"new_path": "assets/logo.png", "line": 1, "comment": "Binary change."},
  {"new_path": "src/ghost.py", "line": 3, "comment": "File not in the diff."},
  {"new_path": "src/app.py", "line": 4, "position_type": "image", "comment": "Image note."}
]
```"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn changes() -> Vec<FileChange> {
    serde_json::from_str(CHANGES).unwrap()
}

fn mr() -> MergeRequestRef {
    MergeRequestRef {
        project: "group/app".to_string(),
        iid: 7,
    }
}

#[derive(Default)]
struct FakeHost {
    missing_refs: bool,
    reject_path: Option<String>,
    threads: Mutex<Vec<(String, PositionRecord)>>,
}

#[async_trait]
impl HostApi for FakeHost {
    async fn diff_refs(&self, _mr: &MergeRequestRef) -> Result<DiffRefs, HostError> {
        if self.missing_refs {
            return Err(HostError::MissingRevision("head"));
        }
        Ok(DiffRefs {
            base: "aaa111".to_string(),
            start: "bbb222".to_string(),
            head: "ccc333".to_string(),
        })
    }

    async fn changes(&self, _mr: &MergeRequestRef) -> Result<Vec<FileChange>, HostError> {
        Ok(changes())
    }

    async fn create_thread(
        &self,
        _mr: &MergeRequestRef,
        body: &str,
        position: &PositionRecord,
    ) -> Result<String, HostError> {
        if self.reject_path.as_deref() == Some(position.new_path.as_str()) {
            return Err(HostError::Status {
                status: 400,
                body: "{\"message\":\"400 Bad request - Note {:line_code=>[\\\"can't be blank\\\"]}\"}"
                    .to_string(),
            });
        }
        let mut threads = self.threads.lock().unwrap();
        threads.push((body.to_string(), position.clone()));
        Ok(format!("d{}", threads.len()))
    }
}

/// Replies with canned text and remembers what it was shown.
struct FakeReviewer {
    output: Result<&'static str, &'static str>,
    called: AtomicBool,
    seen: Mutex<Option<ReviewRequest>>,
}

impl FakeReviewer {
    fn answering(output: &'static str) -> Self {
        Self {
            output: Ok(output),
            called: AtomicBool::new(false),
            seen: Mutex::new(None),
        }
    }

    fn failing(message: &'static str) -> Self {
        Self {
            output: Err(message),
            called: AtomicBool::new(false),
            seen: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Reviewer for FakeReviewer {
    async fn review(&self, request: &ReviewRequest) -> Result<Vec<CandidateComment>, ReviewerError> {
        self.called.store(true, Ordering::SeqCst);
        *self.seen.lock().unwrap() = Some(request.clone());
        match self.output {
            Ok(text) => Ok(extract_candidates(text)),
            Err(message) => Err(ReviewerError::Failed(message.to_string())),
        }
    }
}

fn ordinals<T>(items: &[T], ordinal: impl Fn(&T) -> usize) -> Vec<usize> {
    items.iter().map(ordinal).collect()
}

async fn run(host: Arc<FakeHost>, reviewer: &FakeReviewer, config: &Config) -> ReviewManifest {
    review_pass(host, reviewer, &mr(), config).await.unwrap()
}

#[tokio::test]
async fn test_review_pass_positions_every_comment() {
    init_tracing();
    let host = Arc::new(FakeHost::default());
    let reviewer = FakeReviewer::answering(REVIEW_OUTPUT);
    let manifest = run(host.clone(), &reviewer, &Config::default()).await;

    assert_eq!(ordinals(&manifest.posted, |p| p.ordinal), vec![0, 1, 2, 3, 4, 5, 8]);
    assert_eq!(ordinals(&manifest.skipped, |s| s.ordinal), vec![6, 7, 9]);
    assert!(manifest.failed.is_empty());
    assert_eq!(manifest.to_string(), "7 posted, 3 skipped, 0 failed");

    assert_eq!(manifest.skipped[0].reason, SkipReason::MissingField("line"));
    assert_eq!(manifest.skipped[1].reason, SkipReason::NoAddressableLine);
    assert!(matches!(
        manifest.skipped[2].reason,
        SkipReason::UnsupportedPositionKind(_)
    ));

    let snapped = &manifest.posted[1];
    assert_eq!(snapped.snapped_from, Some(10));
    assert_eq!(snapped.new_line, Some(6));
    assert_eq!(snapped.old_line, Some(5));

    let ghost = &manifest.posted[6];
    assert!(ghost.best_effort);
    assert_eq!(ghost.new_line, Some(3));
    assert_eq!(ghost.old_line, None);

    let threads = host.threads.lock().unwrap();
    assert_eq!(threads.len(), 7);
    let by_body = |needle: &str| {
        threads
            .iter()
            .find(|(body, _)| body.contains(needle))
            .map(|(_, position)| position.clone())
            .unwrap()
    };

    let added = by_body("one import per line");
    assert_eq!((added.new_line, added.old_line), (Some(2), None));
    assert_eq!(added.base_revision, "aaa111");
    assert_eq!(added.start_revision, "bbb222");
    assert_eq!(added.head_revision, "ccc333");

    let removed = by_body("sys was still used");
    assert_eq!((removed.new_line, removed.old_line), (None, Some(2)));

    let deleted_file = by_body("documented elsewhere");
    assert_eq!((deleted_file.new_line, deleted_file.old_line), (None, Some(1)));
    assert_eq!(deleted_file.old_path, "docs/old.md");

    let renamed = by_body("Missing doc comment");
    assert_eq!((renamed.new_line, renamed.old_line), (Some(5), Some(4)));
    assert_eq!(renamed.old_path, "src/util.rs");

    let ranged = by_body("z is unused");
    let range = ranged.line_range.unwrap();
    assert_eq!(range.start.side, "new");
    assert_eq!((range.start.new_line, range.start.old_line), (Some(23), None));
    assert_eq!(range.end.side, "old");
    assert_eq!((range.end.new_line, range.end.old_line), (Some(24), Some(22)));
    assert!(range.start.line_code.ends_with("_0_23"));
    assert!(range.end.line_code.ends_with("_22_24"));
    assert_eq!(range.start.line_code.len(), 40 + "_0_23".len());
}

#[tokio::test]
async fn test_review_pass_shows_reviewer_selected_files_only() {
    init_tracing();
    let host = Arc::new(FakeHost::default());
    let reviewer = FakeReviewer::answering("[]");
    let manifest = run(host, &reviewer, &Config::default()).await;
    assert_eq!(manifest.total(), 0);

    let request = reviewer.seen.lock().unwrap().clone().unwrap();
    let paths: BTreeSet<_> = request.visible_lines.keys().map(String::as_str).collect();
    assert_eq!(
        paths,
        BTreeSet::from(["assets/logo.png", "docs/old.md", "src/app.py", "src/helpers.rs"])
    );
    assert_eq!(
        request.visible_lines["src/app.py"],
        vec![1, 2, 3, 4, 5, 6, 21, 22, 23, 24]
    );
    assert_eq!(request.visible_lines["src/helpers.rs"], vec![3, 4, 5]);
    assert!(request.visible_lines["docs/old.md"].is_empty());
    assert!(request.diff_text.contains("File: src/app.py\n```diff\n@@ -1,5 +1,6 @@"));
    assert!(!request.diff_text.contains("Cargo.lock"));
}

#[tokio::test]
async fn test_review_pass_requires_diff_refs() {
    init_tracing();
    let host = Arc::new(FakeHost {
        missing_refs: true,
        ..Default::default()
    });
    let reviewer = FakeReviewer::answering(REVIEW_OUTPUT);
    let result = review_pass(host.clone(), &reviewer, &mr(), &Config::default()).await;

    assert!(matches!(
        result,
        Err(PassError::DiffRefs(HostError::MissingRevision("head")))
    ));
    assert!(!reviewer.called.load(Ordering::SeqCst));
    assert!(host.threads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_review_pass_reviewer_failure_is_fatal() {
    init_tracing();
    let host = Arc::new(FakeHost::default());
    let reviewer = FakeReviewer::failing("model unavailable");
    let result = review_pass(host.clone(), &reviewer, &mr(), &Config::default()).await;

    assert!(matches!(result, Err(PassError::Reviewer(ReviewerError::Failed(_)))));
    assert!(host.threads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_review_pass_records_rejected_threads() {
    init_tracing();
    let host = Arc::new(FakeHost {
        reject_path: Some("src/helpers.rs".to_string()),
        ..Default::default()
    });
    let reviewer = FakeReviewer::answering(REVIEW_OUTPUT);
    let manifest = run(host.clone(), &reviewer, &Config::default()).await;

    assert_eq!(ordinals(&manifest.failed, |f| f.ordinal), vec![5]);
    assert_eq!(manifest.failed[0].status, Some(400));
    assert!(manifest.failed[0].message.contains("line_code"));
    assert_eq!(manifest.posted.len(), 6);
    assert_eq!(host.threads.lock().unwrap().len(), 6);
}

#[tokio::test]
async fn test_review_pass_rejecting_best_effort() {
    init_tracing();
    let host = Arc::new(FakeHost::default());
    let reviewer = FakeReviewer::answering(REVIEW_OUTPUT);
    let mut config = Config::default();
    config.positioning.best_effort = BestEffortPolicy::Reject;
    let manifest = run(host, &reviewer, &config).await;

    assert_eq!(ordinals(&manifest.skipped, |s| s.ordinal), vec![6, 7, 8, 9]);
    assert_eq!(manifest.skipped[2].reason, SkipReason::NoAddressableLine);
    assert!(manifest.posted.iter().all(|p| !p.best_effort));
}

#[test]
fn test_manifest_serializes_for_callers() {
    let manifest = ReviewManifest::default();
    let json = serde_json::to_value(&manifest).unwrap();
    assert_eq!(json, serde_json::json!({"posted": [], "skipped": [], "failed": []}));
}

#[test]
fn test_patch_and_changes_index_alike() {
    let from_patch = DiffIndex::build(&parse_patch(PATCH));
    let from_changes: Vec<FileDiff> = changes().iter().map(FileChange::to_file_diff).collect();
    let from_changes = DiffIndex::build(&from_changes);

    for path in ["src/app.py", "docs/old.md", "src/helpers.rs"] {
        assert_eq!(from_patch.file(path), from_changes.file(path), "{path}");
    }
    assert_eq!(from_patch.kind("src/app.py", 2), Some(LineKind::Added));
    assert_eq!(from_patch.kind("docs/old.md", 2), Some(LineKind::Deleted));
}
