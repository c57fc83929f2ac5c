//! Read-only lookups derived from parsed file diffs.
//!
//! Every index here is a pure projection of a `FileDiff`; they are rebuilt
//! for each review pass and never mutated afterwards.

pub mod types;

pub use types::{LineKind, OldLine};

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::diff::{FileDiff, LineTag};

/// Line kinds of one file.
///
/// Added and unchanged lines are keyed by their new line number; deleted
/// lines have no new-side identity and are keyed by their old line number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineKindIndex {
    new_side: BTreeMap<usize, LineKind>,
    old_side: BTreeMap<usize, LineKind>,
}

impl LineKindIndex {
    /// Kind of `line`, trying the new-side keys before the deleted old-side keys.
    pub fn get(&self, line: usize) -> Option<LineKind> {
        self.new_side
            .get(&line)
            .or_else(|| self.old_side.get(&line))
            .copied()
    }

    /// Kind of a new-side line only.
    pub fn get_new(&self, new_line: usize) -> Option<LineKind> {
        self.new_side.get(&new_line).copied()
    }

    /// Whether `old_line` is a deleted line.
    pub fn is_deleted(&self, old_line: usize) -> bool {
        self.old_side.contains_key(&old_line)
    }

    pub fn is_empty(&self) -> bool {
        self.new_side.is_empty() && self.old_side.is_empty()
    }
}

/// New-file line numbers a comment can be anchored to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleLineSet(BTreeSet<usize>);

impl VisibleLineSet {
    pub fn contains(&self, line: usize) -> bool {
        self.0.contains(&line)
    }

    /// Largest visible line that is `<= line`.
    pub fn nearest_at_or_below(&self, line: usize) -> Option<usize> {
        self.0.range(..=line).next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// New-line → old-line pairing of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineCorrespondenceIndex(BTreeMap<usize, OldLine>);

impl LineCorrespondenceIndex {
    /// `None` means the line is not in the diff at all.
    pub fn get(&self, new_line: usize) -> Option<OldLine> {
        self.0.get(&new_line).copied()
    }
}

/// Classify every line of `file`.
pub fn classify(file: &FileDiff) -> LineKindIndex {
    let mut index = LineKindIndex::default();
    for line in &file.lines {
        match (line.tag, line.old_line, line.new_line) {
            (LineTag::Added, _, Some(new)) => {
                index.new_side.insert(new, LineKind::Added);
            }
            (LineTag::Context, _, Some(new)) => {
                index.new_side.insert(new, LineKind::Unchanged);
            }
            (LineTag::Removed, Some(old), _) => {
                index.old_side.insert(old, LineKind::Deleted);
            }
            _ => {}
        }
    }
    index
}

/// Collect the new line numbers of every added or context line in `file`.
pub fn visible_lines(file: &FileDiff) -> VisibleLineSet {
    VisibleLineSet(
        file.lines
            .iter()
            .filter(|line| line.tag != LineTag::Removed)
            .filter_map(|line| line.new_line)
            .collect(),
    )
}

/// Pair every context line with its old line; added lines are `Unpaired`.
pub fn correspond(file: &FileDiff) -> LineCorrespondenceIndex {
    let mut index = BTreeMap::new();
    for line in &file.lines {
        match (line.tag, line.old_line, line.new_line) {
            (LineTag::Context, Some(old), Some(new)) => {
                index.insert(new, OldLine::Paired(old));
            }
            (LineTag::Added, _, Some(new)) => {
                index.insert(new, OldLine::Unpaired);
            }
            _ => {}
        }
    }
    LineCorrespondenceIndex(index)
}

/// All lookups for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIndex {
    /// None for new files, which have no old side
    pub old_path: Option<String>,
    /// The file does not exist before the change
    pub is_new: bool,
    /// The file does not exist after the change
    pub is_deleted: bool,
    pub kinds: LineKindIndex,
    pub visible: VisibleLineSet,
    pub correspondence: LineCorrespondenceIndex,
}

impl FileIndex {
    pub fn build(file: &FileDiff) -> Self {
        Self {
            old_path: file.old_path.clone().filter(|_| !file.is_new),
            is_new: file.is_new,
            is_deleted: file.is_deleted,
            kinds: classify(file),
            visible: visible_lines(file),
            correspondence: correspond(file),
        }
    }
}

/// Lookups for every file of a merge request, keyed by new path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffIndex {
    files: BTreeMap<String, FileIndex>,
}

impl DiffIndex {
    pub fn build(files: &[FileDiff]) -> Self {
        let mut indexed = BTreeMap::new();
        for file in files {
            let index = FileIndex::build(file);
            debug!(
                path = %file.new_path,
                old_path = ?file.old_path.as_ref().filter(|_| file.is_renamed),
                additions = file.additions(),
                deletions = file.deletions(),
                visible = index.visible.len(),
                "indexed file diff"
            );
            if indexed.insert(file.new_path.clone(), index).is_some() {
                warn!(path = %file.new_path, "duplicate file in diff, keeping the last one");
            }
        }
        Self { files: indexed }
    }

    pub fn file(&self, path: &str) -> Option<&FileIndex> {
        self.files.get(path)
    }

    pub fn kind(&self, path: &str, line: usize) -> Option<LineKind> {
        self.files.get(path)?.kinds.get(line)
    }

    pub fn old_line(&self, path: &str, new_line: usize) -> Option<OldLine> {
        self.files.get(path)?.correspondence.get(new_line)
    }

    pub fn visible(&self, path: &str) -> Option<&VisibleLineSet> {
        self.files.get(path).map(|f| &f.visible)
    }

    /// Visible lines per file, as handed to the reviewer.
    pub fn visible_table(&self) -> BTreeMap<String, Vec<usize>> {
        self.files
            .iter()
            .map(|(path, index)| (path.clone(), index.visible.iter().collect()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
