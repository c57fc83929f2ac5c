pub mod types;

pub use types::{DiffHunk, DiffLine, FileDiff, LineTag};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("Invalid hunk header: {0}")]
    InvalidHunkHeader(String),
}

/// Running position inside the current hunk.
///
/// `old_left`/`new_left` count down from the header counts and are only used
/// to tell a `---`/`+++` content line apart from a file header.
struct Cursor {
    old_line: usize,
    new_line: usize,
    old_left: usize,
    new_left: usize,
}

impl Cursor {
    fn start(hunk: DiffHunk) -> Self {
        Self {
            old_line: hunk.old_start,
            new_line: hunk.new_start,
            old_left: hunk.old_count,
            new_left: hunk.new_count,
        }
    }

    fn advance_old(&mut self) {
        self.old_line += 1;
        self.old_left = self.old_left.saturating_sub(1);
    }

    fn advance_new(&mut self) {
        self.new_line += 1;
        self.new_left = self.new_left.saturating_sub(1);
    }
}

/// Replay the unified diff text of one file into its ordered line records.
///
/// The input is the `diff` field GitLab returns per changed file, but a
/// section of `git diff` output (file headers included) works too.
///
/// Lines are classified by their first character:
///   '+' for additions (numbered on the new side)
///   '-' for deletions (numbered on the old side)
///   anything else is context, blank lines included
///
/// Lines before the first `@@` header produce nothing. A malformed header
/// ends the replay and the lines parsed so far are returned.
pub fn parse_lines(raw_diff: &str) -> Vec<DiffLine> {
    let mut lines = Vec::new();
    let mut cursor: Option<Cursor> = None;

    for line in raw_diff.lines() {
        if line.starts_with("@@") {
            match parse_hunk_header(line) {
                Ok(hunk) => cursor = Some(Cursor::start(hunk)),
                Err(err) => {
                    warn!(error = %err, parsed = lines.len(), "malformed hunk header, keeping partial diff");
                    break;
                }
            }
            continue;
        }

        if line.starts_with("diff --git ") {
            cursor = None;
            continue;
        }

        let Some(cursor) = cursor.as_mut() else {
            continue;
        };

        // "\ No newline at end of file" belongs to neither side
        if line.starts_with('\\') {
            continue;
        }

        if line.starts_with('+') {
            if line.starts_with("+++") && cursor.new_left == 0 {
                continue;
            }
            lines.push(DiffLine::added(cursor.new_line));
            cursor.advance_new();
        } else if line.starts_with('-') {
            if line.starts_with("---") && cursor.old_left == 0 {
                continue;
            }
            lines.push(DiffLine::removed(cursor.old_line));
            cursor.advance_old();
        } else {
            lines.push(DiffLine::context(cursor.old_line, cursor.new_line));
            cursor.advance_old();
            cursor.advance_new();
        }
    }

    lines
}

/// Split a complete `git diff` patch into per-file diffs.
///
/// Each file section starts with:
///   diff --git a/{path} b/{path}
///
/// New files have `--- /dev/null`, deleted files have `+++ /dev/null`,
/// renames carry `rename from` / `rename to` lines.
pub fn parse_patch(raw_patch: &str) -> Vec<FileDiff> {
    let mut files = Vec::new();
    let mut current: Option<PatchSection> = None;

    for line in raw_patch.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(section) = current.take() {
                files.push(section.finish());
            }
            current = PatchSection::open(rest);
            if current.is_none() {
                warn!(header = %line, "skipping file with unreadable diff header");
            }
            continue;
        }

        if let Some(section) = current.as_mut() {
            section.push(line);
        }
    }

    if let Some(section) = current.take() {
        files.push(section.finish());
    }
    files
}

/// Lines of one file collected from a multi-file patch.
struct PatchSection {
    old_path: String,
    new_path: String,
    is_new: bool,
    is_deleted: bool,
    is_renamed: bool,
    in_hunks: bool,
    body: String,
}

impl PatchSection {
    fn open(header: &str) -> Option<Self> {
        let mut parts = header.split_whitespace();
        let a_path = parts.next()?;
        let b_path = parts.next()?;
        Some(Self {
            old_path: a_path.strip_prefix("a/").unwrap_or(a_path).to_string(),
            new_path: b_path.strip_prefix("b/").unwrap_or(b_path).to_string(),
            is_new: false,
            is_deleted: false,
            is_renamed: false,
            in_hunks: false,
            body: String::new(),
        })
    }

    fn push(&mut self, line: &str) {
        if !self.in_hunks {
            if line.starts_with("@@") {
                self.in_hunks = true;
            } else if line.starts_with("new file mode") {
                self.is_new = true;
            } else if line.starts_with("deleted file mode") {
                self.is_deleted = true;
            } else if let Some(path) = line.strip_prefix("--- ") {
                if path.trim() == "/dev/null" {
                    self.is_new = true;
                }
            } else if let Some(path) = line.strip_prefix("+++ ") {
                if path.trim() == "/dev/null" {
                    self.is_deleted = true;
                }
            } else if let Some(from) = line.strip_prefix("rename from ") {
                self.old_path = from.trim().to_string();
                self.is_renamed = true;
            } else if let Some(to) = line.strip_prefix("rename to ") {
                self.new_path = to.trim().to_string();
                self.is_renamed = true;
            }
        }
        self.body.push_str(line);
        self.body.push('\n');
    }

    fn finish(self) -> FileDiff {
        let lines = parse_lines(&self.body);
        debug!(path = %self.new_path, lines = lines.len(), "parsed file section");
        let is_renamed = self.is_renamed || self.old_path != self.new_path;
        FileDiff {
            old_path: (!self.is_new).then_some(self.old_path),
            new_path: self.new_path,
            is_new: self.is_new,
            is_deleted: self.is_deleted,
            is_renamed,
            lines,
        }
    }
}

/// Parse `@@ -old_start,old_count +new_start,new_count @@ [section]`.
/// A missing count means 1.
pub fn parse_hunk_header(line: &str) -> Result<DiffHunk, DiffError> {
    let header = line
        .trim()
        .strip_prefix("@@")
        .ok_or_else(|| DiffError::InvalidHunkHeader(line.to_string()))?
        .trim();
    let mut parts = header.split_whitespace();
    let old_part = parts
        .next()
        .ok_or_else(|| DiffError::InvalidHunkHeader(line.to_string()))?;
    let new_part = parts
        .next()
        .ok_or_else(|| DiffError::InvalidHunkHeader(line.to_string()))?;

    let (old_start, old_count) = parse_range(old_part, '-', line)?;
    let (new_start, new_count) = parse_range(new_part, '+', line)?;

    Ok(DiffHunk {
        old_start,
        old_count,
        new_start,
        new_count,
    })
}

fn parse_range(part: &str, prefix: char, line: &str) -> Result<(usize, usize), DiffError> {
    let invalid = || DiffError::InvalidHunkHeader(line.to_string());
    let range = part.strip_prefix(prefix).ok_or_else(invalid)?;
    let (start_str, count_str) = match range.split_once(',') {
        Some((start, count)) => (start, count),
        None => (range, "1"),
    };
    let start = start_str.parse::<usize>().map_err(|_| invalid())?;
    let count = count_str.parse::<usize>().map_err(|_| invalid())?;
    Ok((start, count))
}
