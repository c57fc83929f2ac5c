/// Which side(s) of the diff a physical line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineTag {
    /// Present only in the new file (`+`)
    Added,
    /// Present only in the old file (`-`)
    Removed,
    /// Present in both files
    Context,
}

/// Header of a contiguous diff region.
/// Parsed from `@@ -old_start,old_count +new_start,new_count @@`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffHunk {
    /// Starting line number in the old file (0 for an empty old side)
    pub old_start: usize,
    /// Number of lines in the old file
    pub old_count: usize,
    /// Starting line number in the new file (0 for an empty new side)
    pub new_start: usize,
    /// Number of lines in the new file
    pub new_count: usize,
}

/// One physical line inside a hunk.
///
/// `old_line` is present unless the line is `Added`; `new_line` is present
/// unless the line is `Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLine {
    pub tag: LineTag,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

impl DiffLine {
    pub fn added(new_line: usize) -> Self {
        Self {
            tag: LineTag::Added,
            old_line: None,
            new_line: Some(new_line),
        }
    }

    pub fn removed(old_line: usize) -> Self {
        Self {
            tag: LineTag::Removed,
            old_line: Some(old_line),
            new_line: None,
        }
    }

    pub fn context(old_line: usize, new_line: usize) -> Self {
        Self {
            tag: LineTag::Context,
            old_line: Some(old_line),
            new_line: Some(new_line),
        }
    }
}

/// The parsed diff of a single changed file.
/// Renames and deletions show up as a differing or absent `old_path`
/// together with the flags below.
#[derive(Debug, Clone)]
pub struct FileDiff {
    /// Path after the change (e.g., "src/auth/config.rs")
    pub new_path: String,
    /// Path before the change, when known
    pub old_path: Option<String>,
    /// Whether this is a new file
    pub is_new: bool,
    /// Whether this file was deleted
    pub is_deleted: bool,
    /// Whether this file was renamed
    pub is_renamed: bool,
    /// Every line of every hunk, in diff order
    pub lines: Vec<DiffLine>,
}

impl FileDiff {
    /// Number of `Added` lines.
    pub fn additions(&self) -> usize {
        self.lines.iter().filter(|l| l.tag == LineTag::Added).count()
    }

    /// Number of `Removed` lines.
    pub fn deletions(&self) -> usize {
        self.lines.iter().filter(|l| l.tag == LineTag::Removed).count()
    }
}
