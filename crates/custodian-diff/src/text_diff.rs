//! Line-level diff of free-text fields (remarks, notes, document bodies).
//!
//! Uses the `similar` crate (Myers diff algorithm) to produce structured
//! hunks with context lines. Used by the change log, where a structural
//! field diff of a long note would just show the whole text twice.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

/// Lines of unchanged context kept around each hunk.
const CONTEXT_LINES: usize = 2;

/// The result of diffing two texts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDiff {
    pub hunks: Vec<LineHunk>,
    pub old_lines: usize,
    pub new_lines: usize,
}

impl LineDiff {
    /// Returns `true` if the two texts are identical.
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn additions(&self) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| matches!(l, DiffLine::Added(_)))
            .count()
    }

    pub fn deletions(&self) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| matches!(l, DiffLine::Removed(_)))
            .count()
    }

    /// Unified-diff style rendering for display in a UI or log.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for hunk in &self.hunks {
            out.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
            ));
            for line in &hunk.lines {
                let (prefix, text) = match line {
                    DiffLine::Context(t) => (' ', t),
                    DiffLine::Added(t) => ('+', t),
                    DiffLine::Removed(t) => ('-', t),
                };
                out.push(prefix);
                out.push_str(text);
                out.push('\n');
            }
        }
        out
    }
}

/// A contiguous region of changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineHunk {
    /// 1-based start line in the old text.
    pub old_start: usize,
    pub old_count: usize,
    /// 1-based start line in the new text.
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

/// A single line in a hunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

/// Compute a line-by-line diff between two texts.
pub fn diff_text(old: &str, new: &str) -> LineDiff {
    let old_lines = old.lines().count();
    let new_lines = new.lines().count();

    if old == new {
        return LineDiff {
            hunks: Vec::new(),
            old_lines,
            new_lines,
        };
    }

    let text_diff = TextDiff::from_lines(old, new);
    let mut hunks = Vec::new();

    for group in text_diff.grouped_ops(CONTEXT_LINES) {
        let Some(first) = group.first() else {
            continue;
        };
        let mut hunk = LineHunk {
            old_start: first.old_range().start + 1,
            old_count: 0,
            new_start: first.new_range().start + 1,
            new_count: 0,
            lines: Vec::new(),
        };

        for op in &group {
            for change in text_diff.iter_changes(op) {
                let text = change.value().trim_end_matches('\n').to_string();
                match change.tag() {
                    ChangeTag::Equal => {
                        hunk.lines.push(DiffLine::Context(text));
                        hunk.old_count += 1;
                        hunk.new_count += 1;
                    }
                    ChangeTag::Delete => {
                        hunk.lines.push(DiffLine::Removed(text));
                        hunk.old_count += 1;
                    }
                    ChangeTag::Insert => {
                        hunk.lines.push(DiffLine::Added(text));
                        hunk.new_count += 1;
                    }
                }
            }
        }

        hunks.push(hunk);
    }

    LineDiff {
        hunks,
        old_lines,
        new_lines,
    }
}
