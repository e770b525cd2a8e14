//! Line-oriented text diff
//!
//! Computes a minimal edit script between two texts (Myers' O(ND) algorithm
//! in its linear-space form) and renders it as an annotated report:
//!
//! ```text
//!   unchanged line
//! >>>>> (line: 3)
//! - old line
//! ===== (line: 3)
//! + new line
//! <<<<< (line: 4)
//!   unchanged line
//! ```
//!
//! `>>>>>` opens a changed run, `=====` separates deletions from the
//! insertions that replace them, `<<<<<` returns to unchanged text.
//!
//! File contents are compared as raw bytes. Converter outputs are often in
//! 8-bit legacy encodings, so decoding happens only when the report is
//! rendered.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::hash::Hash;
use std::ops::Range;
use std::path::Path;

use encoding_rs::WINDOWS_1252;

use crate::error::{DiffError, DiffResult};

/// Line content the engine can compare and print
pub trait LineText: Eq + Hash {
    /// Form of the line written into reports
    fn printable(&self) -> Cow<'_, str>;
}

impl LineText for str {
    fn printable(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl LineText for [u8] {
    /// UTF-8 when valid, Windows-1252 (a superset of ISO-8859-1) otherwise
    fn printable(&self) -> Cow<'_, str> {
        match std::str::from_utf8(self) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => WINDOWS_1252.decode_without_bom_handling(self).0,
        }
    }
}

/// A single line of the edit script
#[derive(Debug, PartialEq, Eq)]
pub enum LineChange<'a, T: ?Sized> {
    /// Present in both texts; position in the right text
    Keep { position: usize, text: &'a T },
    /// Only in the right text; position in the right text
    Insert { position: usize, text: &'a T },
    /// Only in the left text; position in the left text
    Delete { position: usize, text: &'a T },
}

impl<T: ?Sized> Clone for LineChange<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for LineChange<'_, T> {}

impl<'a, T: ?Sized> LineChange<'a, T> {
    pub fn position(&self) -> usize {
        match *self {
            LineChange::Keep { position, .. }
            | LineChange::Insert { position, .. }
            | LineChange::Delete { position, .. } => position,
        }
    }

    pub fn text(&self) -> &'a T {
        match *self {
            LineChange::Keep { text, .. }
            | LineChange::Insert { text, .. }
            | LineChange::Delete { text, .. } => text,
        }
    }

    fn is_keep(&self) -> bool {
        matches!(self, LineChange::Keep { .. })
    }

    fn state(&self) -> RunState {
        match self {
            LineChange::Keep { .. } => RunState::Unchanged,
            LineChange::Insert { .. } => RunState::Inserting,
            LineChange::Delete { .. } => RunState::Deleting,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            LineChange::Keep { .. } => "  ",
            LineChange::Insert { .. } => "+ ",
            LineChange::Delete { .. } => "- ",
        }
    }
}

/// State of the report writer between two lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Unchanged,
    Inserting,
    Deleting,
}

/// Separator emitted when the run state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Entering a changed run from unchanged text
    Open,
    /// Deletions directly followed by insertions, or the reverse
    Replace,
    /// Leaving a changed run
    Close,
}

impl Marker {
    fn token(self) -> &'static str {
        match self {
            Marker::Open => ">>>>>",
            Marker::Replace => "=====",
            Marker::Close => "<<<<<",
        }
    }
}

impl RunState {
    /// Transition table: which marker separates a line in state `self` from
    /// a following line in state `next`
    pub fn transition(self, next: RunState) -> Option<Marker> {
        use RunState::*;
        match (self, next) {
            (Unchanged, Unchanged) | (Inserting, Inserting) | (Deleting, Deleting) => None,
            (Unchanged, Inserting) | (Unchanged, Deleting) => Some(Marker::Open),
            (Deleting, Inserting) | (Inserting, Deleting) => Some(Marker::Replace),
            (Inserting, Unchanged) | (Deleting, Unchanged) => Some(Marker::Close),
        }
    }
}

/// Line-granularity diff engine
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDiffEngine;

impl TextDiffEngine {
    pub fn new() -> Self {
        Self
    }

    /// Diff two texts. Returns `None` when they are line-for-line identical.
    pub fn diff(&self, left: &str, right: &str) -> Option<String> {
        let left_lines: Vec<&str> = left.lines().collect();
        let right_lines: Vec<&str> = right.lines().collect();
        diff_lines(&left_lines, &right_lines)
    }

    /// Diff raw contents line by line. Lines are equal only when their bytes
    /// are; `\r\n` and `\n` terminators are treated alike.
    pub fn diff_bytes(&self, left: &[u8], right: &[u8]) -> Option<String> {
        diff_lines(&split_lines(left), &split_lines(right))
    }

    /// Diff two files
    pub async fn diff_files(&self, left: &Path, right: &Path) -> DiffResult<Option<String>> {
        let left_bytes = read_bytes(left).await?;
        let right_bytes = read_bytes(right).await?;
        Ok(self.diff_bytes(&left_bytes, &right_bytes))
    }
}

pub(crate) async fn read_bytes(path: &Path) -> DiffResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| DiffError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = bytes
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();
    // The piece after a final terminator is not a line
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        lines.pop();
    }
    lines
}

fn diff_lines<T: LineText + ?Sized>(left: &[&T], right: &[&T]) -> Option<String> {
    if left == right {
        return None;
    }
    Some(render_report(&edit_script(left, right)))
}

/// Render an edit script with run markers
pub fn render_report<T: LineText + ?Sized>(changes: &[LineChange<'_, T>]) -> String {
    let mut report = String::new();
    let mut state = RunState::Unchanged;

    for change in changes {
        let next = change.state();
        if let Some(marker) = state.transition(next) {
            let _ = writeln!(report, "{} (line: {})", marker.token(), change.position());
        }
        state = next;

        report.push_str(change.prefix());
        report.push_str(&change.text().printable());
        report.push('\n');
    }

    report
}

/// Minimal edit script turning `left` into `right`.
///
/// Memory stays linear in the input size. Within a replaced block,
/// deletions come before insertions.
pub fn edit_script<'a, T: LineText + ?Sized>(
    left: &[&'a T],
    right: &[&'a T],
) -> Vec<LineChange<'a, T>> {
    let mut script = EditScript {
        left,
        right,
        changes: Vec::with_capacity(left.len().max(right.len())),
    };

    if shares_no_line(left, right) {
        script.replace(0..left.len(), 0..right.len());
    } else {
        script.conquer(0..left.len(), 0..right.len());
    }

    let mut changes = script.changes;
    group_replacements(&mut changes);
    changes
}

fn shares_no_line<T: LineText + ?Sized>(left: &[&T], right: &[&T]) -> bool {
    let seen: HashSet<&T> = left.iter().copied().collect();
    !right.iter().any(|line| seen.contains(line))
}

/// Reorder every run of edits so its deletions precede its insertions
fn group_replacements<T: ?Sized>(changes: &mut [LineChange<'_, T>]) {
    let mut start = 0;
    while start < changes.len() {
        if changes[start].is_keep() {
            start += 1;
            continue;
        }
        let mut end = start;
        while end < changes.len() && !changes[end].is_keep() {
            end += 1;
        }
        changes[start..end].sort_by_key(|c| matches!(c, LineChange::Insert { .. }));
        start = end;
    }
}

struct EditScript<'s, 'a, T: ?Sized> {
    left: &'s [&'a T],
    right: &'s [&'a T],
    changes: Vec<LineChange<'a, T>>,
}

impl<'a, T: LineText + ?Sized> EditScript<'_, 'a, T> {
    fn keep(&mut self, y: usize) {
        self.changes.push(LineChange::Keep {
            position: y + 1,
            text: self.right[y],
        });
    }

    fn replace(&mut self, left: Range<usize>, right: Range<usize>) {
        for x in left {
            self.changes.push(LineChange::Delete {
                position: x + 1,
                text: self.left[x],
            });
        }
        for y in right {
            self.changes.push(LineChange::Insert {
                position: y + 1,
                text: self.right[y],
            });
        }
    }

    /// Emit the edit script of `left` against `right`, in order
    fn conquer(&mut self, mut left: Range<usize>, mut right: Range<usize>) {
        while !left.is_empty()
            && !right.is_empty()
            && self.left[left.start] == self.right[right.start]
        {
            self.keep(right.start);
            left.start += 1;
            right.start += 1;
        }

        let mut suffix = 0;
        while left.end - suffix > left.start
            && right.end - suffix > right.start
            && self.left[left.end - suffix - 1] == self.right[right.end - suffix - 1]
        {
            suffix += 1;
        }
        left.end -= suffix;
        right.end -= suffix;
        let suffix_start = right.end;

        if left.is_empty() || right.is_empty() {
            self.replace(left, right);
        } else {
            match self.middle_snake(&left, &right) {
                Some((x, y))
                    if (x, y) != (left.start, right.start) && (x, y) != (left.end, right.end) =>
                {
                    self.conquer(left.start..x, right.start..y);
                    self.conquer(x..left.end, y..right.end);
                }
                // No common line in range: everything is replaced
                _ => self.replace(left, right),
            }
        }

        for y in suffix_start..suffix_start + suffix {
            self.keep(y);
        }
    }

    /// Point where a forward and a backward search meet on an optimal
    /// path, in absolute coordinates. `None` when the ranges share no line.
    fn middle_snake(&self, left: &Range<usize>, right: &Range<usize>) -> Option<(usize, usize)> {
        let n = left.len() as isize;
        let m = right.len() as isize;
        let max_d = (n + m + 1) / 2;
        let offset = max_d;
        let len = 2 * max_d + 2;
        let delta = n - m;
        let front = delta % 2 != 0;

        // Furthest x per diagonal, forward from the start and backward from
        // the end; -1 marks an unvisited diagonal
        let mut forward = vec![-1isize; len as usize];
        let mut backward = vec![-1isize; len as usize];
        forward[(offset + 1) as usize] = 0;
        backward[(offset + 1) as usize] = 0;

        let same = |x: isize, y: isize| {
            self.left[left.start + x as usize] == self.right[right.start + y as usize]
        };
        let same_from_end = |x: isize, y: isize| {
            self.left[left.end - 1 - x as usize] == self.right[right.end - 1 - y as usize]
        };
        let inside = |x: isize, y: isize| (0..=n).contains(&x) && (0..=m).contains(&y);
        let split = |x: isize, y: isize| (left.start + x as usize, right.start + y as usize);

        let (mut k1_start, mut k1_end, mut k2_start, mut k2_end) = (0, 0, 0, 0);

        for d in 0..max_d {
            let mut k1 = -d + k1_start;
            while k1 <= d - k1_end {
                let at = (offset + k1) as usize;
                let mut x1 = if k1 == -d || (k1 != d && forward[at - 1] < forward[at + 1]) {
                    forward[at + 1]
                } else {
                    forward[at - 1] + 1
                };
                let mut y1 = x1 - k1;
                while x1 >= 0 && y1 >= 0 && x1 < n && y1 < m && same(x1, y1) {
                    x1 += 1;
                    y1 += 1;
                }
                forward[at] = x1;

                if x1 > n {
                    k1_end += 2;
                } else if y1 > m {
                    k1_start += 2;
                } else if front {
                    let mirrored = offset + delta - k1;
                    if (0..len).contains(&mirrored) {
                        let x2 = backward[mirrored as usize];
                        if x2 != -1 && x1 >= n - x2 && inside(x1, y1) {
                            return Some(split(x1, y1));
                        }
                    }
                }
                k1 += 2;
            }

            let mut k2 = -d + k2_start;
            while k2 <= d - k2_end {
                let at = (offset + k2) as usize;
                let mut x2 = if k2 == -d || (k2 != d && backward[at - 1] < backward[at + 1]) {
                    backward[at + 1]
                } else {
                    backward[at - 1] + 1
                };
                let mut y2 = x2 - k2;
                while x2 >= 0 && y2 >= 0 && x2 < n && y2 < m && same_from_end(x2, y2) {
                    x2 += 1;
                    y2 += 1;
                }
                backward[at] = x2;

                if x2 > n {
                    k2_end += 2;
                } else if y2 > m {
                    k2_start += 2;
                } else if !front {
                    let mirrored = offset + delta - k2;
                    if (0..len).contains(&mirrored) {
                        let x1 = forward[mirrored as usize];
                        let y1 = x1 - (mirrored - offset);
                        if x1 != -1 && x1 >= n - x2 && inside(x1, y1) {
                            return Some(split(x1, y1));
                        }
                    }
                }
                k2 += 2;
            }
        }

        None
    }
}
