//! Correction operations.
//!
//! Every operation carries an anchor (`find`). An escaped `\n` inside the
//! anchor or the payload stands for a real newline, so multi-line anchors fit
//! in a single persisted field. Operations return `Ok(true)` when they
//! mutated the buffer and `Ok(false)` when the anchor was not found in the
//! addressed window (or the correction is already in place).

use crate::edit::{EditError, LineBuffer, Window};
use serde::Serialize;
use std::borrow::Cow;

/// A single literal correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Substitute every occurrence of the anchor inside the window.
    Replace { find: String, replace: String },
    /// Move the anchor's lines; negative is up, positive is down.
    Move { find: String, distance: isize },
    /// Splice new lines directly after the anchor's last line.
    Insert { find: String, text: String },
    /// Delete the anchor's lines.
    Remove { find: String },
}

impl Operation {
    /// The anchor in its persisted (escaped) form.
    pub fn find(&self) -> &str {
        match self {
            Operation::Replace { find, .. }
            | Operation::Move { find, .. }
            | Operation::Insert { find, .. }
            | Operation::Remove { find } => find,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Replace { .. } => "replace",
            Operation::Move { .. } => "move",
            Operation::Insert { .. } => "insert",
            Operation::Remove { .. } => "remove",
        }
    }

    /// Apply at 1-based `line`, spanning `count` lines.
    pub fn execute_at(
        &self,
        buffer: &mut LineBuffer,
        line: usize,
        count: usize,
    ) -> Result<bool, EditError> {
        let window = buffer.window(line, count)?;
        self.execute(buffer, window)
    }

    /// Apply across the inclusive 1-based range `from..=to`.
    ///
    /// Missing bounds default to the start and end of the buffer.
    pub fn execute_for(
        &self,
        buffer: &mut LineBuffer,
        from: Option<usize>,
        to: Option<usize>,
    ) -> Result<bool, EditError> {
        let window = buffer.window_between(from, to)?;
        self.execute(buffer, window)
    }

    fn execute(&self, buffer: &mut LineBuffer, window: Window) -> Result<bool, EditError> {
        match self {
            Operation::Replace { find, replace } => {
                Ok(replace_in(buffer, window, &unescape(find), &unescape(replace)))
            }
            Operation::Move { find, distance } => {
                move_anchor(buffer, window, &unescape(find), *distance)
            }
            Operation::Insert { find, text } => {
                Ok(insert_after(buffer, window, &unescape(find), &unescape(text)))
            }
            Operation::Remove { find } => Ok(remove_anchor(buffer, window, &unescape(find))),
        }
    }
}

/// Turn escaped `\n` sequences into real newlines.
pub fn unescape(text: &str) -> Cow<'_, str> {
    if text.contains("\\n") {
        Cow::Owned(text.replace("\\n", "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Inverse of [`unescape`]: fold real newlines into `\n`.
pub fn escape(text: &str) -> Cow<'_, str> {
    if text.contains('\n') {
        Cow::Owned(text.replace('\n', "\\n"))
    } else {
        Cow::Borrowed(text)
    }
}

fn replace_in(buffer: &mut LineBuffer, window: Window, find: &str, replace: &str) -> bool {
    if find.is_empty() {
        return false;
    }

    let original = buffer.window_text(window);
    let corrected = original.replace(find, replace);
    if corrected == original {
        return false;
    }

    // Without a final newline the last segment runs into the next line
    let merges = !corrected.ends_with('\n');
    let mut produced: Vec<String> = corrected.split('\n').map(str::to_owned).collect();
    let mut end = window.end();

    if merges {
        let tail = produced.pop().unwrap_or_default();
        if let Some(next) = buffer.lines().get(end) {
            produced.push(format!("{tail}{next}"));
            end += 1;
        } else if !tail.is_empty() {
            produced.push(tail);
        }
    } else {
        produced.pop();
    }

    buffer.splice(window.start..end, produced);
    true
}

/// 0-based inclusive line span touched by the first match of `find`.
fn locate(buffer: &LineBuffer, window: Window, find: &str) -> Option<(usize, usize)> {
    if find.is_empty() {
        return None;
    }
    let text = buffer.window_text(window);
    let start = text.find(find)?;
    let last_char = text[start..start + find.len()]
        .char_indices()
        .next_back()
        .map_or(start, |(offset, _)| start + offset);

    let first = window.start + text[..start].matches('\n').count();
    let last = window.start + text[..last_char].matches('\n').count();
    Some((first, last))
}

fn move_anchor(
    buffer: &mut LineBuffer,
    window: Window,
    find: &str,
    distance: isize,
) -> Result<bool, EditError> {
    let Some((first, last)) = locate(buffer, window, find) else {
        return Ok(false);
    };
    if distance == 0 {
        return Ok(false);
    }

    let span = last - first + 1;
    let remaining = buffer.len() - span;
    let target = isize::try_from(first)
        .ok()
        .and_then(|first| first.checked_add(distance))
        .and_then(|target| usize::try_from(target).ok())
        .filter(|&target| target <= remaining);
    let Some(target) = target else {
        return Err(EditError::MoveOutOfBounds {
            line: first + 1,
            distance,
            len: buffer.len(),
        });
    };

    let moved = buffer.drain(first..last + 1);
    buffer.splice(target..target, moved);
    Ok(true)
}

fn insert_after(buffer: &mut LineBuffer, window: Window, find: &str, text: &str) -> bool {
    let Some((_, last)) = locate(buffer, window, find) else {
        return false;
    };

    let inserted: Vec<String> = text
        .strip_suffix('\n')
        .unwrap_or(text)
        .split('\n')
        .map(str::to_owned)
        .collect();

    let at = last + 1;
    let existing = buffer.lines().get(at..at + inserted.len());
    if existing.is_some_and(|lines| lines == inserted.as_slice()) {
        return false;
    }

    buffer.splice(at..at, inserted);
    true
}

fn remove_anchor(buffer: &mut LineBuffer, window: Window, find: &str) -> bool {
    match locate(buffer, window, find) {
        Some((first, last)) => {
            buffer.drain(first..last + 1);
            true
        }
        None => false,
    }
}
