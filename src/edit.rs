use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The mutable line list every correction operation works on.
///
/// Text is split on `\n`; a trailing newline does not produce a final empty
/// line but is remembered so [`LineBuffer::render`] reproduces it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineBuffer {
    lines: Vec<String>,
    trailing_newline: bool,
}

/// A contiguous, validated span of lines (0-based start).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub count: usize,
}

impl Window {
    /// Exclusive 0-based end of the window.
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Line {line} (+{count} lines) is outside a file of {len} lines")]
    LineOutOfBounds { line: usize, count: usize, len: usize },

    #[error("Invalid line range {from}..={to} in a file of {len} lines")]
    InvalidRange { from: usize, to: usize, len: usize },

    #[error("Cannot move line {line} by {distance} in a file of {len} lines")]
    MoveOutOfBounds {
        line: usize,
        distance: isize,
        len: usize,
    },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LineBuffer {
    /// Split already-normalized text (`\n` line endings) into lines.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        let trailing_newline = text.ends_with('\n');
        let body = if trailing_newline {
            &text[..text.len() - 1]
        } else {
            text
        };
        Self {
            lines: body.split('\n').map(str::to_owned).collect(),
            trailing_newline,
        }
    }

    /// Rejoin the lines with `\n`.
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Address `count` lines starting at 1-based `line`.
    pub fn window(&self, line: usize, count: usize) -> Result<Window, EditError> {
        if line == 0 || count == 0 || (line - 1).saturating_add(count) > self.lines.len() {
            return Err(EditError::LineOutOfBounds {
                line,
                count,
                len: self.lines.len(),
            });
        }
        Ok(Window {
            start: line - 1,
            count,
        })
    }

    /// Address the inclusive 1-based range `from..=to`.
    ///
    /// `from` defaults to the first line, `to` to the last one. An open range
    /// over an empty buffer is the empty window.
    pub fn window_between(
        &self,
        from: Option<usize>,
        to: Option<usize>,
    ) -> Result<Window, EditError> {
        let len = self.lines.len();
        if len == 0 && to.is_none() && from.unwrap_or(1) == 1 {
            return Ok(Window { start: 0, count: 0 });
        }
        let from = from.unwrap_or(1);
        let to = to.unwrap_or(len);
        if from == 0 || to > len || from > to {
            return Err(EditError::InvalidRange { from, to, len });
        }
        Ok(Window {
            start: from - 1,
            count: to - from + 1,
        })
    }

    /// Materialize a window: every line suffixed with `\n`.
    pub fn window_text(&self, window: Window) -> String {
        let mut text = String::new();
        for line in &self.lines[window.range()] {
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    /// Replace the lines in `range` with `replacement`.
    pub fn splice(&mut self, range: Range<usize>, replacement: Vec<String>) {
        self.lines.splice(range, replacement);
    }

    /// Remove and return the lines in `range`.
    pub fn drain(&mut self, range: Range<usize>) -> Vec<String> {
        self.lines.drain(range).collect()
    }
}

/// Write `content` to `path`, keeping a copy of the previous file at
/// `path` + `backup_suffix` when a suffix is given.
///
/// The backup keeps the original modification time; the new content goes
/// through [`atomic_write`].
pub fn write_with_backup(
    path: &Path,
    content: &[u8],
    backup_suffix: Option<&str>,
) -> Result<Option<PathBuf>, EditError> {
    let backup = match backup_suffix {
        Some(suffix) if path.exists() => {
            let backup = backup_path(path, suffix);
            let metadata = fs::metadata(path)?;
            fs::copy(path, &backup)?;
            let mtime = filetime::FileTime::from_last_modification_time(&metadata);
            filetime::set_file_mtime(&backup, mtime)?;
            Some(backup)
        }
        _ => None,
    };

    atomic_write(path, content)?;
    Ok(backup)
}

/// `notes.txt` + `.bak` → `notes.txt.bak`
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or nothing changes.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(EditError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            )))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remembers_trailing_newline() {
        let buffer = LineBuffer::parse("line1\nline2\nline3\n");
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.render(), "line1\nline2\nline3\n");

        let buffer = LineBuffer::parse("a\nb");
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.render(), "a\nb");
    }

    #[test]
    fn test_parse_empty_and_blank_lines() {
        assert!(LineBuffer::parse("").is_empty());
        assert_eq!(LineBuffer::parse("").render(), "");

        let buffer = LineBuffer::parse("\n\n");
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.render(), "\n\n");
    }

    #[test]
    fn test_window_bounds() {
        let buffer = LineBuffer::parse("a\nb\nc\n");
        assert_eq!(buffer.window(2, 2).unwrap(), Window { start: 1, count: 2 });
        assert!(matches!(
            buffer.window(3, 2),
            Err(EditError::LineOutOfBounds { line: 3, count: 2, len: 3 })
        ));
        assert!(matches!(
            buffer.window(0, 1),
            Err(EditError::LineOutOfBounds { .. })
        ));
        assert!(matches!(
            buffer.window(1, 0),
            Err(EditError::LineOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_window_between_defaults() {
        let buffer = LineBuffer::parse("a\nb\nc\nd\n");
        assert_eq!(
            buffer.window_between(None, None).unwrap(),
            Window { start: 0, count: 4 }
        );
        assert_eq!(
            buffer.window_between(Some(2), None).unwrap(),
            Window { start: 1, count: 3 }
        );
        assert_eq!(
            buffer.window_between(None, Some(2)).unwrap(),
            Window { start: 0, count: 2 }
        );
        assert!(matches!(
            buffer.window_between(Some(3), Some(2)),
            Err(EditError::InvalidRange { .. })
        ));
        assert!(matches!(
            buffer.window_between(Some(1), Some(5)),
            Err(EditError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_window_between_empty_buffer() {
        let buffer = LineBuffer::parse("");
        let window = buffer.window_between(None, None).unwrap();
        assert_eq!(window, Window { start: 0, count: 0 });
        assert_eq!(buffer.window_text(window), "");
        assert!(buffer.window_between(Some(1), None).is_ok());
        assert!(matches!(
            buffer.window_between(Some(2), None),
            Err(EditError::InvalidRange { .. })
        ));
        assert!(buffer.window_between(None, Some(1)).is_err());
    }

    #[test]
    fn test_window_text_suffixes_every_line() {
        let buffer = LineBuffer::parse("a\nb\nc");
        let window = buffer.window(2, 2).unwrap();
        assert_eq!(buffer.window_text(window), "b\nc\n");
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("dir/notes.txt"), ".bak"),
            PathBuf::from("dir/notes.txt.bak")
        );
    }

    #[test]
    fn test_write_with_backup_keeps_original() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("notes.txt");
        fs::write(&file_path, b"original content").unwrap();

        let backup = write_with_backup(&file_path, b"modified content", Some(".orig")).unwrap();

        let backup = backup.expect("backup should be written");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "original content");
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "modified content");
    }

    #[test]
    fn test_write_without_backup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("notes.txt");
        fs::write(&file_path, b"original").unwrap();

        let backup = write_with_backup(&file_path, b"modified", None).unwrap();

        assert!(backup.is_none());
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "modified");
    }
}
