//! Stage 2: Line Tracking
//!
//! Keeps line boundaries consistent with the text under a stream of replaces.
//!
//! A line is the run of characters up to (not including) the next legal delimiter. The set of
//! legal delimiters is configurable and may contain overlapping entries (`"\r"` and `"\r\n"`);
//! at any scan point the **longest** matching delimiter wins. Text ending in a delimiter has one
//! extra zero-length *phantom* line.
//!
//! [`ListLineTracker`] only rescans the region an edit can affect, starting a little before the
//! edit so delimiters straddling its boundary are re-examined, and stops as soon as the rescan
//! lines up with an old line start again. [`rescan_lines`] computes the same table from
//! scratch and serves as the reference.

use crate::line_ending::DEFAULT_LINE_DELIMITERS;
use crate::storage::{GapTextStore, TextStore};
use crate::text::{CharSequence, char_len};
use thiserror::Error;

/// A location (line, offset or range) outside the bounds of the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BadLocation {
    #[error("line {line} out of range (line count {count})")]
    /// Line index `>= number_of_lines()`.
    Line {
        /// Requested line.
        line: usize,
        /// Number of lines.
        count: usize,
    },

    #[error("offset {offset} out of range (length {length})")]
    /// Offset `> len()`.
    Offset {
        /// Requested offset.
        offset: usize,
        /// Text length.
        length: usize,
    },

    #[error("range {offset}..{end} out of range (length {length})")]
    /// Range ending past `len()`.
    Range {
        /// Range start.
        offset: usize,
        /// Range end (saturated on overflow).
        end: usize,
        /// Text length.
        length: usize,
    },
}

impl BadLocation {
    /// Validate `offset + length <= text_length`, returning the range end.
    pub(crate) fn check_range(
        offset: usize,
        length: usize,
        text_length: usize,
    ) -> Result<usize, Self> {
        match offset.checked_add(length) {
            Some(end) if end <= text_length => Ok(end),
            end => Err(Self::Range {
                offset,
                end: end.unwrap_or(usize::MAX),
                length: text_length,
            }),
        }
    }
}

/// Geometry of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Line {
    /// Line number (0-based).
    pub index: usize,
    /// Offset of the first character.
    pub offset: usize,
    /// Number of characters, excluding the delimiter.
    pub length: usize,
    /// Length of the terminating delimiter (0 for the last line).
    pub delimiter_length: usize,
}

impl Line {
    /// Offset just past the line content (where the delimiter starts).
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Offset of the next line: past the content and the delimiter.
    pub fn next_offset(&self) -> usize {
        self.end() + self.delimiter_length
    }
}

/// Line boundary bookkeeping driven by the same replace stream as the text store.
pub trait LineTracker: Send {
    /// The ordered set of legal line delimiters.
    fn legal_line_delimiters(&self) -> &[String];

    /// Replace the whole text and recompute every line.
    fn set(&mut self, text: &str);

    /// Apply `replace(offset, length, text)`.
    fn replace(&mut self, offset: usize, length: usize, text: &str) -> Result<(), BadLocation>;

    /// Length of the tracked text.
    fn len(&self) -> usize;

    /// Returns `true` if the tracked text is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lines, including a trailing phantom line.
    fn number_of_lines(&self) -> usize;

    /// Number of lines touched by `[offset, offset + length)`.
    ///
    /// An empty range covers exactly one line; otherwise every delimiter ending inside
    /// `(offset, offset + length]` adds a line.
    fn number_of_lines_in(&self, offset: usize, length: usize) -> Result<usize, BadLocation>;

    /// Geometry of `line`.
    fn line_information(&self, line: usize) -> Result<Line, BadLocation>;

    /// Line number containing `offset`.
    ///
    /// Delimiter characters belong to the line they terminate. The end offset of a text
    /// ending in a delimiter resolves to the last real line, not the phantom line.
    fn line_number_of_offset(&self, offset: usize) -> Result<usize, BadLocation>;

    /// Delimiter terminating `line`, `None` for the last line.
    fn line_delimiter(&self, line: usize) -> Result<Option<&str>, BadLocation>;

    /// Geometry of the line containing `offset`.
    fn line_information_of_offset(&self, offset: usize) -> Result<Line, BadLocation> {
        self.line_information(self.line_number_of_offset(offset)?)
    }

    /// Offset of the first character of `line`.
    fn line_offset(&self, line: usize) -> Result<usize, BadLocation> {
        Ok(self.line_information(line)?.offset)
    }

    /// Length of `line`, excluding its delimiter.
    fn line_length(&self, line: usize) -> Result<usize, BadLocation> {
        Ok(self.line_information(line)?.length)
    }
}

/// Compiled delimiter set.
#[derive(Debug, Clone)]
struct Delimiters {
    strings: Vec<String>,
    chars: Vec<Vec<char>>,
    max_len: usize,
}

impl Delimiters {
    fn new<I, D>(delimiters: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        let mut strings: Vec<String> = Vec::new();
        for delimiter in delimiters {
            let delimiter = delimiter.into();
            if !delimiter.is_empty() && !strings.contains(&delimiter) {
                strings.push(delimiter);
            }
        }
        if strings.is_empty() {
            strings = DEFAULT_LINE_DELIMITERS
                .iter()
                .map(|d| d.to_string())
                .collect();
        }

        let chars: Vec<Vec<char>> = strings.iter().map(|d| d.chars().collect()).collect();
        let max_len = chars.iter().map(Vec::len).max().unwrap_or(1);
        Self {
            strings,
            chars,
            max_len,
        }
    }

    /// Longest delimiter starting at `index`.
    fn match_at<S: CharSequence + ?Sized>(&self, text: &S, index: usize) -> Option<usize> {
        let available = text.len() - index;
        let first = text.char_at(index);
        let mut best: Option<usize> = None;

        for (k, delimiter) in self.chars.iter().enumerate() {
            if delimiter[0] != first || delimiter.len() > available {
                continue;
            }
            if best.is_some_and(|b| self.chars[b].len() >= delimiter.len()) {
                continue;
            }
            if delimiter
                .iter()
                .enumerate()
                .skip(1)
                .all(|(i, &ch)| text.char_at(index + i) == ch)
            {
                best = Some(k);
            }
        }
        best
    }

    /// Scan one line starting at `start`.
    fn scan_line<S: CharSequence + ?Sized>(&self, text: &S, start: usize) -> LineEntry {
        let len = text.len();
        for index in start..len {
            if let Some(delimiter) = self.match_at(text, index) {
                return LineEntry {
                    offset: start,
                    length: index - start,
                    delimiter: Some(delimiter),
                };
            }
        }
        LineEntry {
            offset: start,
            length: len - start,
            delimiter: None,
        }
    }

    /// Scan every line of `text`.
    fn scan_all<S: CharSequence + ?Sized>(&self, text: &S) -> Vec<LineEntry> {
        let mut lines = Vec::new();
        let mut start = 0;
        loop {
            let entry = self.scan_line(text, start);
            let done = entry.delimiter.is_none();
            start = entry.offset + entry.length + self.delimiter_len(entry.delimiter);
            lines.push(entry);
            if done {
                return lines;
            }
        }
    }

    fn delimiter_len(&self, delimiter: Option<usize>) -> usize {
        delimiter.map_or(0, |k| self.chars[k].len())
    }
}

/// Stored form of a line: the delimiter is an index into the delimiter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineEntry {
    offset: usize,
    length: usize,
    delimiter: Option<usize>,
}

/// Recompute the line table of `text` from scratch.
///
/// Empty strings in `delimiters` are ignored; an empty set means the default `\r`, `\n`,
/// `\r\n` set.
///
/// # Example
///
/// ```rust
/// use document_core::rescan_lines;
///
/// let lines = rescan_lines("a\r\nb\n", &["\r", "\n", "\r\n"]);
/// assert_eq!(lines.len(), 3);
/// assert_eq!(lines[0].delimiter_length, 2);
/// assert_eq!(lines[2].offset, 5);
/// ```
pub fn rescan_lines<D: AsRef<str>>(text: &str, delimiters: &[D]) -> Vec<Line> {
    let delimiters = Delimiters::new(delimiters.iter().map(|d| d.as_ref().to_string()));
    let chars: Vec<char> = text.chars().collect();
    delimiters
        .scan_all(&chars[..])
        .into_iter()
        .enumerate()
        .map(|(index, entry)| Line {
            index,
            offset: entry.offset,
            length: entry.length,
            delimiter_length: delimiters.delimiter_len(entry.delimiter),
        })
        .collect()
}

/// Line tracker backed by a sorted list of lines.
///
/// Lookups are binary searches; an edit rescans the affected lines and shifts the offsets of
/// the lines after them.
#[derive(Debug, Clone)]
pub struct ListLineTracker {
    delimiters: Delimiters,
    lines: Vec<LineEntry>,
    /// Private copy of the text, used to inspect characters around an edit
    text: GapTextStore,
}

impl ListLineTracker {
    /// Create a tracker for an empty text with the given legal delimiters.
    pub fn new<I, D>(delimiters: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        Self {
            delimiters: Delimiters::new(delimiters),
            lines: vec![LineEntry {
                offset: 0,
                length: 0,
                delimiter: None,
            }],
            text: GapTextStore::new(),
        }
    }

    /// All lines, in order.
    pub fn lines(&self) -> impl Iterator<Item = Line> + '_ {
        (0..self.lines.len()).map(|index| self.to_line(index))
    }

    fn to_line(&self, index: usize) -> Line {
        let entry = self.lines[index];
        Line {
            index,
            offset: entry.offset,
            length: entry.length,
            delimiter_length: self.delimiters.delimiter_len(entry.delimiter),
        }
    }

    fn check_line(&self, line: usize) -> Result<(), BadLocation> {
        if line < self.lines.len() {
            Ok(())
        } else {
            Err(BadLocation::Line {
                line,
                count: self.lines.len(),
            })
        }
    }

    /// Index of the line whose span (delimiter included) contains `offset`.
    fn line_containing(&self, offset: usize) -> usize {
        self.lines
            .partition_point(|entry| entry.offset <= offset)
            .saturating_sub(1)
    }

    /// Re-derive the lines touched by replacing `length` characters at `offset` with `added`
    /// characters, reading the already edited `text` against the old line table.
    ///
    /// Returns the first affected line, the first old line that is valid again and the lines
    /// replacing everything in between. Only the inserted text and a few delimiter lengths
    /// around it are read, however long the surrounding lines are.
    fn rescan<S: CharSequence + ?Sized>(
        &self,
        text: &S,
        offset: usize,
        length: usize,
        added: usize,
    ) -> (usize, usize, Vec<LineEntry>) {
        // A delimiter that can change must reach into the edit, so it starts at most
        // `max_len - 1` characters before it.
        let reach = self.delimiters.max_len - 1;
        let first = self.line_containing(offset.saturating_sub(reach));
        let first_entry = self.lines[first];

        // Nothing before `index` on the first line can start a delimiter.
        let mut line_start = first_entry.offset;
        let mut index = offset
            .saturating_sub(reach)
            .min(first_entry.offset + first_entry.length);
        let edit_end = offset + added;
        let mut rescanned = Vec::new();

        loop {
            if index >= edit_end {
                // Past the edit, old and new scans agree from any point the old scan also
                // stopped at, i.e. one not strictly inside an old delimiter.
                let old = index - added + length;
                let resync = self.line_containing(old);
                let entry = self.lines[resync];
                if old <= entry.offset + entry.length {
                    rescanned.push(LineEntry {
                        offset: line_start,
                        length: entry.offset + entry.length + added - length - line_start,
                        delimiter: entry.delimiter,
                    });
                    return (first, resync + 1, rescanned);
                }
            }

            match self.delimiters.match_at(text, index) {
                Some(delimiter) => {
                    rescanned.push(LineEntry {
                        offset: line_start,
                        length: index - line_start,
                        delimiter: Some(delimiter),
                    });
                    index += self.delimiters.chars[delimiter].len();
                    line_start = index;
                }
                None => index += 1,
            }
        }
    }
}

impl Default for ListLineTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_DELIMITERS)
    }
}

impl LineTracker for ListLineTracker {
    fn legal_line_delimiters(&self) -> &[String] {
        &self.delimiters.strings
    }

    fn set(&mut self, text: &str) {
        self.text.set(text);
        self.lines = self.delimiters.scan_all(&self.text);
        tracing::trace!(lines = self.lines.len(), "line table rebuilt");
    }

    fn replace(&mut self, offset: usize, length: usize, text: &str) -> Result<(), BadLocation> {
        BadLocation::check_range(offset, length, TextStore::len(&self.text))?;
        let added = char_len(text);

        self.text
            .replace(offset, length, text)
            .map_err(|_| BadLocation::Range {
                offset,
                end: offset + length,
                length: TextStore::len(&self.text),
            })?;

        let (first, resync, rescanned) = self.rescan(&self.text, offset, length, added);

        tracing::trace!(
            offset,
            first_line = first,
            rescanned = rescanned.len(),
            replaced = resync - first,
            "incremental line rescan"
        );

        let inserted = rescanned.len();
        self.lines.splice(first..resync, rescanned);
        for entry in &mut self.lines[first + inserted..] {
            entry.offset = entry.offset - length + added;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        TextStore::len(&self.text)
    }

    fn number_of_lines(&self) -> usize {
        self.lines.len()
    }

    fn number_of_lines_in(&self, offset: usize, length: usize) -> Result<usize, BadLocation> {
        let end = BadLocation::check_range(offset, length, self.len())?;
        if length == 0 {
            return Ok(1);
        }
        // Every line start in (offset, end] is the end of a delimiter in that range.
        let through_end = self.lines.partition_point(|entry| entry.offset <= end);
        let through_start = self.lines.partition_point(|entry| entry.offset <= offset);
        Ok(1 + through_end - through_start)
    }

    fn line_information(&self, line: usize) -> Result<Line, BadLocation> {
        self.check_line(line)?;
        Ok(self.to_line(line))
    }

    fn line_number_of_offset(&self, offset: usize) -> Result<usize, BadLocation> {
        let length = self.len();
        if offset > length {
            return Err(BadLocation::Offset { offset, length });
        }

        let count = self.lines.len();
        if offset == length && count > 1 && self.lines[count - 1].offset == length {
            // End of a text ending in a delimiter: skip the phantom line.
            return Ok(count - 2);
        }
        Ok(self.line_containing(offset))
    }

    fn line_delimiter(&self, line: usize) -> Result<Option<&str>, BadLocation> {
        self.check_line(line)?;
        Ok(self.lines[line]
            .delimiter
            .map(|k| self.delimiters.strings[k].as_str()))
    }
}
