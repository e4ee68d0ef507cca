//! Document change events.
//!
//! Every [`Document::replace`](crate::Document::replace) produces one [`DocumentEvent`]. The same
//! event value is handed to listeners before and after the edit, so consumers (position
//! updaters, undo recording, child documents, incremental indexers) never need to diff old and
//! new text.
//!
//! All offsets and lengths are **character offsets** (Unicode scalar values).

use crate::text::char_len;

/// A single replace, described in pre-edit coordinates.
///
/// Semantics:
/// - `offset` and `length` address the replaced range in the document **before** the edit.
/// - `text` is what replaces it; `replaced_text` is what was there.
/// - `modification_stamp` is the stamp the document carries **after** the edit, and
///   `previous_stamp` the one it carried before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
    /// Start offset of the replaced range.
    pub offset: usize,
    /// Length of the replaced range.
    pub length: usize,
    /// Inserted text (may be empty).
    pub text: String,
    /// Replaced text (may be empty).
    pub replaced_text: String,
    /// Modification stamp before the edit.
    pub previous_stamp: u64,
    /// Modification stamp after the edit.
    pub modification_stamp: u64,
    text_length: usize,
}

impl DocumentEvent {
    /// Create an event for replacing `replaced_text` at `offset` with `text`.
    pub fn new(
        offset: usize,
        replaced_text: impl Into<String>,
        text: impl Into<String>,
        previous_stamp: u64,
        modification_stamp: u64,
    ) -> Self {
        let replaced_text = replaced_text.into();
        let text = text.into();
        Self {
            offset,
            length: char_len(&replaced_text),
            text_length: char_len(&text),
            text,
            replaced_text,
            previous_stamp,
            modification_stamp,
        }
    }

    /// Length of `text` in characters.
    pub fn text_length(&self) -> usize {
        self.text_length
    }

    /// Exclusive end of the replaced range in the pre-edit document.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Change in document length caused by this edit.
    pub fn delta(&self) -> isize {
        self.text_length() as isize - self.length as isize
    }

    /// Returns `true` if the edit only inserts text.
    pub fn is_insertion(&self) -> bool {
        self.length == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_geometry() {
        let event = DocumentEvent::new(3, "ab", "héllo", 4, 5);
        assert_eq!(event.text_length(), 5);
        assert_eq!(event.end(), 5);
        assert_eq!(event.delta(), 3);
        assert!(!event.is_insertion());
        assert_eq!(event.length, 2);
        assert_eq!(event.modification_stamp, 5);
    }
}
