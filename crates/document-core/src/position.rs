//! Tracked positions and the policies that move them across edits.
//!
//! A [`Position`] is a `[offset, offset + length)` range owned by one named category of a
//! [`Document`](crate::Document). After every replace the document runs the category's
//! [`PositionUpdater`]s over all of its positions, in registration order.
//!
//! Two policies ship with the crate:
//!
//! - [`DefaultPositionUpdater`]: *exclusive* boundaries. Text inserted at either end of a
//!   position stays outside of it, and an edit covering the whole position deletes it.
//! - [`InclusivePositionUpdater`]: *inclusive* boundaries. Text inserted at either end becomes
//!   part of the position, and overlapping edits only clip it. Child document ranges follow
//!   this policy.

use crate::event::DocumentEvent;

/// Handle of a position inside its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionId(pub(crate) u64);

/// A tracked text range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// Start offset.
    pub offset: usize,
    /// Length in characters.
    pub length: usize,
    deleted: bool,
}

impl Position {
    /// Create a live position.
    pub fn new(offset: usize, length: usize) -> Self {
        Self {
            offset,
            length,
            deleted: false,
        }
    }

    /// Exclusive end offset.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Whether an edit has removed the whole range at some point.
    ///
    /// Once set, the flag is never cleared.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Mark the position as deleted.
    pub fn delete(&mut self) {
        self.deleted = true;
    }

    /// Returns `true` if `offset` lies in `[self.offset, self.end())`.
    pub fn includes(&self, offset: usize) -> bool {
        self.offset <= offset && offset < self.end()
    }

    /// Returns `true` if `[offset, offset + length)` overlaps this position.
    ///
    /// An empty range overlaps a position containing its offset and vice versa; two empty
    /// ranges overlap only at the same offset.
    pub fn overlaps_with(&self, offset: usize, length: usize) -> bool {
        let end = offset + length;
        match (self.length, length) {
            (0, 0) => self.offset == offset,
            (0, _) => offset <= self.offset && self.offset < end,
            (_, 0) => self.includes(offset),
            _ => self.offset < end && offset < self.end(),
        }
    }

    /// Apply the exclusive policy for `replace(offset, length, text)` with `text_length`
    /// inserted characters.
    pub fn update_exclusive(&mut self, offset: usize, length: usize, text_length: usize) {
        let start = self.offset;
        let end = self.end();
        let edit_end = offset + length;

        if length == 0 {
            if offset <= start {
                self.offset += text_length;
            } else if offset < end {
                self.length += text_length;
            }
            return;
        }

        if edit_end <= start {
            self.offset = start - length + text_length;
        } else if offset >= end {
            // Edit after the position.
        } else if offset <= start && end <= edit_end {
            self.offset = offset;
            self.length = 0;
            self.deleted = true;
        } else if offset <= start {
            self.offset = offset + text_length;
            self.length = end - edit_end;
        } else if end <= edit_end {
            self.length = offset - start;
        } else {
            self.length = self.length - length + text_length;
        }
    }

    /// Apply the inclusive policy for `replace(offset, length, text)` with `text_length`
    /// inserted characters.
    pub fn update_inclusive(&mut self, offset: usize, length: usize, text_length: usize) {
        let start = self.offset;
        let end = self.end();
        let edit_end = offset + length;

        if edit_end < start || (edit_end == start && length > 0 && offset < start) {
            self.offset = start - length + text_length;
            return;
        }
        if offset > end {
            return;
        }

        let new_start = offset.min(start);
        let new_end = if edit_end <= end {
            end - length + text_length
        } else {
            offset + text_length
        };
        self.offset = new_start;
        self.length = new_end - new_start;
    }
}

/// Moves the positions of one category after a replace.
///
/// Closures `Fn(&DocumentEvent, &mut Position)` implement this trait.
pub trait PositionUpdater: Send {
    /// Update `position` for `event`.
    fn update(&self, event: &DocumentEvent, position: &mut Position);
}

impl<F> PositionUpdater for F
where
    F: Fn(&DocumentEvent, &mut Position) + Send,
{
    fn update(&self, event: &DocumentEvent, position: &mut Position) {
        self(event, position)
    }
}

/// Exclusive boundary policy.
///
/// | Edit relation to the position | Result |
/// |---|---|
/// | before it (including ending at its start) | shifted by the length change |
/// | after it (including starting at its end) | unchanged |
/// | covering it | deleted, moved to the edit offset, length 0 |
/// | overlapping its start | starts after the inserted text, shrinks by the overlap |
/// | overlapping its end | shrinks by the overlap |
/// | strictly inside it | grows or shrinks by the length change |
/// | insertion at its start (or at an empty position) | shifted right |
///
/// # Example
///
/// ```rust
/// use document_core::{DefaultPositionUpdater, DocumentEvent, Position, PositionUpdater};
///
/// let mut position = Position::new(2, 3);
/// DefaultPositionUpdater.update(&DocumentEvent::new(2, "", "ab", 0, 1), &mut position);
/// assert_eq!((position.offset, position.length), (4, 3));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPositionUpdater;

impl PositionUpdater for DefaultPositionUpdater {
    fn update(&self, event: &DocumentEvent, position: &mut Position) {
        position.update_exclusive(event.offset, event.length, event.text_length());
    }
}

/// Inclusive boundary policy: insertions touching a position grow it, and it is never deleted.
#[derive(Debug, Clone, Copy, Default)]
pub struct InclusivePositionUpdater;

impl PositionUpdater for InclusivePositionUpdater {
    fn update(&self, event: &DocumentEvent, position: &mut Position) {
        position.update_inclusive(event.offset, event.length, event.text_length());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exclusive(position: (usize, usize), edit: (usize, usize, usize)) -> (usize, usize, bool) {
        let mut p = Position::new(position.0, position.1);
        p.update_exclusive(edit.0, edit.1, edit.2);
        (p.offset, p.length, p.is_deleted())
    }

    fn inclusive(position: (usize, usize), edit: (usize, usize, usize)) -> (usize, usize) {
        let mut p = Position::new(position.0, position.1);
        p.update_inclusive(edit.0, edit.1, edit.2);
        (p.offset, p.length)
    }

    #[test]
    fn test_exclusive_table() {
        // P = [10, 20)
        assert_eq!(exclusive((10, 10), (2, 3, 5)), (12, 10, false));
        assert_eq!(exclusive((10, 10), (25, 3, 5)), (10, 10, false));
        assert_eq!(exclusive((10, 10), (8, 14, 1)), (8, 0, true));
        assert_eq!(exclusive((10, 10), (8, 4, 1)), (9, 8, false));
        assert_eq!(exclusive((10, 10), (15, 10, 3)), (10, 5, false));
        assert_eq!(exclusive((10, 10), (12, 3, 7)), (10, 14, false));
        assert_eq!(exclusive((10, 0), (10, 0, 4)), (14, 0, false));
    }

    #[test]
    fn test_exclusive_boundaries() {
        // insertion at start shifts, at end leaves alone
        assert_eq!(exclusive((10, 10), (10, 0, 3)), (13, 10, false));
        assert_eq!(exclusive((10, 10), (20, 0, 3)), (10, 10, false));
        // deletion ending at start shifts, starting at end leaves alone
        assert_eq!(exclusive((10, 10), (5, 5, 0)), (5, 10, false));
        assert_eq!(exclusive((10, 10), (20, 5, 0)), (10, 10, false));
        // exact cover deletes
        assert_eq!(exclusive((10, 10), (10, 10, 2)), (10, 0, true));
        // empty position inside a deletion is deleted, at its start it is not
        assert_eq!(exclusive((12, 0), (10, 5, 0)), (10, 0, true));
        assert_eq!(exclusive((10, 0), (10, 5, 0)), (10, 0, false));
    }

    #[test]
    fn test_deleted_flag_is_monotonic() {
        let mut p = Position::new(10, 5);
        p.update_exclusive(8, 10, 0);
        assert!(p.is_deleted());
        p.update_exclusive(0, 0, 4);
        assert!(p.is_deleted());
        assert_eq!((p.offset, p.length), (12, 0));
    }

    #[test]
    fn test_inclusive_policy() {
        // C = [10, 20)
        assert_eq!(inclusive((10, 10), (2, 3, 5)), (12, 10));
        assert_eq!(inclusive((10, 10), (5, 5, 0)), (5, 10));
        assert_eq!(inclusive((10, 10), (10, 0, 3)), (10, 13));
        assert_eq!(inclusive((10, 10), (20, 0, 3)), (10, 13));
        assert_eq!(inclusive((10, 10), (21, 0, 3)), (10, 10));
        assert_eq!(inclusive((10, 10), (8, 4, 1)), (8, 9));
        assert_eq!(inclusive((10, 10), (15, 10, 3)), (10, 8));
        assert_eq!(inclusive((10, 10), (5, 20, 2)), (5, 2));
        assert_eq!(inclusive((10, 10), (12, 3, 7)), (10, 14));
    }

    #[test]
    fn test_closure_updater() {
        let pin_to_zero = |_: &DocumentEvent, p: &mut Position| p.offset = 0;
        let mut p = Position::new(5, 1);
        pin_to_zero.update(&DocumentEvent::new(0, "", "x", 0, 1), &mut p);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_overlap_queries() {
        let p = Position::new(4, 3);
        assert!(p.includes(4));
        assert!(!p.includes(7));
        assert!(p.overlaps_with(6, 5));
        assert!(!p.overlaps_with(7, 5));
        assert!(p.overlaps_with(5, 0));
        assert!(!p.overlaps_with(7, 0));

        let empty = Position::new(4, 0);
        assert!(empty.overlaps_with(4, 0));
        assert!(!empty.overlaps_with(5, 0));
        assert!(empty.overlaps_with(2, 3));
        assert!(!empty.overlaps_with(2, 2));
    }
}
