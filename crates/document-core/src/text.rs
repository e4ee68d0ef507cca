//! Forward character-sequence abstraction.
//!
//! The matcher and the line tracker only ever need two things from text: its length and the
//! character at an index. [`CharSequence`] captures exactly that, so callers can hand in a
//! `[char]` slice, a [`GapTextStore`](crate::GapTextStore), a [`Document`](crate::Document), or
//! their own instrumented wrapper.
//!
//! All indices are **character offsets** (Unicode scalar values), not byte offsets.

/// A random-access sequence of characters.
pub trait CharSequence {
    /// Number of characters in the sequence.
    fn len(&self) -> usize;

    /// Character at `index`.
    ///
    /// Callers guarantee `index < self.len()`; implementations may panic otherwise.
    fn char_at(&self, index: usize) -> char;

    /// Returns `true` if the sequence has no characters.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collect `[start, end)` into a `String`.
    fn slice_to_string(&self, start: usize, end: usize) -> String {
        (start..end.min(self.len())).map(|i| self.char_at(i)).collect()
    }
}

impl CharSequence for [char] {
    fn len(&self) -> usize {
        <[char]>::len(self)
    }

    fn char_at(&self, index: usize) -> char {
        self[index]
    }
}

impl CharSequence for Vec<char> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn char_at(&self, index: usize) -> char {
        self[index]
    }
}

impl<T: CharSequence + ?Sized> CharSequence for &T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn char_at(&self, index: usize) -> char {
        (**self).char_at(index)
    }
}

/// Number of `char`s in `text`.
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}
