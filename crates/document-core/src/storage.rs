//! Stage 1: Linear Storage Layer
//!
//! Implements the character store behind a [`Document`](crate::Document) as a gap buffer:
//! one contiguous `Vec<char>` holding `content[..gap_start] ++ content[gap_end..]`, with an
//! unused gap that follows the edit point. Edits close to the previous edit cost
//! O(edit size); an edit at distance `d` from the gap costs O(d) to move it there.

use crate::config::GapTextStoreConfig;
use crate::text::{CharSequence, char_len};
use thiserror::Error;

/// Storage-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("offset range {offset}..{end} out of range for store of length {length}")]
    /// A read touched characters outside `[0, len)`.
    OutOfRange {
        /// First requested offset.
        offset: usize,
        /// Exclusive end of the requested range.
        end: usize,
        /// Store length at the time of the call.
        length: usize,
    },

    #[error("invalid replace range {offset}..{end} for store of length {length}")]
    /// A replace addressed characters beyond the end of the store.
    InvalidRange {
        /// Requested offset.
        offset: usize,
        /// Exclusive end of the replaced range (saturated on overflow).
        end: usize,
        /// Store length at the time of the call.
        length: usize,
    },
}

/// A mutable sequence of characters.
///
/// Implementations validate every call before mutating: a failed `replace` leaves the store
/// untouched.
pub trait TextStore: Send {
    /// Character at `offset`.
    fn get_char(&self, offset: usize) -> Result<char, StoreError>;

    /// The `length` characters starting at `offset`.
    fn get(&self, offset: usize, length: usize) -> Result<String, StoreError>;

    /// Number of characters stored.
    fn len(&self) -> usize;

    /// Replace `length` characters at `offset` with `text`.
    fn replace(&mut self, offset: usize, length: usize, text: &str) -> Result<(), StoreError>;

    /// Replace the whole content.
    fn set(&mut self, text: &str) {
        let length = self.len();
        // A full-range replace is always in bounds.
        let _ = self.replace(0, length, text);
    }

    /// Returns `true` if the store holds no characters.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole content as a `String`.
    fn text(&self) -> String {
        self.get(0, self.len()).unwrap_or_default()
    }
}

/// Gap buffer text store.
///
/// # Example
///
/// ```rust
/// use document_core::{GapTextStore, TextStore};
///
/// let mut store = GapTextStore::new();
/// store.set("Hello World");
/// store.replace(6, 5, "Gap").unwrap();
/// assert_eq!(store.text(), "Hello Gap");
/// assert_eq!(store.get(0, 5).unwrap(), "Hello");
/// ```
#[derive(Debug, Clone)]
pub struct GapTextStore {
    /// Physical buffer: `[content | gap | content]`
    content: Vec<char>,
    /// First gap slot
    gap_start: usize,
    /// First content slot after the gap
    gap_end: usize,
    /// Largest gap the buffer may keep before it is reallocated
    threshold: usize,
    min_gap_size: usize,
    max_gap_size: usize,
    size_multiplier: f64,
}

impl GapTextStore {
    /// Create an empty store with the default capacity policy.
    pub fn new() -> Self {
        Self::with_config(GapTextStoreConfig::default())
    }

    /// Create an empty store with the given capacity policy.
    pub fn with_config(config: GapTextStoreConfig) -> Self {
        Self {
            content: Vec::new(),
            gap_start: 0,
            gap_end: 0,
            threshold: 0,
            min_gap_size: config.min_gap_size,
            max_gap_size: config.max_gap_size,
            size_multiplier: config.size_multiplier(),
        }
    }

    /// Create an empty store using the legacy two-watermark policy.
    pub fn with_watermarks(low_watermark: usize, high_watermark: usize) -> Self {
        Self::with_config(GapTextStoreConfig::from_watermarks(
            low_watermark,
            high_watermark,
        ))
    }

    /// Create a store holding `text`, using the default capacity policy.
    pub fn from_text(text: &str) -> Self {
        let mut store = Self::new();
        store.set(text);
        store
    }

    /// Physical index of the first gap slot.
    pub fn gap_start(&self) -> usize {
        self.gap_start
    }

    /// Physical index of the first content slot after the gap.
    pub fn gap_end(&self) -> usize {
        self.gap_end
    }

    /// Current size of the gap.
    pub fn gap_size(&self) -> usize {
        self.gap_end - self.gap_start
    }

    /// Physical buffer size (content plus gap).
    pub fn capacity(&self) -> usize {
        self.content.len()
    }

    fn physical(&self, offset: usize) -> usize {
        if offset < self.gap_start {
            offset
        } else {
            offset + self.gap_size()
        }
    }

    fn check_read(&self, offset: usize, length: usize) -> Result<usize, StoreError> {
        let len = TextStore::len(self);
        match offset.checked_add(length) {
            Some(end) if end <= len => Ok(end),
            end => Err(StoreError::OutOfRange {
                offset,
                end: end.unwrap_or(usize::MAX),
                length: len,
            }),
        }
    }

    /// Make room for an edit removing `remove` characters at `offset` and adding `add`.
    ///
    /// Afterwards the gap starts at `offset + add`, and `[offset, offset + add)` is free for
    /// the inserted characters.
    fn adjust_gap(&mut self, offset: usize, remove: usize, add: usize) {
        let old_gap_size = self.gap_size();
        let new_gap_start = offset + add;
        let new_gap_end = match (old_gap_size + remove).checked_sub(add) {
            Some(new_gap_size) if new_gap_size <= self.threshold => {
                self.move_gap(offset, remove, old_gap_size, new_gap_size, new_gap_start)
            }
            _ => self.reallocate(offset, remove, old_gap_size, add, new_gap_start),
        };

        self.gap_start = new_gap_start;
        self.gap_end = new_gap_end;
    }

    /// Reuse the current array: only the run between the edit and the gap is moved.
    fn move_gap(
        &mut self,
        offset: usize,
        remove: usize,
        old_gap_size: usize,
        new_gap_size: usize,
        new_gap_start: usize,
    ) -> usize {
        let new_gap_end = new_gap_start + new_gap_size;

        if offset < self.gap_start {
            let after_remove = offset + remove;
            if after_remove < self.gap_start {
                self.content
                    .copy_within(after_remove..self.gap_start, new_gap_end);
            }
            // Otherwise the removed range reaches into the gap and nothing needs to move.
        } else {
            let offset_shifted = offset + old_gap_size;
            self.content
                .copy_within(self.gap_end..offset_shifted, self.gap_start);
        }

        new_gap_end
    }

    /// Allocate a fresh array sized by the capacity policy and copy the content in at most
    /// three runs.
    fn reallocate(
        &mut self,
        offset: usize,
        remove: usize,
        old_gap_size: usize,
        add: usize,
        new_gap_start: usize,
    ) -> usize {
        let new_length = self.content.len() - old_gap_size + add - remove;
        let new_array_size = (new_length as f64 * self.size_multiplier) as usize;
        let new_gap_size = new_array_size
            .saturating_sub(new_length)
            .min(self.max_gap_size)
            .max(self.min_gap_size);
        let new_gap_end = new_gap_start + new_gap_size;

        tracing::trace!(
            old_capacity = self.content.len(),
            new_capacity = new_length + new_gap_size,
            gap = new_gap_size,
            "reallocating gap text store"
        );

        self.threshold = new_gap_size * 2;
        let mut new_content = vec!['\0'; new_length + new_gap_size];

        if offset < self.gap_start {
            new_content[..offset].copy_from_slice(&self.content[..offset]);
            let after_remove = offset + remove;
            if after_remove < self.gap_start {
                let between = self.gap_start - after_remove;
                new_content[new_gap_end..new_gap_end + between]
                    .copy_from_slice(&self.content[after_remove..self.gap_start]);
                new_content[new_gap_end + between..]
                    .copy_from_slice(&self.content[self.gap_end..]);
            } else {
                let offset_shifted = after_remove + old_gap_size;
                new_content[new_gap_end..].copy_from_slice(&self.content[offset_shifted..]);
            }
        } else {
            new_content[..self.gap_start].copy_from_slice(&self.content[..self.gap_start]);
            let offset_shifted = offset + old_gap_size;
            let between = offset_shifted - self.gap_end;
            new_content[self.gap_start..self.gap_start + between]
                .copy_from_slice(&self.content[self.gap_end..offset_shifted]);
            let after_remove = offset_shifted + remove;
            new_content[new_gap_end..].copy_from_slice(&self.content[after_remove..]);
        }

        self.content = new_content;
        new_gap_end
    }
}

impl Default for GapTextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TextStore for GapTextStore {
    fn get_char(&self, offset: usize) -> Result<char, StoreError> {
        self.check_read(offset, 1)?;
        Ok(self.content[self.physical(offset)])
    }

    fn get(&self, offset: usize, length: usize) -> Result<String, StoreError> {
        let end = self.check_read(offset, length)?;

        let mut result = String::with_capacity(length);
        if end <= self.gap_start {
            result.extend(&self.content[offset..end]);
        } else if offset >= self.gap_start {
            let gap = self.gap_size();
            result.extend(&self.content[offset + gap..end + gap]);
        } else {
            result.extend(&self.content[offset..self.gap_start]);
            result.extend(&self.content[self.gap_end..end + self.gap_size()]);
        }
        Ok(result)
    }

    fn len(&self) -> usize {
        self.content.len() - self.gap_size()
    }

    fn replace(&mut self, offset: usize, length: usize, text: &str) -> Result<(), StoreError> {
        let len = TextStore::len(self);
        match offset.checked_add(length) {
            Some(end) if end <= len => {}
            end => {
                return Err(StoreError::InvalidRange {
                    offset,
                    end: end.unwrap_or(usize::MAX),
                    length: len,
                });
            }
        }

        let add = char_len(text);
        self.adjust_gap(offset, length, add);
        for (slot, ch) in self.content[offset..offset + add].iter_mut().zip(text.chars()) {
            *slot = ch;
        }
        Ok(())
    }
}

impl CharSequence for GapTextStore {
    fn len(&self) -> usize {
        TextStore::len(self)
    }

    fn char_at(&self, index: usize) -> char {
        self.content[self.physical(index)]
    }
}
