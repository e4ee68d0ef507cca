//! Child documents: editable windows onto a range of a parent document.
//!
//! A [`ChildDocument`] owns its own copy of the parent's `[offset, offset + length)` text, its
//! own position categories, listeners and stamps. The parent keeps the copy in sync:
//!
//! - an edit made through [`Document::replace_in_child`] is applied to the parent at
//!   `parent_offset + offset`, and flows back into the child from there;
//! - a parent edit that overlaps the child range, or inserts at either of its ends, is
//!   replayed on the child as the equivalent child-local edit, and the range is adjusted with
//!   inclusive boundaries;
//! - a parent edit before the range shifts it, one after the range leaves it alone.
//!
//! The range never extends past the end of the parent.
//!
//! # Memory
//!
//! Children share nothing with their parent. Each one holds its range in its own gap store,
//! and its line tracker keeps a second copy to rescan from, so a child costs about twice the
//! size of its range on top of the parent's text. Overlapping children each pay that again.
//! Dispose of children that are no longer needed with [`Document::dispose_child_document`].

use crate::config::DocumentConfig;
use crate::document::{Document, DocumentError, DocumentListener, ListenerFailure, ListenerId};
use crate::event::DocumentEvent;
use crate::line_tracker::BadLocation;
use crate::position::{Position, PositionId, PositionUpdater};
use std::fmt;
use std::ops::Deref;

/// Handle of a child document inside its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildId(u64);

/// A document mirroring a range of its parent.
///
/// Dereferences to [`Document`] for every read. Edits go through the parent
/// ([`Document::replace_in_child`]); positions and listeners are managed with the forwarding
/// methods below.
pub struct ChildDocument {
    document: Document,
    range: Position,
}

impl ChildDocument {
    /// Offset of the mirrored range in the parent.
    pub fn parent_offset(&self) -> usize {
        self.range.offset
    }

    /// Length of the mirrored range in the parent.
    pub fn parent_length(&self) -> usize {
        self.range.length
    }

    /// The child's own document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// See [`Document::add_position_category`].
    pub fn add_position_category(&mut self, category: &str) {
        self.document.add_position_category(category);
    }

    /// See [`Document::remove_position_category`].
    pub fn remove_position_category(&mut self, category: &str) -> Result<(), DocumentError> {
        self.document.remove_position_category(category)
    }

    /// See [`Document::add_position_updater`].
    pub fn add_position_updater<U>(&mut self, category: &str, updater: U) -> Result<(), DocumentError>
    where
        U: PositionUpdater + 'static,
    {
        self.document.add_position_updater(category, updater)
    }

    /// See [`Document::add_position`].
    pub fn add_position(
        &mut self,
        category: &str,
        position: Position,
    ) -> Result<PositionId, DocumentError> {
        self.document.add_position(category, position)
    }

    /// See [`Document::add_default_position`].
    pub fn add_default_position(
        &mut self,
        offset: usize,
        length: usize,
    ) -> Result<PositionId, DocumentError> {
        self.document.add_default_position(offset, length)
    }

    /// See [`Document::remove_position`].
    pub fn remove_position(
        &mut self,
        category: &str,
        id: PositionId,
    ) -> Result<Option<Position>, DocumentError> {
        self.document.remove_position(category, id)
    }

    /// See [`Document::add_document_listener`].
    ///
    /// Post-notification replaces registered by child listeners are ignored: a child only
    /// changes through its parent.
    pub fn add_document_listener<L>(&mut self, listener: L) -> ListenerId
    where
        L: DocumentListener + 'static,
    {
        self.document.add_document_listener(listener)
    }

    /// See [`Document::subscribe`].
    pub fn subscribe<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(&DocumentEvent) + Send + 'static,
    {
        self.document.subscribe(callback)
    }

    /// See [`Document::remove_document_listener`].
    pub fn remove_document_listener(&mut self, id: ListenerId) -> bool {
        self.document.remove_document_listener(id)
    }

    /// Adjust the range for a parent edit, returning the child-local `(offset, length)` of the
    /// edit if it touches the range.
    fn translate(&mut self, event: &DocumentEvent) -> Option<(usize, usize)> {
        let start = self.range.offset;
        let end = self.range.end();
        let edit_end = event.end();

        let before = edit_end < start
            || (edit_end == start && event.length > 0 && event.offset < start);
        let local = if before || event.offset > end {
            None
        } else {
            let first = event.offset.max(start);
            Some((first - start, edit_end.min(end) - first))
        };

        self.range
            .update_inclusive(event.offset, event.length, event.text_length());
        local
    }
}

impl Deref for ChildDocument {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.document
    }
}

impl fmt::Debug for ChildDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildDocument")
            .field("parent_offset", &self.range.offset)
            .field("parent_length", &self.range.length)
            .field("document", &self.document)
            .finish()
    }
}

impl Document {
    /// Create a child document mirroring `[offset, offset + length)`.
    ///
    /// The child uses the same legal line delimiters and store policy as this document.
    pub fn create_child_document(
        &mut self,
        offset: usize,
        length: usize,
    ) -> Result<ChildId, DocumentError> {
        BadLocation::check_range(offset, length, self.len())?;
        let text = self.get_range(offset, length)?;

        let mut document = Document::with_config(DocumentConfig {
            line_delimiters: self.legal_line_delimiters().to_vec(),
            store: self.store_config(),
        });
        document.load(&text);
        document.disable_post_notification_replaces();

        let id = ChildId(self.next_id());
        self.children.push((
            id,
            ChildDocument {
                document,
                range: Position::new(offset, length),
            },
        ));
        tracing::debug!(child = ?id, offset, length, "child document created");
        Ok(id)
    }

    /// A child document of this document.
    pub fn child_document(&self, id: ChildId) -> Result<&ChildDocument, DocumentError> {
        self.children
            .iter()
            .find(|(child, _)| *child == id)
            .map(|(_, child)| child)
            .ok_or(DocumentError::UnknownChild(id))
    }

    /// A child document of this document, for position and listener management.
    pub fn child_document_mut(&mut self, id: ChildId) -> Result<&mut ChildDocument, DocumentError> {
        self.children
            .iter_mut()
            .find(|(child, _)| *child == id)
            .map(|(_, child)| child)
            .ok_or(DocumentError::UnknownChild(id))
    }

    /// Ids of the live child documents, in creation order.
    pub fn child_document_ids(&self) -> impl Iterator<Item = ChildId> + '_ {
        self.children.iter().map(|(id, _)| *id)
    }

    /// Replace `length` characters at the child-local `offset` with `text`.
    ///
    /// The edit is applied to this document and forwarded back to the child, so the parent's
    /// listeners, positions and stamps see it like any other edit.
    pub fn replace_in_child(
        &mut self,
        id: ChildId,
        offset: usize,
        length: usize,
        text: &str,
    ) -> Result<(), DocumentError> {
        let child = self.child_document(id)?;
        BadLocation::check_range(offset, length, child.document.len())?;
        let parent_offset = child.range.offset + offset;
        self.replace(parent_offset, length, text)
    }

    /// Drop a child document.
    pub fn dispose_child_document(&mut self, id: ChildId) -> Result<(), DocumentError> {
        let index = self
            .children
            .iter()
            .position(|(child, _)| *child == id)
            .ok_or(DocumentError::UnknownChild(id))?;
        self.children.remove(index);
        tracing::debug!(child = ?id, "child document disposed");
        Ok(())
    }

    pub(crate) fn update_child_documents(
        &mut self,
        event: &DocumentEvent,
        failures: &mut Vec<ListenerFailure>,
    ) {
        for (id, child) in &mut self.children {
            let Some((offset, length)) = child.translate(event) else {
                continue;
            };
            if length == 0 && event.text.is_empty() {
                continue;
            }
            match child.document.replace(offset, length, &event.text) {
                Ok(()) => {}
                Err(DocumentError::Listener { failures: nested }) => failures.extend(nested),
                Err(err) => {
                    tracing::warn!(child = ?id, error = %err, "child document out of sync");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_mirrors_range() {
        let mut doc = Document::with_text("head[body]tail");
        let id = doc.create_child_document(5, 4).unwrap();
        let child = doc.child_document(id).unwrap();
        assert_eq!(child.get(), "body");
        assert_eq!((child.parent_offset(), child.parent_length()), (5, 4));
    }

    #[test]
    fn test_child_edit_goes_through_parent() {
        let mut doc = Document::with_text("head[body]tail");
        let id = doc.create_child_document(5, 4).unwrap();
        doc.replace_in_child(id, 1, 2, "OD").unwrap();
        assert_eq!(doc.get(), "head[bODy]tail");
        assert_eq!(doc.child_document(id).unwrap().get(), "bODy");
    }

    #[test]
    fn test_parent_edits_move_and_clip_child() {
        let mut doc = Document::with_text("head[body]tail");
        let id = doc.create_child_document(5, 4).unwrap();

        doc.replace(0, 4, "H").unwrap();
        let child = doc.child_document(id).unwrap();
        assert_eq!((child.parent_offset(), child.get()), (2, "body".to_string()));

        doc.replace(1, 3, "<").unwrap();
        let child = doc.child_document(id).unwrap();
        assert_eq!((child.parent_offset(), child.get()), (1, "<dy".to_string()));

        doc.replace(4, 0, "!").unwrap();
        assert_eq!(doc.get(), "H<dy!]tail");
        assert_eq!(doc.child_document(id).unwrap().get(), "<dy!");

        doc.replace(6, 0, "?").unwrap();
        assert_eq!(doc.child_document(id).unwrap().get(), "<dy!");
    }

    #[test]
    fn test_unknown_child() {
        let mut doc = Document::with_text("abc");
        let id = doc.create_child_document(0, 1).unwrap();
        doc.dispose_child_document(id).unwrap();
        assert!(matches!(
            doc.replace_in_child(id, 0, 0, "x"),
            Err(DocumentError::UnknownChild(_))
        ));
        assert!(doc.dispose_child_document(id).is_err());
    }
}
