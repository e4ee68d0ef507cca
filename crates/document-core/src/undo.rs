//! Undo/redo history for a [`Document`].
//!
//! [`UndoManager::connect`] installs a listener that records every replace as an invertible
//! edit together with the modification stamps around it. Undoing replays the inverse edits in
//! reverse order and reinstalls the old stamps, so a full undo leaves the document with exactly
//! the stamp it had before the first edit.
//!
//! Edits made between [`begin_compound_change`](UndoManager::begin_compound_change) and the
//! matching [`end_compound_change`](UndoManager::end_compound_change) form one undo step.
//! Compound changes nest; a compound left open is closed by the next undo or redo.
//!
//! # Example
//!
//! ```rust
//! use document_core::{Document, UndoManager};
//!
//! let mut doc = Document::with_text("abc");
//! let stamp = doc.modification_stamp();
//!
//! let mut undo = UndoManager::new(100);
//! undo.connect(&mut doc);
//!
//! undo.begin_compound_change();
//! doc.replace(0, 1, "A").unwrap();
//! doc.replace(3, 0, "!").unwrap();
//! undo.end_compound_change();
//!
//! assert!(undo.undo(&mut doc).unwrap());
//! assert_eq!(doc.get(), "abc");
//! assert_eq!(doc.modification_stamp(), stamp);
//! ```

use crate::document::{
    Document, DocumentError, DocumentListener, ListenerError, ListenerId, NotificationContext,
};
use crate::event::DocumentEvent;
use crate::text::char_len;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct TextEdit {
    offset: usize,
    replaced_text: String,
    text: String,
    stamp_before: u64,
    stamp_after: u64,
}

#[derive(Debug, Clone)]
struct UndoStep {
    group_id: usize,
    edit: TextEdit,
}

#[derive(Debug)]
struct UndoHistory {
    undo_stack: Vec<UndoStep>,
    redo_stack: Vec<UndoStep>,
    /// Number of distinct groups on each stack
    undo_groups: usize,
    redo_groups: usize,
    max_undo: usize,
    next_group_id: usize,
    compound_depth: usize,
    open_group_id: Option<usize>,
    /// Set while the manager itself edits the document
    replaying: bool,
}

impl UndoHistory {
    fn new(max_undo: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            undo_groups: 0,
            redo_groups: 0,
            max_undo,
            next_group_id: 0,
            compound_depth: 0,
            open_group_id: None,
            replaying: false,
        }
    }

    fn allocate_group(&mut self) -> usize {
        let id = self.next_group_id;
        self.next_group_id = self.next_group_id.wrapping_add(1);
        id
    }

    fn close_compound(&mut self) {
        if self.compound_depth > 0 {
            tracing::debug!(depth = self.compound_depth, "closing unfinished compound change");
        }
        self.compound_depth = 0;
        self.open_group_id = None;
    }

    fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.undo_groups = 0;
        self.redo_groups = 0;
    }

    fn record(&mut self, edit: TextEdit) {
        self.redo_stack.clear();
        self.redo_groups = 0;

        let group_id = if self.compound_depth > 0 {
            match self.open_group_id {
                Some(id) => id,
                None => {
                    let id = self.allocate_group();
                    self.open_group_id = Some(id);
                    id
                }
            }
        } else {
            self.allocate_group()
        };
        if self.undo_stack.last().map(|step| step.group_id) != Some(group_id) {
            self.undo_groups += 1;
        }
        self.undo_stack.push(UndoStep { group_id, edit });

        while self.undo_groups > self.max_undo {
            let oldest = self.undo_stack[0].group_id;
            let end = self
                .undo_stack
                .iter()
                .position(|step| step.group_id != oldest)
                .unwrap_or(self.undo_stack.len());
            self.undo_stack.drain(..end);
            self.undo_groups -= 1;
        }
    }

    /// Pop the newest group of the undo stack, newest edit first.
    fn pop_undo(&mut self) -> Option<Vec<UndoStep>> {
        let steps = pop_group(&mut self.undo_stack)?;
        self.undo_groups -= 1;
        Some(steps)
    }

    /// Pop the newest group of the redo stack, oldest edit first.
    fn pop_redo(&mut self) -> Option<Vec<UndoStep>> {
        let steps = pop_group(&mut self.redo_stack)?;
        self.redo_groups -= 1;
        Some(steps)
    }

    /// Push a group in the order it was popped from the opposite stack.
    fn push_undo(&mut self, steps: impl IntoIterator<Item = UndoStep>) {
        if push_group(&mut self.undo_stack, steps) {
            self.undo_groups += 1;
        }
    }

    fn push_redo(&mut self, steps: impl IntoIterator<Item = UndoStep>) {
        if push_group(&mut self.redo_stack, steps) {
            self.redo_groups += 1;
        }
    }
}

fn pop_group(stack: &mut Vec<UndoStep>) -> Option<Vec<UndoStep>> {
    let last_group_id = stack.last().map(|s| s.group_id)?;
    let mut steps = Vec::new();
    while stack.last().is_some_and(|step| step.group_id == last_group_id) {
        steps.extend(stack.pop());
    }
    Some(steps)
}

/// Returns whether the stack gained a group. Steps of the group already on top (the other
/// half of a partially replayed group) join it.
fn push_group(stack: &mut Vec<UndoStep>, steps: impl IntoIterator<Item = UndoStep>) -> bool {
    let top = stack.last().map(|step| step.group_id);
    let mut steps = steps.into_iter().peekable();
    let Some(first) = steps.peek().map(|step| step.group_id) else {
        return false;
    };
    stack.extend(steps);
    top != Some(first)
}

fn lock(history: &Mutex<UndoHistory>) -> MutexGuard<'_, UndoHistory> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

struct UndoRecorder {
    history: Arc<Mutex<UndoHistory>>,
}

impl DocumentListener for UndoRecorder {
    fn document_changed(
        &mut self,
        event: &DocumentEvent,
        _context: &mut NotificationContext<'_>,
    ) -> Result<(), ListenerError> {
        let mut history = lock(&self.history);
        if !history.replaying {
            history.record(TextEdit {
                offset: event.offset,
                replaced_text: event.replaced_text.clone(),
                text: event.text.clone(),
                stamp_before: event.previous_stamp,
                stamp_after: event.modification_stamp,
            });
        }
        Ok(())
    }
}

/// Records document edits and undoes/redoes them in groups.
#[derive(Debug)]
pub struct UndoManager {
    history: Arc<Mutex<UndoHistory>>,
    listener: Option<ListenerId>,
}

impl UndoManager {
    /// Create a manager keeping at most `max_undo` undo steps.
    pub fn new(max_undo: usize) -> Self {
        Self {
            history: Arc::new(Mutex::new(UndoHistory::new(max_undo))),
            listener: None,
        }
    }

    /// Start recording the edits of `document`.
    ///
    /// Connecting again first detaches the previous recorder from `document`.
    pub fn connect(&mut self, document: &mut Document) {
        self.disconnect(document);
        let recorder = UndoRecorder {
            history: Arc::clone(&self.history),
        };
        self.listener = Some(document.add_document_listener(recorder));
    }

    /// Stop recording the edits of `document`. The history is kept.
    pub fn disconnect(&mut self, document: &mut Document) {
        if let Some(id) = self.listener.take() {
            document.remove_document_listener(id);
        }
    }

    /// Returns `true` while connected to a document.
    pub fn is_connected(&self) -> bool {
        self.listener.is_some()
    }

    /// Open a compound change. Calls nest.
    pub fn begin_compound_change(&mut self) {
        let mut history = lock(&self.history);
        if history.compound_depth == 0 {
            history.open_group_id = None;
        }
        history.compound_depth += 1;
    }

    /// Close the innermost compound change.
    pub fn end_compound_change(&mut self) {
        let mut history = lock(&self.history);
        history.compound_depth = history.compound_depth.saturating_sub(1);
        if history.compound_depth == 0 {
            history.open_group_id = None;
        }
    }

    /// Whether there is a step to undo.
    pub fn can_undo(&self) -> bool {
        !lock(&self.history).undo_stack.is_empty()
    }

    /// Whether there is a step to redo.
    pub fn can_redo(&self) -> bool {
        !lock(&self.history).redo_stack.is_empty()
    }

    /// Number of undo steps.
    pub fn undo_depth(&self) -> usize {
        lock(&self.history).undo_groups
    }

    /// Number of redo steps.
    pub fn redo_depth(&self) -> usize {
        lock(&self.history).redo_groups
    }

    /// Forget the whole history and close any open compound change.
    pub fn reset(&mut self) {
        let mut history = lock(&self.history);
        history.clear();
        history.close_compound();
    }

    /// Undo the most recent step. Returns `Ok(false)` if there was nothing to undo.
    ///
    /// If the history no longer fits the document, the edits undone so far move to the redo
    /// stack, the rest stay on the undo stack, and the error is returned.
    pub fn undo(&mut self, document: &mut Document) -> Result<bool, DocumentError> {
        let mut steps = {
            let mut history = lock(&self.history);
            history.close_compound();
            match history.pop_undo() {
                Some(steps) => steps,
                None => return Ok(false),
            }
        };
        tracing::debug!(edits = steps.len(), "undo");

        // Newest edit first: each inverse restores the stamp the edit replaced.
        let (applied, result) = self.replay(document, &steps, |edit| {
            (
                edit.offset,
                char_len(&edit.text),
                edit.replaced_text.as_str(),
                edit.stamp_before,
            )
        });

        let remaining = steps.split_off(applied);
        let mut history = lock(&self.history);
        history.push_redo(steps);
        history.push_undo(remaining.into_iter().rev());
        result.map(|()| true)
    }

    /// Redo the most recently undone step. Returns `Ok(false)` if there was nothing to redo.
    ///
    /// A partial failure splits the step the same way [`undo`](Self::undo) does.
    pub fn redo(&mut self, document: &mut Document) -> Result<bool, DocumentError> {
        let mut steps = {
            let mut history = lock(&self.history);
            history.close_compound();
            match history.pop_redo() {
                Some(steps) => steps,
                None => return Ok(false),
            }
        };
        tracing::debug!(edits = steps.len(), "redo");

        let (applied, result) = self.replay(document, &steps, |edit| {
            (
                edit.offset,
                char_len(&edit.replaced_text),
                edit.text.as_str(),
                edit.stamp_after,
            )
        });

        let remaining = steps.split_off(applied);
        let mut history = lock(&self.history);
        history.push_undo(steps);
        history.push_redo(remaining.into_iter().rev());
        result.map(|()| true)
    }

    /// Apply one replace per step without recording it, returning how many steps were applied.
    ///
    /// Listener failures do not stop the replay; they are returned once every step ran. A
    /// step the document rejects stops it.
    fn replay<'s, F>(
        &self,
        document: &mut Document,
        steps: &'s [UndoStep],
        replace_for: F,
    ) -> (usize, Result<(), DocumentError>)
    where
        F: Fn(&'s TextEdit) -> (usize, usize, &'s str, u64),
    {
        lock(&self.history).replaying = true;

        let mut failures = Vec::new();
        let mut applied = 0;
        let mut rejected = None;
        for step in steps {
            let (offset, length, text, stamp) = replace_for(&step.edit);
            match document.replace_with_stamp(offset, length, text, stamp) {
                Ok(()) => {}
                Err(DocumentError::Listener { failures: nested }) => failures.extend(nested),
                Err(err) => {
                    tracing::warn!(error = %err, applied, "undo history does not match the document");
                    rejected = Some(err);
                    break;
                }
            }
            applied += 1;
        }

        lock(&self.history).replaying = false;
        let result = match rejected {
            Some(err) => Err(err),
            None if failures.is_empty() => Ok(()),
            None => Err(DocumentError::Listener { failures }),
        };
        (applied, result)
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(text: &str) -> (Document, UndoManager) {
        let mut doc = Document::with_text(text);
        let mut undo = UndoManager::new(16);
        undo.connect(&mut doc);
        (doc, undo)
    }

    #[test]
    fn test_single_edit_round_trip() {
        let (mut doc, mut undo) = connected("hello");
        let stamp = doc.modification_stamp();
        doc.replace(0, 1, "J").unwrap();
        assert_eq!(undo.undo_depth(), 1);

        assert!(undo.undo(&mut doc).unwrap());
        assert_eq!(doc.get(), "hello");
        assert_eq!(doc.modification_stamp(), stamp);
        assert!(undo.can_redo());

        assert!(undo.redo(&mut doc).unwrap());
        assert_eq!(doc.get(), "Jello");
        assert!(!undo.can_redo());
    }

    #[test]
    fn test_nothing_to_undo() {
        let (mut doc, mut undo) = connected("x");
        assert!(!undo.undo(&mut doc).unwrap());
        assert!(!undo.redo(&mut doc).unwrap());
    }

    #[test]
    fn test_nested_compound_is_one_step() {
        let (mut doc, mut undo) = connected("abc");
        undo.begin_compound_change();
        doc.replace(0, 0, "1").unwrap();
        undo.begin_compound_change();
        doc.replace(0, 0, "2").unwrap();
        undo.end_compound_change();
        doc.replace(0, 0, "3").unwrap();
        undo.end_compound_change();
        doc.replace(0, 0, "4").unwrap();

        assert_eq!(undo.undo_depth(), 2);
        undo.undo(&mut doc).unwrap();
        assert_eq!(doc.get(), "321abc");
        undo.undo(&mut doc).unwrap();
        assert_eq!(doc.get(), "abc");
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let (mut doc, mut undo) = connected("abc");
        doc.replace(0, 1, "").unwrap();
        undo.undo(&mut doc).unwrap();
        doc.replace(3, 0, "d").unwrap();
        assert!(!undo.can_redo());
        assert_eq!(undo.undo_depth(), 1);
    }

    #[test]
    fn test_limit_drops_oldest_steps() {
        let mut doc = Document::new();
        let mut undo = UndoManager::new(2);
        undo.connect(&mut doc);
        for ch in ["a", "b", "c"] {
            doc.replace(doc.len(), 0, ch).unwrap();
        }
        assert_eq!(undo.undo_depth(), 2);
        undo.undo(&mut doc).unwrap();
        undo.undo(&mut doc).unwrap();
        assert!(!undo.can_undo());
        assert_eq!(doc.get(), "a");
    }

    #[test]
    fn test_depths_follow_every_stack_change() {
        let mut doc = Document::new();
        let mut undo = UndoManager::new(3);
        undo.connect(&mut doc);

        for ch in ["a", "b"] {
            doc.replace(doc.len(), 0, ch).unwrap();
        }
        undo.begin_compound_change();
        doc.replace(0, 0, "1").unwrap();
        doc.replace(0, 0, "2").unwrap();
        undo.end_compound_change();
        assert_eq!((undo.undo_depth(), undo.redo_depth()), (3, 0));

        doc.replace(0, 0, "3").unwrap();
        assert_eq!((undo.undo_depth(), undo.redo_depth()), (3, 0));

        undo.undo(&mut doc).unwrap();
        undo.undo(&mut doc).unwrap();
        assert_eq!((undo.undo_depth(), undo.redo_depth()), (1, 2));
        assert_eq!(doc.get(), "ab");

        undo.redo(&mut doc).unwrap();
        assert_eq!((undo.undo_depth(), undo.redo_depth()), (2, 1));
        assert_eq!(doc.get(), "21ab");

        doc.replace(4, 0, "!").unwrap();
        assert_eq!((undo.undo_depth(), undo.redo_depth()), (3, 0));

        undo.reset();
        assert_eq!((undo.undo_depth(), undo.redo_depth()), (0, 0));
    }

    #[test]
    fn test_disconnect_stops_recording() {
        let (mut doc, mut undo) = connected("abc");
        undo.disconnect(&mut doc);
        assert!(!undo.is_connected());
        doc.replace(0, 1, "").unwrap();
        assert!(!undo.can_undo());
    }
}
