//! Annotations: client data attached to ranges of a [`Document`].
//!
//! An [`AnnotationModel`] keeps the range of each annotation in a position category of its
//! own, moved by a [`DefaultPositionUpdater`]. An edit that deletes a range also removes its
//! annotation from the model, and every registered [`AnnotationModelListener`] hears about it
//! like any other change of the model.
//!
//! A model is used with one document at a time. Disconnecting keeps the annotations with their
//! last known ranges; connecting again re-anchors them, dropping the ones that no longer fit.
//!
//! # Example
//!
//! ```rust
//! use document_core::{Annotation, AnnotationModel, Document, Position};
//!
//! let mut doc = Document::with_text("let x = 1;\nlet y = x;\n");
//! let mut model = AnnotationModel::new();
//! model.connect(&mut doc).unwrap();
//!
//! let unused = model
//!     .add_annotation(&mut doc, Annotation::new("warning", "unused `y`"), Position::new(15, 1))
//!     .unwrap();
//!
//! doc.replace(0, 0, "// demo\n").unwrap();
//! assert_eq!(model.position(&doc, unused).map(|p| p.offset), Some(23));
//!
//! // Deleting the whole second line deletes the annotation with it.
//! doc.replace(19, 11, "").unwrap();
//! assert!(!model.contains_annotation(unused));
//! ```

use crate::document::{
    Document, DocumentError, DocumentListener, ListenerError, ListenerId, NotificationContext,
};
use crate::event::DocumentEvent;
use crate::line_tracker::BadLocation;
use crate::position::{DefaultPositionUpdater, Position, PositionId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Handle of an annotation inside its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationId(u64);

/// Handle of a registered [`AnnotationModelListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationListenerId(u64);

/// Client data attached to a range.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Annotation {
    /// What the annotation marks (`"error"`, `"bookmark"`, ...).
    pub kind: String,
    /// Text shown for it.
    pub text: String,
}

impl Annotation {
    /// Create an annotation.
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
        }
    }
}

/// One change of an annotation model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationModelEvent {
    /// Annotations added.
    pub added: Vec<AnnotationId>,
    /// Annotations removed, with their last state and range.
    pub removed: Vec<(AnnotationId, Annotation, Position)>,
    /// Annotations whose data or range was modified.
    pub changed: Vec<AnnotationId>,
    /// Set when anything may have changed, e.g. for a newly registered listener.
    pub world_change: bool,
}

impl AnnotationModelEvent {
    /// Returns `true` if the event reports nothing.
    pub fn is_empty(&self) -> bool {
        !self.world_change
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
    }
}

/// Observer of annotation model changes.
///
/// Closures `FnMut(&AnnotationModelEvent)` implement this trait.
pub trait AnnotationModelListener: Send {
    /// Called once per model change that added, removed or changed something.
    fn model_changed(&mut self, event: &AnnotationModelEvent);
}

impl<F> AnnotationModelListener for F
where
    F: FnMut(&AnnotationModelEvent) + Send,
{
    fn model_changed(&mut self, event: &AnnotationModelEvent) {
        self(event)
    }
}

/// Annotation model failures.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("annotation model is not connected to a document")]
    /// The operation needs a connected document.
    NotConnected,

    #[error("unknown annotation {0:?}")]
    /// Reference to an annotation that is not in the model.
    UnknownAnnotation(AnnotationId),

    #[error(transparent)]
    /// The document rejected a range.
    Document(#[from] DocumentError),
}

#[derive(Debug, Clone, Copy)]
enum Anchor {
    /// Position tracked by the connected document
    Tracked(PositionId),
    /// Last known range while disconnected
    Detached(Position),
}

struct Entry {
    annotation: Annotation,
    anchor: Anchor,
}

#[derive(Default)]
struct AnnotationState {
    annotations: BTreeMap<AnnotationId, Entry>,
    by_position: HashMap<PositionId, AnnotationId>,
    listeners: Vec<(AnnotationListenerId, Box<dyn AnnotationModelListener>)>,
    next_id: u64,
}

impl AnnotationState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert(&mut self, annotation: Annotation, anchor: Anchor) -> AnnotationId {
        let id = AnnotationId(self.next_id());
        if let Anchor::Tracked(position_id) = anchor {
            self.by_position.insert(position_id, id);
        }
        self.annotations.insert(id, Entry { annotation, anchor });
        id
    }

    fn remove(&mut self, id: AnnotationId) -> Option<Entry> {
        let entry = self.annotations.remove(&id)?;
        if let Anchor::Tracked(position_id) = entry.anchor {
            self.by_position.remove(&position_id);
        }
        Some(entry)
    }

    fn fire(&mut self, event: AnnotationModelEvent) {
        if event.is_empty() {
            return;
        }
        tracing::debug!(
            added = event.added.len(),
            removed = event.removed.len(),
            changed = event.changed.len(),
            "annotation model changed"
        );
        for (_, listener) in &mut self.listeners {
            listener.model_changed(&event);
        }
    }
}

fn lock(state: &Mutex<AnnotationState>) -> MutexGuard<'_, AnnotationState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drops the annotations whose ranges an edit deleted.
struct AnnotationPruner {
    state: Arc<Mutex<AnnotationState>>,
    category: String,
}

impl DocumentListener for AnnotationPruner {
    fn document_changed(
        &mut self,
        _event: &DocumentEvent,
        context: &mut NotificationContext<'_>,
    ) -> Result<(), ListenerError> {
        let deleted = context.deleted_positions(&self.category);
        if deleted.is_empty() {
            return Ok(());
        }

        let mut state = lock(&self.state);
        let mut event = AnnotationModelEvent::default();
        for (position_id, position) in deleted {
            let Some(id) = state.by_position.get(position_id).copied() else {
                continue;
            };
            if let Some(entry) = state.remove(id) {
                event.removed.push((id, entry.annotation, *position));
            }
        }
        state.fire(event);
        Ok(())
    }
}

/// Whether `position` lies in `region` under the given boundary rules.
fn is_within_region(
    region: &Position,
    position: &Position,
    can_start_before: bool,
    can_end_after: bool,
) -> bool {
    let last = position.end() - usize::from(position.length > 0);
    match (can_start_before, can_end_after) {
        (true, true) => region.overlaps_with(position.offset, position.length),
        (true, false) => region.includes(last),
        (false, true) => region.includes(position.offset),
        (false, false) => region.includes(position.offset) && region.includes(last),
    }
}

static NEXT_MODEL: AtomicU64 = AtomicU64::new(0);

/// Annotations over the ranges of one connected document.
pub struct AnnotationModel {
    state: Arc<Mutex<AnnotationState>>,
    category: String,
    listener: Option<ListenerId>,
}

impl AnnotationModel {
    /// Create an empty, disconnected model.
    pub fn new() -> Self {
        let n = NEXT_MODEL.fetch_add(1, Ordering::Relaxed);
        Self {
            state: Arc::default(),
            category: format!("__annotation_model_{n}"),
            listener: None,
        }
    }

    /// Name of the position category holding the ranges while connected.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Returns `true` while connected to a document.
    pub fn is_connected(&self) -> bool {
        self.listener.is_some()
    }

    /// Attach to `document`, tracking every annotation's range in it.
    ///
    /// Connecting again first detaches from `document`. Annotations whose last known range
    /// does not fit the document are removed.
    pub fn connect(&mut self, document: &mut Document) -> Result<(), AnnotationError> {
        self.disconnect(document);
        document.add_position_category(&self.category);
        document.add_position_updater(&self.category, DefaultPositionUpdater)?;

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let mut dropped = Vec::new();
        for (id, entry) in &mut state.annotations {
            let Anchor::Detached(range) = entry.anchor else {
                continue;
            };
            match document.add_position(&self.category, Position::new(range.offset, range.length))
            {
                Ok(position_id) => {
                    entry.anchor = Anchor::Tracked(position_id);
                    state.by_position.insert(position_id, *id);
                }
                Err(error) => {
                    tracing::debug!(annotation = ?id, %error, "annotation no longer fits");
                    dropped.push((*id, range));
                }
            }
        }

        let mut event = AnnotationModelEvent::default();
        for (id, range) in dropped {
            if let Some(entry) = state.remove(id) {
                event.removed.push((id, entry.annotation, range));
            }
        }
        state.fire(event);
        drop(guard);

        self.listener = Some(document.add_document_listener(AnnotationPruner {
            state: Arc::clone(&self.state),
            category: self.category.clone(),
        }));
        Ok(())
    }

    /// Detach from `document`, remembering every annotation's current range.
    pub fn disconnect(&mut self, document: &mut Document) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        document.remove_document_listener(listener);

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        for entry in state.annotations.values_mut() {
            if let Anchor::Tracked(position_id) = entry.anchor {
                let range = document
                    .position(&self.category, position_id)
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                entry.anchor = Anchor::Detached(Position::new(range.offset, range.length));
            }
        }
        state.by_position.clear();

        if let Err(error) = document.remove_position_category(&self.category) {
            tracing::debug!(%error, "annotation category already gone");
        }
    }

    /// Fails unless connected, and forgets the deleted positions of the category: their
    /// annotations were pruned when the edit happened.
    fn attached(&self, document: &mut Document) -> Result<(), AnnotationError> {
        if self.listener.is_none() {
            return Err(AnnotationError::NotConnected);
        }
        document.forget_deleted_positions(&self.category)?;
        Ok(())
    }

    fn check_range(document: &Document, range: &Position) -> Result<(), AnnotationError> {
        BadLocation::check_range(range.offset, range.length, document.len())
            .map_err(DocumentError::from)?;
        Ok(())
    }

    /// Stop tracking `anchor`, returning its last range.
    fn release(&self, document: &mut Document, anchor: Anchor) -> Position {
        match anchor {
            Anchor::Tracked(position_id) => document
                .remove_position(&self.category, position_id)
                .ok()
                .flatten()
                .unwrap_or_default(),
            Anchor::Detached(range) => range,
        }
    }

    fn track(
        &self,
        document: &mut Document,
        range: &Position,
    ) -> Result<PositionId, AnnotationError> {
        Ok(document.add_position(&self.category, Position::new(range.offset, range.length))?)
    }

    // ----- Changes -----

    /// Attach `annotation` to `range`.
    pub fn add_annotation(
        &mut self,
        document: &mut Document,
        annotation: Annotation,
        range: Position,
    ) -> Result<AnnotationId, AnnotationError> {
        self.attached(document)?;
        let position_id = self.track(document, &range)?;

        let mut state = lock(&self.state);
        let id = state.insert(annotation, Anchor::Tracked(position_id));
        state.fire(AnnotationModelEvent {
            added: vec![id],
            ..AnnotationModelEvent::default()
        });
        Ok(id)
    }

    /// Remove an annotation, returning it. Unknown ids are ignored.
    pub fn remove_annotation(
        &mut self,
        document: &mut Document,
        id: AnnotationId,
    ) -> Result<Option<Annotation>, AnnotationError> {
        self.attached(document)?;
        let mut state = lock(&self.state);
        let Some(entry) = state.remove(id) else {
            return Ok(None);
        };
        let range = self.release(document, entry.anchor);
        state.fire(AnnotationModelEvent {
            removed: vec![(id, entry.annotation.clone(), range)],
            ..AnnotationModelEvent::default()
        });
        Ok(Some(entry.annotation))
    }

    /// Remove every annotation.
    pub fn remove_all_annotations(&mut self, document: &mut Document) -> Result<(), AnnotationError> {
        self.attached(document)?;
        let mut state = lock(&self.state);
        let mut event = AnnotationModelEvent::default();
        for (id, entry) in std::mem::take(&mut state.annotations) {
            let range = self.release(document, entry.anchor);
            event.removed.push((id, entry.annotation, range));
        }
        state.by_position.clear();
        state.fire(event);
        Ok(())
    }

    /// Remove `remove` and add `add` as a single model change.
    ///
    /// Every new range is validated first; on failure nothing changes.
    pub fn replace_annotations(
        &mut self,
        document: &mut Document,
        remove: &[AnnotationId],
        add: Vec<(Annotation, Position)>,
    ) -> Result<Vec<AnnotationId>, AnnotationError> {
        self.attached(document)?;
        for (_, range) in &add {
            Self::check_range(document, range)?;
        }

        let mut state = lock(&self.state);
        let mut event = AnnotationModelEvent::default();
        for &id in remove {
            if let Some(entry) = state.remove(id) {
                let range = self.release(document, entry.anchor);
                event.removed.push((id, entry.annotation, range));
            }
        }
        for (annotation, range) in add {
            let position_id = self.track(document, &range)?;
            let id = state.insert(annotation, Anchor::Tracked(position_id));
            event.added.push(id);
        }
        let added = event.added.clone();
        state.fire(event);
        Ok(added)
    }

    /// Move an annotation to `range`, or remove it when `range` is `None`.
    pub fn modify_annotation_position(
        &mut self,
        document: &mut Document,
        id: AnnotationId,
        range: Option<Position>,
    ) -> Result<(), AnnotationError> {
        let Some(range) = range else {
            return self.remove_annotation(document, id).map(|_| ());
        };
        self.attached(document)?;
        Self::check_range(document, &range)?;

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let entry = state
            .annotations
            .get_mut(&id)
            .ok_or(AnnotationError::UnknownAnnotation(id))?;
        let current = match entry.anchor {
            Anchor::Tracked(position_id) => document.position(&self.category, position_id)?,
            Anchor::Detached(range) => Some(range),
        };
        if current.map(|p| (p.offset, p.length)) != Some((range.offset, range.length)) {
            let old = self.release(document, entry.anchor);
            tracing::trace!(annotation = ?id, from = old.offset, to = range.offset, "annotation moved");
            if let Anchor::Tracked(position_id) = entry.anchor {
                state.by_position.remove(&position_id);
            }
            let position_id = self.track(document, &range)?;
            entry.anchor = Anchor::Tracked(position_id);
            state.by_position.insert(position_id, id);
        }
        state.fire(AnnotationModelEvent {
            changed: vec![id],
            ..AnnotationModelEvent::default()
        });
        Ok(())
    }

    /// Edit the data of an annotation in place.
    pub fn modify_annotation<F>(&mut self, id: AnnotationId, modify: F) -> Result<(), AnnotationError>
    where
        F: FnOnce(&mut Annotation),
    {
        let mut state = lock(&self.state);
        let entry = state
            .annotations
            .get_mut(&id)
            .ok_or(AnnotationError::UnknownAnnotation(id))?;
        modify(&mut entry.annotation);
        state.fire(AnnotationModelEvent {
            changed: vec![id],
            ..AnnotationModelEvent::default()
        });
        Ok(())
    }

    // ----- Queries -----

    /// Number of annotations.
    pub fn len(&self) -> usize {
        lock(&self.state).annotations.len()
    }

    /// Returns `true` if the model holds no annotation.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `id` is in the model.
    pub fn contains_annotation(&self, id: AnnotationId) -> bool {
        lock(&self.state).annotations.contains_key(&id)
    }

    /// A copy of the annotation's data.
    pub fn annotation(&self, id: AnnotationId) -> Option<Annotation> {
        lock(&self.state)
            .annotations
            .get(&id)
            .map(|entry| entry.annotation.clone())
    }

    /// Current range of an annotation.
    pub fn position(&self, document: &Document, id: AnnotationId) -> Option<Position> {
        let anchor = lock(&self.state).annotations.get(&id)?.anchor;
        match anchor {
            Anchor::Tracked(position_id) => document
                .position(&self.category, position_id)
                .ok()
                .flatten()
                .filter(|p| !p.is_deleted()),
            Anchor::Detached(range) => Some(range),
        }
    }

    /// Every annotation with its range, sorted by offset.
    pub fn annotations(&self, document: &Document) -> Vec<(AnnotationId, Annotation, Position)> {
        self.collect(document, |_| true)
    }

    /// Annotations whose range lies in `[offset, offset + length)`, sorted by offset.
    ///
    /// `can_start_before` admits ranges starting before the region, `can_end_after` ranges
    /// ending after it. With both set, any overlap qualifies.
    pub fn annotations_in(
        &self,
        document: &Document,
        offset: usize,
        length: usize,
        can_start_before: bool,
        can_end_after: bool,
    ) -> Vec<(AnnotationId, Annotation, Position)> {
        let region = Position::new(offset, length);
        self.collect(document, |position| {
            is_within_region(&region, position, can_start_before, can_end_after)
        })
    }

    fn collect<F>(&self, document: &Document, keep: F) -> Vec<(AnnotationId, Annotation, Position)>
    where
        F: Fn(&Position) -> bool,
    {
        let state = lock(&self.state);
        if self.is_connected() {
            return document
                .positions(&self.category)
                .unwrap_or_default()
                .into_iter()
                .filter(|(_, position)| keep(position))
                .filter_map(|(position_id, position)| {
                    let id = *state.by_position.get(&position_id)?;
                    let entry = state.annotations.get(&id)?;
                    Some((id, entry.annotation.clone(), position))
                })
                .collect();
        }

        let mut found: Vec<_> = state
            .annotations
            .iter()
            .filter_map(|(id, entry)| match entry.anchor {
                Anchor::Detached(range) if keep(&range) => {
                    Some((*id, entry.annotation.clone(), range))
                }
                _ => None,
            })
            .collect();
        found.sort_by_key(|(_, _, range)| range.offset);
        found
    }

    // ----- Listeners -----

    /// Register a listener. It is first told that the whole model may have changed.
    pub fn add_annotation_model_listener<L>(&mut self, listener: L) -> AnnotationListenerId
    where
        L: AnnotationModelListener + 'static,
    {
        let mut state = lock(&self.state);
        let id = AnnotationListenerId(state.next_id());
        let mut listener: Box<dyn AnnotationModelListener> = Box::new(listener);
        listener.model_changed(&AnnotationModelEvent {
            world_change: true,
            ..AnnotationModelEvent::default()
        });
        state.listeners.push((id, listener));
        id
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_annotation_model_listener(&mut self, id: AnnotationListenerId) -> bool {
        let mut state = lock(&self.state);
        let before = state.listeners.len();
        state.listeners.retain(|(listener, _)| *listener != id);
        state.listeners.len() != before
    }
}

impl Default for AnnotationModel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AnnotationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("AnnotationModel")
            .field("category", &self.category)
            .field("connected", &self.is_connected())
            .field("annotations", &state.annotations.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(text: &str) -> (Document, AnnotationModel) {
        let mut doc = Document::with_text(text);
        let mut model = AnnotationModel::new();
        model.connect(&mut doc).unwrap();
        (doc, model)
    }

    #[test]
    fn test_region_rules() {
        // Region [10, 20)
        let region = Position::new(10, 10);
        let inside = Position::new(12, 3);
        let before = Position::new(8, 4);
        let after = Position::new(18, 4);
        let around = Position::new(5, 20);

        for (position, expected) in [
            (inside, [true, true, true, true]),
            (before, [true, true, false, false]),
            (after, [true, false, true, false]),
            (around, [true, false, false, false]),
        ] {
            let actual = [
                is_within_region(&region, &position, true, true),
                is_within_region(&region, &position, true, false),
                is_within_region(&region, &position, false, true),
                is_within_region(&region, &position, false, false),
            ];
            assert_eq!(actual, expected, "{position:?}");
        }

        let empty = Position::new(20, 0);
        assert!(!is_within_region(&region, &empty, false, false));
        assert!(is_within_region(&region, &Position::new(19, 0), false, false));
    }

    #[test]
    fn test_requires_connection() {
        let mut doc = Document::with_text("abc");
        let mut model = AnnotationModel::new();
        assert!(matches!(
            model.add_annotation(&mut doc, Annotation::default(), Position::new(0, 1)),
            Err(AnnotationError::NotConnected)
        ));
    }

    #[test]
    fn test_invalid_range_is_rejected() {
        let (mut doc, mut model) = connected("abc");
        let err = model
            .add_annotation(&mut doc, Annotation::default(), Position::new(2, 5))
            .unwrap_err();
        assert!(matches!(err, AnnotationError::Document(DocumentError::BadLocation(_))));
        assert!(model.is_empty());
    }

    #[test]
    fn test_modify_annotation_fires_changed() {
        let (mut doc, mut model) = connected("abc");
        let id = model
            .add_annotation(&mut doc, Annotation::new("todo", "a"), Position::new(0, 1))
            .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        model.add_annotation_model_listener(move |event: &AnnotationModelEvent| {
            sink.lock().unwrap().push(event.clone());
        });

        model.modify_annotation(id, |a| a.text.push('!')).unwrap();
        assert_eq!(model.annotation(id).unwrap().text, "a!");

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].world_change);
        assert_eq!(events[1].changed, vec![id]);
    }

    #[test]
    fn test_disconnect_drops_the_category() {
        let (mut doc, mut model) = connected("abc");
        model
            .add_annotation(&mut doc, Annotation::default(), Position::new(1, 1))
            .unwrap();
        let category = model.category().to_string();
        assert!(doc.contains_position_category(&category));

        model.disconnect(&mut doc);
        assert!(!doc.contains_position_category(&category));
        assert_eq!(model.len(), 1);
    }
}
