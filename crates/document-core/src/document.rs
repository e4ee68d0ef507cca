//! Stage 3: Document & Position Model
//!
//! A [`Document`] composes a [`TextStore`], a [`LineTracker`], named position categories and an
//! ordered list of listeners into one editable text.
//!
//! # Replace protocol
//!
//! Every [`replace`](Document::replace) runs the same steps, in order:
//!
//! 1. validate the range (nothing is mutated on failure);
//! 2. notify listeners that the document is about to change;
//! 3. apply the edit to the text store and the line tracker, and advance the modification stamp;
//! 4. run each category's position updaters, in registration order;
//! 5. forward the edit to child documents whose range it touches;
//! 6. notify listeners that the document changed;
//! 7. run the post-notification replaces registered during step 6.
//!
//! Listener failures are isolated: every listener is notified even if an earlier one failed,
//! and the collected failures are returned as [`DocumentError::Listener`] once the edit is
//! complete.
//!
//! # Example
//!
//! ```rust
//! use document_core::{DEFAULT_CATEGORY, Document};
//!
//! let mut doc = Document::with_text("Hello World");
//! let id = doc.add_default_position(6, 5).unwrap();
//!
//! doc.replace(0, 5, "Goodbye,").unwrap();
//! assert_eq!(doc.get(), "Goodbye, World");
//!
//! let word = doc.position(DEFAULT_CATEGORY, id).unwrap().unwrap();
//! assert_eq!((word.offset, word.length), (9, 5));
//! ```

use crate::child::{ChildDocument, ChildId};
use crate::config::{DocumentConfig, GapTextStoreConfig};
use crate::event::DocumentEvent;
use crate::line_ending::LineEnding;
use crate::line_tracker::{BadLocation, Line, LineTracker, ListLineTracker};
use crate::position::{DefaultPositionUpdater, Position, PositionId, PositionUpdater};
use crate::storage::{GapTextStore, StoreError, TextStore};
use crate::text::CharSequence;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Name of the category every document registers at construction.
///
/// Positions in this category are moved by a [`DefaultPositionUpdater`].
pub const DEFAULT_CATEGORY: &str = "__dflt_position_category";

/// Error type returned by listeners.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A deferred edit registered by a listener during change notification.
pub type PostNotificationReplace =
    Box<dyn FnOnce(&mut Document) -> Result<(), DocumentError> + Send>;

/// Handle of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// One listener failure collected during notification.
#[derive(Debug)]
pub struct ListenerFailure {
    /// The failing listener.
    pub listener: ListenerId,
    /// What it returned.
    pub error: ListenerError,
}

/// Document-level failures.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    /// Offset, length or line outside the document.
    BadLocation(#[from] BadLocation),

    #[error("unknown position category '{0}'")]
    /// Reference to a category that is not registered.
    BadPositionCategory(String),

    #[error("unknown child document {0:?}")]
    /// Reference to a child document that does not exist (or was disposed).
    UnknownChild(ChildId),

    #[error("{} document listener(s) failed", .failures.len())]
    /// One or more listeners failed. The edit itself has been applied.
    Listener {
        /// Every failure, in notification order.
        failures: Vec<ListenerFailure>,
    },
}

impl From<StoreError> for DocumentError {
    fn from(err: StoreError) -> Self {
        let (offset, end, length) = match err {
            StoreError::OutOfRange {
                offset,
                end,
                length,
            }
            | StoreError::InvalidRange {
                offset,
                end,
                length,
            } => (offset, end, length),
        };
        Self::BadLocation(BadLocation::Range {
            offset,
            end,
            length,
        })
    }
}

/// Observer of document changes.
pub trait DocumentListener: Send {
    /// Called before the edit is applied; the document still has its old content.
    fn document_about_to_be_changed(&mut self, event: &DocumentEvent) -> Result<(), ListenerError> {
        let _ = event;
        Ok(())
    }

    /// Called after the edit and all position updates are applied.
    fn document_changed(
        &mut self,
        event: &DocumentEvent,
        context: &mut NotificationContext<'_>,
    ) -> Result<(), ListenerError>;
}

/// Positions one change deleted, grouped by category.
type DeletedPositions = Vec<(String, Vec<(PositionId, Position)>)>;

/// Per-listener view of the current notification.
pub struct NotificationContext<'a> {
    listener: ListenerId,
    queue: &'a mut Vec<(ListenerId, PostNotificationReplace)>,
    accepting: bool,
    deleted: &'a [(String, Vec<(PositionId, Position)>)],
}

impl NotificationContext<'_> {
    /// The listener being notified.
    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// Positions of `category` that the current change deleted, in their final state.
    pub fn deleted_positions(&self, category: &str) -> &[(PositionId, Position)] {
        self.deleted
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, positions)| positions.as_slice())
            .unwrap_or_default()
    }

    /// Schedule `replace` to run once the current notification has finished.
    ///
    /// Each listener gets at most one slot per change; later registrations in the same change
    /// are ignored. Registrations are also ignored while post-notification replaces are
    /// disabled or already being run. Returns whether the replace was queued.
    pub fn register_post_notification_replace<F>(&mut self, replace: F) -> bool
    where
        F: FnOnce(&mut Document) -> Result<(), DocumentError> + Send + 'static,
    {
        if !self.accepting || self.queue.iter().any(|(id, _)| *id == self.listener) {
            return false;
        }
        self.queue.push((self.listener, Box::new(replace)));
        true
    }
}

struct CallbackListener<F>(F);

impl<F> DocumentListener for CallbackListener<F>
where
    F: FnMut(&DocumentEvent) + Send,
{
    fn document_changed(
        &mut self,
        event: &DocumentEvent,
        _context: &mut NotificationContext<'_>,
    ) -> Result<(), ListenerError> {
        (self.0)(event);
        Ok(())
    }
}

/// Positions of one category, sorted by offset, and the updaters that move them.
#[derive(Default)]
struct Category {
    positions: Vec<(PositionId, Position)>,
    /// Positions an edit deleted, frozen until the client removes them
    deleted: BTreeMap<PositionId, Position>,
    updaters: Vec<Box<dyn PositionUpdater>>,
}

impl Category {
    fn insert(&mut self, id: PositionId, position: Position) {
        let index = self
            .positions
            .partition_point(|(_, p)| p.offset <= position.offset);
        self.positions.insert(index, (id, position));
    }

    /// Run the updater chain, returning the positions it deleted.
    fn update(&mut self, event: &DocumentEvent) -> Vec<(PositionId, Position)> {
        if self.updaters.is_empty() || self.positions.is_empty() {
            return Vec::new();
        }
        for updater in &self.updaters {
            for (_, position) in &mut self.positions {
                updater.update(event, position);
            }
        }

        let mut deleted = Vec::new();
        if self.positions.iter().any(|(_, p)| p.is_deleted()) {
            let tombstones = &mut self.deleted;
            self.positions.retain(|&(id, position)| {
                if position.is_deleted() {
                    tombstones.insert(id, position);
                    deleted.push((id, position));
                    false
                } else {
                    true
                }
            });
        }

        if !self
            .positions
            .windows(2)
            .all(|pair| pair[0].1.offset <= pair[1].1.offset)
        {
            self.positions.sort_by_key(|(_, p)| p.offset);
        }
        deleted
    }
}

/// An editable text with line tracking, tracked positions and change notification.
pub struct Document {
    store: Box<dyn TextStore>,
    tracker: Box<dyn LineTracker>,
    store_config: GapTextStoreConfig,
    categories: BTreeMap<String, Category>,
    listeners: Vec<(ListenerId, Box<dyn DocumentListener>)>,
    post_replaces: Vec<(ListenerId, PostNotificationReplace)>,
    accept_post_replaces: bool,
    running_post_replaces: bool,
    pub(crate) children: Vec<(ChildId, ChildDocument)>,
    modification_stamp: u64,
    highest_stamp: u64,
    next_id: u64,
}

impl Document {
    /// Create an empty document with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DocumentConfig::default())
    }

    /// Create a document holding `text`.
    pub fn with_text(text: &str) -> Self {
        let mut doc = Self::new();
        doc.load(text);
        doc
    }

    /// Create an empty document with the given delimiters and store policy.
    pub fn with_config(config: DocumentConfig) -> Self {
        let store = GapTextStore::with_config(config.store);
        let tracker = ListLineTracker::new(config.line_delimiters);
        let mut doc = Self::with_parts(Box::new(store), Box::new(tracker));
        doc.store_config = config.store;
        doc
    }

    /// Compose a document from an existing store and tracker.
    ///
    /// The tracker is reset to the store's current content.
    pub fn with_parts(store: Box<dyn TextStore>, mut tracker: Box<dyn LineTracker>) -> Self {
        tracker.set(&store.text());
        let mut categories = BTreeMap::new();
        categories.insert(
            DEFAULT_CATEGORY.to_string(),
            Category {
                updaters: vec![Box::new(DefaultPositionUpdater)],
                ..Category::default()
            },
        );
        Self {
            store,
            tracker,
            store_config: GapTextStoreConfig::default(),
            categories,
            listeners: Vec::new(),
            post_replaces: Vec::new(),
            accept_post_replaces: true,
            running_post_replaces: false,
            children: Vec::new(),
            modification_stamp: 0,
            highest_stamp: 0,
            next_id: 0,
        }
    }

    /// Replace the content without notification or position updates.
    pub(crate) fn load(&mut self, text: &str) {
        self.store.set(text);
        self.tracker.set(text);
    }

    pub(crate) fn store_config(&self) -> GapTextStoreConfig {
        self.store_config
    }

    pub(crate) fn disable_post_notification_replaces(&mut self) {
        self.accept_post_replaces = false;
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // ----- Text -----

    /// The whole content.
    pub fn get(&self) -> String {
        self.store.text()
    }

    /// `length` characters starting at `offset`.
    pub fn get_range(&self, offset: usize, length: usize) -> Result<String, DocumentError> {
        Ok(self.store.get(offset, length)?)
    }

    /// Character at `offset`.
    pub fn get_char(&self, offset: usize) -> Result<char, DocumentError> {
        Ok(self.store.get_char(offset)?)
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Stamp identifying the current content version.
    ///
    /// Every edit installs a fresh stamp; undoing edits reinstalls the stamps they replaced.
    pub fn modification_stamp(&self) -> u64 {
        self.modification_stamp
    }

    // ----- Lines -----

    /// Number of lines, including a trailing phantom line.
    pub fn line_count(&self) -> usize {
        self.tracker.number_of_lines()
    }

    /// Number of lines touched by `[offset, offset + length)`.
    pub fn number_of_lines_in(&self, offset: usize, length: usize) -> Result<usize, DocumentError> {
        Ok(self.tracker.number_of_lines_in(offset, length)?)
    }

    /// Line containing `offset`.
    pub fn line_of_offset(&self, offset: usize) -> Result<usize, DocumentError> {
        Ok(self.tracker.line_number_of_offset(offset)?)
    }

    /// Offset of the first character of `line`.
    pub fn line_offset(&self, line: usize) -> Result<usize, DocumentError> {
        Ok(self.tracker.line_offset(line)?)
    }

    /// Length of `line`, excluding its delimiter.
    pub fn line_length(&self, line: usize) -> Result<usize, DocumentError> {
        Ok(self.tracker.line_length(line)?)
    }

    /// Geometry of `line`.
    pub fn line_information(&self, line: usize) -> Result<Line, DocumentError> {
        Ok(self.tracker.line_information(line)?)
    }

    /// Geometry of the line containing `offset`.
    pub fn line_information_of_offset(&self, offset: usize) -> Result<Line, DocumentError> {
        Ok(self.tracker.line_information_of_offset(offset)?)
    }

    /// Delimiter terminating `line`, `None` for the last line.
    pub fn line_delimiter(&self, line: usize) -> Result<Option<&str>, DocumentError> {
        Ok(self.tracker.line_delimiter(line)?)
    }

    /// The legal line delimiters, in configuration order.
    pub fn legal_line_delimiters(&self) -> &[String] {
        self.tracker.legal_line_delimiters()
    }

    /// Delimiter new lines should use: the first line's delimiter if there is one, else `"\n"`
    /// if legal, else the first legal delimiter.
    pub fn default_line_delimiter(&self) -> &str {
        if let Ok(Some(delimiter)) = self.tracker.line_delimiter(0) {
            return delimiter;
        }
        let legal = self.tracker.legal_line_delimiters();
        legal
            .iter()
            .find(|d| d.as_str() == "\n")
            .or_else(|| legal.first())
            .map_or("\n", String::as_str)
    }

    /// The conventional line ending of [`default_line_delimiter`](Self::default_line_delimiter),
    /// or `None` for a custom delimiter.
    pub fn line_ending(&self) -> Option<LineEnding> {
        LineEnding::from_delimiter(self.default_line_delimiter())
    }

    // ----- Edits -----

    /// Replace `length` characters at `offset` with `text`.
    ///
    /// Returns [`DocumentError::BadLocation`] without touching anything if the range is out of
    /// bounds, and [`DocumentError::Listener`] after the edit if any listener failed.
    pub fn replace(&mut self, offset: usize, length: usize, text: &str) -> Result<(), DocumentError> {
        let stamp = self.highest_stamp + 1;
        self.replace_with_stamp(offset, length, text, stamp)
    }

    /// Like [`replace`](Self::replace), installing `stamp` as the new modification stamp.
    pub fn replace_with_stamp(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
        stamp: u64,
    ) -> Result<(), DocumentError> {
        BadLocation::check_range(offset, length, self.len())?;
        let replaced = self.store.get(offset, length)?;
        let event = DocumentEvent::new(offset, replaced, text, self.modification_stamp, stamp);

        tracing::trace!(offset, length, inserted = event.text_length(), stamp, "replace");

        let mut failures = Vec::new();
        self.fire_about_to_be_changed(&event, &mut failures);

        self.store.replace(offset, length, text)?;
        self.tracker.replace(offset, length, text)?;
        self.modification_stamp = stamp;
        self.highest_stamp = self.highest_stamp.max(stamp);

        let mut deleted: DeletedPositions = Vec::new();
        for (name, category) in &mut self.categories {
            let removed = category.update(&event);
            if !removed.is_empty() {
                tracing::trace!(category = %name, count = removed.len(), "positions deleted");
                deleted.push((name.clone(), removed));
            }
        }
        self.update_child_documents(&event, &mut failures);

        self.fire_changed(&event, &deleted, &mut failures);
        if !self.running_post_replaces {
            self.run_post_notification_replaces(&mut failures);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DocumentError::Listener { failures })
        }
    }

    /// Replace the whole content.
    pub fn set(&mut self, text: &str) -> Result<(), DocumentError> {
        self.replace(0, self.len(), text)
    }

    /// Replace the whole content, installing `stamp`.
    pub fn set_with_stamp(&mut self, text: &str, stamp: u64) -> Result<(), DocumentError> {
        self.replace_with_stamp(0, self.len(), text, stamp)
    }

    // ----- Notification -----

    /// Register a listener. Listeners are notified in registration order.
    pub fn add_document_listener<L>(&mut self, listener: L) -> ListenerId
    where
        L: DocumentListener + 'static,
    {
        let id = ListenerId(self.next_id());
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Register a callback run after every change.
    pub fn subscribe<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(&DocumentEvent) + Send + 'static,
    {
        self.add_document_listener(CallbackListener(callback))
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_document_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    /// Allow listeners to register post-notification replaces (the default).
    pub fn accept_post_notification_replaces(&mut self) {
        self.accept_post_replaces = true;
    }

    /// Ignore post-notification replace registrations until re-enabled.
    pub fn ignore_post_notification_replaces(&mut self) {
        self.accept_post_replaces = false;
    }

    fn fire_about_to_be_changed(
        &mut self,
        event: &DocumentEvent,
        failures: &mut Vec<ListenerFailure>,
    ) {
        for (id, listener) in &mut self.listeners {
            if let Err(error) = listener.document_about_to_be_changed(event) {
                tracing::warn!(listener = ?id, %error, "document listener failed before change");
                failures.push(ListenerFailure {
                    listener: *id,
                    error,
                });
            }
        }
    }

    fn fire_changed(
        &mut self,
        event: &DocumentEvent,
        deleted: &[(String, Vec<(PositionId, Position)>)],
        failures: &mut Vec<ListenerFailure>,
    ) {
        let accepting = self.accept_post_replaces && !self.running_post_replaces;
        for (id, listener) in &mut self.listeners {
            let mut context = NotificationContext {
                listener: *id,
                queue: &mut self.post_replaces,
                accepting,
                deleted,
            };
            if let Err(error) = listener.document_changed(event, &mut context) {
                tracing::warn!(listener = ?id, %error, "document listener failed after change");
                failures.push(ListenerFailure {
                    listener: *id,
                    error,
                });
            }
        }
    }

    fn run_post_notification_replaces(&mut self, failures: &mut Vec<ListenerFailure>) {
        if self.post_replaces.is_empty() {
            return;
        }
        self.running_post_replaces = true;
        let pending = std::mem::take(&mut self.post_replaces);
        tracing::debug!(count = pending.len(), "running post-notification replaces");

        for (listener, replace) in pending {
            match replace(self) {
                Ok(()) => {}
                Err(DocumentError::Listener { failures: nested }) => failures.extend(nested),
                Err(err) => {
                    tracing::warn!(listener = ?listener, error = %err, "post-notification replace failed");
                    failures.push(ListenerFailure {
                        listener,
                        error: Box::new(err),
                    });
                }
            }
        }
        self.running_post_replaces = false;
    }

    // ----- Position categories -----

    /// Register a category. Adding an existing category is a no-op.
    ///
    /// New categories have no updater: their positions only move once one is added with
    /// [`add_position_updater`](Self::add_position_updater).
    pub fn add_position_category(&mut self, category: &str) {
        self.categories.entry(category.to_string()).or_default();
    }

    /// Remove a category with all its positions and updaters.
    pub fn remove_position_category(&mut self, category: &str) -> Result<(), DocumentError> {
        self.categories
            .remove(category)
            .map(|_| ())
            .ok_or_else(|| DocumentError::BadPositionCategory(category.to_string()))
    }

    /// Returns `true` if `category` is registered.
    pub fn contains_position_category(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    /// Registered category names, sorted.
    pub fn position_categories(&self) -> impl Iterator<Item = &str> + '_ {
        self.categories.keys().map(String::as_str)
    }

    fn category(&self, category: &str) -> Result<&Category, DocumentError> {
        self.categories
            .get(category)
            .ok_or_else(|| DocumentError::BadPositionCategory(category.to_string()))
    }

    fn category_mut(&mut self, category: &str) -> Result<&mut Category, DocumentError> {
        self.categories
            .get_mut(category)
            .ok_or_else(|| DocumentError::BadPositionCategory(category.to_string()))
    }

    /// Append an updater to `category`'s chain.
    pub fn add_position_updater<U>(&mut self, category: &str, updater: U) -> Result<(), DocumentError>
    where
        U: PositionUpdater + 'static,
    {
        self.category_mut(category)?.updaters.push(Box::new(updater));
        Ok(())
    }

    /// Remove every updater of `category`.
    pub fn clear_position_updaters(&mut self, category: &str) -> Result<(), DocumentError> {
        self.category_mut(category)?.updaters.clear();
        Ok(())
    }

    // ----- Positions -----

    /// Track `position` in `category`.
    pub fn add_position(
        &mut self,
        category: &str,
        position: Position,
    ) -> Result<PositionId, DocumentError> {
        BadLocation::check_range(position.offset, position.length, self.len())?;
        if !self.categories.contains_key(category) {
            return Err(DocumentError::BadPositionCategory(category.to_string()));
        }
        let id = PositionId(self.next_id());
        self.category_mut(category)?.insert(id, position);
        Ok(id)
    }

    /// Track `[offset, offset + length)` in [`DEFAULT_CATEGORY`].
    pub fn add_default_position(
        &mut self,
        offset: usize,
        length: usize,
    ) -> Result<PositionId, DocumentError> {
        self.add_position(DEFAULT_CATEGORY, Position::new(offset, length))
    }

    /// Stop tracking a position, returning its last state.
    ///
    /// Works for deleted positions too, which are then forgotten.
    pub fn remove_position(
        &mut self,
        category: &str,
        id: PositionId,
    ) -> Result<Option<Position>, DocumentError> {
        let category = self.category_mut(category)?;
        if let Some(position) = category.deleted.remove(&id) {
            return Ok(Some(position));
        }
        Ok(category
            .positions
            .iter()
            .position(|(p, _)| *p == id)
            .map(|index| category.positions.remove(index).1))
    }

    /// Current state of a position of `category`.
    ///
    /// A position deleted by an edit is reported with the state it was deleted in until it is
    /// removed.
    pub fn position(
        &self,
        category: &str,
        id: PositionId,
    ) -> Result<Option<Position>, DocumentError> {
        let category = self.category(category)?;
        if let Some(position) = category.deleted.get(&id) {
            return Ok(Some(*position));
        }
        Ok(category
            .positions
            .iter()
            .find(|(p, _)| *p == id)
            .map(|(_, position)| *position))
    }

    /// Drop every deleted position of `category`, returning how many there were.
    pub fn forget_deleted_positions(&mut self, category: &str) -> Result<usize, DocumentError> {
        let category = self.category_mut(category)?;
        let count = category.deleted.len();
        category.deleted.clear();
        Ok(count)
    }

    /// Every live position of `category`, sorted by offset.
    pub fn positions(&self, category: &str) -> Result<Vec<(PositionId, Position)>, DocumentError> {
        Ok(self.category(category)?.positions.clone())
    }

    /// Returns `true` if `category` tracks a live position with exactly this range.
    pub fn contains_position(&self, category: &str, offset: usize, length: usize) -> bool {
        self.categories.get(category).is_some_and(|c| {
            c.positions
                .iter()
                .any(|(_, p)| p.offset == offset && p.length == length)
        })
    }

    /// Index of the first position of `category` starting at or after `offset`.
    pub fn compute_index_in_category(
        &self,
        category: &str,
        offset: usize,
    ) -> Result<usize, DocumentError> {
        let length = self.len();
        if offset > length {
            return Err(BadLocation::Offset { offset, length }.into());
        }
        Ok(self
            .category(category)?
            .positions
            .partition_point(|(_, p)| p.offset < offset))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("len", &self.len())
            .field("lines", &self.line_count())
            .field("modification_stamp", &self.modification_stamp)
            .field("categories", &self.categories.keys().collect::<Vec<_>>())
            .field("listeners", &self.listeners.len())
            .field("children", &self.children.len())
            .finish()
    }
}

impl CharSequence for Document {
    fn len(&self) -> usize {
        self.store.len()
    }

    fn char_at(&self, index: usize) -> char {
        self.store.get_char(index).unwrap_or_default()
    }
}
