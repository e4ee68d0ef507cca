#![warn(missing_docs)]
//! Document Core - Headless Text Document Engine
//!
//! # Overview
//!
//! `document-core` is the text model underneath an editor: it stores characters, knows where
//! lines start and end, keeps client positions (annotations, markers, ranges) meaningful across
//! edits, and finds sets of needles in text. It does no rendering and no I/O.
//!
//! # Core Features
//!
//! - **Gap Buffer Storage**: localized edits cost O(edit size), with a configurable capacity policy
//! - **Configurable Line Tracking**: arbitrary, overlapping delimiter sets; longest delimiter wins
//! - **Position Categories**: named sets of positions with pluggable update policies
//! - **Change Notification**: per-listener failure isolation and deferred post-notification edits
//! - **Child Documents**: editable windows onto a range of a parent document
//! - **Undo/Redo**: compound changes and exact modification stamp restore
//! - **Annotations**: client data on tracked ranges, pruned when their text is deleted
//! - **Multi-Pattern Search**: Aho–Corasick matching in one forward pass
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  UndoManager / AnnotationModel              │  ← History, Annotations
//! ├─────────────────────────────────────────────┤
//! │  Document (categories, listeners, children) │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Line Tracker (incremental rescan)          │  ← Line Access
//! ├─────────────────────────────────────────────┤
//! │  Gap Text Store                             │  ← Text Storage
//! └─────────────────────────────────────────────┘
//!
//!   MultiPatternMatcher (standalone, over any CharSequence)
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use document_core::{Document, UndoManager};
//!
//! let mut doc = Document::with_text("fn main() {\r\n}\r\n");
//! assert_eq!(doc.line_count(), 3);
//! assert_eq!(doc.default_line_delimiter(), "\r\n");
//!
//! let mut undo = UndoManager::new(100);
//! undo.connect(&mut doc);
//!
//! doc.replace(13, 0, "    body();\r\n").unwrap();
//! assert_eq!(doc.line_count(), 4);
//!
//! undo.undo(&mut doc).unwrap();
//! assert_eq!(doc.get(), "fn main() {\r\n}\r\n");
//! ```
//!
//! # Module Description
//!
//! - [`annotation`] - Annotation model over a position category
//! - [`storage`] - Gap buffer text storage
//! - [`line_tracker`] - Line boundary tracking
//! - [`document`] - Document, position categories and notification
//! - [`position`] - Positions and update policies
//! - [`child`] - Child documents
//! - [`undo`] - Undo/redo history
//! - [`search`] - Multi-pattern matcher
//!
//! # Offsets
//!
//! Every offset and length in the public API counts Unicode scalar values (`char`s), never
//! bytes.

pub mod annotation;
pub mod child;
pub mod config;
pub mod document;
pub mod event;
pub mod line_ending;
pub mod line_tracker;
pub mod position;
pub mod search;
pub mod storage;
mod text;
pub mod undo;

pub use annotation::{
    Annotation, AnnotationError, AnnotationId, AnnotationListenerId, AnnotationModel,
    AnnotationModelEvent, AnnotationModelListener,
};
pub use child::{ChildDocument, ChildId};
pub use config::{DocumentConfig, GapTextStoreConfig};
pub use document::{
    DEFAULT_CATEGORY, Document, DocumentError, DocumentListener, ListenerError, ListenerFailure,
    ListenerId, NotificationContext, PostNotificationReplace,
};
pub use event::DocumentEvent;
pub use line_ending::{DEFAULT_LINE_DELIMITERS, LineEnding};
pub use line_tracker::{BadLocation, Line, LineTracker, ListLineTracker, rescan_lines};
pub use position::{
    DefaultPositionUpdater, InclusivePositionUpdater, Position, PositionId, PositionUpdater,
};
pub use search::{Builder as MatcherBuilder, Match, MatcherError, MultiPatternMatcher};
pub use storage::{GapTextStore, StoreError, TextStore};
pub use text::CharSequence;
pub use undo::UndoManager;
