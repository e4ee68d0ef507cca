//! Change notification tests
//!
//! - A failing listener neither stops the edit nor hides the change from other listeners
//! - Post-notification replaces run once, after every listener has been notified
//! - Each listener owns at most one post-notification slot per change

use document_core::{
    Document, DocumentError, DocumentEvent, DocumentListener, ListenerError, NotificationContext,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

/// Records both notifications under a name.
struct Recorder {
    name: &'static str,
    log: Log,
}

impl DocumentListener for Recorder {
    fn document_about_to_be_changed(&mut self, event: &DocumentEvent) -> Result<(), ListenerError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} before {:?}", self.name, event.replaced_text));
        Ok(())
    }

    fn document_changed(
        &mut self,
        event: &DocumentEvent,
        _context: &mut NotificationContext<'_>,
    ) -> Result<(), ListenerError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} after {:?}", self.name, event.text));
        Ok(())
    }
}

struct Failing;

impl DocumentListener for Failing {
    fn document_changed(
        &mut self,
        _event: &DocumentEvent,
        _context: &mut NotificationContext<'_>,
    ) -> Result<(), ListenerError> {
        Err("listener exploded".into())
    }
}

/// Appends a marker after every change that does not already end with it.
struct Terminator {
    marker: &'static str,
    attempts: Arc<Mutex<Vec<bool>>>,
}

impl DocumentListener for Terminator {
    fn document_changed(
        &mut self,
        event: &DocumentEvent,
        context: &mut NotificationContext<'_>,
    ) -> Result<(), ListenerError> {
        if event.text.ends_with(self.marker) {
            return Ok(());
        }
        let marker = self.marker;
        let queued = context.register_post_notification_replace(move |doc: &mut Document| {
            doc.replace(doc.len(), 0, marker)
        });
        self.attempts.lock().unwrap().push(queued);
        Ok(())
    }
}

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_failing_listener_is_isolated() {
    let log = log();
    let mut doc = Document::with_text("abc");
    doc.add_document_listener(Recorder {
        name: "first",
        log: log.clone(),
    });
    let failing = doc.add_document_listener(Failing);
    doc.add_document_listener(Recorder {
        name: "last",
        log: log.clone(),
    });

    let err = doc.replace(1, 1, "B").unwrap_err();
    match err {
        DocumentError::Listener { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].listener, failing);
            assert_eq!(failures[0].error.to_string(), "listener exploded");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(doc.get(), "aBc");
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            r#"first before "b""#,
            r#"last before "b""#,
            r#"first after "B""#,
            r#"last after "B""#,
        ]
    );

    doc.remove_document_listener(failing);
    assert!(doc.replace(0, 0, "x").is_ok());
}

#[test]
fn test_post_notification_replace_runs_after_notification() {
    let log = log();
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let mut doc = Document::with_text("abc");
    doc.add_document_listener(Terminator {
        marker: "!",
        attempts: attempts.clone(),
    });
    doc.add_document_listener(Recorder {
        name: "observer",
        log: log.clone(),
    });

    doc.replace(3, 0, "d").unwrap();
    assert_eq!(doc.get(), "abcd!");
    // The observer saw the original change before the deferred one.
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            r#"observer before """#,
            r#"observer after "d""#,
            r#"observer before """#,
            r#"observer after "!""#,
        ]
    );
    assert_eq!(*attempts.lock().unwrap(), vec![true]);
}

#[test]
fn test_registrations_during_post_replaces_are_ignored() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let mut doc = Document::with_text("x");
    doc.add_document_listener(Terminator {
        marker: "!",
        attempts: attempts.clone(),
    });
    // Reacts to the "!" insertion too, but only while post replaces are already running.
    doc.add_document_listener(Terminator {
        marker: "?",
        attempts: attempts.clone(),
    });

    doc.replace(1, 0, "y").unwrap();
    assert_eq!(doc.get(), "xy!?");
    // "y": both queue. "!": only the "?" listener reacts, and is refused.
    // "?": only the "!" listener reacts, and is refused.
    assert_eq!(*attempts.lock().unwrap(), vec![true, true, false, false]);
}

#[test]
fn test_one_slot_per_listener() {
    struct Greedy(Arc<Mutex<Vec<bool>>>);

    impl DocumentListener for Greedy {
        fn document_changed(
            &mut self,
            event: &DocumentEvent,
            context: &mut NotificationContext<'_>,
        ) -> Result<(), ListenerError> {
            if event.text == "go" {
                for text in ["1", "2"] {
                    let queued = context.register_post_notification_replace(move |doc: &mut Document| {
                        doc.replace(doc.len(), 0, text)
                    });
                    self.0.lock().unwrap().push(queued);
                }
            }
            Ok(())
        }
    }

    let attempts = Arc::new(Mutex::new(Vec::new()));
    let mut doc = Document::new();
    doc.add_document_listener(Greedy(attempts.clone()));
    doc.replace(0, 0, "go").unwrap();
    assert_eq!(doc.get(), "go1");
    assert_eq!(*attempts.lock().unwrap(), vec![true, false]);
}

#[test]
fn test_ignoring_post_notification_replaces() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let mut doc = Document::with_text("a");
    doc.add_document_listener(Terminator {
        marker: ".",
        attempts: attempts.clone(),
    });

    doc.ignore_post_notification_replaces();
    doc.replace(1, 0, "b").unwrap();
    assert_eq!(doc.get(), "ab");

    doc.accept_post_notification_replaces();
    doc.replace(2, 0, "c").unwrap();
    assert_eq!(doc.get(), "abc.");
    assert_eq!(*attempts.lock().unwrap(), vec![false, true]);
}

#[test]
fn test_failed_post_replace_is_reported() {
    struct OutOfBounds;

    impl DocumentListener for OutOfBounds {
        fn document_changed(
            &mut self,
            _event: &DocumentEvent,
            context: &mut NotificationContext<'_>,
        ) -> Result<(), ListenerError> {
            context.register_post_notification_replace(|doc: &mut Document| {
                doc.replace(doc.len() + 1, 0, "x")
            });
            Ok(())
        }
    }

    let mut doc = Document::with_text("abc");
    let id = doc.add_document_listener(OutOfBounds);
    let err = doc.replace(0, 1, "A").unwrap_err();
    match err {
        DocumentError::Listener { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].listener, id);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(doc.get(), "Abc");
}

#[test]
fn test_events_carry_stamps() {
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let seen = stamps.clone();
    let mut doc = Document::with_text("abc");
    doc.subscribe(move |event| {
        seen.lock()
            .unwrap()
            .push((event.previous_stamp, event.modification_stamp));
    });

    doc.replace(0, 0, "1").unwrap();
    doc.replace(0, 0, "2").unwrap();
    doc.set_with_stamp("reset", 42).unwrap();
    doc.replace(0, 0, "3").unwrap();

    assert_eq!(*stamps.lock().unwrap(), vec![(0, 1), (1, 2), (2, 42), (42, 43)]);
}
