use document_core::{DEFAULT_CATEGORY, Document, MultiPatternMatcher, UndoManager};

fn main() {
    let mut doc = Document::with_text("# Title\n\n```\nlet x = 1;\n```\n");
    let mut undo = UndoManager::new(50);
    undo.connect(&mut doc);

    // Edit the code block through a child document.
    let code = doc.create_child_document(13, 10).unwrap();
    let mark = doc.add_default_position(2, 5).unwrap();

    undo.begin_compound_change();
    doc.replace_in_child(code, 4, 1, "answer").unwrap();
    doc.replace_in_child(code, 13, 1, "42").unwrap();
    undo.end_compound_change();

    assert_eq!(doc.child_document(code).unwrap().get(), "let answer = 42;");
    assert_eq!(doc.get(), "# Title\n\n```\nlet answer = 42;\n```\n");

    let matcher = MultiPatternMatcher::builder()
        .add(["answer", "42", "Title"])
        .unwrap()
        .build()
        .unwrap();
    for hit in matcher.find(&doc, 0) {
        println!("{} at line {}", hit.needle, doc.line_of_offset(hit.offset).unwrap());
    }

    // One undo step reverts the whole compound change.
    undo.undo(&mut doc).unwrap();
    assert_eq!(doc.child_document(code).unwrap().get(), "let x = 1;");
    let title = doc.position(DEFAULT_CATEGORY, mark).unwrap().unwrap();
    assert_eq!(doc.get_range(title.offset, title.length).unwrap(), "Title");
}
