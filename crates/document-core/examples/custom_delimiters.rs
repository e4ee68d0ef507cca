use document_core::{Document, DocumentConfig};

fn main() {
    let mut doc = Document::with_config(DocumentConfig {
        line_delimiters: vec!["<br>".to_string(), "<".to_string(), "\n".to_string()],
        ..DocumentConfig::default()
    });
    doc.set("one<br>two<three\nfour").unwrap();

    // The longest delimiter wins where several match.
    assert_eq!(doc.line_count(), 4);
    assert_eq!(doc.line_delimiter(0).unwrap(), Some("<br>"));
    assert_eq!(doc.line_delimiter(1).unwrap(), Some("<"));

    // Breaking "<br>" apart leaves a plain "<" behind.
    doc.replace(5, 0, "x").unwrap();
    assert_eq!(doc.get(), "one<bxr>two<three\nfour");
    assert_eq!(doc.line_delimiter(0).unwrap(), Some("<"));
    assert_eq!(doc.line_count(), 4);

    for line in 0..doc.line_count() {
        let offset = doc.line_offset(line).unwrap();
        let length = doc.line_length(line).unwrap();
        println!("{line}: {:?}", doc.get_range(offset, length).unwrap());
    }
}
