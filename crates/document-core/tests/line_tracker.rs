//! Line tracker validation tests
//!
//! The incremental line table must always equal a full rescan of the current text, for the
//! conventional delimiter set as well as for custom sets with overlapping entries.

use document_core::{BadLocation, Line, LineTracker, ListLineTracker, rescan_lines};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn assert_consistent(tracker: &ListLineTracker, text: &[char]) {
    let text: String = text.iter().collect();
    let expected = rescan_lines(&text, tracker.legal_line_delimiters());
    let actual: Vec<Line> = tracker.lines().collect();
    assert_eq!(actual, expected, "text: {text:?}");

    // Length consistency and line contiguity.
    let total: usize = actual.iter().map(|l| l.length + l.delimiter_length).sum();
    assert_eq!(total, text.chars().count());
    for pair in actual.windows(2) {
        assert_eq!(pair[0].next_offset(), pair[1].offset);
    }
    assert_eq!(actual.last().unwrap().delimiter_length, 0);
}

fn random_edits(delimiters: &[&str], alphabet: &[&str], seed: u64, rounds: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tracker = ListLineTracker::new(delimiters.iter().copied());
    let mut model: Vec<char> = Vec::new();

    for _ in 0..rounds {
        let len = model.len();
        let offset = rng.gen_range(0..=len);
        let length = rng.gen_range(0..=(len - offset).min(4));
        let text: String = (0..rng.gen_range(0..4))
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect();

        tracker.replace(offset, length, &text).unwrap();
        model.splice(offset..offset + length, text.chars());
        assert_consistent(&tracker, &model);
    }
}

#[test]
fn test_random_edits_default_delimiters() {
    random_edits(&["\r", "\n", "\r\n"], &["a", "b", "\r", "\n", "\r\n"], 7, 2_000);
}

#[test]
fn test_random_edits_overlapping_custom_delimiters() {
    random_edits(&["ab", "aba", "b", "\n"], &["a", "b", "c", "\n"], 11, 2_000);
}

#[test]
fn test_random_edits_long_delimiters() {
    random_edits(&["<br/>", "<", "/>"], &["<", "b", "r", "/", ">", "x"], 23, 2_000);
}

#[test]
fn test_phantom_line_lookup() {
    let mut tracker = ListLineTracker::default();
    tracker.set("x\n");
    assert_eq!(tracker.number_of_lines(), 2);
    assert_eq!(tracker.line_information_of_offset(2).unwrap().index, 0);
    assert_eq!(tracker.line_offset(1).unwrap(), 2);
    assert_eq!(tracker.line_length(1).unwrap(), 0);
    assert_eq!(tracker.line_information(1).unwrap().delimiter_length, 0);

    // Without a trailing delimiter the end offset belongs to the last line.
    tracker.replace(2, 0, "y").unwrap();
    assert_eq!(tracker.line_number_of_offset(3).unwrap(), 1);
}

#[test]
fn test_splitting_a_straddling_delimiter() {
    let mut tracker = ListLineTracker::default();
    tracker.set("ab\r\ncd");
    // Text between "\r" and "\n" leaves two single-character delimiters.
    tracker.replace(3, 0, "x").unwrap();
    assert_eq!(tracker.number_of_lines(), 3);
    assert_eq!(tracker.line_delimiter(0).unwrap(), Some("\r"));
    assert_eq!(tracker.line_delimiter(1).unwrap(), Some("\n"));
    assert_eq!(tracker.line_delimiter(2).unwrap(), None);

    // "\n" before "\r" is not a pair.
    tracker.set("ab\rcd");
    tracker.replace(2, 0, "\n").unwrap();
    assert_eq!(tracker.number_of_lines(), 3);
    assert_eq!(tracker.line_delimiter(0).unwrap(), Some("\n"));
    assert_eq!(tracker.line_delimiter(1).unwrap(), Some("\r"));

    // Deleting the separator joins them again.
    tracker.replace(2, 1, "").unwrap();
    tracker.replace(3, 0, "\n").unwrap();
    assert_eq!(tracker.number_of_lines(), 2);
    assert_eq!(tracker.line_delimiter(0).unwrap(), Some("\r\n"));
}

#[test]
fn test_bad_location_errors() {
    let mut tracker = ListLineTracker::default();
    tracker.set("a\nb");
    assert!(matches!(
        tracker.line_offset(5),
        Err(BadLocation::Line { line: 5, count: 2 })
    ));
    assert!(matches!(
        tracker.line_information_of_offset(4),
        Err(BadLocation::Offset { offset: 4, .. })
    ));
    assert!(matches!(
        tracker.replace(2, 2, ""),
        Err(BadLocation::Range { .. })
    ));
    assert_eq!(tracker.number_of_lines(), 2);
}

fn delimiter_heavy_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(prop_oneof![Just('a'), Just('\r'), Just('\n'), Just('é')], 0..30)
        .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn incremental_equals_rescan(
        initial in delimiter_heavy_text(),
        edits in proptest::collection::vec((any::<u8>(), 0u8..5, delimiter_heavy_text()), 0..20)
    ) {
        let mut tracker = ListLineTracker::default();
        tracker.set(&initial);
        let mut model: Vec<char> = initial.chars().collect();

        for (offset, length, text) in edits {
            let offset = offset as usize % (model.len() + 1);
            let length = (length as usize).min(model.len() - offset);
            tracker.replace(offset, length, &text).unwrap();
            model.splice(offset..offset + length, text.chars());

            let current: String = model.iter().collect();
            let expected = rescan_lines(&current, tracker.legal_line_delimiters());
            prop_assert_eq!(tracker.lines().collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn number_of_lines_in_counts_delimiters(
        text in delimiter_heavy_text(),
        offset in any::<u8>(),
        length in any::<u8>()
    ) {
        let mut tracker = ListLineTracker::default();
        tracker.set(&text);
        let len = tracker.len();
        let offset = offset as usize % (len + 1);
        let length = length as usize % (len - offset + 1);

        let lines = tracker.number_of_lines_in(offset, length).unwrap();
        if length == 0 {
            prop_assert_eq!(lines, 1);
        } else {
            let first = tracker.line_number_of_offset(offset).unwrap();
            let starts_inside = tracker
                .lines()
                .filter(|l| l.offset > offset && l.offset <= offset + length)
                .count();
            prop_assert_eq!(lines, 1 + starts_inside);
            prop_assert!(first + lines <= tracker.number_of_lines() + 1);
        }
    }
}
