//! Multi-pattern substring search.
//!
//! [`MultiPatternMatcher`] finds any of a fixed set of needles in a [`CharSequence`] in a single
//! forward pass. The needles are compiled into a trie with failure links (Aho–Corasick), so the
//! text is read strictly left to right, each character exactly once, in
//! O(text length + total needle length + matches).
//!
//! All offsets are **character offsets** (Unicode scalar values).
//!
//! # Example
//!
//! ```rust
//! use document_core::MultiPatternMatcher;
//!
//! let matcher = MultiPatternMatcher::builder()
//!     .add(["he", "she", "his", "hers"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let text: Vec<char> = "ushers".chars().collect();
//! let first = matcher.index_of(&text[..], 0).unwrap();
//! assert_eq!((first.needle, first.offset), ("she", 1));
//! assert_eq!(matcher.find(&text[..], 0).len(), 3);
//! ```

use crate::text::{CharSequence, char_len};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Builder misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MatcherError {
    #[error("matcher builder has already been built")]
    /// `add` or `build` called on a builder that was already built.
    IllegalState,
}

/// One occurrence of a needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Match<'m> {
    /// The needle that matched.
    pub needle: &'m str,
    /// Start offset of the occurrence.
    pub offset: usize,
    /// Length of the needle in characters.
    pub length: usize,
}

impl Match<'_> {
    /// Exclusive end offset of the occurrence.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Single-use builder for a [`MultiPatternMatcher`].
#[derive(Debug, Default)]
pub struct Builder {
    needles: Vec<String>,
    seen: HashSet<String>,
    built: bool,
}

impl Builder {
    /// Add needles to the lexicon. Empty strings and duplicates are ignored.
    pub fn add<I, S>(&mut self, needles: I) -> Result<&mut Self, MatcherError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.built {
            return Err(MatcherError::IllegalState);
        }
        for needle in needles {
            let needle = needle.as_ref();
            if !needle.is_empty() && self.seen.insert(needle.to_string()) {
                self.needles.push(needle.to_string());
            }
        }
        Ok(self)
    }

    /// Compile the lexicon. A builder can only be built once.
    pub fn build(&mut self) -> Result<MultiPatternMatcher, MatcherError> {
        if self.built {
            return Err(MatcherError::IllegalState);
        }
        self.built = true;
        self.seen.clear();
        Ok(MultiPatternMatcher::compile(std::mem::take(&mut self.needles)))
    }
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<char, usize>,
    /// Longest proper suffix of this node's path that is also a trie path
    fail: usize,
    /// Needle ending exactly here
    needle: Option<usize>,
    /// Nearest node on the failure chain that ends a needle
    output: Option<usize>,
}

const ROOT: usize = 0;

/// Immutable Aho–Corasick automaton over a set of needles.
#[derive(Debug)]
pub struct MultiPatternMatcher {
    nodes: Vec<Node>,
    needles: Vec<String>,
    needle_lengths: Vec<usize>,
    max_length: usize,
}

impl MultiPatternMatcher {
    /// Start building a matcher.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Convenience: earliest occurrence of any of `needles` in `text` at or after `from`, as
    /// `(needle, offset)`.
    pub fn index_of_any<S, I, N>(text: &S, from: usize, needles: I) -> Option<(String, usize)>
    where
        S: CharSequence + ?Sized,
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let mut builder = Self::builder();
        let matcher = builder.add(needles).ok()?.build().ok()?;
        matcher
            .index_of(text, from)
            .map(|m| (m.needle.to_string(), m.offset))
    }

    fn compile(needles: Vec<String>) -> Self {
        let mut nodes = vec![Node::default()];
        let mut needle_lengths = Vec::with_capacity(needles.len());

        for (index, needle) in needles.iter().enumerate() {
            let mut state = ROOT;
            for ch in needle.chars() {
                state = match nodes[state].children.get(&ch) {
                    Some(&next) => next,
                    None => {
                        nodes.push(Node::default());
                        let next = nodes.len() - 1;
                        nodes[state].children.insert(ch, next);
                        next
                    }
                };
            }
            nodes[state].needle = Some(index);
            needle_lengths.push(char_len(needle));
        }

        // Breadth-first, so every failure target is finished before it is used.
        let mut queue: VecDeque<usize> = nodes[ROOT].children.values().copied().collect();
        while let Some(state) = queue.pop_front() {
            let children: Vec<(char, usize)> = nodes[state]
                .children
                .iter()
                .map(|(&ch, &next)| (ch, next))
                .collect();

            for (ch, next) in children {
                let mut fallback = nodes[state].fail;
                let fail = loop {
                    if state == ROOT {
                        break ROOT;
                    }
                    if let Some(&target) = nodes[fallback].children.get(&ch) {
                        break target;
                    }
                    if fallback == ROOT {
                        break ROOT;
                    }
                    fallback = nodes[fallback].fail;
                };
                nodes[next].fail = fail;
                nodes[next].output = if nodes[fail].needle.is_some() {
                    Some(fail)
                } else {
                    nodes[fail].output
                };
                queue.push_back(next);
            }
        }

        let max_length = needle_lengths.iter().copied().max().unwrap_or(0);
        tracing::debug!(
            needles = needles.len(),
            states = nodes.len(),
            max_length,
            "compiled multi-pattern matcher"
        );

        Self {
            nodes,
            needles,
            needle_lengths,
            max_length,
        }
    }

    /// The lexicon, without empty strings and duplicates.
    pub fn needles(&self) -> &[String] {
        &self.needles
    }

    /// Length of the longest needle in characters.
    pub fn max_needle_length(&self) -> usize {
        self.max_length
    }

    fn step(&self, mut state: usize, ch: char) -> usize {
        loop {
            if let Some(&next) = self.nodes[state].children.get(&ch) {
                return next;
            }
            if state == ROOT {
                return ROOT;
            }
            state = self.nodes[state].fail;
        }
    }

    /// Feed `text[from..]` through the automaton, reporting `(end, needle)` for each
    /// occurrence. `on_match` returns the index at which scanning may stop; the smallest
    /// returned index wins.
    fn scan<S, F>(&self, text: &S, from: usize, mut on_match: F)
    where
        S: CharSequence + ?Sized,
        F: FnMut(usize, usize) -> usize,
    {
        if self.needles.is_empty() {
            return;
        }
        let mut state = ROOT;
        let mut limit = usize::MAX;
        for index in from..text.len() {
            if index >= limit {
                return;
            }
            state = self.step(state, text.char_at(index));

            let mut node = if self.nodes[state].needle.is_some() {
                Some(state)
            } else {
                self.nodes[state].output
            };
            while let Some(hit) = node {
                if let Some(needle) = self.nodes[hit].needle {
                    limit = limit.min(on_match(index + 1, needle));
                }
                node = self.nodes[hit].output;
            }
        }
    }

    fn to_match(&self, end: usize, needle: usize) -> Match<'_> {
        let length = self.needle_lengths[needle];
        Match {
            needle: &self.needles[needle],
            offset: end - length,
            length,
        }
    }

    /// Earliest occurrence starting at or after `from`.
    ///
    /// When several needles start at the same earliest offset, the longest one is returned.
    pub fn index_of<S>(&self, text: &S, from: usize) -> Option<Match<'_>>
    where
        S: CharSequence + ?Sized,
    {
        let mut best: Option<Match<'_>> = None;
        // A match ending at `end` starts at or after `end - max_length`; once that is past the
        // best start nothing better can follow.
        self.scan(text, from, |end, needle| {
            let found = self.to_match(end, needle);
            let better = best.is_none_or(|b| {
                found.offset < b.offset || (found.offset == b.offset && found.length > b.length)
            });
            if better {
                best = Some(found);
            }
            best.map_or(usize::MAX, |b| b.offset + self.max_length)
        });
        best
    }

    /// Every occurrence starting at or after `from`, overlapping ones included, ordered by
    /// offset and then by needle length.
    pub fn find<S>(&self, text: &S, from: usize) -> Vec<Match<'_>>
    where
        S: CharSequence + ?Sized,
    {
        let mut matches = Vec::new();
        self.scan(text, from, |end, needle| {
            matches.push(self.to_match(end, needle));
            usize::MAX
        });
        matches.sort_by_key(|m| (m.offset, m.length));
        matches
    }

    /// All needles occurring at the earliest offset at or after `from`, longest first.
    pub fn find_earliest<S>(&self, text: &S, from: usize) -> Vec<Match<'_>>
    where
        S: CharSequence + ?Sized,
    {
        let mut tied: Vec<Match<'_>> = Vec::new();
        self.scan(text, from, |end, needle| {
            let found = self.to_match(end, needle);
            match tied.first().map(|m| m.offset) {
                Some(earliest) if found.offset > earliest => {}
                Some(earliest) if found.offset == earliest => tied.push(found),
                _ => {
                    tied.clear();
                    tied.push(found);
                }
            }
            tied[0].offset + self.max_length
        });
        tied.sort_by(|a, b| b.length.cmp(&a.length));
        tied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(text: &str) -> Vec<char> {
        text.chars().collect()
    }

    fn matcher(needles: &[&str]) -> MultiPatternMatcher {
        MultiPatternMatcher::builder()
            .add(needles)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_ushers() {
        let m = matcher(&["he", "she", "his", "hers"]);
        let text = chars("ushers");

        let first = m.index_of(&text[..], 0).unwrap();
        assert_eq!((first.needle, first.offset), ("she", 1));

        let all: Vec<(&str, usize)> = m
            .find(&text[..], 0)
            .iter()
            .map(|m| (m.needle, m.offset))
            .collect();
        assert_eq!(all, vec![("she", 1), ("he", 2), ("hers", 2)]);

        let earliest = m.find_earliest(&text[..], 2);
        assert_eq!(
            earliest.iter().map(|m| m.needle).collect::<Vec<_>>(),
            vec!["hers", "he"]
        );
    }

    #[test]
    fn test_longer_needle_found_later_wins() {
        let m = matcher(&["bc", "abcd"]);
        let first = m.index_of(&chars("xabcd")[..], 0).unwrap();
        assert_eq!((first.needle, first.offset), ("abcd", 1));
    }

    #[test]
    fn test_from_offset() {
        let m = matcher(&["ab"]);
        let text = chars("ab ab ab");
        assert_eq!(m.index_of(&text[..], 1).unwrap().offset, 3);
        assert_eq!(m.find(&text[..], 4).len(), 1);
        assert!(m.index_of(&text[..], 7).is_none());
        assert!(m.index_of(&text[..], 100).is_none());
    }

    #[test]
    fn test_no_match_is_empty() {
        let m = matcher(&["zz"]);
        assert!(m.index_of(&chars("abc")[..], 0).is_none());
        assert!(m.find(&chars("abc")[..], 0).is_empty());
        assert!(m.find_earliest(&chars("abc")[..], 0).is_empty());
    }

    #[test]
    fn test_builder_is_single_use() {
        let mut builder = MultiPatternMatcher::builder();
        builder.add(["a", "", "a", "b"]).unwrap();
        let m = builder.build().unwrap();
        assert_eq!(m.needles(), ["a", "b"]);
        assert_eq!(builder.add(["c"]).unwrap_err(), MatcherError::IllegalState);
        assert!(matches!(builder.build(), Err(MatcherError::IllegalState)));
    }

    #[test]
    fn test_empty_lexicon_never_matches() {
        let m = MultiPatternMatcher::builder().build().unwrap();
        assert!(m.index_of(&chars("anything")[..], 0).is_none());
        assert_eq!(m.max_needle_length(), 0);
    }

    #[test]
    fn test_index_of_any() {
        let text = chars("find the needle");
        assert_eq!(
            MultiPatternMatcher::index_of_any(&text[..], 0, ["needle", "the"]),
            Some(("the".to_string(), 5))
        );
    }

    #[test]
    fn test_unicode_needles() {
        let m = matcher(&["世界", "界"]);
        let text = chars("你好世界");
        let all = m.find(&text[..], 0);
        assert_eq!(all.len(), 2);
        assert_eq!((all[0].offset, all[0].end()), (2, 4));
        assert_eq!(all[1].offset, 3);
    }

    #[test]
    fn test_matcher_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MultiPatternMatcher>();
    }
}
