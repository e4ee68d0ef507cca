//! Line ending helpers.
//!
//! `document-core` never normalizes text: whatever delimiters the text contains stay in the
//! store, and the line tracker reports them per line. This module names the three
//! conventional delimiters and maps tracker delimiters back to them.

/// The conventional delimiter set, in the order the tracker is configured with by default.
pub const DEFAULT_LINE_DELIMITERS: [&str; 3] = ["\r", "\n", "\r\n"];

/// One of the conventional newline sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineEnding {
    /// Classic Mac CR (`'\r'`).
    Cr,
    /// Unix-style LF (`'\n'`).
    Lf,
    /// Windows-style CRLF (`"\r\n"`).
    Crlf,
}

impl LineEnding {
    /// The delimiter string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cr => "\r",
            Self::Lf => "\n",
            Self::Crlf => "\r\n",
        }
    }

    /// Map a delimiter string back to a line ending, if it is one of the conventional three.
    pub fn from_delimiter(delimiter: &str) -> Option<Self> {
        match delimiter {
            "\r" => Some(Self::Cr),
            "\n" => Some(Self::Lf),
            "\r\n" => Some(Self::Crlf),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_delimiter_round_trips() {
        for delimiter in DEFAULT_LINE_DELIMITERS {
            let ending = LineEnding::from_delimiter(delimiter).unwrap();
            assert_eq!(ending.as_str(), delimiter);
        }
        assert_eq!(LineEnding::from_delimiter("\u{2028}"), None);
    }
}
