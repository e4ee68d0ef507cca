//! Tunables for the storage and document layers.
//!
//! Everything here has a sensible [`Default`]. With the `serde` feature enabled, both structs
//! can be loaded from any serde format; missing fields fall back to their defaults.

use crate::line_ending::DEFAULT_LINE_DELIMITERS;

/// Capacity policy of a [`GapTextStore`](crate::GapTextStore).
///
/// When the gap can no longer absorb an edit (or grows past its threshold), the buffer is
/// reallocated so that the new gap is `content_len * max_gap_factor / (2 - max_gap_factor)`
/// characters wide, clamped to `[min_gap_size, max_gap_size]`. The reuse threshold after a
/// reallocation is twice the new gap.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GapTextStoreConfig {
    /// Minimum gap allocated on reallocation. Wins over `max_gap_size` if larger.
    pub min_gap_size: usize,
    /// Maximum gap allocated on reallocation.
    pub max_gap_size: usize,
    /// Maximum gap size relative to content size, in `[0, 1]`.
    pub max_gap_factor: f32,
}

impl GapTextStoreConfig {
    /// Create a capacity policy.
    pub fn new(min_gap_size: usize, max_gap_size: usize, max_gap_factor: f32) -> Self {
        Self {
            min_gap_size,
            max_gap_size,
            max_gap_factor,
        }
    }

    /// Legacy two-watermark policy.
    ///
    /// Equivalent to a fixed gap of `high_watermark / 2` characters; `low_watermark` is
    /// accepted for compatibility and ignored.
    pub fn from_watermarks(low_watermark: usize, high_watermark: usize) -> Self {
        let _ = low_watermark;
        Self::new(high_watermark / 2, high_watermark / 2, 0.0)
    }

    /// `1 / (1 - max_gap_factor / 2)`: array size relative to content size after reallocation.
    pub(crate) fn size_multiplier(&self) -> f64 {
        let factor = f64::from(self.max_gap_factor.clamp(0.0, 1.0));
        1.0 / (1.0 - factor / 2.0)
    }
}

impl Default for GapTextStoreConfig {
    fn default() -> Self {
        Self::new(256, 4096, 0.1)
    }
}

/// Construction options of a [`Document`](crate::Document).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DocumentConfig {
    /// Ordered set of legal line delimiters.
    pub line_delimiters: Vec<String>,
    /// Gap buffer capacity policy.
    pub store: GapTextStoreConfig,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            line_delimiters: DEFAULT_LINE_DELIMITERS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            store: GapTextStoreConfig::default(),
        }
    }
}
