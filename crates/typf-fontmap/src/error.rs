//! Error types for the font map

use thiserror::Error;

use crate::glyph::{GlyphIndex, GlyphInfo};

pub type Result<T, E = FontMapError> = std::result::Result<T, E>;

/// Errors carried by the registry and by scaled fonts
///
/// A scaled font stores the first of these it hits and keeps returning it,
/// so the type is cheap to clone and compare.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FontMapError {
    #[error("Out of memory")]
    OutOfMemory,

    #[error("Invalid matrix: {0}")]
    InvalidMatrix(&'static str),

    #[error("Invalid font options: {0}")]
    InvalidOptions(String),

    #[error("Scaled font has been finished")]
    Finished,

    #[error("Glyph cache is frozen by the calling thread")]
    CacheFrozen,

    #[error("Font backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Outcome of a failed glyph lookup
///
/// `Unsupported` is not really a failure: the backend simply cannot produce
/// that kind of data for this glyph and the caller should fall back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlyphError {
    #[error("Glyph data not supported: {0:?}")]
    Unsupported(GlyphInfo),

    #[error("Glyph {0} not found")]
    NotFound(GlyphIndex),

    #[error("Glyph backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Font(#[from] FontMapError),
}

impl GlyphError {
    /// True for the "backend can't do this" outcome
    pub fn is_unsupported(&self) -> bool {
        matches!(self, GlyphError::Unsupported(_))
    }

    /// True when the owning font itself is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, GlyphError::Font(_))
    }
}
