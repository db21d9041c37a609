//! The contracts a font backend signs
//!
//! Two traits split the work the way fonts split their lifetime:
//!
//! - [`FontBackend`] - Lives with a face and realizes it at a given scale
//! - [`ScaledFontBackend`] - Lives with one realized font and fills in glyph data
//!
//! The cache never draws anything itself. It decides when to ask a backend
//! for data, keeps what comes back, and throws it away under pressure.

use crate::error::{GlyphError, Result};
use crate::glyph::{Color, GlyphIndex, GlyphInfo, GlyphRecord};
use crate::key::FontKey;
use crate::scaled_font::{FontExtents, FontInfo, ScaleInfo};

/// Realizes a face at a particular matrix, transform and set of options
///
/// `construct` runs with the registry unlocked while a placeholder holds the
/// key, so it may be slow, do I/O, or look up other fonts in the same
/// registry. Two constructions for the same key never run at once.
///
/// ```ignore
/// struct MyBackend;
///
/// impl FontBackend for MyBackend {
///     fn name(&self) -> &'static str {
///         "my-backend"
///     }
///
///     fn construct(&self, key: &FontKey, scale: &ScaleInfo)
///         -> Result<Box<dyn ScaledFontBackend>> {
///         Ok(Box::new(MyScaledFont::load(key.face().family(), scale)?))
///     }
/// }
/// ```
pub trait FontBackend: Send + Sync {
    /// Used in logs and `Debug` output
    fn name(&self) -> &'static str;

    /// Build the backend half of a scaled font
    fn construct(&self, key: &FontKey, scale: &ScaleInfo) -> Result<Box<dyn ScaledFontBackend>>;
}

/// Per-font backend state
///
/// Dropping the box is the font's destruction hook. It runs exactly once,
/// after the font has left the registry and with no cache lock held, so it
/// is free to call back into the registry.
pub trait ScaledFontBackend: Send + Sync {
    /// Font-wide metrics, read once when the font is created
    fn extents(&self) -> FontExtents;

    /// Fill in the requested kinds of data on `glyph`
    ///
    /// Called with the font's cache lock held. The backend may fill in more
    /// than asked for, or less; anything still missing afterwards is reported
    /// to the caller as unsupported. A backend that cannot produce some kind
    /// of data should leave it unset or return [`GlyphError::Unsupported`].
    fn populate_glyph(
        &self,
        font: &FontInfo,
        glyph: &mut GlyphRecord,
        info: GlyphInfo,
        foreground: Color,
    ) -> std::result::Result<(), GlyphError>;

    /// Map a character to a glyph, without touching any cache
    fn glyph_index_for_codepoint(&self, codepoint: char) -> Option<GlyphIndex>;
}
