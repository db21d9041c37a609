//! Typf Font Map: fonts at scale, glyphs on tap
//!
//! Rendering the same text twice should not mean loading the same font
//! twice. This crate sits between a font backend and whoever draws glyphs,
//! and makes sure each face is realized once per scale and each glyph is
//! rasterized or outlined once per font.
//!
//! ## The Pieces
//!
//! - [`FontMap`] - The registry. One [`ScaledFont`] per [`FontKey`], built on
//!   first request, kept around for a while after its last user lets go
//! - [`ScaledFont`] - A face at one scale, with its own glyph cache
//! - [`FreezeGuard`] - Pins a font's glyphs while you draw with them
//! - [`GlyphPageCache`] - Caps glyph memory across every font in the map
//!
//! ## Bring Your Own Backend
//!
//! Implement [`FontBackend`] to realize fonts and [`ScaledFontBackend`] to
//! fill in glyph data; the map does the rest.
//!
//! ```rust
//! use std::sync::Arc;
//! use typf_fontmap::*;
//!
//! struct Boxes;
//!
//! impl FontBackend for Boxes {
//!     fn name(&self) -> &'static str { "boxes" }
//!     fn construct(&self, _: &FontKey, _: &ScaleInfo) -> Result<Box<dyn ScaledFontBackend>> {
//!         Ok(Box::new(Boxes))
//!     }
//! }
//!
//! impl ScaledFontBackend for Boxes {
//!     fn extents(&self) -> FontExtents { FontExtents::default() }
//!     fn populate_glyph(&self, font: &FontInfo, glyph: &mut GlyphRecord, _: GlyphInfo, _: Color)
//!         -> std::result::Result<(), GlyphError> {
//!         let size = font.scale().max_scale;
//!         glyph.set_metrics(GlyphMetrics { width: size, height: size, x_advance: size, ..Default::default() });
//!         Ok(())
//!     }
//!     fn glyph_index_for_codepoint(&self, c: char) -> Option<GlyphIndex> { Some(c as u32) }
//! }
//!
//! let map = FontMap::default();
//! let face = FontFace::new("Boxes", Arc::new(Boxes));
//! let font = map.get_or_create_font(&face, Matrix::scale(12.0, 12.0), Matrix::IDENTITY, FontOptions::default())?;
//!
//! let frozen = font.freeze()?;
//! let glyph = frozen.lookup_glyph(65, GlyphInfo::METRICS, None).expect("metrics");
//! assert_eq!(glyph.metrics().x_advance, 12.0);
//! # drop(frozen);
//! # Ok::<(), FontMapError>(())
//! ```

pub mod cache_config;
pub mod error;
pub mod font_map;
pub mod glyph;
mod glyph_cache;
pub mod key;
pub mod matrix;
pub mod options;
pub mod page_cache;
mod placeholder;
pub mod scaled_font;
pub mod traits;

pub use cache_config::FontMapConfig;
pub use error::{FontMapError, GlyphError, Result};
pub use font_map::{FontMap, FontMapStats};
pub use glyph::{
    BitmapFormat, Color, GlyphImage, GlyphIndex, GlyphInfo, GlyphMetrics, GlyphRecord,
    GlyphRecording, PositionedGlyph, TextExtents,
};
pub use key::{FontFace, FontKey};
pub use matrix::Matrix;
pub use options::{Antialias, ColorMode, FontOptions, HintMetrics, HintStyle, SubpixelOrder};
pub use page_cache::{GlyphPageCache, PageCacheStats};
pub use scaled_font::{FontExtents, FontId, FontInfo, FreezeGuard, ScaleInfo, ScaledFont};
pub use traits::{FontBackend, ScaledFontBackend};
