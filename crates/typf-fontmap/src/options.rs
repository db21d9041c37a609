//! Rendering options that become part of a font's identity
//!
//! Two requests that differ only in, say, hinting must not share a scaled
//! font, so every field here takes part in equality and hashing.

use std::hash::{Hash, Hasher};

use crate::error::{FontMapError, Result};

/// How edges get smoothed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Antialias {
    #[default]
    Default,
    None,
    Gray,
    Subpixel,
}

/// LCD subpixel layout for subpixel antialiasing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SubpixelOrder {
    #[default]
    Default,
    Rgb,
    Bgr,
    Vrgb,
    Vbgr,
}

/// How hard outlines get snapped to the pixel grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HintStyle {
    #[default]
    Default,
    None,
    Slight,
    Medium,
    Full,
}

/// Whether metrics get rounded to whole device units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HintMetrics {
    #[default]
    Default,
    Off,
    On,
}

/// Whether color glyph tables may be used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorMode {
    #[default]
    Default,
    NoColor,
    Color,
}

/// Options that shape how a font is realized
#[derive(Debug, Clone, Default)]
pub struct FontOptions {
    pub antialias: Antialias,
    pub subpixel_order: SubpixelOrder,
    pub hint_style: HintStyle,
    pub hint_metrics: HintMetrics,
    pub color_mode: ColorMode,
    /// CPAL palette index for COLR glyphs (0 = default palette)
    pub palette_index: u16,
    /// Variable font coordinates like [("wght", 700.0)]
    pub variations: Vec<(String, f32)>,
}

impl FontOptions {
    /// Reject options no backend could honor
    pub fn validate(&self) -> Result<()> {
        for (tag, value) in &self.variations {
            if tag.len() != 4 || !tag.is_ascii() {
                return Err(FontMapError::InvalidOptions(format!(
                    "variation axis tag must be 4 ASCII bytes, got {tag:?}"
                )));
            }
            if !value.is_finite() {
                return Err(FontMapError::InvalidOptions(format!(
                    "variation {tag} has non-finite value"
                )));
            }
        }
        Ok(())
    }

    /// Builder-style helper for variable fonts
    pub fn with_variation(mut self, tag: impl Into<String>, value: f32) -> Self {
        self.variations.push((tag.into(), value));
        self
    }
}

impl PartialEq for FontOptions {
    fn eq(&self, other: &Self) -> bool {
        self.antialias == other.antialias
            && self.subpixel_order == other.subpixel_order
            && self.hint_style == other.hint_style
            && self.hint_metrics == other.hint_metrics
            && self.color_mode == other.color_mode
            && self.palette_index == other.palette_index
            && self.variations.len() == other.variations.len()
            && self
                .variations
                .iter()
                .zip(&other.variations)
                .all(|((ta, va), (tb, vb))| ta == tb && va.to_bits() == vb.to_bits())
    }
}

impl Eq for FontOptions {}

impl Hash for FontOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.antialias.hash(state);
        self.subpixel_order.hash(state);
        self.hint_style.hash(state);
        self.hint_metrics.hash(state);
        self.color_mode.hash(state);
        self.palette_index.hash(state);
        for (tag, value) in &self.variations {
            tag.hash(state);
            value.to_bits().hash(state);
        }
    }
}
