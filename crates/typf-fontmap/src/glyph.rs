//! Glyph records and the data a backend can attach to them
//!
//! A record starts out empty. Each time a caller asks for a kind of data the
//! record lacks, the backend fills it in and the matching [`GlyphInfo`] bit is
//! set. Payloads sit behind `Arc`, so handing a record out is a cheap clone.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use kurbo::BezPath;

/// Unique identifier for a glyph within a font
pub type GlyphIndex = u32;

bitflags::bitflags! {
    /// Kinds of per-glyph data a caller can ask for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GlyphInfo: u32 {
        const METRICS = 1 << 0;
        const SURFACE = 1 << 1;
        const PATH = 1 << 2;
        const RECORDING_SURFACE = 1 << 3;
        const COLOR_SURFACE = 1 << 4;

        /// Payloads that may bake in the foreground color
        const FOREGROUND_DEPENDENT = Self::COLOR_SURFACE.bits() | Self::RECORDING_SURFACE.bits();
    }
}

/// Simple RGBA color that works everywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn black() -> Self {
        Self::rgba(0, 0, 0, 255)
    }

    pub const fn white() -> Self {
        Self::rgba(255, 255, 255, 255)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::black()
    }
}

/// Ink extents and advance of one glyph, in user space
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlyphMetrics {
    pub x_bearing: f64,
    pub y_bearing: f64,
    pub width: f64,
    pub height: f64,
    pub x_advance: f64,
    pub y_advance: f64,
}

/// How pixels are arranged in a glyph image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapFormat {
    Rgba8,
    Gray8,
    Gray1,
}

/// A rasterized glyph
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphImage {
    pub width: u32,
    pub height: u32,
    /// Device offset of the top-left pixel relative to the glyph origin
    pub origin: (i32, i32),
    pub format: BitmapFormat,
    pub data: Vec<u8>,
}

/// A recorded drawing list produced by the backend
///
/// The contents are opaque to the cache. Dropping a recording may run
/// arbitrary backend code, so the cache never drops one while the owning
/// font is frozen.
#[derive(Clone)]
pub struct GlyphRecording(Arc<dyn Any + Send + Sync>);

impl GlyphRecording {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for GlyphRecording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlyphRecording").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ColorGlyph {
    #[default]
    Unknown,
    Color,
    NotColor,
}

/// Everything cached for one glyph of one scaled font
#[derive(Debug, Clone)]
pub struct GlyphRecord {
    index: GlyphIndex,
    has: GlyphInfo,
    metrics: GlyphMetrics,
    surface: Option<Arc<GlyphImage>>,
    path: Option<Arc<BezPath>>,
    recording: Option<GlyphRecording>,
    color_surface: Option<Arc<GlyphImage>>,
    color_glyph: ColorGlyph,
    /// Foreground each color-dependent payload was drawn with
    recording_foreground: Option<Color>,
    color_foreground: Option<Color>,
}

impl GlyphRecord {
    pub fn new(index: GlyphIndex) -> Self {
        Self {
            index,
            has: GlyphInfo::empty(),
            metrics: GlyphMetrics::default(),
            surface: None,
            path: None,
            recording: None,
            color_surface: None,
            color_glyph: ColorGlyph::Unknown,
            recording_foreground: None,
            color_foreground: None,
        }
    }

    pub fn index(&self) -> GlyphIndex {
        self.index
    }

    /// Which kinds of data are populated
    pub fn has(&self) -> GlyphInfo {
        self.has
    }

    pub fn metrics(&self) -> &GlyphMetrics {
        &self.metrics
    }

    pub fn surface(&self) -> Option<&Arc<GlyphImage>> {
        self.surface.as_ref()
    }

    pub fn path(&self) -> Option<&Arc<BezPath>> {
        self.path.as_ref()
    }

    pub fn recording(&self) -> Option<&GlyphRecording> {
        self.recording.as_ref()
    }

    pub fn color_surface(&self) -> Option<&Arc<GlyphImage>> {
        self.color_surface.as_ref()
    }

    /// `Some(false)` once the backend has said this glyph has no color form
    pub fn is_color_glyph(&self) -> Option<bool> {
        match self.color_glyph {
            ColorGlyph::Unknown => None,
            ColorGlyph::Color => Some(true),
            ColorGlyph::NotColor => Some(false),
        }
    }

    /// Foreground baked into the recording, if it used one
    pub fn recording_foreground(&self) -> Option<Color> {
        self.recording_foreground
    }

    /// Foreground baked into the color image, if it used one
    pub fn color_foreground(&self) -> Option<Color> {
        self.color_foreground
    }

    pub fn set_metrics(&mut self, metrics: GlyphMetrics) {
        self.metrics = metrics;
        self.has |= GlyphInfo::METRICS;
    }

    pub fn set_surface(&mut self, image: GlyphImage) {
        self.surface = Some(Arc::new(image));
        self.has |= GlyphInfo::SURFACE;
    }

    pub fn set_path(&mut self, path: BezPath) {
        self.path = Some(Arc::new(path));
        self.has |= GlyphInfo::PATH;
    }

    /// Attach a recording; `foreground` is the color it was drawn with, if it used one
    pub fn set_recording(&mut self, recording: GlyphRecording, foreground: Option<Color>) {
        self.recording = Some(recording);
        self.has |= GlyphInfo::RECORDING_SURFACE;
        self.recording_foreground = foreground;
    }

    /// Attach a color image, or `None` to mark the glyph as not a color glyph
    ///
    /// The negative answer is remembered for the life of the record.
    pub fn set_color_surface(&mut self, image: Option<GlyphImage>, foreground: Option<Color>) {
        match image {
            Some(image) => {
                self.color_surface = Some(Arc::new(image));
                self.color_glyph = ColorGlyph::Color;
                self.has |= GlyphInfo::COLOR_SURFACE;
                self.color_foreground = foreground;
            }
            None => {
                self.color_surface = None;
                self.color_foreground = None;
                self.color_glyph = ColorGlyph::NotColor;
                self.has.remove(GlyphInfo::COLOR_SURFACE);
            }
        }
    }

    /// Color-dependent payloads that must be redrawn for `foreground`
    pub(crate) fn stale_for(&self, foreground: Color) -> GlyphInfo {
        let drawn_with = |payload: GlyphInfo, color: Option<Color>| {
            self.has.contains(payload) && color.is_some_and(|c| c != foreground)
        };

        let mut stale = GlyphInfo::empty();
        if drawn_with(GlyphInfo::RECORDING_SURFACE, self.recording_foreground) {
            stale |= GlyphInfo::RECORDING_SURFACE;
        }
        if drawn_with(GlyphInfo::COLOR_SURFACE, self.color_foreground) {
            stale |= GlyphInfo::COLOR_SURFACE;
        }
        stale
    }

    /// Throw away color-dependent payloads, handing back a recording to drop later
    pub(crate) fn discard(&mut self, info: GlyphInfo) -> Option<GlyphRecording> {
        let mut recording = None;
        if info.contains(GlyphInfo::COLOR_SURFACE) {
            self.color_surface = None;
            self.color_foreground = None;
            self.has.remove(GlyphInfo::COLOR_SURFACE);
        }
        if info.contains(GlyphInfo::RECORDING_SURFACE) {
            recording = self.recording.take();
            self.recording_foreground = None;
            self.has.remove(GlyphInfo::RECORDING_SURFACE);
        }
        recording
    }
}

/// A glyph placed at a position in user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedGlyph {
    pub index: GlyphIndex,
    pub x: f64,
    pub y: f64,
}

/// Ink box and pen advance of a run of glyphs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TextExtents {
    pub x_bearing: f64,
    pub y_bearing: f64,
    pub width: f64,
    pub height: f64,
    pub x_advance: f64,
    pub y_advance: f64,
}
