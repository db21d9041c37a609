#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use kurbo::{BezPath, Rect, Shape};
use typf_fontmap::{
    BitmapFormat, Color, FontBackend, FontExtents, FontFace, FontInfo, FontKey, FontMap,
    FontMapConfig, FontMapError, FontOptions, GlyphError, GlyphImage, GlyphIndex, GlyphInfo,
    GlyphMetrics, GlyphRecord, GlyphRecording, Matrix, ScaleInfo, ScaledFontBackend,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What a mock backend has been asked to do
#[derive(Default)]
pub struct Counters {
    pub constructs: AtomicUsize,
    pub drops: AtomicUsize,
    pub populates: AtomicUsize,
    pub recording_drops: AtomicUsize,
    pub requests: Mutex<Vec<(GlyphIndex, GlyphInfo)>>,
}

impl Counters {
    pub fn constructs(&self) -> usize {
        self.constructs.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    pub fn populates(&self) -> usize {
        self.populates.load(Ordering::SeqCst)
    }

    pub fn recording_drops(&self) -> usize {
        self.recording_drops.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(GlyphIndex, GlyphInfo)> {
        self.requests.lock().unwrap().clone()
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Knobs for a mock backend
#[derive(Clone, Default)]
pub struct Behavior {
    pub construct_delay: Option<Duration>,
    pub fail_construct: bool,
    /// How many of the first constructions panic
    pub panicking_constructs: usize,
    pub no_paths: bool,
    /// Glyphs that have a color form
    pub color_glyphs: Vec<GlyphIndex>,
    /// Glyphs whose population fails outright
    pub broken_glyphs: Vec<GlyphIndex>,
    /// Glyphs the backend refuses when first populated
    pub refused_glyphs: Vec<GlyphIndex>,
    /// Runs when a constructed font is dropped
    pub on_drop: Option<Hook>,
}

pub struct MockBackend {
    pub counters: Arc<Counters>,
    behavior: Behavior,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Self::with(Behavior::default())
    }

    pub fn with(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::new(Counters::default()),
            behavior,
        })
    }

    pub fn face(self: &Arc<Self>, family: &str) -> FontFace {
        FontFace::new(family, Arc::clone(self) as Arc<dyn FontBackend>)
    }
}

impl FontBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn construct(
        &self,
        key: &FontKey,
        scale: &ScaleInfo,
    ) -> typf_fontmap::Result<Box<dyn ScaledFontBackend>> {
        let attempt = self.counters.constructs.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.behavior.construct_delay {
            thread::sleep(delay);
        }
        if attempt < self.behavior.panicking_constructs {
            panic!("mock backend crashed building {}", key.face().family());
        }
        if self.behavior.fail_construct {
            return Err(FontMapError::Backend("mock refused".into()));
        }
        Ok(Box::new(MockFont {
            counters: Arc::clone(&self.counters),
            behavior: self.behavior.clone(),
            size: scale.max_scale,
        }))
    }
}

struct MockFont {
    counters: Arc<Counters>,
    behavior: Behavior,
    size: f64,
}

/// Stands in for a recorded drawing; counts its own destruction
struct RecordingProbe {
    counters: Arc<Counters>,
    pub foreground: Color,
}

impl Drop for RecordingProbe {
    fn drop(&mut self) {
        self.counters.recording_drops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn probe_color(recording: &GlyphRecording) -> Option<Color> {
    recording.downcast_ref::<RecordingProbe>().map(|p| p.foreground)
}

fn image(format: BitmapFormat, fill: [u8; 4]) -> GlyphImage {
    GlyphImage {
        width: 2,
        height: 2,
        origin: (0, -2),
        format,
        data: fill.repeat(4),
    }
}

impl ScaledFontBackend for MockFont {
    fn extents(&self) -> FontExtents {
        FontExtents {
            ascent: self.size * 0.8,
            descent: self.size * 0.2,
            height: self.size * 1.2,
            max_x_advance: self.size,
            max_y_advance: 0.0,
        }
    }

    fn populate_glyph(
        &self,
        _font: &FontInfo,
        glyph: &mut GlyphRecord,
        info: GlyphInfo,
        foreground: Color,
    ) -> Result<(), GlyphError> {
        self.counters.populates.fetch_add(1, Ordering::SeqCst);
        self.counters
            .requests
            .lock()
            .unwrap()
            .push((glyph.index(), info));

        let index = glyph.index();
        if self.behavior.broken_glyphs.contains(&index) {
            return Err(GlyphError::Backend(format!("glyph {index} is corrupt")));
        }
        if self.behavior.refused_glyphs.contains(&index) {
            return Err(GlyphError::Unsupported(info));
        }

        if info.contains(GlyphInfo::METRICS) {
            // Glyph 0 is a space: an advance and no ink
            let metrics = if index == 0 {
                GlyphMetrics {
                    x_advance: self.size,
                    ..Default::default()
                }
            } else {
                GlyphMetrics {
                    x_bearing: 1.0,
                    y_bearing: -self.size,
                    width: self.size / 2.0,
                    height: self.size,
                    x_advance: self.size,
                    y_advance: 0.0,
                }
            };
            glyph.set_metrics(metrics);
        }
        if info.contains(GlyphInfo::SURFACE) {
            glyph.set_surface(image(BitmapFormat::Gray8, [255; 4]));
        }
        if info.contains(GlyphInfo::PATH) && !self.behavior.no_paths {
            let rect = Rect::new(0.0, -self.size, self.size / 2.0, 0.0);
            glyph.set_path(BezPath::from_vec(rect.path_elements(0.1).collect()));
        }
        if info.contains(GlyphInfo::RECORDING_SURFACE) {
            let probe = RecordingProbe {
                counters: Arc::clone(&self.counters),
                foreground,
            };
            glyph.set_recording(GlyphRecording::new(probe), Some(foreground));
        }
        if info.contains(GlyphInfo::COLOR_SURFACE) {
            if self.behavior.color_glyphs.contains(&index) {
                let fill = [foreground.r, foreground.g, foreground.b, foreground.a];
                glyph.set_color_surface(Some(image(BitmapFormat::Rgba8, fill)), Some(foreground));
            } else {
                glyph.set_color_surface(None, None);
            }
        }
        Ok(())
    }

    fn glyph_index_for_codepoint(&self, codepoint: char) -> Option<GlyphIndex> {
        match codepoint {
            ' ' => Some(0),
            'A'..='Z' => Some(codepoint as u32 - 'A' as u32 + 1),
            _ => None,
        }
    }
}

impl Drop for MockFont {
    fn drop(&mut self) {
        self.counters.drops.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.behavior.on_drop {
            hook();
        }
    }
}

pub fn key_at(face: &FontFace, size: f64) -> FontKey {
    FontKey::new(
        face.clone(),
        Matrix::scale(size, size),
        Matrix::IDENTITY,
        FontOptions::default(),
    )
    .unwrap()
}

pub fn map_with(config: FontMapConfig) -> FontMap {
    init_logging();
    FontMap::with_config(config).unwrap()
}
