//! Scaled fonts: a face realized at one scale, with its glyph cache
//!
//! A [`ScaledFont`] is a counted handle. Cloning it takes a reference and
//! dropping it gives one back to the registry that created it, which decides
//! whether the font lives on as a holdover or is destroyed.
//!
//! Glyph data is reached through a [`FreezeGuard`]. Freezing takes the
//! font's reentrant lock and pins its glyph pages against eviction, so every
//! record fetched under one guard stays valid until the guard is dropped.
//!
//! ```ignore
//! let font = map.lookup_or_create(&key);
//! let frozen = font.freeze()?;
//! for glyph in run {
//!     let record = frozen.lookup_glyph(glyph.index, GlyphInfo::PATH, None)?;
//!     draw(record.path());
//! }
//! // thaw happens here
//! ```

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::error::{FontMapError, GlyphError, Result};
use crate::font_map::MapShared;
use crate::glyph::{
    Color, GlyphIndex, GlyphInfo, GlyphRecord, PositionedGlyph, TextExtents,
};
use crate::glyph_cache::{GlyphCache, GlyphSlot, PageId};
use crate::key::FontKey;
use crate::matrix::Matrix;
use crate::page_cache::{Evicted, GlyphPageCache, PageKey};
use crate::traits::ScaledFontBackend;

/// Process-unique identifier of a scaled font
pub type FontId = u64;

static NEXT_FONT_ID: AtomicU64 = AtomicU64::new(1);

/// Font-wide metrics in user space
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FontExtents {
    pub ascent: f64,
    pub descent: f64,
    pub height: f64,
    pub max_x_advance: f64,
    pub max_y_advance: f64,
}

/// The combined scale of a font and what follows from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleInfo {
    /// Font matrix followed by the device transform
    pub scale: Matrix,
    pub scale_inverse: Matrix,
    /// Largest row sum of the absolute linear part
    pub max_scale: f64,
}

impl ScaleInfo {
    /// Derive the scale for a font matrix under a device transform
    ///
    /// A scale that collapses everything to a point (size 0) is accepted and
    /// gets an all-zero inverse. A scale that is singular in only one
    /// direction cannot be used to realize glyphs and is an error.
    pub fn compute(font_matrix: &Matrix, ctm: &Matrix) -> Result<Self> {
        let scale = font_matrix.multiply(ctm);
        let max_scale = (scale.xx.abs() + scale.xy.abs()).max(scale.yx.abs() + scale.yy.abs());

        let scale_inverse = match scale.invert() {
            Some(inverse) => inverse,
            None if scale.is_scale_0() => Matrix::new(0.0, 0.0, 0.0, 0.0, -scale.x0, -scale.y0),
            None => return Err(FontMapError::InvalidMatrix("font scale is not invertible")),
        };

        Ok(Self {
            scale,
            scale_inverse,
            max_scale,
        })
    }
}

/// Read-only facts about a scaled font, handed to its backend
#[derive(Debug, Clone)]
pub struct FontInfo {
    id: FontId,
    key: FontKey,
    scale: ScaleInfo,
    extents: FontExtents,
}

impl FontInfo {
    pub fn id(&self) -> FontId {
        self.id
    }

    pub fn key(&self) -> &FontKey {
        &self.key
    }

    pub fn scale(&self) -> &ScaleInfo {
        &self.scale
    }

    pub fn extents(&self) -> &FontExtents {
        &self.extents
    }
}

/// Backend of fonts that never made it past construction
struct NilFont;

impl ScaledFontBackend for NilFont {
    fn extents(&self) -> FontExtents {
        FontExtents::default()
    }

    fn populate_glyph(
        &self,
        _font: &FontInfo,
        _glyph: &mut GlyphRecord,
        info: GlyphInfo,
        _foreground: Color,
    ) -> std::result::Result<(), GlyphError> {
        Err(GlyphError::Unsupported(info))
    }

    fn glyph_index_for_codepoint(&self, _codepoint: char) -> Option<GlyphIndex> {
        None
    }
}

type UserData = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Shared state behind every handle to one font
pub(crate) struct FontInner {
    info: FontInfo,
    backend: Box<dyn ScaledFontBackend>,
    status: Mutex<Option<FontMapError>>,
    /// Handles plus the registry's own MRU reference
    ref_count: AtomicUsize,
    /// Present in the registry table
    registered: AtomicBool,
    holdover: AtomicBool,
    finished: AtomicBool,
    freeze_depth: AtomicUsize,
    cache: ReentrantMutex<RefCell<GlyphCache>>,
    /// Client data, one value per type, released when the font is finished
    user_data: Mutex<UserData>,
    page_cache: Arc<GlyphPageCache>,
    registry: Weak<MapShared>,
}

impl FontInner {
    pub(crate) fn new(
        key: FontKey,
        scale: ScaleInfo,
        backend: Box<dyn ScaledFontBackend>,
        page_cache: Arc<GlyphPageCache>,
        registry: Weak<MapShared>,
        glyphs_per_page: usize,
    ) -> Self {
        let extents = backend.extents();
        Self {
            info: FontInfo {
                id: NEXT_FONT_ID.fetch_add(1, Ordering::Relaxed),
                key,
                scale,
                extents,
            },
            backend,
            status: Mutex::new(None),
            ref_count: AtomicUsize::new(0),
            registered: AtomicBool::new(false),
            holdover: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            freeze_depth: AtomicUsize::new(0),
            cache: ReentrantMutex::new(RefCell::new(GlyphCache::new(glyphs_per_page))),
            user_data: Mutex::new(HashMap::new()),
            page_cache,
            registry,
        }
    }

    /// A font that is in error from birth and belongs to no registry
    pub(crate) fn failed(
        key: FontKey,
        scale: Option<ScaleInfo>,
        error: FontMapError,
        page_cache: Arc<GlyphPageCache>,
    ) -> Self {
        let scale = scale.unwrap_or(ScaleInfo {
            scale: Matrix::IDENTITY,
            scale_inverse: Matrix::IDENTITY,
            max_scale: 1.0,
        });
        let inner = Self::new(key, scale, Box::new(NilFont), page_cache, Weak::new(), 1);
        *inner.status.lock() = Some(error);
        inner
    }

    pub(crate) fn id(&self) -> FontId {
        self.info.id
    }

    pub(crate) fn key(&self) -> &FontKey {
        &self.info.key
    }

    pub(crate) fn status(&self) -> Result<()> {
        match &*self.status.lock() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Record an error; the first one sticks and is what gets returned
    pub(crate) fn set_error(&self, error: FontMapError) -> FontMapError {
        let mut status = self.status.lock();
        match &*status {
            Some(first) => first.clone(),
            None => {
                log::warn!("Scaled font {} entered error state: {error}", self.info.id);
                *status = Some(error.clone());
                error
            }
        }
    }

    pub(crate) fn clear_error(&self) {
        *self.status.lock() = None;
    }

    pub(crate) fn retain(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference, returning how many are left
    pub(crate) fn unref(&self) -> usize {
        self.ref_count.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    pub(crate) fn is_holdover(&self) -> bool {
        self.holdover.load(Ordering::Acquire)
    }

    pub(crate) fn set_holdover(&self, holdover: bool) {
        self.holdover.store(holdover, Ordering::Release);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn check_usable(&self) -> Result<()> {
        self.status()?;
        if self.is_finished() {
            return Err(FontMapError::Finished);
        }
        Ok(())
    }

    /// Tear down the glyph cache and leave the shared page cache
    ///
    /// Runs at most once. User data is dropped after the font lock is
    /// released, so its destructors may use the registry. The backend itself
    /// is dropped with the last `Arc`.
    pub(crate) fn finish(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained = {
            let guard = self.cache.lock();
            let drained = match guard.try_borrow_mut() {
                Ok(mut cache) => cache.drain(),
                Err(_) => {
                    log::warn!("Scaled font {} finished while its cache was in use", self.info.id);
                    return;
                }
            };
            self.page_cache.remove_font(self.info.id, &drained.pages);
            drained
        };

        log::debug!(
            "Finished scaled font {} ({}), dropped {} glyphs in {} pages",
            self.info.id,
            self.info.key.face().family(),
            drained.records.len(),
            drained.pages.len()
        );
        drop(drained);

        let user_data = std::mem::take(&mut *self.user_data.lock());
        drop(user_data);
    }

    /// Give up one page for eviction, if this font is idle
    ///
    /// Called from the page cache with its lock held, so this only ever
    /// tries the font lock. A frozen font keeps its pages.
    pub(crate) fn try_pluck_page(&self, page: PageId) -> Option<Vec<GlyphRecord>> {
        if self.is_finished() {
            return Some(Vec::new());
        }
        let guard = self.cache.try_lock()?;
        if self.freeze_depth.load(Ordering::Acquire) > 0 {
            return None;
        }
        let mut cache = guard.try_borrow_mut().ok()?;
        Some(cache.pluck_page(page))
    }
}

impl Drop for FontInner {
    fn drop(&mut self) {
        self.finish();
        log::trace!("Destroying scaled font {}", self.info.id);
    }
}

/// A counted reference to a scaled font
pub struct ScaledFont {
    inner: Arc<FontInner>,
}

impl ScaledFont {
    /// Wrap a reference the caller has already counted
    pub(crate) fn from_counted(inner: Arc<FontInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> FontId {
        self.inner.id()
    }

    pub fn key(&self) -> &FontKey {
        self.inner.key()
    }

    pub fn info(&self) -> &FontInfo {
        &self.inner.info
    }

    pub fn extents(&self) -> &FontExtents {
        &self.inner.info.extents
    }

    pub fn scale(&self) -> &ScaleInfo {
        &self.inner.info.scale
    }

    /// Font space to device space, translation excluded
    pub fn scale_matrix(&self) -> &Matrix {
        &self.inner.info.scale.scale
    }

    pub fn max_scale(&self) -> f64 {
        self.inner.info.scale.max_scale
    }

    /// The sticky error, if this font has one
    pub fn status(&self) -> Result<()> {
        self.inner.status()
    }

    /// Put the font in error; returns the error it ends up holding
    pub fn set_error(&self, error: FontMapError) -> FontMapError {
        self.inner.set_error(error)
    }

    /// Counted references, including the registry's MRU reference
    pub fn reference_count(&self) -> usize {
        self.inner.ref_count()
    }

    /// Both handles name the very same font object
    pub fn ptr_eq(&self, other: &ScaledFont) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Attach client data of type `T`, replacing any earlier value of that type
    ///
    /// The value lives until the font is destroyed. Fonts in error or
    /// already finished refuse it.
    pub fn set_user_data<T: Any + Send + Sync>(&self, value: T) -> Result<()> {
        self.inner.check_usable()?;
        let replaced = self
            .inner
            .user_data
            .lock()
            .insert(TypeId::of::<T>(), Arc::new(value));
        drop(replaced);
        Ok(())
    }

    pub fn user_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let data = self.inner.user_data.lock().get(&TypeId::of::<T>()).cloned()?;
        data.downcast::<T>().ok()
    }

    /// Detach client data of type `T`, handing it back
    pub fn remove_user_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let data = self.inner.user_data.lock().remove(&TypeId::of::<T>())?;
        data.downcast::<T>().ok()
    }

    /// Map a character through the backend
    pub fn glyph_index(&self, codepoint: char) -> Result<Option<GlyphIndex>> {
        self.inner.status()?;
        Ok(self.inner.backend.glyph_index_for_codepoint(codepoint))
    }

    /// Pin the glyph cache for a burst of lookups
    ///
    /// Blocks while another thread has this font frozen. Freezing again on
    /// the same thread nests.
    pub fn freeze(&self) -> Result<FreezeGuard<'_>> {
        self.inner.check_usable()?;
        let lock = self.inner.cache.lock();
        self.inner.freeze_depth.fetch_add(1, Ordering::AcqRel);
        Ok(FreezeGuard {
            font: self,
            lock: Some(lock),
        })
    }

    /// Ink extents and advance of a glyph run
    pub fn glyph_extents(&self, glyphs: &[PositionedGlyph]) -> std::result::Result<TextExtents, GlyphError> {
        let (Some(first), Some(last)) = (glyphs.first(), glyphs.last()) else {
            return Ok(TextExtents::default());
        };

        let frozen = self.freeze()?;
        let mut ink: Option<(f64, f64, f64, f64)> = None;
        let mut last_metrics = None;
        for glyph in glyphs {
            let record = frozen.lookup_glyph(glyph.index, GlyphInfo::METRICS, None)?;
            let m = *record.metrics();
            last_metrics = Some(m);

            // Blank glyphs advance the pen but add no ink
            if m.width == 0.0 || m.height == 0.0 {
                continue;
            }
            let left = glyph.x + m.x_bearing;
            let top = glyph.y + m.y_bearing;
            let (right, bottom) = (left + m.width, top + m.height);
            ink = Some(match ink {
                None => (left, top, right, bottom),
                Some((x0, y0, x1, y1)) => (x0.min(left), y0.min(top), x1.max(right), y1.max(bottom)),
            });
        }
        drop(frozen);

        let mut extents = TextExtents::default();
        if let Some((x0, y0, x1, y1)) = ink {
            extents.x_bearing = x0 - first.x;
            extents.y_bearing = y0 - first.y;
            extents.width = x1 - x0;
            extents.height = y1 - y0;
        }
        if let Some(m) = last_metrics {
            extents.x_advance = last.x + m.x_advance - first.x;
            extents.y_advance = last.y + m.y_advance - first.y;
        }
        Ok(extents)
    }

    /// Throw away every cached glyph of this font
    ///
    /// Fails with [`FontMapError::CacheFrozen`] if the calling thread has the
    /// font frozen.
    pub fn reset_cache(&self) -> Result<()> {
        let guard = self.inner.cache.lock();
        if self.inner.freeze_depth.load(Ordering::Acquire) > 0 {
            return Err(FontMapError::CacheFrozen);
        }
        let drained = guard
            .try_borrow_mut()
            .map_err(|_| FontMapError::CacheFrozen)?
            .drain();
        self.inner.page_cache.remove_font(self.inner.id(), &drained.pages);
        drop(guard);

        log::debug!("Reset glyph cache of font {}: {} glyphs", self.id(), drained.records.len());
        drop(drained);
        Ok(())
    }

    /// Glyphs reachable in the cache right now
    pub fn cached_glyphs(&self) -> usize {
        let guard = self.inner.cache.lock();
        let count = guard.try_borrow().map(|cache| cache.glyph_count()).unwrap_or(0);
        count
    }

    /// Pages this font owns right now
    pub fn cached_pages(&self) -> usize {
        let guard = self.inner.cache.lock();
        let count = guard.try_borrow().map(|cache| cache.page_count()).unwrap_or(0);
        count
    }
}

impl Clone for ScaledFont {
    fn clone(&self) -> Self {
        self.inner.retain();
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for ScaledFont {
    fn drop(&mut self) {
        match self.inner.registry.upgrade() {
            Some(registry) => registry.release(&self.inner),
            None => {
                self.inner.unref();
            }
        }
    }
}

impl PartialEq for ScaledFont {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ScaledFont {}

impl fmt::Debug for ScaledFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScaledFont")
            .field("id", &self.id())
            .field("family", &self.key().face().family())
            .field("refs", &self.reference_count())
            .field("status", &self.status().err())
            .finish()
    }
}

/// A frozen font; glyph records are looked up through this
///
/// Dropping the guard thaws the font. Records already handed out stay
/// usable after that, they are just no longer guaranteed to be cached.
pub struct FreezeGuard<'a> {
    font: &'a ScaledFont,
    lock: Option<ReentrantMutexGuard<'a, RefCell<GlyphCache>>>,
}

impl<'a> FreezeGuard<'a> {
    pub fn font(&self) -> &'a ScaledFont {
        self.font
    }

    /// Thaw now rather than at end of scope
    pub fn thaw(self) {
        drop(self);
    }

    /// Fetch a glyph with at least the data in `info`
    ///
    /// Missing data is asked of the backend and cached. `foreground` is the
    /// color to draw color glyphs with (black when `None`); color data that
    /// was produced with a different foreground is regenerated.
    pub fn lookup_glyph(
        &self,
        index: GlyphIndex,
        info: GlyphInfo,
        foreground: Option<Color>,
    ) -> std::result::Result<GlyphRecord, GlyphError> {
        let inner = &self.font.inner;
        inner.check_usable()?;
        let foreground = foreground.unwrap_or_default();

        let cached = self
            .cell()
            .borrow()
            .lookup(index)
            .map(|(slot, record)| (slot, record.clone()));
        let (slot, mut record, fresh) = match cached {
            Some((slot, record)) => {
                inner.page_cache.touch(PageKey {
                    font: inner.id(),
                    page: slot.page,
                });
                (slot, record, false)
            }
            None => {
                let (slot, record) = self.create_glyph(index, info, foreground)?;
                (slot, record, true)
            }
        };

        let missing = info - record.has();
        if missing.contains(GlyphInfo::COLOR_SURFACE) && record.is_color_glyph() == Some(false) {
            return Err(GlyphError::Unsupported(GlyphInfo::COLOR_SURFACE));
        }
        // A fresh record was just populated with `info`; anything it still
        // lacks is reported unsupported rather than asked for a second time
        let mut need = if fresh { GlyphInfo::empty() } else { missing };

        let stale = record.stale_for(foreground);
        if stale.intersects(info) {
            need |= stale & info;
            if let Some(recording) = record.discard(stale) {
                self.cell().borrow_mut().defer(recording);
            }
        }

        if !need.is_empty() {
            let populated = inner
                .backend
                .populate_glyph(&inner.info, &mut record, need, foreground);
            self.cell().borrow_mut().store(slot, record.clone());
            populated?;
        }

        let missing = info - record.has();
        if !missing.is_empty() {
            return Err(GlyphError::Unsupported(missing));
        }
        Ok(record)
    }

    fn cell(&self) -> &RefCell<GlyphCache> {
        match &self.lock {
            Some(lock) => lock,
            None => unreachable!("freeze guard used after thaw"),
        }
    }

    /// Allocate, populate and publish a glyph that is not cached yet
    fn create_glyph(
        &self,
        index: GlyphIndex,
        info: GlyphInfo,
        foreground: Color,
    ) -> std::result::Result<(GlyphSlot, GlyphRecord), GlyphError> {
        let inner = &self.font.inner;
        let slot = self.allocate_slot(index)?;

        // The backend runs with no RefCell borrow held, so it may look up
        // other glyphs of this font.
        let mut record = GlyphRecord::new(index);
        if let Err(err) =
            inner
                .backend
                .populate_glyph(&inner.info, &mut record, info | GlyphInfo::METRICS, foreground)
        {
            self.free_slot(slot);
            return Err(err);
        }

        let mut cache = self.cell().borrow_mut();
        cache.store(slot, record.clone());
        cache.publish(index, slot);
        Ok((slot, record))
    }

    fn allocate_slot(&self, index: GlyphIndex) -> Result<GlyphSlot> {
        let inner = &self.font.inner;
        if let Some(slot) = self.cell().borrow_mut().allocate(index) {
            return Ok(slot);
        }

        // New page: hold the page cache frozen until this font thaws so the
        // page cannot be evicted before its glyph is returned.
        let needs_freeze = !self.cell().borrow().global_frozen;
        if needs_freeze {
            inner.page_cache.freeze();
            self.cell().borrow_mut().global_frozen = true;
        }

        let (page_id, page) = self
            .cell()
            .borrow_mut()
            .reserve_page()
            .map_err(|err| inner.set_error(err))?;
        inner
            .page_cache
            .insert(inner, page_id)
            .map_err(|err| inner.set_error(err))?;

        let slot = {
            let mut cache = self.cell().borrow_mut();
            cache.link_page(page_id, page);
            cache.allocate(index)
        };
        log::trace!("Font {} grew to page {page_id}", inner.id());

        slot.ok_or_else(|| inner.set_error(FontMapError::OutOfMemory))
    }

    fn free_slot(&self, slot: GlyphSlot) {
        let inner = &self.font.inner;
        let emptied = self.cell().borrow_mut().free_slot(slot);
        if let Some(page) = emptied {
            inner.page_cache.remove(PageKey {
                font: inner.id(),
                page,
            });
        }
    }
}

impl Drop for FreezeGuard<'_> {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        let inner = &self.font.inner;

        let mut evicted = Evicted::default();
        let mut deferred = Vec::new();
        if inner.freeze_depth.load(Ordering::Acquire) == 1 {
            let held_global = std::mem::take(&mut lock.borrow_mut().global_frozen);
            // Eviction runs while this font still counts as frozen, so its
            // own pages survive the shrink.
            if held_global {
                evicted = inner.page_cache.thaw();
            }
            deferred = lock.borrow_mut().take_deferred();
        }
        inner.freeze_depth.fetch_sub(1, Ordering::AcqRel);
        drop(lock);

        drop(deferred);
        if !evicted.is_empty() {
            log::trace!("Thaw of font {} evicted {} glyphs", inner.id(), evicted.glyphs());
        }
        drop(evicted);
    }
}

impl fmt::Debug for FreezeGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreezeGuard")
            .field("font", &self.font.id())
            .field("depth", &self.font.inner.freeze_depth.load(Ordering::Relaxed))
            .finish()
    }
}
