//! The scaled font registry
//!
//! Hands out one shared [`ScaledFont`] per [`FontKey`]. Three things keep
//! repeated lookups cheap:
//!
//! - an MRU slot that answers back-to-back requests for the same key
//!   without hashing
//! - a holdover pool that keeps recently released fonts, and their glyph
//!   caches, alive for reuse
//! - placeholders, so a slow construction never holds the registry lock and
//!   never runs twice for the same key
//!
//! Fonts are never destroyed with the registry lock held. Anything that
//! might be a last reference is collected while locked and dropped after.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache_config::FontMapConfig;
use crate::error::{FontMapError, Result};
use crate::key::{FontFace, FontKey};
use crate::matrix::Matrix;
use crate::options::FontOptions;
use crate::page_cache::GlyphPageCache;
use crate::placeholder::Placeholder;
use crate::scaled_font::{FontInner, ScaleInfo, ScaledFont};

enum Slot {
    Live(Arc<FontInner>),
    Placeholder(Arc<Placeholder>),
}

/// Counters kept by a [`FontMap`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FontMapStats {
    /// Fonts in the table, holdovers included
    pub fonts: usize,
    pub holdovers: usize,
    /// Constructions in flight
    pub pending: usize,
    pub mru_hits: u64,
    pub table_hits: u64,
    pub constructions: u64,
    pub construction_failures: u64,
    /// Times a lookup had to wait for another thread's construction
    pub placeholder_waits: u64,
    /// Holdovers destroyed to stay within the pool size
    pub holdover_evictions: u64,
}

#[derive(Default)]
struct MapState {
    fonts: HashMap<FontKey, Slot>,
    mru: Option<Arc<FontInner>>,
    /// Zero-reference fonts, oldest first
    holdovers: VecDeque<Arc<FontInner>>,
    stats: FontMapStats,
}

impl MapState {
    fn remove_holdover(&mut self, font: &Arc<FontInner>) {
        if let Some(pos) = self.holdovers.iter().position(|f| Arc::ptr_eq(f, font)) {
            self.holdovers.remove(pos);
        }
        font.set_holdover(false);
    }

    /// Take a font out of the table, if the table still points at it
    fn unregister(&mut self, font: &Arc<FontInner>) {
        if matches!(self.fonts.get(font.key()), Some(Slot::Live(f)) if Arc::ptr_eq(f, font)) {
            self.fonts.remove(font.key());
        }
        font.set_registered(false);
    }
}

pub(crate) struct MapShared {
    config: FontMapConfig,
    page_cache: Arc<GlyphPageCache>,
    state: Mutex<MapState>,
}

impl MapShared {
    /// Return one reference to `font`
    pub(crate) fn release(&self, font: &Arc<FontInner>) {
        let mut graveyard = Vec::new();
        {
            let mut state = self.state.lock();
            self.release_locked(&mut state, font, &mut graveyard);
        }
        bury(graveyard);
    }

    fn release_locked(
        &self,
        state: &mut MapState,
        font: &Arc<FontInner>,
        graveyard: &mut Vec<Arc<FontInner>>,
    ) {
        if font.unref() > 0 || !font.is_registered() || font.is_holdover() {
            return;
        }

        if state.holdovers.len() >= self.config.max_holdovers {
            if let Some(oldest) = state.holdovers.pop_front() {
                oldest.set_holdover(false);
                state.unregister(&oldest);
                state.stats.holdover_evictions += 1;
                log::debug!("Holdover pool full, destroying scaled font {}", oldest.id());
                graveyard.push(oldest);
            }
        }

        font.set_holdover(true);
        state.holdovers.push_back(Arc::clone(font));
    }

    /// Make `font` the MRU, giving it the registry's extra reference
    fn promote(
        &self,
        state: &mut MapState,
        font: &Arc<FontInner>,
        graveyard: &mut Vec<Arc<FontInner>>,
    ) {
        if matches!(&state.mru, Some(mru) if Arc::ptr_eq(mru, font)) {
            return;
        }
        font.retain();
        if let Some(previous) = state.mru.replace(Arc::clone(font)) {
            self.release_locked(state, &previous, graveyard);
            graveyard.push(previous);
        }
    }

    /// Realize a font with no lock held; failures come back as error fonts
    fn build(self: &Arc<Self>, key: &FontKey) -> std::result::Result<Arc<FontInner>, Arc<FontInner>> {
        let failed = |scale: Option<ScaleInfo>, err: FontMapError| {
            Arc::new(FontInner::failed(key.clone(), scale, err, Arc::clone(&self.page_cache)))
        };

        let scale = match ScaleInfo::compute(key.font_matrix(), key.ctm()) {
            Ok(scale) => scale,
            Err(err) => {
                log::warn!("Cannot scale {}: {err}", key.face().family());
                return Err(failed(None, err));
            }
        };

        let backend = key.face().backend();
        match backend.construct(key, &scale) {
            Ok(font) => Ok(Arc::new(FontInner::new(
                key.clone(),
                scale,
                font,
                Arc::clone(&self.page_cache),
                Arc::downgrade(self),
                self.config.glyphs_per_page,
            ))),
            Err(err) => {
                log::warn!(
                    "Backend {} failed to construct {}: {err}",
                    backend.name(),
                    key.face().family()
                );
                Err(failed(Some(scale), err))
            }
        }
    }
}

/// Destroy whatever in the graveyard nobody references any more
///
/// Must be called with no registry lock held.
fn bury(graveyard: Vec<Arc<FontInner>>) {
    for font in graveyard {
        if !font.is_registered() && font.ref_count() == 0 {
            font.finish();
        }
    }
}

/// Keeps a key's placeholder honest while its font is being built
///
/// If construction unwinds, dropping this removes the placeholder and wakes
/// the waiters, who then retry and build the font themselves.
struct PendingConstruction<'a> {
    shared: &'a MapShared,
    key: &'a FontKey,
    placeholder: Arc<Placeholder>,
    armed: bool,
}

impl PendingConstruction<'_> {
    /// Clear the placeholder; the caller holds the registry lock
    fn complete(mut self, state: &mut MapState) {
        self.clear(state);
        self.armed = false;
    }

    fn clear(&self, state: &mut MapState) {
        let ours = matches!(
            state.fonts.get(self.key),
            Some(Slot::Placeholder(p)) if Arc::ptr_eq(p, &self.placeholder)
        );
        if ours {
            state.fonts.remove(self.key);
        }
        self.placeholder.open();
    }
}

impl Drop for PendingConstruction<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::warn!("Construction of {} did not complete", self.key.face().family());
            let mut state = self.shared.state.lock();
            self.clear(&mut state);
        }
    }
}

/// Registry of scaled fonts
///
/// Cloning gives another handle to the same registry.
///
/// ```
/// use typf_fontmap::{FontMap, FontMapConfig};
///
/// let map = FontMap::with_config(FontMapConfig::default().with_max_holdovers(16))?;
/// assert_eq!(map.stats().fonts, 0);
/// # Ok::<(), typf_fontmap::FontMapError>(())
/// ```
#[derive(Clone)]
pub struct FontMap {
    shared: Arc<MapShared>,
}

impl Default for FontMap {
    fn default() -> Self {
        Self::from_valid_config(FontMapConfig::default())
    }
}

impl FontMap {
    /// A registry configured from the environment
    pub fn new() -> Self {
        Self::from_valid_config(FontMapConfig::from_env())
    }

    pub fn with_config(config: FontMapConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: FontMapConfig) -> Self {
        log::debug!(
            "Creating font map: {} holdovers, {} pages of {} glyphs",
            config.max_holdovers,
            config.page_capacity,
            config.glyphs_per_page
        );
        Self {
            shared: Arc::new(MapShared {
                config,
                page_cache: Arc::new(GlyphPageCache::new(config.page_capacity)),
                state: Mutex::new(MapState::default()),
            }),
        }
    }

    pub fn config(&self) -> &FontMapConfig {
        &self.shared.config
    }

    /// The page cache shared by every font of this registry
    pub fn page_cache(&self) -> &GlyphPageCache {
        &self.shared.page_cache
    }

    /// Build a key and look it up
    pub fn get_or_create_font(
        &self,
        face: &FontFace,
        font_matrix: Matrix,
        ctm: Matrix,
        options: FontOptions,
    ) -> Result<ScaledFont> {
        let key = FontKey::new(face.clone(), font_matrix, ctm, options)?;
        Ok(self.lookup_or_create(&key))
    }

    /// The shared font for `key`, constructed on first use
    ///
    /// Never fails outright: if construction fails the returned font carries
    /// the error in [`ScaledFont::status`] and is not cached, so a later
    /// lookup tries again.
    pub fn lookup_or_create(&self, key: &FontKey) -> ScaledFont {
        let shared = &self.shared;
        let mut graveyard = Vec::new();
        let mut state = shared.state.lock();

        if let Some(mru) = state.mru.clone() {
            if mru.key() == key {
                if mru.status().is_ok() {
                    mru.retain();
                    state.stats.mru_hits += 1;
                    return ScaledFont::from_counted(mru);
                }
                // Broken fonts are abandoned so the key can be rebuilt
                state.mru = None;
                state.unregister(&mru);
                shared.release_locked(&mut state, &mru, &mut graveyard);
                graveyard.push(mru);
            }
        }

        loop {
            match state.fonts.get(key) {
                Some(Slot::Placeholder(placeholder)) => {
                    let placeholder = Arc::clone(placeholder);
                    state.stats.placeholder_waits += 1;
                    drop(state);
                    placeholder.wait();
                    state = shared.state.lock();
                }
                Some(Slot::Live(font)) => {
                    let font = Arc::clone(font);
                    if font.ref_count() == 0 {
                        state.remove_holdover(&font);
                        font.clear_error();
                    }
                    if font.status().is_ok() {
                        font.retain();
                        state.stats.table_hits += 1;
                        shared.promote(&mut state, &font, &mut graveyard);
                        drop(state);
                        bury(graveyard);
                        return ScaledFont::from_counted(font);
                    }

                    log::debug!("Abandoning scaled font {} in error", font.id());
                    state.unregister(&font);
                    graveyard.push(font);
                    break;
                }
                None => break,
            }
        }

        let placeholder = Arc::new(Placeholder::new());
        state
            .fonts
            .insert(key.clone(), Slot::Placeholder(Arc::clone(&placeholder)));
        drop(state);
        bury(std::mem::take(&mut graveyard));

        let pending = PendingConstruction {
            shared,
            key,
            placeholder,
            armed: true,
        };
        let built = shared.build(key);

        let mut state = shared.state.lock();
        pending.complete(&mut state);
        let font = match built {
            Ok(font) => {
                font.retain();
                font.set_registered(true);
                state.fonts.insert(key.clone(), Slot::Live(Arc::clone(&font)));
                state.stats.constructions += 1;
                shared.promote(&mut state, &font, &mut graveyard);
                log::debug!("Created scaled font {} for {}", font.id(), key.face().family());
                font
            }
            Err(font) => {
                font.retain();
                state.stats.construction_failures += 1;
                font
            }
        };
        drop(state);
        bury(graveyard);
        ScaledFont::from_counted(font)
    }

    /// Another reference to `font`
    pub fn retain(&self, font: &ScaledFont) -> ScaledFont {
        font.clone()
    }

    /// Give back a reference; same as dropping the handle
    pub fn release(&self, font: ScaledFont) {
        drop(font);
    }

    /// Whether a live font for `key` is in the table
    pub fn contains(&self, key: &FontKey) -> bool {
        matches!(self.shared.state.lock().fonts.get(key), Some(Slot::Live(_)))
    }

    pub fn stats(&self) -> FontMapStats {
        let state = self.shared.state.lock();
        let pending = state
            .fonts
            .values()
            .filter(|slot| matches!(slot, Slot::Placeholder(_)))
            .count();
        FontMapStats {
            fonts: state.fonts.len() - pending,
            holdovers: state.holdovers.len(),
            pending,
            ..state.stats
        }
    }

    /// Destroy every font nobody holds and forget the rest
    ///
    /// Fonts still referenced elsewhere stay usable but are no longer
    /// cached. The registry itself can be used again afterwards.
    pub fn shutdown(&self) {
        let shared = &self.shared;

        let mut graveyard = Vec::new();
        {
            let mut state = shared.state.lock();
            if let Some(mru) = state.mru.take() {
                shared.release_locked(&mut state, &mru, &mut graveyard);
                graveyard.push(mru);
            }
        }
        bury(graveyard);

        // Newest holdover first, each destroyed outside the lock since its
        // backend may call back into this registry
        let mut destroyed = 0usize;
        loop {
            let victim = {
                let mut state = shared.state.lock();
                let Some(font) = state.holdovers.pop_back() else {
                    break;
                };
                font.set_holdover(false);
                state.unregister(&font);
                font
            };
            victim.finish();
            drop(victim);
            destroyed += 1;
        }

        let detached: Vec<Arc<FontInner>> = {
            let mut state = shared.state.lock();
            let mut detached = Vec::new();
            state.fonts.retain(|_, slot| match slot {
                Slot::Live(font) => {
                    font.set_registered(false);
                    detached.push(Arc::clone(font));
                    false
                }
                Slot::Placeholder(_) => true,
            });
            state.stats = FontMapStats::default();
            detached
        };
        if !detached.is_empty() {
            log::warn!(
                "Font map shut down with {} scaled fonts still referenced",
                detached.len()
            );
        }
        bury(detached);

        if shared.page_cache.reset_if_empty() {
            log::debug!("Glyph page cache released");
        }
        log::debug!("Font map shut down, destroyed {destroyed} holdovers");
    }
}

impl std::fmt::Debug for FontMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMap")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_map_is_empty() {
        let map = FontMap::default();
        assert_eq!(map.stats(), FontMapStats::default());
        assert!(!map.page_cache().is_initialized());
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = FontMapConfig::default().with_page_capacity(0);
        assert!(FontMap::with_config(config).is_err());
    }

    #[test]
    fn shutdown_of_empty_map_is_a_noop() {
        let map = FontMap::default();
        map.shutdown();
        map.shutdown();
        assert_eq!(map.stats().fonts, 0);
    }
}
