//! The shared glyph page cache
//!
//! Every font's glyph pages are accounted for here, in one LRU list with a
//! fixed capacity. When the list is over capacity the least recently used
//! page whose font is not frozen is evicted: the page's records are unlinked
//! from the owning font and dropped.
//!
//! Fonts freeze this cache while they add pages, so eviction only ever runs
//! when nobody is in the middle of a glyph lookup burst. If every candidate
//! is frozen the cache simply runs over capacity until the next thaw.
//!
//! Locking order is always font lock first, then this cache's lock. Eviction
//! only *tries* a font's lock, so it never waits on a font while holding the
//! cache lock.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{FontMapError, Result};
use crate::glyph::GlyphRecord;
use crate::glyph_cache::PageId;
use crate::scaled_font::{FontId, FontInner};

/// Every page costs the same
const PAGE_WEIGHT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PageKey {
    pub(crate) font: FontId,
    pub(crate) page: PageId,
}

struct PageEntry {
    owner: Weak<FontInner>,
    weight: usize,
}

#[derive(Default)]
struct PageCacheState {
    /// Created on first insert, dropped again at teardown once empty
    pages: Option<LruCache<PageKey, PageEntry>>,
    per_font: HashMap<FontId, usize>,
    occupancy: usize,
    freeze_count: usize,
    evictions: u64,
    overflows: u64,
}

/// Records and fonts pulled out during eviction
///
/// Dropping these can run backend code, so they are carried out of the cache
/// lock and dropped by the caller afterwards. Records go first; a font may
/// be destroyed when its last reference here goes.
#[derive(Default)]
#[must_use]
pub(crate) struct Evicted {
    records: Vec<GlyphRecord>,
    fonts: Vec<Arc<FontInner>>,
}

impl Evicted {
    /// Glyph records that were unlinked
    pub(crate) fn glyphs(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty() && self.fonts.is_empty()
    }
}

/// Snapshot of the page cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCacheStats {
    pub pages: usize,
    pub capacity: usize,
    pub fonts: usize,
    pub evictions: u64,
    /// Times eviction found nothing it could remove
    pub overflows: u64,
    pub frozen: bool,
    pub initialized: bool,
}

/// Global LRU over all fonts' glyph pages
pub struct GlyphPageCache {
    capacity: usize,
    state: Mutex<PageCacheState>,
}

impl GlyphPageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(PageCacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a new page of `owner`
    ///
    /// Never evicts: the caller holds `owner`'s lock and a freeze on this
    /// cache, and the shrink back to capacity happens at the last thaw.
    pub(crate) fn insert(&self, owner: &Arc<FontInner>, page: PageId) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state
            .per_font
            .try_reserve(1)
            .map_err(|_| FontMapError::OutOfMemory)?;
        if state.pages.is_none() {
            log::debug!("Initializing glyph page cache, capacity {} pages", self.capacity);
            state.pages = Some(LruCache::unbounded());
        }

        let key = PageKey {
            font: owner.id(),
            page,
        };
        if let Some(pages) = state.pages.as_mut() {
            pages.push(
                key,
                PageEntry {
                    owner: Arc::downgrade(owner),
                    weight: PAGE_WEIGHT,
                },
            );
        }
        *state.per_font.entry(key.font).or_default() += 1;
        state.occupancy += PAGE_WEIGHT;
        Ok(())
    }

    /// Drop one page's entry; its records stay with the caller
    pub(crate) fn remove(&self, key: PageKey) -> bool {
        let mut state = self.state.lock();
        Self::forget(&mut state, key)
    }

    /// Drop the entries of several pages of one font
    pub(crate) fn remove_font(&self, font: FontId, pages: &[PageId]) {
        if pages.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        for &page in pages {
            Self::forget(&mut state, PageKey { font, page });
        }
    }

    /// Mark a page as just used
    pub(crate) fn touch(&self, key: PageKey) {
        if let Some(pages) = self.state.lock().pages.as_mut() {
            pages.promote(&key);
        }
    }

    /// Suspend eviction; nests
    pub(crate) fn freeze(&self) {
        self.state.lock().freeze_count += 1;
    }

    /// Undo one [`GlyphPageCache::freeze`], evicting down to capacity on the last
    pub(crate) fn thaw(&self) -> Evicted {
        let mut evicted = Evicted::default();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.freeze_count.checked_sub(1) {
            Some(count) => state.freeze_count = count,
            None => {
                log::warn!("Glyph page cache thawed more often than frozen");
                return evicted;
            }
        }
        if state.freeze_count == 0 {
            self.shrink(state, &mut evicted);
        }
        evicted
    }

    /// Pages currently held for one font
    pub fn pages_for_font(&self, font: FontId) -> usize {
        self.state.lock().per_font.get(&font).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.state.lock().occupancy
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().pages.is_some()
    }

    pub fn stats(&self) -> PageCacheStats {
        let state = self.state.lock();
        PageCacheStats {
            pages: state.occupancy,
            capacity: self.capacity,
            fonts: state.per_font.len(),
            evictions: state.evictions,
            overflows: state.overflows,
            frozen: state.freeze_count > 0,
            initialized: state.pages.is_some(),
        }
    }

    /// Release the LRU itself if nothing is left in it
    pub(crate) fn reset_if_empty(&self) -> bool {
        let mut state = self.state.lock();
        if state.occupancy > 0 || state.freeze_count > 0 {
            return false;
        }
        state.pages = None;
        state.per_font = HashMap::new();
        true
    }

    fn forget(state: &mut PageCacheState, key: PageKey) -> bool {
        let Some(entry) = state.pages.as_mut().and_then(|pages| pages.pop(&key)) else {
            return false;
        };
        state.occupancy -= entry.weight;
        if let Some(count) = state.per_font.get_mut(&key.font) {
            *count -= 1;
            if *count == 0 {
                state.per_font.remove(&key.font);
            }
        }
        true
    }

    /// Evict least recently used pages until the cache is within capacity
    fn shrink(&self, state: &mut PageCacheState, evicted: &mut Evicted) {
        while state.occupancy > self.capacity {
            let Some(pages) = state.pages.as_ref() else {
                return;
            };

            let mut victim = None;
            for (key, entry) in pages.iter().rev() {
                let Some(font) = entry.owner.upgrade() else {
                    // Owner is mid-destruction; it will find the entry gone
                    victim = Some(*key);
                    break;
                };
                let plucked = font.try_pluck_page(key.page);
                // Never drop a font reference under this lock
                evicted.fonts.push(font);
                if let Some(records) = plucked {
                    evicted.records.extend(records);
                    victim = Some(*key);
                    break;
                }
            }

            let Some(key) = victim else {
                state.overflows += 1;
                log::warn!(
                    "Glyph page cache over capacity ({}/{} pages), every page is in use",
                    state.occupancy,
                    self.capacity
                );
                return;
            };
            Self::forget(state, key);
            state.evictions += 1;
            log::trace!("Evicted glyph page {} of font {}", key.page, key.font);
        }
    }
}

impl std::fmt::Debug for GlyphPageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlyphPageCache")
            .field("stats", &self.stats())
            .finish()
    }
}
