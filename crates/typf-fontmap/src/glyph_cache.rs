//! Per-font glyph storage, carved into fixed-size pages
//!
//! Records live in pages of `glyphs_per_page` slots. Pages are appended in
//! order and only the newest one ever has free slots, so a font's storage
//! grows by whole pages and the shared page cache can account for (and
//! evict) it a page at a time.
//!
//! Nothing here locks. The owning scaled font serializes access through its
//! reentrant lock and keeps the shared page cache in step with what this
//! structure holds.

use std::collections::{BTreeMap, HashMap};

use crate::error::{FontMapError, Result};
use crate::glyph::{GlyphIndex, GlyphRecord, GlyphRecording};

pub(crate) type PageId = u64;

/// Where a record lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GlyphSlot {
    pub(crate) page: PageId,
    pub(crate) slot: usize,
}

/// A page that has been allocated but not linked into a font yet
#[derive(Debug)]
pub(crate) struct GlyphPage {
    records: Vec<GlyphRecord>,
}

/// What a font tears out of its cache when it is reset or finished
#[derive(Debug, Default)]
pub(crate) struct Drained {
    pub(crate) pages: Vec<PageId>,
    pub(crate) records: Vec<GlyphRecord>,
}

#[derive(Debug)]
pub(crate) struct GlyphCache {
    glyphs: HashMap<GlyphIndex, GlyphSlot>,
    pages: BTreeMap<PageId, GlyphPage>,
    next_page: PageId,
    glyphs_per_page: usize,
    /// This font currently holds a freeze on the shared page cache
    pub(crate) global_frozen: bool,
    /// Recordings replaced while frozen, dropped at thaw
    deferred: Vec<GlyphRecording>,
}

impl GlyphCache {
    pub(crate) fn new(glyphs_per_page: usize) -> Self {
        Self {
            glyphs: HashMap::new(),
            pages: BTreeMap::new(),
            next_page: 0,
            glyphs_per_page: glyphs_per_page.max(1),
            global_frozen: false,
            deferred: Vec::new(),
        }
    }

    pub(crate) fn lookup(&self, index: GlyphIndex) -> Option<(GlyphSlot, &GlyphRecord)> {
        let slot = *self.glyphs.get(&index)?;
        let record = self.pages.get(&slot.page)?.records.get(slot.slot)?;
        Some((slot, record))
    }

    /// Take a free slot on the last page, if it has one
    pub(crate) fn allocate(&mut self, index: GlyphIndex) -> Option<GlyphSlot> {
        let (&page_id, page) = self.pages.iter_mut().next_back()?;
        if page.records.len() >= self.glyphs_per_page {
            return None;
        }
        page.records.push(GlyphRecord::new(index));
        Some(GlyphSlot {
            page: page_id,
            slot: page.records.len() - 1,
        })
    }

    /// Get storage for a new page without linking it in
    pub(crate) fn reserve_page(&mut self) -> Result<(PageId, GlyphPage)> {
        let mut records = Vec::new();
        records
            .try_reserve_exact(self.glyphs_per_page)
            .map_err(|_| FontMapError::OutOfMemory)?;

        let id = self.next_page;
        self.next_page += 1;
        Ok((id, GlyphPage { records }))
    }

    /// Append a reserved page; it becomes the one new slots come from
    pub(crate) fn link_page(&mut self, id: PageId, page: GlyphPage) {
        self.pages.insert(id, page);
    }

    /// Overwrite the record in `slot`, returning the previous one
    pub(crate) fn store(&mut self, slot: GlyphSlot, record: GlyphRecord) -> Option<GlyphRecord> {
        let stored = self
            .pages
            .get_mut(&slot.page)?
            .records
            .get_mut(slot.slot)?;
        Some(std::mem::replace(stored, record))
    }

    /// Make a stored record reachable by index
    pub(crate) fn publish(&mut self, index: GlyphIndex, slot: GlyphSlot) {
        self.glyphs.insert(index, slot);
    }

    /// Roll back a slot whose record was never published
    ///
    /// The last slot of the last page is returned to the page. If that
    /// empties the page, the page goes too and its id is handed back so the
    /// caller can drop it from the shared page cache. Any other slot just
    /// stays unused until its page is evicted.
    pub(crate) fn free_slot(&mut self, slot: GlyphSlot) -> Option<PageId> {
        let (&last_id, last) = self.pages.iter_mut().next_back()?;
        if last_id != slot.page || last.records.len() != slot.slot + 1 {
            return None;
        }

        last.records.pop();
        if last.records.is_empty() {
            self.pages.remove(&last_id);
            return Some(last_id);
        }
        None
    }

    /// Unlink one page and every record published from it
    pub(crate) fn pluck_page(&mut self, page_id: PageId) -> Vec<GlyphRecord> {
        let Some(page) = self.pages.remove(&page_id) else {
            return Vec::new();
        };

        for (slot, record) in page.records.iter().enumerate() {
            let here = GlyphSlot {
                page: page_id,
                slot,
            };
            if self.glyphs.get(&record.index()) == Some(&here) {
                self.glyphs.remove(&record.index());
            }
        }
        page.records
    }

    /// Unlink every page; deferred recordings stay until thaw
    pub(crate) fn drain(&mut self) -> Drained {
        self.glyphs.clear();
        let pages = std::mem::take(&mut self.pages);
        let mut drained = Drained {
            pages: pages.keys().copied().collect(),
            records: Vec::new(),
        };
        for (_, page) in pages {
            drained.records.extend(page.records);
        }
        drained
    }

    pub(crate) fn defer(&mut self, recording: GlyphRecording) {
        self.deferred.push(recording);
    }

    pub(crate) fn take_deferred(&mut self) -> Vec<GlyphRecording> {
        std::mem::take(&mut self.deferred)
    }

    pub(crate) fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub(crate) fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_page(per_page: usize) -> GlyphCache {
        let mut cache = GlyphCache::new(per_page);
        let (id, page) = cache.reserve_page().unwrap();
        cache.link_page(id, page);
        cache
    }

    fn insert(cache: &mut GlyphCache, index: GlyphIndex) -> GlyphSlot {
        let slot = match cache.allocate(index) {
            Some(slot) => slot,
            None => {
                let (id, page) = cache.reserve_page().unwrap();
                cache.link_page(id, page);
                cache.allocate(index).unwrap()
            }
        };
        cache.publish(index, slot);
        slot
    }

    #[test]
    fn pages_fill_in_order() {
        let mut cache = GlyphCache::new(2);
        assert!(cache.allocate(1).is_none());

        let slots: Vec<_> = (0..5).map(|i| insert(&mut cache, i)).collect();
        assert_eq!(cache.page_count(), 3);
        assert_eq!(slots[0], GlyphSlot { page: 0, slot: 0 });
        assert_eq!(slots[3], GlyphSlot { page: 1, slot: 1 });
        assert_eq!(slots[4], GlyphSlot { page: 2, slot: 0 });
        assert_eq!(cache.lookup(3).map(|(s, r)| (s, r.index())), Some((slots[3], 3)));
    }

    #[test]
    fn freeing_the_only_glyph_drops_its_page() {
        let mut cache = cache_with_page(4);
        let slot = cache.allocate(9).unwrap();
        assert_eq!(cache.free_slot(slot), Some(0));
        assert_eq!(cache.page_count(), 0);
    }

    #[test]
    fn freeing_an_earlier_slot_leaves_it_unused() {
        let mut cache = cache_with_page(4);
        let first = cache.allocate(1).unwrap();
        let second = insert(&mut cache, 2);

        assert_eq!(cache.free_slot(first), None);
        assert_eq!(cache.page_count(), 1);
        assert!(cache.lookup(1).is_none());
        assert_eq!(cache.lookup(2).map(|(s, _)| s), Some(second));
    }

    #[test]
    fn plucking_a_page_forgets_its_glyphs() {
        let mut cache = GlyphCache::new(2);
        for i in 0..4 {
            insert(&mut cache, i);
        }

        let plucked = cache.pluck_page(0);
        assert_eq!(plucked.len(), 2);
        assert!(cache.lookup(0).is_none());
        assert!(cache.lookup(1).is_none());
        assert!(cache.lookup(2).is_some());
        assert_eq!(cache.glyph_count(), 2);

        // New glyphs keep going on the newest page, never the plucked one
        let slot = insert(&mut cache, 7);
        assert_eq!(slot.page, 2);
    }

    #[test]
    fn drain_returns_everything() {
        let mut cache = GlyphCache::new(3);
        for i in 0..7 {
            insert(&mut cache, i);
        }
        cache.defer(GlyphRecording::new(()));

        let drained = cache.drain();
        assert_eq!(drained.pages, vec![0, 1, 2]);
        assert_eq!(drained.records.len(), 7);
        assert_eq!(cache.take_deferred().len(), 1);
        assert_eq!(cache.glyph_count(), 0);
        assert_eq!(cache.page_count(), 0);
    }
}
