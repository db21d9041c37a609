mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use common::{key_at, map_with, MockBackend};
use typf_fontmap::{FontMap, FontMapConfig, GlyphIndex, GlyphInfo, ScaledFont};

/// Four pages of one glyph each
fn small_map() -> FontMap {
    map_with(
        FontMapConfig::default()
            .with_page_capacity(4)
            .with_glyphs_per_page(1),
    )
}

fn fill(font: &ScaledFont, glyphs: impl IntoIterator<Item = GlyphIndex>) {
    let frozen = font.freeze().unwrap();
    for index in glyphs {
        frozen.lookup_glyph(index, GlyphInfo::METRICS, None).unwrap();
    }
}

#[test]
fn idle_pages_are_evicted_oldest_first() {
    let map = small_map();
    let backend = MockBackend::new();
    let face = backend.face("Mock Sans");
    let a = map.lookup_or_create(&key_at(&face, 12.0));
    let b = map.lookup_or_create(&key_at(&face, 24.0));

    fill(&a, 1..=3);
    assert_eq!(map.page_cache().len(), 3);

    // Five pages would not fit; the two oldest of A make room at thaw
    fill(&b, 1..=3);
    assert_eq!(map.page_cache().len(), 4);
    assert_eq!(a.cached_pages(), 1);
    assert_eq!(b.cached_pages(), 3);
    assert_eq!(map.page_cache().stats().evictions, 2);

    let populated = backend.counters.populates();
    fill(&a, [3]);
    assert_eq!(backend.counters.populates(), populated);
    fill(&a, [1]);
    assert_eq!(backend.counters.populates(), populated + 1);
}

#[test]
fn lookups_refresh_page_recency() {
    let map = small_map();
    let backend = MockBackend::new();
    let face = backend.face("Mock Sans");
    let a = map.lookup_or_create(&key_at(&face, 12.0));
    let b = map.lookup_or_create(&key_at(&face, 24.0));

    fill(&a, 1..=3);
    fill(&a, [1]);
    fill(&b, 1..=3);

    assert_eq!(a.cached_glyphs(), 1);
    let populated = backend.counters.populates();
    fill(&a, [1]);
    assert_eq!(backend.counters.populates(), populated);
}

#[test]
fn pages_being_added_are_never_evicted_mid_burst() {
    let map = small_map();
    let backend = MockBackend::new();
    let a = map.lookup_or_create(&key_at(&backend.face("Mock Sans"), 12.0));

    // More glyphs than the whole cache holds, under one freeze
    let frozen = a.freeze().unwrap();
    let records: Vec<_> = (1..=10)
        .map(|index| frozen.lookup_glyph(index, GlyphInfo::METRICS, None).unwrap())
        .collect();
    assert_eq!(map.page_cache().len(), 10);
    assert!(map.page_cache().stats().frozen);
    assert_eq!(a.cached_glyphs(), 10);
    drop(frozen);

    // Records handed out stay valid after thaw, cached or not
    assert!(records.iter().all(|r| r.metrics().x_advance == 12.0));
    assert!(!map.page_cache().stats().frozen);
}

#[test]
fn frozen_font_is_immune_to_eviction() {
    let map = small_map();
    let backend = MockBackend::new();
    let face = backend.face("Mock Sans");
    let a = map.lookup_or_create(&key_at(&face, 12.0));
    let b = map.lookup_or_create(&key_at(&face, 24.0));
    let c = map.lookup_or_create(&key_at(&face, 36.0));

    fill(&a, 1..=3);

    let hold = a.freeze().unwrap();
    fill(&b, 1..=3);
    // Nothing could go: A is frozen and B was still frozen during its thaw
    assert_eq!(a.cached_pages(), 3);
    assert_eq!(map.page_cache().len(), 6);
    assert!(map.page_cache().stats().overflows > 0);
    drop(hold);

    // Once thawed, A's pages are the oldest candidates again
    fill(&c, [1]);
    assert_eq!(map.page_cache().len(), 4);
    assert_eq!(a.cached_pages(), 0);
    assert_eq!(b.cached_pages(), 3);
}

#[test]
fn font_frozen_on_another_thread_is_immune() {
    let map = small_map();
    let backend = MockBackend::new();
    let face = backend.face("Mock Sans");
    let a = map.lookup_or_create(&key_at(&face, 12.0));
    let b = map.lookup_or_create(&key_at(&face, 24.0));

    fill(&a, 1..=3);

    let (frozen_tx, frozen_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let holder = {
        let a = a.clone();
        thread::spawn(move || {
            let guard = a.freeze().unwrap();
            frozen_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            drop(guard);
        })
    };
    frozen_rx.recv().unwrap();

    fill(&b, 1..=3);
    assert_eq!(map.page_cache().pages_for_font(a.id()), 3);

    release_tx.send(()).unwrap();
    holder.join().unwrap();

    fill(&b, [4]);
    assert_eq!(map.page_cache().len(), 4);
    assert!(map.page_cache().pages_for_font(a.id()) < 3);
}

#[test]
fn concurrent_fonts_stay_within_capacity_once_idle() {
    let map = map_with(
        FontMapConfig::default()
            .with_page_capacity(16)
            .with_glyphs_per_page(2),
    );
    let backend = MockBackend::new();
    let face = backend.face("Mock Sans");

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let map = map.clone();
            let key = key_at(&face, 10.0 + i as f64);
            thread::spawn(move || {
                let font = map.lookup_or_create(&key);
                for round in 0..10 {
                    fill(&font, (0..8).map(|g| g + round * 8));
                }
                font
            })
        })
        .collect();
    let fonts: Vec<ScaledFont> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    // A thaw with every other font idle settles the overflow
    let settler = map.lookup_or_create(&key_at(&face, 99.0));
    fill(&settler, [1]);
    assert!(map.page_cache().len() <= 16);

    let total: usize = fonts
        .iter()
        .chain([&settler])
        .map(|f| map.page_cache().pages_for_font(f.id()))
        .sum();
    assert_eq!(total, map.page_cache().len());
    assert!(fonts.iter().all(|f| f.status().is_ok()));
}

#[test]
fn destroyed_fonts_leave_no_pages_behind() {
    let map = small_map();
    let backend = MockBackend::new();
    let face = backend.face("Mock Sans");

    let a = map.lookup_or_create(&key_at(&face, 12.0));
    fill(&a, 1..=2);
    let a_id = a.id();
    drop(a);

    map.shutdown();
    assert_eq!(backend.counters.drops(), 1);
    assert_eq!(map.page_cache().pages_for_font(a_id), 0);
    assert!(map.page_cache().is_empty());
    assert!(!map.page_cache().is_initialized());
}

#[test]
fn evicted_font_outlived_by_its_records() {
    let map = small_map();
    let backend = MockBackend::new();
    let face = backend.face("Mock Sans");
    let a = map.lookup_or_create(&key_at(&face, 12.0));
    let b = map.lookup_or_create(&key_at(&face, 24.0));

    let frozen = a.freeze().unwrap();
    let kept = frozen.lookup_glyph(1, GlyphInfo::PATH, None).unwrap();
    drop(frozen);

    fill(&b, 1..=4);
    assert_eq!(a.cached_glyphs(), 0);
    assert!(kept.path().is_some());
    assert_eq!(Arc::strong_count(kept.path().unwrap()), 1);
}
