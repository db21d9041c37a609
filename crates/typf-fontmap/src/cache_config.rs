//! Font map configuration
//!
//! Three numbers bound the memory the font map holds on to:
//!
//! - how many unreferenced fonts stay alive for reuse (holdovers)
//! - how many glyph pages the shared page cache keeps across all fonts
//! - how many glyphs fit in one page
//!
//! Defaults suit a typical text-heavy process. Each can be overridden at
//! startup through the environment:
//!
//! ```bash
//! TYPF_FONTMAP_MAX_HOLDOVERS=64 TYPF_FONTMAP_PAGE_CAPACITY=2048 ./my_app
//! ```
//!
//! # Example
//!
//! ```
//! use typf_fontmap::{FontMap, FontMapConfig};
//!
//! let config = FontMapConfig::default().with_page_capacity(1024);
//! let map = FontMap::with_config(config)?;
//! assert_eq!(map.config().page_capacity, 1024);
//! # Ok::<(), typf_fontmap::FontMapError>(())
//! ```

use crate::error::{FontMapError, Result};

/// Default number of zero-reference fonts kept for reuse
pub const DEFAULT_MAX_HOLDOVERS: usize = 256;

/// Default capacity of the shared glyph page cache, in pages
pub const DEFAULT_PAGE_CAPACITY: usize = 512;

/// Default number of glyph records per page
pub const DEFAULT_GLYPHS_PER_PAGE: usize = 32;

const ENV_MAX_HOLDOVERS: &str = "TYPF_FONTMAP_MAX_HOLDOVERS";
const ENV_PAGE_CAPACITY: &str = "TYPF_FONTMAP_PAGE_CAPACITY";
const ENV_GLYPHS_PER_PAGE: &str = "TYPF_FONTMAP_GLYPHS_PER_PAGE";

/// Capacities for a [`FontMap`](crate::FontMap)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMapConfig {
    pub max_holdovers: usize,
    pub page_capacity: usize,
    pub glyphs_per_page: usize,
}

impl Default for FontMapConfig {
    fn default() -> Self {
        Self {
            max_holdovers: DEFAULT_MAX_HOLDOVERS,
            page_capacity: DEFAULT_PAGE_CAPACITY,
            glyphs_per_page: DEFAULT_GLYPHS_PER_PAGE,
        }
    }
}

impl FontMapConfig {
    /// Defaults, with any valid `TYPF_FONTMAP_*` overrides applied
    pub fn from_env() -> Self {
        Self::default().apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for (name, slot) in [
            (ENV_MAX_HOLDOVERS, &mut self.max_holdovers),
            (ENV_PAGE_CAPACITY, &mut self.page_capacity),
            (ENV_GLYPHS_PER_PAGE, &mut self.glyphs_per_page),
        ] {
            let Some(raw) = lookup(name) else {
                continue;
            };
            match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => {
                    log::info!("Typf font map: {name}={value} from environment");
                    *slot = value;
                }
                _ => log::warn!("Typf font map: ignoring {name}={raw:?}, expected a positive integer"),
            }
        }
        self
    }

    pub fn with_max_holdovers(mut self, max_holdovers: usize) -> Self {
        self.max_holdovers = max_holdovers;
        self
    }

    pub fn with_page_capacity(mut self, page_capacity: usize) -> Self {
        self.page_capacity = page_capacity;
        self
    }

    pub fn with_glyphs_per_page(mut self, glyphs_per_page: usize) -> Self {
        self.glyphs_per_page = glyphs_per_page;
        self
    }

    /// Every capacity must be at least one
    pub fn validate(&self) -> Result<()> {
        if self.max_holdovers == 0 {
            return Err(FontMapError::Config("max_holdovers must be at least 1".into()));
        }
        if self.page_capacity == 0 {
            return Err(FontMapError::Config("page_capacity must be at least 1".into()));
        }
        if self.glyphs_per_page == 0 {
            return Err(FontMapError::Config("glyphs_per_page must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> FontMapConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FontMapConfig::default().apply_overrides(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults_match_reference_sizes() {
        let config = FontMapConfig::default();
        assert_eq!(config.max_holdovers, 256);
        assert_eq!(config.page_capacity, 512);
        assert_eq!(config.glyphs_per_page, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let config = overrides(&[
            (ENV_MAX_HOLDOVERS, "8"),
            (ENV_PAGE_CAPACITY, " 64 "),
        ]);
        assert_eq!(config.max_holdovers, 8);
        assert_eq!(config.page_capacity, 64);
        assert_eq!(config.glyphs_per_page, DEFAULT_GLYPHS_PER_PAGE);
    }

    #[test]
    fn bad_env_values_are_ignored() {
        let config = overrides(&[(ENV_GLYPHS_PER_PAGE, "0"), (ENV_PAGE_CAPACITY, "lots")]);
        assert_eq!(config, FontMapConfig::default());
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let config = FontMapConfig::default().with_max_holdovers(0);
        assert!(matches!(config.validate(), Err(FontMapError::Config(_))));
    }
}
