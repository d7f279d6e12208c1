use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::ImageSize;

/// A tiled image fill shared by every surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub id: String,
    /// Natural image size, known once the image has loaded.
    pub size: Option<ImageSize>,
}

/// Process-wide cache of pattern fills keyed by image URL. Each URL is loaded
/// once; entries are never evicted.
#[derive(Debug, Default)]
pub struct PatternCache {
    patterns: HashMap<String, Pattern>,
    next_id: usize,
}

static PATTERNS: LazyLock<Mutex<PatternCache>> = LazyLock::new(Default::default);

impl PatternCache {
    pub fn global() -> &'static Mutex<PatternCache> {
        &PATTERNS
    }

    /// Pattern for `url`, plus whether it was just created and needs loading.
    pub fn intern(&mut self, url: &str) -> (Pattern, bool) {
        if let Some(pattern) = self.patterns.get(url) {
            return (pattern.clone(), false);
        }
        let pattern = Pattern { id: format!("image{}", self.next_id), size: None };
        self.next_id += 1;
        debug!("new pattern {} for {url}", pattern.id);
        self.patterns.insert(url.to_string(), pattern.clone());
        (pattern, true)
    }

    pub fn resolve(&mut self, url: &str, size: ImageSize) {
        if let Some(pattern) = self.patterns.get_mut(url) {
            pattern.size = Some(size);
        }
    }

    pub fn get(&self, url: &str) -> Option<&Pattern> {
        self.patterns.get(url)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_once_per_url() {
        let mut cache = PatternCache::default();
        let (a, fresh_a) = cache.intern("hatch.png");
        let (b, fresh_b) = cache.intern("hatch.png");
        let (c, _) = cache.intern("dots.png");
        assert!(fresh_a && !fresh_b);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_resolve_sets_size() {
        let mut cache = PatternCache::default();
        cache.intern("hatch.png");
        cache.resolve("hatch.png", ImageSize::new(8.0, 8.0));
        assert_eq!(cache.get("hatch.png").unwrap().size, Some(ImageSize::new(8.0, 8.0)));
    }
}
