use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::Mutex;

use crate::framebuffer_desc::FramebufferDesc;
use crate::reclaim::ResourceReclaimer;
use crate::Backend;

/// Shared between every framebuffer of a context share group.
pub type SharedFramebufferCache<A> = Arc<Mutex<FramebufferCache<A>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Owns native framebuffers keyed by [`FramebufferDesc`].
///
/// Entries live until [`clear`](Self::clear) or [`destroy`](Self::destroy).
/// Dropping a cache that still owns framebuffers is a bug and panics.
#[derive(Debug)]
pub struct FramebufferCache<A: Backend> {
    payload: FxHashMap<FramebufferDesc, A::Framebuffer>,
    stats: CacheStats,
}

impl<A: Backend> Default for FramebufferCache<A> {
    fn default() -> Self {
        Self {
            payload: FxHashMap::default(),
            stats: CacheStats::default(),
        }
    }
}

impl<A: Backend> FramebufferCache<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedFramebufferCache<A> {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn get(&mut self, desc: &FramebufferDesc) -> Option<A::Framebuffer> {
        let framebuffer = self.payload.get(desc).copied();
        if let Some(framebuffer) = framebuffer {
            log::trace!("framebuffer cache hit: {:?}", framebuffer);
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        framebuffer
    }

    /// Inserting a key that is already present is a bug: the caller must
    /// always look up first.
    pub fn insert(&mut self, desc: FramebufferDesc, framebuffer: A::Framebuffer) {
        let previous = self.payload.insert(desc, framebuffer);
        assert!(
            previous.is_none(),
            "framebuffer inserted twice for the same descriptor"
        );
    }

    pub fn contains(&self, desc: &FramebufferDesc) -> bool {
        self.payload.contains_key(desc)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Hands every entry to `reclaimer`. Framebuffers may still be in use by
    /// in-flight work so they are never destroyed here directly.
    pub fn clear(&mut self, reclaimer: &mut dyn ResourceReclaimer<A>) {
        profiling::scope!("FramebufferCache::clear");
        if !self.payload.is_empty() {
            log::debug!("releasing {} cached framebuffers", self.payload.len());
        }
        for (_, framebuffer) in self.payload.drain() {
            reclaimer.defer_destroy_framebuffer(framebuffer);
        }
    }

    pub fn destroy(mut self, reclaimer: &mut dyn ResourceReclaimer<A>) {
        self.clear(reclaimer);
    }
}

impl<A: Backend> Drop for FramebufferCache<A> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        assert!(
            self.payload.is_empty(),
            "framebuffer cache dropped with {} live framebuffers, destroy() must be called first",
            self.payload.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::{AttachmentSlot, RenderTargets};
    use crate::clear::LoadOpClearMask;
    use crate::mock::{MockApi, MockFramebuffer, ViewFactory};
    use crate::reclaim::GarbageQueue;
    use crate::render_pass::{RenderPassDesc, RenderPassOptions};
    use rhi_types::RHIFormat;

    fn desc(factory: &ViewFactory) -> FramebufferDesc {
        let mut targets = RenderTargets::<MockApi>::new();
        targets.update_attachment(
            AttachmentSlot::Color(0),
            Some(factory.color(RHIFormat::R8G8B8A8_UNORM, 16, 16)),
        );
        let render_pass = RenderPassDesc::build(
            &targets,
            &LoadOpClearMask::default(),
            &RenderPassOptions::default(),
        );
        FramebufferDesc::new(&targets, render_pass, None)
    }

    #[test]
    fn insert_then_get_returns_same_object() {
        let factory = ViewFactory::new();
        let key = desc(&factory);
        let mut cache = FramebufferCache::<MockApi>::new();
        let mut garbage = GarbageQueue::<MockApi>::new();

        assert_eq!(cache.get(&key), None);
        cache.insert(key.clone(), MockFramebuffer(1));
        assert_eq!(cache.get(&key), Some(MockFramebuffer(1)));
        assert_eq!(cache.get(&desc(&factory)), None);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 2
            }
        );

        cache.destroy(&mut garbage);
        assert_eq!(garbage.len(), 1);
        garbage.destroy_all(&crate::mock::MockDevice::new());
    }

    #[test]
    fn clear_hands_entries_to_reclaimer() {
        let factory = ViewFactory::new();
        let mut cache = FramebufferCache::<MockApi>::new();
        let mut garbage = GarbageQueue::<MockApi>::new();
        cache.insert(desc(&factory), MockFramebuffer(1));
        cache.insert(desc(&factory), MockFramebuffer(2));

        cache.clear(&mut garbage);
        assert!(cache.is_empty());
        assert_eq!(garbage.len(), 2);
        garbage.destroy_all(&crate::mock::MockDevice::new());
    }

    #[test]
    #[should_panic(expected = "framebuffer inserted twice")]
    fn duplicate_insert_is_a_bug() {
        let factory = ViewFactory::new();
        let key = desc(&factory);
        let mut cache = FramebufferCache::<MockApi>::new();
        cache.insert(key.clone(), MockFramebuffer(1));
        cache.insert(key, MockFramebuffer(2));
    }

    #[test]
    #[should_panic(expected = "destroy() must be called first")]
    fn dropping_non_empty_cache_panics() {
        let factory = ViewFactory::new();
        let mut cache = FramebufferCache::<MockApi>::new();
        cache.insert(desc(&factory), MockFramebuffer(1));
        drop(cache);
    }
}
