//! Per-window HDR metadata
//!
//! The presentation path reads metadata from its own thread while requests
//! write it, so values are replaced whole under a lock and never patched in
//! place.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use xhdr_proto::HdrMetadata;

/// Window ID → current metadata
#[derive(Debug, Default)]
pub struct MetadataStore {
    windows: RwLock<HashMap<u32, HdrMetadata>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store metadata for a window, returning the value it replaced
    pub fn set(&self, window: u32, metadata: HdrMetadata) -> Option<HdrMetadata> {
        self.windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(window, metadata)
    }

    pub fn get(&self, window: u32) -> Option<HdrMetadata> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&window)
            .copied()
    }

    /// Forget a window (destroyed or no longer HDR)
    pub fn remove(&self, window: u32) -> Option<HdrMetadata> {
        self.windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&window)
    }

    pub fn len(&self) -> usize {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use xhdr_proto::Eotf;

    #[test]
    fn test_set_overwrites() {
        let store = MetadataStore::new();
        let a = HdrMetadata::new(1, Eotf::Sdr, 100, 1, 100);
        let b = HdrMetadata::new(2, Eotf::Pq, 1000, 5, 1000);

        assert_eq!(store.set(7, a), None);
        assert_eq!(store.set(7, b), Some(a));
        assert_eq!(store.get(7), Some(b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove() {
        let store = MetadataStore::new();
        let a = HdrMetadata::new(1, Eotf::Pq, 100, 1, 100);
        store.set(7, a);

        assert_eq!(store.remove(7), Some(a));
        assert_eq!(store.get(7), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_readers_never_see_mixed_values() {
        let store = Arc::new(MetadataStore::new());
        let a = HdrMetadata::new(0xaaaa, Eotf::Sdr, 100, 1, 100);
        let b = HdrMetadata::new(0xbbbb, Eotf::Pq, 1000, 5, 1000);
        store.set(1, a);

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    store.set(1, if i % 2 == 0 { b } else { a });
                }
            })
        };

        for _ in 0..1000 {
            let seen = store.get(1).unwrap();
            assert!(seen == a || seen == b, "torn read: {:?}", seen);
        }
        writer.join().unwrap();
    }
}
