use core::hash::Hash;
use std::hash::Hasher;

use crate::platform::Key;

#[cfg(feature = "std-hash")]
pub mod default {
    pub use std::collections::hash_map::DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::new()
    }
}

#[cfg(not(feature = "std-hash"))]
pub mod default {
    pub use ahash::AHasher as DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::default()
    }
}

/// Hashes commit-hook dependencies into a single [`Key`].
///
/// Hosts compare keys between renders to decide whether a commit callback
/// re-runs, so equal inputs must always produce equal keys within a process.
#[inline]
pub fn hash_key<K: Hash + ?Sized>(keys: &K) -> Key {
    let mut h = default::new();
    keys.hash(&mut h);
    h.finish()
}
