//! Faster (but not DoS-resistant) hashmaps
use farmhash;
use hash_hasher::HashBuildHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher, BuildHasherDefault};

/// Streaming adapter over farmhash
///
/// Farmhash isn't a streaming hash, so each write is hashed on its own and seeded with
/// everything written before it. `str` writes its bytes and then a terminator byte, which
/// would otherwise overwrite the interesting part.
pub struct FarmHashLie (u64);

impl Default for FarmHashLie {
    #[inline]
    fn default() -> FarmHashLie { FarmHashLie(0) }
}

impl Hasher for FarmHashLie {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.0 = farmhash::hash64_with_seed(bytes, self.0);
    }
}

pub type Farm = BuildHasherDefault<FarmHashLie>;
/// String keyed maps: words, contexts, token forms
pub type FarmMap<X, Y> = HashMap<X, Y, Farm>;

pub fn new_farm<X: Hash+Eq, Y>() -> FarmMap<X, Y> {
    Default::default()
}

/// Maps keyed by small integers (token ids), which need no hashing at all
pub type PlainMap<X, Y> = HashMap<X, Y, HashBuildHasher>;

pub fn new_plain<X: Hash+Eq, Y>() -> PlainMap<X, Y> {
    Default::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::BuildHasher;

    fn hash_of(s: &str) -> u64 {
        let mut h = Farm::default().build_hasher();
        s.hash(&mut h);
        h.finish()
    }

    #[test]
    fn strings_do_not_all_collide() {
        assert_ne!(hash_of("casa"), hash_of("chuva"));
        assert_eq!(hash_of("casa"), hash_of("casa"));
    }

    #[test]
    fn plain_map_keys_by_id() {
        let mut m = new_plain::<u32, &str>();
        m.insert(1, "ele");
        m.insert(2, "correu");
        assert_eq!(m.get(&2), Some(&"correu"));
        assert_eq!(m.len(), 2);
    }
}
