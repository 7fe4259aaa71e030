// src/hash.rs

//! Hashing for rewritten package names and output fingerprints
//!
//! Two algorithms are in use:
//! - **SHA-1**: names rewritten packages. The name format is fixed
//!   (`<name>.<first 8 hex chars of sha1(root)>`) so it must stay SHA-1.
//! - **XXH128**: fingerprints file contents and whole output trees so tree
//!   sync and the build graph can tell whether anything changed.
//!
//! | Use Case | Algorithm |
//! |----------|-----------|
//! | Rewritten package names | SHA-1 |
//! | Sync content comparison | XXH128 |
//! | Build node change detection | XXH128 |

use sha1::{Digest, Sha1};
use std::path::Path;
use xxhash_rust::xxh3::{Xxh3, xxh3_128};

/// Number of hex characters of the path hash kept in a rewritten name
pub const PATH_HASH_LEN: usize = 8;

/// Lowercase hex SHA-1 of a byte slice
pub fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Short SHA-1 of an absolute package root, used to build rewritten names
///
/// Hashes the path as given; callers pass canonical roots so the same
/// on-disk copy always gets the same name.
pub fn path_hash(root: &Path) -> String {
    let digest = sha1_hex(root.to_string_lossy().as_bytes());
    digest[..PATH_HASH_LEN].to_string()
}

/// XXH128 of file contents
#[inline]
pub fn xxh128(data: &[u8]) -> String {
    format!("{:032x}", xxh3_128(data))
}

/// Incremental fingerprint over an ordered sequence of entries
///
/// Used to fingerprint a whole output tree: feed each (path, content hash)
/// pair in a stable order and finish.
pub struct Fingerprint {
    state: Xxh3,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprint {
    pub fn new() -> Self {
        Self { state: Xxh3::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
        // Separator so ("ab","c") and ("a","bc") differ
        self.state.update(&[0]);
    }

    pub fn finish(&self) -> String {
        format!("{:032x}", self.state.digest128())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_known_value() {
        assert_eq!(
            sha1_hex(b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            sha1_hex(b""),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn test_xxh128_len() {
        assert_eq!(xxh128(b"Hello, World!").len(), 32);
    }

    #[test]
    fn test_path_hash_is_short_prefix_of_sha1() {
        let root = Path::new("/proj/node_modules/foo");
        let full = sha1_hex(b"/proj/node_modules/foo");
        let short = path_hash(root);
        assert_eq!(short.len(), PATH_HASH_LEN);
        assert!(full.starts_with(&short));
    }

    #[test]
    fn test_path_hash_differs_per_root() {
        let a = path_hash(Path::new("/proj/node_modules/foo"));
        let b = path_hash(Path::new("/proj/node_modules/.staging/foo"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_separates_entries() {
        let mut one = Fingerprint::new();
        one.update(b"ab");
        one.update(b"c");
        let mut two = Fingerprint::new();
        two.update(b"a");
        two.update(b"bc");
        assert_ne!(one.finish(), two.finish());
    }
}
