//! Deterministic identity hashing for symbols and types.
//!
//! Every symbol, type and native command is keyed by a 32-bit identity derived
//! from its name with Bob Jenkins' one-at-a-time hash. Names are lowercased
//! before hashing, so `VECTOR`, `Vector` and `vector` share one identity.
//!
//! # Example
//!
//! ```
//! use sctools_core::SymbolId;
//!
//! let a = SymbolId::from_name("PLAYER_INDEX");
//! let b = SymbolId::from_name("player_index");
//! assert_eq!(a, b);
//! ```

use std::fmt;

/// A 32-bit identity hash.
///
/// Used as the unique key of symbols in the symbol tables, of types in the
/// type registry, and as the command hash of native calls.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct SymbolId(pub u32);

impl SymbolId {
    /// Empty/invalid identity (no name hashes to it in practice).
    pub const EMPTY: SymbolId = SymbolId(0);

    /// Identity of a case-insensitive name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        let mut hasher = JenkinsHasher::new();
        for b in name.bytes() {
            hasher.write_u8(b.to_ascii_lowercase());
        }
        SymbolId(hasher.finish())
    }

    /// Identity of raw bytes, without case folding.
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = JenkinsHasher::new();
        for &b in bytes {
            hasher.write_u8(b);
        }
        SymbolId(hasher.finish())
    }

    /// Get the underlying u32 value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Check if this is the empty identity.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({:#010x})", self.0)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for SymbolId {
    fn from(value: u32) -> Self {
        SymbolId(value)
    }
}

/// Incremental one-at-a-time hasher.
#[derive(Debug, Clone, Copy, Default)]
struct JenkinsHasher {
    state: u32,
}

impl JenkinsHasher {
    #[inline]
    fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn write_u8(&mut self, b: u8) {
        let mut h = self.state;
        h = h.wrapping_add(b as u32);
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
        self.state = h;
    }

    #[inline]
    fn finish(self) -> u32 {
        let mut h = self.state;
        h = h.wrapping_add(h << 3);
        h ^= h >> 11;
        h = h.wrapping_add(h << 15);
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(SymbolId::from_name("a"), SymbolId(0xCA2E9442));
    }

    #[test]
    fn empty_name_hashes_to_zero() {
        assert_eq!(SymbolId::from_name(""), SymbolId::EMPTY);
        assert!(SymbolId::from_name("").is_empty());
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(SymbolId::from_name("main"), SymbolId::from_name("MAIN"));
        assert_eq!(SymbolId::from_name("Text_Label_15"), SymbolId::from_name("TEXT_LABEL_15"));
    }

    #[test]
    fn raw_bytes_are_case_sensitive() {
        assert_ne!(SymbolId::from_bytes(b"main"), SymbolId::from_bytes(b"MAIN"));
        assert_eq!(SymbolId::from_bytes(b"main"), SymbolId::from_name("MAIN"));
    }

    #[test]
    fn distinct_names_distinct_ids() {
        let ids = ["INT", "FLOAT", "BOOL", "STRING", "VECTOR", "ANY"].map(SymbolId::from_name);
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(format!("{}", SymbolId(0xCA2E9442)), "0xCA2E9442");
        assert_eq!(format!("{:?}", SymbolId(0x1)), "SymbolId(0x00000001)");
    }
}
