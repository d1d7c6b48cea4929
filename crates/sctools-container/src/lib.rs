//! Container codec for compiled scripts.
//!
//! A compiled script ships inside a small binary container whose header
//! magic selects the format: plain, AES encrypted, or zlib compressed and
//! encrypted, with per-game variations.
//!
//! # Example
//!
//! ```
//! use sctools_container::{Container, Magic, Target, decode, encode};
//!
//! let mut container = Container::new(Magic::Gta4Encrypted);
//! container.code = vec![0x2D, 0x00, 0x00, 0x02, 0x00];
//!
//! let key = [0x24; 32];
//! let bytes = encode(&container, Some(&key)).unwrap();
//! let decoded = decode(&bytes, Target::Gta4, Some(&key)).unwrap();
//! assert_eq!(decoded, container);
//! ```

mod compression;
mod container;
pub mod crypto;
pub mod keys;

pub use container::{Container, DEFAULT_VERSION_EXTRA, Magic, Target, decode, encode};
pub use crypto::AesKey;
pub use keys::{KeyStore, KeyStoreConfig, KeyTarget};
