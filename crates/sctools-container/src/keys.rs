//! AES key recovery.
//!
//! Keys are not shipped with the toolchain. They are found by sliding a
//! 32-byte window over the game executable until the window's SHA-1 matches
//! a known signature, then cached next to the other key files so the scan
//! only happens once.
//!
//! [`KeyStore`] is an explicit handle: callers build one from a
//! [`KeyStoreConfig`] and pass the keys it returns into
//! [`decode`](crate::decode) and [`encode`](crate::encode).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use sctools_core::KeyError;
use sha1::{Digest, Sha1};
use tracing::{debug, trace, warn};

use crate::crypto::{AesKey, KEY_LENGTH};

/// SHA-1 of the PC AES key shared by GTA IV and Max Payne 3.
pub const PC_KEY_SIGNATURE: [u8; 20] = [
    0xDE, 0xA3, 0x75, 0xEF, 0x1E, 0x6E, 0xF2, 0x22, 0x3A, 0x12, 0x21, 0xC2, 0xC5, 0x75, 0xC4, 0x7B,
    0xF1, 0x7E, 0xFA, 0x5E,
];

/// Which key to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTarget {
    Gta4Pc,
    Mp3Pc,
}

impl KeyTarget {
    pub fn signature(self) -> &'static [u8; 20] {
        match self {
            KeyTarget::Gta4Pc | KeyTarget::Mp3Pc => &PC_KEY_SIGNATURE,
        }
    }

    pub fn cache_file(self) -> &'static str {
        match self {
            KeyTarget::Gta4Pc => "keys_gta4.dat",
            KeyTarget::Mp3Pc => "keys_mp3.dat",
        }
    }
}

impl fmt::Display for KeyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyTarget::Gta4Pc => f.write_str("GTA4 PC"),
            KeyTarget::Mp3Pc => f.write_str("MP3 PC"),
        }
    }
}

/// Where keys come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyStoreConfig {
    /// Directory holding the `keys_*.dat` cache files. No caching when unset.
    pub cache_dir: Option<PathBuf>,
    pub gta4_executable: Option<PathBuf>,
    pub mp3_executable: Option<PathBuf>,
}

impl KeyStoreConfig {
    pub const CACHE_DIR_VAR: &'static str = "SCTOOLS_KEY_CACHE";
    pub const GTA4_EXE_VAR: &'static str = "SCTOOLS_GTA4_EXE";
    pub const MP3_EXE_VAR: &'static str = "SCTOOLS_MP3_EXE";

    /// Read the configuration from `SCTOOLS_KEY_CACHE`, `SCTOOLS_GTA4_EXE`
    /// and `SCTOOLS_MP3_EXE`. Unset or empty variables are left as `None`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<std::ffi::OsString>) -> Self {
        let path = |name: &str| lookup(name).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            cache_dir: path(Self::CACHE_DIR_VAR),
            gta4_executable: path(Self::GTA4_EXE_VAR),
            mp3_executable: path(Self::MP3_EXE_VAR),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_executable(mut self, target: KeyTarget, path: impl Into<PathBuf>) -> Self {
        let path = Some(path.into());
        match target {
            KeyTarget::Gta4Pc => self.gta4_executable = path,
            KeyTarget::Mp3Pc => self.mp3_executable = path,
        }
        self
    }

    pub fn executable(&self, target: KeyTarget) -> Option<&Path> {
        match target {
            KeyTarget::Gta4Pc => self.gta4_executable.as_deref(),
            KeyTarget::Mp3Pc => self.mp3_executable.as_deref(),
        }
    }

    pub fn cache_path(&self, target: KeyTarget) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(target.cache_file()))
    }
}

/// Lazily loaded AES keys.
///
/// Each key is loaded at most once; afterwards lookups only take the read
/// lock. A failed load is not remembered, so a later call retries.
#[derive(Debug, Default)]
pub struct KeyStore {
    config: KeyStoreConfig,
    keys: RwLock<FxHashMap<KeyTarget, AesKey>>,
}

impl KeyStore {
    pub fn new(config: KeyStoreConfig) -> Self {
        Self {
            config,
            keys: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(KeyStoreConfig::from_env())
    }

    pub fn config(&self) -> &KeyStoreConfig {
        &self.config
    }

    /// Use `key` for `target` without touching the filesystem.
    pub fn insert(&self, target: KeyTarget, key: AesKey) {
        self.keys.write().insert(target, key);
    }

    pub fn key(&self, target: KeyTarget) -> Result<AesKey, KeyError> {
        if let Some(key) = self.keys.read().get(&target) {
            return Ok(*key);
        }

        let mut keys = self.keys.write();
        if let Some(key) = keys.get(&target) {
            return Ok(*key);
        }
        let key = self.load(target)?;
        keys.insert(target, key);
        Ok(key)
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn load(&self, target: KeyTarget) -> Result<AesKey, KeyError> {
        let cache = self.config.cache_path(target);
        if let Some(key) = cache.as_deref().and_then(read_cache) {
            debug!(%target, "loaded key from cache");
            return Ok(key);
        }

        let exe = self
            .config
            .executable(target)
            .ok_or_else(|| KeyError::NoExecutable {
                target: target.to_string(),
            })?;
        let data = fs::read(exe).map_err(|e| KeyError::Io {
            path: exe.to_path_buf(),
            message: e.to_string(),
        })?;

        debug!(%target, path = %exe.display(), size = data.len(), "scanning executable for key");
        let key = search_key(&data, target.signature()).ok_or_else(|| KeyError::NotFound {
            target: target.to_string(),
            path: exe.to_path_buf(),
        })?;

        if let Some(cache) = cache {
            match fs::write(&cache, key) {
                Ok(()) => debug!(%target, path = %cache.display(), "cached key"),
                Err(e) => warn!(%target, path = %cache.display(), error = %e, "could not cache key"),
            }
        }
        Ok(key)
    }
}

/// First key in a cache file. Missing, unreadable or short files yield
/// `None`.
fn read_cache(path: &Path) -> Option<AesKey> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            trace!(path = %path.display(), error = %e, "no key cache");
            return None;
        }
    };
    match data.get(..KEY_LENGTH) {
        Some(key) => key.try_into().ok(),
        None => {
            warn!(path = %path.display(), len = data.len(), "ignoring short key cache");
            None
        }
    }
}

/// Find the first 32-byte window of `data` whose SHA-1 is `signature`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn search_key(data: &[u8], signature: &[u8; 20]) -> Option<AesKey> {
    data.windows(KEY_LENGTH)
        .find(|window| Sha1::digest(window).as_slice() == signature)
        .and_then(|window| window.try_into().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn planted(key: &AesKey) -> (Vec<u8>, [u8; 20]) {
        let mut data: Vec<u8> = (0..500u32).map(|i| (i * 7 % 251) as u8).collect();
        let tail = data.split_off(123);
        data.extend_from_slice(key);
        data.extend_from_slice(&tail);
        let signature: [u8; 20] = Sha1::digest(key).into();
        (data, signature)
    }

    #[test]
    fn search_finds_planted_key() {
        let key = [0xA5; 32];
        let (data, signature) = planted(&key);
        assert_eq!(search_key(&data, &signature), Some(key));
    }

    #[test]
    fn search_misses() {
        let (data, _) = planted(&[0xA5; 32]);
        assert_eq!(search_key(&data, &PC_KEY_SIGNATURE), None);
        assert_eq!(search_key(&data[..10], &PC_KEY_SIGNATURE), None);
    }

    #[test]
    fn key_at_end_of_data() {
        let key = [0x3C; 32];
        let signature: [u8; 20] = Sha1::digest(key).into();
        let mut data = vec![0u8; 64];
        data.extend_from_slice(&key);
        assert_eq!(search_key(&data, &signature), Some(key));
    }

    #[test]
    fn cache_is_read_before_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let key = [0x42; 32];
        let mut cached = key.to_vec();
        cached.extend_from_slice(&[0xFF; 32]);
        fs::write(dir.path().join("keys_mp3.dat"), cached).unwrap();

        let store = KeyStore::new(KeyStoreConfig::default().with_cache_dir(dir.path()));
        assert_eq!(store.key(KeyTarget::Mp3Pc).unwrap(), key);
        // The GTA IV cache is a different file.
        assert!(matches!(
            store.key(KeyTarget::Gta4Pc),
            Err(KeyError::NoExecutable { .. })
        ));
    }

    #[test]
    fn short_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keys_gta4.dat"), [1, 2, 3]).unwrap();

        let store = KeyStore::new(KeyStoreConfig::default().with_cache_dir(dir.path()));
        assert!(matches!(
            store.key(KeyTarget::Gta4Pc),
            Err(KeyError::NoExecutable { .. })
        ));
    }

    #[test]
    fn executable_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("game.exe");
        fs::write(&exe, vec![0u8; 256]).unwrap();

        let store = KeyStore::new(
            KeyStoreConfig::default()
                .with_cache_dir(dir.path())
                .with_executable(KeyTarget::Gta4Pc, &exe),
        );
        match store.key(KeyTarget::Gta4Pc) {
            Err(KeyError::NotFound { target, path }) => {
                assert_eq!(target, "GTA4 PC");
                assert_eq!(path, exe);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(!dir.path().join("keys_gta4.dat").exists());
    }

    #[test]
    fn unreadable_executable() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(
            KeyStoreConfig::default().with_executable(KeyTarget::Mp3Pc, dir.path().join("nope.exe")),
        );
        assert!(matches!(store.key(KeyTarget::Mp3Pc), Err(KeyError::Io { .. })));
    }

    #[test]
    fn inserted_keys_skip_loading() {
        let store = KeyStore::default();
        store.insert(KeyTarget::Gta4Pc, [9; 32]);
        assert_eq!(store.key(KeyTarget::Gta4Pc).unwrap(), [9; 32]);
    }

    #[test]
    fn loaded_key_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("keys_gta4.dat");
        fs::write(&cache, [7u8; 32]).unwrap();

        let store = KeyStore::new(KeyStoreConfig::default().with_cache_dir(dir.path()));
        assert_eq!(store.key(KeyTarget::Gta4Pc).unwrap(), [7; 32]);

        fs::remove_file(&cache).unwrap();
        assert_eq!(store.key(KeyTarget::Gta4Pc).unwrap(), [7; 32]);
    }

    #[test]
    fn config_from_lookup() {
        let config = KeyStoreConfig::from_lookup(|name| match name {
            KeyStoreConfig::CACHE_DIR_VAR => Some(OsString::from("/tmp/keys")),
            KeyStoreConfig::GTA4_EXE_VAR => Some(OsString::from("")),
            KeyStoreConfig::MP3_EXE_VAR => Some(OsString::from("MaxPayne3.exe")),
            _ => None,
        });
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/keys")));
        assert_eq!(config.gta4_executable, None);
        assert_eq!(
            config.executable(KeyTarget::Mp3Pc),
            Some(Path::new("MaxPayne3.exe"))
        );
        assert_eq!(
            config.cache_path(KeyTarget::Gta4Pc),
            Some(PathBuf::from("/tmp/keys/keys_gta4.dat"))
        );
    }

    #[test]
    fn store_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KeyStore>();
    }
}
