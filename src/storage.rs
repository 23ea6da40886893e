//! Byte storage: source reads, remote fetches, cache writes.
//!
//! The [`Storage`] trait is the only place the engine touches the outside
//! world for image bytes. The production implementation is [`FsStorage`]:
//! sources under a configured root, rendered output in a flat cache
//! directory, remote sources over HTTP.
//!
//! Missing sources are `Ok(None)`, not errors; the render path treats them
//! as fallback-eligible, while real IO failures propagate.

use reqwest::blocking::Client;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("enlarger/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("fetch failed: {0}")]
    Fetch(String),
}

/// Trait for source and cache byte IO.
///
/// `Sync` so one storage instance can serve rayon's batch renders.
pub trait Storage: Send + Sync {
    /// Read a local source. Relative paths resolve against the source root.
    /// Returns `Ok(None)` when the file does not exist.
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError>;

    /// Fetch a remote source over HTTP.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a rendered file into the cache directory.
    fn write(&self, file_name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Whether a cache file exists.
    fn exists(&self, file_name: &str) -> bool;

    /// Age of a cache file since last write, if it exists.
    fn age(&self, file_name: &str) -> Option<Duration>;

    /// Public URL of a cache file.
    fn url_for(&self, file_name: &str) -> String;

    /// Read a cache file back (base64 payloads, passthrough checks).
    fn read_cache(&self, file_name: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Filesystem storage rooted at a source directory and a cache directory.
pub struct FsStorage {
    source_root: PathBuf,
    cache_dir: PathBuf,
    url_prefix: String,
    http: OnceLock<Client>,
}

impl FsStorage {
    pub fn new(
        source_root: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            cache_dir: cache_dir.into(),
            url_prefix: url_prefix.into(),
            http: OnceLock::new(),
        }
    }

    pub fn cache_path(&self, file_name: &str) -> PathBuf {
        self.cache_dir.join(file_name)
    }

    fn resolve_source(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.source_root.join(path)
        }
    }

    /// The shared HTTP client, built on first use so every fetch in a batch
    /// reuses one connection pool.
    fn client(&self) -> Result<&Client, StorageError> {
        if let Some(client) = self.http.get() {
            return Ok(client);
        }
        let built = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StorageError::Fetch(e.to_string()))?;
        Ok(self.http.get_or_init(|| built))
    }
}

impl Storage for FsStorage {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
        match std::fs::read(self.resolve_source(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .client()?
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| StorageError::Fetch(e.to_string()))?;
        let bytes = response
            .bytes()
            .map_err(|e| StorageError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn write(&self, file_name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::write(self.cache_path(file_name), bytes)?;
        Ok(())
    }

    fn exists(&self, file_name: &str) -> bool {
        self.cache_path(file_name).exists()
    }

    fn age(&self, file_name: &str) -> Option<Duration> {
        let meta = std::fs::metadata(self.cache_path(file_name)).ok()?;
        meta.modified().ok()?.elapsed().ok()
    }

    fn url_for(&self, file_name: &str) -> String {
        let prefix = self.url_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        }
    }

    fn read_cache(&self, file_name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match std::fs::read(self.cache_path(file_name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory storage for engine tests: sources and remotes are served
    /// from maps, cache writes land in a map. No disk, no network.
    #[derive(Default)]
    pub struct MemStorage {
        pub sources: Mutex<HashMap<PathBuf, Vec<u8>>>,
        pub remotes: Mutex<HashMap<String, Vec<u8>>>,
        pub cache: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_source(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
            let s = Self::default();
            s.sources.lock().unwrap().insert(path.into(), bytes);
            s
        }

        pub fn add_remote(&self, url: impl Into<String>, bytes: Vec<u8>) {
            self.remotes.lock().unwrap().insert(url.into(), bytes);
        }

        pub fn cached_names(&self) -> Vec<String> {
            let mut names: Vec<String> = self.cache.lock().unwrap().keys().cloned().collect();
            names.sort();
            names
        }
    }

    impl Storage for MemStorage {
        fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(self.sources.lock().unwrap().get(path).cloned())
        }

        fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError> {
            self.remotes
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| StorageError::Fetch(format!("no mock remote for {url}")))
        }

        fn write(&self, file_name: &str, bytes: &[u8]) -> Result<(), StorageError> {
            self.cache
                .lock()
                .unwrap()
                .insert(file_name.to_string(), bytes.to_vec());
            Ok(())
        }

        fn exists(&self, file_name: &str) -> bool {
            self.cache.lock().unwrap().contains_key(file_name)
        }

        fn age(&self, _file_name: &str) -> Option<Duration> {
            None
        }

        fn url_for(&self, file_name: &str) -> String {
            format!("/cache/{file_name}")
        }

        fn read_cache(&self, file_name: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(self.cache.lock().unwrap().get(file_name).cloned())
        }
    }

    // =========================================================================
    // FsStorage
    // =========================================================================

    #[test]
    fn read_resolves_relative_paths_against_source_root() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("photos")).unwrap();
        std::fs::write(tmp.path().join("photos/cat.jpg"), b"jpeg bytes").unwrap();

        let storage = FsStorage::new(tmp.path(), tmp.path().join("cache"), "/img");
        let bytes = storage.read(Path::new("photos/cat.jpg")).unwrap();
        assert_eq!(bytes, Some(b"jpeg bytes".to_vec()));
    }

    #[test]
    fn read_missing_source_is_none_not_error() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), tmp.path().join("cache"), "");
        assert_eq!(storage.read(Path::new("nope.jpg")).unwrap(), None);
    }

    #[test]
    fn write_creates_the_cache_directory() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), tmp.path().join("deep/cache"), "");
        storage.write("out.png", b"png").unwrap();
        assert!(storage.exists("out.png"));
        assert_eq!(storage.read_cache("out.png").unwrap(), Some(b"png".to_vec()));
        assert!(storage.age("out.png").is_some());
    }

    #[test]
    fn url_for_joins_prefix_without_double_slash() {
        let storage = FsStorage::new("/src", "/cache", "https://cdn.example.com/media/");
        assert_eq!(
            storage.url_for("cat_0_abc.jpg"),
            "https://cdn.example.com/media/cat_0_abc.jpg"
        );
        let bare = FsStorage::new("/src", "/cache", "");
        assert_eq!(bare.url_for("cat_0_abc.jpg"), "cat_0_abc.jpg");
    }

    #[test]
    fn fetch_failures_map_to_fetch_errors_across_calls() {
        let tmp = TempDir::new().unwrap();
        let storage = FsStorage::new(tmp.path(), tmp.path().join("cache"), "");
        // Port 1 refuses immediately; the second call goes through the same
        // shared client the first one built.
        for _ in 0..2 {
            let err = storage.fetch("http://127.0.0.1:1/x.png").unwrap_err();
            assert!(matches!(err, StorageError::Fetch(_)));
        }
    }

    // =========================================================================
    // MemStorage
    // =========================================================================

    #[test]
    fn mem_storage_round_trips_cache_writes() {
        let storage = MemStorage::new();
        storage.write("a.png", b"one").unwrap();
        storage.write("b.png", b"two").unwrap();
        assert!(storage.exists("a.png"));
        assert_eq!(storage.cached_names(), vec!["a.png", "b.png"]);
        assert_eq!(storage.read_cache("b.png").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn mem_storage_serves_remotes() {
        let storage = MemStorage::new();
        storage.add_remote("https://x/img.png", b"png".to_vec());
        assert_eq!(storage.fetch("https://x/img.png").unwrap(), b"png");
        assert!(storage.fetch("https://x/missing.png").is_err());
    }
}
