//! Render log and cache expiry.
//!
//! Rendered files are self-describing: the TTL lives in the file name's
//! tag segment, so the cache itself needs no index to stay correct. The
//! [`CacheLog`] on top of it is bookkeeping: per-file dimensions, mime type,
//! source reference, render time and hit count, so a cache hit can report
//! its variables without decoding the cached bytes.
//!
//! ## Storage
//!
//! The log is a JSON file at `<cache_dir>/.render-log.json`, versioned so a
//! format change invalidates old logs instead of misreading them. A missing
//! or corrupt log loads as empty; the cache files themselves stay valid.
//!
//! ## Expiry
//!
//! [`sweep_expired`] walks the cache directory and removes files whose
//! `mtime + ttl` lies in the past, reading the TTL back out of the file
//! name. Forever-tagged files (`_0_` segment) are never swept. Log entries
//! of removed files go with them.

use crate::request::CacheTtl;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

/// Name of the render log file within the cache directory.
const LOG_FILENAME: &str = ".render-log.json";

/// Version of the log format. Bump to invalidate existing logs when the
/// format changes.
const LOG_VERSION: u32 = 2;

/// Bookkeeping for one cached file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub width: u32,
    pub height: u32,
    pub mime: String,
    /// Source reference the file was rendered from.
    pub source: String,
    /// Render time, unix seconds.
    pub created: u64,
    pub hits: u64,
    /// TTL in seconds as rendered; 0 means forever. The sweep reads the
    /// authoritative value from the file name, this copy is for inspection.
    pub ttl_secs: u64,
}

/// On-disk render log mapping cache file names to their entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheLog {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
}

impl CacheLog {
    pub fn empty() -> Self {
        Self {
            version: LOG_VERSION,
            entries: HashMap::new(),
        }
    }

    /// Load from the cache directory. Returns an empty log if the file
    /// doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(cache_dir: &Path) -> Self {
        let path = cache_dir.join(LOG_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let log: Self = match serde_json::from_str(&content) {
            Ok(l) => l,
            Err(_) => return Self::empty(),
        };
        if log.version != LOG_VERSION {
            return Self::empty();
        }
        log
    }

    /// Save to the cache directory.
    pub fn save(&self, cache_dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(cache_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(cache_dir.join(LOG_FILENAME), json)
    }

    pub fn get(&self, file_name: &str) -> Option<&CacheEntry> {
        self.entries.get(file_name)
    }

    /// Record an entry. An existing entry is kept unless `force` is set;
    /// returns whether the entry was written.
    pub fn update(&mut self, file_name: &str, entry: CacheEntry, force: bool) -> bool {
        if !force && self.entries.contains_key(file_name) {
            return false;
        }
        self.entries.insert(file_name.to_string(), entry);
        true
    }

    /// Bump the hit counter, creating a bare entry if the log lost it.
    pub fn hit(&mut self, file_name: &str) -> u64 {
        let entry = self.entries.entry(file_name.to_string()).or_default();
        entry.hits += 1;
        entry.hits
    }

    pub fn remove(&mut self, file_name: &str) {
        self.entries.remove(file_name);
    }
}

/// Current time as unix seconds, for [`CacheEntry::created`] stamps.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Read the TTL back out of a cache file name.
///
/// Identities look like `{basename}_{tag}_{hash}[_{suffix}].{ext}` where the
/// hash is exactly 32 hex chars; the tag sits right before it. Basenames may
/// contain underscores, so the hash is located by scanning from the right.
pub fn ttl_from_name(file_name: &str) -> Option<CacheTtl> {
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(file_name);
    let parts: Vec<&str> = stem.split('_').collect();
    let hash_idx = parts
        .iter()
        .rposition(|p| p.len() == 32 && p.chars().all(|c| c.is_ascii_hexdigit()))?;
    if hash_idx == 0 {
        return None;
    }
    let secs = u64::from_str_radix(parts[hash_idx - 1], 16).ok()?;
    Some(CacheTtl::from_secs(secs))
}

/// Summary of a cache sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub swept: u32,
    pub kept: u32,
}

impl fmt::Display for SweepStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} swept, {} kept", self.swept, self.kept)
    }
}

/// Remove expired cache files and their log entries.
pub fn sweep_expired(cache_dir: &Path, log: &mut CacheLog) -> io::Result<SweepStats> {
    sweep_expired_at(cache_dir, log, SystemTime::now())
}

/// Sweep against an explicit clock. Files whose names don't parse as cache
/// identities are left alone.
pub fn sweep_expired_at(
    cache_dir: &Path,
    log: &mut CacheLog,
    now: SystemTime,
) -> io::Result<SweepStats> {
    let mut stats = SweepStats::default();

    for entry in WalkDir::new(cache_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name == LOG_FILENAME {
            continue;
        }
        let ttl_secs = match ttl_from_name(&name) {
            Some(CacheTtl::Seconds(s)) => s,
            Some(CacheTtl::Forever) => {
                stats.kept += 1;
                continue;
            }
            None => continue,
        };
        let mtime = entry.metadata()?.modified()?;
        let expired = now
            .duration_since(mtime)
            .map(|age| age.as_secs() > ttl_secs)
            .unwrap_or(false);
        if expired {
            std::fs::remove_file(entry.path())?;
            log.remove(&name);
            stats.swept += 1;
        } else {
            stats.kept += 1;
        }
    }

    Ok(stats)
}
