//! # Resolution Cache (C4)
//!
//! A sharded `fingerprint -> (handler, captured parameters)` memo. The fingerprint is the 64-bit
//! FNV-1a hash of the method byte concatenated with the normalized path (P8); the shard index is
//! the fingerprint modulo the shard count `S`. Each shard owns its own mutex and a bounded entry
//! map, evicted by a simple LRU scan on overflow and swept on a timer for entries past `TTL`.
//!
//! The per-shard map plus single-scan eviction mirrors the "simple `Mutex<HashMap<..>>` behind a
//! lock" shape used throughout the reference gateway (`REDIRECT_RULES` in `app::gateway`) rather
//! than reaching for an intrusive LRU list: shard maps are bounded by `M` (a few thousand at
//! most), so an O(M) scan on insert is sub-microsecond.

use crate::method::Method;
use crate::route_entry::RouteArc;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default shard count (power of two, per the data model).
pub const DEFAULT_SHARDS: usize = 8;
/// Default per-shard capacity before LRU eviction kicks in.
pub const DEFAULT_MAX_PER_SHARD: usize = 2048;
/// Default time-to-live swept in the background.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
/// Default interval between background sweep ticks.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Computes the 64-bit FNV-1a fingerprint of `method_byte ∥ path_bytes` (P8): initial value
/// `0xcbf29ce484222325`, prime `0x100000001b3`, as implemented by [`fnv::FnvHasher`].
pub fn fingerprint(method: Method, path: &str) -> u64 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(&[method.code_byte()]);
    hasher.write(path.as_bytes());
    hasher.finish()
}

/// A cached match result: the resolved handler and a snapshot of its captured parameters.
#[derive(Clone)]
pub struct CacheEntry {
    pub route: RouteArc,
    pub params: Vec<(String, String)>,
    last_access: Instant,
    inserted: Instant,
}

struct Shard {
    entries: HashMap<u64, CacheEntry>,
}

/// Sharded resolution cache (C4).
pub struct ResolutionCache {
    shards: Vec<Mutex<Shard>>,
    max_per_shard: usize,
    ttl: Duration,
    sweeping: AtomicBool,
}

impl ResolutionCache {
    pub fn new(shard_count: usize, max_per_shard: usize, ttl: Duration) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Mutex::new(Shard { entries: HashMap::new() }))
            .collect();
        ResolutionCache { shards, max_per_shard, ttl, sweeping: AtomicBool::new(false) }
    }

    fn shard_for(&self, key: u64) -> &Mutex<Shard> {
        let idx = (key % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Looks up `key`, bumping its `last_access` timestamp on a hit.
    pub fn get(&self, key: u64) -> Option<(RouteArc, Vec<(String, String)>)> {
        let mut shard = self.shard_for(key).lock().unwrap();
        let entry = shard.entries.get_mut(&key)?;
        entry.last_access = Instant::now();
        Some((entry.route.clone(), entry.params.clone()))
    }

    /// Inserts `route`/`params` under `key`, evicting the least-recently-accessed entry first
    /// if the owning shard is already at capacity.
    pub fn put(&self, key: u64, route: RouteArc, params: Vec<(String, String)>) {
        let mut shard = self.shard_for(key).lock().unwrap();
        if shard.entries.len() >= self.max_per_shard && !shard.entries.contains_key(&key) {
            if let Some((&oldest_key, _)) =
                shard.entries.iter().min_by_key(|(_, entry)| entry.last_access)
            {
                shard.entries.remove(&oldest_key);
            }
        }
        let now = Instant::now();
        shard.entries.insert(key, CacheEntry { route, params, last_access: now, inserted: now });
    }

    /// Sweeps every shard, dropping entries whose `last_access` is older than `TTL`. Guarded by
    /// a compare-and-swap flag so overlapping ticks are skipped rather than queued; a tick that
    /// finds the flag already set simply retries on the next tick.
    pub fn sweep(&self) {
        if self.sweeping.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            log::debug!("cache sweep already in progress, skipping this tick");
            return;
        }
        let now = Instant::now();
        let mut total_dropped = 0usize;
        for shard_lock in &self.shards {
            let mut shard = shard_lock.lock().unwrap();
            let before = shard.entries.len();
            shard.entries.retain(|_, entry| now.duration_since(entry.last_access) < self.ttl);
            total_dropped += before - shard.entries.len();
        }
        if total_dropped > 0 {
            log::info!("cache sweep dropped {total_dropped} expired entries");
        }
        self.sweeping.store(false, Ordering::Release);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().entries.len()).sum()
    }

    #[cfg(test)]
    fn insertion_epoch(&self, key: u64) -> Option<Instant> {
        let shard = self.shard_for(key).lock().unwrap();
        shard.entries.get(&key).map(|e| e.inserted)
    }
}
