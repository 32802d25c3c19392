//! # Parameter Buffer and Pool
//!
//! A small ordered key/value buffer holding the captured path parameters for one in-flight
//! request, plus a concurrent pool that lets the lifecycle controller reuse buffers across
//! requests instead of allocating one per call.
//!
//! The pool is a single `Mutex`-guarded free list, the same shape used for `REDIRECT_RULES` in
//! the reference gateway module: contention is bounded by the number of concurrently in-flight
//! requests, which is small relative to available threads, so a lock-free structure would add
//! complexity without a measurable benefit here.

use std::sync::{Arc, Mutex};

/// Initial capacity for a freshly allocated buffer; amortizes the common case of a handful of
/// path parameters without over-allocating.
const INITIAL_CAPACITY: usize = 8;

/// Ordered (name, value) pairs captured while matching a dynamic route.
///
/// Lookup is linear — the set of parameter names per pattern is tiny (I2 bounds it to the
/// segments of one path) — so a `Vec` beats a hash map on both allocation and cache behavior.
#[derive(Debug, Default, Clone)]
pub struct ParamBuffer {
    entries: Vec<(String, String)>,
}

impl ParamBuffer {
    fn with_capacity(cap: usize) -> Self {
        ParamBuffer { entries: Vec::with_capacity(cap) }
    }

    /// Appends a captured (name, value) pair.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Returns the value for the first (and, within a valid pattern, only) entry matching `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clears the buffer's contents while preserving its allocated capacity.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Truncates back to a previously observed length. Used by the dynamic tree to roll back a
    /// capture made by a child whose subtree ultimately didn't match.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Concurrent free list of [`ParamBuffer`]s.
///
/// `acquire` reuses a reset buffer when one is available, otherwise allocates. `release` resets
/// the buffer and returns it to the pool.
#[derive(Debug, Default)]
pub struct ParamPool {
    free: Mutex<Vec<ParamBuffer>>,
}

impl ParamPool {
    pub fn new() -> Arc<Self> {
        Arc::new(ParamPool { free: Mutex::new(Vec::new()) })
    }

    /// Acquires a buffer from the pool, or allocates a fresh one if the pool is empty.
    pub fn acquire(&self) -> ParamBuffer {
        self.free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| ParamBuffer::with_capacity(INITIAL_CAPACITY))
    }

    /// Resets `buffer` and returns it to the pool for reuse by a later request.
    pub fn release(&self, mut buffer: ParamBuffer) {
        buffer.reset();
        self.free.lock().unwrap().push(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_first_match() {
        let mut buf = ParamBuffer::default();
        buf.add("id", "123");
        assert_eq!(buf.get("id"), Some("123"));
        assert_eq!(buf.get("missing"), None);
    }

    #[test]
    fn reset_preserves_capacity_but_clears_entries() {
        let mut buf = ParamBuffer::with_capacity(4);
        buf.add("a", "1");
        buf.add("b", "2");
        assert_eq!(buf.len(), 2);
        buf.reset();
        assert_eq!(buf.len(), 0);
        assert!(buf.entries.capacity() >= 4);
    }

    #[test]
    fn pool_reuses_released_buffers() {
        let pool = ParamPool::new();
        let mut buf = pool.acquire();
        buf.add("x", "1");
        pool.release(buf);

        let reused = pool.acquire();
        assert_eq!(reused.len(), 0, "released buffer must come back reset");
    }

    #[test]
    fn truncate_rolls_back_partial_captures() {
        let mut buf = ParamBuffer::default();
        buf.add("a", "1");
        let checkpoint = buf.len();
        buf.add("b", "2");
        buf.truncate(checkpoint);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.get("b"), None);
    }
}
