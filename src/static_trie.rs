//! # Static Trie (C2)
//!
//! A double-array trie keyed by path bytes for fully-literal routes. Transition from node `i` on
//! byte `c` is defined iff `check[base[i]+c] == i`; the successor node is `base[i]+c`.
//!
//! ## Sentinel
//!
//! The root occupies index `0`. Using `0` as both the "unused slot" marker and a legitimate node
//! index (the root) is ambiguous — see the design notes' open question. This implementation uses
//! `-1` as the unused sentinel instead, so the root needs no special-casing: `check[j] == -1`
//! always and unambiguously means "free".
//!
//! ## Collisions and relocation
//!
//! A transition slot can be genuinely free (claim it directly) or already owned by a different
//! parent (a true collision). On a real collision, [`StaticTrie::relocate`] finds a new base for
//! the colliding node and moves its existing children there, fixing up each moved child's
//! grandchildren so their recorded parent (`check`) still points at the right slot.

use crate::route_entry::RouteArc;

const FREE: i32 = -1;
const ROOT: i32 = 0;
const MAX_SIZE: i32 = 1 << 30;
const INITIAL_CAPACITY: usize = 256;

/// A double-array trie over fully-static (literal) paths.
pub struct StaticTrie {
    base: Vec<i32>,
    check: Vec<i32>,
    handlers: Vec<Option<RouteArc>>,
    children_bytes: Vec<Vec<u8>>,
    paths: Vec<Option<String>>,
}

impl Default for StaticTrie {
    fn default() -> Self {
        StaticTrie {
            base: vec![0; INITIAL_CAPACITY],
            check: vec![FREE; INITIAL_CAPACITY],
            handlers: vec![None; INITIAL_CAPACITY],
            children_bytes: vec![Vec::new(); INITIAL_CAPACITY],
            paths: vec![None; INITIAL_CAPACITY],
        }
    }
}

impl StaticTrie {
    pub fn new() -> Self {
        Self::default()
    }

    fn len(&self) -> i32 {
        self.base.len() as i32
    }

    fn grow_to(&mut self, required: i32) {
        let required = required.max(0) as usize + 1;
        if required <= self.base.len() {
            return;
        }
        let new_size = (self.base.len() as f64 * 1.5).ceil() as usize;
        let new_size = new_size.max(required);
        self.base.resize(new_size, 0);
        self.check.resize(new_size, FREE);
        self.handlers.resize(new_size, None);
        self.children_bytes.resize(new_size, Vec::new());
        self.paths.resize(new_size, None);
    }

    /// Returns the slot for the `(cur, c)` edge, creating it (and relocating `cur` if its
    /// current base collides with another node) if necessary. `remaining` is the tail of the
    /// path being inserted, starting with `c`, used to pick a base likely to avoid a second
    /// relocation while walking the rest of this same path.
    fn ensure_child(&mut self, cur: i32, c: u8, remaining: &[u8]) -> Result<i32, String> {
        let mut t = self.base[cur as usize] + c as i32;
        if t >= self.len() || t < 0 {
            if t >= MAX_SIZE {
                return Err(format!("static trie exceeded maximum size ({MAX_SIZE} slots)"));
            }
            self.grow_to(t);
        }

        if self.check[t as usize] == cur {
            return Ok(t);
        }
        if self.check[t as usize] == FREE {
            self.check[t as usize] = cur;
            self.children_bytes[cur as usize].push(c);
            return Ok(t);
        }

        // Real collision: another node already owns this slot. Relocate `cur`.
        let new_base = self.find_free_base(remaining)?;
        log::debug!("static trie relocating node {cur} to base {new_base} (collision at slot {t})");
        self.relocate(cur, new_base);
        t = self.base[cur as usize] + c as i32;
        self.check[t as usize] = cur;
        self.children_bytes[cur as usize].push(c);
        Ok(t)
    }

    /// Finds the smallest `b >= 1` such that every byte in `suffix` lands on a free slot.
    fn find_free_base(&mut self, suffix: &[u8]) -> Result<i32, String> {
        let max_byte = suffix.iter().copied().max().unwrap_or(0) as i32;
        let mut b: i32 = 1;
        loop {
            if b.saturating_add(max_byte) >= MAX_SIZE {
                return Err(format!("static trie exceeded maximum size ({MAX_SIZE} slots)"));
            }
            self.grow_to(b + max_byte);
            if suffix.iter().all(|&c| self.check[(b + c as i32) as usize] == FREE) {
                return Ok(b);
            }
            b += 1;
        }
    }

    /// Moves every existing child of `node` from its old base to `new_base`, then updates each
    /// moved child's own children (`node`'s grandchildren) to point at the new slot as parent.
    fn relocate(&mut self, node: i32, new_base: i32) {
        let old_base = self.base[node as usize];
        let bytes = std::mem::take(&mut self.children_bytes[node as usize]);
        for &b in &bytes {
            let old_slot = (old_base + b as i32) as usize;
            let new_slot = (new_base + b as i32) as usize;

            self.base[new_slot] = self.base[old_slot];
            self.handlers[new_slot] = self.handlers[old_slot].take();
            self.paths[new_slot] = self.paths[old_slot].take();
            self.children_bytes[new_slot] = std::mem::take(&mut self.children_bytes[old_slot]);
            self.check[new_slot] = node;
            self.check[old_slot] = FREE;
            self.base[old_slot] = 0;

            let grandchild_bytes = self.children_bytes[new_slot].clone();
            let grandchild_base = self.base[new_slot];
            for gc in grandchild_bytes {
                let gslot = (grandchild_base + gc as i32) as usize;
                self.check[gslot] = new_slot as i32;
            }
        }
        self.base[node as usize] = new_base;
        self.children_bytes[node as usize] = bytes;
    }

    /// Registers `path` (which must already be normalized) with `handler`.
    ///
    /// Fails with an error message (the caller maps this to [`crate::RouterError`]) if the path
    /// is empty, or if the exact path is already registered.
    pub fn add(&mut self, path: &str, handler: RouteArc) -> Result<(), String> {
        if path.is_empty() {
            return Err("path must not be empty".to_string());
        }

        let bytes = path.as_bytes();
        let mut cur = ROOT;
        for i in 0..bytes.len() {
            cur = self.ensure_child(cur, bytes[i], &bytes[i..])?;
        }

        if self.handlers[cur as usize].is_some() {
            return Err(format!("duplicate route: {path}"));
        }
        self.handlers[cur as usize] = Some(handler);
        self.paths[cur as usize] = Some(path.to_string());
        Ok(())
    }

    /// Walks `path` byte-by-byte and returns the handler at the terminal node, if any.
    pub fn search(&self, path: &str) -> Option<RouteArc> {
        let bytes = path.as_bytes();
        let mut cur = ROOT;
        for &c in bytes {
            let t = self.base[cur as usize] + c as i32;
            if t < 0 || t >= self.len() || self.check[t as usize] != cur {
                return None;
            }
            cur = t;
        }
        self.handlers[cur as usize].clone()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.search(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandler;
    use crate::route_entry::RouteEntry;

    fn h() -> RouteArc {
        RouteEntry::plain(FnHandler::new(|_, res| {
            res.write(200, "ok");
            Ok(())
        }))
    }

    #[test]
    fn exact_match_only() {
        let mut trie = StaticTrie::new();
        trie.add("/static", h()).unwrap();
        assert!(trie.search("/static").is_some());
        assert!(trie.search("/stati").is_none());
        assert!(trie.search("/static2").is_none());
        assert!(trie.search("/missing").is_none());
    }

    #[test]
    fn rejects_duplicate_and_empty() {
        let mut trie = StaticTrie::new();
        trie.add("/a", h()).unwrap();
        assert!(trie.add("/a", h()).is_err());
        assert!(trie.add("", h()).is_err());
    }

    #[test]
    fn shares_common_prefixes() {
        let mut trie = StaticTrie::new();
        trie.add("/users", h()).unwrap();
        trie.add("/users/list", h()).unwrap();
        trie.add("/usage", h()).unwrap();
        assert!(trie.search("/users").is_some());
        assert!(trie.search("/users/list").is_some());
        assert!(trie.search("/usage").is_some());
        assert!(trie.search("/user").is_none());
    }

    #[test]
    fn handles_many_routes_with_forced_relocation() {
        let mut trie = StaticTrie::new();
        // Dense alphanumeric suffixes from a shared short prefix force repeated base relocation.
        let mut paths = Vec::new();
        for a in b'a'..=b'z' {
            for b in b'0'..=b'9' {
                paths.push(format!("/r/{}{}", a as char, b as char));
            }
        }
        for p in &paths {
            trie.add(p, h()).unwrap();
        }
        for p in &paths {
            assert!(trie.search(p).is_some(), "missing {p}");
        }
        assert!(trie.search("/r/zz").is_none());
    }
}
