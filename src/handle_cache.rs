//! Bounded LRU cache of native OS handles.
//!
//! Guards every privileged call: callers ask for a handle by id and get a
//! cached one back whenever possible, instead of opening a fresh handle per
//! call. A single internal mutex lets any thread call `get`/`release`; the
//! lock is held only across map mutation, never across a user callback.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::os_facade::{NativeHandle, OsFacade};

/// `{size, hits, misses, hit_rate}` — a point-in-time view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry {
    handle: NativeHandle,
    last_used: u64,
}

struct Inner {
    entries: HashMap<u32, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
}

/// Bounded LRU keyed by `{pid}` or `{tid}` — one instance per id space
/// (process handles and thread handles are cached separately, with default
/// capacities of 500 processes and 1000 threads).
pub struct HandleCache<F: OsFacade> {
    facade: std::sync::Arc<F>,
    max_size: usize,
    inner: Mutex<Inner>,
    open: OpenFn<F>,
}

type OpenFn<F> = Box<dyn Fn(&F, u32) -> crate::error::OsResult<NativeHandle> + Send + Sync>;

impl<F: OsFacade> HandleCache<F> {
    pub fn new(facade: std::sync::Arc<F>, max_size: usize, open: OpenFn<F>) -> Self {
        HandleCache {
            facade,
            max_size,
            inner: Mutex::new(Inner { entries: HashMap::new(), tick: 0, hits: 0, misses: 0 }),
            open,
        }
    }

    /// Returns `true` if `id` resolved to a live handle, `false` if the
    /// target has vanished. Never stores a null handle on miss-without-open.
    pub fn get(&self, id: u32) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.tick += 1;
        let tick = guard.tick;

        if let Some(entry) = guard.entries.get_mut(&id) {
            entry.last_used = tick;
            guard.hits += 1;
            return true;
        }

        guard.misses += 1;
        let opened = (self.open)(&self.facade, id);
        match opened {
            Ok(handle) => {
                if guard.entries.len() >= self.max_size {
                    evict_lru(&mut guard, &self.facade);
                }
                guard.entries.insert(id, Entry { handle, last_used: tick });
                true
            }
            Err(_) => false,
        }
    }

    pub fn release(&self, id: u32) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = guard.entries.remove(&id) {
            self.facade.close_handle(entry.handle);
        }
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        for (_, entry) in guard.entries.drain() {
            self.facade.close_handle(entry.handle);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        CacheStats { size: guard.entries.len(), hits: guard.hits, misses: guard.misses }
    }

    /// Runs `f` with the cached native handle for `id`, if any is live.
    pub fn with_handle<R>(&self, id: u32, f: impl FnOnce(&NativeHandle) -> R) -> Option<R> {
        if !self.get(id) {
            return None;
        }
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.entries.get(&id).map(|entry| f(&entry.handle))
    }

    /// Closes and removes every cached entry whose id is not in `live`
    /// (the orchestrator's periodic GC of handles for processes that have
    /// since exited).
    pub fn retain_live(&self, live: &std::collections::HashSet<u32>) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let stale: Vec<u32> = guard.entries.keys().filter(|id| !live.contains(id)).copied().collect();
        for id in stale {
            if let Some(entry) = guard.entries.remove(&id) {
                self.facade.close_handle(entry.handle);
            }
        }
    }
}

fn evict_lru<F: OsFacade>(inner: &mut Inner, facade: &F) {
    let Some((&lru_id, _)) = inner.entries.iter().min_by_key(|(_, entry)| entry.last_used) else {
        return;
    };
    if let Some(entry) = inner.entries.remove(&lru_id) {
        facade.close_handle(entry.handle);
    }
}
