//! Bounded in-memory store with optional durable secondary tier

use super::eviction::{Clock, EvictionPolicy, EvictionReason, SystemClock};
use super::{cascade_set, NormalizedStore, StoreStats};
use crate::metrics;
use crate::record::{merge_record, ChangedKeys, Record};
use crate::{NormCacheError, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const BACKEND: &str = "memory";

struct Entry {
    record: Arc<Record>,
    size: usize,
    written_at: Instant,
    accessed_at: Instant,
    tick: u64,
}

/// Recency-ordered entries; the lowest tick is the least recently used
#[derive(Default)]
struct Lru {
    entries: HashMap<String, Entry>,
    order: BTreeMap<u64, String>,
    weight: usize,
    next_tick: u64,
}

impl Lru {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn insert(&mut self, record: Arc<Record>, now: Instant) {
        let key = record.key().to_string();
        self.remove(&key);

        let tick = self.bump();
        let size = record.size_estimate_bytes();
        self.weight += size;
        self.order.insert(tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                record,
                size,
                written_at: now,
                accessed_at: now,
                tick,
            },
        );
    }

    fn touch(&mut self, key: &str, now: Instant) -> Option<Arc<Record>> {
        let tick = self.bump();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.tick);
        self.order.insert(tick, key.to_string());
        entry.tick = tick;
        entry.accessed_at = now;
        Some(Arc::clone(&entry.record))
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        self.weight -= entry.size;
        Some(entry)
    }

    fn pop_lru(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        if let Some(entry) = self.entries.remove(&key) {
            self.weight -= entry.size;
        }
        Some(key)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.weight = 0;
    }
}

/// LRU record store bounded by an [`EvictionPolicy`]
///
/// With a secondary store, loads read through on a primary miss and merges
/// write through to the secondary before applying to memory. Merges are
/// serialized across both tiers, so the tiers see batches in the same order.
pub struct MemoryStore {
    lru: Mutex<Lru>,
    /// Held across the secondary write and the primary apply
    merge_lock: Mutex<()>,
    policy: EvictionPolicy,
    clock: Arc<dyn Clock>,
    secondary: Option<Arc<dyn NormalizedStore>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_policy(EvictionPolicy::default())
    }

    pub fn with_policy(policy: EvictionPolicy) -> Self {
        Self {
            lru: Mutex::new(Lru::default()),
            merge_lock: Mutex::new(()),
            policy,
            clock: Arc::new(SystemClock),
            secondary: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Layer this store over a durable secondary
    pub fn with_secondary(mut self, secondary: Arc<dyn NormalizedStore>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    pub fn secondary(&self) -> Option<&Arc<dyn NormalizedStore>> {
        self.secondary.as_ref()
    }

    /// Drop every in-memory record, leaving the secondary untouched
    ///
    /// Callers must make sure no merge runs concurrently.
    pub fn clear_primary_cache(&self) {
        self.lru.lock().clear();
        metrics::set_resident_entries(BACKEND, 0);
    }

    /// Clear the secondary tier only
    ///
    /// Callers must make sure no merge runs concurrently.
    pub fn clear_secondary_cache(&self) -> Result<()> {
        match &self.secondary {
            Some(secondary) => secondary.clear_all(),
            None => Ok(()),
        }
    }

    /// Number of records held in memory
    pub fn len(&self) -> usize {
        self.lru.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live in-memory entry, purging it first if it has expired
    fn fresh(&self, lru: &mut Lru, key: &str, now: Instant) -> Option<Arc<Record>> {
        let expired = lru
            .entries
            .get(key)
            .map(|e| self.policy.is_expired(e.written_at, e.accessed_at, now))?;
        if expired {
            lru.remove(key);
            self.note_eviction(key, EvictionReason::Expired);
            return None;
        }
        lru.touch(key, now)
    }

    /// Stored version a merge applies on top of
    fn merge_base(&self, lru: &mut Lru, key: &str, now: Instant) -> Option<Arc<Record>> {
        if let Some(record) = self.fresh(lru, key, now) {
            return Some(record);
        }
        let secondary = self.secondary.as_ref()?;
        match secondary.load(key) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(key, error = %e, "Secondary load failed during merge");
                None
            }
        }
    }

    fn enforce_policy(&self, lru: &mut Lru, now: Instant) {
        if self.policy.expire_after().is_some() {
            let expired: Vec<String> = lru
                .entries
                .iter()
                .filter(|(_, e)| self.policy.is_expired(e.written_at, e.accessed_at, now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                lru.remove(&key);
                self.note_eviction(&key, EvictionReason::Expired);
            }
        }

        while let Some(reason) = self.policy.over_budget(lru.entries.len(), lru.weight) {
            match lru.pop_lru() {
                Some(key) => self.note_eviction(&key, reason),
                None => break,
            }
        }
        metrics::set_resident_entries(BACKEND, lru.entries.len());
    }

    fn note_eviction(&self, key: &str, reason: EvictionReason) {
        tracing::trace!(key, reason = reason.as_str(), "Evicted record");
        self.evictions.fetch_add(1, Ordering::Relaxed);
        metrics::record_eviction(reason.as_str());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizedStore for MemoryStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn load(&self, key: &str) -> Result<Option<Arc<Record>>> {
        let now = self.clock.now();
        if let Some(record) = self.fresh(&mut self.lru.lock(), key, now) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_load(BACKEND, true);
            return Ok(Some(record));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_load(BACKEND, false);

        let Some(secondary) = &self.secondary else {
            return Ok(None);
        };
        let _merging = self.merge_lock.lock();
        let loaded = secondary.load(key)?;
        if let Some(record) = &loaded {
            let mut lru = self.lru.lock();
            // A merge that landed first already holds the newer version
            if let Some(current) = self.fresh(&mut lru, key, now) {
                return Ok(Some(current));
            }
            lru.insert(Arc::clone(record), now);
            self.enforce_policy(&mut lru, now);
        }
        Ok(loaded)
    }

    fn merge_all(&self, records: &[Record]) -> Result<ChangedKeys> {
        let started = Instant::now();
        let _merging = self.merge_lock.lock();
        let secondary_result = self.secondary.as_ref().map(|s| (s.name(), s.merge_all(records)));

        let now = self.clock.now();
        let mut changed = ChangedKeys::new();
        {
            let mut lru = self.lru.lock();
            for record in records {
                let base = self.merge_base(&mut lru, record.key(), now);
                let outcome = merge_record(base.as_deref(), record);
                changed.extend(outcome.changed);
                lru.insert(Arc::new(outcome.record), now);
            }
            self.enforce_policy(&mut lru, now);
        }
        metrics::record_merge(BACKEND, records.len(), started.elapsed().as_secs_f64());

        match secondary_result {
            Some((_, Ok(secondary_changed))) => {
                changed.extend(secondary_changed);
                Ok(changed)
            }
            Some((backend, Err(e))) => {
                metrics::record_secondary_write_failure(backend);
                tracing::warn!(
                    backend,
                    error = %e,
                    changed = changed.len(),
                    "Write-through to secondary failed; batch applied in memory only"
                );
                Err(NormCacheError::SecondaryWrite {
                    changed,
                    message: e.to_string(),
                })
            }
            None => Ok(changed),
        }
    }

    fn remove(&self, key: &str, cascade: bool) -> Result<bool> {
        let _merging = self.merge_lock.lock();
        let keys = if cascade {
            cascade_set(&self.dump()?, key)
        } else {
            BTreeSet::from([key.to_string()])
        };

        let mut present = {
            let mut lru = self.lru.lock();
            let mut present = false;
            for k in &keys {
                if lru.remove(k).is_some() && k == key {
                    present = true;
                }
            }
            metrics::set_resident_entries(BACKEND, lru.entries.len());
            present
        };

        if let Some(secondary) = &self.secondary {
            for k in &keys {
                let removed = secondary.remove(k, false)?;
                if k == key {
                    present |= removed;
                }
            }
        }
        Ok(present)
    }

    fn clear_all(&self) -> Result<()> {
        tracing::info!("Clearing in-memory records");
        let _merging = self.merge_lock.lock();
        self.clear_primary_cache();
        self.clear_secondary_cache()
    }

    fn dump(&self) -> Result<BTreeMap<String, Arc<Record>>> {
        let mut out = match &self.secondary {
            Some(secondary) => secondary.dump()?,
            None => BTreeMap::new(),
        };
        let now = self.clock.now();
        let lru = self.lru.lock();
        for (key, entry) in &lru.entries {
            if !self.policy.is_expired(entry.written_at, entry.accessed_at, now) {
                out.insert(key.clone(), Arc::clone(&entry.record));
            }
        }
        Ok(out)
    }

    fn stats(&self) -> Result<StoreStats> {
        let (entries, weight) = {
            let lru = self.lru.lock();
            (lru.entries.len(), lru.weight)
        };
        let secondary = match &self.secondary {
            Some(s) => Some(Box::new(s.stats()?)),
            None => None,
        };
        Ok(StoreStats {
            backend: BACKEND.to_string(),
            entries,
            weight_bytes: weight,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            secondary,
        })
    }
}
