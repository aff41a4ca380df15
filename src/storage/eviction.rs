//! Eviction policy and time source for the in-memory store

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// What an expiry duration is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpireBasis {
    /// Time since the record was last written
    #[default]
    SinceWrite,
    /// Time since the record was last read or written
    SinceAccess,
}

/// Bounds on the in-memory store; unbounded by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvictionPolicy {
    max_size_bytes: Option<usize>,
    max_entries: Option<usize>,
    expire_after: Option<(Duration, ExpireBasis)>,
}

impl EvictionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_size_bytes(mut self, bytes: usize) -> Self {
        self.max_size_bytes = Some(bytes);
        self
    }

    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = Some(entries);
        self
    }

    pub fn expire_after_write(mut self, ttl: Duration) -> Self {
        self.expire_after = Some((ttl, ExpireBasis::SinceWrite));
        self
    }

    pub fn expire_after_access(mut self, ttl: Duration) -> Self {
        self.expire_after = Some((ttl, ExpireBasis::SinceAccess));
        self
    }

    pub fn max_size_bytes(&self) -> Option<usize> {
        self.max_size_bytes
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    pub fn expire_after(&self) -> Option<(Duration, ExpireBasis)> {
        self.expire_after
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_size_bytes.is_none() && self.max_entries.is_none() && self.expire_after.is_none()
    }

    /// Whether an entry written at `written` and last touched at `accessed`
    /// has expired at `now`
    pub fn is_expired(&self, written: Instant, accessed: Instant, now: Instant) -> bool {
        match self.expire_after {
            Some((ttl, ExpireBasis::SinceWrite)) => now.saturating_duration_since(written) >= ttl,
            Some((ttl, ExpireBasis::SinceAccess)) => now.saturating_duration_since(accessed) >= ttl,
            None => false,
        }
    }

    /// Whether the store is over budget
    pub(crate) fn over_budget(&self, entries: usize, bytes: usize) -> Option<EvictionReason> {
        if self.max_entries.is_some_and(|max| entries > max) {
            return Some(EvictionReason::Entries);
        }
        if self.max_size_bytes.is_some_and(|max| bytes > max) {
            return Some(EvictionReason::Size);
        }
        None
    }
}

/// Why a record left the in-memory store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Size,
    Entries,
    Expired,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Size => "size",
            EvictionReason::Entries => "entries",
            EvictionReason::Expired => "expired",
        }
    }
}

/// Monotonic time source for expiry
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        let policy = EvictionPolicy::default();
        assert!(policy.is_unbounded());
        assert_eq!(policy.over_budget(1_000_000, usize::MAX), None);
    }

    #[test]
    fn test_over_budget() {
        let policy = EvictionPolicy::unbounded()
            .with_max_entries(2)
            .with_max_size_bytes(2000);
        assert_eq!(policy.over_budget(2, 2000), None);
        assert_eq!(policy.over_budget(3, 10), Some(EvictionReason::Entries));
        assert_eq!(policy.over_budget(1, 2001), Some(EvictionReason::Size));
    }

    #[test]
    fn test_expiry_basis() {
        let clock = ManualClock::new();
        let written = clock.now();
        clock.advance(Duration::from_secs(50));
        let accessed = clock.now();
        clock.advance(Duration::from_secs(50));
        let now = clock.now();

        let write = EvictionPolicy::unbounded().expire_after_write(Duration::from_secs(60));
        assert!(write.is_expired(written, accessed, now));

        let access = EvictionPolicy::unbounded().expire_after_access(Duration::from_secs(60));
        assert!(!access.is_expired(written, accessed, now));
    }
}
