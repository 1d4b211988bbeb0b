use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;
use ulid::Ulid;

use crate::model::*;
use crate::observability::{CACHE_ENTRIES, CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};

/// Identity of a cached read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Service(Ulid),
    ServiceBookings(Ulid),
    DayBookings(Ulid, NaiveDate),
    Resources(Ulid),
    SpecialDays(Ulid),
}

impl ViewKey {
    pub fn service_id(&self) -> Ulid {
        match *self {
            ViewKey::Service(id)
            | ViewKey::ServiceBookings(id)
            | ViewKey::DayBookings(id, _)
            | ViewKey::Resources(id)
            | ViewKey::SpecialDays(id) => id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ViewKey::Service(_) => "service",
            ViewKey::ServiceBookings(_) => "service_bookings",
            ViewKey::DayBookings(..) => "day_bookings",
            ViewKey::Resources(_) => "resources",
            ViewKey::SpecialDays(_) => "special_days",
        }
    }

    /// Keys a committed change makes stale.
    pub fn affected_by(service_id: Ulid, change: &Change) -> Vec<ViewKey> {
        let mut keys = vec![
            ViewKey::Service(service_id),
            ViewKey::ServiceBookings(service_id),
            ViewKey::Resources(service_id),
        ];
        if matches!(change, Change::SpecialDayChanged { .. } | Change::ScheduleUpdated) {
            keys.push(ViewKey::SpecialDays(service_id));
        }
        keys.extend(
            change
                .dates()
                .into_iter()
                .map(|d| ViewKey::DayBookings(service_id, d)),
        );
        keys
    }
}

#[derive(Debug, Clone)]
pub enum CachedView {
    Service(Arc<Service>),
    Bookings(Arc<Vec<Booking>>),
    Resources(Arc<Vec<Resource>>),
    SpecialDays(Arc<Vec<SpecialDay>>),
}

struct Entry {
    value: CachedView,
    fetched_at: Instant,
    /// Last time `get` served this entry. `None` until the first hit.
    read_at: Option<Instant>,
}

/// Outcome of [`ViewCache::sweep`].
#[derive(Debug, Default)]
pub struct Sweep {
    /// Stale keys that were read during the last TTL.
    pub refresh: Vec<ViewKey>,
    /// Stale entries nobody read, already removed.
    pub dropped: usize,
}

/// TTL cache of store reads, invalidated by committed changes.
///
/// Every invalidation bumps a generation counter. A fetch records the
/// generation before reading the store and its result is discarded if an
/// invalidation happened in between, so a slow read never resurrects data
/// older than a committed write.
///
/// Only entries served from the cache within the last TTL are kept alive by
/// the refresher. Anything else is dropped once stale, so the map tracks the
/// working set instead of every key ever read. A zero TTL stores nothing.
pub struct ViewCache {
    entries: DashMap<ViewKey, Entry>,
    ttl: Duration,
    generation: AtomicU64,
}

impl ViewCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fresh entry for `key`, counting the hit or miss.
    pub fn get(&self, key: &ViewKey) -> Option<CachedView> {
        let hit = self
            .entries
            .get_mut(key)
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|mut e| {
                e.read_at = Some(Instant::now());
                e.value.clone()
            });
        let counter = if hit.is_some() {
            CACHE_HITS_TOTAL
        } else {
            CACHE_MISSES_TOTAL
        };
        metrics::counter!(counter, "view" => key.label()).increment(1);
        hit
    }

    /// Store `value` unless an invalidation happened since `generation` was read.
    pub fn put(&self, key: ViewKey, value: CachedView, generation: u64) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        if self.generation() != generation {
            debug!(view = key.label(), "discarding fetch that raced an invalidation");
            return false;
        }
        self.entries.insert(
            key,
            Entry {
                value,
                fetched_at: Instant::now(),
                read_at: None,
            },
        );
        metrics::gauge!(CACHE_ENTRIES).set(self.entries.len() as f64);
        true
    }

    pub fn invalidate(&self, key: &ViewKey) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(key);
        metrics::gauge!(CACHE_ENTRIES).set(self.entries.len() as f64);
    }

    pub fn invalidate_change(&self, service_id: Ulid, change: &Change) {
        let keys = ViewKey::affected_by(service_id, change);
        self.generation.fetch_add(1, Ordering::SeqCst);
        for key in &keys {
            self.entries.remove(key);
        }
        metrics::gauge!(CACHE_ENTRIES).set(self.entries.len() as f64);
        debug!(%service_id, keys = keys.len(), "cache invalidated");
    }

    /// Drop stale entries that were not read during the last TTL and return
    /// the stale keys that were, for the refresher to re-fetch.
    pub fn sweep(&self) -> Sweep {
        let mut sweep = Sweep::default();
        self.entries.retain(|key, e| {
            if e.fetched_at.elapsed() < self.ttl {
                return true;
            }
            if e.read_at.is_some_and(|t| t.elapsed() < self.ttl) {
                sweep.refresh.push(*key);
                return true;
            }
            sweep.dropped += 1;
            false
        });
        if sweep.dropped > 0 {
            metrics::gauge!(CACHE_ENTRIES).set(self.entries.len() as f64);
            debug!(dropped = sweep.dropped, "unread cache entries dropped");
        }
        sweep
    }

    /// Drop an entry without bumping the generation (refresh failures).
    pub fn evict(&self, key: &ViewKey) {
        self.entries.remove(key);
        metrics::gauge!(CACHE_ENTRIES).set(self.entries.len() as f64);
    }

    pub fn contains(&self, key: &ViewKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn bookings() -> CachedView {
        CachedView::Bookings(Arc::new(Vec::new()))
    }

    #[test]
    fn put_then_get() {
        let cache = ViewCache::new(Duration::from_secs(300));
        let key = ViewKey::ServiceBookings(Ulid::new());
        assert!(cache.get(&key).is_none());
        assert!(cache.put(key, bookings(), cache.generation()));
        assert!(matches!(cache.get(&key), Some(CachedView::Bookings(_))));
    }

    #[test]
    fn zero_ttl_stores_nothing() {
        let cache = ViewCache::new(Duration::ZERO);
        let key = ViewKey::Resources(Ulid::new());
        assert!(!cache.put(key, CachedView::Resources(Arc::new(Vec::new())), cache.generation()));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
        assert!(cache.sweep().refresh.is_empty());
    }

    #[tokio::test]
    async fn sweep_drops_unread_and_keeps_read() {
        let ttl = Duration::from_millis(200);
        let cache = ViewCache::new(ttl);
        let sid = Ulid::new();
        let read = ViewKey::Resources(sid);
        for key in std::iter::once(read).chain(
            (1..=200u64).map(|d| ViewKey::DayBookings(sid, date("2025-01-01") + chrono::Days::new(d))),
        ) {
            cache.put(key, bookings(), cache.generation());
        }
        assert_eq!(cache.len(), 201);

        // Nothing is stale yet.
        let sweep = cache.sweep();
        assert!(sweep.refresh.is_empty());
        assert_eq!(sweep.dropped, 0);

        tokio::time::sleep(ttl * 3 / 4).await;
        assert!(cache.get(&read).is_some());
        tokio::time::sleep(ttl / 2).await;

        let sweep = cache.sweep();
        assert_eq!(sweep.dropped, 200);
        assert_eq!(sweep.refresh, vec![read]);
        assert_eq!(cache.len(), 1);

        // A refreshed entry that goes unread is dropped on a later pass.
        cache.put(read, bookings(), cache.generation());
        tokio::time::sleep(ttl + ttl / 2).await;
        assert_eq!(cache.sweep().dropped, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn stale_fetch_discarded_after_invalidation() {
        let cache = ViewCache::new(Duration::from_secs(300));
        let key = ViewKey::ServiceBookings(Ulid::new());
        let before = cache.generation();
        cache.invalidate(&ViewKey::Service(Ulid::new()));
        assert!(!cache.put(key, bookings(), before));
        assert!(!cache.contains(&key));
    }

    #[test]
    fn move_invalidates_both_days() {
        let sid = Ulid::new();
        let rid = Ulid::new();
        let cache = ViewCache::new(Duration::from_secs(300));
        let monday = ViewKey::DayBookings(sid, date("2025-03-03"));
        let tuesday = ViewKey::DayBookings(sid, date("2025-03-04"));
        let wednesday = ViewKey::DayBookings(sid, date("2025-03-05"));
        let other_service = ViewKey::ServiceBookings(Ulid::new());
        for key in [monday, tuesday, wednesday, other_service, ViewKey::Resources(sid)] {
            cache.put(key, bookings(), cache.generation());
        }

        cache.invalidate_change(
            sid,
            &Change::BookingMoved {
                id: Ulid::new(),
                from: (rid, date("2025-03-03")),
                to: (rid, date("2025-03-04")),
            },
        );

        assert!(!cache.contains(&monday));
        assert!(!cache.contains(&tuesday));
        assert!(!cache.contains(&ViewKey::Resources(sid)));
        assert!(cache.contains(&wednesday));
        assert!(cache.contains(&other_service));
    }

    #[test]
    fn special_day_change_drops_special_days() {
        let sid = Ulid::new();
        let keys = ViewKey::affected_by(sid, &Change::SpecialDayChanged { date: date("2025-12-24") });
        assert!(keys.contains(&ViewKey::SpecialDays(sid)));
        assert!(keys.contains(&ViewKey::DayBookings(sid, date("2025-12-24"))));
        let keys = ViewKey::affected_by(sid, &Change::ResourceChanged { id: Ulid::new() });
        assert!(!keys.contains(&ViewKey::SpecialDays(sid)));
    }
}
