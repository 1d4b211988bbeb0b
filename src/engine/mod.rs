mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod schedule;

pub use availability::{
    booking_slots, classify, day_view, free_spans, merge_overlapping, occupant, subtract_intervals,
    time_slots,
};
pub use conflict::{
    Proposal, check_bounds, check_duration, check_no_conflict, check_start_on_grid, end_for_move,
    end_time_options, is_last_slot, resolve_end_time, validate_breaks, validate_day_schedule,
    validate_grid, validate_proposal,
};
pub use error::{ConflictInfo, EngineError};
pub use mutations::{
    BlockOutcome, BlockRequest, BookingPatch, MovePlan, NewBooking, NewService, ResourcePatch,
    ServiceSettings,
};
pub use schedule::{EffectiveSchedule, resolve, week_of, week_start, weekday_index};

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::cache::{CachedView, ViewCache, ViewKey};
use crate::config::EngineConfig;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{
    MUTATION_DURATION_SECONDS, MUTATIONS_TOTAL, REJECTIONS_TOTAL, STORE_ERRORS_TOTAL, status_label,
};
use crate::store::{self, Collection, DocumentStore, Order, Query};

/// Availability and booking engine over an external document store.
///
/// Reads go through a TTL cache. Writes for one service are serialized by a
/// per-service lock and always validate against fresh store reads.
pub struct Engine {
    store: Arc<dyn DocumentStore>,
    pub cache: ViewCache,
    pub notify: Arc<NotifyHub>,
    locks: DashMap<Ulid, Arc<Mutex<()>>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn DocumentStore>, notify: Arc<NotifyHub>, config: EngineConfig) -> Self {
        Self {
            store,
            cache: ViewCache::new(config.cache_ttl),
            notify,
            locks: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Serialize mutations on one service.
    pub(super) async fn lock_service(&self, service_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(service_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Invalidate affected views, then tell subscribers.
    pub(super) fn commit(&self, service_id: Ulid, change: Change) {
        self.cache.invalidate_change(service_id, &change);
        self.notify.send(service_id, &change);
    }

    /// Count, time and log one mutation.
    pub(super) async fn observe<T, F>(&self, op: &'static str, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let started = Instant::now();
        let result = fut.await;
        metrics::counter!(MUTATIONS_TOTAL, "op" => op, "status" => status_label(&result)).increment(1);
        metrics::histogram!(MUTATION_DURATION_SECONDS, "op" => op)
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(_) => {}
            Err(e) if e.is_rejection() => {
                metrics::counter!(REJECTIONS_TOTAL, "op" => op, "reason" => e.kind()).increment(1);
                debug!(op, reason = e.kind(), "rejected: {e}");
            }
            Err(e) => {
                metrics::counter!(STORE_ERRORS_TOTAL, "op" => op).increment(1);
                warn!(op, "failed: {e}");
            }
        }
        result
    }

    // ── Fresh reads (bypass the cache) ───────────────────────

    pub(super) async fn fetch_service(&self, id: Ulid) -> Result<Service, EngineError> {
        let doc = self
            .store
            .get_document(Collection::Services, id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        store::service_from_document(&doc)
    }

    pub(super) async fn fetch_resource(&self, id: Ulid) -> Result<Resource, EngineError> {
        let doc = self
            .store
            .get_document(Collection::ServiceResources, id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        store::resource_from_document(&doc)
    }

    pub(super) async fn fetch_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let doc = self
            .store
            .get_document(Collection::Bookings, id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        store::booking_from_document(&doc)
    }

    pub(super) async fn fetch_resources(&self, service_id: Ulid) -> Result<Vec<Resource>, EngineError> {
        let query = Query::new()
            .eq("service_id", service_id.to_string())
            .order_by("name", Order::Asc);
        self.store
            .list_documents(Collection::ServiceResources, &query)
            .await?
            .iter()
            .map(store::resource_from_document)
            .collect()
    }

    pub(super) async fn fetch_special_days(&self, service_id: Ulid) -> Result<Vec<SpecialDay>, EngineError> {
        let query = Query::new()
            .eq("service_id", service_id.to_string())
            .order_by("date", Order::Asc);
        self.store
            .list_documents(Collection::SpecialDays, &query)
            .await?
            .iter()
            .map(store::special_day_from_document)
            .collect()
    }

    pub(super) async fn fetch_bookings_for_date(
        &self,
        service_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, EngineError> {
        let query = Query::new()
            .eq("service_id", service_id.to_string())
            .eq("date", date.to_string())
            .order_by("start_time", Order::Asc);
        self.fetch_bookings(&query).await
    }

    pub(super) async fn fetch_bookings_for_service(&self, service_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let query = Query::new()
            .eq("service_id", service_id.to_string())
            .order_by("date", Order::Asc);
        let mut bookings = self.fetch_bookings(&query).await?;
        bookings.sort_by_key(|b| (b.date, b.start_time, b.id));
        Ok(bookings)
    }

    async fn fetch_bookings(&self, query: &Query) -> Result<Vec<Booking>, EngineError> {
        self.store
            .list_documents(Collection::Bookings, query)
            .await?
            .iter()
            .map(store::booking_from_document)
            .collect()
    }

    /// Read whatever `key` names straight from the store.
    pub(crate) async fn fetch_view(&self, key: ViewKey) -> Result<CachedView, EngineError> {
        Ok(match key {
            ViewKey::Service(id) => CachedView::Service(Arc::new(self.fetch_service(id).await?)),
            ViewKey::ServiceBookings(id) => {
                CachedView::Bookings(Arc::new(self.fetch_bookings_for_service(id).await?))
            }
            ViewKey::DayBookings(id, date) => {
                CachedView::Bookings(Arc::new(self.fetch_bookings_for_date(id, date).await?))
            }
            ViewKey::Resources(id) => CachedView::Resources(Arc::new(self.fetch_resources(id).await?)),
            ViewKey::SpecialDays(id) => {
                CachedView::SpecialDays(Arc::new(self.fetch_special_days(id).await?))
            }
        })
    }

    // ── Cached reads ─────────────────────────────────────────

    async fn load_view(&self, key: ViewKey) -> Result<CachedView, EngineError> {
        if let Some(view) = self.cache.get(&key) {
            return Ok(view);
        }
        let generation = self.cache.generation();
        let view = self.fetch_view(key).await?;
        self.cache.put(key, view.clone(), generation);
        Ok(view)
    }

    pub(super) async fn cached_service(&self, id: Ulid) -> Result<Arc<Service>, EngineError> {
        match self.load_view(ViewKey::Service(id)).await? {
            CachedView::Service(s) => Ok(s),
            _ => unreachable!("service key always yields a service view"),
        }
    }

    pub(super) async fn cached_bookings(&self, key: ViewKey) -> Result<Arc<Vec<Booking>>, EngineError> {
        match self.load_view(key).await? {
            CachedView::Bookings(b) => Ok(b),
            _ => unreachable!("booking keys always yield a bookings view"),
        }
    }

    pub(super) async fn cached_resources(&self, service_id: Ulid) -> Result<Arc<Vec<Resource>>, EngineError> {
        match self.load_view(ViewKey::Resources(service_id)).await? {
            CachedView::Resources(r) => Ok(r),
            _ => unreachable!("resources key always yields a resources view"),
        }
    }

    pub(super) async fn cached_special_days(
        &self,
        service_id: Ulid,
    ) -> Result<Arc<Vec<SpecialDay>>, EngineError> {
        match self.load_view(ViewKey::SpecialDays(service_id)).await? {
            CachedView::SpecialDays(d) => Ok(d),
            _ => unreachable!("special-days key always yields a special-days view"),
        }
    }

    /// Resolve a date's schedule for a mutation; a missing weekday is an error.
    pub(super) fn require_schedule(
        service: &Service,
        special_days: &[SpecialDay],
        date: NaiveDate,
    ) -> Result<EffectiveSchedule, EngineError> {
        resolve(&service.schedule, special_days, date).ok_or(EngineError::ScheduleNotFound {
            service_id: service.id,
            weekday: weekday_index(date),
        })
    }
}
