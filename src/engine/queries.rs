use chrono::NaiveDate;
use ulid::Ulid;

use crate::cache::ViewKey;
use crate::model::*;
use crate::time::{Span, TimeOfDay};

use super::availability;
use super::conflict;
use super::schedule::{self, EffectiveSchedule};
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_service(&self, service_id: Ulid) -> Result<Service, EngineError> {
        Ok(self.cached_service(service_id).await?.as_ref().clone())
    }

    pub async fn list_resources(&self, service_id: Ulid) -> Result<Vec<Resource>, EngineError> {
        self.cached_service(service_id).await?;
        Ok(self.cached_resources(service_id).await?.to_vec())
    }

    pub async fn list_special_days(&self, service_id: Ulid) -> Result<Vec<SpecialDay>, EngineError> {
        self.cached_service(service_id).await?;
        Ok(self.cached_special_days(service_id).await?.to_vec())
    }

    /// The schedule in force on `date`, special-day overrides applied.
    pub async fn effective_schedule(
        &self,
        service_id: Ulid,
        date: NaiveDate,
    ) -> Result<EffectiveSchedule, EngineError> {
        let service = self.cached_service(service_id).await?;
        let special_days = self.cached_special_days(service_id).await?;
        Self::require_schedule(&service, &special_days, date)
    }

    /// Like [`Engine::effective_schedule`] but an unscheduled weekday is
    /// `None` rather than an error.
    async fn view_schedule(
        &self,
        service: &Service,
        date: NaiveDate,
    ) -> Result<Option<EffectiveSchedule>, EngineError> {
        let special_days = self.cached_special_days(service.id).await?;
        Ok(schedule::resolve(&service.schedule, &special_days, date))
    }

    pub async fn time_slots(&self, service_id: Ulid, date: NaiveDate) -> Result<Vec<TimeOfDay>, EngineError> {
        let service = self.cached_service(service_id).await?;
        let schedule = self.view_schedule(&service, date).await?;
        availability::time_slots(schedule.as_ref(), service.slot_steps)
    }

    pub async fn bookings_for_date(&self, service_id: Ulid, date: NaiveDate) -> Result<Vec<Booking>, EngineError> {
        Ok(self
            .cached_bookings(ViewKey::DayBookings(service_id, date))
            .await?
            .to_vec())
    }

    pub async fn bookings_for_service(&self, service_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        Ok(self
            .cached_bookings(ViewKey::ServiceBookings(service_id))
            .await?
            .to_vec())
    }

    pub async fn day_view(&self, service_id: Ulid, date: NaiveDate) -> Result<DayView, EngineError> {
        let service = self.cached_service(service_id).await?;
        let schedule = self.view_schedule(&service, date).await?;
        let resources = self.cached_resources(service_id).await?;
        let bookings = self
            .cached_bookings(ViewKey::DayBookings(service_id, date))
            .await?;
        availability::day_view(date, schedule.as_ref(), service.slot_steps, &resources, &bookings)
    }

    /// Monday-start week containing `date`, classified against the
    /// service-wide booking set.
    pub async fn week_view(&self, service_id: Ulid, date: NaiveDate) -> Result<WeekView, EngineError> {
        let service = self.cached_service(service_id).await?;
        let special_days = self.cached_special_days(service_id).await?;
        let resources = self.cached_resources(service_id).await?;
        let bookings = self
            .cached_bookings(ViewKey::ServiceBookings(service_id))
            .await?;

        let days = schedule::week_of(date)
            .into_iter()
            .map(|day| {
                let effective = schedule::resolve(&service.schedule, &special_days, day);
                availability::day_view(day, effective.as_ref(), service.slot_steps, &resources, &bookings)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(WeekView {
            week_start: schedule::week_start(date),
            days,
        })
    }

    pub async fn end_time_options(
        &self,
        service_id: Ulid,
        date: NaiveDate,
        start: TimeOfDay,
    ) -> Result<Vec<TimeOfDay>, EngineError> {
        let service = self.cached_service(service_id).await?;
        match self.view_schedule(&service, date).await? {
            Some(s) => conflict::end_time_options(&s, service.slot_steps, start, service.max_duration),
            None => Ok(Vec::new()),
        }
    }

    pub async fn free_spans(
        &self,
        service_id: Ulid,
        resource_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Span>, EngineError> {
        let service = self.cached_service(service_id).await?;
        let resources = self.cached_resources(service_id).await?;
        let resource = resources
            .iter()
            .find(|r| r.id == resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        if !resource.is_active {
            return Ok(Vec::new());
        }
        let schedule = self.view_schedule(&service, date).await?;
        let bookings = self
            .cached_bookings(ViewKey::DayBookings(service_id, date))
            .await?;
        Ok(availability::free_spans(schedule.as_ref(), resource_id, &bookings))
    }
}
