use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::{self, Collection};
use crate::time::{Span, TimeOfDay};

use super::conflict::{
    Proposal, check_duration, check_start_on_grid, end_for_move, resolve_end_time,
    validate_breaks, validate_day_schedule, validate_grid, validate_proposal,
};
use super::schedule::EffectiveSchedule;
use super::{Engine, EngineError};

// ── Request types ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub slot_steps: u32,
    pub max_duration: u32,
    /// `None` applies the default weekly template.
    pub schedule: Option<WeeklySchedule>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub name: Option<String>,
    pub slot_steps: Option<u32>,
    pub max_duration: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ResourcePatch {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub service_id: Ulid,
    pub resource_id: Ulid,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    /// Ignored when `start_time` is the last slot of the day.
    pub end_time: TimeOfDay,
    pub contact: Contact,
}

/// Edit of an existing booking or block. Unset fields are kept.
#[derive(Debug, Clone, Default)]
pub struct BookingPatch {
    pub contact: Option<Contact>,
    pub reason: Option<String>,
    pub start_time: Option<TimeOfDay>,
    pub end_time: Option<TimeOfDay>,
}

/// One reason and time range applied to several resources.
#[derive(Debug, Clone)]
pub struct BlockRequest {
    pub service_id: Ulid,
    pub resource_ids: Vec<Ulid>,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub reason: String,
    pub created_by: Option<String>,
}

/// Per-resource result of a bulk block.
#[derive(Debug)]
pub struct BlockOutcome {
    pub resource_id: Ulid,
    pub result: Result<Booking, EngineError>,
}

/// A validated move, ready to commit after user confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub booking_id: Ulid,
    pub service_id: Ulid,
    pub from: Proposal,
    pub to: Proposal,
}

// ── Field validation ──────────────────────────────────────────────

fn validate_name(name: &str, what: &'static str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Config(format!("{what} must not be empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn validate_weekly(schedule: &WeeklySchedule) -> Result<(), EngineError> {
    for day in 0..DAYS_PER_WEEK {
        if !schedule.days.contains_key(&day) {
            return Err(EngineError::Config(format!("weekday {day} has no schedule")));
        }
    }
    if let Some(extra) = schedule.days.keys().find(|&&d| d >= DAYS_PER_WEEK) {
        return Err(EngineError::Config(format!("weekday index {extra} out of range")));
    }
    schedule.days.values().try_for_each(validate_day_schedule)
}

fn validate_contact(contact: &Contact) -> Result<(), EngineError> {
    if contact.name.len() > MAX_NAME_LEN || contact.email.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("contact field too long"));
    }
    if contact.phone.as_ref().is_some_and(|p| p.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("contact field too long"));
    }
    if contact
        .additional_information
        .as_ref()
        .is_some_and(|n| n.len() > MAX_NOTES_LEN)
    {
        return Err(EngineError::LimitExceeded("additional information too long"));
    }
    Ok(())
}

fn validate_reason(reason: &str) -> Result<(), EngineError> {
    let len = reason.trim().chars().count();
    if len < MIN_REASON_LEN {
        return Err(EngineError::LimitExceeded("reason too short"));
    }
    if reason.len() > MAX_REASON_LEN {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(())
}

/// Rules a customer booking must meet on top of bounds and overlap. Returns
/// the resolved end time and span.
fn customer_span(
    service: &Service,
    schedule: &EffectiveSchedule,
    resource: &Resource,
    start: TimeOfDay,
    requested_end: TimeOfDay,
) -> Result<(TimeOfDay, Span), EngineError> {
    if !schedule.is_working_day {
        return Err(EngineError::DayClosed(schedule.date));
    }
    if !resource.is_active {
        return Err(EngineError::ResourceInactive(resource.id));
    }
    check_start_on_grid(schedule, service.slot_steps, start)?;
    let (end, last_slot) = resolve_end_time(schedule, service.slot_steps, start, requested_end)?;
    let span = Span::between(start, end)?;
    check_duration(&span, service.max_duration_minutes(), last_slot)?;
    Ok((end, span))
}

fn resource_of(resource: Resource, service_id: Ulid) -> Result<Resource, EngineError> {
    if resource.service_id != service_id {
        return Err(EngineError::NotFound(resource.id));
    }
    Ok(resource)
}

impl Engine {
    // ── Services ─────────────────────────────────────────────

    pub async fn create_service(&self, new: NewService) -> Result<Service, EngineError> {
        self.observe("create_service", async {
            validate_name(&new.name, "service name")?;
            validate_grid(new.slot_steps, new.max_duration)?;
            let schedule = new.schedule.unwrap_or_else(WeeklySchedule::default_template);
            validate_weekly(&schedule)?;

            let service = Service {
                id: Ulid::new(),
                name: new.name,
                slot_steps: new.slot_steps,
                max_duration: new.max_duration,
                schedule,
            };
            self.store
                .create_document(
                    Collection::Services,
                    service.id,
                    store::service_to_document(&service)?,
                )
                .await?;
            self.commit(service.id, Change::ServiceUpdated);
            info!(service_id = %service.id, name = %service.name, "service created");
            Ok(service)
        })
        .await
    }

    pub async fn update_service_settings(
        &self,
        service_id: Ulid,
        settings: ServiceSettings,
    ) -> Result<Service, EngineError> {
        self.observe("update_service_settings", async {
            let _guard = self.lock_service(service_id).await;
            let mut service = self.fetch_service(service_id).await?;
            if let Some(name) = settings.name {
                validate_name(&name, "service name")?;
                service.name = name;
            }
            service.slot_steps = settings.slot_steps.unwrap_or(service.slot_steps);
            service.max_duration = settings.max_duration.unwrap_or(service.max_duration);
            validate_grid(service.slot_steps, service.max_duration)?;

            self.write_service(&service).await?;
            self.commit(service_id, Change::ServiceUpdated);
            info!(%service_id, slot_steps = service.slot_steps, max_duration = service.max_duration, "service settings updated");
            Ok(service)
        })
        .await
    }

    /// Replace the whole weekly schedule. All seven days must be present.
    pub async fn update_schedule(
        &self,
        service_id: Ulid,
        schedule: WeeklySchedule,
    ) -> Result<Service, EngineError> {
        self.observe("update_schedule", async {
            validate_weekly(&schedule)?;
            let _guard = self.lock_service(service_id).await;
            let mut service = self.fetch_service(service_id).await?;
            service.schedule = schedule;

            self.write_service(&service).await?;
            self.commit(service_id, Change::ScheduleUpdated);
            info!(%service_id, "schedule updated");
            Ok(service)
        })
        .await
    }

    pub async fn set_breaks(
        &self,
        service_id: Ulid,
        weekday: DayIndex,
        breaks: Vec<Break>,
    ) -> Result<Service, EngineError> {
        self.observe("set_breaks", async {
            let _guard = self.lock_service(service_id).await;
            let mut service = self.fetch_service(service_id).await?;
            let day = service
                .schedule
                .day(weekday)
                .cloned()
                .ok_or(EngineError::ScheduleNotFound { service_id, weekday })?;
            validate_breaks(day.start_time, day.end_time, &breaks)?;
            service.schedule.set_day(weekday, day.with_breaks(breaks));

            self.write_service(&service).await?;
            self.commit(service_id, Change::ScheduleUpdated);
            info!(%service_id, weekday, "breaks updated");
            Ok(service)
        })
        .await
    }

    async fn write_service(&self, service: &Service) -> Result<(), EngineError> {
        self.store
            .update_document(
                Collection::Services,
                service.id,
                store::service_to_document(service)?,
            )
            .await?;
        Ok(())
    }

    // ── Special days ─────────────────────────────────────────

    /// Create or replace the override for `date`.
    pub async fn upsert_special_day(
        &self,
        service_id: Ulid,
        date: NaiveDate,
        start_time: TimeOfDay,
        end_time: TimeOfDay,
        reason: String,
    ) -> Result<SpecialDay, EngineError> {
        self.observe("upsert_special_day", async {
            Span::between(start_time, end_time)?;
            if reason.len() > MAX_REASON_LEN {
                return Err(EngineError::LimitExceeded("reason too long"));
            }
            let _guard = self.lock_service(service_id).await;
            self.fetch_service(service_id).await?;

            let existing = self.fetch_special_days(service_id).await?;
            let day = SpecialDay {
                id: existing
                    .iter()
                    .find(|d| d.date == date)
                    .map_or_else(Ulid::new, |d| d.id),
                service_id,
                date,
                start_time,
                end_time,
                reason,
            };
            let body = store::special_day_to_document(&day)?;
            if existing.iter().any(|d| d.id == day.id) {
                self.store
                    .update_document(Collection::SpecialDays, day.id, body)
                    .await?;
            } else {
                self.store
                    .create_document(Collection::SpecialDays, day.id, body)
                    .await?;
            }
            self.commit(service_id, Change::SpecialDayChanged { date });
            info!(%service_id, %date, hours = %format!("{start_time}-{end_time}"), "special day set");
            Ok(day)
        })
        .await
    }

    pub async fn remove_special_day(&self, service_id: Ulid, id: Ulid) -> Result<(), EngineError> {
        self.observe("remove_special_day", async {
            let _guard = self.lock_service(service_id).await;
            let day = self
                .fetch_special_days(service_id)
                .await?
                .into_iter()
                .find(|d| d.id == id)
                .ok_or(EngineError::NotFound(id))?;
            self.store.delete_document(Collection::SpecialDays, id).await?;
            self.commit(service_id, Change::SpecialDayChanged { date: day.date });
            info!(%service_id, date = %day.date, "special day removed");
            Ok(())
        })
        .await
    }

    // ── Resources ────────────────────────────────────────────

    pub async fn create_resource(&self, service_id: Ulid, name: String) -> Result<Resource, EngineError> {
        self.observe("create_resource", async {
            validate_name(&name, "resource name")?;
            let _guard = self.lock_service(service_id).await;
            self.fetch_service(service_id).await?;
            if self.fetch_resources(service_id).await?.len() >= MAX_RESOURCES_PER_SERVICE {
                return Err(EngineError::LimitExceeded("too many resources on service"));
            }

            let resource = Resource {
                id: Ulid::new(),
                service_id,
                name,
                is_active: true,
            };
            self.store
                .create_document(
                    Collection::ServiceResources,
                    resource.id,
                    store::resource_to_document(&resource)?,
                )
                .await?;
            self.commit(service_id, Change::ResourceChanged { id: resource.id });
            info!(%service_id, resource_id = %resource.id, name = %resource.name, "resource created");
            Ok(resource)
        })
        .await
    }

    pub async fn update_resource(&self, id: Ulid, patch: ResourcePatch) -> Result<Resource, EngineError> {
        self.observe("update_resource", async {
            let service_id = self.fetch_resource(id).await?.service_id;
            let _guard = self.lock_service(service_id).await;
            let mut resource = self.fetch_resource(id).await?;
            if let Some(name) = patch.name {
                validate_name(&name, "resource name")?;
                resource.name = name;
            }
            resource.is_active = patch.is_active.unwrap_or(resource.is_active);

            self.store
                .update_document(
                    Collection::ServiceResources,
                    id,
                    store::resource_to_document(&resource)?,
                )
                .await?;
            self.commit(service_id, Change::ResourceChanged { id });
            info!(%service_id, resource_id = %id, active = resource.is_active, "resource updated");
            Ok(resource)
        })
        .await
    }

    /// Bookings on the resource stay in the store but no longer render.
    pub async fn delete_resource(&self, id: Ulid) -> Result<(), EngineError> {
        self.observe("delete_resource", async {
            let service_id = self.fetch_resource(id).await?.service_id;
            let _guard = self.lock_service(service_id).await;
            self.store
                .delete_document(Collection::ServiceResources, id)
                .await?;
            self.commit(service_id, Change::ResourceChanged { id });
            info!(%service_id, resource_id = %id, "resource deleted");
            Ok(())
        })
        .await
    }

    // ── Bookings ─────────────────────────────────────────────

    pub async fn create_booking(&self, new: NewBooking) -> Result<Booking, EngineError> {
        self.observe("create_booking", async {
            validate_contact(&new.contact)?;
            let service_id = new.service_id;
            let _guard = self.lock_service(service_id).await;

            let service = self.fetch_service(service_id).await?;
            let resource = resource_of(self.fetch_resource(new.resource_id).await?, service_id)?;
            let special_days = self.fetch_special_days(service_id).await?;
            let schedule = Self::require_schedule(&service, &special_days, new.date)?;
            let (end_time, span) =
                customer_span(&service, &schedule, &resource, new.start_time, new.end_time)?;

            let proposal = Proposal {
                resource_id: resource.id,
                date: new.date,
                span,
            };
            let existing = self.fetch_bookings_for_date(service_id, new.date).await?;
            validate_proposal(&proposal, &existing, &schedule, None)?;

            let booking = Booking {
                id: Ulid::new(),
                service_id,
                resource_id: resource.id,
                date: new.date,
                start_time: new.start_time,
                end_time,
                kind: BookingKind::Booking(new.contact),
            };
            self.store
                .create_document(
                    Collection::Bookings,
                    booking.id,
                    store::booking_to_document(&booking)?,
                )
                .await?;
            self.commit(
                service_id,
                Change::BookingCreated {
                    id: booking.id,
                    resource_id: booking.resource_id,
                    date: booking.date,
                },
            );
            info!(booking_id = %booking.id, resource_id = %booking.resource_id, date = %booking.date, span = %span, "booking created");
            Ok(booking)
        })
        .await
    }

    /// Validate a move without writing it.
    pub async fn preview_move(
        &self,
        booking_id: Ulid,
        new_resource_id: Ulid,
        new_date: NaiveDate,
        new_start: TimeOfDay,
    ) -> Result<MovePlan, EngineError> {
        let booking = self.fetch_booking(booking_id).await?;
        self.plan_move(&booking, new_resource_id, new_date, new_start)
            .await
    }

    /// Move a booking, keeping its duration. On rejection nothing changes.
    pub async fn move_booking(
        &self,
        booking_id: Ulid,
        new_resource_id: Ulid,
        new_date: NaiveDate,
        new_start: TimeOfDay,
    ) -> Result<Booking, EngineError> {
        self.observe("move_booking", async {
            let service_id = self.fetch_booking(booking_id).await?.service_id;
            let _guard = self.lock_service(service_id).await;

            let mut booking = self.fetch_booking(booking_id).await?;
            let plan = self
                .plan_move(&booking, new_resource_id, new_date, new_start)
                .await?;

            booking.resource_id = plan.to.resource_id;
            booking.date = plan.to.date;
            booking.start_time = new_start;
            booking.end_time = TimeOfDay::from_minutes(plan.to.span.end)?;
            self.store
                .update_document(
                    Collection::Bookings,
                    booking_id,
                    store::booking_to_document(&booking)?,
                )
                .await?;
            self.commit(
                service_id,
                Change::BookingMoved {
                    id: booking_id,
                    from: (plan.from.resource_id, plan.from.date),
                    to: (plan.to.resource_id, plan.to.date),
                },
            );
            info!(%booking_id, from = %plan.from.span, to = %plan.to.span, date = %plan.to.date, "booking moved");
            Ok(booking)
        })
        .await
    }

    /// Commit a plan from [`Engine::preview_move`]. Validation runs again
    /// under the service lock, so a plan that went stale is rejected.
    pub async fn apply_move(&self, plan: &MovePlan) -> Result<Booking, EngineError> {
        let new_start = TimeOfDay::from_minutes(plan.to.span.start)?;
        self.move_booking(plan.booking_id, plan.to.resource_id, plan.to.date, new_start)
            .await
    }

    async fn plan_move(
        &self,
        booking: &Booking,
        new_resource_id: Ulid,
        new_date: NaiveDate,
        new_start: TimeOfDay,
    ) -> Result<MovePlan, EngineError> {
        let service = self.fetch_service(booking.service_id).await?;
        let resource = resource_of(self.fetch_resource(new_resource_id).await?, service.id)?;
        let special_days = self.fetch_special_days(service.id).await?;
        let schedule = Self::require_schedule(&service, &special_days, new_date)?;
        if !booking.is_block() {
            if !schedule.is_working_day {
                return Err(EngineError::DayClosed(new_date));
            }
            if !resource.is_active {
                return Err(EngineError::ResourceInactive(resource.id));
            }
            check_start_on_grid(&schedule, service.slot_steps, new_start)?;
        }

        let span = end_for_move(booking, new_start);
        if span.start >= span.end {
            return Err(EngineError::InvalidRange {
                start: booking.start_time,
                end: booking.end_time,
            });
        }
        let to = Proposal {
            resource_id: resource.id,
            date: new_date,
            span,
        };
        let existing = self.fetch_bookings_for_date(service.id, new_date).await?;
        validate_proposal(&to, &existing, &schedule, Some(booking.id))?;

        Ok(MovePlan {
            booking_id: booking.id,
            service_id: service.id,
            from: Proposal {
                resource_id: booking.resource_id,
                date: booking.date,
                span: booking.span(),
            },
            to,
        })
    }

    /// Edit details or times. Times are re-validated only when they change.
    pub async fn update_booking(&self, booking_id: Ulid, patch: BookingPatch) -> Result<Booking, EngineError> {
        self.observe("update_booking", async {
            let service_id = self.fetch_booking(booking_id).await?.service_id;
            let _guard = self.lock_service(service_id).await;
            let mut booking = self.fetch_booking(booking_id).await?;

            match (&mut booking.kind, patch.contact, patch.reason) {
                (_, Some(_), Some(_)) => {
                    return Err(EngineError::Config("contact and reason are mutually exclusive".into()));
                }
                (BookingKind::Booking(contact), Some(new), None) => {
                    validate_contact(&new)?;
                    *contact = new;
                }
                (BookingKind::Block { reason, .. }, None, Some(new)) => {
                    validate_reason(&new)?;
                    *reason = new;
                }
                (_, None, None) => {}
                (BookingKind::Booking(_), None, Some(_)) => {
                    return Err(EngineError::Config("customer bookings have no reason".into()));
                }
                (BookingKind::Block { .. }, Some(_), None) => {
                    return Err(EngineError::Config("blocks have no contact details".into()));
                }
            }

            let start = patch.start_time.unwrap_or(booking.start_time);
            let requested_end = patch.end_time.unwrap_or(booking.end_time);
            if start != booking.start_time || requested_end != booking.end_time {
                let service = self.fetch_service(service_id).await?;
                let resource = self.fetch_resource(booking.resource_id).await?;
                let special_days = self.fetch_special_days(service_id).await?;
                let schedule = Self::require_schedule(&service, &special_days, booking.date)?;
                let (end, span) = if booking.is_block() {
                    (requested_end, Span::between(start, requested_end)?)
                } else {
                    customer_span(&service, &schedule, &resource, start, requested_end)?
                };
                let proposal = Proposal {
                    resource_id: booking.resource_id,
                    date: booking.date,
                    span,
                };
                let existing = self.fetch_bookings_for_date(service_id, booking.date).await?;
                validate_proposal(&proposal, &existing, &schedule, Some(booking_id))?;
                booking.start_time = start;
                booking.end_time = end;
            }

            self.store
                .update_document(
                    Collection::Bookings,
                    booking_id,
                    store::booking_to_document(&booking)?,
                )
                .await?;
            self.commit(
                service_id,
                Change::BookingUpdated {
                    id: booking_id,
                    date: booking.date,
                },
            );
            info!(%booking_id, span = %booking.span(), "booking updated");
            Ok(booking)
        })
        .await
    }

    /// Block the same range on several resources.
    ///
    /// Request-level problems fail the whole call. Otherwise each resource is
    /// validated and written on its own, so one conflict does not stop the
    /// rest.
    pub async fn block_resources(&self, request: BlockRequest) -> Result<Vec<BlockOutcome>, EngineError> {
        self.observe("block_resources", async {
            if request.resource_ids.is_empty() {
                return Err(EngineError::Config("no resources selected".into()));
            }
            if request.resource_ids.len() > self.config.max_block_resources {
                return Err(EngineError::LimitExceeded("too many resources in one block request"));
            }
            validate_reason(&request.reason)?;
            let span = Span::between(request.start_time, request.end_time)?;

            let service_id = request.service_id;
            let _guard = self.lock_service(service_id).await;
            let service = self.fetch_service(service_id).await?;
            let special_days = self.fetch_special_days(service_id).await?;
            let schedule = Self::require_schedule(&service, &special_days, request.date)?;
            let resources = self.fetch_resources(service_id).await?;
            let existing = self.fetch_bookings_for_date(service_id, request.date).await?;

            let mut seen = HashSet::new();
            let mut outcomes = Vec::with_capacity(request.resource_ids.len());
            let mut created = Vec::new();
            for resource_id in request.resource_ids.iter().copied() {
                if !seen.insert(resource_id) {
                    continue;
                }
                let result = self
                    .place_block(&request, resource_id, span, &resources, &existing, &schedule)
                    .await;
                if let Ok(block) = &result {
                    created.push(block.id);
                }
                outcomes.push(BlockOutcome { resource_id, result });
            }

            if !created.is_empty() {
                info!(%service_id, date = %request.date, %span, count = created.len(), "blocks created");
                self.commit(
                    service_id,
                    Change::BlocksCreated {
                        ids: created,
                        date: request.date,
                    },
                );
            }
            Ok(outcomes)
        })
        .await
    }

    async fn place_block(
        &self,
        request: &BlockRequest,
        resource_id: Ulid,
        span: Span,
        resources: &[Resource],
        existing: &[Booking],
        schedule: &EffectiveSchedule,
    ) -> Result<Booking, EngineError> {
        if !resources.iter().any(|r| r.id == resource_id) {
            return Err(EngineError::NotFound(resource_id));
        }
        let proposal = Proposal {
            resource_id,
            date: request.date,
            span,
        };
        validate_proposal(&proposal, existing, schedule, None)?;

        let block = Booking {
            id: Ulid::new(),
            service_id: request.service_id,
            resource_id,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            kind: BookingKind::Block {
                reason: request.reason.clone(),
                created_by: request.created_by.clone(),
            },
        };
        self.store
            .create_document(Collection::Bookings, block.id, store::booking_to_document(&block)?)
            .await?;
        Ok(block)
    }

    pub async fn cancel_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        self.observe("cancel_booking", async {
            let service_id = self.fetch_booking(booking_id).await?.service_id;
            let _guard = self.lock_service(service_id).await;
            let booking = self.fetch_booking(booking_id).await?;
            self.store
                .delete_document(Collection::Bookings, booking_id)
                .await?;
            self.commit(
                service_id,
                Change::BookingCancelled {
                    id: booking_id,
                    date: booking.date,
                },
            );
            info!(%booking_id, date = %booking.date, "booking cancelled");
            Ok(booking)
        })
        .await
    }
}
