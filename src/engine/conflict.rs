use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::{
    MAX_BREAKS_PER_DAY, MAX_MAX_DURATION_HOURS, MAX_SLOT_STEP_MINUTES, MIN_MAX_DURATION_HOURS,
    MIN_SLOT_STEP_MINUTES,
};
use crate::model::*;
use crate::time::{Minutes, Span, TimeOfDay};

use super::error::ConflictInfo;
use super::schedule::EffectiveSchedule;
use super::EngineError;

/// A candidate placement for a booking or block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposal {
    pub resource_id: Ulid,
    pub date: NaiveDate,
    pub span: Span,
}

/// Bounds then overlap. `exclude` is the booking being moved or edited.
pub fn validate_proposal(
    proposal: &Proposal,
    existing: &[Booking],
    schedule: &EffectiveSchedule,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    check_bounds(&proposal.span, schedule)?;
    check_no_conflict(proposal, existing, exclude)
}

/// The span must start at or after opening and end by closing. Grid alignment
/// of customer starts is [`check_start_on_grid`].
pub fn check_bounds(span: &Span, schedule: &EffectiveSchedule) -> Result<(), EngineError> {
    if span.start < schedule.start_time.minutes() {
        return Err(EngineError::OffGrid { start: span.start });
    }
    if span.end > schedule.end_time.minutes() {
        return Err(EngineError::OutsideHours {
            closing_time: schedule.end_time,
            computed_end: span.end,
        });
    }
    Ok(())
}

/// Reject on the earliest-starting overlapping booking or block.
pub fn check_no_conflict(
    proposal: &Proposal,
    existing: &[Booking],
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    let hit = existing
        .iter()
        .filter(|b| b.resource_id == proposal.resource_id && b.date == proposal.date)
        .filter(|b| Some(b.id) != exclude)
        .filter(|b| b.span().overlaps(&proposal.span))
        .min_by_key(|b| (b.start_time, b.id));

    match hit {
        Some(b) => Err(EngineError::Conflict(Box::new(ConflictInfo {
            id: b.id,
            name: b.label().to_string(),
            span: b.span(),
            is_block: b.is_block(),
        }))),
        None => Ok(()),
    }
}

/// A customer booking must start on a slot of the day's grid that is not
/// inside a break. Such cells are the only ones a booking can render on.
pub fn check_start_on_grid(
    schedule: &EffectiveSchedule,
    step: Minutes,
    start: TimeOfDay,
) -> Result<(), EngineError> {
    let on_grid = schedule.slots(step)?.iter().any(|slot| slot == start);
    if !on_grid || schedule.in_break(start.minutes()) {
        return Err(EngineError::OffGrid {
            start: start.minutes(),
        });
    }
    Ok(())
}

// ── End-time derivation ───────────────────────────────────────────

/// A moved booking keeps its duration. The end may land past midnight; the
/// bounds check reports it.
pub fn end_for_move(original: &Booking, new_start: TimeOfDay) -> Span {
    let duration = original.end_time.minutes().saturating_sub(original.start_time.minutes());
    Span {
        start: new_start.minutes(),
        end: new_start.minutes() + duration,
    }
}

/// True when `start` is the final grid slot of the day.
pub fn is_last_slot(schedule: &EffectiveSchedule, step: Minutes, start: TimeOfDay) -> Result<bool, EngineError> {
    Ok(schedule.slots(step)?.last() == Some(start))
}

/// End times a user may pick for a booking starting at `start`.
///
/// Grid slots strictly after `start` and at most `max_duration_hours` away.
/// From the last slot of the day the only choice is the closing time.
pub fn end_time_options(
    schedule: &EffectiveSchedule,
    step: Minutes,
    start: TimeOfDay,
    max_duration_hours: u32,
) -> Result<Vec<TimeOfDay>, EngineError> {
    let slots = schedule.slots(step)?;
    if slots.is_empty() {
        return Ok(Vec::new());
    }
    if slots.last() == Some(start) {
        return Ok(vec![schedule.end_time]);
    }
    let max = max_duration_hours.saturating_mul(60);
    Ok(slots
        .iter()
        .filter(|t| *t > start && t.minutes() - start.minutes() <= max)
        .collect())
}

/// Apply the last-slot rule: from the final slot the end is forced to closing.
/// Returns the end and whether the rule fired.
pub fn resolve_end_time(
    schedule: &EffectiveSchedule,
    step: Minutes,
    start: TimeOfDay,
    requested_end: TimeOfDay,
) -> Result<(TimeOfDay, bool), EngineError> {
    if is_last_slot(schedule, step, start)? {
        return Ok((schedule.end_time, true));
    }
    Ok((requested_end, false))
}

pub fn check_duration(span: &Span, max_minutes: Minutes, last_slot: bool) -> Result<(), EngineError> {
    if !last_slot && span.duration() > max_minutes {
        return Err(EngineError::DurationExceeded {
            max_minutes,
            requested_minutes: span.duration(),
        });
    }
    Ok(())
}

// ── Schedule validation ───────────────────────────────────────────

pub fn validate_grid(slot_steps: u32, max_duration: u32) -> Result<(), EngineError> {
    if !(MIN_SLOT_STEP_MINUTES..=MAX_SLOT_STEP_MINUTES).contains(&slot_steps) {
        return Err(EngineError::Config(format!(
            "slot step must be between {MIN_SLOT_STEP_MINUTES} and {MAX_SLOT_STEP_MINUTES} minutes, got {slot_steps}"
        )));
    }
    if !(MIN_MAX_DURATION_HOURS..=MAX_MAX_DURATION_HOURS).contains(&max_duration) {
        return Err(EngineError::Config(format!(
            "max duration must be between {MIN_MAX_DURATION_HOURS} and {MAX_MAX_DURATION_HOURS} hours, got {max_duration}"
        )));
    }
    Ok(())
}

/// Breaks must be non-empty intervals, in order, non-overlapping (touching is
/// fine) and inside `[start_time, end_time]`.
pub fn validate_breaks(
    start_time: TimeOfDay,
    end_time: TimeOfDay,
    breaks: &[Break],
) -> Result<(), EngineError> {
    if breaks.len() > MAX_BREAKS_PER_DAY {
        return Err(EngineError::LimitExceeded("too many breaks in one day"));
    }
    let mut previous_end: Option<TimeOfDay> = None;
    for b in breaks {
        if b.start >= b.end {
            return Err(EngineError::InvalidBreaks(format!(
                "break {}-{} is empty or inverted",
                b.start, b.end
            )));
        }
        if b.start < start_time || b.end > end_time {
            return Err(EngineError::InvalidBreaks(format!(
                "break {}-{} is outside {start_time}-{end_time}",
                b.start, b.end
            )));
        }
        if let Some(prev) = previous_end
            && b.start < prev
        {
            return Err(EngineError::InvalidBreaks(format!(
                "break {}-{} overlaps or precedes the break ending at {prev}",
                b.start, b.end
            )));
        }
        previous_end = Some(b.end);
    }
    Ok(())
}

pub fn validate_day_schedule(day: &DaySchedule) -> Result<(), EngineError> {
    if day.start_time >= day.end_time {
        return Err(EngineError::InvalidRange {
            start: day.start_time,
            end: day.end_time,
        });
    }
    validate_breaks(day.start_time, day.end_time, &day.breaks)
}
