use chrono::{Datelike, Duration, NaiveDate};

use crate::model::*;
use crate::time::{Minutes, Slots, Span, TimeOfDay, generate_slots};

use super::EngineError;

/// Working hours in force on one concrete date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSchedule {
    pub date: NaiveDate,
    pub weekday: DayIndex,
    pub is_working_day: bool,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub breaks: Vec<Break>,
    pub is_special: bool,
    pub special_reason: Option<String>,
}

impl EffectiveSchedule {
    /// Opening hours as a span; `None` on closed days or inverted hours.
    pub fn opening(&self) -> Option<Span> {
        (self.is_working_day && self.start_time < self.end_time)
            .then(|| Span::new(self.start_time.minutes(), self.end_time.minutes()))
    }

    /// Grid slots for the day. Closed days yield an empty sequence.
    pub fn slots(&self, step: Minutes) -> Result<Slots, EngineError> {
        let slots = generate_slots(self.start_time, self.end_time, step)?;
        if !self.is_working_day {
            return Ok(Slots::EMPTY);
        }
        Ok(slots)
    }

    pub fn in_break(&self, t: Minutes) -> bool {
        self.breaks
            .iter()
            .filter_map(Break::span)
            .any(|b| b.contains_instant(t))
    }
}

/// Monday is 0 and Sunday is 6.
pub fn weekday_index(date: NaiveDate) -> DayIndex {
    date.weekday().num_days_from_monday() as DayIndex
}

/// The Monday that starts `date`'s week.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(weekday_index(date)))
}

/// All seven dates of `date`'s Monday-start week.
pub fn week_of(date: NaiveDate) -> Vec<NaiveDate> {
    let monday = week_start(date);
    (0..i64::from(DAYS_PER_WEEK))
        .map(|d| monday + Duration::days(d))
        .collect()
}

/// Resolve the schedule for `date`.
///
/// A special day replaces the weekday's opening and closing times only; the
/// weekday's working-day flag and breaks still apply. Returns `None` when the
/// weekday has no schedule at all, which callers treat as closed.
pub fn resolve(
    weekly: &WeeklySchedule,
    special_days: &[SpecialDay],
    date: NaiveDate,
) -> Option<EffectiveSchedule> {
    let weekday = weekday_index(date);
    let day = weekly.day(weekday)?;

    let mut effective = EffectiveSchedule {
        date,
        weekday,
        is_working_day: day.is_working_day,
        start_time: day.start_time,
        end_time: day.end_time,
        breaks: day.breaks.clone(),
        is_special: false,
        special_reason: None,
    };

    if let Some(special) = special_days.iter().find(|s| s.date == date) {
        effective.start_time = special.start_time;
        effective.end_time = special.end_time;
        effective.is_special = true;
        effective.special_reason = Some(special.reason.clone());
    }

    Some(effective)
}
