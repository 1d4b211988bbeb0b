use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::limits::MINUTES_PER_DAY;

/// Minutes since local midnight. All times of day are expressed in this unit.
pub type Minutes = u32;

/// Parse `"HH:MM"` into minutes since midnight.
///
/// Hours may be one or two digits, minutes exactly two. Accepted range is
/// `00:00..=24:00`; `24:00` is only meaningful as a closing time.
pub fn time_to_minutes(hhmm: &str) -> Result<Minutes, EngineError> {
    let malformed = || EngineError::Format(format!("malformed time {hhmm:?}, expected HH:MM"));

    let (h, m) = hhmm.split_once(':').ok_or_else(malformed)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(malformed());
    }
    if !h.bytes().all(|b| b.is_ascii_digit()) || !m.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let hours: u32 = h.parse().map_err(|_| malformed())?;
    let minutes: u32 = m.parse().map_err(|_| malformed())?;
    if minutes > 59 || hours > 24 || (hours == 24 && minutes != 0) {
        return Err(EngineError::Format(format!("time {hhmm:?} out of range")));
    }
    Ok(hours * 60 + minutes)
}

/// Render minutes since midnight as zero-padded `"HH:MM"`.
///
/// Defined for `0..=1440`; an end time past midnight is an error rather than
/// wrapping to the next day.
pub fn minutes_to_time(minutes: Minutes) -> Result<String, EngineError> {
    if minutes > MINUTES_PER_DAY {
        return Err(EngineError::Format(format!(
            "{minutes} minutes is past the end of the day"
        )));
    }
    Ok(format_minutes(minutes))
}

/// Like [`minutes_to_time`] but without the range check. Hours may exceed 24,
/// e.g. a moved booking that would end at `25:30`. Diagnostics only.
pub fn format_minutes(minutes: Minutes) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

// ── TimeOfDay ─────────────────────────────────────────────────────

/// A wall-clock time within a day, serialized as `"HH:MM"`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(Minutes);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY);

    pub fn from_minutes(minutes: Minutes) -> Result<Self, EngineError> {
        if minutes > MINUTES_PER_DAY {
            return Err(EngineError::Format(format!(
                "{minutes} minutes is past the end of the day"
            )));
        }
        Ok(Self(minutes))
    }

    /// Shorthand for tests and constants. Panics on out-of-range input.
    pub const fn hm(hours: u32, minutes: u32) -> Self {
        assert!(minutes < 60 && hours * 60 + minutes <= MINUTES_PER_DAY);
        Self(hours * 60 + minutes)
    }

    pub fn minutes(self) -> Minutes {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        time_to_minutes(s).map(TimeOfDay)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> String {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_minutes(self.0))
    }
}

impl fmt::Debug for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeOfDay({self})")
    }
}

// ── Span ──────────────────────────────────────────────────────────

/// Half-open interval `[start, end)` in minutes since midnight.
///
/// `end` may exceed 1440 for computed, not-yet-validated end times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minutes,
    pub end: Minutes,
}

impl Span {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Build a span from two times, rejecting `start >= end`.
    pub fn between(start: TimeOfDay, end: TimeOfDay) -> Result<Self, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok(Self::new(start.minutes(), end.minutes()))
    }

    pub fn duration(&self) -> Minutes {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Minutes) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_minutes(self.start), format_minutes(self.end))
    }
}

// ── Slot generation ───────────────────────────────────────────────

/// A finite, restartable sequence of slot start times in `[start, end)`.
///
/// `Slots` is a cheap value; every call to [`Slots::iter`] starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slots {
    start: Minutes,
    end: Minutes,
    step: Minutes,
}

/// Lay out slots from `start` in `step`-minute increments, excluding `end`.
pub fn generate_slots(start: TimeOfDay, end: TimeOfDay, step: Minutes) -> Result<Slots, EngineError> {
    if step == 0 {
        return Err(EngineError::Config("slot step must be positive".into()));
    }
    Ok(Slots {
        start: start.minutes(),
        end: end.minutes(),
        step,
    })
}

/// Signed entry point for configuration coming from untyped documents.
pub fn generate_slots_signed(start: TimeOfDay, end: TimeOfDay, step: i64) -> Result<Slots, EngineError> {
    if step <= 0 {
        return Err(EngineError::Config(format!("slot step must be positive, got {step}")));
    }
    let step = Minutes::try_from(step)
        .map_err(|_| EngineError::Config(format!("slot step {step} too large")))?;
    generate_slots(start, end, step)
}

impl Slots {
    /// A sequence that yields nothing (closed days).
    pub const EMPTY: Slots = Slots { start: 0, end: 0, step: 1 };

    pub fn iter(&self) -> SlotIter {
        SlotIter {
            next: self.start,
            end: self.end,
            step: self.step,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Last slot of the sequence, if any.
    pub fn last(&self) -> Option<TimeOfDay> {
        if self.is_empty() {
            return None;
        }
        let n = (self.end - self.start - 1) / self.step;
        Some(TimeOfDay(self.start + n * self.step))
    }

    pub fn to_vec(&self) -> Vec<TimeOfDay> {
        self.iter().collect()
    }
}

impl IntoIterator for Slots {
    type Item = TimeOfDay;
    type IntoIter = SlotIter;

    fn into_iter(self) -> SlotIter {
        self.iter()
    }
}

impl IntoIterator for &Slots {
    type Item = TimeOfDay;
    type IntoIter = SlotIter;

    fn into_iter(self) -> SlotIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct SlotIter {
    next: Minutes,
    end: Minutes,
    step: Minutes,
}

impl Iterator for SlotIter {
    type Item = TimeOfDay;

    fn next(&mut self) -> Option<TimeOfDay> {
        if self.next >= self.end {
            return None;
        }
        let current = self.next;
        self.next = self.next.saturating_add(self.step);
        Some(TimeOfDay(current))
    }
}
