use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::time::{Span, TimeOfDay};

/// Day index within a week: 0 is Monday, 6 is Sunday.
pub type DayIndex = u8;

pub const DAYS_PER_WEEK: DayIndex = 7;

// ── Schedule configuration ────────────────────────────────────────

/// A pause within a working day, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Break {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Break {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    /// `None` for inverted breaks stored by older clients.
    pub fn span(&self) -> Option<Span> {
        (self.start < self.end).then(|| Span::new(self.start.minutes(), self.end.minutes()))
    }
}

/// Recurring hours for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    #[serde(rename = "isWorkingDay")]
    pub is_working_day: bool,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    #[serde(default)]
    pub breaks: Vec<Break>,
}

impl DaySchedule {
    pub fn working(start_time: TimeOfDay, end_time: TimeOfDay) -> Self {
        Self {
            is_working_day: true,
            start_time,
            end_time,
            breaks: Vec::new(),
        }
    }

    pub fn closed(start_time: TimeOfDay, end_time: TimeOfDay) -> Self {
        Self {
            is_working_day: false,
            ..Self::working(start_time, end_time)
        }
    }

    pub fn with_breaks(mut self, breaks: Vec<Break>) -> Self {
        self.breaks = breaks;
        self
    }
}

/// Weekday → hours. Weekdays may be missing in malformed stored data;
/// such days resolve to closed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WeeklySchedule {
    pub days: BTreeMap<DayIndex, DaySchedule>,
}

impl WeeklySchedule {
    /// Template applied to newly created services: weekdays 09:00–17:00 with
    /// a lunch break, weekends configured but closed.
    pub fn default_template() -> Self {
        let weekday = DaySchedule::working(TimeOfDay::hm(9, 0), TimeOfDay::hm(17, 0))
            .with_breaks(vec![Break::new(TimeOfDay::hm(12, 0), TimeOfDay::hm(13, 0))]);
        let weekend = DaySchedule::closed(TimeOfDay::hm(10, 0), TimeOfDay::hm(15, 0));

        let mut days = BTreeMap::new();
        for day in 0..5 {
            days.insert(day, weekday.clone());
        }
        days.insert(5, weekend.clone());
        days.insert(6, weekend);
        Self { days }
    }

    /// Same hours on every day of the week.
    pub fn uniform(day: DaySchedule) -> Self {
        Self {
            days: (0..DAYS_PER_WEEK).map(|d| (d, day.clone())).collect(),
        }
    }

    pub fn day(&self, index: DayIndex) -> Option<&DaySchedule> {
        self.days.get(&index)
    }

    pub fn set_day(&mut self, index: DayIndex, day: DaySchedule) {
        self.days.insert(index, day);
    }
}

/// A bookable service (e.g. "Pool tables") and its grid configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    /// Grid granularity in minutes.
    pub slot_steps: u32,
    /// Longest a single customer booking may span, in hours.
    pub max_duration: u32,
    pub schedule: WeeklySchedule,
}

impl Service {
    pub fn max_duration_minutes(&self) -> u32 {
        self.max_duration.saturating_mul(60)
    }
}

/// Date-specific override of a weekday's opening hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialDay {
    pub id: Ulid,
    pub service_id: Ulid,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub reason: String,
}

/// A single bookable unit such as a lane or a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub service_id: Ulid,
    pub name: String,
    pub is_active: bool,
}

// ── Bookings ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub additional_information: Option<String>,
}

/// What occupies an interval on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingKind {
    /// Customer reservation.
    Booking(Contact),
    /// Administrative or maintenance hold.
    Block {
        reason: String,
        created_by: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub service_id: Ulid,
    pub resource_id: Ulid,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub kind: BookingKind,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span {
            start: self.start_time.minutes(),
            end: self.end_time.minutes(),
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, BookingKind::Block { .. })
    }

    /// Customer name, or the block reason.
    pub fn label(&self) -> &str {
        match &self.kind {
            BookingKind::Booking(contact) => &contact.name,
            BookingKind::Block { reason, .. } => reason,
        }
    }
}

// ── Change feed ───────────────────────────────────────────────────

/// A committed mutation. Broadcast per service so views can re-fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    ServiceUpdated,
    ScheduleUpdated,
    SpecialDayChanged { date: NaiveDate },
    ResourceChanged { id: Ulid },
    BookingCreated { id: Ulid, resource_id: Ulid, date: NaiveDate },
    BookingMoved {
        id: Ulid,
        from: (Ulid, NaiveDate),
        to: (Ulid, NaiveDate),
    },
    BookingUpdated { id: Ulid, date: NaiveDate },
    BookingCancelled { id: Ulid, date: NaiveDate },
    BlocksCreated { ids: Vec<Ulid>, date: NaiveDate },
}

impl Change {
    /// Dates whose booking views this change touches.
    pub fn dates(&self) -> Vec<NaiveDate> {
        match self {
            Change::BookingMoved { from, to, .. } if from.1 != to.1 => vec![from.1, to.1],
            Change::BookingMoved { to, .. } => vec![to.1],
            Change::SpecialDayChanged { date }
            | Change::BookingCreated { date, .. }
            | Change::BookingUpdated { date, .. }
            | Change::BookingCancelled { date, .. }
            | Change::BlocksCreated { date, .. } => vec![*date],
            Change::ServiceUpdated | Change::ScheduleUpdated | Change::ResourceChanged { .. } => {
                Vec::new()
            }
        }
    }
}

// ── Query result types ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Booked,
    Blocked,
    Break,
    Closed,
}

/// Classification of one (resource, time) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotState {
    pub status: SlotStatus,
    /// Only set for closed days. Booked cells never expose who booked them.
    pub reason: Option<String>,
    /// Occupying booking or block, if any.
    pub booking_id: Option<Ulid>,
}

impl SlotState {
    pub fn available() -> Self {
        Self {
            status: SlotStatus::Available,
            reason: None,
            booking_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub time: TimeOfDay,
    pub state: SlotState,
    /// True on the cell where the occupying booking starts (drag handle).
    pub is_first_slot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRow {
    pub resource: Resource,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    pub is_working_day: bool,
    pub special_reason: Option<String>,
    pub opening: Option<Span>,
    pub slots: Vec<TimeOfDay>,
    pub rows: Vec<ResourceRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekView {
    pub week_start: NaiveDate,
    pub days: Vec<DayView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn default_template_shape() {
        let week = WeeklySchedule::default_template();
        assert_eq!(week.days.len(), 7);
        let monday = week.day(0).unwrap();
        assert!(monday.is_working_day);
        assert_eq!(monday.start_time, TimeOfDay::hm(9, 0));
        assert_eq!(monday.breaks.len(), 1);
        let sunday = week.day(6).unwrap();
        assert!(!sunday.is_working_day);
        assert!(sunday.breaks.is_empty());
    }

    #[test]
    fn day_schedule_uses_legacy_field_names() {
        let json = serde_json::json!({
            "isWorkingDay": true,
            "start_time": "09:00",
            "end_time": "17:00",
            "breaks": [{"start": "12:00", "end": "13:00"}],
            "day_index": 0
        });
        let day: DaySchedule = serde_json::from_value(json).unwrap();
        assert!(day.is_working_day);
        assert_eq!(day.breaks[0].end, TimeOfDay::hm(13, 0));
    }

    #[test]
    fn day_schedule_breaks_default_empty() {
        let json = serde_json::json!({
            "isWorkingDay": false,
            "start_time": "10:00",
            "end_time": "15:00"
        });
        let day: DaySchedule = serde_json::from_value(json).unwrap();
        assert!(day.breaks.is_empty());
    }

    #[test]
    fn inverted_break_has_no_span() {
        let b = Break::new(TimeOfDay::hm(13, 0), TimeOfDay::hm(12, 0));
        assert!(b.span().is_none());
    }

    #[test]
    fn booking_label_and_kind() {
        let block = Booking {
            id: Ulid::new(),
            service_id: Ulid::new(),
            resource_id: Ulid::new(),
            date: date("2025-03-03"),
            start_time: TimeOfDay::hm(10, 0),
            end_time: TimeOfDay::hm(12, 0),
            kind: BookingKind::Block {
                reason: "cloth replacement".into(),
                created_by: None,
            },
        };
        assert!(block.is_block());
        assert_eq!(block.label(), "cloth replacement");
        assert_eq!(block.span(), Span::new(600, 720));
    }

    #[test]
    fn moved_change_reports_both_dates() {
        let r = Ulid::new();
        let change = Change::BookingMoved {
            id: Ulid::new(),
            from: (r, date("2025-03-03")),
            to: (r, date("2025-03-04")),
        };
        assert_eq!(change.dates(), vec![date("2025-03-03"), date("2025-03-04")]);

        let same_day = Change::BookingMoved {
            id: Ulid::new(),
            from: (r, date("2025-03-03")),
            to: (Ulid::new(), date("2025-03-03")),
        };
        assert_eq!(same_day.dates(), vec![date("2025-03-03")]);
    }
}
