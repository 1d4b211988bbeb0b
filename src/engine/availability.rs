use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::time::{Minutes, Span, TimeOfDay, generate_slots};

use super::schedule::EffectiveSchedule;
use super::EngineError;

// ── Slot classification ───────────────────────────────────────────

/// Classify one (resource, time) cell.
///
/// First match wins: closed day, break, occupied, available. A slot can be
/// in a break and nominally booked at the same time (stale data), so the
/// order matters.
pub fn classify(
    schedule: Option<&EffectiveSchedule>,
    time: TimeOfDay,
    resource_id: Ulid,
    bookings_for_date: &[Booking],
) -> SlotState {
    let Some(schedule) = schedule.filter(|s| s.is_working_day) else {
        return SlotState {
            status: SlotStatus::Closed,
            reason: Some("not a working day".into()),
            booking_id: None,
        };
    };

    let t = time.minutes();
    if schedule.in_break(t) {
        return SlotState {
            status: SlotStatus::Break,
            reason: None,
            booking_id: None,
        };
    }

    match occupant(resource_id, t, bookings_for_date) {
        Some(booking) => SlotState {
            status: if booking.is_block() {
                SlotStatus::Blocked
            } else {
                SlotStatus::Booked
            },
            reason: None,
            booking_id: Some(booking.id),
        },
        None => SlotState::available(),
    }
}

/// The booking shown at `t` on a resource. Overlaps should not exist, but if
/// they do a customer booking wins over a block.
pub fn occupant(resource_id: Ulid, t: Minutes, bookings: &[Booking]) -> Option<&Booking> {
    let mut candidates: Vec<&Booking> = bookings
        .iter()
        .filter(|b| b.resource_id == resource_id && b.span().contains_instant(t))
        .collect();
    candidates.sort_by_key(|b| b.is_block());
    candidates.first().copied()
}

/// Grid slots for a day; empty when closed or unscheduled.
pub fn time_slots(schedule: Option<&EffectiveSchedule>, step: Minutes) -> Result<Vec<TimeOfDay>, EngineError> {
    match schedule {
        Some(s) => Ok(s.slots(step)?.to_vec()),
        None => Ok(Vec::new()),
    }
}

/// Slots covered by a booking, on the booking's own grid.
pub fn booking_slots(booking: &Booking, step: Minutes) -> Result<Vec<TimeOfDay>, EngineError> {
    Ok(generate_slots(booking.start_time, booking.end_time, step)?.to_vec())
}

// ── Grid views ────────────────────────────────────────────────────

/// Build the day grid: one row per resource, one cell per slot. `bookings`
/// may span several dates; only those on `date` are considered.
pub fn day_view(
    date: NaiveDate,
    schedule: Option<&EffectiveSchedule>,
    step: Minutes,
    resources: &[Resource],
    bookings: &[Booking],
) -> Result<DayView, EngineError> {
    let slots = time_slots(schedule, step)?;
    let on_date: Vec<Booking> = bookings.iter().filter(|b| b.date == date).cloned().collect();

    let rows = resources
        .iter()
        .map(|resource| {
            let mut previous: Option<Ulid> = None;
            let cells = slots
                .iter()
                .map(|&time| {
                    let state = classify(schedule, time, resource.id, &on_date);
                    let is_first_slot = state.booking_id.is_some() && state.booking_id != previous;
                    previous = state.booking_id;
                    Cell {
                        time,
                        state,
                        is_first_slot,
                    }
                })
                .collect();
            ResourceRow {
                resource: resource.clone(),
                cells,
            }
        })
        .collect();

    Ok(DayView {
        date,
        is_working_day: schedule.is_some_and(|s| s.is_working_day),
        special_reason: schedule.and_then(|s| s.special_reason.clone()),
        opening: schedule.and_then(EffectiveSchedule::opening),
        slots,
        rows,
    })
}

// ── Free-interval arithmetic ──────────────────────────────────────

/// Bookable free intervals on a resource: opening hours minus breaks minus
/// every booking or block on it.
pub fn free_spans(
    schedule: Option<&EffectiveSchedule>,
    resource_id: Ulid,
    bookings_for_date: &[Booking],
) -> Vec<Span> {
    let Some(opening) = schedule.and_then(EffectiveSchedule::opening) else {
        return Vec::new();
    };
    let mut free = vec![opening];

    let mut breaks: Vec<Span> = schedule
        .map(|s| s.breaks.iter().filter_map(Break::span).collect())
        .unwrap_or_default();
    if !breaks.is_empty() {
        breaks.sort_by_key(|s| s.start);
        free = subtract_intervals(&free, &merge_overlapping(&breaks));
    }

    let mut occupied: Vec<Span> = bookings_for_date
        .iter()
        .filter(|b| b.resource_id == resource_id && b.start_time < b.end_time)
        .map(Booking::span)
        .collect();
    if !occupied.is_empty() {
        occupied.sort_by_key(|s| s.start);
        free = subtract_intervals(&free, &merge_overlapping(&occupied));
    }

    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` from sorted, disjoint `base`.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::schedule::resolve;

    const H: Minutes = 60;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn monday() -> EffectiveSchedule {
        resolve(&WeeklySchedule::default_template(), &[], date("2025-03-03")).unwrap()
    }

    fn booking(resource_id: Ulid, start: TimeOfDay, end: TimeOfDay) -> Booking {
        Booking {
            id: Ulid::new(),
            service_id: Ulid::new(),
            resource_id,
            date: date("2025-03-03"),
            start_time: start,
            end_time: end,
            kind: BookingKind::Booking(Contact {
                name: "Ann".into(),
                email: "ann@example.com".into(),
                ..Contact::default()
            }),
        }
    }

    fn block(resource_id: Ulid, start: TimeOfDay, end: TimeOfDay) -> Booking {
        Booking {
            kind: BookingKind::Block {
                reason: "Maintenance".into(),
                created_by: None,
            },
            ..booking(resource_id, start, end)
        }
    }

    fn resource(name: &str) -> Resource {
        Resource {
            id: Ulid::new(),
            service_id: Ulid::new(),
            name: name.into(),
            is_active: true,
        }
    }

    // ── classify ──────────────────────────────────────────

    #[test]
    fn closed_day_wins_over_everything() {
        let sunday = resolve(&WeeklySchedule::default_template(), &[], date("2025-03-09")).unwrap();
        let rid = Ulid::new();
        let bookings = [booking(rid, TimeOfDay::hm(10, 0), TimeOfDay::hm(12, 0))];
        for t in [TimeOfDay::hm(0, 0), TimeOfDay::hm(11, 0), TimeOfDay::hm(23, 30)] {
            let state = classify(Some(&sunday), t, rid, &bookings);
            assert_eq!(state.status, SlotStatus::Closed);
            assert!(state.reason.is_some());
        }
    }

    #[test]
    fn missing_schedule_is_closed() {
        let state = classify(None, TimeOfDay::hm(10, 0), Ulid::new(), &[]);
        assert_eq!(state.status, SlotStatus::Closed);
    }

    #[test]
    fn break_wins_over_stale_booking() {
        let rid = Ulid::new();
        let bookings = [booking(rid, TimeOfDay::hm(11, 0), TimeOfDay::hm(14, 0))];
        let state = classify(Some(&monday()), TimeOfDay::hm(12, 30), rid, &bookings);
        assert_eq!(state.status, SlotStatus::Break);
        assert_eq!(state.booking_id, None);
    }

    #[test]
    fn booked_and_blocked_hide_identity() {
        let rid = Ulid::new();
        let b = booking(rid, TimeOfDay::hm(10, 0), TimeOfDay::hm(11, 0));
        let k = block(rid, TimeOfDay::hm(14, 0), TimeOfDay::hm(16, 0));
        let all = [b.clone(), k.clone()];

        let state = classify(Some(&monday()), TimeOfDay::hm(10, 30), rid, &all);
        assert_eq!(state.status, SlotStatus::Booked);
        assert_eq!(state.reason, None);
        assert_eq!(state.booking_id, Some(b.id));

        let state = classify(Some(&monday()), TimeOfDay::hm(15, 0), rid, &all);
        assert_eq!(state.status, SlotStatus::Blocked);
        assert_eq!(state.booking_id, Some(k.id));
    }

    #[test]
    fn booking_end_is_exclusive() {
        let rid = Ulid::new();
        let bookings = [booking(rid, TimeOfDay::hm(10, 0), TimeOfDay::hm(11, 0))];
        let state = classify(Some(&monday()), TimeOfDay::hm(11, 0), rid, &bookings);
        assert_eq!(state.status, SlotStatus::Available);
    }

    #[test]
    fn other_resource_bookings_ignored() {
        let bookings = [booking(Ulid::new(), TimeOfDay::hm(10, 0), TimeOfDay::hm(11, 0))];
        let state = classify(Some(&monday()), TimeOfDay::hm(10, 0), Ulid::new(), &bookings);
        assert_eq!(state.status, SlotStatus::Available);
    }

    #[test]
    fn booking_preferred_over_block_when_overlapping() {
        let rid = Ulid::new();
        let k = block(rid, TimeOfDay::hm(9, 0), TimeOfDay::hm(11, 0));
        let b = booking(rid, TimeOfDay::hm(10, 0), TimeOfDay::hm(11, 0));
        let state = classify(Some(&monday()), TimeOfDay::hm(10, 0), rid, &[k, b.clone()]);
        assert_eq!(state.status, SlotStatus::Booked);
        assert_eq!(state.booking_id, Some(b.id));
    }

    // ── day_view ──────────────────────────────────────────

    #[test]
    fn day_view_grid() {
        let table1 = resource("Table 1");
        let table2 = resource("Table 2");
        let b = booking(table1.id, TimeOfDay::hm(9, 0), TimeOfDay::hm(10, 30));
        let mut other_day = booking(table2.id, TimeOfDay::hm(9, 0), TimeOfDay::hm(10, 0));
        other_day.date = date("2025-03-04");

        let view = day_view(
            date("2025-03-03"),
            Some(&monday()),
            30,
            &[table1.clone(), table2.clone()],
            &[b.clone(), other_day],
        )
        .unwrap();

        assert!(view.is_working_day);
        assert_eq!(view.slots.len(), 16);
        assert_eq!(view.opening, Some(Span::new(9 * H, 17 * H)));

        let row1 = &view.rows[0];
        assert_eq!(row1.cells[0].state.status, SlotStatus::Booked);
        assert!(row1.cells[0].is_first_slot);
        assert!(!row1.cells[1].is_first_slot);
        assert_eq!(row1.cells[2].state.status, SlotStatus::Booked);
        assert_eq!(row1.cells[3].state.status, SlotStatus::Available);
        // 12:00 and 12:30 fall in the lunch break.
        assert_eq!(row1.cells[6].state.status, SlotStatus::Break);
        assert_eq!(row1.cells[7].state.status, SlotStatus::Break);

        // The 2025-03-04 booking does not leak into Monday.
        assert!(view.rows[1]
            .cells
            .iter()
            .all(|c| matches!(c.state.status, SlotStatus::Available | SlotStatus::Break)));
    }

    #[test]
    fn day_view_closed_has_no_slots() {
        let view = day_view(date("2025-03-09"), None, 30, &[resource("Lane 1")], &[]).unwrap();
        assert!(!view.is_working_day);
        assert!(view.slots.is_empty());
        assert!(view.rows[0].cells.is_empty());
    }

    #[test]
    fn adjacent_bookings_each_get_a_first_slot() {
        let lane = resource("Lane 1");
        let a = booking(lane.id, TimeOfDay::hm(9, 0), TimeOfDay::hm(10, 0));
        let b = booking(lane.id, TimeOfDay::hm(10, 0), TimeOfDay::hm(11, 0));
        let view = day_view(date("2025-03-03"), Some(&monday()), 60, &[lane], &[a, b]).unwrap();
        assert!(view.rows[0].cells[0].is_first_slot);
        assert!(view.rows[0].cells[1].is_first_slot);
    }

    #[test]
    fn booking_slots_follow_grid() {
        let b = booking(Ulid::new(), TimeOfDay::hm(10, 0), TimeOfDay::hm(11, 30));
        assert_eq!(
            booking_slots(&b, 30).unwrap(),
            vec![TimeOfDay::hm(10, 0), TimeOfDay::hm(10, 30), TimeOfDay::hm(11, 0)]
        );
    }

    // ── free_spans ────────────────────────────────────────

    #[test]
    fn free_spans_subtract_breaks_and_bookings() {
        let rid = Ulid::new();
        let bookings = [
            booking(rid, TimeOfDay::hm(9, 0), TimeOfDay::hm(10, 0)),
            block(rid, TimeOfDay::hm(15, 0), TimeOfDay::hm(17, 0)),
            booking(Ulid::new(), TimeOfDay::hm(13, 0), TimeOfDay::hm(14, 0)),
        ];
        let free = free_spans(Some(&monday()), rid, &bookings);
        assert_eq!(free, vec![Span::new(10 * H, 12 * H), Span::new(13 * H, 15 * H)]);
    }

    #[test]
    fn free_spans_closed_day_empty() {
        let sunday = resolve(&WeeklySchedule::default_template(), &[], date("2025-03-09")).unwrap();
        assert!(free_spans(Some(&sunday), Ulid::new(), &[]).is_empty());
        assert!(free_spans(None, Ulid::new(), &[]).is_empty());
    }

    // ── interval arithmetic ───────────────────────────────

    #[test]
    fn subtract_middle_punch() {
        let base = vec![Span::new(100, 300)];
        let remove = vec![Span::new(150, 200)];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![Span::new(100, 150), Span::new(200, 300)]
        );
    }

    #[test]
    fn subtract_full_overlap() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(50, 250)];
        assert!(subtract_intervals(&base, &remove).is_empty());
    }

    #[test]
    fn subtract_multiple_punches() {
        let base = vec![Span::new(0, 1000)];
        let remove = vec![Span::new(100, 200), Span::new(400, 500), Span::new(800, 900)];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![
                Span::new(0, 100),
                Span::new(200, 400),
                Span::new(500, 800),
                Span::new(900, 1000),
            ]
        );
    }

    #[test]
    fn merge_overlapping_and_adjacent() {
        let spans = vec![Span::new(100, 200), Span::new(150, 300), Span::new(300, 400), Span::new(500, 600)];
        assert_eq!(
            merge_overlapping(&spans),
            vec![Span::new(100, 400), Span::new(500, 600)]
        );
    }
}
