//! Drag-and-drop rescheduling as an explicit state machine.
//!
//! ```text
//! Idle ──begin──▶ Dragging ──drop_on──▶ Validating ──resolve──▶ Confirmed | Rejected
//!   ▲                │                                              │
//!   └────cancel──────┴──────────────── take_plan / begin ◀──────────┘
//! ```
//!
//! The session never writes. A confirmed plan is handed back to the caller,
//! which commits it with [`Engine::apply_move`] once the user agrees.

use std::fmt;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::engine::{Engine, EngineError, MovePlan};
use crate::model::{Booking, Cell, SlotStatus};
use crate::time::TimeOfDay;

/// The booking being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragOrigin {
    pub booking_id: Ulid,
    pub resource_id: Ulid,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
}

impl DragOrigin {
    pub fn of(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            resource_id: booking.resource_id,
            date: booking.date,
            start_time: booking.start_time,
        }
    }
}

/// The grid cell under the pointer when the booking was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropTarget {
    pub resource_id: Ulid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub status: SlotStatus,
    pub occupant: Option<Ulid>,
}

impl DropTarget {
    pub fn from_cell(resource_id: Ulid, date: NaiveDate, cell: &Cell) -> Self {
        Self {
            resource_id,
            date,
            time: cell.time,
            status: cell.state.status,
            occupant: cell.state.booking_id,
        }
    }
}

#[derive(Debug)]
pub enum Rejection {
    /// Dropped on a cell that is not free.
    Unavailable(SlotStatus),
    /// The engine refused the move.
    Invalid(EngineError),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unavailable(status) => write!(f, "cannot drop on a {status:?} slot"),
            Rejection::Invalid(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug)]
pub enum DragState {
    Idle,
    Dragging(DragOrigin),
    Validating(DragOrigin, DropTarget),
    Confirmed(MovePlan),
    Rejected(Rejection),
}

impl DragState {
    fn name(&self) -> &'static str {
        match self {
            DragState::Idle => "idle",
            DragState::Dragging(_) => "dragging",
            DragState::Validating(..) => "validating",
            DragState::Confirmed(_) => "confirmed",
            DragState::Rejected(_) => "rejected",
        }
    }
}

/// An event that is not valid in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub state: &'static str,
    pub event: &'static str,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot {} while {}", self.event, self.state)
    }
}

impl std::error::Error for TransitionError {}

#[derive(Debug)]
pub struct DragSession {
    state: DragState,
}

impl Default for DragSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DragSession {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    fn refuse(&self, event: &'static str) -> TransitionError {
        TransitionError {
            state: self.state.name(),
            event,
        }
    }

    /// Pick up a booking. Allowed from any settled state.
    pub fn begin(&mut self, origin: DragOrigin) -> Result<(), TransitionError> {
        match self.state {
            DragState::Idle | DragState::Confirmed(_) | DragState::Rejected(_) => {
                self.state = DragState::Dragging(origin);
                Ok(())
            }
            _ => Err(self.refuse("begin")),
        }
    }

    /// Abandon the drag. No validation, no mutation.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    /// Release over `target`. Cells that are not free reject immediately,
    /// except cells of the dragged booking itself.
    pub fn drop_on(&mut self, target: DropTarget) -> Result<(), TransitionError> {
        let DragState::Dragging(origin) = self.state else {
            return Err(self.refuse("drop"));
        };
        let own_cell = target.occupant == Some(origin.booking_id);
        self.state = if target.status == SlotStatus::Available || own_cell {
            DragState::Validating(origin, target)
        } else {
            DragState::Rejected(Rejection::Unavailable(target.status))
        };
        Ok(())
    }

    /// Feed the validation result for the pending drop.
    pub fn resolve(&mut self, result: Result<MovePlan, EngineError>) -> Result<(), TransitionError> {
        if !matches!(self.state, DragState::Validating(..)) {
            return Err(self.refuse("resolve"));
        }
        self.state = match result {
            Ok(plan) => DragState::Confirmed(plan),
            Err(e) => DragState::Rejected(Rejection::Invalid(e)),
        };
        Ok(())
    }

    /// Validate the pending drop against the engine without writing.
    pub async fn validate(&mut self, engine: &Engine) -> Result<(), TransitionError> {
        let DragState::Validating(origin, target) = self.state else {
            return Err(self.refuse("validate"));
        };
        let result = engine
            .preview_move(origin.booking_id, target.resource_id, target.date, target.time)
            .await;
        self.resolve(result)
    }

    /// Hand out the confirmed plan and return to idle.
    pub fn take_plan(&mut self) -> Option<MovePlan> {
        if !matches!(self.state, DragState::Confirmed(_)) {
            return None;
        }
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Confirmed(plan) => Some(plan),
            _ => None,
        }
    }
}
