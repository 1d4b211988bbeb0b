use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::DayIndex;
use crate::store::StoreError;
use crate::time::{Minutes, Span, TimeOfDay, format_minutes};

/// The booking or block a proposal collided with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictInfo {
    pub id: Ulid,
    pub name: String,
    pub span: Span,
    pub is_block: bool,
}

#[derive(Debug)]
pub enum EngineError {
    /// Malformed `"HH:MM"` input.
    Format(String),
    /// Invalid step/duration configuration.
    Config(String),
    OutsideHours {
        closing_time: TimeOfDay,
        computed_end: Minutes,
    },
    /// Start is before opening, off the slot grid, or inside a break.
    OffGrid {
        start: Minutes,
    },
    Conflict(Box<ConflictInfo>),
    NotFound(Ulid),
    ScheduleNotFound {
        service_id: Ulid,
        weekday: DayIndex,
    },
    AlreadyExists(Ulid),
    InvalidRange {
        start: TimeOfDay,
        end: TimeOfDay,
    },
    InvalidBreaks(String),
    DayClosed(NaiveDate),
    ResourceInactive(Ulid),
    DurationExceeded {
        max_minutes: Minutes,
        requested_minutes: Minutes,
    },
    LimitExceeded(&'static str),
    InvalidDocument {
        collection: &'static str,
        id: Ulid,
        reason: String,
    },
    Persistence(StoreError),
}

impl EngineError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Format(_) => "format",
            EngineError::Config(_) => "config",
            EngineError::OutsideHours { .. } => "outside_hours",
            EngineError::OffGrid { .. } => "off_grid",
            EngineError::Conflict(_) => "conflict",
            EngineError::NotFound(_) | EngineError::ScheduleNotFound { .. } => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidRange { .. } => "invalid_range",
            EngineError::InvalidBreaks(_) => "invalid_breaks",
            EngineError::DayClosed(_) => "day_closed",
            EngineError::ResourceInactive(_) => "resource_inactive",
            EngineError::DurationExceeded { .. } => "duration_exceeded",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::InvalidDocument { .. } => "invalid_document",
            EngineError::Persistence(_) => "persistence",
        }
    }

    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            EngineError::Persistence(_) | EngineError::InvalidDocument { .. }
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Format(msg) => write!(f, "format error: {msg}"),
            EngineError::Config(msg) => write!(f, "configuration error: {msg}"),
            EngineError::OutsideHours {
                closing_time,
                computed_end,
            } => write!(
                f,
                "outside working hours: service closes at {closing_time}, booking would end at {}",
                format_minutes(*computed_end)
            ),
            EngineError::OffGrid { start } => {
                write!(f, "{} is not a bookable start time", format_minutes(*start))
            }
            EngineError::Conflict(c) => write!(
                f,
                "conflict with {} {} ({}) at {}",
                if c.is_block { "block" } else { "booking" },
                c.id,
                c.name,
                c.span
            ),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::ScheduleNotFound {
                service_id,
                weekday,
            } => write!(f, "service {service_id} has no schedule for weekday {weekday}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid time range: {start} is not before {end}")
            }
            EngineError::InvalidBreaks(msg) => write!(f, "invalid breaks: {msg}"),
            EngineError::DayClosed(date) => write!(f, "{date} is not a working day"),
            EngineError::ResourceInactive(id) => write!(f, "resource {id} is not active"),
            EngineError::DurationExceeded {
                max_minutes,
                requested_minutes,
            } => write!(
                f,
                "booking of {requested_minutes} minutes exceeds the maximum of {max_minutes}"
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::InvalidDocument {
                collection,
                id,
                reason,
            } => write!(f, "invalid {collection} document {id}: {reason}"),
            EngineError::Persistence(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Persistence(e)
    }
}
