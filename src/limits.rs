//! Hard limits applied to every service. Configurable knobs live in
//! [`crate::config::EngineConfig`].

/// Smallest grid granularity a service may use, in minutes.
pub const MIN_SLOT_STEP_MINUTES: u32 = 30;

/// Longest a single slot step may be (one full day).
pub const MAX_SLOT_STEP_MINUTES: u32 = 24 * 60;

/// Smallest allowed `max_duration`, in hours.
pub const MIN_MAX_DURATION_HOURS: u32 = 1;

/// Largest allowed `max_duration`, in hours.
pub const MAX_MAX_DURATION_HOURS: u32 = 24;

/// Minutes in a day. `24:00` is the latest representable closing time.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_REASON_LEN: usize = 512;
pub const MIN_REASON_LEN: usize = 2;
pub const MAX_NOTES_LEN: usize = 4096;

pub const MAX_BREAKS_PER_DAY: usize = 16;
pub const MAX_RESOURCES_PER_SERVICE: usize = 512;

/// Upper bound for a single bulk block request.
pub const MAX_BLOCK_RESOURCES: usize = 128;

/// Current `days_schedule` sub-document version.
pub const SCHEDULE_SCHEMA_VERSION: u32 = 1;
