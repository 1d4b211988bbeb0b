//! Typed model ↔ document mapping, including the versioned `days_schedule`
//! sub-document and the legacy layouts still found in older records.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use ulid::Ulid;

use crate::engine::{EngineError, validate_grid};
use crate::limits::SCHEDULE_SCHEMA_VERSION;
use crate::model::*;
use crate::time::TimeOfDay;

use super::{Collection, Document, Fields};

const WEEKDAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

fn invalid(collection: Collection, id: Ulid, reason: impl ToString) -> EngineError {
    EngineError::InvalidDocument {
        collection: collection.name(),
        id,
        reason: reason.to_string(),
    }
}

fn to_fields<T: Serialize>(value: &T) -> Result<Fields, EngineError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(EngineError::Config(format!("expected an object, got {other}"))),
        Err(e) => Err(EngineError::Config(e.to_string())),
    }
}

fn from_fields<T: DeserializeOwned>(doc: &Document, collection: Collection) -> Result<T, EngineError> {
    serde_json::from_value(Value::Object(doc.fields.clone())).map_err(|e| invalid(collection, doc.id, e))
}

// ── days_schedule ─────────────────────────────────────────────────

/// Serialize as `{"version": 1, "days": {"0": {...}, ...}}`.
pub fn schedule_to_value(schedule: &WeeklySchedule) -> Result<Value, EngineError> {
    let days = schedule
        .days
        .iter()
        .map(|(idx, day)| {
            serde_json::to_value(day)
                .map(|v| (idx.to_string(), v))
                .map_err(|e| EngineError::Config(e.to_string()))
        })
        .collect::<Result<serde_json::Map<String, Value>, _>>()?;
    Ok(json!({ "version": SCHEDULE_SCHEMA_VERSION, "days": days }))
}

/// Read any stored schedule layout:
/// - the versioned sub-document written by [`schedule_to_value`];
/// - a JSON string holding either of the layouts below (older clients);
/// - an unversioned object keyed by day index (`"0"`) or weekday name
///   (`"monday"`, optionally carrying `day_index`).
pub fn schedule_from_value(value: &Value) -> Result<WeeklySchedule, String> {
    match value {
        Value::String(blob) => {
            let inner: Value = serde_json::from_str(blob).map_err(|e| format!("schedule blob: {e}"))?;
            if inner.is_string() {
                return Err("schedule blob is doubly encoded".into());
            }
            schedule_from_value(&inner)
        }
        Value::Object(map) if map.contains_key("version") => {
            let version = map
                .get("version")
                .and_then(Value::as_u64)
                .ok_or("schedule version must be a number")?;
            if version != u64::from(SCHEDULE_SCHEMA_VERSION) {
                return Err(format!("unsupported schedule version {version}"));
            }
            let days = map
                .get("days")
                .and_then(Value::as_object)
                .ok_or("schedule has no days object")?;
            parse_day_map(days)
        }
        Value::Object(map) => parse_day_map(map),
        other => Err(format!("schedule must be an object, got {other}")),
    }
}

fn parse_day_map(map: &serde_json::Map<String, Value>) -> Result<WeeklySchedule, String> {
    let mut days = BTreeMap::new();
    for (key, raw) in map {
        let index = day_index_for(key, raw)?;
        let day: DaySchedule =
            serde_json::from_value(raw.clone()).map_err(|e| format!("day {key:?}: {e}"))?;
        if days.insert(index, day).is_some() {
            return Err(format!("day {index} defined twice"));
        }
    }
    Ok(WeeklySchedule { days })
}

fn day_index_for(key: &str, raw: &Value) -> Result<DayIndex, String> {
    if let Ok(n) = key.parse::<DayIndex>() {
        if n < DAYS_PER_WEEK {
            return Ok(n);
        }
        return Err(format!("day index {n} out of range"));
    }
    if let Some(n) = raw.get("day_index").and_then(Value::as_u64) {
        return DayIndex::try_from(n)
            .ok()
            .filter(|n| *n < DAYS_PER_WEEK)
            .ok_or_else(|| format!("day_index {n} out of range"));
    }
    WEEKDAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(key))
        .map(|p| p as DayIndex)
        .ok_or_else(|| format!("unknown weekday key {key:?}"))
}

// ── services ──────────────────────────────────────────────────────

pub fn service_to_document(service: &Service) -> Result<Fields, EngineError> {
    let mut fields = Fields::new();
    fields.insert("name".into(), Value::String(service.name.clone()));
    fields.insert("slotSteps".into(), json!(service.slot_steps));
    fields.insert("maxDuration".into(), json!(service.max_duration));
    fields.insert("days_schedule".into(), schedule_to_value(&service.schedule)?);
    Ok(fields)
}

/// Grid settings outside the limits a write would accept fail the read.
pub fn service_from_document(doc: &Document) -> Result<Service, EngineError> {
    let c = Collection::Services;
    let name = doc
        .str_field("name")
        .ok_or_else(|| invalid(c, doc.id, "name must be a string"))?
        .to_string();
    let number = |field: &str| -> Result<u32, EngineError> {
        doc.fields
            .get(field)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| invalid(c, doc.id, format!("{field} must be a positive integer")))
    };
    let slot_steps = number("slotSteps")?;
    let max_duration = number("maxDuration")?;
    validate_grid(slot_steps, max_duration).map_err(|e| invalid(c, doc.id, e))?;
    let schedule = match doc.fields.get("days_schedule") {
        Some(v) => schedule_from_value(v).map_err(|e| invalid(c, doc.id, e))?,
        None => WeeklySchedule::default(),
    };
    Ok(Service {
        id: doc.id,
        name,
        slot_steps,
        max_duration,
        schedule,
    })
}

// ── service_resources ─────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct ResourceDocument {
    service_id: Ulid,
    name: String,
    #[serde(rename = "isActive", default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

pub fn resource_to_document(resource: &Resource) -> Result<Fields, EngineError> {
    to_fields(&ResourceDocument {
        service_id: resource.service_id,
        name: resource.name.clone(),
        is_active: resource.is_active,
    })
}

pub fn resource_from_document(doc: &Document) -> Result<Resource, EngineError> {
    let d: ResourceDocument = from_fields(doc, Collection::ServiceResources)?;
    Ok(Resource {
        id: doc.id,
        service_id: d.service_id,
        name: d.name,
        is_active: d.is_active,
    })
}

// ── special_days ──────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct SpecialDayDocument {
    service_id: Ulid,
    date: NaiveDate,
    start_time: TimeOfDay,
    end_time: TimeOfDay,
    #[serde(default)]
    reason: String,
}

pub fn special_day_to_document(day: &SpecialDay) -> Result<Fields, EngineError> {
    to_fields(&SpecialDayDocument {
        service_id: day.service_id,
        date: day.date,
        start_time: day.start_time,
        end_time: day.end_time,
        reason: day.reason.clone(),
    })
}

pub fn special_day_from_document(doc: &Document) -> Result<SpecialDay, EngineError> {
    let d: SpecialDayDocument = from_fields(doc, Collection::SpecialDays)?;
    Ok(SpecialDay {
        id: doc.id,
        service_id: d.service_id,
        date: d.date,
        start_time: d.start_time,
        end_time: d.end_time,
        reason: d.reason,
    })
}

// ── bookings ──────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum KindTag {
    Booking,
    Block,
}

/// Flat wire layout: blocks reuse `name` for the reason and `email` for the
/// staff member who placed them.
#[derive(Serialize, Deserialize)]
struct BookingDocument {
    service_id: Ulid,
    resource_id: Ulid,
    date: NaiveDate,
    start_time: TimeOfDay,
    end_time: TimeOfDay,
    #[serde(rename = "type")]
    kind: KindTag,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    additional_information: Option<String>,
}

pub fn booking_to_document(booking: &Booking) -> Result<Fields, EngineError> {
    let (kind, name, email, phone, additional_information) = match &booking.kind {
        BookingKind::Booking(c) => (
            KindTag::Booking,
            c.name.clone(),
            Some(c.email.clone()),
            c.phone.clone(),
            c.additional_information.clone(),
        ),
        BookingKind::Block { reason, created_by } => {
            (KindTag::Block, reason.clone(), created_by.clone(), None, None)
        }
    };
    to_fields(&BookingDocument {
        service_id: booking.service_id,
        resource_id: booking.resource_id,
        date: booking.date,
        start_time: booking.start_time,
        end_time: booking.end_time,
        kind,
        name,
        email,
        phone,
        additional_information,
    })
}

pub fn booking_from_document(doc: &Document) -> Result<Booking, EngineError> {
    let d: BookingDocument = from_fields(doc, Collection::Bookings)?;
    if d.start_time >= d.end_time {
        return Err(invalid(
            Collection::Bookings,
            doc.id,
            format!("start_time {} is not before end_time {}", d.start_time, d.end_time),
        ));
    }
    let kind = match d.kind {
        KindTag::Booking => BookingKind::Booking(Contact {
            name: d.name,
            email: d.email.unwrap_or_default(),
            phone: d.phone,
            additional_information: d.additional_information,
        }),
        KindTag::Block => BookingKind::Block {
            reason: d.name,
            created_by: d.email,
        },
    };
    Ok(Booking {
        id: doc.id,
        service_id: d.service_id,
        resource_id: d.resource_id,
        date: d.date,
        start_time: d.start_time,
        end_time: d.end_time,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(fields: Fields) -> Document {
        Document { id: Ulid::new(), fields }
    }

    #[test]
    fn versioned_schedule_roundtrip() {
        let week = WeeklySchedule::default_template();
        let v = schedule_to_value(&week).unwrap();
        assert_eq!(v["version"], json!(1));
        assert_eq!(v["days"]["0"]["isWorkingDay"], json!(true));
        assert_eq!(schedule_from_value(&v).unwrap(), week);
    }

    #[test]
    fn legacy_string_blob_keyed_by_index() {
        let blob = json!({
            "0": {"isWorkingDay": true, "start_time": "09:00", "end_time": "17:00", "breaks": []},
            "6": {"isWorkingDay": false, "start_time": "10:00", "end_time": "15:00", "breaks": []}
        })
        .to_string();
        let week = schedule_from_value(&Value::String(blob)).unwrap();
        assert_eq!(week.days.len(), 2);
        assert!(week.day(0).unwrap().is_working_day);
        assert!(week.day(3).is_none());
    }

    #[test]
    fn legacy_weekday_names() {
        let v = json!({
            "monday": {"day_index": 0, "isWorkingDay": true, "start_time": "09:00", "end_time": "17:00",
                       "breaks": [{"start": "12:00", "end": "13:00"}]},
            "Sunday": {"isWorkingDay": false, "start_time": "10:00", "end_time": "15:00"}
        });
        let week = schedule_from_value(&v).unwrap();
        assert_eq!(week.day(0).unwrap().breaks.len(), 1);
        assert!(!week.day(6).unwrap().is_working_day);
    }

    #[test]
    fn schedule_schema_violations() {
        assert!(schedule_from_value(&json!({"version": 2, "days": {}})).is_err());
        assert!(schedule_from_value(&json!({"version": 1})).is_err());
        assert!(schedule_from_value(&json!({"7": {}})).is_err());
        assert!(schedule_from_value(&json!({"funday": {"isWorkingDay": true}})).is_err());
        assert!(schedule_from_value(&json!({
            "0": {"isWorkingDay": true, "start_time": "9am", "end_time": "17:00"}
        }))
        .is_err());
        assert!(schedule_from_value(&json!(42)).is_err());
        assert!(schedule_from_value(&json!({
            "0": {"isWorkingDay": true, "start_time": "09:00", "end_time": "17:00"},
            "monday": {"isWorkingDay": true, "start_time": "09:00", "end_time": "17:00"}
        }))
        .is_err());
    }

    #[test]
    fn service_document_roundtrip() {
        let service = Service {
            id: Ulid::new(),
            name: "Bowling".into(),
            slot_steps: 30,
            max_duration: 2,
            schedule: WeeklySchedule::default_template(),
        };
        let d = Document {
            id: service.id,
            fields: service_to_document(&service).unwrap(),
        };
        assert_eq!(service_from_document(&d).unwrap(), service);
    }

    #[test]
    fn service_with_bad_schedule_is_invalid_document() {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!("Pool"));
        fields.insert("slotSteps".into(), json!(60));
        fields.insert("maxDuration".into(), json!(1));
        fields.insert("days_schedule".into(), json!("{not json"));
        let err = service_from_document(&doc(fields)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDocument { collection: "services", .. }));
    }

    fn service_fields(slot_steps: u64, max_duration: u64) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!("Pool"));
        fields.insert("slotSteps".into(), json!(slot_steps));
        fields.insert("maxDuration".into(), json!(max_duration));
        fields
    }

    #[test]
    fn service_grid_out_of_range_is_invalid_document() {
        for (steps, max) in [(60, 4_000_000_000), (60, 0), (5, 1), (2000, 1)] {
            let err = service_from_document(&doc(service_fields(steps, max))).unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidDocument { collection: "services", .. }),
                "slotSteps {steps} maxDuration {max}: {err}"
            );
        }
        assert!(service_from_document(&doc(service_fields(60, 24))).is_ok());
    }

    #[test]
    fn service_without_name_is_invalid_document() {
        let mut fields = service_fields(30, 2);
        fields.remove("name");
        let err = service_from_document(&doc(fields)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDocument { ref reason, .. } if reason.contains("name")));

        let mut fields = service_fields(30, 2);
        fields.insert("name".into(), json!(7));
        assert!(service_from_document(&doc(fields)).is_err());
    }

    #[test]
    fn block_document_layout() {
        let booking = Booking {
            id: Ulid::new(),
            service_id: Ulid::new(),
            resource_id: Ulid::new(),
            date: "2025-03-03".parse().unwrap(),
            start_time: TimeOfDay::hm(9, 0),
            end_time: TimeOfDay::hm(12, 0),
            kind: BookingKind::Block {
                reason: "Maintenance".into(),
                created_by: Some("staff@example.com".into()),
            },
        };
        let fields = booking_to_document(&booking).unwrap();
        assert_eq!(fields["type"], json!("block"));
        assert_eq!(fields["name"], json!("Maintenance"));
        assert_eq!(fields["date"], json!("2025-03-03"));
        assert_eq!(fields["start_time"], json!("09:00"));
        let back = booking_from_document(&Document { id: booking.id, fields }).unwrap();
        assert_eq!(back, booking);
    }

    #[test]
    fn booking_document_requires_discriminator() {
        let mut fields = booking_to_document(&Booking {
            id: Ulid::new(),
            service_id: Ulid::new(),
            resource_id: Ulid::new(),
            date: "2025-03-03".parse().unwrap(),
            start_time: TimeOfDay::hm(9, 0),
            end_time: TimeOfDay::hm(10, 0),
            kind: BookingKind::Booking(Contact {
                name: "Ann".into(),
                email: "ann@example.com".into(),
                ..Contact::default()
            }),
        })
        .unwrap();
        fields.insert("type".into(), json!("reservation"));
        assert!(booking_from_document(&doc(fields)).is_err());
    }

    #[test]
    fn booking_with_inverted_times_is_invalid_document() {
        let booking = Booking {
            id: Ulid::new(),
            service_id: Ulid::new(),
            resource_id: Ulid::new(),
            date: "2025-03-03".parse().unwrap(),
            start_time: TimeOfDay::hm(9, 0),
            end_time: TimeOfDay::hm(10, 0),
            kind: BookingKind::Booking(Contact::default()),
        };
        for (start, end) in [("11:00", "10:00"), ("09:00", "09:00")] {
            let mut fields = booking_to_document(&booking).unwrap();
            fields.insert("start_time".into(), json!(start));
            fields.insert("end_time".into(), json!(end));
            let err = booking_from_document(&doc(fields)).unwrap_err();
            assert!(matches!(err, EngineError::InvalidDocument { collection: "bookings", .. }));
        }
    }

    #[test]
    fn resource_defaults_to_active() {
        let mut fields = Fields::new();
        fields.insert("service_id".into(), json!(Ulid::new().to_string()));
        fields.insert("name".into(), json!("Table 1"));
        let r = resource_from_document(&doc(fields)).unwrap();
        assert!(r.is_active);
    }
}
