//! Temporal structure transformers.
//!
//! Wire layouts:
//!
//! | Type            | Signature   | Fields                                  |
//! |-----------------|-------------|-----------------------------------------|
//! | Date            | `0x44`      | days since epoch                        |
//! | Time            | `0x54`      | nanos of day, offset seconds            |
//! | LocalTime       | `0x74`      | nanos of day                            |
//! | LocalDateTime   | `0x64`      | epoch seconds, nanos                    |
//! | DateTime        | `0x46/0x49` | seconds, nanos, offset seconds          |
//! | ZonedDateTime   | `0x66/0x69` | seconds, nanos, zone id                 |
//! | Duration        | `0x45`      | months, days, seconds, nanos            |
//!
//! The legacy date time signatures count seconds in local wall-clock time;
//! the UTC ones (Bolt 5.0+, or 4.3/4.4 with the `utc` patch) count UTC seconds.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};

use super::marker::signature;
use super::transformer::{int_field, string_field, unexpected, verify_struct_size, Transformer};
use super::value::{Duration, EpochBasis, OffsetTime, StructKind, Structure, Value, ZonedDateTime};
use super::PackStreamError;

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

fn invalid(name: &'static str, detail: impl std::fmt::Display) -> PackStreamError {
    PackStreamError::InvalidStructure(format!("{}: {}", name, detail))
}

fn nanos_field(
    name: &'static str,
    structure: &Structure,
    index: usize,
) -> Result<u32, PackStreamError> {
    let nanos = int_field(name, structure, index)?;
    u32::try_from(nanos)
        .ok()
        .filter(|n| (*n as i64) < NANOS_PER_SECOND)
        .ok_or_else(|| invalid(name, format!("nanoseconds out of range: {}", nanos)))
}

fn timestamp(
    name: &'static str,
    seconds: i64,
    nanos: u32,
) -> Result<DateTime<Utc>, PackStreamError> {
    DateTime::from_timestamp(seconds, nanos)
        .ok_or_else(|| invalid(name, format!("epoch second out of range: {}", seconds)))
}

fn offset(name: &'static str, seconds: i64) -> Result<FixedOffset, PackStreamError> {
    i32::try_from(seconds)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| invalid(name, format!("offset out of range: {}", seconds)))
}

fn nano_of_day(time: &NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * NANOS_PER_SECOND + time.nanosecond() as i64
}

fn time_from_nano_of_day(name: &'static str, nanos: i64) -> Result<NaiveTime, PackStreamError> {
    if nanos < 0 {
        return Err(invalid(name, format!("nano of day out of range: {}", nanos)));
    }
    let seconds = u32::try_from(nanos / NANOS_PER_SECOND)
        .map_err(|_| invalid(name, format!("nano of day out of range: {}", nanos)))?;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, (nanos % NANOS_PER_SECOND) as u32)
        .ok_or_else(|| invalid(name, format!("nano of day out of range: {}", nanos)))
}

/// `Date` (`0x44`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTransformer;

impl Transformer for DateTransformer {
    fn signature(&self) -> u8 {
        signature::DATE
    }

    fn kind(&self) -> StructKind {
        StructKind::Date
    }

    fn name(&self) -> &'static str {
        "Date"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        let Value::Date(date) = value else {
            return Err(unexpected(self.name(), value));
        };
        let days = date.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE;
        Ok(Structure::new(self.signature(), vec![Value::Integer(days)]))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, 1)?;
        let days = int_field(self.name(), &structure, 0)?;
        let date = days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(|d| i32::try_from(d).ok())
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .ok_or_else(|| invalid(self.name(), format!("epoch day out of range: {}", days)))?;
        Ok(Value::Date(date))
    }
}

/// `Time` (`0x54`): local nanos of day plus offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeTransformer;

impl Transformer for TimeTransformer {
    fn signature(&self) -> u8 {
        signature::TIME
    }

    fn kind(&self) -> StructKind {
        StructKind::Time
    }

    fn name(&self) -> &'static str {
        "Time"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        let Value::Time(time) = value else {
            return Err(unexpected(self.name(), value));
        };
        Ok(Structure::new(
            self.signature(),
            vec![
                Value::Integer(nano_of_day(&time.time)),
                Value::Integer(time.offset_seconds as i64),
            ],
        ))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, 2)?;
        let time = time_from_nano_of_day(self.name(), int_field(self.name(), &structure, 0)?)?;
        let offset = offset(self.name(), int_field(self.name(), &structure, 1)?)?;
        Ok(Value::Time(OffsetTime {
            time,
            offset_seconds: offset.local_minus_utc(),
        }))
    }
}

/// `LocalTime` (`0x74`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTimeTransformer;

impl Transformer for LocalTimeTransformer {
    fn signature(&self) -> u8 {
        signature::LOCAL_TIME
    }

    fn kind(&self) -> StructKind {
        StructKind::LocalTime
    }

    fn name(&self) -> &'static str {
        "LocalTime"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        let Value::LocalTime(time) = value else {
            return Err(unexpected(self.name(), value));
        };
        Ok(Structure::new(self.signature(), vec![Value::Integer(nano_of_day(time))]))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, 1)?;
        let nanos = int_field(self.name(), &structure, 0)?;
        Ok(Value::LocalTime(time_from_nano_of_day(self.name(), nanos)?))
    }
}

/// `LocalDateTime` (`0x64`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDateTimeTransformer;

impl Transformer for LocalDateTimeTransformer {
    fn signature(&self) -> u8 {
        signature::LOCAL_DATE_TIME
    }

    fn kind(&self) -> StructKind {
        StructKind::LocalDateTime
    }

    fn name(&self) -> &'static str {
        "LocalDateTime"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        let Value::LocalDateTime(local) = value else {
            return Err(unexpected(self.name(), value));
        };
        let as_utc = local.and_utc();
        Ok(Structure::new(
            self.signature(),
            vec![
                Value::Integer(as_utc.timestamp()),
                Value::Integer(as_utc.timestamp_subsec_nanos() as i64),
            ],
        ))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, 2)?;
        let seconds = int_field(self.name(), &structure, 0)?;
        let nanos = nanos_field(self.name(), &structure, 1)?;
        let local: NaiveDateTime = timestamp(self.name(), seconds, nanos)?.naive_utc();
        Ok(Value::LocalDateTime(local))
    }
}

/// `DateTime` with a fixed offset: `0x46` legacy, `0x49` UTC.
#[derive(Debug, Clone, Copy)]
pub struct DateTimeWithOffsetTransformer {
    basis: EpochBasis,
}

impl DateTimeWithOffsetTransformer {
    /// Seconds counted in local time.
    pub fn legacy() -> Self {
        Self {
            basis: EpochBasis::Local,
        }
    }

    /// Seconds counted in UTC.
    pub fn utc() -> Self {
        Self {
            basis: EpochBasis::Utc,
        }
    }
}

impl Transformer for DateTimeWithOffsetTransformer {
    fn signature(&self) -> u8 {
        match self.basis {
            EpochBasis::Local => signature::DATE_TIME_WITH_OFFSET,
            EpochBasis::Utc => signature::DATE_TIME_WITH_OFFSET_UTC,
        }
    }

    fn kind(&self) -> StructKind {
        StructKind::DateTimeWithOffset
    }

    fn name(&self) -> &'static str {
        "DateTimeWithOffset"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        let Value::DateTime(dt) = value else {
            return Err(unexpected(self.name(), value));
        };
        let seconds = match self.basis {
            EpochBasis::Local => dt.naive_local().and_utc().timestamp(),
            EpochBasis::Utc => dt.timestamp(),
        };
        Ok(Structure::new(
            self.signature(),
            vec![
                Value::Integer(seconds),
                Value::Integer(dt.timestamp_subsec_nanos() as i64),
                Value::Integer(dt.offset().local_minus_utc() as i64),
            ],
        ))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, 3)?;
        let seconds = int_field(self.name(), &structure, 0)?;
        let nanos = nanos_field(self.name(), &structure, 1)?;
        let offset = offset(self.name(), int_field(self.name(), &structure, 2)?)?;
        let instant = timestamp(self.name(), seconds, nanos)?;
        let dt = match self.basis {
            EpochBasis::Utc => instant.with_timezone(&offset),
            EpochBasis::Local => offset
                .from_local_datetime(&instant.naive_utc())
                .single()
                .ok_or_else(|| invalid(self.name(), "local time does not map to an instant"))?,
        };
        Ok(Value::DateTime(dt))
    }
}

/// `DateTime` with a zone id: `0x66` legacy, `0x69` UTC.
#[derive(Debug, Clone, Copy)]
pub struct DateTimeWithZoneIdTransformer {
    basis: EpochBasis,
}

impl DateTimeWithZoneIdTransformer {
    /// Seconds counted in local time.
    pub fn legacy() -> Self {
        Self {
            basis: EpochBasis::Local,
        }
    }

    /// Seconds counted in UTC.
    pub fn utc() -> Self {
        Self {
            basis: EpochBasis::Utc,
        }
    }
}

impl Transformer for DateTimeWithZoneIdTransformer {
    fn signature(&self) -> u8 {
        match self.basis {
            EpochBasis::Local => signature::DATE_TIME_WITH_ZONE_ID,
            EpochBasis::Utc => signature::DATE_TIME_WITH_ZONE_ID_UTC,
        }
    }

    fn kind(&self) -> StructKind {
        StructKind::DateTimeWithZoneId
    }

    fn name(&self) -> &'static str {
        "DateTimeWithZoneId"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        let Value::ZonedDateTime(zoned) = value else {
            return Err(unexpected(self.name(), value));
        };
        // Converting between the two bases needs a zone database.
        if zoned.basis != self.basis {
            return Err(invalid(
                self.name(),
                format!(
                    "seconds counted in {:?} time cannot be sent where {:?} time is expected",
                    zoned.basis, self.basis
                ),
            ));
        }
        Ok(Structure::new(
            self.signature(),
            vec![
                Value::Integer(zoned.seconds),
                Value::Integer(zoned.nanoseconds as i64),
                Value::String(zoned.zone_id.clone()),
            ],
        ))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, 3)?;
        Ok(Value::ZonedDateTime(ZonedDateTime {
            seconds: int_field(self.name(), &structure, 0)?,
            nanoseconds: nanos_field(self.name(), &structure, 1)?,
            zone_id: string_field(self.name(), &structure, 2)?,
            basis: self.basis,
        }))
    }
}

/// `Duration` (`0x45`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationTransformer;

impl Transformer for DurationTransformer {
    fn signature(&self) -> u8 {
        signature::DURATION
    }

    fn kind(&self) -> StructKind {
        StructKind::Duration
    }

    fn name(&self) -> &'static str {
        "Duration"
    }

    fn to_structure(&self, value: &Value) -> Result<Structure, PackStreamError> {
        let Value::Duration(d) = value else {
            return Err(unexpected(self.name(), value));
        };
        Ok(Structure::new(
            self.signature(),
            vec![
                Value::Integer(d.months),
                Value::Integer(d.days),
                Value::Integer(d.seconds),
                Value::Integer(d.nanoseconds),
            ],
        ))
    }

    fn from_structure(&self, structure: Structure) -> Result<Value, PackStreamError> {
        verify_struct_size(self.name(), &structure, 4)?;
        Ok(Value::Duration(Duration::new(
            int_field(self.name(), &structure, 0)?,
            int_field(self.name(), &structure, 1)?,
            int_field(self.name(), &structure, 2)?,
            int_field(self.name(), &structure, 3)?,
        )))
    }
}
