use chrono::{DateTime, FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Length of a `PaymentRecordResponse` payload.
pub const PAYLOAD_LENGTH: usize = 41;

const JST_OFFSET_SECONDS: i32 = 9 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("field {field} is unparsable: {value:?}")]
    UnparsableField { field: &'static str, value: String },
    #[error("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02} is not a valid date-time")]
    InvalidDate {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    },
    #[error("unknown vehicle classification code {0}")]
    UnknownVehicleClassification(u16),
}

/// Toll rate category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleClassification {
    Standard,
    Oversize,
    ExtraLarge,
    Middle,
    Light,
}

impl VehicleClassification {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Standard),
            2 => Some(Self::Oversize),
            3 => Some(Self::ExtraLarge),
            4 => Some(Self::Middle),
            5 => Some(Self::Light),
            _ => None,
        }
    }
}

/// `<road number>-<tollbooth number>`, e.g. `01-234`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TollboothId(String);

impl TollboothId {
    pub fn new(road: &str, tollbooth: &str) -> Self {
        Self(format!("{road}-{tollbooth}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TollboothId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Yen.
    pub amount: u32,
    pub exit_date: DateTime<FixedOffset>,
    pub entrance_tollbooth: TollboothId,
    pub exit_tollbooth: TollboothId,
    pub vehicle_classification: VehicleClassification,
}

impl PaymentRecord {
    /// Decodes all fields or none.
    pub fn from_payload(payload: &[u8]) -> Result<Self, RecordError> {
        let fields = Fields(payload);
        Ok(Self {
            amount: fields.integer("amount", 35..=40)?,
            exit_date: fields.exit_date()?,
            entrance_tollbooth: fields.tollbooth("entrance", 4..=5, 6..=8)?,
            exit_tollbooth: fields.tollbooth("exit", 13..=14, 15..=17)?,
            vehicle_classification: fields.vehicle_classification()?,
        })
    }
}

/// Fixed offset ASCII fields of a payment record payload.
struct Fields<'a>(&'a [u8]);

impl Fields<'_> {
    fn string(&self, field: &'static str, range: RangeInclusive<usize>) -> Result<&str, RecordError> {
        let unparsable = || RecordError::UnparsableField {
            field,
            value: self
                .0
                .get(range.clone())
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default(),
        };
        let bytes = self.0.get(range.clone()).ok_or_else(&unparsable)?;
        if !bytes.is_ascii() {
            return Err(unparsable());
        }
        std::str::from_utf8(bytes).map_err(|_| unparsable())
    }

    fn integer<T: std::str::FromStr>(
        &self,
        field: &'static str,
        range: RangeInclusive<usize>,
    ) -> Result<T, RecordError> {
        let string = self.string(field, range)?;
        string
            .trim()
            .parse()
            .map_err(|_| RecordError::UnparsableField {
                field,
                value: string.to_string(),
            })
    }

    fn tollbooth(
        &self,
        field: &'static str,
        road: RangeInclusive<usize>,
        tollbooth: RangeInclusive<usize>,
    ) -> Result<TollboothId, RecordError> {
        Ok(TollboothId::new(
            self.string(field, road)?,
            self.string(field, tollbooth)?,
        ))
    }

    fn exit_date(&self) -> Result<DateTime<FixedOffset>, RecordError> {
        let year = self.integer("exit year", 18..=21)?;
        let month = self.integer("exit month", 22..=23)?;
        let day = self.integer("exit day", 24..=25)?;
        let hour = self.integer("exit hour", 26..=27)?;
        let minute = self.integer("exit minute", 28..=29)?;
        let second = self.integer("exit second", 30..=31)?;
        let invalid = RecordError::InvalidDate {
            year,
            month,
            day,
            hour,
            minute,
            second,
        };
        let Some(tokyo) = FixedOffset::east_opt(JST_OFFSET_SECONDS) else {
            return Err(invalid);
        };
        tokyo
            .with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
            .ok_or(invalid)
    }

    fn vehicle_classification(&self) -> Result<VehicleClassification, RecordError> {
        let code = self.integer("vehicle classification", 32..=34)?;
        VehicleClassification::from_code(code).ok_or(RecordError::UnknownVehicleClassification(code))
    }
}
