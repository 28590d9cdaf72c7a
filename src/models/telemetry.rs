//! Domain values built from the backend payloads.

use chrono::NaiveDate;
use core::fmt;
use serde::{Deserialize, Serialize};

use crate::models::wire::{AlertRecord, StatusChangeRecord, StatusFlags};
use crate::utils::{Timestamp, parse_timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl TryFrom<String> for DeviceId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DeviceId::parse(&value)
    }
}

impl From<DeviceId> for String {
    fn from(value: DeviceId) -> Self {
        value.0
    }
}

impl DeviceId {
    /// Validates an identifier before it is substituted into URL paths.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let id = raw.trim();
        if id.is_empty() {
            return Err("device id must not be empty".to_string());
        }
        if let Some(c) = id
            .chars()
            .find(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%' | '&' | '\\'))
        {
            return Err(format!("device id contains invalid character {c:?}"));
        }
        Ok(DeviceId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertKind {
    ContiFlow,
    ReverseFlow,
    BurstPipe,
    EmptyPipe,
    Freeze,
    Other(String),
}

impl AlertKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "ContiFlow" => AlertKind::ContiFlow,
            "ReverseFlow" => AlertKind::ReverseFlow,
            "BurstPipe" => AlertKind::BurstPipe,
            "EmptyPipe" => AlertKind::EmptyPipe,
            "Freeze" => AlertKind::Freeze,
            other => AlertKind::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AlertKind::ContiFlow => "ContiFlow",
            AlertKind::ReverseFlow => "ReverseFlow",
            AlertKind::BurstPipe => "BurstPipe",
            AlertKind::EmptyPipe => "EmptyPipe",
            AlertKind::Freeze => "Freeze",
            AlertKind::Other(name) => name,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AlertKind::ContiFlow => "Continuous flow detected",
            AlertKind::ReverseFlow => "Negative flow detected",
            AlertKind::BurstPipe => "Sudden pressure drop detected",
            AlertKind::EmptyPipe => "No water flow detected",
            AlertKind::Freeze => "Temperature below freezing point",
            AlertKind::Other(_) => "System alert",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub timestamp: Timestamp,
}

impl TryFrom<AlertRecord> for AlertEvent {
    type Error = String;

    fn try_from(record: AlertRecord) -> Result<Self, Self::Error> {
        let timestamp =
            parse_timestamp(&record.timestamp).ok_or_else(|| format!("invalid timestamp `{}`", record.timestamp))?;
        Ok(AlertEvent {
            kind: AlertKind::from_name(&record.alert),
            timestamp,
        })
    }
}

/// Display category of a status change. Declaration order is priority
/// order: when several flags are set, the first matching one wins.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    MotionDetected,
    LowBattery,
    BadTemperature,
    AirBubbles,
    Normal,
}

impl StatusCategory {
    pub fn resolve(flags: &StatusFlags) -> Self {
        if flags.motion {
            StatusCategory::MotionDetected
        } else if flags.low_battery {
            StatusCategory::LowBattery
        } else if flags.bad_temperature {
            StatusCategory::BadTemperature
        } else if flags.air_bubbles {
            StatusCategory::AirBubbles
        } else {
            StatusCategory::Normal
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            StatusCategory::MotionDetected => "Motion Detected",
            StatusCategory::LowBattery => "Low Battery",
            StatusCategory::BadTemperature => "Bad Temperature",
            StatusCategory::AirBubbles => "Air Bubbles",
            StatusCategory::Normal => "Normal",
        }
    }

    pub fn needs_action(self) -> bool {
        self != StatusCategory::Normal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub timestamp: Timestamp,
    pub flags: StatusFlags,
}

impl StatusEvent {
    pub fn category(&self) -> StatusCategory {
        StatusCategory::resolve(&self.flags)
    }
}

impl TryFrom<StatusChangeRecord> for StatusEvent {
    type Error = String;

    fn try_from(record: StatusChangeRecord) -> Result<Self, Self::Error> {
        let timestamp =
            parse_timestamp(&record.timestamp).ok_or_else(|| format!("invalid timestamp `{}`", record.timestamp))?;
        Ok(StatusEvent {
            timestamp,
            flags: record.status,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsumptionStatus {
    Consumption,
    NoConsumption,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConsumptionDay {
    pub date: NaiveDate,
    pub status: ConsumptionStatus,
}
