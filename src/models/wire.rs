//! JSON shapes returned by the telemetry backend.
//!
//! Types only; conversion into display-ready values lives in
//! `models::telemetry` and `normalize`.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub device_id: &'a str,
    pub initial_pin: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub jwt: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One bucket of a flow series, e.g. `{"time": "14:00", "reading": "12.5"}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPoint {
    pub time: String,
    #[serde(default, alias = "value", deserialize_with = "lenient_f64")]
    pub reading: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxFlowRatio {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub total_readings: u64,
    #[serde(default)]
    pub max_flow_alerts: u64,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlertRecord {
    pub alert: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct StatusFlags {
    #[serde(default, rename = "Motion", alias = "motion")]
    pub motion: bool,
    #[serde(default, rename = "LowBat", alias = "lowBattery", alias = "lowBat")]
    pub low_battery: bool,
    #[serde(default, rename = "BadTemp", alias = "badTemperature", alias = "badTemp")]
    pub bad_temperature: bool,
    #[serde(default, rename = "AirBubbles", alias = "airBubbles")]
    pub air_bubbles: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusChangeRecord {
    pub timestamp: String,
    #[serde(default)]
    pub status: StatusFlags,
}

/// A JSON object decoded as key/value pairs in document order.
///
/// The backend sends date-keyed objects newest-first and that order is
/// meaningful, so a sorted map cannot be used here.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedEntries<V>(pub Vec<(String, V)>);

impl<V> DatedEntries<V> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de, V> Deserialize<'de> for DatedEntries<V>
where
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V> Visitor<'de> for EntriesVisitor<V>
        where
            V: Deserialize<'de>,
        {
            type Value = DatedEntries<V>;

            fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "an object keyed by date")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(DatedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// A leakage amount: liters, possibly null or sent as a string.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Liters(pub Option<f64>);

impl<'de> Deserialize<'de> for Liters {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        lenient_f64(deserializer).map(Liters)
    }
}

/// Accepts a number, a numeric string, or null. Strings that do not
/// parse become `None` rather than failing the whole payload.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(s)) => Ok(s.trim().parse::<f64>().ok().filter(|v| v.is_finite())),
    }
}
