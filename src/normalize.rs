//! Turns backend payloads into ordered `{label, value}` sequences for charts.
//!
//! Two payload shapes exist: point arrays (flow readings), which keep
//! backend order, and date-keyed objects (leakage, consumption), which
//! arrive newest-first and are reversed into chronological order.

use chrono::NaiveDate;
use log::debug;

use crate::models::wire::{DatedEntries, Liters, RawPoint};
use crate::utils::parse_day;

/// Headroom above the peak for the Y axis.
pub const Y_AXIS_HEADROOM: f64 = 1.2;

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    /// Every value is zero (or there are none); render an all-clear
    /// state instead of a flat chart.
    AllClear,
    Bounded { peak: f64, upper: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub points: Vec<TelemetryPoint>,
    pub scale: Scale,
}

impl Series {
    pub fn is_all_clear(&self) -> bool {
        self.scale == Scale::AllClear
    }

    pub fn peak(&self) -> f64 {
        match self.scale {
            Scale::AllClear => 0.0,
            Scale::Bounded { peak, .. } => peak,
        }
    }
}

pub enum RawSeries {
    Points(Vec<RawPoint>),
    Dated(DatedEntries<Liters>),
}

pub fn normalize(raw: RawSeries) -> Series {
    let points = match raw {
        RawSeries::Points(points) => from_points(points),
        RawSeries::Dated(entries) => from_dated(entries),
    };
    let scale = scale_for(&points);
    Series { points, scale }
}

fn from_points(points: Vec<RawPoint>) -> Vec<TelemetryPoint> {
    points
        .into_iter()
        .map(|p| TelemetryPoint {
            label: p.time,
            value: p.reading.unwrap_or(0.0),
        })
        .collect()
}

/// One entry of a date-keyed payload; `day` is `None` when the key is
/// not a date.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedValue<V> {
    pub key: String,
    pub day: Option<NaiveDate>,
    pub value: V,
}

/// Parses the keys of a date-keyed payload and returns the entries
/// oldest first. The backend sends these objects newest first.
pub fn chronological<V>(entries: DatedEntries<V>) -> Vec<DatedValue<V>> {
    let mut dated = entries
        .0
        .into_iter()
        .map(|(key, value)| DatedValue {
            day: parse_day(&key),
            key,
            value,
        })
        .collect::<Vec<_>>();
    dated.reverse();
    dated
}

fn from_dated(entries: DatedEntries<Liters>) -> Vec<TelemetryPoint> {
    chronological(entries)
        .into_iter()
        .map(|DatedValue { key, day, value: Liters(value) }| {
            let label = match day {
                Some(day) => day.format("%-d %b").to_string(),
                None => {
                    debug!("normalize: keeping unparseable date key `{}` as label", key);
                    key
                }
            };
            TelemetryPoint {
                label,
                value: value.unwrap_or(0.0),
            }
        })
        .collect()
}

fn scale_for(points: &[TelemetryPoint]) -> Scale {
    let peak = points.iter().map(|p| p.value).fold(0.0_f64, f64::max);
    if peak <= 0.0 {
        Scale::AllClear
    } else {
        Scale::Bounded {
            peak,
            upper: peak * Y_AXIS_HEADROOM,
        }
    }
}
