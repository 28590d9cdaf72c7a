//! Backend paths, relative to the configured base URL.
//!
//! Placeholders: `{device}`, `{date}` (window anchor as `yyyy-MM-dd`),
//! `{year}` (`yyyy`) and `{month}` (unpadded month number).

use chrono::Datelike;

use crate::models::telemetry::DeviceId;
use crate::window::{Granularity, TimeWindow};

pub const LOGIN: &str = "/device/deviceLogin";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EndpointTemplate(pub &'static str);

pub const FLOW_HOURLY: EndpointTemplate = EndpointTemplate("/readingperhour/{device}/daily/{date}");
pub const FLOW_DAILY: EndpointTemplate = EndpointTemplate("/readingperday/{device}/monthly/{date}");
pub const FLOW_MONTHLY: EndpointTemplate = EndpointTemplate("/readingpermonth/{device}/yearly/{year}");
pub const LEAKAGE: EndpointTemplate = EndpointTemplate("/newWaterReading/{device}/leakage-analysis");
pub const MAX_FLOW: EndpointTemplate = EndpointTemplate("/newWaterReading/{device}/maxflow-percentage");
pub const CONSUMPTION: EndpointTemplate =
    EndpointTemplate("/newWaterReading/{device}/consumption-analysis?month={month}&year={year}");
pub const ALERTS: EndpointTemplate = EndpointTemplate("/newWaterReading/{device}/alerts");
pub const STATUS_CHANGES: EndpointTemplate = EndpointTemplate("/newWaterReading/{device}/status-changes");

/// Flow series endpoint for a window of the given granularity.
pub fn flow_series(granularity: Granularity) -> EndpointTemplate {
    match granularity {
        Granularity::HourOfDay => FLOW_HOURLY,
        Granularity::DayOfMonth => FLOW_DAILY,
        Granularity::MonthOfYear => FLOW_MONTHLY,
    }
}

impl EndpointTemplate {
    pub fn needs_window(&self) -> bool {
        ["{date}", "{year}", "{month}"].iter().any(|p| self.0.contains(p))
    }

    /// Substitutes the placeholders. Fails if a window placeholder is
    /// present but no window was given.
    pub fn render(&self, device: &DeviceId, window: Option<&TimeWindow>) -> Result<String, String> {
        let path = self.0.replace("{device}", device.as_str());
        match window {
            Some(w) => {
                let anchor = w.anchor();
                Ok(path
                    .replace("{date}", &anchor.format("%Y-%m-%d").to_string())
                    .replace("{year}", &format!("{:04}", anchor.year()))
                    .replace("{month}", &anchor.month().to_string()))
            }
            None if self.needs_window() => Err(format!("endpoint `{}` requires a time window", self.0)),
            None => Ok(path),
        }
    }
}
