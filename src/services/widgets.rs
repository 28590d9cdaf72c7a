//! Dashboard panels: how each one loads its data and prints it.
//!
//! Loaders are plain functions over a client and a session so they can
//! be reused by one-shot commands and by pollers alike. Rendering is
//! plain text and kept separate from loading.

use chrono::{Datelike, TimeZone};
use log::debug;
use std::fmt::Write as _;

use crate::client::{FetchError, TelemetryClient};
use crate::endpoints;
use crate::models::telemetry::{AlertEvent, ConsumptionDay, ConsumptionStatus, StatusEvent};
use crate::models::wire::{AlertRecord, DatedEntries, Liters, MaxFlowRatio, StatusChangeRecord};
use crate::normalize::{DatedValue, RawSeries, Scale, Series, chronological, normalize};
use crate::session::Session;
use crate::window::TimeWindow;

const BAR_WIDTH: usize = 40;
const WEEK_DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone, PartialEq)]
pub struct FlowChart {
    pub window: TimeWindow,
    pub series: Series,
}

pub fn load_flow(client: &TelemetryClient, session: &Session, window: TimeWindow) -> Result<FlowChart, FetchError> {
    let raw = client.fetch_series(session, &window)?;
    Ok(FlowChart {
        window,
        series: normalize(RawSeries::Points(raw)),
    })
}

impl FlowChart {
    pub fn render(&self) -> String {
        let mut out = format!(
            "Water Flow Analytics [{}] {}\n",
            self.window.granularity(),
            self.window.display_label()
        );
        match self.series.scale {
            Scale::AllClear => out.push_str("  No flow recorded in this period\n"),
            Scale::Bounded { upper, .. } => {
                let granularity = self.window.granularity();
                for point in &self.series.points {
                    let tick = granularity.tick_label(&point.label);
                    let _ = writeln!(out, "  {:>8} {} {}", tick, bar(point.value, upper), liters(point.value));
                }
                let _ = writeln!(out, "  axis 0..{}", liters(upper));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeakageChart {
    pub series: Series,
}

pub fn load_leakage(client: &TelemetryClient, session: &Session) -> Result<LeakageChart, FetchError> {
    let raw: DatedEntries<Liters> = client.fetch(endpoints::LEAKAGE, session, None)?;
    Ok(LeakageChart {
        series: normalize(RawSeries::Dated(raw)),
    })
}

impl LeakageChart {
    pub fn render(&self) -> String {
        let mut out = format!("Estimated Leakage (last {} days)", self.series.points.len());
        if !self.series.is_all_clear() {
            let _ = write!(out, "  peak {}", liters(self.series.peak()));
        }
        out.push('\n');
        match self.series.scale {
            Scale::AllClear => out.push_str("  No Leakage Detected\n"),
            Scale::Bounded { peak, .. } => {
                for point in &self.series.points {
                    let _ = writeln!(out, "  {:>6} {} {}", point.label, bar(point.value, peak), liters(point.value));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaxFlowGauge {
    /// Share of readings at max flow, 0..=100.
    pub max_flow_pct: f64,
    pub total_readings: u64,
    pub max_flow_alerts: u64,
    pub date: Option<String>,
}

impl MaxFlowGauge {
    pub fn normal_flow_pct(&self) -> f64 {
        100.0 - self.max_flow_pct
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Max Water Flow (yesterday)\n");
        let _ = writeln!(
            out,
            "  Max Flow {}%  Normal Flow {}%",
            round2(self.max_flow_pct),
            round2(self.normal_flow_pct())
        );
        let _ = writeln!(
            out,
            "  readings {}  max-flow alerts {}  date {}",
            self.total_readings,
            self.max_flow_alerts,
            self.date.as_deref().unwrap_or("-")
        );
        out
    }
}

impl From<MaxFlowRatio> for MaxFlowGauge {
    fn from(raw: MaxFlowRatio) -> Self {
        MaxFlowGauge {
            max_flow_pct: raw.percentage.unwrap_or(0.0).clamp(0.0, 100.0),
            total_readings: raw.total_readings,
            max_flow_alerts: raw.max_flow_alerts,
            date: raw.date,
        }
    }
}

pub fn load_max_flow(client: &TelemetryClient, session: &Session) -> Result<MaxFlowGauge, FetchError> {
    let raw: MaxFlowRatio = client.fetch(endpoints::MAX_FLOW, session, None)?;
    Ok(raw.into())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionCalendar {
    pub window: TimeWindow,
    /// Sorted by date; rebuilt from scratch on every load.
    pub days: Vec<ConsumptionDay>,
}

pub fn load_consumption(
    client: &TelemetryClient,
    session: &Session,
    month: TimeWindow,
) -> Result<ConsumptionCalendar, FetchError> {
    let raw: DatedEntries<ConsumptionStatus> = client.fetch(endpoints::CONSUMPTION, session, Some(&month))?;
    Ok(ConsumptionCalendar::from_entries(month, raw))
}

impl ConsumptionCalendar {
    pub fn from_entries(window: TimeWindow, raw: DatedEntries<ConsumptionStatus>) -> Self {
        let mut days = chronological(raw)
            .into_iter()
            .filter_map(|DatedValue { key, day, value: status }| match day {
                Some(date) => Some(ConsumptionDay { date, status }),
                None => {
                    debug!("consumption: skipping unparseable day `{}`", key);
                    None
                }
            })
            .collect::<Vec<_>>();
        // the grid is laid out by date even if the backend order is off
        days.sort_by_key(|d| d.date);
        ConsumptionCalendar { window, days }
    }

    pub fn no_consumption_days(&self) -> usize {
        self.days
            .iter()
            .filter(|d| d.status == ConsumptionStatus::NoConsumption)
            .count()
    }

    /// Empty cells before the first day in a Sunday-first week grid.
    pub fn leading_blanks(&self) -> usize {
        let first = self.days.first().map(|d| d.date).unwrap_or(self.window.anchor());
        first.weekday().num_days_from_sunday() as usize
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "No Consumption  {}  {} days without water usage\n",
            self.window.display_label(),
            self.no_consumption_days()
        );
        let _ = writeln!(out, "  {}", WEEK_DAYS.map(|d| format!("{d:>4}")).join(""));
        let mut cells = vec!["    ".to_string(); self.leading_blanks()];
        cells.extend(self.days.iter().map(|d| {
            let mark = if d.status == ConsumptionStatus::NoConsumption { '*' } else { ' ' };
            format!("{:>3}{}", d.date.day(), mark)
        }));
        for week in cells.chunks(7) {
            let _ = writeln!(out, "  {}", week.join(""));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertFeed {
    /// Newest first, as delivered.
    pub alerts: Vec<AlertEvent>,
}

pub fn load_alerts(client: &TelemetryClient, session: &Session) -> Result<AlertFeed, FetchError> {
    let records: Vec<AlertRecord> = client.fetch(endpoints::ALERTS, session, None)?;
    let alerts = records
        .into_iter()
        .enumerate()
        .map(|(i, r)| AlertEvent::try_from(r).map_err(|e| FetchError::decode(format!("[{i}].timestamp"), e)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AlertFeed { alerts })
}

impl AlertFeed {
    pub fn render<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: core::fmt::Display,
    {
        let mut out = format!("Alerts ({})\n", self.alerts.len());
        if self.alerts.is_empty() {
            out.push_str("  No active alerts\n");
        }
        for alert in &self.alerts {
            let _ = writeln!(
                out,
                "  {}  {:<12} {}",
                alert.timestamp.format_in(tz, "%H:%M %d/%m/%Y"),
                alert.kind.name(),
                alert.kind.message()
            );
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusTimeline {
    pub events: Vec<StatusEvent>,
}

pub fn load_status(client: &TelemetryClient, session: &Session) -> Result<StatusTimeline, FetchError> {
    let records: Vec<StatusChangeRecord> = client.fetch(endpoints::STATUS_CHANGES, session, None)?;
    let events = records
        .into_iter()
        .enumerate()
        .map(|(i, r)| StatusEvent::try_from(r).map_err(|e| FetchError::decode(format!("[{i}].timestamp"), e)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StatusTimeline { events })
}

impl StatusTimeline {
    pub fn render<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: core::fmt::Display,
    {
        let mut out = String::from("Device Status\n");
        if self.events.is_empty() {
            out.push_str("  No status changes recorded\n");
        }
        for event in &self.events {
            let category = event.category();
            let action = if category.needs_action() { "  [Action Required]" } else { "" };
            let _ = writeln!(
                out,
                "  {}  {}{}",
                event.timestamp.format_in(tz, "%H:%M %d %b %Y"),
                category.title(),
                action
            );
        }
        out
    }
}

fn bar(value: f64, full_scale: f64) -> String {
    if full_scale <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let cells = ((value / full_scale) * BAR_WIDTH as f64).round() as usize;
    "#".repeat(cells.clamp(1, BAR_WIDTH))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn liters(v: f64) -> String {
    format!("{}L", round2(v))
}
