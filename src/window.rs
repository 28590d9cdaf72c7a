//! Reporting windows: a granularity plus an anchor date.
//!
//! The anchor is always stored normalised to the start of the unit that
//! contains it, so the query parameters derived from a window do not
//! change while the user stays inside the same day/month/year.

use chrono::{Datelike, Days, Local, Months, NaiveDate};
use core::fmt;
use std::str::FromStr;

/// Source of "today" for the selector.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Bucket size of a reporting window.
///
/// The names describe the buckets inside the window: an `HourOfDay`
/// window spans one day and holds hourly readings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Granularity {
    HourOfDay,
    DayOfMonth,
    MonthOfYear,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::HourOfDay, Granularity::DayOfMonth, Granularity::MonthOfYear];

    /// Start of the unit containing `date`.
    pub fn normalize(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::HourOfDay => date,
            Granularity::DayOfMonth => date.with_day(1).unwrap_or(date),
            Granularity::MonthOfYear => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    /// strftime pattern of the window header.
    pub fn label_format(self) -> &'static str {
        match self {
            Granularity::HourOfDay => "%d %b %Y",
            Granularity::DayOfMonth => "%B %Y",
            Granularity::MonthOfYear => "%Y",
        }
    }

    /// Shortens a backend bucket name for the X axis.
    pub fn tick_label(self, time: &str) -> String {
        let mut parts = time.split_whitespace();
        match self {
            Granularity::HourOfDay | Granularity::MonthOfYear => parts.next().unwrap_or(time).to_string(),
            Granularity::DayOfMonth => match (parts.next(), parts.next()) {
                (Some(day), Some(month)) => format!("{day} {month}"),
                (Some(day), None) => day.to_string(),
                _ => time.to_string(),
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::HourOfDay => "day",
            Granularity::DayOfMonth => "month",
            Granularity::MonthOfYear => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "hour" | "hour-of-day" => Ok(Granularity::HourOfDay),
            "month" | "day-of-month" => Ok(Granularity::DayOfMonth),
            "year" | "month-of-year" => Ok(Granularity::MonthOfYear),
            other => Err(format!("unknown granularity `{other}` (expected day, month or year)")),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// Moves `date` by exactly one unit of `granularity`.
///
/// Month and year steps use calendar arithmetic and clamp to the end of
/// shorter months (Jan 31 + 1 month = Feb 28/29). Returns the input
/// unchanged if the result would leave chrono's supported range.
pub fn shift_date(date: NaiveDate, granularity: Granularity, direction: Direction) -> NaiveDate {
    let shifted = match (granularity, direction) {
        (Granularity::HourOfDay, Direction::Next) => date.checked_add_days(Days::new(1)),
        (Granularity::HourOfDay, Direction::Prev) => date.checked_sub_days(Days::new(1)),
        (Granularity::DayOfMonth, Direction::Next) => date.checked_add_months(Months::new(1)),
        (Granularity::DayOfMonth, Direction::Prev) => date.checked_sub_months(Months::new(1)),
        (Granularity::MonthOfYear, Direction::Next) => date.checked_add_months(Months::new(12)),
        (Granularity::MonthOfYear, Direction::Prev) => date.checked_sub_months(Months::new(12)),
    };
    shifted.unwrap_or(date)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    granularity: Granularity,
    anchor: NaiveDate,
}

impl TimeWindow {
    pub fn new(granularity: Granularity, date: NaiveDate) -> Self {
        TimeWindow {
            granularity,
            anchor: granularity.normalize(date),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn shifted(&self, direction: Direction) -> Self {
        TimeWindow::new(self.granularity, shift_date(self.anchor, self.granularity, direction))
    }

    pub fn display_label(&self) -> String {
        self.anchor.format(self.granularity.label_format()).to_string()
    }
}

/// Interactive window state: select a granularity, step back and forth,
/// or jump to a picked date.
#[derive(Debug, Clone)]
pub struct WindowSelector<C: Clock = SystemClock> {
    clock: C,
    window: TimeWindow,
}

impl<C: Clock> WindowSelector<C> {
    pub fn new(clock: C, granularity: Granularity) -> Self {
        let window = TimeWindow::new(granularity, clock.today());
        WindowSelector { clock, window }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Switches granularity. The anchor always resets to today; the
    /// previous anchor is not carried over.
    pub fn select(&mut self, granularity: Granularity) -> TimeWindow {
        self.window = TimeWindow::new(granularity, self.clock.today());
        self.window
    }

    pub fn navigate(&mut self, direction: Direction) -> TimeWindow {
        self.window = self.window.shifted(direction);
        self.window
    }

    pub fn pick(&mut self, date: NaiveDate) -> TimeWindow {
        self.window = TimeWindow::new(self.window.granularity, date);
        self.window
    }

    pub fn display_label(&self) -> String {
        self.window.display_label()
    }

    /// Years offered by the year picker, centred on the current year.
    pub fn selectable_years(&self) -> Vec<i32> {
        let year = self.clock.today().year();
        (year - 2..=year + 2).collect()
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedClock(pub NaiveDate);

#[cfg(test)]
impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
