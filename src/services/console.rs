//! Line commands accepted on stdin while watching.

use chrono::NaiveDate;
use std::str::FromStr;

use crate::services::dashboard::Dashboard;
use crate::window::{Clock, Direction, Granularity, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Prev,
    Next,
    Select(Granularity),
    Pick(NaiveDate),
    Year(i32),
    PrevMonth,
    NextMonth,
    Refresh,
    Help,
    Quit,
}

impl FromStr for Control {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let arg = words.next();
        let control = match (command, arg) {
            ("p" | "prev", None) => Control::Prev,
            ("n" | "next", None) => Control::Next,
            ("g" | "granularity", Some(g)) => Control::Select(g.parse()?),
            ("d" | "date", Some(d)) => Control::Pick(
                NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| format!("`{d}` is not a YYYY-MM-DD date"))?,
            ),
            ("y" | "year", Some(y)) => Control::Year(y.parse().map_err(|_| format!("`{y}` is not a year"))?),
            ("m-", None) => Control::PrevMonth,
            ("m+", None) => Control::NextMonth,
            ("r" | "refresh", None) => Control::Refresh,
            ("h" | "help" | "?", None) => Control::Help,
            ("q" | "quit", None) => Control::Quit,
            _ => return Err(format!("unknown command `{}`; type `help`", line.trim())),
        };
        if words.next().is_some() {
            return Err(format!("too many arguments in `{}`", line.trim()));
        }
        Ok(control)
    }
}

pub fn help() -> String {
    let granularities = Granularity::ALL.map(Granularity::as_str).join("|");
    [
        "p | n             previous / next flow window".to_string(),
        format!("g {granularities}  switch flow granularity (resets to today)"),
        "d YYYY-MM-DD      jump the flow window to a date".to_string(),
        "y YYYY            jump the flow window to a year".to_string(),
        "m- | m+           previous / next consumption month".to_string(),
        "r                 reload every panel".to_string(),
        "q                 quit".to_string(),
    ]
    .join("\n")
}

/// Applies one control. Returns the window that changed, if any.
pub fn apply<C>(dashboard: &Dashboard<C>, control: Control) -> Result<Option<TimeWindow>, String>
where
    C: Clock + Clone + Send + 'static,
{
    let window = match control {
        Control::Prev => dashboard.navigate_flow(Direction::Prev),
        Control::Next => dashboard.navigate_flow(Direction::Next),
        Control::Select(g) => dashboard.select_granularity(g),
        Control::Pick(date) => dashboard.pick_flow_date(date),
        Control::Year(year) => {
            let years = dashboard.selectable_years();
            let date = NaiveDate::from_ymd_opt(year, 1, 1).filter(|_| years.contains(&year));
            match date {
                Some(date) => dashboard.pick_flow_date(date),
                None => {
                    let choices = years.iter().map(i32::to_string).collect::<Vec<_>>().join(", ");
                    return Err(format!("year must be one of {choices}"));
                }
            }
        }
        Control::PrevMonth => dashboard.navigate_month(Direction::Prev),
        Control::NextMonth => dashboard.navigate_month(Direction::Next),
        Control::Refresh => {
            dashboard.reload_all();
            return Ok(None);
        }
        Control::Help | Control::Quit => return Ok(None),
    };
    Ok(Some(window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TelemetryClient;
    use crate::session::{SessionContext, SessionStore};
    use crate::test_support::FakeTransport;
    use crate::window::{FixedClock, WindowSelector};
    use std::sync::Arc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_commands() {
        assert_eq!("p".parse::<Control>(), Ok(Control::Prev));
        assert_eq!(" next ".parse::<Control>(), Ok(Control::Next));
        assert_eq!("g year".parse::<Control>(), Ok(Control::Select(Granularity::MonthOfYear)));
        assert_eq!("d 2024-02-29".parse::<Control>(), Ok(Control::Pick(d(2024, 2, 29))));
        assert_eq!("y 2023".parse::<Control>(), Ok(Control::Year(2023)));
        assert_eq!("m-".parse::<Control>(), Ok(Control::PrevMonth));
        assert_eq!("q".parse::<Control>(), Ok(Control::Quit));
    }

    #[test]
    fn rejects_bad_commands() {
        assert!("d 2024-02-30".parse::<Control>().is_err());
        assert!("g week".parse::<Control>().is_err());
        assert!("p 3".parse::<Control>().is_err());
        assert!("".parse::<Control>().is_err());
        assert!(help().contains("g day|month|year"));
    }

    #[test]
    fn controls_move_the_windows() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(TelemetryClient::new("http://backend.test", Box::new(FakeTransport::new())));
        let session = Arc::new(SessionContext::open(SessionStore::new(dir.path().join("s.json"))));
        let selector = WindowSelector::new(FixedClock(d(2024, 5, 18)), Granularity::DayOfMonth);
        let (dashboard, _updates) = Dashboard::new(client, session, selector);

        let w = apply(&dashboard, Control::Next).unwrap().unwrap();
        assert_eq!(w.anchor(), d(2024, 6, 1));
        let w = apply(&dashboard, Control::Pick(d(2023, 12, 25))).unwrap().unwrap();
        assert_eq!(w.anchor(), d(2023, 12, 1));
        let w = apply(&dashboard, Control::Year(2026)).unwrap().unwrap();
        assert_eq!(w.anchor(), d(2026, 1, 1));
        assert_eq!(
            apply(&dashboard, Control::Year(2030)).unwrap_err(),
            "year must be one of 2022, 2023, 2024, 2025, 2026"
        );
        let w = apply(&dashboard, Control::PrevMonth).unwrap().unwrap();
        assert_eq!(w.display_label(), "April 2024");
        assert_eq!(dashboard.flow_window().anchor(), d(2026, 1, 1));
        assert_eq!(apply(&dashboard, Control::Help), Ok(None));
    }
}
