use chrono::{NaiveDate, TimeZone};
use log::{debug, info};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::client::TelemetryClient;
use crate::services::panel::{Panel, Phase};
use crate::services::poll::{self, CancelToken, PollHandle};
use crate::services::widgets::{
    self, AlertFeed, ConsumptionCalendar, FlowChart, LeakageChart, MaxFlowGauge, StatusTimeline,
};
use crate::session::{NOT_LOGGED_IN, SessionContext, SessionEvent};
use crate::utils::lock;
use crate::window::{Clock, Direction, Granularity, SystemClock, TimeWindow, WindowSelector};

/// Name of a panel whose state changed.
pub type Update = &'static str;

/// Every panel of the device dashboard, each with its own load state.
///
/// Panels share the session and the client but nothing else. Flow and
/// alerts are polled; the rest load on start, on window changes and
/// whenever the session changes.
pub struct Dashboard<C: Clock + Send + 'static = SystemClock> {
    session: Arc<SessionContext>,
    flow_window: Arc<Mutex<WindowSelector<C>>>,
    month: Arc<Mutex<WindowSelector<C>>>,
    pub flow: Arc<Panel<FlowChart>>,
    pub leakage: Arc<Panel<LeakageChart>>,
    pub max_flow: Arc<Panel<MaxFlowGauge>>,
    pub consumption: Arc<Panel<ConsumptionCalendar>>,
    pub alerts: Arc<Panel<AlertFeed>>,
    pub status: Arc<Panel<StatusTimeline>>,
    pollers: Mutex<Vec<PollHandle>>,
    updates: Mutex<Sender<Update>>,
}

impl<C: Clock + Clone + Send + 'static> Dashboard<C> {
    pub fn new(
        client: Arc<TelemetryClient>,
        session: Arc<SessionContext>,
        flow_window: WindowSelector<C>,
    ) -> (Arc<Self>, Receiver<Update>) {
        let month = WindowSelector::new(flow_window.clock().clone(), Granularity::DayOfMonth);
        let flow_window = Arc::new(Mutex::new(flow_window));
        let month = Arc::new(Mutex::new(month));

        let flow = {
            let (client, session, selector) = (Arc::clone(&client), Arc::clone(&session), Arc::clone(&flow_window));
            Panel::new("flow", move || {
                let s = session.require()?;
                let window = lock(&selector).window();
                widgets::load_flow(&client, &s, window)
            })
        };
        let leakage = {
            let (client, session) = (Arc::clone(&client), Arc::clone(&session));
            Panel::new("leakage", move || widgets::load_leakage(&client, &session.require()?))
        };
        let max_flow = {
            let (client, session) = (Arc::clone(&client), Arc::clone(&session));
            Panel::new("max-flow", move || widgets::load_max_flow(&client, &session.require()?))
        };
        let consumption = {
            let (client, session, selector) = (Arc::clone(&client), Arc::clone(&session), Arc::clone(&month));
            Panel::new("consumption", move || {
                let s = session.require()?;
                let window = lock(&selector).window();
                widgets::load_consumption(&client, &s, window)
            })
        };
        let alerts = {
            let (client, session) = (Arc::clone(&client), Arc::clone(&session));
            Panel::new("alerts", move || widgets::load_alerts(&client, &session.require()?))
        };
        let status = {
            let (client, session) = (Arc::clone(&client), Arc::clone(&session));
            Panel::new("status", move || widgets::load_status(&client, &session.require()?))
        };

        let (tx, rx) = mpsc::channel();
        let dashboard = Arc::new(Dashboard {
            session: Arc::clone(&session),
            flow_window,
            month,
            flow: Arc::new(flow),
            leakage: Arc::new(leakage),
            max_flow: Arc::new(max_flow),
            consumption: Arc::new(consumption),
            alerts: Arc::new(alerts),
            status: Arc::new(status),
            pollers: Mutex::new(Vec::new()),
            updates: Mutex::new(tx),
        });

        // Weak: the session outlives the dashboard and must not keep it alive.
        let weak: Weak<Self> = Arc::downgrade(&dashboard);
        session.subscribe(move |event| {
            if let Some(dashboard) = weak.upgrade() {
                dashboard.on_session_event(event);
            }
        });

        (dashboard, rx)
    }

    fn on_session_event(&self, event: &SessionEvent) {
        info!("Session changed ({:?}); reloading all panels", event);
        self.reset_all();
        if let SessionEvent::LoggedIn(_) = event {
            self.reload_all();
        }
    }

    fn notify(&self, name: Update) {
        // a closed receiver only means nobody is drawing any more
        let _ = lock(&self.updates).send(name);
    }

    fn reset_all(&self) {
        self.flow.reset();
        self.leakage.reset();
        self.max_flow.reset();
        self.consumption.reset();
        self.alerts.reset();
        self.status.reset();
        self.notify("all");
    }

    /// Loads every panel once, one after another.
    pub fn reload_all(&self) {
        let token = CancelToken::new();
        self.refresh(&self.flow, &token);
        self.refresh(&self.leakage, &token);
        self.refresh(&self.max_flow, &token);
        self.refresh(&self.consumption, &token);
        self.refresh(&self.alerts, &token);
        self.refresh(&self.status, &token);
    }

    fn refresh<T: Clone>(&self, panel: &Panel<T>, token: &CancelToken) {
        if panel.refresh(token) {
            self.notify(panel.name());
        }
    }

    /// Starts the flow and alerts pollers and loads the other panels once.
    pub fn start(self: &Arc<Self>, flow_every: Duration, alerts_every: Duration) -> std::io::Result<()> {
        let mut pollers = lock(&self.pollers);
        pollers.push(self.poll_panel(Arc::clone(&self.flow), flow_every)?);
        pollers.push(self.poll_panel(Arc::clone(&self.alerts), alerts_every)?);
        drop(pollers);

        let token = CancelToken::new();
        self.refresh(&self.leakage, &token);
        self.refresh(&self.max_flow, &token);
        self.refresh(&self.consumption, &token);
        self.refresh(&self.status, &token);
        Ok(())
    }

    fn poll_panel<T>(self: &Arc<Self>, panel: Arc<Panel<T>>, every: Duration) -> std::io::Result<PollHandle>
    where
        T: Clone + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        let name = panel.name();
        poll::start(name, every, move |token| {
            if let Some(dashboard) = weak.upgrade() {
                // a login or logout from another process reloads every panel
                dashboard.session.sync();
                dashboard.refresh(&panel, token);
            }
        })
    }

    /// Stops pollers and disposes every panel; late responses are dropped.
    pub fn shutdown(&self) {
        let pollers = std::mem::take(&mut *lock(&self.pollers));
        for mut poller in pollers {
            poller.cancel();
        }
        self.flow.dispose();
        self.leakage.dispose();
        self.max_flow.dispose();
        self.consumption.dispose();
        self.alerts.dispose();
        self.status.dispose();
        debug!("dashboard shut down");
    }

    pub fn flow_window(&self) -> TimeWindow {
        lock(&self.flow_window).window()
    }

    pub fn selectable_years(&self) -> Vec<i32> {
        lock(&self.flow_window).selectable_years()
    }

    pub fn select_granularity(&self, granularity: Granularity) -> TimeWindow {
        let window = lock(&self.flow_window).select(granularity);
        self.refresh(&self.flow, &CancelToken::new());
        window
    }

    pub fn navigate_flow(&self, direction: Direction) -> TimeWindow {
        let window = lock(&self.flow_window).navigate(direction);
        self.refresh(&self.flow, &CancelToken::new());
        window
    }

    pub fn pick_flow_date(&self, date: NaiveDate) -> TimeWindow {
        let window = lock(&self.flow_window).pick(date);
        self.refresh(&self.flow, &CancelToken::new());
        window
    }

    pub fn navigate_month(&self, direction: Direction) -> TimeWindow {
        let window = lock(&self.month).navigate(direction);
        self.refresh(&self.consumption, &CancelToken::new());
        window
    }

    pub fn render<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: core::fmt::Display,
    {
        let banner = match self.session.current() {
            Some(_) => String::new(),
            None => format!("{NOT_LOGGED_IN}\n"),
        };
        let sections = [
            section(&self.flow, FlowChart::render),
            section(&self.leakage, LeakageChart::render),
            section(&self.max_flow, MaxFlowGauge::render),
            section(&self.consumption, ConsumptionCalendar::render),
            section(&self.alerts, |feed| feed.render(tz)),
            section(&self.status, |timeline| timeline.render(tz)),
        ];
        banner + &sections.join("\n")
    }
}

fn section<T: Clone>(panel: &Panel<T>, draw: impl Fn(&T) -> String) -> String {
    let snapshot = panel.snapshot();
    let mut out = match snapshot.data() {
        Some(data) => draw(data),
        None => format!("[{}] no data\n", panel.name()),
    };
    match snapshot.phase() {
        Phase::Loading => out.push_str("  (loading...)\n"),
        Phase::Failed => {
            let reason = snapshot.last_error().unwrap_or("unknown error");
            out.push_str(&format!("  (refresh failed: {reason})\n"));
        }
        Phase::Idle | Phase::Ready => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::test_support::{FakeTransport, fixture};
    use crate::window::FixedClock;
    use chrono::Utc;

    const BASE: &str = "http://backend.test";

    struct Harness {
        _dir: tempfile::TempDir,
        fake: FakeTransport,
        client: Arc<TelemetryClient>,
        session: Arc<SessionContext>,
        dashboard: Arc<Dashboard<FixedClock>>,
        updates: Receiver<Update>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeTransport::new();
        let client = Arc::new(TelemetryClient::new(BASE, Box::new(fake.clone())));
        let session = Arc::new(SessionContext::open(SessionStore::new(dir.path().join("session.json"))));
        let today = FixedClock(NaiveDate::from_ymd_opt(2024, 2, 14).unwrap());
        let selector = WindowSelector::new(today, Granularity::HourOfDay);
        let (dashboard, updates) = Dashboard::new(Arc::clone(&client), Arc::clone(&session), selector);

        fake.reply_post("http://backend.test/device/deviceLogin", 200, r#"{"jwt": "tok"}"#);
        fake.reply_get(
            "http://backend.test/readingperhour/AEX4004/daily/2024-02-14",
            200,
            &fixture("flow-daily.json"),
        );
        fake.reply_get(
            "http://backend.test/newWaterReading/AEX4004/leakage-analysis",
            200,
            &fixture("leakage.json"),
        );
        fake.reply_get(
            "http://backend.test/newWaterReading/AEX4004/maxflow-percentage",
            200,
            r#"{"percentage": 10, "totalReadings": 10, "maxFlowAlerts": 1, "date": "2024-02-13"}"#,
        );
        fake.reply_get(
            "http://backend.test/newWaterReading/AEX4004/consumption-analysis?month=2&year=2024",
            200,
            &fixture("consumption.json"),
        );
        fake.reply_get(
            "http://backend.test/newWaterReading/AEX4004/alerts",
            200,
            &fixture("alerts.json"),
        );
        fake.reply_get(
            "http://backend.test/newWaterReading/AEX4004/status-changes",
            200,
            &fixture("status-changes.json"),
        );

        Harness {
            _dir: dir,
            fake,
            client,
            session,
            dashboard,
            updates,
        }
    }

    fn all_ready(d: &Dashboard<FixedClock>) -> bool {
        [
            d.flow.snapshot().phase(),
            d.leakage.snapshot().phase(),
            d.max_flow.snapshot().phase(),
            d.consumption.snapshot().phase(),
            d.alerts.snapshot().phase(),
            d.status.snapshot().phase(),
        ]
        .iter()
        .all(|p| *p == Phase::Ready)
    }

    #[test]
    fn login_reloads_every_panel_and_logout_clears_them() {
        let h = harness();
        assert!(h.dashboard.render(&Utc).contains("[flow] no data"));

        h.session.login(&h.client, "AEX4004", "1234").unwrap();
        assert!(all_ready(&h.dashboard));
        assert!(h.updates.try_iter().count() >= 6);
        let text = h.dashboard.render(&Utc);
        assert!(text.contains("Water Flow Analytics [day] 14 Feb 2024"));
        assert!(text.contains("Alerts (3)"));

        h.session.logout();
        assert!(h.dashboard.flow.snapshot().data().is_none());
        assert!(h.dashboard.render(&Utc).contains("[alerts] no data"));
    }

    #[test]
    fn without_session_panels_fail_without_requests() {
        let h = harness();
        h.dashboard.reload_all();
        let snap = h.dashboard.flow.snapshot();
        assert_eq!(snap.phase(), Phase::Failed);
        assert_eq!(snap.last_error(), Some("not logged in"));
        assert!(h.fake.requests().is_empty());
    }

    #[test]
    fn navigation_refetches_with_new_window_and_keeps_data_on_failure() {
        let h = harness();
        h.session.login(&h.client, "AEX4004", "1234").unwrap();

        // no reply registered for the previous day: the refresh fails
        let window = h.dashboard.navigate_flow(Direction::Prev);
        assert_eq!(window.anchor(), NaiveDate::from_ymd_opt(2024, 2, 13).unwrap());
        let last = h.fake.requests().pop().unwrap();
        assert_eq!(last.url, "http://backend.test/readingperhour/AEX4004/daily/2024-02-13");

        let snap = h.dashboard.flow.snapshot();
        assert_eq!(snap.phase(), Phase::Failed);
        assert!(snap.data().is_some());
        assert!(h.dashboard.render(&Utc).contains("(refresh failed: network error"));

        let window = h.dashboard.select_granularity(Granularity::MonthOfYear);
        assert_eq!(window.anchor(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let last = h.fake.requests().pop().unwrap();
        assert_eq!(last.url, "http://backend.test/readingpermonth/AEX4004/yearly/2024");
    }

    #[test]
    fn month_navigation_reloads_consumption() {
        let h = harness();
        h.session.login(&h.client, "AEX4004", "1234").unwrap();
        h.fake.reply_get(
            "http://backend.test/newWaterReading/AEX4004/consumption-analysis?month=1&year=2024",
            200,
            r#"{"2024-01-01": "no-consumption"}"#,
        );
        let month = h.dashboard.navigate_month(Direction::Prev);
        assert_eq!(month.display_label(), "January 2024");
        let calendar = h.dashboard.consumption.snapshot().data().cloned().unwrap();
        assert_eq!(calendar.days.len(), 1);
        assert_eq!(calendar.no_consumption_days(), 1);
    }

    #[test]
    fn logout_from_another_process_clears_a_running_dashboard() {
        let h = harness();
        h.session.login(&h.client, "AEX4004", "1234").unwrap();
        assert!(all_ready(&h.dashboard));

        SessionContext::open(SessionStore::new(h._dir.path().join("session.json"))).logout();
        h.dashboard
            .start(Duration::from_secs(60), Duration::from_secs(60))
            .unwrap();

        let cleared = |d: &Dashboard<FixedClock>| {
            d.flow.snapshot().data().is_none()
                && d.alerts.snapshot().data().is_none()
                && d.leakage.snapshot().data().is_none()
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !cleared(&h.dashboard) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        h.dashboard.shutdown();

        assert!(cleared(&h.dashboard));
        assert!(h.session.current().is_none());
        assert!(h.dashboard.render(&Utc).starts_with("not logged in; run `login`\n"));
    }

    #[test]
    fn pollers_load_and_stop_on_shutdown() {
        let h = harness();
        h.session.login(&h.client, "AEX4004", "1234").unwrap();
        let before = h.fake.requests().len();

        h.dashboard
            .start(Duration::from_secs(60), Duration::from_secs(60))
            .unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while h.fake.requests().len() < before + 6 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(h.fake.requests().len(), before + 6);

        h.dashboard.shutdown();
        assert!(h.dashboard.alerts.is_disposed());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(h.fake.requests().len(), before + 6);
    }
}
