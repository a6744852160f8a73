use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CalendarView {
    DayGridMonth,
    TimeGridWeek,
    DayGridWeek,
    ListWeek,
    TimeGridDay,
    DayGridDay,
    ListDay,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Monthly,
    Weekly,
    Daily,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Monthly => "monthly",
            Granularity::Weekly => "weekly",
            Granularity::Daily => "daily",
        }
    }
}

impl CalendarView {
    pub fn as_str(&self) -> &str {
        match self {
            CalendarView::DayGridMonth => "dayGridMonth",
            CalendarView::TimeGridWeek => "timeGridWeek",
            CalendarView::DayGridWeek => "dayGridWeek",
            CalendarView::ListWeek => "listWeek",
            CalendarView::TimeGridDay => "timeGridDay",
            CalendarView::DayGridDay => "dayGridDay",
            CalendarView::ListDay => "listDay",
            CalendarView::Other(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "dayGridMonth" => CalendarView::DayGridMonth,
            "timeGridWeek" => CalendarView::TimeGridWeek,
            "dayGridWeek" => CalendarView::DayGridWeek,
            "listWeek" => CalendarView::ListWeek,
            "timeGridDay" => CalendarView::TimeGridDay,
            "dayGridDay" => CalendarView::DayGridDay,
            "listDay" => CalendarView::ListDay,
            other => CalendarView::Other(other.to_string()),
        }
    }

    /// Fixed view → availability granularity table.
    pub fn granularity(&self) -> Granularity {
        match self {
            CalendarView::DayGridMonth => Granularity::Monthly,
            CalendarView::TimeGridWeek | CalendarView::DayGridWeek | CalendarView::ListWeek => {
                Granularity::Weekly
            }
            _ => Granularity::Daily,
        }
    }
}

impl From<String> for CalendarView {
    fn from(s: String) -> Self {
        CalendarView::parse(&s)
    }
}

impl From<CalendarView> for String {
    fn from(view: CalendarView) -> Self {
        view.as_str().to_string()
    }
}

/// Visible date window. `end` is exclusive; `anchor` is the navigated-to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub anchor: NaiveDate,
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

impl ViewRange {
    /// Window shown by `view` when navigated to `anchor`. Weeks start on Sunday
    /// and the month grid always spans six weeks.
    pub fn around(view: &CalendarView, anchor: NaiveDate) -> Self {
        let (start, end) = match view.granularity() {
            Granularity::Monthly => {
                let first = anchor.with_day(1).unwrap_or(anchor);
                let start = week_start(first);
                (start, start + Duration::days(42))
            }
            Granularity::Weekly => {
                let start = week_start(anchor);
                (start, start + Duration::days(7))
            }
            Granularity::Daily => (anchor, anchor + Duration::days(1)),
        };
        Self { start, end, anchor }
    }

    /// Time-offs are queried from the first of the month in month views,
    /// otherwise from the view start.
    pub fn time_off_start(&self, granularity: Granularity) -> NaiveDate {
        match granularity {
            Granularity::Monthly => self.anchor.with_day(1).unwrap_or(self.start),
            Granularity::Weekly | Granularity::Daily => self.start,
        }
    }
}
