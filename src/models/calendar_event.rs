use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Booking, TimeOff};

/// Renderable projection of a booking or time-off. Rebuilt on every refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub background_color: String,
    pub border_color: String,
    pub text_color: String,
    pub staff_colors: Vec<String>,
    pub source: EventSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum EventSource {
    Booking(Booking),
    TimeOff(TimeOff),
}

impl CalendarEvent {
    pub fn is_time_off(&self) -> bool {
        matches!(self.source, EventSource::TimeOff(_))
    }

    pub fn booking(&self) -> Option<&Booking> {
        match &self.source {
            EventSource::Booking(b) => Some(b),
            EventSource::TimeOff(_) => None,
        }
    }
}
