use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use crate::errors::ClientError;
use crate::models::{
    Booking, CalendarEvent, EntityId, EventSource, Granularity, TimeOff,
};
use crate::services::api::BookingBackend;
use crate::services::calendar::{resolve_booking_colors, TIME_OFF_COLORS};
use crate::services::staff_colors::StaffColorMap;
use crate::services::time_format;

pub const UNKNOWN_CUSTOMER: &str = "Unknown Customer";
pub const NO_NOTES: &str = "No notes";
pub const TIME_OFF_DESCRIPTION: &str = "Time off";

pub const BOOKING_ID_PREFIX: &str = "booking-";
pub const TIME_OFF_ID_PREFIX: &str = "timeoff-";

// ── Range cache ──

struct CacheEntry {
    key: String,
    fetched_at: Instant,
    bookings: Vec<Booking>,
}

/// Single-slot cache of the last booking range fetched.
pub struct BookingCache {
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl BookingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn key(start: NaiveDate, end: NaiveDate, staff_ids: &[EntityId]) -> String {
        let staff_key = if staff_ids.is_empty() {
            "all".to_string()
        } else {
            let mut ids: Vec<&str> = staff_ids.iter().map(EntityId::as_str).collect();
            ids.sort_unstable();
            ids.join(",")
        };
        format!(
            "{}_{}_{}",
            time_format::format_date(&start),
            time_format::format_date(&end),
            staff_key
        )
    }

    pub fn get(&self, key: &str) -> Option<Vec<Booking>> {
        let entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        entry
            .as_ref()
            .filter(|e| e.key == key && e.fetched_at.elapsed() < self.ttl)
            .map(|e| e.bookings.clone())
    }

    pub fn put(&self, key: String, bookings: Vec<Booking>) {
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) = Some(CacheEntry {
            key,
            fetched_at: Instant::now(),
            bookings,
        });
    }

    pub fn clear(&self) {
        *self.entry.lock().unwrap_or_else(|e| e.into_inner()) = None;
        tracing::debug!("booking cache cleared");
    }
}

// ── Fetchers ──

/// Bookings in `[start, end)`. An expired session resolves to an empty list,
/// which therefore means "unknown", not "none".
pub async fn fetch_bookings(
    backend: &dyn BookingBackend,
    cache: &BookingCache,
    start: NaiveDate,
    end: NaiveDate,
    staff_ids: &[EntityId],
) -> Result<Vec<Booking>, ClientError> {
    let key = BookingCache::key(start, end, staff_ids);
    if let Some(hit) = cache.get(&key) {
        tracing::debug!(key = %key, "booking cache hit");
        return Ok(hit);
    }

    match backend.list_bookings(start, end, staff_ids).await? {
        Some(bookings) => {
            cache.put(key, bookings.clone());
            Ok(bookings)
        }
        None => {
            tracing::warn!("bookings unavailable, session expired");
            Ok(Vec::new())
        }
    }
}

pub async fn fetch_time_offs(
    backend: &dyn BookingBackend,
    start: NaiveDate,
    granularity: Granularity,
) -> Result<Vec<TimeOff>, ClientError> {
    match backend.list_time_offs(start, granularity).await? {
        Some(time_offs) => Ok(time_offs),
        None => {
            tracing::warn!("time offs unavailable, session expired");
            Ok(Vec::new())
        }
    }
}

// ── Mapping ──

pub fn booking_to_event(booking: &Booking, colors: &StaffColorMap) -> CalendarEvent {
    let staff_colors: Vec<String> = booking
        .staff_ids()
        .iter()
        .map(|id| colors.color_for(id.as_str()))
        .collect();
    let palette = resolve_booking_colors(&booking.status, &staff_colors);

    let title = booking
        .customer
        .as_ref()
        .and_then(|c| c.display_name())
        .unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string());
    let description = booking
        .notes
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| NO_NOTES.to_string());

    CalendarEvent {
        id: format!("{BOOKING_ID_PREFIX}{}", booking.id),
        title,
        description,
        start: booking.start_at,
        end: booking.end_at,
        background_color: palette.background.to_string(),
        border_color: palette.border,
        text_color: palette.text.to_string(),
        staff_colors,
        source: EventSource::Booking(booking.clone()),
    }
}

/// One event per booking, in input order.
pub fn bookings_to_events(bookings: &[Booking], colors: &StaffColorMap) -> Vec<CalendarEvent> {
    bookings
        .iter()
        .map(|b| booking_to_event(b, colors))
        .collect()
}

pub fn time_off_to_event(time_off: &TimeOff) -> CalendarEvent {
    let staff_name = time_off
        .user
        .as_ref()
        .map(|u| u.full_name())
        .unwrap_or_else(|| "Staff".to_string());

    CalendarEvent {
        id: format!("{TIME_OFF_ID_PREFIX}{}", time_off.id),
        title: format!("{staff_name} - Time Off"),
        description: time_off
            .reason
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| TIME_OFF_DESCRIPTION.to_string()),
        start: time_off.start_date,
        end: time_off.end_date,
        background_color: TIME_OFF_COLORS.background.to_string(),
        border_color: TIME_OFF_COLORS.border.to_string(),
        text_color: TIME_OFF_COLORS.text.to_string(),
        staff_colors: Vec::new(),
        source: EventSource::TimeOff(time_off.clone()),
    }
}

pub fn time_offs_to_events(time_offs: &[TimeOff]) -> Vec<CalendarEvent> {
    time_offs.iter().map(time_off_to_event).collect()
}
