use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::ClientError;
use crate::models::{Booking, BookingStatus, CalendarEvent, CalendarView, TimeOff, ViewRange};
use crate::services::api::BookingBackend;
use crate::services::fetchers::{self, BookingCache};
use crate::services::staff_colors::StaffColorMap;

pub const VIEW_PREFERENCE_KEY: &str = "calendar_view";

// ── Colors ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPalette {
    pub background: &'static str,
    pub border: &'static str,
    pub text: &'static str,
}

pub const TIME_OFF_COLORS: StatusPalette = StatusPalette {
    background: "#E5E7EB",
    border: "#9CA3AF",
    text: "#374151",
};

pub const DEFAULT_COLORS: StatusPalette = StatusPalette {
    background: "#3B82F6",
    border: "#2563EB",
    text: "#FFFFFF",
};

/// Fixed status → color table. `None` for statuses the table does not know.
pub fn status_colors(status: &BookingStatus) -> Option<StatusPalette> {
    let palette = match status {
        BookingStatus::Pending => StatusPalette {
            background: "#FEF3C7",
            border: "#F59E0B",
            text: "#92400E",
        },
        BookingStatus::Scheduled => StatusPalette {
            background: "#DBEAFE",
            border: "#3B82F6",
            text: "#1E3A8A",
        },
        BookingStatus::Confirmed => StatusPalette {
            background: "#D1FAE5",
            border: "#10B981",
            text: "#065F46",
        },
        BookingStatus::Completed => StatusPalette {
            background: "#E0E7FF",
            border: "#6366F1",
            text: "#3730A3",
        },
        BookingStatus::Cancelled => StatusPalette {
            background: "#FEE2E2",
            border: "#EF4444",
            text: "#991B1B",
        },
        BookingStatus::Other(_) => return None,
    };
    Some(palette)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventColors {
    pub background: &'static str,
    pub border: String,
    pub text: &'static str,
}

/// Status colors always win. Staff colors only tint the border of bookings
/// whose status the table does not recognize.
pub fn resolve_booking_colors(status: &BookingStatus, staff_colors: &[String]) -> EventColors {
    match status_colors(status) {
        Some(p) => EventColors {
            background: p.background,
            border: p.border.to_string(),
            text: p.text,
        },
        None => EventColors {
            background: DEFAULT_COLORS.background,
            border: staff_colors
                .first()
                .cloned()
                .unwrap_or_else(|| DEFAULT_COLORS.border.to_string()),
            text: DEFAULT_COLORS.text,
        },
    }
}

// ── Filtering ──

/// A booking passes when any of its line-item or legacy staff ids is in the filter.
pub fn booking_matches(booking: &Booking, filter: &HashSet<String>) -> bool {
    booking
        .staff_ids()
        .iter()
        .any(|id| filter.contains(id.as_str()))
}

pub fn time_off_matches(time_off: &TimeOff, filter: &HashSet<String>) -> bool {
    time_off
        .owner_id()
        .is_some_and(|id| filter.contains(id.as_str()))
}

// ── Engine ──

/// Consumer of the rendered event set. Each call replaces everything shown.
pub trait RenderTarget: Send + Sync {
    fn replace_events(&self, events: Vec<CalendarEvent>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Rendered(usize),
    /// A newer refresh started before this one finished; nothing was rendered.
    Stale,
    /// Fetching failed; an empty set was rendered.
    Failed,
}

#[derive(Debug, Clone)]
struct ViewState {
    view: CalendarView,
    range: ViewRange,
    staff_filter: Option<HashSet<String>>,
}

pub struct CalendarEngine {
    backend: Arc<dyn BookingBackend>,
    colors: Arc<StaffColorMap>,
    cache: Arc<BookingCache>,
    target: Arc<dyn RenderTarget>,
    store: Arc<Mutex<Connection>>,
    state: Mutex<ViewState>,
    generation: AtomicU64,
}

impl CalendarEngine {
    pub fn new(
        backend: Arc<dyn BookingBackend>,
        colors: Arc<StaffColorMap>,
        cache: Arc<BookingCache>,
        target: Arc<dyn RenderTarget>,
        store: Arc<Mutex<Connection>>,
        view: CalendarView,
        anchor: NaiveDate,
    ) -> Self {
        let range = ViewRange::around(&view, anchor);
        Self {
            backend,
            colors,
            cache,
            target,
            store,
            state: Mutex::new(ViewState {
                view,
                range,
                staff_filter: None,
            }),
            generation: AtomicU64::new(0),
        }
    }

    pub fn view(&self) -> CalendarView {
        self.lock_state().view.clone()
    }

    pub fn range(&self) -> ViewRange {
        self.lock_state().range
    }

    pub fn staff_filter(&self) -> Option<HashSet<String>> {
        self.lock_state().staff_filter.clone()
    }

    /// Switches view mode, keeping the anchor date, and remembers the choice.
    pub async fn set_view(&self, view: CalendarView) -> RefreshOutcome {
        self.select_view(view);
        self.refresh().await
    }

    /// Like [`set_view`](Self::set_view) without the refresh.
    pub fn select_view(&self, view: CalendarView) {
        {
            let mut state = self.lock_state();
            state.range = ViewRange::around(&view, state.range.anchor);
            state.view = view.clone();
        }
        self.persist_view(&view);
    }

    pub async fn navigate(&self, anchor: NaiveDate) -> RefreshOutcome {
        {
            let mut state = self.lock_state();
            state.range = ViewRange::around(&state.view, anchor);
        }
        self.refresh().await
    }

    /// An empty selection clears the filter.
    pub async fn set_staff_filter<I, S>(&self, staff_ids: I) -> RefreshOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: HashSet<String> = staff_ids.into_iter().map(Into::into).collect();
        self.lock_state().staff_filter = if ids.is_empty() { None } else { Some(ids) };
        self.refresh().await
    }

    /// Restores the last persisted view mode, if any, without refreshing.
    pub fn restore_view(&self) -> Option<CalendarView> {
        let saved = {
            let conn = self.store.lock().unwrap_or_else(|e| e.into_inner());
            queries::get_preference(&conn, VIEW_PREFERENCE_KEY)
        };
        match saved {
            Ok(Some(name)) => {
                let view = CalendarView::parse(&name);
                let mut state = self.lock_state();
                state.range = ViewRange::around(&view, state.range.anchor);
                state.view = view.clone();
                Some(view)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read saved calendar view");
                None
            }
        }
    }

    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    /// Rebuilds the event set for the current range and hands it to the render
    /// target wholesale.
    pub async fn refresh(&self) -> RefreshOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let state = self.lock_state().clone();

        let result = self.collect(&state).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "discarding stale calendar response");
            return RefreshOutcome::Stale;
        }

        match result {
            Ok(events) => {
                let count = events.len();
                tracing::debug!(
                    count,
                    view = state.view.as_str(),
                    start = %state.range.start,
                    end = %state.range.end,
                    "calendar rendered"
                );
                self.target.replace_events(events);
                RefreshOutcome::Rendered(count)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load calendar events");
                self.target.replace_events(Vec::new());
                RefreshOutcome::Failed
            }
        }
    }

    async fn collect(&self, state: &ViewState) -> Result<Vec<CalendarEvent>, ClientError> {
        let granularity = state.view.granularity();
        let range = state.range;
        let backend = self.backend.as_ref();

        let (bookings, time_offs) = tokio::try_join!(
            fetchers::fetch_bookings(backend, &self.cache, range.start, range.end, &[]),
            fetchers::fetch_time_offs(backend, range.time_off_start(granularity), granularity),
        )?;

        let (bookings, time_offs): (Vec<Booking>, Vec<TimeOff>) = match &state.staff_filter {
            Some(filter) => (
                bookings
                    .into_iter()
                    .filter(|b| booking_matches(b, filter))
                    .collect(),
                time_offs
                    .into_iter()
                    .filter(|t| time_off_matches(t, filter))
                    .collect(),
            ),
            None => (bookings, time_offs),
        };

        let mut events = fetchers::bookings_to_events(&bookings, &self.colors);
        events.extend(fetchers::time_offs_to_events(&time_offs));
        Ok(events)
    }

    fn persist_view(&self, view: &CalendarView) {
        let conn = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = queries::set_preference(&conn, VIEW_PREFERENCE_KEY, view.as_str()) {
            tracing::warn!(error = %e, "failed to save calendar view");
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
