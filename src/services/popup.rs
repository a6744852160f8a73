use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, TimeDelta};

/// Window in which a second click/select is treated as the same tap.
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Longest drag-selection accepted on mobile before it is considered accidental.
pub const MAX_MOBILE_SELECTION_MINUTES: i64 = 120;

const EDGE_MARGIN: f64 = 10.0;

pub const DETAIL_POPUP: PopupSize = PopupSize {
    width: 300.0,
    height: 200.0,
};

pub const SLOT_POPUP: PopupSize = PopupSize {
    width: 200.0,
    height: 100.0,
};

// ── Geometry ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopupSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Top-left corner for a popup opened at `pointer`, kept inside the viewport.
///
/// The popup sits just below-right of the pointer; if that would overflow the
/// right edge it flips to the left of the pointer, and if it would overflow the
/// bottom it is pulled up. Neither coordinate goes below the edge margin.
pub fn place_popup(pointer: Point, size: PopupSize, viewport: Viewport) -> Point {
    let mut left = pointer.x + EDGE_MARGIN;
    let mut top = pointer.y + EDGE_MARGIN;

    if left + size.width > viewport.width {
        left = (pointer.x - size.width - EDGE_MARGIN).max(EDGE_MARGIN);
    }
    if top + size.height > viewport.height {
        top = (viewport.height - size.height - EDGE_MARGIN).max(EDGE_MARGIN);
    }

    Point { x: left, y: top }
}

// ── Interactions ──

#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    EventClick { event_id: String, pointer: Point },
    DateClick { at: NaiveDateTime, pointer: Point },
    Select {
        start: NaiveDateTime,
        end: NaiveDateTime,
        pointer: Point,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupAction {
    ShowDetail { event_id: String, position: Point },
    OfferCreate {
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        position: Point,
    },
}

pub type DismissHandler = Box<dyn FnOnce() + Send>;

/// Turns raw calendar interactions into popup actions.
pub struct PopupController {
    viewport: Viewport,
    mobile: bool,
    last_accepted: Option<Instant>,
    dismiss: Option<DismissHandler>,
}

impl PopupController {
    pub fn new(viewport: Viewport, mobile: bool) -> Self {
        Self {
            viewport,
            mobile,
            last_accepted: None,
            dismiss: None,
        }
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Maps an interaction observed at `now` to an action, or `None` when it is
    /// a duplicate inside the debounce window or an accidental mobile drag.
    pub fn handle(&mut self, interaction: Interaction, now: Instant) -> Option<PopupAction> {
        if let Some(prev) = self.last_accepted {
            if now.saturating_duration_since(prev) < DEBOUNCE {
                tracing::debug!("duplicate calendar interaction suppressed");
                return None;
            }
        }

        let action = match interaction {
            Interaction::EventClick { event_id, pointer } => PopupAction::ShowDetail {
                event_id,
                position: place_popup(pointer, DETAIL_POPUP, self.viewport),
            },
            Interaction::DateClick { at, pointer } => PopupAction::OfferCreate {
                start: at,
                end: None,
                position: place_popup(pointer, SLOT_POPUP, self.viewport),
            },
            Interaction::Select {
                start,
                end,
                pointer,
            } => {
                if self.mobile
                    && end - start > TimeDelta::minutes(MAX_MOBILE_SELECTION_MINUTES)
                {
                    tracing::debug!("long mobile selection discarded");
                    return None;
                }
                PopupAction::OfferCreate {
                    start,
                    end: Some(end),
                    position: place_popup(pointer, SLOT_POPUP, self.viewport),
                }
            }
        };

        self.last_accepted = Some(now);
        Some(action)
    }

    /// Installs the handler that closes the open popup. A previous handler is
    /// dropped without running, so there is never more than one.
    pub fn set_dismiss_handler(&mut self, handler: DismissHandler) {
        self.dismiss = Some(handler);
    }

    pub fn has_dismiss_handler(&self) -> bool {
        self.dismiss.is_some()
    }

    /// Runs and clears the current dismiss handler. Returns whether one ran.
    pub fn dismiss(&mut self) -> bool {
        match self.dismiss.take() {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }
}
