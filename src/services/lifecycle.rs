use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde_json::{json, Value};

use crate::errors::ClientError;
use crate::models::{BookingFormState, EntityId, FormMode, TimeOffDraft};
use crate::services::api::BookingBackend;
use crate::services::calendar::CalendarEngine;
use crate::services::time_format;

pub const SUCCESS_BANNER: Duration = Duration::from_secs(5);
pub const MAX_BANNER: Duration = Duration::from_secs(8);

// ── UI seam ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
    pub duration: Duration,
}

impl Banner {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Success,
            message: message.into(),
            duration: SUCCESS_BANNER,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Error,
            message: message.into(),
            duration: MAX_BANNER,
        }
    }

    /// Overrides the display time, capped at [`MAX_BANNER`].
    pub fn lasting(mut self, duration: Duration) -> Self {
        self.duration = duration.min(MAX_BANNER);
        self
    }
}

/// A pending drag-to-reschedule, holding both the original and proposed times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reschedule {
    pub booking_id: EntityId,
    pub event_id: String,
    pub old_start: DateTime<Utc>,
    pub old_end: DateTime<Utc>,
    pub new_start: DateTime<Utc>,
    pub new_end: DateTime<Utc>,
}

impl Reschedule {
    fn payload(&self) -> Value {
        json!({
            "start_time": time_format::to_iso_utc(&self.new_start),
            "end_time": time_format::to_iso_utc(&self.new_end),
        })
    }
}

/// Everything the lifecycle controller needs from the surrounding UI.
#[async_trait]
pub trait UiShell: Send + Sync {
    fn open_form(&self, form: &BookingFormState);
    fn close_form(&self);
    fn show_banner(&self, banner: Banner);
    /// Inline message for failed client-side validation.
    fn alert(&self, message: &str);
    /// Puts a dragged event back where it was.
    fn revert_event(&self, event_id: &str, start: DateTime<Utc>, end: DateTime<Utc>);
    /// Asks the user to accept a reschedule. `false` means declined.
    async fn confirm_reschedule(&self, change: &Reschedule) -> bool;
}

// ── Lifecycle ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Draft,
    Submitting,
    Committed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    /// A precondition failed; no request was sent.
    Invalid(String),
    /// The backend or network rejected the request; the form stays open.
    Failed(String),
    /// The user declined a reschedule.
    Declined,
    /// The session expired and the login redirect already ran.
    SignedOut,
}

impl Outcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed)
    }
}

pub struct BookingLifecycle {
    backend: Arc<dyn BookingBackend>,
    calendar: Arc<CalendarEngine>,
    ui: Arc<dyn UiShell>,
    offset: FixedOffset,
    state: Mutex<SubmissionState>,
}

impl BookingLifecycle {
    pub fn new(
        backend: Arc<dyn BookingBackend>,
        calendar: Arc<CalendarEngine>,
        ui: Arc<dyn UiShell>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            backend,
            calendar,
            ui,
            offset,
            state: Mutex::new(SubmissionState::Draft),
        }
    }

    pub fn state(&self) -> SubmissionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: SubmissionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    // ── Forms ──

    pub fn open_create(&self, at: NaiveDateTime) -> BookingFormState {
        let form = BookingFormState::create_at(at);
        self.set_state(SubmissionState::Draft);
        self.ui.open_form(&form);
        form
    }

    /// Loads the booking and opens it for editing. `Ok(None)` when signed out.
    pub async fn open_edit(&self, id: &EntityId) -> Result<Option<BookingFormState>, ClientError> {
        if id.is_blank() {
            return Err(ClientError::Validation("Booking ID is missing".to_string()));
        }
        let Some(booking) = self.backend.get_booking(id).await? else {
            return Ok(None);
        };
        let form = BookingFormState::from_booking(&booking, &self.offset);
        self.set_state(SubmissionState::Draft);
        self.ui.open_form(&form);
        Ok(Some(form))
    }

    // ── Bookings ──

    /// Creates or updates depending on the form mode.
    pub async fn submit(&self, form: &BookingFormState) -> Outcome {
        match &form.mode {
            FormMode::Create => self.create(form).await,
            FormMode::Edit(id) => self.update(id, form).await,
        }
    }

    pub async fn create(&self, form: &BookingFormState) -> Outcome {
        let payload = match self.serialize(form) {
            Ok(p) => p,
            Err(e) => return self.reject(e),
        };
        let backend = self.backend.clone();
        self.run("Booking created successfully", true, async move {
            backend.create_booking(&payload).await
        })
        .await
    }

    pub async fn update(&self, id: &EntityId, form: &BookingFormState) -> Outcome {
        if id.is_blank() {
            return self.reject(ClientError::Validation("Booking ID is missing".to_string()));
        }
        let payload = match self.serialize(form) {
            Ok(p) => p,
            Err(e) => return self.reject(e),
        };
        let backend = self.backend.clone();
        let id = id.clone();
        self.run("Booking updated successfully", true, async move {
            backend.update_booking(&id, &payload).await
        })
        .await
    }

    pub async fn delete(&self, id: &EntityId) -> Outcome {
        if id.is_blank() {
            return self.reject(ClientError::Validation("Booking ID is missing".to_string()));
        }
        let backend = self.backend.clone();
        let id = id.clone();
        self.run("Booking deleted successfully", true, async move {
            backend.delete_booking(&id).await
        })
        .await
    }

    pub async fn confirm(&self, id: &EntityId) -> Outcome {
        if id.is_blank() {
            return self.reject(ClientError::Validation("Booking ID is missing".to_string()));
        }
        let backend = self.backend.clone();
        let id = id.clone();
        self.run("Booking confirmed successfully", false, async move {
            backend.confirm_booking(&id).await
        })
        .await
    }

    pub async fn complete(&self, id: &EntityId) -> Outcome {
        if id.is_blank() {
            return self.reject(ClientError::Validation("Booking ID is missing".to_string()));
        }
        let backend = self.backend.clone();
        let id = id.clone();
        self.run("Booking marked as completed", false, async move {
            backend.complete_booking(&id).await
        })
        .await
    }

    /// Drag-to-reschedule. Nothing is sent unless the user accepts, and the
    /// event snaps back to its original slot on decline or failure.
    pub async fn reschedule(&self, change: Reschedule) -> Outcome {
        if change.booking_id.is_blank() || change.new_end <= change.new_start {
            self.revert(&change);
            return self.reject(ClientError::Validation("Invalid booking time".to_string()));
        }

        if !self.ui.confirm_reschedule(&change).await {
            tracing::debug!(booking_id = %change.booking_id, "reschedule declined");
            self.revert(&change);
            return Outcome::Declined;
        }

        let backend = self.backend.clone();
        let id = change.booking_id.clone();
        let payload = change.payload();
        let outcome = self
            .run("Booking rescheduled successfully", false, async move {
                backend.update_booking(&id, &payload).await
            })
            .await;

        if !outcome.is_committed() {
            self.revert(&change);
        }
        outcome
    }

    // ── Time off ──

    pub async fn create_time_off(&self, draft: &TimeOffDraft) -> Outcome {
        let params = match draft.to_params() {
            Ok(p) => p,
            Err(e) => return self.reject(e),
        };
        let backend = self.backend.clone();
        self.run("Time off added successfully", true, async move {
            backend.create_time_off(&params).await
        })
        .await
    }

    pub async fn delete_time_off(&self, id: &EntityId) -> Outcome {
        if id.is_blank() {
            return self.reject(ClientError::Validation("Time off ID is missing".to_string()));
        }
        let backend = self.backend.clone();
        let id = id.clone();
        self.run("Time off deleted successfully", false, async move {
            backend.delete_time_off(&id).await
        })
        .await
    }

    // ── Internals ──

    fn serialize(&self, form: &BookingFormState) -> Result<Value, ClientError> {
        let payload = form.to_payload(&self.offset)?;
        Ok(serde_json::to_value(payload)?)
    }

    fn reject(&self, err: ClientError) -> Outcome {
        let message = err.user_message();
        tracing::debug!(%message, "rejected before submission");
        self.ui.alert(&message);
        Outcome::Invalid(message)
    }

    fn revert(&self, change: &Reschedule) {
        self.ui
            .revert_event(&change.event_id, change.old_start, change.old_end);
    }

    async fn run<F>(&self, success: &str, closes_form: bool, request: F) -> Outcome
    where
        F: std::future::Future<Output = Result<Option<()>, ClientError>>,
    {
        self.set_state(SubmissionState::Submitting);

        match request.await {
            Ok(Some(())) => {
                self.set_state(SubmissionState::Committed);
                if closes_form {
                    self.ui.close_form();
                }
                self.calendar.invalidate_cache();
                self.calendar.refresh().await;
                self.ui.show_banner(Banner::success(success));
                Outcome::Committed
            }
            Ok(None) => {
                self.set_state(SubmissionState::Draft);
                Outcome::SignedOut
            }
            Err(e) => {
                self.set_state(SubmissionState::Draft);
                tracing::error!(error = %e, "booking request failed");
                let message = e.user_message();
                self.ui.show_banner(Banner::error(message.clone()));
                Outcome::Failed(message)
            }
        }
    }
}
