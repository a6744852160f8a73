pub mod http;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;

use crate::db::queries;
use crate::errors::ClientError;
use crate::models::{Booking, EntityId, Granularity, TimeOff};

pub const SESSION_MARKER_KEY: &str = "session_marker";

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

/// Backend operations the calendar and booking controllers depend on.
///
/// `Ok(None)` means the session expired: the login redirect has already
/// happened and the caller should treat the result as unknown.
#[async_trait]
pub trait BookingBackend: Send + Sync {
    async fn list_bookings(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        staff_ids: &[EntityId],
    ) -> Result<Option<Vec<Booking>>, ClientError>;

    async fn list_time_offs(
        &self,
        start: NaiveDate,
        granularity: Granularity,
    ) -> Result<Option<Vec<TimeOff>>, ClientError>;

    async fn get_booking(&self, id: &EntityId) -> Result<Option<Booking>, ClientError>;

    async fn create_booking(&self, body: &Value) -> Result<Option<()>, ClientError>;

    async fn update_booking(&self, id: &EntityId, body: &Value) -> Result<Option<()>, ClientError>;

    async fn delete_booking(&self, id: &EntityId) -> Result<Option<()>, ClientError>;

    async fn confirm_booking(&self, id: &EntityId) -> Result<Option<()>, ClientError>;

    async fn complete_booking(&self, id: &EntityId) -> Result<Option<()>, ClientError>;

    async fn create_time_off(&self, body: &Value) -> Result<Option<()>, ClientError>;

    async fn delete_time_off(&self, id: &EntityId) -> Result<Option<()>, ClientError>;

    async fn mark_notification_read(&self, id: &str) -> Result<Option<()>, ClientError>;
}

/// Hook run when the backend reports the session is gone.
pub trait SessionHandler: Send + Sync {
    fn redirect_to_login(&self, login_url: &str);
}

/// Clears the cached session marker in the local store and logs the redirect.
pub struct StoreSession {
    store: Arc<Mutex<Connection>>,
}

impl StoreSession {
    pub fn new(store: Arc<Mutex<Connection>>) -> Self {
        Self { store }
    }

    pub fn mark_signed_in(&self, marker: &str) -> Result<(), ClientError> {
        let conn = self.store.lock().unwrap_or_else(|e| e.into_inner());
        queries::set_preference(&conn, SESSION_MARKER_KEY, marker)?;
        Ok(())
    }

    pub fn is_signed_in(&self) -> bool {
        let conn = self.store.lock().unwrap_or_else(|e| e.into_inner());
        matches!(queries::get_preference(&conn, SESSION_MARKER_KEY), Ok(Some(_)))
    }
}

impl SessionHandler for StoreSession {
    fn redirect_to_login(&self, login_url: &str) {
        let conn = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = queries::delete_preference(&conn, SESSION_MARKER_KEY) {
            tracing::error!(error = %e, "failed to clear session marker");
        }
        tracing::warn!(login_url, "session expired, redirecting to login");
    }
}
