pub mod booking;
pub mod calendar_event;
pub mod catalog;
pub mod draft;
pub mod notification;
pub mod time_off;
pub mod view;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

pub use booking::{Booking, BookingService, BookingStatus, Customer};
pub use calendar_event::{CalendarEvent, EventSource};
pub use catalog::{Category, CatalogService, DashboardSnapshot, StaffMember};
pub use draft::{
    BookingFormState, BookingPayload, CustomerInfo, CustomerSelection, FormMode, NewCustomer,
    ServiceLine, TimeOffDraft,
};
pub use notification::{ApiNotification, Notification, NotificationKind};
pub use time_off::{TimeOff, TimeOffOwner};
pub use view::{CalendarView, Granularity, ViewRange};

/// Backend identifiers arrive as either JSON strings or numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct EntityId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for EntityId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => EntityId(s),
            RawId::Number(n) => EntityId(n.to_string()),
        }
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Standard `{success, data, message}` wrapper around backend payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Treats an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
