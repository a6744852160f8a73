use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::CatalogService;
use super::{null_as_default, EntityId};
use crate::services::time_format::utc_lenient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: EntityId,
    #[serde(with = "utc_lenient")]
    pub start_at: DateTime<Utc>,
    #[serde(with = "utc_lenient")]
    pub end_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: BookingStatus,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub booking_services: Vec<BookingService>,
    /// Legacy aggregate of assigned staff, still sent by some endpoints.
    #[serde(default)]
    pub user_ids: Option<Vec<EntityId>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_price: i64,
}

impl Booking {
    /// Staff ids from line items followed by the legacy list, first occurrence wins.
    pub fn staff_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = Vec::new();
        let line_items = self.booking_services.iter().filter_map(|s| s.user_id.clone());
        let legacy = self.user_ids.iter().flatten().cloned();
        for id in line_items.chain(legacy) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingService {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub category_service_id: Option<EntityId>,
    #[serde(default)]
    pub user_id: Option<EntityId>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category_service: Option<CatalogService>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Customer {
    pub fn display_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) if !first.is_empty() && !last.is_empty() => {
                Some(format!("{first} {last}"))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BookingStatus {
    Pending,
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    Other(String),
}

impl Default for BookingStatus {
    fn default() -> Self {
        BookingStatus::Other(String::new())
    }
}

impl BookingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => BookingStatus::Pending,
            "scheduled" => BookingStatus::Scheduled,
            "confirmed" => BookingStatus::Confirmed,
            "completed" => BookingStatus::Completed,
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Other(s.to_string()),
        }
    }
}

impl From<String> for BookingStatus {
    fn from(s: String) -> Self {
        BookingStatus::parse(&s)
    }
}

impl From<BookingStatus> for String {
    fn from(status: BookingStatus) -> Self {
        status.as_str().to_string()
    }
}
