use serde::{Deserialize, Serialize};

use super::{null_as_default, EntityId, TimeOff};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogService {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Minutes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: i64,
    #[serde(default)]
    pub discount_price: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl CatalogService {
    pub fn effective_price(&self) -> i64 {
        self.discount_price.filter(|p| *p > 0).unwrap_or(self.price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: Vec<CatalogService>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: EntityId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl StaffMember {
    pub fn full_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim();
        if name.is_empty() {
            "Staff".to_string()
        } else {
            name.to_string()
        }
    }
}

/// Everything the dashboard header needs in one round of requests.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub user: Option<StaffMember>,
    pub staff: Vec<StaffMember>,
    pub unread_notifications: u32,
    pub time_offs: Vec<TimeOff>,
}
