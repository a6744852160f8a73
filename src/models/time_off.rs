use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;
use crate::services::time_format::utc_lenient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeOff {
    pub id: EntityId,
    #[serde(with = "utc_lenient")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "utc_lenient")]
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<TimeOffOwner>,
    #[serde(default)]
    pub user_id: Option<EntityId>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TimeOff {
    pub fn owner_id(&self) -> Option<&EntityId> {
        self.user
            .as_ref()
            .and_then(|u| u.id.as_ref())
            .or(self.user_id.as_ref())
    }
}

/// Staff member embedded in a time-off record. Every field is optional so a
/// partial user never fails the surrounding list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeOffOwner {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl TimeOffOwner {
    pub fn full_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        match name.trim() {
            "" => "Staff".to_string(),
            trimmed => trimmed.to_string(),
        }
    }
}
