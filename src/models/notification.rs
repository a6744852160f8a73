use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EntityId;

/// Notification as pushed by the live channel or listed by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiNotification {
    pub id: EntityId,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
    pub created_at: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn from_api_type(api_type: &str) -> Self {
        match api_type {
            "payment" => NotificationKind::Success,
            "reminder" => NotificationKind::Warning,
            "alert" => NotificationKind::Error,
            _ => NotificationKind::Info,
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "success" => NotificationKind::Success,
            "warning" => NotificationKind::Warning,
            "error" => NotificationKind::Error,
            _ => NotificationKind::Info,
        }
    }
}

pub fn title_for(api_type: &str) -> &'static str {
    match api_type {
        "general" => "General Notification",
        "booking_created" => "Booking Created",
        "booking" => "Booking Update",
        "payment" => "Payment Notification",
        "reminder" => "Reminder",
        "alert" => "Alert",
        "system" => "System Notification",
        _ => "Notification",
    }
}

/// Display-ready notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub timestamp: String,
    pub read: bool,
    pub data: Option<Value>,
}

impl From<ApiNotification> for Notification {
    fn from(api: ApiNotification) -> Self {
        Self {
            id: api.id.to_string(),
            title: title_for(&api.kind).to_string(),
            kind: NotificationKind::from_api_type(&api.kind),
            message: api.message,
            timestamp: api.created_at,
            read: api.status.as_deref() == Some("read"),
            data: api.data,
        }
    }
}

impl Notification {
    /// Builds a notification from a raw payload. Payloads carrying both `id`
    /// and `created_at` follow the API format; anything else is the legacy
    /// shape and gets a freshly generated id.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let has_api_shape = payload.get("id").is_some_and(|v| !v.is_null())
            && payload.get("created_at").is_some_and(|v| !v.is_null());

        if has_api_shape {
            return serde_json::from_value::<ApiNotification>(payload.clone())
                .ok()
                .map(Notification::from);
        }

        if !payload.is_object() {
            return None;
        }

        let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: text("title").unwrap_or_else(|| "New Notification".to_string()),
            message: text("message")
                .or_else(|| text("info"))
                .unwrap_or_else(|| "You have a new notification".to_string()),
            kind: text("type")
                .map(|t| NotificationKind::parse(&t))
                .unwrap_or(NotificationKind::Info),
            timestamp: chrono::Utc::now().to_rfc3339(),
            read: false,
            data: payload.get("data").filter(|v| !v.is_null()).cloned(),
        })
    }
}
