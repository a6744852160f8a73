use std::env;
use std::time::Duration;

use chrono::{FixedOffset, Local, Offset};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub api_prefix: String,
    pub login_path: String,
    pub session_cookie: Option<String>,
    pub local_store_path: String,
    pub notifications_ws_url: Option<String>,
    pub booking_cache_ttl: Duration,
    pub ws_max_reconnects: u32,
    pub ws_reconnect_delay: Duration,
    pub utc_offset: FixedOffset,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            api_base_url: env::var("API_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/users/api/v1".to_string()),
            login_path: env::var("LOGIN_PATH").unwrap_or_else(|_| "/users/login/".to_string()),
            session_cookie: env::var("SESSION_COOKIE").ok().filter(|v| !v.is_empty()),
            local_store_path: env::var("LOCAL_STORE_PATH")
                .unwrap_or_else(|_| "salonbook.db".to_string()),
            notifications_ws_url: env::var("NOTIFICATIONS_WS_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            booking_cache_ttl: Duration::from_secs(
                env::var("BOOKING_CACHE_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            ws_max_reconnects: env::var("WS_MAX_RECONNECTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            ws_reconnect_delay: Duration::from_millis(
                env::var("WS_RECONNECT_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3000),
            ),
            utc_offset: env::var("UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i32>().ok())
                .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
                .unwrap_or_else(|| Local::now().offset().fix()),
        }
    }

    /// Absolute URL for a path under the versioned API prefix.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.api_base_url, self.api_prefix, path)
    }

    pub fn login_url(&self) -> String {
        format!("{}{}", self.api_base_url, self.login_path)
    }
}
