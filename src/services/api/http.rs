use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{BookingBackend, ResponseBody, SessionHandler};
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::models::{
    ApiEnvelope, ApiNotification, Booking, Category, Customer, DashboardSnapshot, EntityId,
    Granularity, StaffMember, TimeOff,
};
use crate::services::time_format;

const TOKEN_EXPIRED_DETAIL: &str = "access token has expired";

/// Session-cookie authenticated client for the booking backend.
pub struct ApiClient {
    config: ClientConfig,
    client: reqwest::Client,
    session: Arc<dyn SessionHandler>,
    refresh_epoch: AtomicU64,
    refresh_lock: Mutex<bool>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Arc<dyn SessionHandler>) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        if let Some(cookie) = &config.session_cookie {
            match Url::parse(&config.api_base_url) {
                Ok(url) => jar.add_cookie_str(cookie, &url),
                Err(e) => tracing::warn!(error = %e, "invalid API base URL, session cookie not set"),
            }
        }

        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .cookie_provider(jar)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            config,
            client,
            session,
            refresh_epoch: AtomicU64::new(0),
            refresh_lock: Mutex::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        no_cache: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let mut req = self
            .client
            .request(method, self.config.api_url(path))
            .query(query);

        if no_cache {
            req = req
                .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
                .header(PRAGMA, "no-cache")
                .header(EXPIRES, "0");
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        Ok(req.send().await?)
    }

    /// Performs a request, handling an expired session.
    ///
    /// A 401 whose detail says the access token expired (or whose body is not
    /// JSON) triggers one token refresh and one retry. Any other 401, a failed
    /// refresh, or a second 401 runs the login redirect and yields `Ok(None)`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<ResponseBody>, ClientError> {
        self.request_inner(method, path, query, body, false).await
    }

    async fn request_inner(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        no_cache: bool,
    ) -> Result<Option<ResponseBody>, ClientError> {
        let resp = self
            .send(method.clone(), path, query, body, no_cache)
            .await
            .inspect_err(|e| tracing::error!(error = %e, path, "API request failed"))?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return handle_response(resp).await.map(Some);
        }

        if should_refresh(resp).await && self.refresh_shared().await {
            let retry = self.send(method, path, query, body, no_cache).await?;
            if retry.status() != StatusCode::UNAUTHORIZED {
                return handle_response(retry).await.map(Some);
            }
        }

        self.session.redirect_to_login(&self.config.login_url());
        Ok(None)
    }

    /// Refreshes the access token once for all callers that saw the same expiry.
    async fn refresh_shared(&self) -> bool {
        let seen = self.refresh_epoch.load(Ordering::SeqCst);
        let mut last_ok = self.refresh_lock.lock().await;
        if self.refresh_epoch.load(Ordering::SeqCst) != seen {
            return *last_ok;
        }

        let ok = self.refresh_token().await;
        *last_ok = ok;
        self.refresh_epoch.fetch_add(1, Ordering::SeqCst);
        ok
    }

    async fn refresh_token(&self) -> bool {
        let resp = match self
            .send(Method::POST, "/users/auth/refresh-token", &[], None, false)
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(error = %e, "token refresh failed");
                return false;
            }
        };

        if !resp.status().is_success() {
            return false;
        }

        match resp.json::<Value>().await {
            Ok(data) => data["success"].as_bool().unwrap_or(false),
            Err(e) => {
                tracing::error!(error = %e, "token refresh returned invalid body");
                false
            }
        }
    }

    async fn data<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        no_cache: bool,
    ) -> Result<Option<T>, ClientError> {
        let Some(body) = self.request_inner(method, path, query, body, no_cache).await? else {
            return Ok(None);
        };
        let envelope: ApiEnvelope<T> = match body {
            ResponseBody::Json(json) => serde_json::from_value(json)?,
            ResponseBody::Text(_) => return Err(ClientError::MalformedResponse),
        };

        if !envelope.success {
            return Err(ClientError::request(
                StatusCode::OK.as_u16(),
                envelope.message.unwrap_or_default(),
            ));
        }
        envelope.data.map(Some).ok_or(ClientError::MalformedResponse)
    }

    async fn ack(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<()>, ClientError> {
        let Some(body) = self.request_inner(method, path, &[], body, false).await? else {
            return Ok(None);
        };
        let envelope: ApiEnvelope<Value> = match body {
            ResponseBody::Json(json) => serde_json::from_value(json)?,
            ResponseBody::Text(_) => return Err(ClientError::MalformedResponse),
        };

        if envelope.success {
            Ok(Some(()))
        } else {
            Err(ClientError::request(
                StatusCode::OK.as_u16(),
                envelope.message.unwrap_or_default(),
            ))
        }
    }

    fn utc_body(&self, body: &Value) -> Value {
        time_format::convert_time_params_to_utc(body, &self.config.utc_offset)
    }

    fn cache_buster() -> (&'static str, String) {
        ("_t", Utc::now().timestamp_millis().to_string())
    }

    // ── Directory reads ──

    pub async fn current_user(&self) -> Result<Option<StaffMember>, ClientError> {
        self.data(Method::GET, "/users/me", &[], None, false).await
    }

    pub async fn staff(&self) -> Result<Option<Vec<StaffMember>>, ClientError> {
        self.data(Method::GET, "/companies/users", &[Self::cache_buster()], None, true)
            .await
    }

    pub async fn company_services(&self) -> Result<Option<Vec<Category>>, ClientError> {
        self.data(Method::GET, "/companies/services", &[Self::cache_buster()], None, true)
            .await
    }

    pub async fn customers(&self) -> Result<Option<Vec<Customer>>, ClientError> {
        self.data(Method::GET, "/companies/customers", &[], None, false)
            .await
    }

    pub async fn notifications(&self) -> Result<Option<Vec<ApiNotification>>, ClientError> {
        self.data(Method::GET, "/notifications", &[], None, false).await
    }

    pub async fn unread_notifications_count(&self) -> Result<Option<u32>, ClientError> {
        let data: Option<Value> = self
            .data(Method::GET, "/notifications/unread-count", &[], None, false)
            .await?;
        Ok(data.map(|d| d["unread_count"].as_u64().unwrap_or(0) as u32))
    }

    /// User, staff, unread count and this week's time-offs, fetched together.
    /// Any failure is logged and yields `None`.
    pub async fn refresh_dashboard(&self) -> Option<DashboardSnapshot> {
        let three_days_ago = Utc::now().date_naive() - Duration::days(3);
        let (user, staff, unread, time_offs) = tokio::join!(
            self.current_user(),
            self.staff(),
            self.unread_notifications_count(),
            self.list_time_offs(three_days_ago, Granularity::Weekly),
        );

        let collected = (|| -> Result<DashboardSnapshot, ClientError> {
            Ok(DashboardSnapshot {
                user: user?,
                staff: staff?.unwrap_or_default(),
                unread_notifications: unread?.unwrap_or(0),
                time_offs: time_offs?.unwrap_or_default(),
            })
        })();

        collected
            .inspect_err(|e| tracing::error!(error = %e, "failed to refresh dashboard data"))
            .ok()
    }
}

#[async_trait]
impl BookingBackend for ApiClient {
    async fn list_bookings(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        staff_ids: &[EntityId],
    ) -> Result<Option<Vec<Booking>>, ClientError> {
        let mut query = vec![
            ("start_date", time_format::format_date(&start)),
            ("end_date", time_format::format_date(&end)),
        ];
        query.extend(staff_ids.iter().map(|id| ("staff_id", id.to_string())));

        tracing::debug!(start = %start, end = %end, "fetching bookings");
        self.data(Method::GET, "/bookings", &query, None, false).await
    }

    async fn list_time_offs(
        &self,
        start: NaiveDate,
        granularity: Granularity,
    ) -> Result<Option<Vec<TimeOff>>, ClientError> {
        let query = [
            ("start_date", time_format::format_date(&start)),
            ("availability_type", granularity.as_str().to_string()),
        ];

        tracing::debug!(start = %start, granularity = granularity.as_str(), "fetching time offs");
        self.data(Method::GET, "/users/time-offs", &query, None, false)
            .await
    }

    async fn get_booking(&self, id: &EntityId) -> Result<Option<Booking>, ClientError> {
        self.data(Method::GET, &format!("/bookings/{id}"), &[], None, false)
            .await
    }

    async fn create_booking(&self, body: &Value) -> Result<Option<()>, ClientError> {
        let body = self.utc_body(body);
        self.ack(Method::POST, "/bookings/users/create_booking", Some(&body))
            .await
    }

    async fn update_booking(&self, id: &EntityId, body: &Value) -> Result<Option<()>, ClientError> {
        let body = self.utc_body(body);
        self.ack(Method::PUT, &format!("/bookings/{id}"), Some(&body))
            .await
    }

    async fn delete_booking(&self, id: &EntityId) -> Result<Option<()>, ClientError> {
        self.ack(Method::DELETE, &format!("/bookings/{id}"), None).await
    }

    async fn confirm_booking(&self, id: &EntityId) -> Result<Option<()>, ClientError> {
        self.ack(Method::PUT, &format!("/bookings/{id}/confirm"), None)
            .await
    }

    async fn complete_booking(&self, id: &EntityId) -> Result<Option<()>, ClientError> {
        self.ack(Method::PUT, &format!("/bookings/{id}/complete"), None)
            .await
    }

    async fn create_time_off(&self, body: &Value) -> Result<Option<()>, ClientError> {
        let body = self.utc_body(body);
        self.ack(Method::POST, "/users/time-offs", Some(&body)).await
    }

    async fn delete_time_off(&self, id: &EntityId) -> Result<Option<()>, ClientError> {
        self.ack(Method::DELETE, &format!("/users/time-offs/{id}"), None)
            .await
    }

    async fn mark_notification_read(&self, id: &str) -> Result<Option<()>, ClientError> {
        self.ack(Method::POST, &format!("/notifications/mark-as-read/{id}"), None)
            .await
    }
}

/// Decides whether a 401 is worth a token refresh.
async fn should_refresh(resp: reqwest::Response) -> bool {
    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => json["detail"]
            .as_str()
            .map(|d| d.to_lowercase().contains(TOKEN_EXPIRED_DETAIL))
            .unwrap_or(false),
        Err(_) => true,
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<ResponseBody, ClientError> {
    let status = resp.status();
    let is_json = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    let text = resp.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|json| {
                json["message"]
                    .as_str()
                    .or_else(|| json["detail"].as_str())
                    .map(str::to_string)
            })
            .unwrap_or_default();
        tracing::warn!(status = status.as_u16(), message = %message, "backend returned an error");
        return Err(ClientError::request(status.as_u16(), message));
    }

    if is_json {
        Ok(ResponseBody::Json(serde_json::from_str(&text)?))
    } else {
        Ok(ResponseBody::Text(text))
    }
}
