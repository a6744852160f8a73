use std::sync::{Arc, Mutex};

use chrono::{FixedOffset, NaiveDate};
use rusqlite::Connection;

use crate::config::ClientConfig;
use crate::db;
use crate::errors::ClientError;
use crate::models::CalendarView;
use crate::services::api::http::ApiClient;
use crate::services::api::{BookingBackend, StoreSession};
use crate::services::calendar::{CalendarEngine, RenderTarget};
use crate::services::fetchers::BookingCache;
use crate::services::lifecycle::{BookingLifecycle, UiShell};
use crate::services::notifications::{LiveChannel, NotificationCenter, WebSocketTransport};
use crate::services::staff_colors::StaffColorMap;

pub const DEFAULT_VIEW: CalendarView = CalendarView::TimeGridWeek;

/// The shared service objects, constructed once and handed to consumers.
pub struct ClientContext {
    pub config: ClientConfig,
    pub store: Arc<Mutex<Connection>>,
    pub backend: Arc<dyn BookingBackend>,
    /// Concrete HTTP client; `None` when assembled over another backend.
    pub api: Option<Arc<ApiClient>>,
    pub colors: Arc<StaffColorMap>,
    pub cache: Arc<BookingCache>,
    pub calendar: Arc<CalendarEngine>,
    pub notifications: Arc<NotificationCenter>,
}

impl ClientContext {
    /// Opens the local store and wires everything to the HTTP backend.
    pub fn connect(
        config: ClientConfig,
        target: Arc<dyn RenderTarget>,
        view: Option<CalendarView>,
        anchor: NaiveDate,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(Mutex::new(db::init_store(&config.local_store_path)?));
        let session = Arc::new(StoreSession::new(store.clone()));
        let api = Arc::new(ApiClient::new(config.clone(), session)?);

        let mut ctx = Self::assemble(config, store, api.clone(), target, view, anchor)?;
        ctx.api = Some(api);
        Ok(ctx)
    }

    /// Wires the services over an already-open store and any backend.
    ///
    /// An explicit `view` is selected and remembered; otherwise the last saved
    /// view is restored, falling back to the week grid.
    pub fn assemble(
        config: ClientConfig,
        store: Arc<Mutex<Connection>>,
        backend: Arc<dyn BookingBackend>,
        target: Arc<dyn RenderTarget>,
        view: Option<CalendarView>,
        anchor: NaiveDate,
    ) -> Result<Self, ClientError> {
        let colors = Arc::new(StaffColorMap::load(store.clone())?);
        let cache = Arc::new(BookingCache::new(config.booking_cache_ttl));

        let calendar = Arc::new(CalendarEngine::new(
            backend.clone(),
            colors.clone(),
            cache.clone(),
            target,
            store.clone(),
            DEFAULT_VIEW,
            anchor,
        ));
        match view {
            Some(view) => calendar.select_view(view),
            None => {
                if let Some(restored) = calendar.restore_view() {
                    tracing::debug!(view = restored.as_str(), "restored calendar view");
                }
            }
        }

        let notifications = Arc::new(NotificationCenter::new(backend.clone(), store.clone()));

        Ok(Self {
            config,
            store,
            backend,
            api: None,
            colors,
            cache,
            calendar,
            notifications,
        })
    }

    pub fn offset(&self) -> FixedOffset {
        self.config.utc_offset
    }

    pub fn lifecycle(&self, ui: Arc<dyn UiShell>) -> BookingLifecycle {
        BookingLifecycle::new(
            self.backend.clone(),
            self.calendar.clone(),
            ui,
            self.config.utc_offset,
        )
    }

    /// Live notification channel, when a WebSocket URL is configured.
    pub fn live_channel(&self) -> Option<LiveChannel> {
        let url = self.config.notifications_ws_url.as_ref()?;
        Some(LiveChannel::new(
            Arc::new(WebSocketTransport::new(url.clone())),
            self.notifications.clone(),
            self.config.ws_max_reconnects,
            self.config.ws_reconnect_delay,
        ))
    }
}
