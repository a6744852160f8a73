use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use rusqlite::Connection;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_tungstenite::tungstenite::Message;

use crate::db::queries;
use crate::errors::ClientError;
use crate::models::{ApiNotification, Notification};
use crate::services::api::BookingBackend;

pub const UNREAD_COUNT_KEY: &str = "notifications_unread";

const BROADCAST_CAPACITY: usize = 64;

// ── Notification centre ──

/// In-memory notification list, newest first, with a persisted unread badge.
pub struct NotificationCenter {
    backend: Arc<dyn BookingBackend>,
    store: Arc<Mutex<Connection>>,
    items: Mutex<Vec<Notification>>,
    unread: Mutex<u32>,
    tx: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    pub fn new(backend: Arc<dyn BookingBackend>, store: Arc<Mutex<Connection>>) -> Self {
        let unread = {
            let conn = store.lock().unwrap_or_else(|e| e.into_inner());
            match queries::get_preference(&conn, UNREAD_COUNT_KEY) {
                Ok(v) => v.and_then(|s| s.parse().ok()).unwrap_or(0),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read unread count");
                    0
                }
            }
        };
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            backend,
            store,
            items: Mutex::new(Vec::new()),
            unread: Mutex::new(unread),
            tx,
        }
    }

    pub fn subscribe(&self) -> BroadcastStream<Notification> {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub fn list(&self) -> Vec<Notification> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn unread_count(&self) -> u32 {
        *self.unread.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Overrides the badge with an authoritative count from the API.
    pub fn set_unread_count(&self, count: u32) {
        let mut unread = self.unread.lock().unwrap_or_else(|e| e.into_inner());
        *unread = count;
        self.persist_unread(count);
    }

    /// Replaces the list with a page fetched from the API and recounts unread.
    pub fn load(&self, fetched: Vec<ApiNotification>) {
        let items: Vec<Notification> = fetched.into_iter().map(Notification::from).collect();
        let unread = items.iter().filter(|n| !n.read).count() as u32;
        *self.items.lock().unwrap_or_else(|e| e.into_inner()) = items;
        self.set_unread_count(unread);
    }

    /// Parses one frame from the live channel. Unparseable frames are logged and dropped.
    pub fn handle_raw(&self, frame: &str) -> Option<Notification> {
        let payload: Value = match serde_json::from_str(frame) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable notification frame");
                return None;
            }
        };
        let Some(notification) = Notification::from_payload(&payload) else {
            tracing::debug!("ignoring non-object notification payload");
            return None;
        };
        self.push(notification.clone());
        Some(notification)
    }

    /// Prepends without deduplication and fans out to subscribers.
    pub fn push(&self, notification: Notification) {
        tracing::info!(id = %notification.id, title = %notification.title, "notification received");
        if !notification.read {
            let mut unread = self.unread.lock().unwrap_or_else(|e| e.into_inner());
            *unread += 1;
            self.persist_unread(*unread);
        }
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(0, notification.clone());
        // No subscribers is fine.
        let _ = self.tx.send(notification);
    }

    /// Marks one notification read on the server, then locally. `Ok(false)`
    /// when signed out.
    pub async fn mark_read(&self, id: &str) -> Result<bool, ClientError> {
        if self.backend.mark_notification_read(id).await?.is_none() {
            return Ok(false);
        }

        let was_unread = {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            match items.iter_mut().find(|n| n.id == id) {
                Some(n) => !std::mem::replace(&mut n.read, true),
                None => true,
            }
        };
        if was_unread {
            let mut unread = self.unread.lock().unwrap_or_else(|e| e.into_inner());
            *unread = unread.saturating_sub(1);
            self.persist_unread(*unread);
        }
        Ok(true)
    }

    fn persist_unread(&self, count: u32) {
        let conn = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = queries::set_preference(&conn, UNREAD_COUNT_KEY, &count.to_string()) {
            tracing::warn!(error = %e, "failed to persist unread count");
        }
    }
}

// ── Transport ──

/// One event from the live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Close handshake from the server, with its close code when one was sent.
    Close(Option<u16>),
}

impl Frame {
    /// Close code 1000. Anything else, including a bare stream end, is unexpected.
    pub fn is_normal_close(&self) -> bool {
        matches!(self, Frame::Close(Some(NORMAL_CLOSE)))
    }
}

pub const NORMAL_CLOSE: u16 = 1000;

pub type FrameStream = BoxStream<'static, Result<Frame, ClientError>>;

/// Source of raw notification frames. Each `connect` opens a fresh session;
/// the stream ending without a close frame means the connection dropped.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn connect(&self) -> Result<FrameStream, ClientError>;
}

pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl NotificationTransport for WebSocketTransport {
    async fn connect(&self) -> Result<FrameStream, ClientError> {
        let (socket, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        tracing::info!(url = %self.url, "notification channel connected");

        let frames = socket.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(Message::Close(close)) => {
                    Some(Ok(Frame::Close(close.map(|c| u16::from(c.code)))))
                }
                Ok(_) => None,
                Err(e) => Some(Err(ClientError::Network(e.to_string()))),
            }
        });
        Ok(frames.boxed())
    }
}

// ── Reconnect supervisor ──

/// Keeps the live channel open, reconnecting after unexpected closures with a
/// fixed delay. Gives up after `max_reconnects` consecutive failed attempts.
pub struct LiveChannel {
    transport: Arc<dyn NotificationTransport>,
    center: Arc<NotificationCenter>,
    max_reconnects: u32,
    delay: Duration,
}

impl LiveChannel {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        center: Arc<NotificationCenter>,
        max_reconnects: u32,
        delay: Duration,
    ) -> Self {
        Self {
            transport,
            center,
            max_reconnects,
            delay,
        }
    }

    /// Runs until the server closes the channel normally or the reconnect
    /// budget is exhausted.
    pub async fn run(&self) {
        let mut attempts: u32 = 0;
        loop {
            match self.transport.connect().await {
                Ok(mut frames) => {
                    attempts = 0;
                    while let Some(frame) = frames.next().await {
                        match frame {
                            Ok(Frame::Text(text)) => {
                                self.center.handle_raw(&text);
                            }
                            Ok(close) if close.is_normal_close() => {
                                tracing::info!("notification channel closed by server");
                                return;
                            }
                            Ok(Frame::Close(code)) => {
                                tracing::warn!(?code, "notification channel closed abnormally");
                                break;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "notification channel error");
                                break;
                            }
                        }
                    }
                    tracing::warn!("notification channel closed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "notification channel connect failed");
                }
            }

            if attempts >= self.max_reconnects {
                tracing::error!(
                    attempts,
                    "notification channel gave up after reaching max reconnect attempts"
                );
                return;
            }
            attempts += 1;
            tracing::info!(attempt = attempts, max = self.max_reconnects, "reconnecting notification channel");
            tokio::time::sleep(self.delay).await;
        }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}
