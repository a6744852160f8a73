use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use salonbook::config::ClientConfig;
use salonbook::models::{CalendarEvent, CalendarView};
use salonbook::services::calendar::{RefreshOutcome, RenderTarget};
use salonbook::state::ClientContext;

/// Prints every rendered event as one JSON line on stdout.
struct JsonLines;

impl RenderTarget for JsonLines {
    fn replace_events(&self, events: Vec<CalendarEvent>) {
        for event in events {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, id = %event.id, "failed to encode event"),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ClientConfig::from_env();

    let view = std::env::var("CALENDAR_VIEW")
        .ok()
        .filter(|v| !v.is_empty())
        .map(|v| CalendarView::parse(&v));
    let anchor = match std::env::var("CALENDAR_DATE") {
        Ok(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("CALENDAR_DATE must be YYYY-MM-DD: {e}"))?,
        Err(_) => Utc::now().with_timezone(&config.utc_offset).date_naive(),
    };
    let staff_filter: Vec<String> = std::env::var("STAFF_FILTER")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let follow = std::env::var("FOLLOW_NOTIFICATIONS").is_ok_and(|v| v == "1");

    tracing::info!(api = %config.api_base_url, store = %config.local_store_path, "starting salonbook");

    let ctx = ClientContext::connect(config, Arc::new(JsonLines), view, anchor)?;

    if let Some(api) = &ctx.api {
        if let Some(dashboard) = api.refresh_dashboard().await {
            ctx.notifications.set_unread_count(dashboard.unread_notifications);
            let user = dashboard.user.as_ref().map(|u| u.full_name()).unwrap_or_default();
            tracing::info!(
                user = %user,
                staff = dashboard.staff.len(),
                time_offs = dashboard.time_offs.len(),
                unread = dashboard.unread_notifications,
                "dashboard refreshed"
            );
        }
    }

    let range = ctx.calendar.range();
    tracing::info!(
        view = ctx.calendar.view().as_str(),
        start = %range.start,
        end = %range.end,
        "loading calendar"
    );

    let outcome = if staff_filter.is_empty() {
        ctx.calendar.refresh().await
    } else {
        ctx.calendar.set_staff_filter(staff_filter).await
    };
    match outcome {
        RefreshOutcome::Rendered(count) => tracing::info!(count, "calendar loaded"),
        RefreshOutcome::Failed => tracing::warn!("calendar could not be loaded"),
        RefreshOutcome::Stale => {}
    }

    if !follow {
        return Ok(());
    }
    let Some(channel) = ctx.live_channel() else {
        tracing::warn!("FOLLOW_NOTIFICATIONS set but NOTIFICATIONS_WS_URL is not");
        return Ok(());
    };

    if let Some(api) = &ctx.api {
        match api.notifications().await {
            Ok(Some(page)) => ctx.notifications.load(page),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to load notifications"),
        }
        match api.unread_notifications_count().await {
            Ok(Some(count)) => ctx.notifications.set_unread_count(count),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to load unread count"),
        }
    }
    tracing::info!(unread = ctx.notifications.unread_count(), "following notifications");

    let mut incoming = ctx.notifications.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(item) = incoming.next().await {
            match item {
                Ok(notification) => match serde_json::to_string(&notification) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "failed to encode notification"),
                },
                Err(e) => tracing::warn!(error = %e, "notification subscriber lagged"),
            }
        }
    });

    Arc::new(channel).spawn().await?;
    printer.abort();

    Ok(())
}
