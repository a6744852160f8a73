use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::RawQuery;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};

use salonbook::config::ClientConfig;
use salonbook::db;
use salonbook::errors::ClientError;
use salonbook::models::{
    Booking, BookingFormState, CalendarEvent, CalendarView, CustomerSelection, EntityId, FormMode,
    Granularity, NewCustomer, TimeOff, TimeOffDraft,
};
use salonbook::services::api::http::ApiClient;
use salonbook::services::api::{BookingBackend, ResponseBody, SessionHandler};
use salonbook::services::calendar::{RefreshOutcome, RenderTarget};
use salonbook::services::lifecycle::{
    Banner, BannerKind, Outcome, Reschedule, SubmissionState, UiShell,
};
use salonbook::state::ClientContext;

// ── Mock Backend ──

#[derive(Default)]
struct MockBackend {
    bookings: Mutex<Vec<Booking>>,
    time_offs: Mutex<Vec<TimeOff>>,
    calls: Mutex<Vec<String>>,
    bodies: Mutex<Vec<Value>>,
    time_off_queries: Mutex<Vec<(NaiveDate, Granularity)>>,
    list_count: AtomicUsize,
    fail_lists: AtomicBool,
    signed_out: AtomicBool,
    slow_first_list: AtomicBool,
    reject_with: Mutex<Option<String>>,
}

impl MockBackend {
    fn with(bookings: Vec<Booking>, time_offs: Vec<TimeOff>) -> Arc<Self> {
        let backend = Self::default();
        *backend.bookings.lock().unwrap() = bookings;
        *backend.time_offs.lock().unwrap() = time_offs;
        Arc::new(backend)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn mutate(&self, call: String, body: Option<&Value>) -> Result<Option<()>, ClientError> {
        self.calls.lock().unwrap().push(call);
        if let Some(body) = body {
            self.bodies.lock().unwrap().push(body.clone());
        }
        if self.signed_out.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match self.reject_with.lock().unwrap().clone() {
            Some(message) => Err(ClientError::request(422, message)),
            None => Ok(Some(())),
        }
    }
}

#[async_trait]
impl BookingBackend for MockBackend {
    async fn list_bookings(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
        _staff_ids: &[EntityId],
    ) -> Result<Option<Vec<Booking>>, ClientError> {
        let n = self.list_count.fetch_add(1, Ordering::SeqCst);
        if n == 0 && self.slow_first_list.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(ClientError::Network("connection refused".to_string()));
        }
        if self.signed_out.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.bookings.lock().unwrap().clone()))
    }

    async fn list_time_offs(
        &self,
        start: NaiveDate,
        granularity: Granularity,
    ) -> Result<Option<Vec<TimeOff>>, ClientError> {
        self.time_off_queries
            .lock()
            .unwrap()
            .push((start, granularity));
        if self.signed_out.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.time_offs.lock().unwrap().clone()))
    }

    async fn get_booking(&self, id: &EntityId) -> Result<Option<Booking>, ClientError> {
        self.calls.lock().unwrap().push(format!("get:{id}"));
        let found = self
            .bookings
            .lock()
            .unwrap()
            .iter()
            .find(|b| &b.id == id)
            .cloned();
        found
            .map(Some)
            .ok_or_else(|| ClientError::request(404, "Booking not found"))
    }

    async fn create_booking(&self, body: &Value) -> Result<Option<()>, ClientError> {
        self.mutate("create".to_string(), Some(body))
    }

    async fn update_booking(&self, id: &EntityId, body: &Value) -> Result<Option<()>, ClientError> {
        self.mutate(format!("update:{id}"), Some(body))
    }

    async fn delete_booking(&self, id: &EntityId) -> Result<Option<()>, ClientError> {
        self.mutate(format!("delete:{id}"), None)
    }

    async fn confirm_booking(&self, id: &EntityId) -> Result<Option<()>, ClientError> {
        self.mutate(format!("confirm:{id}"), None)
    }

    async fn complete_booking(&self, id: &EntityId) -> Result<Option<()>, ClientError> {
        self.mutate(format!("complete:{id}"), None)
    }

    async fn create_time_off(&self, body: &Value) -> Result<Option<()>, ClientError> {
        self.mutate("create_time_off".to_string(), Some(body))
    }

    async fn delete_time_off(&self, id: &EntityId) -> Result<Option<()>, ClientError> {
        self.mutate(format!("delete_time_off:{id}"), None)
    }

    async fn mark_notification_read(&self, id: &str) -> Result<Option<()>, ClientError> {
        self.mutate(format!("read:{id}"), None)
    }
}

// ── Mock UI ──

#[derive(Default)]
struct RecordingTarget {
    renders: Mutex<Vec<Vec<CalendarEvent>>>,
}

impl RecordingTarget {
    fn last(&self) -> Vec<CalendarEvent> {
        self.renders.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }
}

impl RenderTarget for RecordingTarget {
    fn replace_events(&self, events: Vec<CalendarEvent>) {
        self.renders.lock().unwrap().push(events);
    }
}

#[derive(Default)]
struct MockUi {
    accept_reschedule: bool,
    banners: Mutex<Vec<Banner>>,
    alerts: Mutex<Vec<String>>,
    opened: Mutex<Vec<BookingFormState>>,
    closed: AtomicUsize,
    confirmations: AtomicUsize,
    reverts: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
}

#[async_trait]
impl UiShell for MockUi {
    fn open_form(&self, form: &BookingFormState) {
        self.opened.lock().unwrap().push(form.clone());
    }

    fn close_form(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn show_banner(&self, banner: Banner) {
        self.banners.lock().unwrap().push(banner);
    }

    fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }

    fn revert_event(&self, event_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.reverts
            .lock()
            .unwrap()
            .push((event_id.to_string(), start, end));
    }

    async fn confirm_reschedule(&self, _change: &Reschedule) -> bool {
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        self.accept_reschedule
    }
}

// ── Helpers ──

fn test_config() -> ClientConfig {
    ClientConfig {
        api_base_url: "http://127.0.0.1:9".to_string(),
        api_prefix: "/users/api/v1".to_string(),
        login_path: "/users/login/".to_string(),
        session_cookie: None,
        local_store_path: ":memory:".to_string(),
        notifications_ws_url: None,
        booking_cache_ttl: Duration::from_secs(60),
        ws_max_reconnects: 5,
        ws_reconnect_delay: Duration::from_millis(10),
        utc_offset: FixedOffset::east_opt(0).unwrap(),
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn local(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn booking(value: Value) -> Booking {
    serde_json::from_value(value).unwrap()
}

fn time_off(value: Value) -> TimeOff {
    serde_json::from_value(value).unwrap()
}

fn sample_bookings() -> Vec<Booking> {
    vec![
        booking(json!({
            "id": 123,
            "start_at": "2025-06-16T09:00:00Z",
            "end_at": "2025-06-16T10:00:00Z",
            "status": "confirmed",
            "customer": {"id": 55, "first_name": "Ann", "last_name": "Lee"},
            "booking_services": [{"category_service_id": 11, "user_id": "7"}, {"user_id": 9}]
        })),
        booking(json!({
            "id": 124,
            "start_at": "2025-06-17T13:00:00",
            "end_at": "2025-06-17T14:00:00",
            "status": "pending",
            "user_ids": [3]
        })),
    ]
}

fn sample_time_offs() -> Vec<TimeOff> {
    vec![time_off(json!({
        "id": 123,
        "start_date": "2025-06-18T09:00:00",
        "end_date": "2025-06-18T12:00:00",
        "user": {"id": 9, "first_name": "Mia", "last_name": "Ko"},
        "reason": "Dentist"
    }))]
}

fn harness(backend: Arc<MockBackend>) -> (ClientContext, Arc<RecordingTarget>) {
    let target = Arc::new(RecordingTarget::default());
    let store = Arc::new(Mutex::new(db::init_store(":memory:").unwrap()));
    let ctx = ClientContext::assemble(
        test_config(),
        store,
        backend,
        target.clone(),
        Some(CalendarView::TimeGridWeek),
        date("2025-06-18"),
    )
    .unwrap();
    (ctx, target)
}

fn create_draft() -> BookingFormState {
    BookingFormState {
        mode: FormMode::Create,
        service_ids: vec!["11".into()],
        staff_id: Some("7".into()),
        start: local("2025-06-19 10:00"),
        end: local("2025-06-19 11:00"),
        notes: String::new(),
        customer: CustomerSelection::New(NewCustomer {
            first_name: "Zoe".to_string(),
            last_name: String::new(),
            email: String::new(),
            phone: "555-0101".to_string(),
        }),
    }
}

fn drag() -> Reschedule {
    Reschedule {
        booking_id: "123".into(),
        event_id: "booking-123".to_string(),
        old_start: utc("2025-06-16T09:00:00Z"),
        old_end: utc("2025-06-16T10:00:00Z"),
        new_start: utc("2025-06-16T11:00:00Z"),
        new_end: utc("2025-06-16T12:00:00Z"),
    }
}

// ── Calendar engine ──

#[tokio::test]
async fn test_refresh_renders_bookings_and_time_offs() {
    let backend = MockBackend::with(sample_bookings(), sample_time_offs());
    let (ctx, target) = harness(backend);

    assert_eq!(ctx.calendar.refresh().await, RefreshOutcome::Rendered(3));

    let events = target.last();
    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["booking-123", "booking-124", "timeoff-123"]);
    assert_eq!(events[0].title, "Ann Lee");
    assert_eq!(events[1].title, "Unknown Customer");
    assert_eq!(events[1].description, "No notes");
    assert_eq!(events[2].title, "Mia Ko - Time Off");
    assert_eq!(events[0].start, sample_bookings()[0].start_at);
}

#[tokio::test]
async fn test_staff_filter_matches_line_items_and_legacy_ids() {
    let backend = MockBackend::with(sample_bookings(), sample_time_offs());
    let (ctx, target) = harness(backend);

    assert_eq!(
        ctx.calendar.set_staff_filter(["9"]).await,
        RefreshOutcome::Rendered(2)
    );
    let ids: Vec<String> = target.last().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["booking-123", "timeoff-123"]);

    ctx.calendar.set_staff_filter(["3"]).await;
    let ids: Vec<String> = target.last().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["booking-124"]);

    ctx.calendar.set_staff_filter(Vec::<String>::new()).await;
    assert_eq!(target.last().len(), 3);
    assert!(ctx.calendar.staff_filter().is_none());
}

#[tokio::test]
async fn test_fetch_failure_renders_empty_calendar() {
    let backend = MockBackend::with(sample_bookings(), sample_time_offs());
    backend.fail_lists.store(true, Ordering::SeqCst);
    let (ctx, target) = harness(backend);

    assert_eq!(ctx.calendar.refresh().await, RefreshOutcome::Failed);
    assert_eq!(target.render_count(), 1);
    assert!(target.last().is_empty());
}

#[tokio::test]
async fn test_signed_out_fetch_renders_empty_calendar() {
    let backend = MockBackend::with(sample_bookings(), sample_time_offs());
    backend.signed_out.store(true, Ordering::SeqCst);
    let (ctx, target) = harness(backend);

    assert_eq!(ctx.calendar.refresh().await, RefreshOutcome::Rendered(0));
    assert!(target.last().is_empty());
}

#[tokio::test]
async fn test_booking_range_is_cached_until_invalidated() {
    let backend = MockBackend::with(sample_bookings(), vec![]);
    let (ctx, _target) = harness(backend.clone());

    ctx.calendar.refresh().await;
    ctx.calendar.refresh().await;
    assert_eq!(backend.list_count.load(Ordering::SeqCst), 1);

    ctx.calendar.invalidate_cache();
    ctx.calendar.refresh().await;
    assert_eq!(backend.list_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stale_refresh_is_discarded() {
    let backend = MockBackend::with(sample_bookings(), vec![]);
    backend.slow_first_list.store(true, Ordering::SeqCst);
    let (ctx, target) = harness(backend);

    let (first, second) = tokio::join!(ctx.calendar.refresh(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.calendar.refresh().await
    });

    assert_eq!(first, RefreshOutcome::Stale);
    assert_eq!(second, RefreshOutcome::Rendered(2));
    assert_eq!(target.render_count(), 1);
}

#[tokio::test]
async fn test_month_view_queries_time_off_from_first_of_month() {
    let backend = MockBackend::with(vec![], vec![]);
    let (ctx, _target) = harness(backend.clone());

    ctx.calendar.set_view(CalendarView::DayGridMonth).await;
    ctx.calendar.set_view(CalendarView::TimeGridDay).await;

    let queries = backend.time_off_queries.lock().unwrap().clone();
    assert_eq!(queries[0], (date("2025-06-01"), Granularity::Monthly));
    assert_eq!(queries[1], (date("2025-06-18"), Granularity::Daily));
}

#[tokio::test]
async fn test_week_navigation_moves_range() {
    let backend = MockBackend::with(vec![], vec![]);
    let (ctx, _target) = harness(backend.clone());

    ctx.calendar.navigate(date("2025-06-25")).await;
    let range = ctx.calendar.range();
    assert_eq!(range.start, date("2025-06-22"));
    assert_eq!(range.end, date("2025-06-29"));
    let queries = backend.time_off_queries.lock().unwrap().clone();
    assert_eq!(queries[0], (date("2025-06-22"), Granularity::Weekly));
}

#[tokio::test]
async fn test_last_view_is_restored() {
    let store = Arc::new(Mutex::new(db::init_store(":memory:").unwrap()));
    let target = Arc::new(RecordingTarget::default());
    let backend = MockBackend::with(vec![], vec![]);

    let first = ClientContext::assemble(
        test_config(),
        store.clone(),
        backend.clone(),
        target.clone(),
        None,
        date("2025-06-18"),
    )
    .unwrap();
    assert_eq!(first.calendar.view(), CalendarView::TimeGridWeek);
    first.calendar.set_view(CalendarView::ListWeek).await;

    let second = ClientContext::assemble(
        test_config(),
        store,
        backend,
        target,
        None,
        date("2025-06-18"),
    )
    .unwrap();
    assert_eq!(second.calendar.view(), CalendarView::ListWeek);
}

#[tokio::test]
async fn test_staff_colors_are_stable_across_refreshes() {
    let backend = MockBackend::with(sample_bookings(), vec![]);
    let (ctx, target) = harness(backend);

    ctx.calendar.refresh().await;
    let before = target.last()[0].staff_colors.clone();
    ctx.calendar.invalidate_cache();
    ctx.calendar.refresh().await;
    assert_eq!(target.last()[0].staff_colors, before);
    assert_eq!(before.len(), 2);
    assert_eq!(ctx.colors.len(), 3);
}

// ── Booking lifecycle ──

#[tokio::test]
async fn test_create_substitutes_placeholders_and_rerenders() {
    let backend = MockBackend::with(sample_bookings(), vec![]);
    let (ctx, target) = harness(backend.clone());
    let ui = Arc::new(MockUi::default());
    let lifecycle = ctx.lifecycle(ui.clone());

    ctx.calendar.refresh().await;
    let renders = target.render_count();

    assert_eq!(lifecycle.submit(&create_draft()).await, Outcome::Committed);
    assert_eq!(lifecycle.state(), SubmissionState::Committed);

    let body = backend.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["customer_info"]["email"], "unknown@unknown.com");
    assert_eq!(body["customer_info"]["last_name"], "unknown");
    assert_eq!(body["customer_info"]["phone"], "555-0101");
    assert_eq!(body["start_time"], "2025-06-19T10:00:00.000Z");
    assert_eq!(body["services"][0]["category_service_id"], "11");
    assert_eq!(body["services"][0]["user_id"], "7");

    assert_eq!(ui.closed.load(Ordering::SeqCst), 1);
    assert_eq!(target.render_count(), renders + 1);
    assert_eq!(backend.list_count.load(Ordering::SeqCst), 2);

    let banners = ui.banners.lock().unwrap().clone();
    assert_eq!(banners.len(), 1);
    assert_eq!(banners[0].kind, BannerKind::Success);
    assert_eq!(banners[0].duration, Duration::from_secs(5));
}

#[tokio::test]
async fn test_validation_failure_makes_no_request() {
    let backend = MockBackend::with(vec![], vec![]);
    let (ctx, _target) = harness(backend.clone());
    let ui = Arc::new(MockUi::default());
    let lifecycle = ctx.lifecycle(ui.clone());

    let mut draft = create_draft();
    draft.service_ids.clear();
    assert!(matches!(lifecycle.create(&draft).await, Outcome::Invalid(_)));

    let mut draft = create_draft();
    draft.staff_id = None;
    assert!(matches!(lifecycle.create(&draft).await, Outcome::Invalid(_)));

    assert!(matches!(lifecycle.delete(&"".into()).await, Outcome::Invalid(_)));
    assert!(matches!(lifecycle.confirm(&" ".into()).await, Outcome::Invalid(_)));

    assert!(backend.calls().is_empty());
    assert_eq!(ui.alerts.lock().unwrap().len(), 4);
    assert_eq!(ui.closed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_backend_rejection_keeps_form_open() {
    let backend = MockBackend::with(vec![], vec![]);
    *backend.reject_with.lock().unwrap() = Some("Staff member is not available".to_string());
    let (ctx, _target) = harness(backend.clone());
    let ui = Arc::new(MockUi::default());
    let lifecycle = ctx.lifecycle(ui.clone());

    let outcome = lifecycle.create(&create_draft()).await;
    assert_eq!(
        outcome,
        Outcome::Failed("Staff member is not available".to_string())
    );
    assert_eq!(lifecycle.state(), SubmissionState::Draft);
    assert_eq!(ui.closed.load(Ordering::SeqCst), 0);
    assert_eq!(backend.calls(), vec!["create"]);

    let banners = ui.banners.lock().unwrap().clone();
    assert_eq!(banners[0].kind, BannerKind::Error);
    assert_eq!(banners[0].message, "Staff member is not available");
    assert_eq!(banners[0].duration, Duration::from_secs(8));
}

#[tokio::test]
async fn test_blank_backend_message_falls_back_to_generic() {
    let backend = MockBackend::with(vec![], vec![]);
    *backend.reject_with.lock().unwrap() = Some(String::new());
    let (ctx, _target) = harness(backend);
    let lifecycle = ctx.lifecycle(Arc::new(MockUi::default()));

    assert_eq!(
        lifecycle.delete(&"123".into()).await,
        Outcome::Failed("Something went wrong, please try again later".to_string())
    );
}

#[tokio::test]
async fn test_status_transitions_hit_backend() {
    let backend = MockBackend::with(vec![], vec![]);
    let (ctx, _target) = harness(backend.clone());
    let ui = Arc::new(MockUi::default());
    let lifecycle = ctx.lifecycle(ui.clone());

    assert!(lifecycle.confirm(&"5".into()).await.is_committed());
    assert!(lifecycle.complete(&"5".into()).await.is_committed());
    assert!(lifecycle.delete(&"5".into()).await.is_committed());
    assert_eq!(backend.calls(), vec!["confirm:5", "complete:5", "delete:5"]);
    // Only delete closes the open form.
    assert_eq!(ui.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_signed_out_mutation_reports_signed_out() {
    let backend = MockBackend::with(vec![], vec![]);
    backend.signed_out.store(true, Ordering::SeqCst);
    let (ctx, _target) = harness(backend);
    let ui = Arc::new(MockUi::default());
    let lifecycle = ctx.lifecycle(ui.clone());

    assert_eq!(lifecycle.create(&create_draft()).await, Outcome::SignedOut);
    assert!(ui.banners.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_declined_reschedule_sends_nothing_and_reverts() {
    let backend = MockBackend::with(sample_bookings(), vec![]);
    let (ctx, _target) = harness(backend.clone());
    let ui = Arc::new(MockUi::default());
    let lifecycle = ctx.lifecycle(ui.clone());

    assert_eq!(lifecycle.reschedule(drag()).await, Outcome::Declined);
    assert!(backend.calls().is_empty());
    assert_eq!(ui.confirmations.load(Ordering::SeqCst), 1);
    assert_eq!(
        ui.reverts.lock().unwrap().clone(),
        vec![(
            "booking-123".to_string(),
            utc("2025-06-16T09:00:00Z"),
            utc("2025-06-16T10:00:00Z")
        )]
    );
}

#[tokio::test]
async fn test_failed_reschedule_reverts_after_single_call() {
    let backend = MockBackend::with(sample_bookings(), vec![]);
    *backend.reject_with.lock().unwrap() = Some("Slot taken".to_string());
    let (ctx, _target) = harness(backend.clone());
    let ui = Arc::new(MockUi {
        accept_reschedule: true,
        ..Default::default()
    });
    let lifecycle = ctx.lifecycle(ui.clone());

    assert_eq!(
        lifecycle.reschedule(drag()).await,
        Outcome::Failed("Slot taken".to_string())
    );
    assert_eq!(backend.calls(), vec!["update:123"]);
    assert_eq!(ui.reverts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_accepted_reschedule_updates_times() {
    let backend = MockBackend::with(sample_bookings(), vec![]);
    let (ctx, _target) = harness(backend.clone());
    let ui = Arc::new(MockUi {
        accept_reschedule: true,
        ..Default::default()
    });
    let lifecycle = ctx.lifecycle(ui.clone());

    assert_eq!(lifecycle.reschedule(drag()).await, Outcome::Committed);
    let body = backend.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["start_time"], "2025-06-16T11:00:00.000Z");
    assert_eq!(body["end_time"], "2025-06-16T12:00:00.000Z");
    assert!(ui.reverts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_open_edit_populates_form() {
    let backend = MockBackend::with(sample_bookings(), vec![]);
    let (ctx, _target) = harness(backend);
    let ui = Arc::new(MockUi::default());
    let lifecycle = ctx.lifecycle(ui.clone());

    let form = lifecycle.open_edit(&"123".into()).await.unwrap().unwrap();
    assert_eq!(form.mode, FormMode::Edit("123".into()));
    assert_eq!(form.staff_id, Some("7".into()));
    assert_eq!(form.service_ids, vec![EntityId::from("11")]);
    assert_eq!(form.customer, CustomerSelection::Existing("55".into()));
    assert_eq!(form.start, local("2025-06-16 09:00"));
    assert_eq!(ui.opened.lock().unwrap().len(), 1);

    let created = lifecycle.open_create(local("2025-06-20 15:30"));
    assert_eq!(created.start, created.end);
    assert_eq!(created.mode, FormMode::Create);
}

#[tokio::test]
async fn test_time_off_create_and_delete() {
    let backend = MockBackend::with(vec![], vec![]);
    let (ctx, _target) = harness(backend.clone());
    let lifecycle = ctx.lifecycle(Arc::new(MockUi::default()));

    let mut draft = TimeOffDraft::starting_at(local("2025-06-20 09:00"));
    assert!(matches!(
        lifecycle.create_time_off(&draft).await,
        Outcome::Invalid(_)
    ));

    draft.staff_id = Some("9".into());
    draft.reason = "Training".to_string();
    assert!(lifecycle.create_time_off(&draft).await.is_committed());
    assert!(lifecycle.delete_time_off(&"44".into()).await.is_committed());

    assert_eq!(backend.calls(), vec!["create_time_off", "delete_time_off:44"]);
    let body = backend.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["user_id"], "9");
    assert_eq!(body["start_date"], "2025-06-20 09:00");
    assert_eq!(body["end_date"], "2025-06-20 10:00");
}

// ── HTTP gateway ──

#[derive(Default)]
struct CountingSession {
    redirects: AtomicUsize,
}

impl SessionHandler for CountingSession {
    fn redirect_to_login(&self, _login_url: &str) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

async fn spawn_backend(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client_for(base_url: String) -> (ApiClient, Arc<CountingSession>) {
    let mut config = test_config();
    config.api_base_url = base_url;
    let session = Arc::new(CountingSession::default());
    let client = ApiClient::new(config, session.clone()).unwrap();
    (client, session)
}

#[tokio::test]
async fn test_gateway_parses_booking_envelope() {
    let seen_query = Arc::new(Mutex::new(String::new()));
    let recorded = seen_query.clone();
    let app = Router::new().route(
        "/users/api/v1/bookings",
        get(move |RawQuery(query): RawQuery| {
            let recorded = recorded.clone();
            async move {
                *recorded.lock().unwrap() = query.unwrap_or_default();
                Json(json!({
                    "success": true,
                    "data": [{
                        "id": 1,
                        "start_at": "2025-06-16T09:00:00",
                        "end_at": "2025-06-16T10:00:00",
                        "status": "scheduled"
                    }]
                }))
            }
        }),
    );
    let (client, _session) = client_for(spawn_backend(app).await);

    let bookings = client
        .list_bookings(date("2025-06-15"), date("2025-06-22"), &["7".into()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].start_at, utc("2025-06-16T09:00:00Z"));

    let query = seen_query.lock().unwrap().clone();
    assert!(query.contains("start_date=2025-06-15"));
    assert!(query.contains("end_date=2025-06-22"));
    assert!(query.contains("staff_id=7"));
}

#[tokio::test]
async fn test_gateway_401_redirects_and_yields_none() {
    let app = Router::new().route(
        "/users/api/v1/bookings",
        get(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Authentication credentials were not provided."})),
            )
        }),
    );
    let (client, session) = client_for(spawn_backend(app).await);

    let result = client
        .list_bookings(date("2025-06-15"), date("2025-06-22"), &[])
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(session.redirects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_gateway_refreshes_expired_token_and_retries() {
    let hits = Arc::new(AtomicUsize::new(0));
    let refreshes = Arc::new(AtomicUsize::new(0));
    let (h, r) = (hits.clone(), refreshes.clone());

    let app = Router::new()
        .route(
            "/users/api/v1/users/me",
            get(move || {
                let hits = h.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"detail": "Access token has expired"})),
                        )
                    } else {
                        (
                            StatusCode::OK,
                            Json(json!({"success": true, "data": {"id": 1, "first_name": "Sam"}})),
                        )
                    }
                }
            }),
        )
        .route(
            "/users/api/v1/users/auth/refresh-token",
            post(move || {
                let refreshes = r.clone();
                async move {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"success": true}))
                }
            }),
        );
    let (client, session) = client_for(spawn_backend(app).await);

    let user = client.current_user().await.unwrap().unwrap();
    assert_eq!(user.full_name(), "Sam");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(session.redirects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_gateway_failed_refresh_redirects() {
    let app = Router::new()
        .route(
            "/users/api/v1/users/me",
            get(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"detail": "Access token has expired"})),
                )
            }),
        )
        .route(
            "/users/api/v1/users/auth/refresh-token",
            post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"success": false}))) }),
        );
    let (client, session) = client_for(spawn_backend(app).await);

    assert!(client.current_user().await.unwrap().is_none());
    assert_eq!(session.redirects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_gateway_surfaces_backend_message() {
    let app = Router::new()
        .route(
            "/users/api/v1/bookings/users/create_booking",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"success": false, "message": "Slot already booked"})),
                )
            }),
        )
        .route(
            "/users/api/v1/bookings/9",
            axum::routing::delete(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "oops") }),
        );
    let (client, _session) = client_for(spawn_backend(app).await);

    let err = client.create_booking(&json!({})).await.unwrap_err();
    match &err {
        ClientError::Request { status, message } => {
            assert_eq!(*status, 400);
            assert_eq!(message, "Slot already booked");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.user_message(), "Slot already booked");

    let err = client.delete_booking(&"9".into()).await.unwrap_err();
    assert_eq!(err.user_message(), "Something went wrong, please try again later");
}

#[tokio::test]
async fn test_gateway_unsuccessful_envelope_is_a_failure() {
    let app = Router::new().route(
        "/users/api/v1/bookings/5/confirm",
        put(|| async { Json(json!({"success": false, "message": "Already confirmed"})) }),
    );
    let (client, _session) = client_for(spawn_backend(app).await);

    let err = client.confirm_booking(&"5".into()).await.unwrap_err();
    assert_eq!(err.user_message(), "Already confirmed");
}

#[tokio::test]
async fn test_gateway_json_and_text_bodies() {
    let app = Router::new()
        .route("/users/api/v1/ping", get(|| async { "pong" }))
        .route(
            "/users/api/v1/status",
            get(|| async { Json(json!({"ok": true})) }),
        )
        .route(
            "/users/api/v1/broken",
            get(|| async { ([(header::CONTENT_TYPE, "application/json")], "{not json") }),
        );
    let (client, _session) = client_for(spawn_backend(app).await);

    let text = client
        .request(reqwest::Method::GET, "/ping", &[], None)
        .await
        .unwrap();
    assert_eq!(text, Some(ResponseBody::Text("pong".to_string())));

    let json_body = client
        .request(reqwest::Method::GET, "/status", &[], None)
        .await
        .unwrap();
    assert_eq!(json_body, Some(ResponseBody::Json(json!({"ok": true}))));

    let err = client
        .request(reqwest::Method::GET, "/broken", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::MalformedResponse));
    assert_eq!(err.user_message(), "Invalid response from server");
}

#[tokio::test]
async fn test_gateway_converts_time_params_to_utc() {
    let received = Arc::new(Mutex::new(Value::Null));
    let sink = received.clone();
    let app = Router::new().route(
        "/users/api/v1/users/time-offs",
        post(move |Json(body): Json<Value>| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = body;
                Json(json!({"success": true, "data": null}))
            }
        }),
    );

    let mut config = test_config();
    config.api_base_url = spawn_backend(app).await;
    config.utc_offset = FixedOffset::east_opt(2 * 3600).unwrap();
    let client = ApiClient::new(config, Arc::new(CountingSession::default())).unwrap();

    let ack = client
        .create_time_off(&json!({
            "user_id": "9",
            "start_date": "2025-06-20 09:00",
            "end_date": "2025-06-20 10:00",
            "reason": "Training"
        }))
        .await
        .unwrap();
    assert_eq!(ack, Some(()));

    let body = received.lock().unwrap().clone();
    assert_eq!(body["start_date"], "2025-06-20T07:00:00.000Z");
    assert_eq!(body["end_date"], "2025-06-20T08:00:00.000Z");
    assert_eq!(body["reason"], "Training");
}

#[tokio::test]
async fn test_gateway_network_failure_is_generic() {
    let (client, _session) = client_for("http://127.0.0.1:9".to_string());
    let err = client.current_user().await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
    assert_eq!(err.user_message(), "Something went wrong, please try again later");
}

#[tokio::test]
async fn test_gateway_concurrent_expired_tokens_share_one_refresh() {
    let authorized = Arc::new(AtomicBool::new(false));
    let refreshes = Arc::new(AtomicUsize::new(0));
    let (a, r) = (authorized.clone(), refreshes.clone());
    let granted = authorized.clone();

    let app = Router::new()
        .route(
            "/users/api/v1/users/me",
            get(move || {
                let authorized = a.clone();
                async move {
                    if authorized.load(Ordering::SeqCst) {
                        (
                            StatusCode::OK,
                            Json(json!({"success": true, "data": {"id": 1, "first_name": "Sam"}})),
                        )
                    } else {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"detail": "Access token has expired"})),
                        )
                    }
                }
            }),
        )
        .route(
            "/users/api/v1/users/auth/refresh-token",
            post(move || {
                let refreshes = r.clone();
                let granted = granted.clone();
                async move {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    granted.store(true, Ordering::SeqCst);
                    Json(json!({"success": true}))
                }
            }),
        );
    let (client, session) = client_for(spawn_backend(app).await);

    let (first, second, third) = tokio::join!(
        client.current_user(),
        client.current_user(),
        client.current_user(),
    );
    for user in [first, second, third] {
        assert_eq!(user.unwrap().unwrap().full_name(), "Sam");
    }
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(session.redirects.load(Ordering::SeqCst), 0);
}

/// Serves a `{success, data}` envelope and records the query and cache headers of
/// each call.
fn recording_route(
    data: Value,
    seen: Arc<Mutex<Vec<(String, Option<String>, Option<String>)>>>,
) -> axum::routing::MethodRouter {
    get(move |RawQuery(query): RawQuery, headers: HeaderMap| {
        let seen = seen.clone();
        let data = data.clone();
        async move {
            let read = |name: header::HeaderName| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            seen.lock().unwrap().push((
                query.unwrap_or_default(),
                read(header::CACHE_CONTROL),
                read(header::PRAGMA),
            ));
            Json(json!({"success": true, "data": data}))
        }
    })
}

#[tokio::test]
async fn test_gateway_directory_reads() {
    let staff_calls = Arc::new(Mutex::new(Vec::new()));
    let service_calls = Arc::new(Mutex::new(Vec::new()));
    let customer_calls = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new()
        .route(
            "/users/api/v1/companies/users",
            recording_route(
                json!([{"id": 7, "first_name": "Mia", "last_name": "Ko"}, {"id": "9"}]),
                staff_calls.clone(),
            ),
        )
        .route(
            "/users/api/v1/companies/services",
            recording_route(
                json!([{
                    "id": 1,
                    "name": "Hair",
                    "services": [{"id": 11, "name": "Cut", "duration": 45, "price": 3000}]
                }]),
                service_calls.clone(),
            ),
        )
        .route(
            "/users/api/v1/companies/customers",
            recording_route(
                json!([{"id": 5, "first_name": "Ann", "last_name": "Lee", "email": null}]),
                customer_calls.clone(),
            ),
        );
    let (client, _session) = client_for(spawn_backend(app).await);

    let staff = client.staff().await.unwrap().unwrap();
    assert_eq!(staff.len(), 2);
    assert_eq!(staff[0].full_name(), "Mia Ko");
    assert_eq!(staff[1].id.as_str(), "9");

    let categories = client.company_services().await.unwrap().unwrap();
    assert_eq!(categories[0].name, "Hair");
    assert_eq!(categories[0].services[0].duration, 45);

    let customers = client.customers().await.unwrap().unwrap();
    assert_eq!(customers[0].display_name().as_deref(), Some("Ann Lee"));

    for calls in [&staff_calls, &service_calls] {
        let (query, cache_control, pragma) = calls.lock().unwrap()[0].clone();
        assert!(query.starts_with("_t="), "missing cache buster: {query}");
        assert_eq!(cache_control.as_deref(), Some("no-cache, no-store, must-revalidate"));
        assert_eq!(pragma.as_deref(), Some("no-cache"));
    }
    let (query, cache_control, _) = customer_calls.lock().unwrap()[0].clone();
    assert!(query.is_empty());
    assert!(cache_control.is_none());
}

fn dashboard_backend(
    unread_status: StatusCode,
    time_off_queries: Arc<Mutex<Vec<String>>>,
) -> Router {
    Router::new()
        .route(
            "/users/api/v1/users/me",
            get(|| async { Json(json!({"success": true, "data": {"id": 1, "first_name": "Sam"}})) }),
        )
        .route(
            "/users/api/v1/companies/users",
            get(|| async { Json(json!({"success": true, "data": [{"id": 1}, {"id": 2}]})) }),
        )
        .route(
            "/users/api/v1/notifications/unread-count",
            get(move || async move {
                (
                    unread_status,
                    Json(json!({"success": true, "data": {"unread_count": 4}})),
                )
            }),
        )
        .route(
            "/users/api/v1/users/time-offs",
            get(move |RawQuery(query): RawQuery| {
                let queries = time_off_queries.clone();
                async move {
                    queries.lock().unwrap().push(query.unwrap_or_default());
                    Json(json!({
                        "success": true,
                        "data": [{
                            "id": 3,
                            "start_date": "2025-06-16T09:00:00",
                            "end_date": "2025-06-16T12:00:00",
                            "user": {"first_name": "Sam"}
                        }]
                    }))
                }
            }),
        )
}

#[tokio::test]
async fn test_gateway_dashboard_refresh_collects_every_read() {
    let queries = Arc::new(Mutex::new(Vec::new()));
    let app = dashboard_backend(StatusCode::OK, queries.clone());
    let (client, _session) = client_for(spawn_backend(app).await);

    let dashboard = client.refresh_dashboard().await.unwrap();
    assert_eq!(dashboard.user.unwrap().full_name(), "Sam");
    assert_eq!(dashboard.staff.len(), 2);
    assert_eq!(dashboard.unread_notifications, 4);
    assert_eq!(dashboard.time_offs.len(), 1);

    let three_days_ago = Utc::now().date_naive() - chrono::Duration::days(3);
    let query = queries.lock().unwrap()[0].clone();
    assert!(query.contains(&format!("start_date={}", three_days_ago.format("%Y-%m-%d"))));
    assert!(query.contains("availability_type=weekly"));
}

#[tokio::test]
async fn test_gateway_dashboard_refresh_fails_as_a_whole() {
    let app = dashboard_backend(
        StatusCode::INTERNAL_SERVER_ERROR,
        Arc::new(Mutex::new(Vec::new())),
    );
    let (client, _session) = client_for(spawn_backend(app).await);

    assert!(client.refresh_dashboard().await.is_none());
}
