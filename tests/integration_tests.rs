use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower::ServiceExt;

use autoshop::config::AppConfig;
use autoshop::db::{self, queries};
use autoshop::handlers;
use autoshop::models::{ServiceKind, TransitionEvent};
use autoshop::services::notify::NotificationDispatcher;
use autoshop::state::AppState;

// ── Mock Dispatcher ──

struct RecordingDispatcher {
    events: Arc<Mutex<Vec<(i64, String)>>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: &TransitionEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((event.booking_id, event.transition.as_str().to_string()));
        Ok(())
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        fallback_block_min: 60,
        notify_webhook_url: String::new(),
    }
}

fn test_state() -> Arc<AppState> {
    test_state_with_events().0
}

fn test_state_with_events() -> (Arc<AppState>, Arc<Mutex<Vec<(i64, String)>>>) {
    let config = test_config();
    let conn = db::init_db(":memory:").unwrap();
    let events = Arc::new(Mutex::new(vec![]));
    let dispatcher = RecordingDispatcher {
        events: Arc::clone(&events),
    };
    let (events_tx, _) = tokio::sync::broadcast::channel(64);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
        notifier: Box::new(dispatcher),
        events_tx,
    });
    (state, events)
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/slots", get(handlers::slots::get_slots))
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings", get(handlers::bookings::list_bookings))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route("/api/mechanic/bookings", get(handlers::mechanic::list_jobs))
        .route(
            "/api/mechanic/bookings/:id/diagnose",
            post(handlers::mechanic::diagnose_booking),
        )
        .route(
            "/api/mechanic/bookings/:id/start",
            post(handlers::mechanic::start_booking),
        )
        .route(
            "/api/mechanic/bookings/:id/complete",
            post(handlers::mechanic::complete_booking),
        )
        .route(
            "/api/mechanic/bookings/:id/diagnosis",
            get(handlers::mechanic::get_diagnosis),
        )
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route(
            "/api/admin/bookings/:id/approve",
            post(handlers::admin::approve_booking),
        )
        .route(
            "/api/admin/bookings/:id/assign",
            post(handlers::admin::assign_booking),
        )
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route(
            "/api/admin/workshifts",
            get(handlers::workshifts::list_workshifts),
        )
        .route(
            "/api/admin/workshifts",
            post(handlers::workshifts::create_workshift),
        )
        .route(
            "/api/admin/workshifts/:id",
            put(handlers::workshifts::update_workshift),
        )
        .route(
            "/api/admin/workshifts/:id",
            delete(handlers::workshifts::delete_workshift),
        )
        .route("/api/admin/inventory", get(handlers::inventory::get_levels))
        .route(
            "/api/admin/inventory/receive",
            post(handlers::inventory::receive_stock),
        )
        .route(
            "/api/admin/service-parts",
            get(handlers::inventory::list_service_parts),
        )
        .route(
            "/api/admin/service-parts",
            post(handlers::inventory::create_service_part),
        )
        .route(
            "/api/admin/service-parts/:id",
            delete(handlers::inventory::delete_service_part),
        )
        .route("/api/admin/events", get(handlers::events::events_stream))
        .with_state(state)
}

struct Seed {
    customer: i64,
    other_customer: i64,
    mechanic: i64,
    other_mechanic: i64,
    vehicle: i64,
    oil_change: i64,
    brake_service: i64,
    engine_repair: i64,
    oil: i64,
    belt: i64,
}

fn seed(state: &Arc<AppState>) -> Seed {
    let db = state.db.lock().unwrap();

    let customer = queries::insert_customer(&db, "Avery", Some("+15550001")).unwrap();
    let other_customer = queries::insert_customer(&db, "Rival", None).unwrap();
    let mechanic = queries::insert_mechanic(&db, "Dana").unwrap();
    let other_mechanic = queries::insert_mechanic(&db, "Juno").unwrap();
    let vehicle =
        queries::insert_vehicle(&db, customer, "AB-123-CD", Some("Toyota"), Some("Corolla"))
            .unwrap();

    let oil_change = queries::insert_service(
        &db,
        "Oil change",
        ServiceKind::Quick,
        Some(30),
        "35.00".parse().unwrap(),
    )
    .unwrap();
    let brake_service = queries::insert_service(
        &db,
        "Brake service",
        ServiceKind::Quick,
        Some(60),
        "80.00".parse().unwrap(),
    )
    .unwrap();
    let engine_repair = queries::insert_service(
        &db,
        "Engine repair",
        ServiceKind::Repair,
        None,
        "200.00".parse().unwrap(),
    )
    .unwrap();

    let oil = queries::insert_part(&db, "Engine oil", "OIL-5W30", "l", "12.50".parse().unwrap())
        .unwrap();
    let belt = queries::insert_part(&db, "Timing belt", "BELT-01", "pcs", "45.00".parse().unwrap())
        .unwrap();
    queries::insert_service_part(&db, oil_change, oil, 1).unwrap();
    queries::set_stock(&db, oil, 10, 2).unwrap();
    queries::set_stock(&db, belt, 2, 1).unwrap();

    Seed {
        customer,
        other_customer,
        mechanic,
        other_mechanic,
        vehicle,
        oil_change,
        brake_service,
        engine_repair,
        oil,
        belt,
    }
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_customer(mut req: Request<Body>, customer_id: i64) -> Request<Body> {
    req.headers_mut()
        .insert("x-customer-id", customer_id.to_string().parse().unwrap());
    req
}

fn with_mechanic(mut req: Request<Body>, mechanic_id: i64) -> Request<Body> {
    req.headers_mut()
        .insert("x-mechanic-id", mechanic_id.to_string().parse().unwrap());
    req
}

fn with_admin(mut req: Request<Body>) -> Request<Body> {
    req.headers_mut()
        .insert("Authorization", "Bearer test-token".parse().unwrap());
    req
}

async fn response_json(res: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// POST /api/bookings as the given customer, asserting 201, returning the id.
async fn create_booking(state: &Arc<AppState>, customer_id: i64, body: serde_json::Value) -> i64 {
    let app = test_app(state.clone());
    let res = app
        .oneshot(with_customer(
            json_request("POST", "/api/bookings", body),
            customer_id,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    response_json(res).await["id"].as_i64().unwrap()
}

async fn admin_post(
    state: &Arc<AppState>,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let app = test_app(state.clone());
    let res = app
        .oneshot(with_admin(json_request("POST", uri, body)))
        .await
        .unwrap();
    let status = res.status();
    (status, response_json(res).await)
}

async fn mechanic_post(
    state: &Arc<AppState>,
    mechanic_id: i64,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let app = test_app(state.clone());
    let res = app
        .oneshot(with_mechanic(json_request("POST", uri, body), mechanic_id))
        .await
        .unwrap();
    let status = res.status();
    (status, response_json(res).await)
}

// ── Auth Guards ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let state = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/bookings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let json = response_json(res).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_admin_wrong_token() {
    let state = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/admin/bookings")
                .header("Authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_customer_identity_required() {
    let state = test_state();

    // missing header
    let app = test_app(state.clone());
    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/bookings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // malformed header
    let app = test_app(state.clone());
    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/bookings")
                .header("x-customer-id", "not-a-number")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // mechanic endpoints check their own header
    let app = test_app(state);
    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/mechanic/bookings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

// ── Booking Creation ──

#[tokio::test]
async fn test_create_booking_snapshots_lines() {
    let state = test_state();
    let s = seed(&state);

    let app = test_app(state.clone());
    let res = app
        .oneshot(with_customer(
            json_request(
                "POST",
                "/api/bookings",
                serde_json::json!({
                    "vehicle_id": s.vehicle,
                    "service_ids": [s.oil_change, s.engine_repair],
                    "mechanic_id": s.mechanic,
                    "start": "2024-03-11 10:00:00",
                }),
            ),
            s.customer,
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let json = response_json(res).await;
    assert_eq!(json["status"], "PENDING");
    assert_eq!(json["start_dt"], "2024-03-11 10:00:00");
    // 30 quick minutes plus the 30 minute diagnosis placeholder
    assert_eq!(json["end_dt"], "2024-03-11 11:00:00");
    assert_eq!(json["stock_deducted"], false);

    let id = json["id"].as_i64().unwrap();

    // detail view carries the immutable service lines
    let app = test_app(state.clone());
    let res = app
        .oneshot(with_customer(
            Request::builder()
                .uri(format!("/api/bookings/{id}"))
                .body(Body::empty())
                .unwrap(),
            s.customer,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    let lines = json["service_lines"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["price_snapshot"], "35.00");
    assert_eq!(lines[0]["duration_snapshot_min"], 30);
    assert_eq!(lines[1]["price_snapshot"], "200.00");
    assert!(lines[1]["duration_snapshot_min"].is_null());

    // list shows it too
    let app = test_app(state);
    let res = app
        .oneshot(with_customer(
            Request::builder()
                .uri("/api/bookings")
                .body(Body::empty())
                .unwrap(),
            s.customer,
        ))
        .await
        .unwrap();
    let json = response_json(res).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_booking_unknown_service() {
    let state = test_state();
    let s = seed(&state);

    let app = test_app(state);
    let res = app
        .oneshot(with_customer(
            json_request(
                "POST",
                "/api/bookings",
                serde_json::json!({
                    "service_ids": [40404],
                    "start": "2024-03-11 10:00:00",
                }),
            ),
            s.customer,
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json = response_json(res).await;
    assert_eq!(json["code"], "SERVICE_NOT_FOUND");
    assert_eq!(json["details"]["service_ids"][0], 40404);
}

#[tokio::test]
async fn test_booking_owner_scoped() {
    let state = test_state();
    let s = seed(&state);

    let id = create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "service_ids": [s.oil_change],
            "start": "2024-03-11 10:00:00",
        }),
    )
    .await;

    let app = test_app(state);
    let res = app
        .oneshot(with_customer(
            Request::builder()
                .uri(format!("/api/bookings/{id}"))
                .body(Body::empty())
                .unwrap(),
            s.other_customer,
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_booking_overlap_conflict() {
    let state = test_state();
    let s = seed(&state);

    let first = create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "service_ids": [s.brake_service],
            "mechanic_id": s.mechanic,
            "start": "2024-03-11 10:00:00",
        }),
    )
    .await;

    // 10:30 falls inside the 10:00-11:00 block
    let app = test_app(state.clone());
    let res = app
        .oneshot(with_customer(
            json_request(
                "POST",
                "/api/bookings",
                serde_json::json!({
                    "service_ids": [s.oil_change],
                    "mechanic_id": s.mechanic,
                    "start": "2024-03-11 10:30:00",
                }),
            ),
            s.customer,
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
    let json = response_json(res).await;
    assert_eq!(json["code"], "OVERLAP_SLOT");
    assert_eq!(json["details"]["booking_id"].as_i64().unwrap(), first);
    assert_eq!(json["details"]["busy_start"], "2024-03-11 10:00:00");
    assert_eq!(json["details"]["busy_end"], "2024-03-11 11:00:00");

    // touching at 11:00 is allowed
    create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "service_ids": [s.oil_change],
            "mechanic_id": s.mechanic,
            "start": "2024-03-11 11:00:00",
        }),
    )
    .await;
}

// ── Full Lifecycle ──

#[tokio::test]
async fn test_full_lifecycle_happy_path() {
    let (state, events) = test_state_with_events();
    let s = seed(&state);

    let id = create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "vehicle_id": s.vehicle,
            "service_ids": [s.oil_change],
            "start": "2024-03-11 09:00:00",
        }),
    )
    .await;

    let (status, json) = admin_post(
        &state,
        &format!("/api/admin/bookings/{id}/approve"),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "APPROVED");

    let (status, json) = admin_post(
        &state,
        &format!("/api/admin/bookings/{id}/assign"),
        serde_json::json!({"mechanic_id": s.mechanic}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mechanic_id"].as_i64().unwrap(), s.mechanic);

    let (status, json) = mechanic_post(
        &state,
        s.mechanic,
        &format!("/api/mechanic/bookings/{id}/diagnose"),
        serde_json::json!({
            "note": "worn belt",
            "labor_est_min": 90,
            "required_parts": [{"partId": s.belt, "quantity": 1}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "IN_DIAGNOSIS");
    // 30 quick minutes plus 90 labor minutes
    assert_eq!(json["end_dt"], "2024-03-11 11:00:00");

    let (status, json) = mechanic_post(
        &state,
        s.mechanic,
        &format!("/api/mechanic/bookings/{id}/start"),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "IN_PROGRESS");
    assert_eq!(json["stock_deducted"], true);

    let (status, json) = mechanic_post(
        &state,
        s.mechanic,
        &format!("/api/mechanic/bookings/{id}/complete"),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "DONE");
    assert_eq!(json["total_services"], "35.00");
    // oil x1 at 12.50 plus belt x1 at 45.00
    assert_eq!(json["total_parts"], "57.50");
    assert_eq!(json["total_amount"], "92.50");

    // stock went down once
    {
        let db = state.db.lock().unwrap();
        assert_eq!(queries::get_stock_qty(&db, s.oil).unwrap(), Some(9));
        assert_eq!(queries::get_stock_qty(&db, s.belt).unwrap(), Some(1));
    }

    let recorded: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .map(|(_, t)| t.clone())
        .collect();
    assert_eq!(
        recorded,
        vec!["CREATED", "APPROVED", "ASSIGNED", "DIAGNOSED", "STARTED", "COMPLETED"]
    );
}

#[tokio::test]
async fn test_diagnose_requires_assigned_mechanic() {
    let state = test_state();
    let s = seed(&state);

    let id = create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "service_ids": [s.oil_change],
            "mechanic_id": s.mechanic,
            "start": "2024-03-11 09:00:00",
        }),
    )
    .await;
    let (status, _) = admin_post(
        &state,
        &format!("/api/admin/bookings/{id}/approve"),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = mechanic_post(
        &state,
        s.other_mechanic,
        &format!("/api/mechanic/bookings/{id}/diagnose"),
        serde_json::json!({"labor_est_min": 60}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_diagnosis_fetch_roundtrip() {
    let state = test_state();
    let s = seed(&state);

    let id = create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "service_ids": [s.oil_change],
            "mechanic_id": s.mechanic,
            "start": "2024-03-11 09:00:00",
        }),
    )
    .await;
    admin_post(
        &state,
        &format!("/api/admin/bookings/{id}/approve"),
        serde_json::json!({}),
    )
    .await;

    // no diagnosis yet
    let app = test_app(state.clone());
    let res = app
        .oneshot(with_mechanic(
            Request::builder()
                .uri(format!("/api/mechanic/bookings/{id}/diagnosis"))
                .body(Body::empty())
                .unwrap(),
            s.mechanic,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let (status, _) = mechanic_post(
        &state,
        s.mechanic,
        &format!("/api/mechanic/bookings/{id}/diagnose"),
        serde_json::json!({
            "note": "needs new belt",
            "eta_min": 120,
            "labor_est_min": 90,
            "required_parts": [{"partId": s.belt, "quantity": 2}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let app = test_app(state);
    let res = app
        .oneshot(with_mechanic(
            Request::builder()
                .uri(format!("/api/mechanic/bookings/{id}/diagnosis"))
                .body(Body::empty())
                .unwrap(),
            s.mechanic,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    assert_eq!(json["note"], "needs new belt");
    assert_eq!(json["eta_min"], 120);
    assert_eq!(json["required_parts"][0]["partId"].as_i64().unwrap(), s.belt);
    assert_eq!(json["required_parts"][0]["quantity"], 2);
}

#[tokio::test]
async fn test_out_of_stock_blocks_start() {
    let state = test_state();
    let s = seed(&state);

    let id = create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "service_ids": [s.oil_change],
            "mechanic_id": s.mechanic,
            "start": "2024-03-11 09:00:00",
        }),
    )
    .await;
    admin_post(
        &state,
        &format!("/api/admin/bookings/{id}/approve"),
        serde_json::json!({}),
    )
    .await;

    // belt stock is 2, diagnosis asks for 3
    let (status, _) = mechanic_post(
        &state,
        s.mechanic,
        &format!("/api/mechanic/bookings/{id}/diagnose"),
        serde_json::json!({
            "labor_est_min": 30,
            "required_parts": [{"partId": s.belt, "quantity": 3}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = mechanic_post(
        &state,
        s.mechanic,
        &format!("/api/mechanic/bookings/{id}/start"),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "OUT_OF_STOCK");
    assert_eq!(json["details"]["part_id"].as_i64().unwrap(), s.belt);
    assert_eq!(json["details"]["needed"], 3);
    assert_eq!(json["details"]["available"], 2);

    // nothing was deducted or snapshotted
    {
        let db = state.db.lock().unwrap();
        assert_eq!(queries::get_stock_qty(&db, s.belt).unwrap(), Some(2));
        assert_eq!(queries::get_stock_qty(&db, s.oil).unwrap(), Some(10));
        assert!(queries::get_booking_part_lines(&db, id).unwrap().is_empty());
        let booking = queries::get_booking(&db, id).unwrap().unwrap();
        assert!(!booking.stock_deducted);
    }
}

#[tokio::test]
async fn test_cancel_flow_and_already_deducted() {
    let state = test_state();
    let s = seed(&state);

    // plain cancel with a reason
    let id = create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "service_ids": [s.oil_change],
            "start": "2024-03-11 09:00:00",
        }),
    )
    .await;

    let app = test_app(state.clone());
    let res = app
        .oneshot(with_customer(
            json_request(
                "POST",
                &format!("/api/bookings/{id}/cancel"),
                serde_json::json!({"reason": "found time elsewhere"}),
            ),
            s.customer,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    assert_eq!(json["status"], "CANCELED");
    assert_eq!(json["notes_mechanic"], "[CANCEL] found time elsewhere");

    // a started booking can no longer be canceled
    let id = create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "service_ids": [s.oil_change],
            "mechanic_id": s.mechanic,
            "start": "2024-03-11 13:00:00",
        }),
    )
    .await;
    admin_post(
        &state,
        &format!("/api/admin/bookings/{id}/approve"),
        serde_json::json!({}),
    )
    .await;
    let (status, _) = mechanic_post(
        &state,
        s.mechanic,
        &format!("/api/mechanic/bookings/{id}/start"),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let app = test_app(state.clone());
    let res = app
        .oneshot(with_customer(
            json_request(
                "POST",
                &format!("/api/bookings/{id}/cancel"),
                serde_json::json!({}),
            ),
            s.customer,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let json = response_json(res).await;
    assert_eq!(json["code"], "ALREADY_DEDUCTED");

    // admin cancel hits the same guard
    let (status, json) = admin_post(
        &state,
        &format!("/api/admin/bookings/{id}/cancel"),
        serde_json::json!({"reason": "shop closed"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "ALREADY_DEDUCTED");
}

// ── Slots ──

#[tokio::test]
async fn test_slots_endpoint() {
    let state = test_state();
    let s = seed(&state);

    {
        let db = state.db.lock().unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        queries::insert_workshift(&db, s.mechanic, &date, 540, 1020, 30).unwrap();
    }

    // one approved booking blocks 10:00-11:00
    let id = create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "service_ids": [s.brake_service],
            "mechanic_id": s.mechanic,
            "start": "2024-03-11 10:00:00",
        }),
    )
    .await;
    admin_post(
        &state,
        &format!("/api/admin/bookings/{id}/approve"),
        serde_json::json!({}),
    )
    .await;

    let app = test_app(state.clone());
    let res = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/slots?date=2024-03-11&mechanic_id={}&service_ids={}",
                    s.mechanic, s.brake_service
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    assert_eq!(json["duration_min"], 60);

    let starts: Vec<String> = json["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|slot| slot["start"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(starts.len(), 12);
    assert!(starts.contains(&"2024-03-11T09:00:00".to_string()));
    assert!(starts.contains(&"2024-03-11T11:00:00".to_string()));
    assert!(!starts.contains(&"2024-03-11T09:30:00".to_string()));
    assert!(!starts.contains(&"2024-03-11T10:00:00".to_string()));
    assert!(!starts.contains(&"2024-03-11T10:30:00".to_string()));

    // any-mechanic mode reports who is free instead
    let app = test_app(state);
    let res = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/slots?date=2024-03-11&service_ids={}",
                    s.brake_service
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    let first = &json["slots"][0];
    assert!(first["mechanic_id"].is_null());
    assert_eq!(first["free_mechanics"][0].as_i64().unwrap(), s.mechanic);
}

#[tokio::test]
async fn test_slots_validation() {
    let state = test_state();
    seed(&state);

    let app = test_app(state.clone());
    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/slots?date=2024-03-11")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json = response_json(res).await;
    assert_eq!(json["code"], "VALIDATION");

    let app = test_app(state);
    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/slots?date=2024-03-11&service_ids=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

// ── Workshifts ──

#[tokio::test]
async fn test_workshift_crud_and_conflict() {
    let state = test_state();
    let s = seed(&state);

    let (status, json) = admin_post(
        &state,
        "/api/admin/workshifts",
        serde_json::json!({
            "mechanic_id": s.mechanic,
            "work_date": "2024-03-11",
            "start_min": 540,
            "end_min": 1020,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let shift_id = json["id"].as_i64().unwrap();
    // step defaults to 15
    assert_eq!(json["step_min"], 15);

    // overlapping shift for the same mechanic
    let (status, json) = admin_post(
        &state,
        "/api/admin/workshifts",
        serde_json::json!({
            "mechanic_id": s.mechanic,
            "work_date": "2024-03-11",
            "start_min": 900,
            "end_min": 1100,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "SHIFT_OVERLAP");
    assert_eq!(json["details"]["shift_id"].as_i64().unwrap(), shift_id);

    // touching is fine
    let (status, _) = admin_post(
        &state,
        "/api/admin/workshifts",
        serde_json::json!({
            "mechanic_id": s.mechanic,
            "work_date": "2024-03-11",
            "start_min": 1020,
            "end_min": 1200,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // invalid window
    let (status, json) = admin_post(
        &state,
        "/api/admin/workshifts",
        serde_json::json!({
            "mechanic_id": s.mechanic,
            "work_date": "2024-03-12",
            "start_min": 600,
            "end_min": 600,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION");

    // update narrows the first shift
    let app = test_app(state.clone());
    let res = app
        .oneshot(with_admin(json_request(
            "PUT",
            &format!("/api/admin/workshifts/{shift_id}"),
            serde_json::json!({"end_min": 900}),
        )))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    assert_eq!(json["end_min"], 900);
    assert_eq!(json["start_min"], 540);

    // list filters by mechanic
    let app = test_app(state.clone());
    let res = app
        .oneshot(with_admin(
            Request::builder()
                .uri(format!("/api/admin/workshifts?mechanic_id={}", s.mechanic))
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    let json = response_json(res).await;
    assert_eq!(json.as_array().unwrap().len(), 2);

    // delete, then deleting again is a 404
    let app = test_app(state.clone());
    let res = app
        .oneshot(with_admin(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/admin/workshifts/{shift_id}"))
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let app = test_app(state);
    let res = app
        .oneshot(with_admin(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/admin/workshifts/{shift_id}"))
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ── Inventory ──

#[tokio::test]
async fn test_inventory_levels_and_receiving() {
    let state = test_state();
    let s = seed(&state);

    let app = test_app(state.clone());
    let res = app
        .oneshot(with_admin(
            Request::builder()
                .uri("/api/admin/inventory")
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    let levels = json.as_array().unwrap();
    assert_eq!(levels.len(), 2);
    let oil_level = levels
        .iter()
        .find(|l| l["part_id"].as_i64().unwrap() == s.oil)
        .unwrap();
    assert_eq!(oil_level["qty"], 10);
    assert_eq!(oil_level["low"], false);

    let (status, json) = admin_post(
        &state,
        "/api/admin/inventory/receive",
        serde_json::json!({"items": [{"part_id": s.oil, "quantity": 5}]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let received = json.as_array().unwrap();
    assert_eq!(received[0]["qty"], 15);

    // unknown part
    let (status, json) = admin_post(
        &state,
        "/api/admin/inventory/receive",
        serde_json::json!({"items": [{"part_id": 40404, "quantity": 5}]}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    // non-positive quantity
    let (status, _) = admin_post(
        &state,
        "/api/admin/inventory/receive",
        serde_json::json!({"items": [{"part_id": s.oil, "quantity": 0}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // empty receipt
    let (status, _) = admin_post(
        &state,
        "/api/admin/inventory/receive",
        serde_json::json!({"items": []}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_service_parts_management() {
    let state = test_state();
    let s = seed(&state);

    // the seeded pair already exists
    let (status, json) = admin_post(
        &state,
        "/api/admin/service-parts",
        serde_json::json!({
            "service_id": s.oil_change,
            "part_id": s.oil,
            "qty_per_service": 2,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "DUPLICATE");

    // defaults only attach to quick services
    let (status, json) = admin_post(
        &state,
        "/api/admin/service-parts",
        serde_json::json!({
            "service_id": s.engine_repair,
            "part_id": s.belt,
            "qty_per_service": 1,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION");

    // a new pair works
    let (status, json) = admin_post(
        &state,
        "/api/admin/service-parts",
        serde_json::json!({
            "service_id": s.brake_service,
            "part_id": s.belt,
            "qty_per_service": 1,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let mapping_id = json["id"].as_i64().unwrap();

    let app = test_app(state.clone());
    let res = app
        .oneshot(with_admin(
            Request::builder()
                .uri(format!(
                    "/api/admin/service-parts?service_id={}",
                    s.brake_service
                ))
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    let json = response_json(res).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let app = test_app(state);
    let res = app
        .oneshot(with_admin(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/admin/service-parts/{mapping_id}"))
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

// ── Admin Booking List ──

#[tokio::test]
async fn test_admin_list_pagination_and_filters() {
    let state = test_state();
    let s = seed(&state);

    for start in [
        "2024-03-11 09:00:00",
        "2024-03-11 12:00:00",
        "2024-03-11 15:00:00",
    ] {
        create_booking(
            &state,
            s.customer,
            serde_json::json!({
                "service_ids": [s.oil_change],
                "start": start,
            }),
        )
        .await;
    }

    let app = test_app(state.clone());
    let res = app
        .oneshot(with_admin(
            Request::builder()
                .uri("/api/admin/bookings?page_size=2")
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    assert_eq!(json["total"], 3);
    assert_eq!(json["pages"], 2);
    assert_eq!(json["page"], 1);
    let items = json["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    // newest first
    assert_eq!(items[0]["start_dt"], "2024-03-11 15:00:00");

    let app = test_app(state.clone());
    let res = app
        .oneshot(with_admin(
            Request::builder()
                .uri("/api/admin/bookings?page_size=2&page=2")
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    let json = response_json(res).await;
    assert_eq!(json["items"].as_array().unwrap().len(), 1);

    // status filter
    let app = test_app(state.clone());
    let res = app
        .oneshot(with_admin(
            Request::builder()
                .uri("/api/admin/bookings?status=DONE")
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    let json = response_json(res).await;
    assert_eq!(json["total"], 0);

    // unknown status is a validation error
    let app = test_app(state);
    let res = app
        .oneshot(with_admin(
            Request::builder()
                .uri("/api/admin/bookings?status=NONSENSE")
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

// ── Mechanic Job List ──

#[tokio::test]
async fn test_mechanic_job_list() {
    let state = test_state();
    let s = seed(&state);

    let id = create_booking(
        &state,
        s.customer,
        serde_json::json!({
            "service_ids": [s.oil_change],
            "mechanic_id": s.mechanic,
            "start": "2024-03-11 09:00:00",
        }),
    )
    .await;

    let app = test_app(state.clone());
    let res = app
        .oneshot(with_mechanic(
            Request::builder()
                .uri("/api/mechanic/bookings")
                .body(Body::empty())
                .unwrap(),
            s.mechanic,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    let jobs = json.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"].as_i64().unwrap(), id);
    assert_eq!(jobs[0]["service_lines"].as_array().unwrap().len(), 1);

    // the other mechanic sees nothing
    let app = test_app(state);
    let res = app
        .oneshot(with_mechanic(
            Request::builder()
                .uri("/api/mechanic/bookings")
                .body(Body::empty())
                .unwrap(),
            s.other_mechanic,
        ))
        .await
        .unwrap();
    let json = response_json(res).await;
    assert_eq!(json.as_array().unwrap().len(), 0);
}

// ── Health Check ──

#[tokio::test]
async fn test_health() {
    let state = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    assert_eq!(json["status"], "ok");
}
