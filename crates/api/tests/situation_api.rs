//! Integration tests for the situation and channel lifecycle over HTTP.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, delete, get, post_json, put_json};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: create with a channel binds it; closing releases it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn channel_binding_follows_the_situation_lifecycle() {
    let app = build_test_app();

    let response = post_json(&app, "/api/v1/channels", json!({"name": "TAC-1"})).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = post_json(
        &app,
        "/api/v1/situations",
        json!({"type": "pursuit", "metadata": {"channel": "TAC-1"}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let situation = body_json(response).await["data"].clone();
    let situation_id = situation["id"].as_str().expect("id").to_string();

    assert_eq!(situation["metadata"]["channel"], "TAC-1");
    assert_eq!(situation["channel"], "TAC-1");

    // The channel is now busy and back-references the situation.
    let channels = body_json(get(&app, "/api/v1/channels").await).await;
    let channel = &channels["data"][0];
    assert_eq!(channel["isBusy"], true);
    assert_eq!(channel["situationId"], situation["id"]);
    assert_eq!(channel["situationTitle"], "Pursuit");

    // Closing releases the lock.
    let response = post_json(
        &app,
        &format!("/api/v1/situations/{situation_id}/close"),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let channels = body_json(get(&app, "/api/v1/channels").await).await;
    let channel = &channels["data"][0];
    assert_eq!(channel["isBusy"], false);
    assert!(channel["situationId"].is_null());
}

// ---------------------------------------------------------------------------
// Test: metadata updates derive typed coordinates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metadata_update_derives_coordinates() {
    let app = build_test_app();

    let response = post_json(&app, "/api/v1/situations", json!({"type": "911"})).await;
    let situation = body_json(response).await["data"].clone();
    let id = situation["id"].as_str().expect("id").to_string();

    let response = put_json(
        &app,
        &format!("/api/v1/situations/{id}/metadata"),
        json!({"metadata": {"x": "1544.8", "y": "-1675.5", "location": "LSPD"}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = body_json(response).await["data"].clone();
    assert_eq!(updated["pos"]["x"], 1544.8);
    assert_eq!(updated["pos"]["y"], -1675.5);
    assert_eq!(updated["locationName"], "LSPD");
}

// ---------------------------------------------------------------------------
// Test: location update mirrors into metadata
// ---------------------------------------------------------------------------

#[tokio::test]
async fn location_update_mirrors_into_metadata() {
    let app = build_test_app();

    let response = post_json(&app, "/api/v1/situations", json!({"type": "trafficstop"})).await;
    let id = body_json(response).await["data"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let response = put_json(
        &app,
        &format!("/api/v1/situations/{id}/location"),
        json!({"location": "Grove Street", "x": 2495.0, "y": -1687.0}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = body_json(response).await["data"].clone();
    assert_eq!(updated["metadata"]["location"], "Grove Street");
    assert_eq!(updated["metadata"]["x"], "2495");
    assert_eq!(updated["metadata"]["y"], "-1687");
}

// ---------------------------------------------------------------------------
// Test: direct channel attach conflicts return 409
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conflicting_attach_returns_409() {
    let app = build_test_app();

    let response = post_json(&app, "/api/v1/channels", json!({"name": "TAC-2"})).await;
    let channel_id = body_json(response).await["data"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let first = uuid::Uuid::new_v4();
    let second = uuid::Uuid::new_v4();

    let response = post_json(
        &app,
        &format!("/api/v1/channels/{channel_id}/attach"),
        json!({"situationId": first}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(
        &app,
        &format!("/api/v1/channels/{channel_id}/attach"),
        json!({"situationId": second}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    assert_eq!(body["code"], "CONFLICT");
}

// ---------------------------------------------------------------------------
// Test: unknown situation returns 404 with the error envelope
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_situation_returns_404() {
    let app = build_test_app();

    let missing = uuid::Uuid::new_v4();
    let response = get(&app, &format!("/api/v1/situations/{missing}")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: blank situation type is rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blank_type_is_rejected() {
    let app = build_test_app();

    let response = post_json(&app, "/api/v1/situations", json!({"type": ""})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: delete cascades and removes the record
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_removes_situation_and_frees_channels() {
    let app = build_test_app();

    post_json(&app, "/api/v1/channels", json!({"name": "TAC-3"})).await;
    let response = post_json(
        &app,
        "/api/v1/situations",
        json!({"type": "code7", "metadata": {"channel": "TAC-3"}}),
    )
    .await;
    let id = body_json(response).await["data"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    let response = delete(&app, &format!("/api/v1/situations/{id}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(&app, &format!("/api/v1/situations/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let channels = body_json(get(&app, "/api/v1/channels").await).await;
    assert_eq!(channels["data"][0]["isBusy"], false);
}

// ---------------------------------------------------------------------------
// Test: joining a situation overrides the player's status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn joining_overrides_the_player_status() {
    let app = build_test_app();

    post_json(
        &app,
        "/api/v1/coords",
        json!({"nick": "Carl", "x": 10.0, "y": 20.0}),
    )
    .await;
    post_json(
        &app,
        "/api/v1/coords/status",
        json!({"nick": "Carl", "status": "on patrol"}),
    )
    .await;

    let response = post_json(&app, "/api/v1/situations", json!({"type": "pursuit"})).await;
    let id = body_json(response).await["data"]["id"]
        .as_str()
        .expect("id")
        .to_string();

    post_json(
        &app,
        &format!("/api/v1/situations/{id}/join"),
        json!({"nick": "Carl"}),
    )
    .await;

    let players = body_json(get(&app, "/api/v1/coords/all").await).await;
    assert_eq!(players["data"][0]["status"], "Pursuit");

    post_json(
        &app,
        &format!("/api/v1/situations/{id}/leave"),
        json!({"nick": "Carl"}),
    )
    .await;

    let players = body_json(get(&app, "/api/v1/coords/all").await).await;
    assert_eq!(players["data"][0]["status"], "on patrol");
}
