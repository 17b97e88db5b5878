mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_json, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn registration_assigns_token_immediately() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("owner", "pw", "CITIZEN").await?;
    let token = app.login_token("owner", "pw").await?;

    let response = app
        .post_json(
            "/api/vehicles",
            &json!({
                "regNumber": "DL01AB1234",
                "model": "Honda City",
                "type": "Car",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await?;

    assert_eq!(body["success"], true);
    let vehicle = &body["vehicle"];
    assert_eq!(vehicle["regNumber"], "DL01AB1234");
    let vehicle_token = vehicle["token"].as_str().unwrap();
    assert!(Uuid::parse_str(vehicle_token).is_ok());
    assert_eq!(vehicle["qrPayload"]["type"], "VEHICLE");
    assert_eq!(vehicle["qrPayload"]["token"], vehicle_token);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn missing_fields_are_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("owner2", "pw", "CITIZEN").await?;
    let token = app.login_token("owner2", "pw").await?;

    let response = app
        .post_json(
            "/api/vehicles",
            &json!({ "regNumber": "", "model": "Swift", "type": "Car" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn listing_backfills_legacy_tokens_idempotently() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let owner_id = app.insert_user("legacy", "pw", "CITIZEN").await?;
    let vehicle_id = app
        .insert_vehicle(owner_id, "UP16CC0001", "Alto", "Car", None)
        .await?;
    assert_eq!(app.vehicle_token(vehicle_id).await?, None);

    let token = app.login_token("legacy", "pw").await?;

    let first = app.get("/api/vehicles", Some(&token)).await?;
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = body_to_json(first.into_body()).await?;
    let first_token = first_body["vehicles"][0]["token"].as_str().unwrap().to_string();
    assert!(Uuid::parse_str(&first_token).is_ok());

    // Second read must see the already-backfilled token, not mint another.
    let second = app.get("/api/vehicles", Some(&token)).await?;
    let second_body = body_to_json(second.into_body()).await?;
    let second_token = second_body["vehicles"][0]["token"].as_str().unwrap();
    assert_eq!(second_token, first_token);
    assert_eq!(app.vehicle_token(vehicle_id).await?, Some(first_token));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn listing_includes_vehicle_documents() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let owner_id = app.insert_user("docowner", "pw", "CITIZEN").await?;
    let vehicle_id = app
        .insert_vehicle(
            owner_id,
            "HR26DD4455",
            "Creta",
            "Car",
            Some(Uuid::new_v4().to_string()),
        )
        .await?;
    app.insert_document(
        &Uuid::new_v4().to_string(),
        "PUC Certificate",
        "VALID",
        r#"{"detectedType":"PUC","status":"VALID"}"#,
        None,
        Some(vehicle_id),
    )
    .await?;

    let token = app.login_token("docowner", "pw").await?;
    let response = app.get("/api/vehicles", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await?;

    let documents = body["vehicles"][0]["documents"].as_array().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["type"], "PUC Certificate");
    assert_eq!(documents[0]["analysis"]["detectedType"], "PUC");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn vehicle_routes_are_citizen_only() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("patrol", "pw", "POLICE").await?;
    let police = app.login_token("patrol", "pw").await?;

    let list = app.get("/api/vehicles", Some(&police)).await?;
    assert_eq!(list.status(), StatusCode::UNAUTHORIZED);

    let create = app
        .post_json(
            "/api/vehicles",
            &json!({ "regNumber": "X", "model": "Y", "type": "Z" }),
            Some(&police),
        )
        .await?;
    assert_eq!(create.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}
