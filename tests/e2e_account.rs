//! E2E tests for the signup hook and account deletion

mod common;

use common::TestServer;
use dreamtoon::data::Avatar;
use serde_json::{Value, json};

async fn signup(server: &TestServer, user_id: &str, auth: Option<&str>) -> reqwest::Response {
    let mut request = server
        .client
        .post(server.fn_url("on-user-created"))
        .json(&json!({"type": "INSERT", "record": {"id": user_id}}));
    if let Some(auth) = auth {
        request = request.header("Authorization", auth);
    }
    request.send().await.unwrap()
}

async fn delete_user(server: &TestServer, token: &str, body: Value) -> reqwest::Response {
    server
        .client
        .post(server.fn_url("delete_user"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_signup_creates_profile_once() {
    let server = TestServer::new().await;

    let response = signup(&server, "alice", None).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");

    let profile = server.state.db.get_profile("alice").await.unwrap().unwrap();
    assert_eq!(profile.name, "New User");
    assert_eq!(profile.subscription_status, "free");

    let again = signup(&server, "alice", None).await;
    assert_eq!(again.status(), 200);
    assert_eq!(again.text().await.unwrap(), "Profile already exists");
}

#[tokio::test]
async fn test_signup_requires_record_id() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.fn_url("on-user-created"))
        .json(&json!({"record": {"id": "  "}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = server
        .client
        .post(server.fn_url("on-user-created"))
        .json(&json!({"type": "INSERT"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_signup_hook_secret() {
    let server = TestServer::with_config(|config| {
        config.auth.hook_secret = Some("hook-secret".to_string());
    })
    .await;

    let response = signup(&server, "bob", None).await;
    assert_eq!(response.status(), 401);
    let response = signup(&server, "bob", Some("wrong")).await;
    assert_eq!(response.status(), 401);
    assert!(server.state.db.get_profile("bob").await.unwrap().is_none());

    let response = signup(&server, "bob", Some("Bearer hook-secret")).await;
    assert_eq!(response.status(), 200);
    let response = signup(&server, "carol", Some("hook-secret")).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_delete_user_removes_everything() {
    let server = TestServer::new().await;
    let token = server.login("dave");
    server.create_profile("dave").await;

    // A comic with stored panels and a finalized avatar
    let dream = reqwest::multipart::Form::new().text("text", "A garden on the roof");
    let response = server
        .client
        .post(server.fn_url("process_dream"))
        .bearer_auth(&token)
        .multipart(dream)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let panel_key = format!("dave/{}/1.png", body["comicId"].as_str().unwrap());

    server
        .state
        .storage
        .upload("avatars", "dave/ghibli.png", vec![1, 2, 3], "image/png")
        .await
        .unwrap();
    let response = server
        .client
        .post(server.fn_url("finalize-avatar"))
        .bearer_auth(&token)
        .json(&json!({"styleName": "Ghibli", "avatarPath": "dave/ghibli.png"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = delete_user(&server, &token, json!({"user_id": "dave"})).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    let db = &server.state.db;
    assert!(db.get_profile("dave").await.unwrap().is_none());
    assert!(db.list_comics_for_user("dave", 10).await.unwrap().is_empty());
    assert!(db.list_avatars_for_user("dave").await.unwrap().is_empty());
    assert!(db.list_unlocked_styles("dave").await.unwrap().is_empty());

    assert!(server.state.storage.download("comics", &panel_key).await.is_err());
    assert!(
        server
            .state
            .storage
            .download("avatars", "dave/ghibli.png")
            .await
            .is_err()
    );

    let deleted = server.upstream.state.deleted_users.lock().unwrap().clone();
    assert_eq!(deleted, vec!["dave".to_string()]);
}

#[tokio::test]
async fn test_delete_user_requires_user_id() {
    let server = TestServer::new().await;
    let token = server.login("erin");

    let response = delete_user(&server, &token, json!({})).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "user_id is required");
}

#[tokio::test]
async fn test_delete_other_user_is_forbidden() {
    let server = TestServer::new().await;
    let token = server.login("fred");
    server.create_profile("gina").await;

    let response = delete_user(&server, &token, json!({"user_id": "gina"})).await;
    assert_eq!(response.status(), 403);
    assert!(server.state.db.get_profile("gina").await.unwrap().is_some());
    assert!(server.upstream.state.deleted_users.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_user_reports_provider_error() {
    let server = TestServer::new().await;
    let token = server.login("hank");
    server.create_profile("hank").await;
    *server.upstream.state.delete_user_error.lock().unwrap() = Some("User not found".to_string());

    let response = delete_user(&server, &token, json!({"user_id": "hank"})).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn test_delete_user_keeps_blobs_outside_the_user_folder() {
    let server = TestServer::new().await;
    let token = server.login("mallory");
    server.create_profile("mallory").await;
    server
        .state
        .storage
        .upload("avatars", "victim/ghibli.png", vec![4, 5, 6], "image/png")
        .await
        .unwrap();
    // A stored row pointing at another user's blob
    server
        .state
        .db
        .insert_avatar(&Avatar {
            id: "legacy".to_string(),
            user_id: "mallory".to_string(),
            style: "Ghibli".to_string(),
            avatar_path: "victim/ghibli.png".to_string(),
            original_photo_path: "server_generated".to_string(),
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let response = delete_user(&server, &token, json!({"user_id": "mallory"})).await;
    assert_eq!(response.status(), 200);

    assert!(server.state.db.list_avatars_for_user("mallory").await.unwrap().is_empty());
    let kept = server.state.storage.download("avatars", "victim/ghibli.png").await.unwrap();
    assert_eq!(kept, vec![4, 5, 6]);
}
