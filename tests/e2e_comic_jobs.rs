//! E2E tests for background comic generation and status polling

mod common;

use std::sync::atomic::Ordering;

use common::TestServer;
use common::upstream::png;
use serde_json::{Value, json};

async fn start_job(server: &TestServer, token: &str, body: Value) -> reqwest::Response {
    server
        .client
        .post(server.fn_url("generate_comic"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_generate_comic_completes_in_background() {
    let server = TestServer::new().await;
    let token = server.login("alice");

    let response = start_job(
        &server,
        &token,
        json!({"story": "A dragon teaches me to bake bread", "style_name": "Ghibli"}),
    )
    .await;
    assert_eq!(response.status(), 202);

    let accepted: Value = response.json().await.unwrap();
    assert_eq!(accepted["status"], "pending");
    let comic_id = accepted["comicId"].as_str().unwrap().to_string();

    let job = server.wait_for_comic(&token, &comic_id).await;
    assert_eq!(job["status"], "complete");
    assert_eq!(job["title"], "Candy Flight");
    assert!(job.get("error").is_none());

    let urls = job["image_urls"].as_array().unwrap();
    assert_eq!(urls.len(), 4);
    for (idx, url) in urls.iter().enumerate() {
        assert_eq!(
            url.as_str().unwrap(),
            server.url(&format!("/files/comics/alice/{comic_id}/{}.png", idx + 1))
        );
    }

    // No reference image: panels come from plain generation
    assert_eq!(server.upstream.image_prompts().len(), 4);
    assert_eq!(server.upstream.state.image_edits.load(Ordering::SeqCst), 0);

    let comic = server.state.db.get_comic(&comic_id).await.unwrap().unwrap();
    assert_eq!(comic.panel_count, 4);
    assert_eq!(comic.cost_cents, 20);
    assert!(comic.storyboard.is_some());
}

#[tokio::test]
async fn test_num_panels_caps_the_storyboard() {
    let server = TestServer::new().await;
    let token = server.login("bob");

    let accepted: Value = start_job(
        &server,
        &token,
        json!({"story": "Running late", "style_name": "Simpsons", "num_panels": 2}),
    )
    .await
    .json()
    .await
    .unwrap();

    let job = server
        .wait_for_comic(&token, accepted["comicId"].as_str().unwrap())
        .await;
    assert_eq!(job["status"], "complete");
    assert_eq!(job["image_urls"].as_array().unwrap().len(), 2);

    let chats = server.upstream.chat_requests();
    assert!(chats[0].to_string().contains("up to a maximum of 2"));
}

#[tokio::test]
async fn test_reference_avatar_uses_image_edits() {
    let server = TestServer::new().await;
    let token = server.login("carol");
    server
        .state
        .storage
        .upload("avatars", "carol/ghibli.png", png(8, 8, [10, 20, 30, 255]), "image/png")
        .await
        .unwrap();

    let accepted: Value = start_job(
        &server,
        &token,
        json!({
            "story": "Swimming with whales",
            "style_name": "Ghibli",
            "character_reference_path": "carol/ghibli.png"
        }),
    )
    .await
    .json()
    .await
    .unwrap();

    let job = server
        .wait_for_comic(&token, accepted["comicId"].as_str().unwrap())
        .await;
    assert_eq!(job["status"], "complete");
    assert_eq!(server.upstream.state.image_edits.load(Ordering::SeqCst), 4);
    assert!(server.upstream.image_prompts().is_empty());
}

#[tokio::test]
async fn test_profile_avatar_is_the_default_reference() {
    let server = TestServer::new().await;
    let token = server.login("dave");
    server.create_profile("dave").await;
    server
        .state
        .storage
        .upload("avatars", "dave/simpsons.png", png(8, 8, [200, 200, 0, 255]), "image/png")
        .await
        .unwrap();
    server
        .state
        .db
        .set_display_avatar("dave", "dave/simpsons.png", "Simpsons", chrono::Utc::now())
        .await
        .unwrap();

    let accepted: Value = start_job(
        &server,
        &token,
        json!({"story": "A picnic on a cloud", "style_name": "Simpsons"}),
    )
    .await
    .json()
    .await
    .unwrap();

    let job = server
        .wait_for_comic(&token, accepted["comicId"].as_str().unwrap())
        .await;
    assert_eq!(job["status"], "complete");
    assert_eq!(server.upstream.state.image_edits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_failed_panel_marks_the_job_as_error() {
    let server = TestServer::new().await;
    let token = server.login("erin");
    server.upstream.fail_prompts_containing("Action beat 3");

    let accepted: Value = start_job(
        &server,
        &token,
        json!({"story": "A storm inside a lighthouse", "style_name": "American"}),
    )
    .await
    .json()
    .await
    .unwrap();

    let job = server
        .wait_for_comic(&token, accepted["comicId"].as_str().unwrap())
        .await;
    assert_eq!(job["status"], "error");
    assert!(job["error"].as_str().is_some_and(|e| !e.is_empty()));

    // Panels that did render are not left behind
    let comic_id = accepted["comicId"].as_str().unwrap();
    for n in 1..=6 {
        let key = format!("erin/{comic_id}/{n}.png");
        assert!(server.state.storage.download("comics", &key).await.is_err(), "{key}");
    }
}

#[tokio::test]
async fn test_missing_reference_marks_the_job_as_error() {
    let server = TestServer::new().await;
    let token = server.login("fred");

    let accepted: Value = start_job(
        &server,
        &token,
        json!({
            "story": "The stairs never end",
            "style_name": "Ghibli",
            "character_reference_path": "fred/nowhere.png"
        }),
    )
    .await
    .json()
    .await
    .unwrap();

    let job = server
        .wait_for_comic(&token, accepted["comicId"].as_str().unwrap())
        .await;
    assert_eq!(job["status"], "error");
}

#[tokio::test]
async fn test_flagged_story_is_rejected() {
    let server = TestServer::new().await;
    let token = server.login("gina");
    server
        .upstream
        .set_moderation_scores(json!({"violence": 0.1, "hate": 0.9}));

    let response = start_job(
        &server,
        &token,
        json!({"story": "Something hateful", "style_name": "Ghibli"}),
    )
    .await;
    assert_eq!(response.status(), 422);

    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("'hate'"));

    // Nothing is queued
    let comics = server.state.db.list_comics_for_user("gina", 10).await.unwrap();
    assert!(comics.is_empty());
    assert!(server.upstream.chat_requests().is_empty());
}

#[tokio::test]
async fn test_tolerated_violence_is_accepted() {
    let server = TestServer::new().await;
    let token = server.login("hank");
    server.upstream.set_moderation_scores(json!({"violence": 0.35}));

    let response = start_job(
        &server,
        &token,
        json!({"story": "A pillow fight that gets out of hand", "style_name": "Ghibli"}),
    )
    .await;
    assert_eq!(response.status(), 202);
}

#[tokio::test]
async fn test_blank_story_is_rejected() {
    let server = TestServer::new().await;
    let token = server.login("ivy");

    let response = start_job(&server, &token, json!({"story": "  ", "style_name": "Ghibli"})).await;
    assert_eq!(response.status(), 400);

    let response = start_job(&server, &token, json!({"style_name": "Ghibli"})).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_status_reports_missing_and_dedupes() {
    let server = TestServer::new().await;
    let owner = server.login("jack");
    let other = server.login("kate");

    let accepted: Value = start_job(
        &server,
        &owner,
        json!({"story": "Late for a test", "style_name": "Ghibli"}),
    )
    .await
    .json()
    .await
    .unwrap();
    let comic_id = accepted["comicId"].as_str().unwrap().to_string();
    server.wait_for_comic(&owner, &comic_id).await;

    let body: Value = server
        .client
        .post(server.fn_url("comics/status"))
        .bearer_auth(&owner)
        .json(&json!({"ids": [comic_id, "nope", comic_id]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["id"], comic_id.as_str());
    assert_eq!(jobs[0]["status"], "complete");
    assert_eq!(jobs[1]["id"], "nope");
    assert_eq!(jobs[1]["status"], "missing");

    // Someone else's comic looks missing
    let body: Value = server
        .client
        .post(server.fn_url("comics/status"))
        .bearer_auth(&other)
        .json(&json!({"ids": [comic_id]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["jobs"][0]["status"], "missing");
}

#[tokio::test]
async fn test_status_caps_the_number_of_ids() {
    let server = TestServer::new().await;
    let token = server.login("liam");

    let ids: Vec<String> = (0..80).map(|i| format!("id-{i}")).collect();
    let body: Value = server
        .client
        .post(server.fn_url("comics/status"))
        .bearer_auth(&token)
        .json(&json!({ "ids": ids }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["jobs"].as_array().unwrap().len(), 50);
}

#[tokio::test]
async fn test_reference_from_another_user_is_rejected() {
    let server = TestServer::new().await;
    server
        .state
        .storage
        .upload("avatars", "victim/ghibli.png", png(8, 8, [1, 2, 3, 255]), "image/png")
        .await
        .unwrap();
    let token = server.login("mallory");

    let response = start_job(
        &server,
        &token,
        json!({
            "story": "Borrowing a face",
            "style_name": "Ghibli",
            "character_reference_path": "victim/ghibli.png"
        }),
    )
    .await;
    assert_eq!(response.status(), 400);

    let comics = server.state.db.list_comics_for_user("mallory", 10).await.unwrap();
    assert!(comics.is_empty());
    assert_eq!(server.upstream.state.image_edits.load(Ordering::SeqCst), 0);
}
