//! HTTP integration tests for the Tribe server
//!
//! The server runs on a random local port backed by the in-memory store.
//!
//! Run with: cargo test -p tribe-server --test integration_tests

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tribe_server::state::{Config, MEMORY_DATABASE_URL};
use tribe_server::store::MemoryStore;
use uuid::Uuid;

/// Test server wrapper
struct TestServer {
    addr: std::net::SocketAddr,
    store: Arc<MemoryStore>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> anyhow::Result<Self> {
        let config = Config {
            bind_address: "127.0.0.1:0".to_string(),
            database_url: MEMORY_DATABASE_URL.to_string(),
            ..Config::default()
        };

        let store = Arc::new(MemoryStore::new());
        let router = tribe_server::build_app(config, store.clone())?;

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Ok(Self {
            addr,
            store,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn start_test_server() -> TestServer {
    TestServer::start().await.expect("Failed to start test server")
}

/// Create a community as `user` and return its JSON body
async fn create_community(client: &Client, server: &TestServer, user: Uuid, name: &str) -> Value {
    let response = client
        .post(server.url("/api/communities"))
        .header("x-user-id", user.to_string())
        .json(&json!({ "name": name, "type": "CINEMA", "description": "Screenings" }))
        .send()
        .await
        .expect("Create request failed");

    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.expect("Invalid create response")
}

async fn join(client: &Client, server: &TestServer, user: Uuid, code: &str) -> reqwest::Response {
    client
        .post(server.url("/api/communities/join"))
        .header("x-user-id", user.to_string())
        .json(&json!({ "join_code": code }))
        .send()
        .await
        .expect("Join request failed")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = start_test_server().await;
    let response = reqwest::get(server.url("/health")).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_requests_without_identity_are_rejected() {
    let server = start_test_server().await;
    let client = Client::new();

    let response = client
        .post(server.url("/api/communities"))
        .json(&json!({ "name": "Nobody Club", "type": "MUSIC" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(server.url("/api/communities"))
        .header("x-user-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_create_and_fetch_community() {
    let server = start_test_server().await;
    let client = Client::new();
    let creator = Uuid::new_v4();

    let created = create_community(&client, &server, creator, "Late Shows").await;
    assert_eq!(created["type"], "CINEMA");
    assert_eq!(created["members"].as_array().unwrap().len(), 1);
    assert_eq!(created["members"][0]["role"], "ADMIN");
    assert_eq!(created["members"][0]["user_id"], creator.to_string());

    let id = created["id"].as_str().unwrap();
    let code = created["join_code"].as_str().unwrap();
    assert_eq!(code.len(), 6);

    let by_id: Value = client
        .get(server.url(&format!("/api/communities/{}", id)))
        .header("x-user-id", Uuid::new_v4().to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(by_id["name"], "Late Shows");

    let by_code: Value = client
        .get(server.url(&format!("/api/communities/code/{}", code)))
        .header("x-user-id", Uuid::new_v4().to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(by_code["id"], id);
}

#[tokio::test]
async fn test_invalid_name_is_bad_request() {
    let server = start_test_server().await;
    let client = Client::new();

    let response = client
        .post(server.url("/api/communities"))
        .header("x-user-id", Uuid::new_v4().to_string())
        .json(&json!({ "name": "x!", "type": "SPORTS" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(server.store.community_count().await, 0);
}

#[tokio::test]
async fn test_join_conflict_and_unknown_code() {
    let server = start_test_server().await;
    let client = Client::new();
    let created = create_community(&client, &server, Uuid::new_v4(), "Open Mic").await;
    let code = created["join_code"].as_str().unwrap();
    let user = Uuid::new_v4();

    let response = join(&client, &server, user, code).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let member: Value = response.json().await.unwrap();
    assert_eq!(member["role"], "MEMBER");

    let response = join(&client, &server, user, code).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = join(&client, &server, user, "zzzzzz").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_exhausted_join_codes_return_server_error() {
    let server = start_test_server().await;
    let client = Client::new();
    server.store.inject_join_code_collisions(5).await;

    let response = client
        .post(server.url("/api/communities"))
        .header("x-user-id", Uuid::new_v4().to_string())
        .json(&json!({ "name": "Unlucky", "type": "MUSIC" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "JOIN_CODE_GENERATION_FAILED");
    assert_eq!(server.store.community_count().await, 0);
}

#[tokio::test]
async fn test_join_code_wider_than_column_fails_startup() {
    let config = Config {
        database_url: MEMORY_DATABASE_URL.to_string(),
        join_code_length: 33,
        ..Config::default()
    };
    let result = tribe_server::build_app(config, Arc::new(MemoryStore::new()));
    let err = result.err().expect("startup should reject the join code length");
    assert!(format!("{err:#}").contains("JOIN_CODE_LENGTH"));
}

#[tokio::test]
async fn test_admin_transfer_flow() {
    let server = start_test_server().await;
    let client = Client::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let created = create_community(&client, &server, a, "Matinee").await;
    let id = created["id"].as_str().unwrap().to_string();
    let code = created["join_code"].as_str().unwrap().to_string();

    assert_eq!(join(&client, &server, b, &code).await.status(), StatusCode::CREATED);

    // Member cannot be made admin directly
    let response = client
        .post(server.url(&format!("/api/communities/{}/members/{}/admin", id, b)))
        .header("x-user-id", a.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .patch(server.url(&format!("/api/communities/{}/members/{}/role", id, b)))
        .header("x-user-id", a.to_string())
        .json(&json!({ "role": "MODERATOR" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(server.url(&format!("/api/communities/{}/members/{}/admin", id, b)))
        .header("x-user-id", a.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.text().await.unwrap().is_empty());

    let members: Vec<Value> = client
        .get(server.url(&format!("/api/communities/{}/members", id)))
        .header("x-user-id", a.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let role_of = |user: Uuid| {
        members
            .iter()
            .find(|m| m["user_id"] == user.to_string())
            .map(|m| m["role"].clone())
    };
    assert_eq!(role_of(b), Some(json!("ADMIN")));
    assert_eq!(role_of(a), Some(json!("MODERATOR")));

    // Former admin may now leave; the new admin may not
    let response = client
        .post(server.url(&format!("/api/communities/{}/exit", id)))
        .header("x-user-id", a.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .post(server.url(&format!("/api/communities/{}/exit", id)))
        .header("x-user-id", b.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NOT_ALLOWED");
}

#[tokio::test]
async fn test_moderation_and_deletion() {
    let server = start_test_server().await;
    let client = Client::new();
    let admin = Uuid::new_v4();
    let member = Uuid::new_v4();

    let created = create_community(&client, &server, admin, "Derby Day").await;
    let id = created["id"].as_str().unwrap().to_string();
    let code = created["join_code"].as_str().unwrap().to_string();
    join(&client, &server, member, &code).await;

    // Member cannot rename or remove
    let response = client
        .patch(server.url(&format!("/api/communities/{}/name", id)))
        .header("x-user-id", member.to_string())
        .json(&json!({ "name": "Taken Over" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .delete(server.url(&format!("/api/communities/{}/members/{}", id, admin)))
        .header("x-user-id", member.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admin edits the banner and removes the member
    let response = client
        .patch(server.url(&format!("/api/communities/{}/banner", id)))
        .header("x-user-id", admin.to_string())
        .json(&json!({ "banner_url": "https://cdn.example.com/derby.png" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["banner_url"], "https://cdn.example.com/derby.png");

    let response = client
        .delete(server.url(&format!("/api/communities/{}/members/{}", id, member)))
        .header("x-user-id", admin.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let members: Vec<Value> = client
        .get(server.url(&format!("/api/communities/{}/members", id)))
        .header("x-user-id", admin.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(members.len(), 1);

    let response = client
        .delete(server.url(&format!("/api/communities/{}", id)))
        .header("x-user-id", admin.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(server.url(&format!("/api/communities/{}", id)))
        .header("x-user-id", admin.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_browse_and_user_communities() {
    let server = start_test_server().await;
    let client = Client::new();
    let user = Uuid::new_v4();

    create_community(&client, &server, user, "Noir Nights").await;
    create_community(&client, &server, Uuid::new_v4(), "Anime Club").await;

    let listed: Vec<Value> = client
        .get(server.url("/api/communities?type=CINEMA&search=noir"))
        .header("x-user-id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "Noir Nights");
    assert_eq!(listed[0]["member_count"], 1);

    let response = client
        .get(server.url("/api/communities?limit=0"))
        .header("x-user-id", user.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mine: Vec<Value> = client
        .get(server.url("/api/users/me/communities"))
        .header("x-user-id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["role"], "ADMIN");

    let theirs: Vec<Value> = client
        .get(server.url(&format!("/api/users/{}/communities", user)))
        .header("x-user-id", Uuid::new_v4().to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(theirs.len(), 1);
}
