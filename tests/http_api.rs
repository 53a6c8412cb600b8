use std::sync::Arc;
use std::time::Duration;

use postboard::{AppState, PostboardConfig, api};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;


struct TestServer {
    base: String,
    client: Client,
    state: Arc<AppState>,
    stop: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<postboard::Result<()>>,
    _dir: TempDir,
}

impl TestServer {
    async fn start(configure: impl FnOnce(&mut PostboardConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PostboardConfig::new(dir.path());
        configure(&mut config);

        let state = AppState::init(config).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(api::serve(listener, Arc::clone(&state), async move {
            let _ = stopped.await;
        }));

        Self {
            base: format!("http://{addr}"),
            client: Client::new(),
            state,
            stop: Some(stop),
            server,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut request = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = self.client.delete(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn signup(&self, name: &str) -> (u64, String) {
        let (status, user) = self.post("/api/users", None, json!({ "name": name })).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = user["id"].as_u64().unwrap();

        let (status, login) = self.post("/api/login", None, json!({ "userId": id })).await;
        assert_eq!(status, StatusCode::OK);
        (id, login["token"].as_str().unwrap().to_string())
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.server.await.unwrap().unwrap();
        self.state.teardown();
    }
}

#[tokio::test]
async fn test_delete_post_then_undo() {
    let server = TestServer::start(|_| {}).await;
    let (_, token) = server.signup("ann").await;

    let (status, post) = server
        .post("/api/posts", Some(&token), json!({ "content": "hello" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = post["id"].as_u64().unwrap();

    let (status, deleted) = server
        .delete(&format!("/api/posts/{post_id}"), Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["success"], true);
    let undo_token = deleted["undoToken"].as_str().unwrap().to_string();
    assert!(undo_token.starts_with("undo_"));

    let (status, _) = server.get(&format!("/api/posts/{post_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, restored) = server
        .post("/api/undo", None, json!({ "undoToken": undo_token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored, json!({ "restored": "post", "id": post_id }));

    let (status, again) = server.get(&format!("/api/posts/{post_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, post);

    let (status, _) = server
        .post("/api/undo", None, json!({ "undoToken": undo_token }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_deleted_user_token_rejected_until_undo() {
    let server = TestServer::start(|_| {}).await;
    let (id, token) = server.signup("ann").await;

    let (status, deleted) = server.delete(&format!("/api/users/{id}"), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let undo_token = deleted["undoToken"].as_str().unwrap().to_string();

    let (status, _) = server
        .post("/api/posts", Some(&token), json!({ "content": "ghost" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, restored) = server
        .post("/api/undo", None, json!({ "undoToken": undo_token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["restored"], "user");

    let (status, _) = server
        .post("/api/posts", Some(&token), json!({ "content": "back" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    server.stop().await;
}

#[tokio::test]
async fn test_undo_after_grace_period_is_not_found() {
    let server = TestServer::start(|config| config.pending_ttl_ms = 100).await;
    let (id, token) = server.signup("ann").await;

    let (_, deleted) = server.delete(&format!("/api/users/{id}"), Some(&token)).await;
    let undo_token = deleted["undoToken"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status, body) = server
        .post("/api/undo", None, json!({ "undoToken": undo_token }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (_, users) = server.get("/api/users").await;
    assert_eq!(users, json!([]));

    server.stop().await;
}

#[tokio::test]
async fn test_error_statuses() {
    let server = TestServer::start(|_| {}).await;
    let (ann, _) = server.signup("ann").await;
    let (_, bob_token) = server.signup("bob").await;

    let (status, _) = server.delete(&format!("/api/users/{ann}"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server
        .delete(&format!("/api/users/{ann}"), Some(&bob_token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = server.post("/api/users", None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.post("/api/undo", None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.get("/api/users/424242").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.get("/api/users/not-a-number").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, users) = server.get("/api/users").await;
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.get("passwordHash").is_none()));

    server.stop().await;
}

#[tokio::test]
async fn test_rate_limit() {
    let server = TestServer::start(|config| config.rate_limit_max = 3).await;

    for _ in 0..3 {
        let (status, _) = server.get("/api/posts").await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = server.get("/api/posts").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate limit exceeded");

    server.stop().await;
}

#[tokio::test]
async fn test_event_stream_delivers_deletes() {
    let server = TestServer::start(|_| {}).await;
    let (id, token) = server.signup("ann").await;

    let mut events = server
        .client
        .get(server.url("/api/events"))
        .send()
        .await
        .unwrap();
    assert_eq!(events.status(), StatusCode::OK);

    server
        .post("/api/posts", Some(&token), json!({ "content": "live" }))
        .await;
    server.delete(&format!("/api/users/{id}"), Some(&token)).await;

    let mut received = String::new();
    let read = async {
        while !received.contains("event: user-deleted") {
            match events.chunk().await.unwrap() {
                Some(chunk) => received.push_str(&String::from_utf8_lossy(&chunk)),
                None => break,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read).await.unwrap();

    let created = received.find("event: post-created").unwrap();
    let deleted = received.find("event: user-deleted").unwrap();
    assert!(created < deleted);
    assert!(received.contains("undoToken"));

    drop(events);
    server.stop().await;
}
