use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use userstore_api::{serve, ApiConfig, AppState};
use userstore_core::Store;

struct TestServer {
    base_url: String,
    http: reqwest::Client,
    shutdown: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(store: Store) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let state = AppState::new(store, ApiConfig::default());
        let handle = tokio::spawn(serve(listener, state, shutdown.clone()));
        Self {
            base_url: format!("http://{addr}"),
            // No idle keep-alive connections, so shutdown drains at once.
            http: reqwest::Client::builder()
                .pool_max_idle_per_host(0)
                .build()
                .unwrap(),
            shutdown,
            handle,
        }
    }

    async fn request(&self, method: &str, path: &str, body: Option<&str>) -> (u16, Value) {
        let method = Method::from_bytes(method.as_bytes()).unwrap();
        let mut request = self
            .http
            .request(method, format!("{}{path}", self.base_url));
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_owned());
        }

        let resp = request.send().await.unwrap();
        let status = resp.status().as_u16();
        let payload = resp.text().await.unwrap();
        let json = if payload.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&payload).unwrap()
        };
        (status, json)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn crud_over_http() {
    let server = TestServer::start(Store::open_in_memory().unwrap()).await;

    let (status, created) = server
        .request("POST", "/users", Some(r#"{"name":"Ann","email":"ann@email.com"}"#))
        .await;
    assert_eq!(status, 200);
    let id = created["user"]["id"].as_str().unwrap().to_string();

    let (status, fetched) = server.request("GET", &format!("/users/{id}"), None).await;
    assert_eq!(status, 200);
    assert_eq!(fetched["users"]["email"], "ann@email.com");
    assert_eq!(fetched["users"]["isActive"], Value::Null);

    let (status, updated) = server
        .request("PUT", &format!("/users/{id}"), Some(r#"{"age":42}"#))
        .await;
    assert_eq!(status, 200);
    assert_eq!(updated["user"]["age"], 42);
    assert_eq!(updated["user"]["name"], "Ann");

    let (status, stats) = server.request("GET", "/users/stats", None).await;
    assert_eq!(status, 200);
    assert_eq!(stats["stats"]["totalEmails"], 1);
    assert_eq!(stats["stats"]["oldestPerson"], 42);

    let (status, _) = server.request("DELETE", &format!("/users/{id}"), None).await;
    assert_eq!(status, 200);

    let (status, missing) = server.request("GET", &format!("/users/{id}"), None).await;
    assert_eq!(status, 404);
    assert_eq!(missing["error"]["kind"], "NotFound");

    server.stop().await;
}

#[tokio::test]
async fn static_routes_win_over_id_route() {
    let server = TestServer::start(Store::open_in_memory().unwrap()).await;

    let (status, batch) = server
        .request(
            "POST",
            "/users/batch",
            Some(r#"{"users":[{"name":"A","email":"a@email.com"},{"name":"B","email":"b@other.org"}]}"#),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(batch["user"]["insertedCount"], 2);

    let (status, empty) = server
        .request("POST", "/users/batch", Some(r#"{"users":[]}"#))
        .await;
    assert_eq!(status, 200);
    assert_eq!(empty["user"]["insertedCount"], 0);

    let (status, deactivated) = server.request("PUT", "/users/batch", None).await;
    assert_eq!(status, 200);
    assert_eq!(deactivated["totalUsers"]["matchedCount"], 1);

    let (status, joined) = server.request("GET", "/users/join", None).await;
    assert_eq!(status, 200);
    assert_eq!(joined["users"].as_array().unwrap().len(), 2);
    assert_eq!(joined["users"][0]["profile"], Value::Null);

    let (status, tx) = server.request("GET", "/transactions", None).await;
    assert_eq!(status, 200);
    assert_eq!(tx["totalUsers"], 4);
    assert!(tx["user1"]["id"].is_string());
    assert!(tx["user2"]["id"].is_string());

    server.stop().await;
}

#[tokio::test]
async fn malformed_json_is_validation_error() {
    let server = TestServer::start(Store::open_in_memory().unwrap()).await;

    let (status, body) = server
        .request("POST", "/users", Some(r#"{"name":"Ann"}"#))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "ValidationError");

    let (status, body) = server
        .request("POST", "/transactions", Some(r#"{"users":[]}"#))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "ValidationError");

    server.stop().await;
}

#[tokio::test]
async fn data_survives_restart_on_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("userstore.db");

    let store = Store::open(&path).unwrap();
    let server = TestServer::start(store.clone()).await;
    let (status, _) = server
        .request("POST", "/users", Some(r#"{"name":"Ann","email":"ann@email.com"}"#))
        .await;
    assert_eq!(status, 200);
    server.stop().await;
    store.close().unwrap();

    let server = TestServer::start(Store::open(&path).unwrap()).await;
    let (status, listed) = server.request("GET", "/users", None).await;
    assert_eq!(status, 200);
    assert_eq!(listed["users"].as_array().unwrap().len(), 1);
    server.stop().await;
}
