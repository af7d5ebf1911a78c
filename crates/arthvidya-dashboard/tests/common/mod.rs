use std::net::SocketAddr;
use std::time::Duration;

use arthvidya_core::StateManager;
use arthvidya_core::test_helpers::initialized_memory_manager;

use arthvidya_dashboard::build_app;
use arthvidya_dashboard::config::DashboardConfig;
use arthvidya_dashboard::state::AppState;

pub struct TestServer {
    pub addr: SocketAddr,
    pub manager: StateManager,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with the demo secrets over an initialized
    /// in-memory store.
    pub async fn new() -> Self {
        Self::from_parts(DashboardConfig::default(), initialized_memory_manager()).await
    }

    pub async fn with_config(config: DashboardConfig) -> Self {
        Self::from_parts(config, initialized_memory_manager()).await
    }

    pub async fn from_parts(config: DashboardConfig, manager: StateManager) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = AppState::new(config, manager.clone()).unwrap();
        let app = build_app(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            manager,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Log in and return the session token.
    pub async fn login(&self, role: &str, secret: &str) -> String {
        let resp = reqwest::Client::new()
            .post(self.url("/api/v1/login"))
            .json(&serde_json::json!({ "role": role, "secret": secret }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "login as {role} failed");
        let body: serde_json::Value = resp.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn login_control(&self) -> String {
        self.login("Control Center", "ferrari").await
    }
}
