//! Shared test utilities for lever-server integration tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use lever_core::{Coordinator, EpsilonGreedy, MemoryExpiryIndex, MemoryRecordStore};
use lever_server::{AppState, LeverServer, ServerConfig, create_router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const FEATURES: [&str; 3] = ["red", "green", "blue"];

/// Coordinator over in-memory storage that always exploits
pub fn coordinator() -> Arc<Coordinator> {
    let coordinator = Coordinator::new(
        Arc::new(EpsilonGreedy::new(FEATURES.len(), 0.0).unwrap()),
        Arc::new(MemoryRecordStore::new()),
        Arc::new(MemoryExpiryIndex::new()),
        FEATURES.iter().map(|f| f.to_string()).collect(),
    )
    .unwrap();
    Arc::new(coordinator)
}

/// In-process router wrapped in a TestServer
#[allow(dead_code)]
pub fn test_server(coordinator: Arc<Coordinator>) -> TestServer {
    let state = Arc::new(AppState::new(coordinator, chrono::Duration::zero()));
    TestServer::new(create_router(state, Duration::from_secs(5))).unwrap()
}

/// Spawns a real server in the background, returns its address and shutdown token
#[allow(dead_code)]
pub async fn spawn_server(config: ServerConfig) -> (SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = LeverServer::new(config, coordinator());
    let token = server.shutdown_token();
    tokio::spawn(async move {
        let _ = server.run_with_listener(listener).await;
    });

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(Duration::from_millis(10)).await;

    (addr, token)
}
