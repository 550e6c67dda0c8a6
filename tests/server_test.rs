//! Integration tests for the reporting HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use chrono::DateTime;
    use punchsync::device::{
        DeviceLink, DeviceTarget, DeviceUser, MemoryDevice, PunchType, RawPunch,
    };
    use punchsync::gateway::{
        DispatchError, DispatchReceipt, Dispatcher, GatewayConfig, HttpDispatcher, PunchEvent,
    };
    use punchsync::server::{run, ServerConfig, ServerState};
    use punchsync::sync::create_shared_monitor;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn sample_device() -> MemoryDevice {
        let punch = |user: &str, at: &str, kind| {
            RawPunch::new(user, DateTime::parse_from_rfc3339(at).unwrap(), kind)
        };
        MemoryDevice::with_records(
            vec![DeviceUser {
                user_id: "1".to_string(),
                name: "Ada".to_string(),
            }],
            vec![
                punch("1", "2024-01-01T08:00:00+01:00", PunchType::In),
                punch("1", "2024-01-01T17:30:00+01:00", PunchType::Out),
                punch("1", "2024-01-02T08:10:00+01:00", PunchType::In),
            ],
        )
    }

    async fn start(link: DeviceLink) -> (SocketAddr, oneshot::Sender<()>) {
        let state = ServerState::new(link, create_shared_monitor());
        let (addr, shutdown_tx) = run(ServerConfig::new(0), state)
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        (addr, shutdown_tx)
    }

    async fn connected_link() -> DeviceLink {
        let link = DeviceLink::new();
        link.connect(&sample_device(), &DeviceTarget::new("memory", 4370))
            .await
            .expect("memory device connects");
        link
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx) = start(connected_link().await).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());
        assert_eq!(body["device_connected"], true);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (addr, shutdown_tx) = start(DeviceLink::new()).await;

        let response = reqwest::get(format!("http://{}/status", addr))
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["cycles_completed"], 0);
        assert!(body["last_sync_time"].is_null());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_sessions_endpoint() {
        let (addr, shutdown_tx) = start(connected_link().await).await;

        let response = reqwest::get(format!(
            "http://{}/sessions?start=2024-01-01&end=2024-01-01",
            addr
        ))
        .await
        .expect("Failed to send request");
        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        let sessions = body.as_array().expect("array of sessions");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["user_name"], "Ada");
        assert_eq!(sessions[0]["duration_hours"], 9.5);

        // Open-ended range picks up the unfinished day
        let response = reqwest::get(format!("http://{}/sessions?start=2024-01-02", addr))
            .await
            .expect("Failed to send request");
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert!(body[0]["check_out"].is_null());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_sessions_rejects_inverted_range() {
        let (addr, shutdown_tx) = start(connected_link().await).await;

        let response = reqwest::get(format!(
            "http://{}/sessions?start=2024-01-05&end=2024-01-01",
            addr
        ))
        .await
        .expect("Failed to send request");
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "INVALID_INPUT");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_sessions_without_device() {
        let (addr, shutdown_tx) = start(DeviceLink::new()).await;

        let response = reqwest::get(format!("http://{}/sessions", addr))
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "NOT_CONNECTED");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let (addr, shutdown_tx) = start(DeviceLink::new()).await;

        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/sessions", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "GET")
            .send()
            .await
            .expect("Failed to send request");

        // CORS preflight should succeed
        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
    }

    /// Collector that fails the first request and accepts the rest.
    #[derive(Default)]
    struct FlakyCollector {
        received: Mutex<Vec<(Option<String>, PunchEvent)>>,
    }

    async fn collect(
        State(collector): State<Arc<FlakyCollector>>,
        headers: HeaderMap,
        Json(event): Json<PunchEvent>,
    ) -> (StatusCode, &'static str) {
        let api_key = headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mut received = collector.received.lock().unwrap();
        received.push((api_key, event));
        if received.len() == 1 {
            (StatusCode::INTERNAL_SERVER_ERROR, "collector unavailable")
        } else {
            (StatusCode::OK, "ok")
        }
    }

    async fn start_collector(collector: Arc<FlakyCollector>) -> SocketAddr {
        let app = Router::new()
            .route("/api/attendance/device", post(collect))
            .with_state(collector);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind collector");
        let addr = listener.local_addr().expect("collector address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_http_dispatcher_maps_collector_status() {
        let collector = Arc::new(FlakyCollector::default());
        let addr = start_collector(Arc::clone(&collector)).await;

        let dispatcher = HttpDispatcher::new(GatewayConfig::new(
            format!("http://{}/api/attendance/device", addr),
            "secret-key",
        ))
        .expect("Failed to create dispatcher");
        let event = PunchEvent {
            user_id: "1".to_string(),
            timestamp: "2024-01-01T08:00:00+01:00".to_string(),
        };

        match dispatcher.send(&event).await {
            Err(DispatchError::Server { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "collector unavailable");
            }
            other => panic!("expected server error, got {other:?}"),
        }

        let receipt = dispatcher.send(&event).await.expect("second send succeeds");
        assert_eq!(receipt, DispatchReceipt { status: 200 });

        let received = collector.received.lock().unwrap();
        assert_eq!(received.len(), 2);
        for (api_key, body) in received.iter() {
            assert_eq!(api_key.as_deref(), Some("secret-key"));
            assert_eq!(body, &event);
        }
    }
}
