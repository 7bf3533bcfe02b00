// Shared bootstrap and WebSocket helpers for integration tests.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use snake_session_server::{CoordinatorSettings, ServerOptions, run_with_options};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

// Base URL shared by all tests once the server publishes its bound address.
static SERVER_URL: OnceLock<String> = OnceLock::new();
// One-time guard so the bootstrap path runs only once per test binary.
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Short timers so full match flows complete quickly under test. Every mode
// fills at two players, letting each test use its own mode without
// cross-matching against tests running in parallel.
fn test_options() -> ServerOptions {
    ServerOptions {
        settings: CoordinatorSettings {
            battle_royale_capacity: 2,
            cooperative_capacity: 2,
            countdown: Duration::from_secs(1),
            tick_interval: Duration::from_millis(50),
            cleanup_grace: Duration::from_millis(400),
            grid_width: 20,
            grid_height: 20,
        },
        stats_url: None,
        stats_timeout: Duration::from_millis(500),
        events_capacity: 256,
        outbound_capacity: 64,
    }
}

/// Ensures the test server is running and returns the shared base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // An OS thread keeps the server alive across individual
        // `#[tokio::test]` runtimes.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                // Ephemeral port to avoid collisions with local services.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{addr}"));
                run_with_options(listener, test_options())
                    .await
                    .expect("server failed");
            });
        });
        wait_for_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

// Waits for the URL publication, then for the socket to accept connections.
fn wait_for_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("server did not become ready in time");
}

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect_client() -> WsClient {
    let base = ensure_server();
    let url = format!("{}/ws", base.replacen("http", "ws", 1));
    let (client, _) = connect_async(url).await.expect("websocket connect");
    client
}

pub async fn send_event(client: &mut WsClient, event: Value) {
    client
        .send(Message::Text(event.to_string()))
        .await
        .expect("send event");
}

/// Next JSON frame; panics after `timeout`.
pub async fn next_event(client: &mut WsClient, timeout: Duration) -> Value {
    loop {
        let frame = tokio::time::timeout(timeout, client.next())
            .await
            .expect("timed out waiting for an event")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("valid json");
        }
    }
}

/// Skips frames (ticks and the like) until an event of the wanted type
/// arrives.
pub async fn await_event(client: &mut WsClient, wanted: &str, timeout: Duration) -> Value {
    loop {
        let event = next_event(client, timeout).await;
        if event["type"] == wanted {
            return event;
        }
    }
}
