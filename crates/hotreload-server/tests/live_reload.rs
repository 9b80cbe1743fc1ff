//! End-to-end live reload tests: real files, real sockets.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hotreload_server::{LiveReload, LiveReloadOptions, create_router};
use hotreload_watch::WatchOptions;
use pretty_assertions::assert_eq;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Site {
    _dir: tempfile::TempDir,
    root: PathBuf,
    addr: SocketAddr,
    live_reload: LiveReload,
}

impl Site {
    /// Serve a temp site with a single page and live reload running.
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("index.html"), "<html><body>v1</body></html>").unwrap();

        let mut live_reload = LiveReload::new(LiveReloadOptions {
            watch_paths: vec![root.clone()],
            watch: WatchOptions {
                debounce: Duration::from_millis(50),
                ..WatchOptions::default()
            },
            ..LiveReloadOptions::default()
        })
        .unwrap();
        live_reload.startup().unwrap();

        let app = create_router(&root, Some(&live_reload));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            _dir: dir,
            root,
            addr,
            live_reload,
        }
    }

    /// Connect a client and wait until the server has registered it.
    async fn connect(&self) -> Client {
        let expected = self.live_reload.broadcaster().len() + 1;
        let url = format!("ws://{}{}", self.addr, self.live_reload.ws_path());
        let (client, _) = connect_async(url).await.unwrap();
        self.wait_for_clients(expected).await;
        client
    }

    async fn wait_for_clients(&self, count: usize) {
        let broadcaster = self.live_reload.broadcaster();
        timeout(EVENT_TIMEOUT, async {
            while broadcaster.len() != count {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    fn edit_page(&self, content: &str) {
        fs::write(self.root.join("index.html"), content).unwrap();
    }
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let message = timeout(EVENT_TIMEOUT, client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match message {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_edit_sends_one_reload() {
    let mut site = Site::start().await;
    let mut client = site.connect().await;

    site.edit_page("<html><body>v2</body></html>");

    assert_eq!(next_text(&mut client).await, "reload");
    // A single save produces a single reload
    assert!(
        timeout(Duration::from_millis(400), client.next())
            .await
            .is_err()
    );

    site.live_reload.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_every_client_is_reloaded() {
    let mut site = Site::start().await;
    let mut first = site.connect().await;
    let mut second = site.connect().await;

    site.edit_page("<html><body>v2</body></html>");

    assert_eq!(next_text(&mut first).await, "reload");
    assert_eq!(next_text(&mut second).await, "reload");

    site.live_reload.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_edit_after_client_closes_reloads_the_rest() {
    let mut site = Site::start().await;
    let mut closing = site.connect().await;
    let mut staying = site.connect().await;

    closing.close(None).await.unwrap();
    site.edit_page("<html><body>v2</body></html>");

    assert_eq!(next_text(&mut staying).await, "reload");
    site.wait_for_clients(1).await;

    let report = site.live_reload.broadcaster().notify_changed().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.dropped, 0);

    site.live_reload.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_edit_after_client_vanishes_reloads_the_rest() {
    let mut site = Site::start().await;
    let vanishing = site.connect().await;
    let mut staying = site.connect().await;

    // No close frame: the TCP stream just goes away
    drop(vanishing);
    site.edit_page("<html><body>v2</body></html>");

    assert_eq!(next_text(&mut staying).await, "reload");
    site.wait_for_clients(1).await;
    assert!(
        timeout(Duration::from_millis(400), staying.next())
            .await
            .is_err()
    );

    site.live_reload.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reconnected_client_is_reloaded() {
    let mut site = Site::start().await;
    let mut client = site.connect().await;
    client.close(None).await.unwrap();
    site.wait_for_clients(0).await;

    let mut client = site.connect().await;
    site.edit_page("<html><body>v2</body></html>");

    assert_eq!(next_text(&mut client).await, "reload");

    site.live_reload.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let mut site = Site::start().await;
    let mut client = site.connect().await;

    site.live_reload.shutdown().await.unwrap();

    let message = timeout(EVENT_TIMEOUT, client.next()).await.unwrap();
    assert!(matches!(message, Some(Ok(Message::Close(_))) | None));
    site.wait_for_clients(0).await;
}
