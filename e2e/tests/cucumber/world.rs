use std::{
    fmt::{Debug, Formatter},
    future::Future,
    sync::{mpsc::channel, Arc},
    time::Duration,
};

use actix_web::dev::ServerHandle;
use cash_ledger::{PrintQueue, SessionStore};
use cucumber::World;
use kiosk_common::{wire::API_KEY_HEADER, Secret};
use kiosk_edge::{
    app::{run_edge_with, EdgeHandles},
    config::{AcceptorPort, EdgeConfig, PrinterKind},
    decoder::PulseDecoderConfig,
};
use kiosk_server::{config::ServerConfig, server::create_server_instance};
use log::*;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const API_KEY: &str = "e2e-kiosk-key";
const WAIT_LIMIT: Duration = Duration::from_secs(10);

/// A kiosk edge running against the world's server, with the virtual acceptor standing in for the hardware.
pub struct EdgeRig {
    pub handles: EdgeHandles,
    pub token: CancellationToken,
    pub task: JoinHandle<()>,
}

#[derive(World)]
pub struct KioskWorld {
    pub config: ServerConfig,
    pub store: Option<Arc<SessionStore>>,
    pub queue: Option<Arc<PrintQueue>>,
    pub server_handle: Option<ServerHandle>,
    pub edge: Option<EdgeRig>,
    /// Requests made by the world carry the API key unless this is false
    pub send_api_key: bool,
    pub response: Option<(StatusCode, String)>,
}

impl Debug for KioskWorld {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KioskWorld")
            .field("port", &self.config.port)
            .field("server_running", &self.server_handle.is_some())
            .field("edge_running", &self.edge.is_some())
            .field("response", &self.response)
            .finish()
    }
}

impl Default for KioskWorld {
    fn default() -> Self {
        let _ = env_logger::try_init().ok();
        let config = ServerConfig {
            port: 20000 + rand::random::<u16>() % 10_000,
            api_key: Some(Secret::new(API_KEY.to_string())),
            ..ServerConfig::new("127.0.0.1", 0)
        };
        Self {
            config,
            store: None,
            queue: None,
            server_handle: None,
            edge: None,
            send_api_key: true,
            response: None,
        }
    }
}

impl KioskWorld {
    pub async fn start_server(&mut self) {
        let config = self.config.clone();
        let queue = Arc::new(PrintQueue::new(config.print_max_attempts));
        let store = Arc::new(SessionStore::new(Arc::clone(&queue)));
        info!("🌍️ Starting kiosk cloud on {}:{}", config.host, config.port);
        let (tx, rx) = channel();
        tokio::spawn({
            let store = Arc::clone(&store);
            let queue = Arc::clone(&queue);
            async move {
                let srv = create_server_instance(config, store, queue).expect("Error creating server instance");
                let _res = tx.send(srv.handle());
                match srv.await {
                    Ok(_) => info!("🌍️ Server shut down"),
                    Err(e) => warn!("🌍️ Server error: {e}"),
                }
            }
        });
        let handle = rx.recv().expect("Server did not start");
        info!("🌍️ Server started");
        self.store = Some(store);
        self.queue = Some(queue);
        self.server_handle = Some(handle);
    }

    /// Starts the complete edge: serial bridge, session poller, cash dispatcher and print poller, with receipts going
    /// to the printer behind the virtual acceptor.
    pub async fn start_edge(&mut self) {
        let ms = Duration::from_millis;
        let cloud_url = Url::parse(&format!("http://{}:{}/", self.config.host, self.config.port)).expect("Bad URL");
        let config = EdgeConfig {
            api_key: Some(Secret::new(API_KEY.to_string())),
            serial_port: AcceptorPort::Virtual,
            reconnect_delay: ms(100),
            serial_settle: ms(20),
            retry_delay: ms(50),
            session_poll_interval: ms(100),
            print_poll_interval: ms(100),
            printer: PrinterKind::Bridge,
            print_line_delay: ms(2),
            restart_delay: ms(100),
            ..EdgeConfig::new(cloud_url)
        };
        let handles = EdgeHandles::new(PulseDecoderConfig { quiet_interval: ms(50), ..Default::default() });
        let token = CancellationToken::new();
        let task = tokio::spawn({
            let handles = handles.clone();
            let token = token.clone();
            async move {
                if let Err(e) = run_edge_with(config, handles, token).await {
                    error!("🌍️ Edge failed to start. {e}");
                }
            }
        });
        let acceptor = &handles.acceptor;
        eventually("the edge to open the acceptor link", || async move { acceptor.is_connected() }).await;
        info!("🌍️ Edge started");
        self.edge = Some(EdgeRig { handles, token, task });
    }

    pub async fn stop_edge(&mut self) {
        if let Some(rig) = self.edge.take() {
            rig.token.cancel();
            if let Err(e) = rig.task.await {
                warn!("🌍️ Edge task ended badly. {e}");
            }
            info!("🌍️ Edge stopped");
        }
    }

    pub fn store(&self) -> &SessionStore {
        self.store.as_deref().expect("Server not started")
    }

    pub fn queue(&self) -> &PrintQueue {
        self.queue.as_deref().expect("Server not started")
    }

    pub fn edge(&self) -> &EdgeHandles {
        &self.edge.as_ref().expect("Edge not started").handles
    }

    pub async fn get(&self, path: &str) -> (StatusCode, String) {
        self.request(Method::GET, path, |req| req).await
    }

    pub async fn request<F>(&self, method: Method, path: &str, req: F) -> (StatusCode, String)
    where F: FnOnce(RequestBuilder) -> RequestBuilder {
        let url = format!("http://{}:{}{path}", self.config.host, self.config.port);
        debug!("🌍️ Querying {url}");
        let request = Client::new().request(method, url);
        let mut request = req(request);
        if self.send_api_key {
            request = request.header(API_KEY_HEADER, API_KEY);
        }
        let res = request.send().await.expect("Error getting response");
        let code = res.status();
        let body = res.text().await.expect("Error parsing response body");
        (code, body)
    }
}

/// Polls `check` until it holds. Panics if it does not within a few seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + WAIT_LIMIT;
    while !check().await {
        assert!(Instant::now() < deadline, "🌍️ Timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
