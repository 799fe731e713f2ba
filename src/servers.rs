//! The server core (spec §4.6): acceptor loop, bounded worker pool,
//! lifecycle state machine, and the optional peer RPC endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::GlobalConfig;
use crate::error::HybridServerError;
use crate::handlers::{self, HandlerCtx};
use crate::http::{self, HttpResponse, PrintMode};
use crate::resource::ResourceKind;
use crate::rpc::{self, RpcRequest};
use crate::store::WebResourceStore;

/// The three externally visible lifecycle states (spec §4.6), behind a
/// `Notify` so `start()` can block until one of them is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Ready,
    PortInUse,
    Stopped,
}

pub struct Lifecycle {
    state: RwLock<LifecycleState>,
    notify: Notify,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::NotStarted),
            notify: Notify::new(),
        }
    }

    fn set(&self, state: LifecycleState) {
        *self.state.write().expect("lifecycle lock poisoned") = state;
        self.notify.notify_waiters();
    }

    pub fn get(&self) -> LifecycleState {
        *self.state.read().expect("lifecycle lock poisoned")
    }

    /// Blocks until the state leaves `NotStarted`.
    async fn wait_for_start(&self) -> LifecycleState {
        loop {
            let current = self.get();
            if current != LifecycleState::NotStarted {
                return current;
            }
            self.notify.notified().await;
        }
    }
}

/// RAII guard over one accepted connection: releases its worker-pool permit
/// and closes the socket on every exit path, including a panic unwind.
struct ConnGuard {
    stream: TcpStream,
    peer_addr: SocketAddr,
    _permit: OwnedSemaphorePermit,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        trace!(peer = %self.peer_addr, "connection closed, permit released");
    }
}

/// A running (or stopped) server instance.
pub struct ServerHandle {
    pub lifecycle: Arc<Lifecycle>,
    local_addr: Arc<std::sync::Mutex<Option<SocketAddr>>>,
    rpc_local_addr: Arc<std::sync::Mutex<Option<SocketAddr>>>,
    acceptor: Option<JoinHandle<()>>,
    rpc_acceptor: Option<JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
    stop_wait: Duration,
    stores: HashMap<ResourceKind, Arc<dyn WebResourceStore>>,
    local_stores: HashMap<ResourceKind, Arc<dyn WebResourceStore>>,
}

impl ServerHandle {
    /// Starts the acceptor (and, if `config.web_service_url` is set, the
    /// peer RPC endpoint) and blocks until the lifecycle reaches `Ready`
    /// or `PortInUse`. `semaphore` is the single worker-pool permit source
    /// for this server: the caller builds it up front (from
    /// `config.num_clients`) and shares it with the [`crate::store::P2pStore`]
    /// instances wrapping `stores`, so accepted connections and peer
    /// fan-out calls draw from the same bounded pool (spec §4.3/§5).
    #[instrument(level = "info", skip_all)]
    pub async fn start(
        config: GlobalConfig,
        stores: HashMap<ResourceKind, Arc<dyn WebResourceStore>>,
        local_stores: HashMap<ResourceKind, Arc<dyn WebResourceStore>>,
        peer_clients: Vec<rpc::PeerClient>,
        semaphore: Arc<Semaphore>,
    ) -> Result<Self, HybridServerError> {
        let lifecycle = Arc::new(Lifecycle::new());
        let stop_flag = Arc::new(AtomicBool::new(false));

        let http_base = url::Url::parse(&format!("http://127.0.0.1:{}/", config.port))
            .expect("a constructed localhost url is always valid");

        let ctx = Arc::new(HandlerCtx {
            stores: stores.clone(),
            local_stores: local_stores.clone(),
            peer_clients,
            peers: config.peers.clone(),
            http_base,
            fallback_status: http::StatusCode::BAD_REQUEST,
        });

        let local_addr = Arc::new(std::sync::Mutex::new(None));
        let bind_addr = config.bind_address();
        let acceptor = spawn_acceptor(
            bind_addr,
            Arc::clone(&lifecycle),
            Arc::clone(&local_addr),
            Arc::clone(&stop_flag),
            Arc::clone(&semaphore),
            Arc::clone(&ctx),
        );

        let rpc_local_addr = Arc::new(std::sync::Mutex::new(None));
        let rpc_acceptor = if let Some(rpc_url) = &config.web_service_url {
            let authority = rpc_url
                .host_str()
                .map(|host| format!("{host}:{}", rpc_url.port_or_known_default().unwrap_or(80)))
                .ok_or_else(|| {
                    HybridServerError::Startup("web_service_url has no host".to_string())
                })?;
            Some(spawn_rpc_acceptor(
                authority,
                Arc::clone(&rpc_local_addr),
                Arc::clone(&stop_flag),
                Arc::clone(&semaphore),
                local_stores.clone(),
            ))
        } else {
            None
        };

        let result = lifecycle.wait_for_start().await;
        if result == LifecycleState::PortInUse {
            return Err(HybridServerError::Startup(format!(
                "port {} is already in use",
                config.port
            )));
        }

        Ok(Self {
            lifecycle,
            local_addr,
            rpc_local_addr,
            acceptor: Some(acceptor),
            rpc_acceptor,
            stop_flag,
            stop_wait: Duration::from_secs(config.stop_wait_seconds),
            stores,
            local_stores,
        })
    }

    /// The address the acceptor actually bound to — useful when `config.port`
    /// was `0` and the OS picked an ephemeral port (as integration tests do).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("local_addr lock poisoned")
    }

    /// The address the peer RPC endpoint bound to, once `web_service_url` is
    /// configured and the acceptor has bound. `None` until then, or when
    /// federation isn't configured at all.
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        *self.rpc_local_addr.lock().expect("rpc_local_addr lock poisoned")
    }

    /// Signals the acceptor(s) to stop taking new connections, gives
    /// outstanding workers up to `stop_wait_seconds` to drain, then closes
    /// every backend (spec §4.6).
    #[instrument(level = "info", skip_all)]
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);

        if let Some(acceptor) = self.acceptor.take() {
            if timeout(self.stop_wait, acceptor).await.is_err() {
                error!("acceptor did not stop within the grace period");
            }
        }
        if let Some(rpc_acceptor) = self.rpc_acceptor.take() {
            if timeout(self.stop_wait, rpc_acceptor).await.is_err() {
                error!("rpc acceptor did not stop within the grace period");
            }
        }

        for store in self.stores.values() {
            if let Err(err) = store.close().await {
                warn!(%err, "failed to close a store cleanly during shutdown");
            }
        }
        for store in self.local_stores.values() {
            if let Err(err) = store.close().await {
                warn!(%err, "failed to close a local store cleanly during shutdown");
            }
        }

        self.lifecycle.set(LifecycleState::Stopped);
        info!("server stopped");
    }
}

fn spawn_acceptor(
    bind_addr: String,
    lifecycle: Arc<Lifecycle>,
    local_addr: Arc<std::sync::Mutex<Option<SocketAddr>>>,
    stop_flag: Arc<AtomicBool>,
    semaphore: Arc<Semaphore>,
    ctx: Arc<HandlerCtx>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => {
                if let Ok(addr) = listener.local_addr() {
                    *local_addr.lock().expect("local_addr lock poisoned") = Some(addr);
                }
                info!(%bind_addr, "acceptor bound");
                lifecycle.set(LifecycleState::Ready);
                listener
            }
            Err(err) => {
                error!(%err, %bind_addr, "failed to bind acceptor, port in use");
                lifecycle.set(LifecycleState::PortInUse);
                return;
            }
        };

        accept_loop(listener, stop_flag, semaphore, ctx).await;
    })
}

async fn accept_loop(
    listener: TcpListener,
    stop_flag: Arc<AtomicBool>,
    semaphore: Arc<Semaphore>,
    ctx: Arc<HandlerCtx>,
) {
    loop {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        let (stream, peer_addr) = match timeout(Duration::from_millis(250), listener.accept()).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                error!(%err, "accept failed");
                continue;
            }
            Err(_) => continue,
        };

        let permit = match Arc::clone(&semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(%peer_addr, "worker pool saturated, serving synchronously");
                let ctx = Arc::clone(&ctx);
                handle_connection_without_permit(stream, peer_addr, ctx).await;
                continue;
            }
        };

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let guard = ConnGuard {
                stream,
                peer_addr,
                _permit: permit,
            };
            handle_connection(guard, ctx).await;
        });
    }
}

#[instrument(level = "debug", skip_all, fields(peer = %guard.peer_addr))]
async fn handle_connection(mut guard: ConnGuard, ctx: Arc<HandlerCtx>) {
    let (reader, mut writer) = guard.stream.split();
    let mut reader = BufReader::new(reader);

    let response = match http::parse(&mut reader).await {
        Ok(request) => {
            debug!(method = %request.method, resource = %request.resource_chain, "dispatching request");
            handlers::dispatch(&ctx, &request).await
        }
        Err(parse_error) => {
            debug!(%parse_error, "request failed to parse");
            handlers::status_response(handlers::error_status(&parse_error.into()))
        }
    };

    if let Err(err) = response.write(&mut writer, PrintMode::Standard).await {
        warn!(%err, "failed to write response");
    }
    if let Err(err) = writer.shutdown().await {
        warn!(%err, "failed to shut down connection cleanly");
    }
}

/// The fallback path when the worker pool has no free permit: runs the
/// request/response cycle inline on the acceptor task rather than failing
/// the connection outright (spec §4.3's "fallback when the pool is
/// saturated", applied to ordinary client connections as well).
async fn handle_connection_without_permit(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: Arc<HandlerCtx>,
) {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);

    let response = match http::parse(&mut reader).await {
        Ok(request) => handlers::dispatch(&ctx, &request).await,
        Err(parse_error) => handlers::status_response(handlers::error_status(&parse_error.into())),
    };

    if let Err(err) = response.write(&mut writer, PrintMode::Standard).await {
        warn!(%err, %peer_addr, "failed to write response on saturated path");
    }
    let _ = writer.shutdown().await;
}

fn spawn_rpc_acceptor(
    bind_addr: String,
    rpc_local_addr: Arc<std::sync::Mutex<Option<SocketAddr>>>,
    stop_flag: Arc<AtomicBool>,
    semaphore: Arc<Semaphore>,
    local_stores: HashMap<ResourceKind, Arc<dyn WebResourceStore>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => {
                if let Ok(addr) = listener.local_addr() {
                    *rpc_local_addr.lock().expect("rpc_local_addr lock poisoned") = Some(addr);
                }
                info!(%bind_addr, "peer rpc endpoint bound");
                listener
            }
            Err(err) => {
                error!(%err, %bind_addr, "failed to bind peer rpc endpoint");
                return;
            }
        };

        let local_stores = Arc::new(local_stores);
        loop {
            if stop_flag.load(Ordering::SeqCst) {
                break;
            }
            let (stream, peer_addr) = match timeout(Duration::from_millis(250), listener.accept()).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(err)) => {
                    error!(%err, "rpc accept failed");
                    continue;
                }
                Err(_) => continue,
            };

            let permit = Arc::clone(&semaphore).try_acquire_owned().ok();
            let local_stores = Arc::clone(&local_stores);
            tokio::spawn(async move {
                let _permit = permit;
                handle_rpc_connection(stream, peer_addr, local_stores).await;
            });
        }
    })
}

#[instrument(level = "debug", skip_all, fields(peer = %peer_addr))]
async fn handle_rpc_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    local_stores: Arc<HashMap<ResourceKind, Arc<dyn WebResourceStore>>>,
) {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);

    let request = match http::parse(&mut reader).await {
        Ok(request) => request,
        Err(err) => {
            debug!(%err, "rpc request failed to parse");
            let _ = writer.shutdown().await;
            return;
        }
    };

    let rpc_request: Option<RpcRequest> = request
        .text_body
        .as_deref()
        .and_then(|body| serde_json::from_str(body).ok());

    let response = match rpc_request {
        Some(rpc_request) => {
            rpc::handle_request(
                |kind| {
                    local_stores
                        .get(&kind)
                        .cloned()
                        .expect("every resource kind has a configured local store")
                },
                rpc_request,
            )
            .await
        }
        None => rpc::RpcResponse::err("malformed rpc request body"),
    };

    let body = serde_json::to_string(&response).unwrap_or_else(|_| "{\"ok\":false}".to_string());
    let http_response = HttpResponse::new(http::StatusCode::OK).with_body("application/json", body);
    if let Err(err) = http_response.write(&mut writer, PrintMode::Standard).await {
        warn!(%err, "failed to write rpc response");
    }
    let _ = writer.shutdown().await;
}
