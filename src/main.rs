use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use hybridserver::cli::Cli;
use hybridserver::config::GlobalConfig;
use hybridserver::resource::ResourceKind;
use hybridserver::rpc::PeerClient;
use hybridserver::servers::ServerHandle;
use hybridserver::logging;
use hybridserver::store::{MemoryStore, P2pStore, SqlStore, WebResourceStore};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;
use tracing::{error, info};

/// How long `main` waits for the server to reach `Ready` before giving up
/// and exiting 1 (spec §6: "CLI exit codes").
const START_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match GlobalConfig::load(cli.config()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = logging::init(&config) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    let local_stores = match build_local_stores(&config).await {
        Ok(stores) => stores,
        Err(err) => {
            error!(%err, "failed to initialize storage backends");
            std::process::exit(1);
        }
    };

    let peer_clients: Vec<PeerClient> = config
        .peers
        .iter()
        .map(|peer| {
            PeerClient::new(
                peer.name.clone(),
                peer.rpc_endpoint.clone(),
                &peer.rpc_namespace,
                peer.http_base.clone(),
            )
        })
        .collect();

    // Shared with `ServerHandle` below: accepted connections and peer
    // fan-out calls draw from the same bounded worker pool.
    let semaphore = Arc::new(Semaphore::new(config.num_clients));

    let stores: HashMap<ResourceKind, Arc<dyn WebResourceStore>> = ResourceKind::ALL
        .into_iter()
        .map(|kind| {
            let local = local_stores
                .get(&kind)
                .expect("every resource kind has a local store")
                .clone();
            let decorated: Arc<dyn WebResourceStore> =
                Arc::new(P2pStore::new(local, peer_clients.clone(), semaphore.clone()));
            (kind, decorated)
        })
        .collect();

    let start = ServerHandle::start(config, stores, local_stores, peer_clients, semaphore);
    let handle = match tokio::time::timeout(START_TIMEOUT, start).await {
        Ok(Ok(handle)) => handle,
        Ok(Err(err)) => {
            error!(%err, "server failed to start");
            std::process::exit(1);
        }
        Err(_) => {
            error!("server did not reach the ready state within the start timeout");
            std::process::exit(1);
        }
    };

    info!("ready, send a newline on stdin to stop");
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    let _ = stdin.read_line(&mut line).await;

    handle.stop().await;
    std::process::exit(0);
}

/// Builds the per-kind local (undecorated) storage backend: relational if
/// `db_url` is configured, in-memory otherwise (spec §4.2/§6).
async fn build_local_stores(
    config: &GlobalConfig,
) -> Result<HashMap<ResourceKind, Arc<dyn WebResourceStore>>, hybridserver::error::HybridServerError>
{
    let mut stores: HashMap<ResourceKind, Arc<dyn WebResourceStore>> = HashMap::new();

    if let Some(db_url) = &config.db_url {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(config.num_clients as u32)
            .connect(db_url)
            .await?;
        for kind in ResourceKind::ALL {
            let backend = SqlStore::new(pool.clone(), kind);
            backend.ensure_table().await?;
            stores.insert(kind, Arc::new(backend));
        }
    } else {
        for kind in ResourceKind::ALL {
            stores.insert(kind, Arc::new(MemoryStore::new(kind)) as Arc<dyn WebResourceStore>);
        }
    }

    Ok(stores)
}
