mod config;
mod engine;
mod handlers;
mod health;
mod metrics;
mod model;
mod tls;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use clap::Parser;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpBuilder;
use hyper_util::service::TowerToHyperService;
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "k8s-toleration-injector",
    about = "Mutating admission webhook that adds a per-namespace toleration to pods"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(
        long,
        default_value = "/etc/toleration-injector/config.yaml",
        env = "INJECTOR_CONFIG"
    )]
    config: String,
}

async fn shutdown_signal(shutdown_tx: watch::Sender<()>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to install SIGTERM handler, waiting for CTRL+C only: {e}");
                    let _ = ctrl_c.await;
                    info!("received CTRL+C, starting graceful shutdown");
                    let _ = shutdown_tx.send(());
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("received CTRL+C, starting graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, starting graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            error!("failed to listen for ctrl_c: {e}");
            return;
        }
        info!("received CTRL+C, starting graceful shutdown");
    }

    let _ = shutdown_tx.send(());
}

async fn run_https_server(
    listener: TcpListener,
    tls_acceptor: TlsAcceptor,
    router: Router,
    ready: Arc<AtomicBool>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    ready.store(true, Ordering::Relaxed);

    loop {
        let (tcp_stream, remote_addr) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("failed to accept TCP connection: {e}");
                        continue;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("webhook server shutting down");
                break;
            }
        };

        let tls_acceptor = tls_acceptor.clone();
        let router = router.clone();

        tokio::spawn(async move {
            let tls_stream = match tls_acceptor.accept(tcp_stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(%remote_addr, "TLS handshake failed: {e}");
                    return;
                }
            };

            let io = TokioIo::new(tls_stream);
            let service = TowerToHyperService::new(router.into_service());

            if let Err(e) = HttpBuilder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                error!(%remote_addr, "error serving connection: {e}");
            }
        });
    }
}

async fn run_http_server(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<()>,
) {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            info!("health server shutting down");
        })
        .await
        .unwrap_or_else(|e| error!("health server error: {e}"));
}

fn exit_with(message: String) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        exit_with("failed to install default CryptoProvider".to_string());
    }

    let cli = Cli::parse();

    let config = config::InjectorConfig::load(&cli.config)
        .unwrap_or_else(|e| exit_with(format!("Failed to load config from {}: {e}", cli.config)));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        listen_addr = %config.listen_addr,
        metrics_addr = %config.metrics_addr,
        webhook_path = %config.webhook_path,
        toleration_key = %config.toleration_key,
        "k8s-toleration-injector starting"
    );

    let tls_config = tls::load_tls_config(&config.tls_cert_path, &config.tls_key_path)
        .unwrap_or_else(|e| exit_with(format!("Failed to load TLS config: {e}")));
    let tls_acceptor = TlsAcceptor::from(tls_config);

    let listen_addr: SocketAddr = config.listen_addr.parse().unwrap_or_else(|e| {
        exit_with(format!("Invalid listen_addr '{}': {e}", config.listen_addr))
    });
    let metrics_addr: SocketAddr = config.metrics_addr.parse().unwrap_or_else(|e| {
        exit_with(format!("Invalid metrics_addr '{}': {e}", config.metrics_addr))
    });

    let mut registry = Registry::default();
    let injector_metrics = metrics::InjectorMetrics::new(&mut registry);
    let registry = Arc::new(registry);

    let app_state = Arc::new(handlers::AppState {
        injector: engine::TolerationInjector::new(config.toleration_key.clone()),
        metrics: injector_metrics,
    });
    let webhook_router = handlers::webhook_router(&config.webhook_path, app_state);

    let ready = Arc::new(AtomicBool::new(false));
    let health_router = health::health_router(Arc::new(health::HealthState {
        registry,
        ready: ready.clone(),
    }));

    let https_listener = TcpListener::bind(listen_addr)
        .await
        .unwrap_or_else(|e| exit_with(format!("failed to bind HTTPS on {listen_addr}: {e}")));
    info!(%listen_addr, "HTTPS webhook server listening");

    let http_listener = TcpListener::bind(metrics_addr)
        .await
        .unwrap_or_else(|e| exit_with(format!("failed to bind HTTP on {metrics_addr}: {e}")));
    info!(%metrics_addr, "HTTP metrics/health server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(shutdown_signal(shutdown_tx));

    tokio::join!(
        run_https_server(
            https_listener,
            tls_acceptor,
            webhook_router,
            ready,
            shutdown_rx.clone(),
        ),
        run_http_server(http_listener, health_router, shutdown_rx),
    );

    info!("k8s-toleration-injector shut down gracefully");
}
