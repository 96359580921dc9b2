use std::{
    fmt::Debug,
    net::{Ipv6Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use audit_headers_core::{config::Config, salt::Salt};
use axum::{
    Router, middleware,
    response::Redirect,
    routing::{get, post},
};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use futures::FutureExt;
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::time::sleep;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{header_policy_store::AuditedHeadersStore, metrics::Metrics};

mod audit;
mod metrics;
mod sys;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display(
        "Failed configure HTTP server PEM cert at {cert_pem_file:?} and PEM key at {key_pem_file:?}"
    ))]
    ConfigureServerTrustAndKeystore {
        source: std::io::Error,
        cert_pem_file: PathBuf,
        key_pem_file: PathBuf,
    },

    #[snafu(display("Failed start HTTP server"))]
    StartHttpServer { source: std::io::Error },

    #[snafu(display(
        "In case https is used the `tls.certPemFile` and `tls.keyPemFile` options must be set"
    ))]
    CertsMissing,
}

pub struct AppState {
    config: Config,
    store: Arc<AuditedHeadersStore>,
    salt: Salt,
    metrics: Arc<Metrics>,
}

pub async fn start_http_server(
    config: Config,
    store: Arc<AuditedHeadersStore>,
    salt: Salt,
    metrics: Arc<Metrics>,
) -> Result<(), Error> {
    let tls_config = config.tls.clone();
    let ports_config = config.ports.clone();
    let app_state = Arc::new(AppState {
        config,
        store,
        salt,
        metrics,
    });

    // Start Prometheus metrics exporter
    let metrics_app = Router::new()
        .route("/", get(|| async { Redirect::permanent("/metrics") }))
        .route("/metrics", get(metrics::get))
        .with_state(Arc::clone(&app_state));
    let listen_addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, ports_config.metrics));
    info!(%listen_addr, "Starting metrics exporter");

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    // The metrics exporter runs on its own task, only a failing main server stops the process.
    let handle_clone = handle.clone();
    tokio::spawn(async move {
        axum_server::bind(listen_addr)
            .handle(handle_clone)
            .serve(metrics_app.into_make_service())
            .await
    });

    let app = app(app_state);

    if tls_config.enabled {
        // Start https server
        let listen_addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, ports_config.https));
        info!(%listen_addr, "Starting server");

        let cert_pem_file = tls_config.cert_pem_file.context(CertsMissingSnafu)?;
        let key_pem_file = tls_config.key_pem_file.context(CertsMissingSnafu)?;
        let tls_config = RustlsConfig::from_pem_file(&cert_pem_file, &key_pem_file)
            .await
            .context(ConfigureServerTrustAndKeystoreSnafu {
                cert_pem_file,
                key_pem_file,
            })?;

        axum_server::bind_rustls(listen_addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context(StartHttpServerSnafu)?;
    } else {
        // Start http server
        let listen_addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, ports_config.http));
        info!(%listen_addr, "Starting server");

        axum_server::bind(listen_addr)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context(StartHttpServerSnafu)?;
    }

    info!("Shut down");

    Ok(())
}

/// The management API. Every request passing through it is audited.
fn app(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/v1/sys/config/auditing/request-headers",
            get(sys::request_headers::get_audited_headers),
        )
        .route(
            "/v1/sys/config/auditing/request-headers/{header}",
            get(sys::request_headers::get_audited_header)
                .put(sys::request_headers::put_audited_header)
                .post(sys::request_headers::put_audited_header)
                .delete(sys::request_headers::delete_audited_header),
        )
        .route("/v1/sys/audit-hash", post(sys::audit_hash::post_audit_hash))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&app_state),
            audit::audit_request,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn graceful_shutdown(handle: Handle) {
    wait_for_shutdown_signal().await;

    info!("Shutting down gracefully");

    // Signal the server to shutdown using Handle.
    handle.graceful_shutdown(Some(Duration::from_secs(5)));
    loop {
        info!(
            connections = handle.connection_count(),
            "Waiting for all connections to close"
        );
        sleep(Duration::from_secs(1)).await;
    }
}

async fn wait_for_shutdown_signal() {
    futures::future::select(
        tokio::signal::ctrl_c().map(|_| ()).boxed(),
        wait_for_terminate_signal().boxed(),
    )
    .await;
}

#[cfg(unix)]
async fn wait_for_terminate_signal() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(error) => {
            warn!(%error, "Failed to listen for SIGTERM, only ctrl-c will shut down the server");
            futures::future::pending::<()>().await;
        }
    }
}

/// Assume that ctrl_c is enough on non-Unix platforms (such as Windows)
#[cfg(not(unix))]
async fn wait_for_terminate_signal() {
    futures::future::pending::<()>().await;
}
