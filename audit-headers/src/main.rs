use std::sync::Arc;

use audit_headers_core::config::{self, Config, PersistenceConfig};
use audit_headers_persistence::{
    PersistenceImplementation,
    in_memory::InMemoryPersistence,
    postgres::{self, PostgresPersistence},
    redis::{self, ClusterRedisPersistence, SingleRedisPersistence},
};
use clap::Parser;
use header_policy_store::HeaderPolicyStore;
use main_error::MainError;
use metrics::Metrics;
use opentelemetry::global::shutdown_tracer_provider;
use snafu::{ResultExt, Snafu};

use crate::{args::Args, http_server::start_http_server};

mod args;
mod error_formatting;
mod header_policy_store;
mod http_server;
mod metrics;
mod salt;
mod tracing;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("{ENV_WORKER_THREADS:?} must be a positive number, got {value:?}"))]
    ParseWorkerThreads { value: String },

    #[snafu(display("Failed to build tokio runtime"))]
    BuildTokioRuntime { source: std::io::Error },

    #[snafu(display("Failed to set up tracing"))]
    SetUpTracing { source: tracing::Error },

    #[snafu(display("Failed to read configuration"))]
    ReadConfig { source: config::Error },

    #[snafu(display("Failed to install the rustls crypto provider"))]
    InstallCryptoProvider,

    #[snafu(display("Failed to create redis persistence client"))]
    CreateRedisPersistenceClient { source: redis::Error },

    #[snafu(display("Failed to create postgres persistence client"))]
    CreatePostgresPersistenceClient { source: postgres::Error },

    #[snafu(display("Failed to load the salt"))]
    LoadSalt { source: salt::Error },

    #[snafu(display("Failed to load the audited headers configuration"))]
    LoadHeaderPolicies {
        source: header_policy_store::Error,
    },

    #[snafu(display("Failed to set up metrics"))]
    SetUpMetrics { source: metrics::Error },

    #[snafu(display("Failed to start HTTP server"))]
    StartHttpServer { source: http_server::Error },
}

const ENV_WORKER_THREADS: &str = "TOKIO_WORKER_THREADS";

/// We can not use the `#[tokio::main]` macro, as we need at least 3 worker threads because of some magic happening
/// in metric collection that are related to <https://github.com/open-telemetry/opentelemetry-rust/issues/1376#issuecomment-1816813128>
fn main() -> Result<(), MainError> {
    let worker_threads = match std::env::var(ENV_WORKER_THREADS) {
        Ok(value) => value
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ParseWorkerThreadsSnafu { value: &value }.build())?,
        Err(std::env::VarError::NotPresent) => usize::max(3, num_cpus::get()),
        Err(std::env::VarError::NotUnicode(value)) => {
            return Err(ParseWorkerThreadsSnafu {
                value: value.to_string_lossy(),
            }
            .build()
            .into());
        }
    };

    // We can not emit tracing messages here, as tracing is not set up yet.

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(worker_threads)
        .build()
        .context(BuildTokioRuntimeSnafu)?
        .block_on(start())
}

async fn start() -> Result<(), MainError> {
    let args = Args::parse();

    let config = Config::read_from_file(&args.config_file)
        .await
        .context(ReadConfigSnafu)?;

    let registry = tracing::init(config.tracing.as_ref()).context(SetUpTracingSnafu)?;

    // axum-server is built without a default crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| InstallCryptoProviderSnafu.build())?;

    let persistence: Arc<PersistenceImplementation> = Arc::new(match &config.persistence {
        PersistenceConfig::InMemory {} => InMemoryPersistence::default().into(),
        PersistenceConfig::Redis(redis_config) => SingleRedisPersistence::new(redis_config)
            .await
            .context(CreateRedisPersistenceClientSnafu)?
            .into(),
        PersistenceConfig::RedisCluster(redis_config) => {
            ClusterRedisPersistence::new(redis_config)
                .await
                .context(CreateRedisPersistenceClientSnafu)?
                .into()
        }
        PersistenceConfig::Postgres(postgres_config) => {
            PostgresPersistence::new(postgres_config)
                .await
                .context(CreatePostgresPersistenceClientSnafu)?
                .into()
        }
    });

    let salt = salt::load_or_create(&config.salt, persistence.as_ref())
        .await
        .context(LoadSaltSnafu)?;

    let store = Arc::new(
        HeaderPolicyStore::load(persistence)
            .await
            .context(LoadHeaderPoliciesSnafu)?,
    );

    let metrics =
        Arc::new(Metrics::new(registry, Arc::clone(&store)).context(SetUpMetricsSnafu)?);

    start_http_server(config, store, salt, metrics)
        .await
        .context(StartHttpServerSnafu)?;

    shutdown_tracer_provider();

    Ok(())
}
