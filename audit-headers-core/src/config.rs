use std::{fmt::Debug, fs::File, path::PathBuf, time::Duration};

use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use url::Url;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Failed to read configuration file at {config_file:?}"))]
    ReadConfigFile {
        source: std::io::Error,
        config_file: PathBuf,
    },

    #[snafu(display("Failed to parse configuration file at {config_file:?}"))]
    ParseConfigFile {
        source: serde_yaml::Error,
        config_file: PathBuf,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub ports: PortsConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    pub admin_authentication: Option<AdminAuthenticationConfig>,

    #[serde(default)]
    pub salt: SaltConfig,

    pub tracing: Option<TracingConfig>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortsConfig {
    #[serde(default = "default_http_port")]
    pub http: u16,

    #[serde(default = "default_https_port")]
    pub https: u16,

    #[serde(default = "default_metrics_port")]
    pub metrics: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            http: default_http_port(),
            https: default_https_port(),
            metrics: default_metrics_port(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_https_port() -> u16 {
    8443
}

fn default_metrics_port() -> u16 {
    9090
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    pub cert_pem_file: Option<PathBuf>,
    pub key_pem_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(rename = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<Url>,

    #[serde(rename = "OTEL_EXPORTER_OTLP_PROTOCOL")]
    pub otlp_protocol: Option<opentelemetry_otlp::Protocol>,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdminAuthenticationConfig {
    BasicAuth { username: String, password: String },
}

impl Debug for AdminAuthenticationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminAuthenticationConfig::BasicAuth { username, .. } => f
                .debug_struct("BasicAuth")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Salt used to hash the values of audited headers.
///
/// In case no key is configured, the salt is read from the persistence. In case the persistence
/// does not contain a salt either, a random one is generated and persisted, so that hashes stay
/// stable across restarts and across multiple replicas sharing a persistence.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaltConfig {
    /// Base64 encoded, 32 bytes long
    pub key: Option<String>,
}

impl Debug for SaltConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaltConfig")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PersistenceConfig {
    InMemory {},
    Redis(RedisConfig),
    RedisCluster(RedisConfig),
    Postgres(PostgresConfig),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisConfig {
    pub endpoint: Url,

    #[serde(default = "default_redis_timeout", with = "humantime_serde")]
    pub connection_timeout: Duration,

    #[serde(default = "default_redis_timeout", with = "humantime_serde")]
    pub response_timeout: Duration,
}

fn default_redis_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresConfig {
    pub url: Url,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Config {
    /// Using [`std::fs::File`] over `tokio::fs::File`, as [`serde_yaml::from_reader`] does not support
    /// async yet (?). Should not matter, as we only read the config once during startup.
    pub async fn read_from_file(config_file: &PathBuf) -> Result<Self, Error> {
        let config_file_content =
            File::open(config_file).context(ReadConfigFileSnafu { config_file })?;

        let deserializer = serde_yaml::Deserializer::from_reader(config_file_content);
        serde_yaml::with::singleton_map_recursive::deserialize(deserializer)
            .context(ParseConfigFileSnafu { config_file })
    }

    /// Parses the config the same way [`Self::read_from_file`] does.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml);
        serde_yaml::with::singleton_map_recursive::deserialize(deserializer)
    }
}
