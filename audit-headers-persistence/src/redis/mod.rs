use audit_headers_core::config::RedisConfig;
use redis::{
    AsyncCommands, Client, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig, MultiplexedConnection},
    cluster::{ClusterClientBuilder, ClusterConfig},
    cluster_async::ClusterConnection,
};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{info, instrument};
use url::Url;

use crate::Persistence;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Failed to extract redis host from endpoint {endpoint}"))]
    ExtractRedisHost { endpoint: Url },

    #[snafu(display("Failed to create redis client"))]
    CreateClient { source: RedisError },

    #[snafu(display("Failed to read key {key:?} from redis"))]
    ReadFromRedis { source: RedisError, key: String },

    #[snafu(display("Failed to write key {key:?} to redis"))]
    WriteToRedis { source: RedisError, key: String },

    #[snafu(display("Key {key:?} was deleted from redis right after it was written"))]
    KeyVanished { key: String },
}

/// Works against a single Redis instance as well as against Redis clusters. It uses a single
/// connection that is shared between all operations. As every value is read and written as a
/// whole, no transactions or scripts are needed.
pub struct RedisPersistence<R>
where
    R: AsyncCommands + Clone,
{
    connection: R,
}

pub type SingleRedisPersistence = RedisPersistence<ConnectionManager>;
pub type ClusterRedisPersistence = RedisPersistence<ClusterConnection<MultiplexedConnection>>;

impl SingleRedisPersistence {
    pub async fn new(config: &RedisConfig) -> Result<Self, Error> {
        let redis_host = config.endpoint.host_str().context(ExtractRedisHostSnafu {
            endpoint: config.endpoint.clone(),
        })?;
        info!(redis_host, "Using redis persistence");

        let redis_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.connection_timeout)
            .set_response_timeout(config.response_timeout);

        let client = Client::open(config.endpoint.as_str()).context(CreateClientSnafu)?;
        let connection = client
            .get_connection_manager_with_config(redis_config)
            .await
            .context(CreateClientSnafu)?;

        Ok(Self { connection })
    }
}

impl ClusterRedisPersistence {
    pub async fn new(config: &RedisConfig) -> Result<Self, Error> {
        let redis_host = config.endpoint.host_str().context(ExtractRedisHostSnafu {
            endpoint: config.endpoint.clone(),
        })?;
        info!(redis_host, "Using redis cluster persistence");

        let redis_config = ClusterConfig::new()
            .set_connection_timeout(config.connection_timeout)
            .set_response_timeout(config.response_timeout);

        let client = ClusterClientBuilder::new([config.endpoint.as_str()])
            .build()
            .context(CreateClientSnafu)?;
        let connection = client
            .get_async_connection_with_config(redis_config)
            .await
            .context(CreateClientSnafu)?;

        Ok(Self { connection })
    }
}

impl<R> Persistence for RedisPersistence<R>
where
    R: AsyncCommands + Clone,
{
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, super::Error> {
        let value: Option<Vec<u8>> = self
            .connection()
            .get(key)
            .await
            .context(ReadFromRedisSnafu { key })?;

        Ok(value)
    }

    #[instrument(skip(self, value))]
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), super::Error> {
        let _: () = self
            .connection()
            .set(key, value)
            .await
            .context(WriteToRedisSnafu { key })?;

        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<Vec<u8>, super::Error> {
        let mut connection = self.connection();
        let _: bool = connection
            .set_nx(key, value)
            .await
            .context(WriteToRedisSnafu { key })?;
        let stored: Option<Vec<u8>> = connection
            .get(key)
            .await
            .context(ReadFromRedisSnafu { key })?;

        Ok(stored.context(KeyVanishedSnafu { key })?)
    }
}

impl<R> RedisPersistence<R>
where
    R: AsyncCommands + Clone,
{
    fn connection(&self) -> R {
        self.connection.clone()
    }
}
