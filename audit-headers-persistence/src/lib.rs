use enum_dispatch::enum_dispatch;
use snafu::Snafu;

pub mod in_memory;
pub mod postgres;
pub mod redis;

/// Key under which the complete audited headers configuration is stored as a single JSON blob.
pub const AUDITED_HEADERS_KEY: &str = "audited-headers-config/audited-headers";

/// Key under which the salt used for hashing audited header values is stored.
pub const SALT_KEY: &str = "audited-headers-config/salt";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Redis persistence error"), context(false))]
    RedisError { source: redis::Error },

    #[snafu(display("Postgres persistence error"), context(false))]
    PostgresError { source: postgres::Error },
}

/// A plain key/value view. Values are always read and written as a whole, there are no partial
/// updates. Implementations must not retry failed operations, this is up to the caller.
#[enum_dispatch(PersistenceImplementation)]
// According to https://blog.rust-lang.org/2023/12/21/async-fn-rpit-in-traits.html
#[trait_variant::make(SendPersistence: Send)]
pub trait Persistence {
    /// Returns [`None`] in case nothing has been stored under `key` yet.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Replaces whatever is stored under `key` with `value`.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), Error>;

    /// Stores `value` only in case nothing is stored under `key` yet. Returns what is stored under
    /// `key` afterwards, so concurrent callers all end up with the value of the first writer.
    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<Vec<u8>, Error>;
}

#[enum_dispatch]
pub enum PersistenceImplementation {
    Redis(redis::SingleRedisPersistence),
    RedisCluster(redis::ClusterRedisPersistence),
    Postgres(postgres::PostgresPersistence),
    InMemory(in_memory::InMemoryPersistence),
}
