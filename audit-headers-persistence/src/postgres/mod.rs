use audit_headers_core::config::PostgresConfig;
use snafu::{ResultExt, Snafu};
use sqlx::{Pool, Postgres, migrate::MigrateError, postgres::PgPoolOptions};
use tracing::{info, instrument};

use crate::Persistence;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Failed to create Postgres connection pool"))]
    CreatePool { source: sqlx::Error },

    #[snafu(display("Failed to run database migrations"))]
    RunMigrations { source: MigrateError },

    #[snafu(display("Failed to load entry {key:?}"))]
    LoadEntry { source: sqlx::Error, key: String },

    #[snafu(display("Failed to store entry {key:?}"))]
    StoreEntry { source: sqlx::Error, key: String },
}

pub struct PostgresPersistence {
    pool: Pool<Postgres>,
}

impl PostgresPersistence {
    pub async fn new(config: &PostgresConfig) -> Result<Self, Error> {
        info!("Using postgres persistence");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(config.url.as_str())
            .await
            .context(CreatePoolSnafu)?;

        sqlx::migrate!("src/postgres/migrations")
            .run(&pool)
            .await
            .context(RunMigrationsSnafu)?;

        Ok(Self { pool })
    }
}

impl Persistence for PostgresPersistence {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, super::Error> {
        let value = sqlx::query_scalar::<_, Vec<u8>>(
            r#"SELECT value
            FROM key_value_entries
            WHERE key = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context(LoadEntrySnafu { key })?;

        Ok(value)
    }

    #[instrument(skip(self, value))]
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), super::Error> {
        // Upsert, every write replaces the whole value
        sqlx::query(
            r#"INSERT INTO key_value_entries (key, value, last_modified)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, last_modified = EXCLUDED.last_modified"#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context(StoreEntrySnafu { key })?;

        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<Vec<u8>, super::Error> {
        sqlx::query(
            r#"INSERT INTO key_value_entries (key, value, last_modified)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO NOTHING"#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context(StoreEntrySnafu { key })?;

        let stored = sqlx::query_scalar::<_, Vec<u8>>(
            r#"SELECT value
            FROM key_value_entries
            WHERE key = $1"#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .context(LoadEntrySnafu { key })?;

        Ok(stored)
    }
}
