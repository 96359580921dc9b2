use audit_headers_core::{config::SaltConfig, salt::Salt};
use audit_headers_persistence::{Persistence, SALT_KEY};
use snafu::{ResultExt, Snafu};
use tracing::{info, instrument};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Failed to parse the configured salt"))]
    ParseConfiguredSalt {
        source: audit_headers_core::salt::Error,
    },

    #[snafu(display("Failed to read the salt from persistence"))]
    ReadSalt {
        source: audit_headers_persistence::Error,
    },

    #[snafu(display("The persisted salt is corrupt"))]
    CorruptPersistedSalt {
        source: audit_headers_core::salt::Error,
    },

    #[snafu(display("Failed to write the generated salt to persistence"))]
    WriteSalt {
        source: audit_headers_persistence::Error,
    },
}

/// Determines the salt used to hash audited header values, in the following order:
///
/// 1. The salt configured in the config file
/// 2. The salt stored in the persistence
/// 3. A freshly generated salt, which is written to the persistence
///
/// Instances starting at the same time against a shared persistence can all find no salt. Only
/// the first generated salt is persisted and every instance continues with that one.
#[instrument(skip(config, persistence))]
pub async fn load_or_create<P>(config: &SaltConfig, persistence: &P) -> Result<Salt, Error>
where
    P: Persistence,
{
    if let Some(key) = &config.key {
        info!("Using configured salt");
        return Salt::from_base64(key).context(ParseConfiguredSaltSnafu);
    }

    if let Some(persisted) = persistence.get(SALT_KEY).await.context(ReadSaltSnafu)? {
        info!("Using persisted salt");
        return Salt::from_slice(&persisted).context(CorruptPersistedSaltSnafu);
    }

    info!("No salt configured or persisted, generating a new one");
    let generated = Salt::generate();
    let persisted = persistence
        .put_if_absent(SALT_KEY, generated.as_bytes().to_vec())
        .await
        .context(WriteSaltSnafu)?;
    if persisted != generated.as_bytes() {
        info!("Another instance persisted a salt in the meantime, using that one");
    }

    Salt::from_slice(&persisted).context(CorruptPersistedSaltSnafu)
}

#[cfg(test)]
mod tests {
    use audit_headers_core::salt::SALT_LENGTH;
    use audit_headers_persistence::in_memory::InMemoryPersistence;

    use super::*;

    /// Hands control back to the runtime after every read, so that concurrent startups all see
    /// the persistence before any of them wrote to it.
    #[derive(Default)]
    struct YieldingPersistence {
        inner: InMemoryPersistence,
    }

    impl Persistence for YieldingPersistence {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, audit_headers_persistence::Error> {
            let value = self.inner.get(key).await?;
            tokio::task::yield_now().await;
            Ok(value)
        }

        async fn put(
            &self,
            key: &str,
            value: Vec<u8>,
        ) -> Result<(), audit_headers_persistence::Error> {
            self.inner.put(key, value).await
        }

        async fn put_if_absent(
            &self,
            key: &str,
            value: Vec<u8>,
        ) -> Result<Vec<u8>, audit_headers_persistence::Error> {
            self.inner.put_if_absent(key, value).await
        }
    }

    #[tokio::test]
    async fn test_configured_salt_takes_precedence() {
        let configured = Salt::from_bytes([1u8; SALT_LENGTH]);
        let persistence = InMemoryPersistence::default();
        persistence
            .put(SALT_KEY, vec![2u8; SALT_LENGTH])
            .await
            .unwrap();
        let config = SaltConfig {
            key: Some(configured.to_base64()),
        };

        let salt = load_or_create(&config, &persistence).await.unwrap();

        assert_eq!(salt, configured);
    }

    #[tokio::test]
    async fn test_invalid_configured_salt() {
        let config = SaltConfig {
            key: Some("too-short".to_owned()),
        };

        let result = load_or_create(&config, &InMemoryPersistence::default()).await;

        assert!(matches!(result, Err(Error::ParseConfiguredSalt { .. })));
    }

    #[tokio::test]
    async fn test_generated_salt_is_persisted_and_reused() {
        let persistence = InMemoryPersistence::default();

        let generated = load_or_create(&SaltConfig::default(), &persistence)
            .await
            .unwrap();
        assert_eq!(
            persistence.get(SALT_KEY).await.unwrap().as_deref(),
            Some(generated.as_bytes())
        );

        let reloaded = load_or_create(&SaltConfig::default(), &persistence)
            .await
            .unwrap();
        assert_eq!(reloaded, generated);
    }

    #[tokio::test]
    async fn test_corrupt_persisted_salt() {
        let persistence = InMemoryPersistence::default();
        persistence.put(SALT_KEY, b"short".to_vec()).await.unwrap();

        let result = load_or_create(&SaltConfig::default(), &persistence).await;

        assert!(matches!(result, Err(Error::CorruptPersistedSalt { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_startups_agree_on_salt() {
        let persistence = YieldingPersistence::default();
        let config = SaltConfig::default();

        let (first, second) = tokio::join!(
            load_or_create(&config, &persistence),
            load_or_create(&config, &persistence)
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first, second);
        assert_eq!(
            persistence.get(SALT_KEY).await.unwrap().as_deref(),
            Some(first.as_bytes())
        );
        assert_eq!(first.hash("s.secret"), second.hash("s.secret"));
    }
}
