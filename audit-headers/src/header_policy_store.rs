use std::sync::Arc;

use arc_swap::ArcSwap;
use audit_headers_core::header_policy::{
    self, HeaderPolicy, HeaderPolicySet, validate_header_name,
};
use audit_headers_persistence::{AUDITED_HEADERS_KEY, Persistence, PersistenceImplementation};
use snafu::{ResultExt, Snafu};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

pub type AuditedHeadersStore = HeaderPolicyStore<PersistenceImplementation>;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Invalid name for an audited header"))]
    InvalidHeaderName { source: header_policy::Error },

    #[snafu(display("Failed to read the audited headers configuration from persistence"))]
    ReadHeaderPolicies {
        source: audit_headers_persistence::Error,
    },

    #[snafu(display(
        "The persisted audited headers configuration is corrupt. Refusing to continue with an empty configuration, as this would stop hashing sensitive headers"
    ))]
    CorruptHeaderPolicies { source: header_policy::Error },

    #[snafu(display("Failed to serialize the audited headers configuration"))]
    SerializeHeaderPolicies { source: header_policy::Error },

    #[snafu(display("Failed to write the audited headers configuration to persistence"))]
    WriteHeaderPolicies {
        source: audit_headers_persistence::Error,
    },
}

/// Owns the audited headers configuration and keeps it in sync with the persistence.
///
/// Every mutation re-reads the persisted configuration, applies the change and rewrites the
/// complete configuration, so changes made by other instances sharing the persistence are kept.
/// Mutations are serialized by `mutation_lock` and become visible to [`Self::snapshot`] only after
/// they have been persisted, so a failed write leaves the in-memory configuration untouched.
/// Readers never wait for the persistence.
///
/// Between the read and the write of a mutation there is no lock across instances. Concurrent
/// mutations through different instances can therefore still overwrite each other.
///
/// Errors are never retried, this is up to the caller.
pub struct HeaderPolicyStore<P> {
    persistence: Arc<P>,
    mutation_lock: Mutex<()>,
    policies: ArcSwap<HeaderPolicySet>,
}

impl<P> HeaderPolicyStore<P>
where
    P: Persistence,
{
    /// Reads the configuration from the persistence. Nothing being persisted yet results in an
    /// empty configuration.
    #[instrument(skip(persistence))]
    pub async fn load(persistence: Arc<P>) -> Result<Self, Error> {
        let policies = read_persisted(persistence.as_ref()).await?;
        info!(
            audited_headers = policies.len(),
            "Loaded audited headers configuration"
        );

        Ok(Self {
            persistence,
            mutation_lock: Mutex::new(()),
            policies: ArcSwap::from_pointee(policies),
        })
    }

    /// Returns the current configuration. Later mutations of the store do not change the returned
    /// value.
    pub fn snapshot(&self) -> Arc<HeaderPolicySet> {
        self.policies.load_full()
    }

    /// Starts auditing the header `name` or changes its policy in case it is already audited.
    #[instrument(skip(self))]
    pub async fn add(&self, name: &str, hmac: bool) -> Result<(), Error> {
        validate_header_name(name).context(InvalidHeaderNameSnafu)?;

        let _mutation_guard = self.mutation_lock.lock().await;
        let mut policies = read_persisted(self.persistence.as_ref()).await?;
        policies.insert(name, HeaderPolicy { hmac });
        self.persist(policies).await?;

        info!(header = name, hmac, "Added audited header");
        Ok(())
    }

    /// Stops auditing the header `name`. Removing a header that is not audited is not an error.
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> Result<(), Error> {
        let _mutation_guard = self.mutation_lock.lock().await;
        let mut policies = read_persisted(self.persistence.as_ref()).await?;
        if policies.remove(name).is_none() {
            debug!(header = name, "Header is not audited, nothing to remove");
            self.policies.store(Arc::new(policies));
            return Ok(());
        }
        self.persist(policies).await?;

        info!(header = name, "Removed audited header");
        Ok(())
    }

    /// Callers must hold `mutation_lock`.
    async fn persist(&self, policies: HeaderPolicySet) -> Result<(), Error> {
        let serialized = policies.to_json().context(SerializeHeaderPoliciesSnafu)?;
        self.persistence
            .put(AUDITED_HEADERS_KEY, serialized)
            .await
            .context(WriteHeaderPoliciesSnafu)?;
        self.policies.store(Arc::new(policies));

        Ok(())
    }
}

async fn read_persisted<P>(persistence: &P) -> Result<HeaderPolicySet, Error>
where
    P: Persistence,
{
    match persistence
        .get(AUDITED_HEADERS_KEY)
        .await
        .context(ReadHeaderPoliciesSnafu)?
    {
        Some(persisted) => {
            HeaderPolicySet::from_json(&persisted).context(CorruptHeaderPoliciesSnafu)
        }
        None => {
            debug!("No audited headers configuration persisted yet");
            Ok(HeaderPolicySet::new())
        }
    }
}
