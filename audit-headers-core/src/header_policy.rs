use std::collections::{BTreeMap, btree_map};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Header name must not be empty"))]
    EmptyHeaderName,

    #[snafu(display("Invalid header name {name:?}"))]
    InvalidHeaderName {
        source: http::header::InvalidHeaderName,
        name: String,
    },

    #[snafu(display(
        "Header {name:?} is configured multiple times, header names are case-insensitive"
    ))]
    DuplicateHeaderName { name: String },

    #[snafu(display("Failed to serialize header policies to JSON"))]
    SerializeHeaderPolicies { source: serde_json::Error },

    #[snafu(display("Failed to deserialize header policies from JSON"))]
    DeserializeHeaderPolicies { source: serde_json::Error },
}

/// Decides what happens to the values of a single audited header.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct HeaderPolicy {
    /// Replace every value with its keyed hash before it reaches the audit log.
    pub hmac: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct ConfiguredHeader {
    name: String,
    policy: HeaderPolicy,
}

/// All audited headers together with their [`HeaderPolicy`].
///
/// Header names keep the casing they were configured with, but every lookup ignores casing, as
/// clients can send headers in any casing they like. Configuring a header again with a different
/// casing replaces the previous entry (including the stored casing).
///
/// The JSON representation is a plain object, e.g. `{"X-Vault-Header": {"hmac": true}}`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(
    try_from = "BTreeMap<String, HeaderPolicy>",
    into = "BTreeMap<String, HeaderPolicy>"
)]
pub struct HeaderPolicySet {
    /// Keyed by the normalized header name
    headers: BTreeMap<String, ConfiguredHeader>,
}

/// Canonical form used for all header name comparisons.
pub fn normalize_header_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Checks that `name` could actually show up as the name of an HTTP header.
pub fn validate_header_name(name: &str) -> Result<(), Error> {
    ensure!(!name.is_empty(), EmptyHeaderNameSnafu);
    http::HeaderName::from_bytes(name.as_bytes()).context(InvalidHeaderNameSnafu { name })?;

    Ok(())
}

impl HeaderPolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.headers.contains_key(&normalize_header_name(name))
    }

    pub fn get(&self, name: &str) -> Option<&HeaderPolicy> {
        self.get_key_value(name).map(|(_, policy)| policy)
    }

    /// Like [`Self::get`], but also returns the header name in the casing it was configured with.
    pub fn get_key_value(&self, name: &str) -> Option<(&str, &HeaderPolicy)> {
        self.headers
            .get(&normalize_header_name(name))
            .map(|header| (header.name.as_str(), &header.policy))
    }

    /// Inserts or replaces the policy of `name`. Returns the policy that was replaced.
    pub fn insert(&mut self, name: impl Into<String>, policy: HeaderPolicy) -> Option<HeaderPolicy> {
        let name = name.into();
        self.headers
            .insert(
                normalize_header_name(&name),
                ConfiguredHeader { name, policy },
            )
            .map(|previous| previous.policy)
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderPolicy> {
        self.headers
            .remove(&normalize_header_name(name))
            .map(|removed| removed.policy)
    }

    /// Iterates the configured header names (in their configured casing) with their policies,
    /// ordered by the normalized header name.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.headers.values(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).context(SerializeHeaderPoliciesSnafu)
    }

    pub fn from_json(json: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(json).context(DeserializeHeaderPoliciesSnafu)
    }
}

pub struct Iter<'a> {
    inner: btree_map::Values<'a, String, ConfiguredHeader>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a HeaderPolicy);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|header| (header.name.as_str(), &header.policy))
    }
}

impl<'a> IntoIterator for &'a HeaderPolicySet {
    type Item = (&'a str, &'a HeaderPolicy);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Later entries win in case the same header shows up multiple times.
impl<N: Into<String>> FromIterator<(N, HeaderPolicy)> for HeaderPolicySet {
    fn from_iter<T: IntoIterator<Item = (N, HeaderPolicy)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (name, policy) in iter {
            set.insert(name, policy);
        }
        set
    }
}

/// Used when reading persisted policies. In contrast to [`FromIterator`] this is strict: Names
/// that are not valid header names or that only differ in casing are rejected, as silently
/// dropping one of them could turn off hashing for a header.
impl TryFrom<BTreeMap<String, HeaderPolicy>> for HeaderPolicySet {
    type Error = Error;

    fn try_from(headers: BTreeMap<String, HeaderPolicy>) -> Result<Self, Self::Error> {
        let mut set = Self::new();
        for (name, policy) in headers {
            validate_header_name(&name)?;
            ensure!(!set.contains(&name), DuplicateHeaderNameSnafu { name });
            set.insert(name, policy);
        }

        Ok(set)
    }
}

impl From<HeaderPolicySet> for BTreeMap<String, HeaderPolicy> {
    fn from(set: HeaderPolicySet) -> Self {
        set.headers
            .into_values()
            .map(|header| (header.name, header.policy))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn policies() -> HeaderPolicySet {
        HeaderPolicySet::from_iter([
            ("X-Test-Header", HeaderPolicy { hmac: false }),
            ("X-Vault-Header", HeaderPolicy { hmac: true }),
        ])
    }

    #[rstest]
    #[case("X-Vault-Header")]
    #[case("x-vault-header")]
    #[case("X-VAULT-HEADER")]
    fn test_lookup_ignores_casing(#[case] name: &str) {
        let policies = policies();

        assert!(policies.contains(name));
        assert_eq!(
            policies.get_key_value(name),
            Some(("X-Vault-Header", &HeaderPolicy { hmac: true }))
        );
    }

    #[test]
    fn test_insert_with_other_casing_replaces_entry() {
        let mut policies = policies();

        let previous = policies.insert("x-test-header", HeaderPolicy { hmac: true });

        assert_eq!(previous, Some(HeaderPolicy { hmac: false }));
        assert_eq!(policies.len(), 2);
        assert_eq!(
            policies.get_key_value("X-Test-Header"),
            Some(("x-test-header", &HeaderPolicy { hmac: true }))
        );
    }

    #[test]
    fn test_remove() {
        let mut policies = policies();

        assert_eq!(
            policies.remove("X-TEST-HEADER"),
            Some(HeaderPolicy { hmac: false })
        );
        assert_eq!(policies.remove("X-Test-Header"), None);
        assert!(!policies.contains("X-Test-Header"));
        assert_eq!(policies.len(), 1);
    }

    #[test]
    fn test_json_keeps_configured_casing() {
        let json = policies().to_json().unwrap();

        assert_eq!(
            String::from_utf8(json).unwrap(),
            r#"{"X-Test-Header":{"hmac":false},"X-Vault-Header":{"hmac":true}}"#
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let policies = policies();
        let json = policies.to_json().unwrap();

        assert_eq!(HeaderPolicySet::from_json(&json).unwrap(), policies);
        assert_eq!(
            HeaderPolicySet::from_json(b"{}").unwrap(),
            HeaderPolicySet::new()
        );
    }

    #[rstest]
    #[case::not_json(r#"X-Test-Header"#)]
    #[case::not_an_object(r#"["X-Test-Header"]"#)]
    #[case::missing_hmac(r#"{"X-Test-Header": {}}"#)]
    #[case::wrong_type(r#"{"X-Test-Header": {"hmac": "yes"}}"#)]
    #[case::empty_name(r#"{"": {"hmac": true}}"#)]
    #[case::invalid_name(r#"{"X Test Header": {"hmac": true}}"#)]
    #[case::case_insensitive_duplicate(
        r#"{"X-Test-Header": {"hmac": true}, "x-test-header": {"hmac": false}}"#
    )]
    fn test_from_json_rejects_corrupt_input(#[case] json: &str) {
        assert!(matches!(
            HeaderPolicySet::from_json(json.as_bytes()),
            Err(Error::DeserializeHeaderPolicies { .. })
        ));
    }

    #[rstest]
    #[case("X-Test-Header", true)]
    #[case("authorization", true)]
    #[case("", false)]
    #[case("X Test", false)]
    #[case("X-Test:", false)]
    #[case("X-Tëst", false)]
    fn test_validate_header_name(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_header_name(name).is_ok(), valid);
    }
}
