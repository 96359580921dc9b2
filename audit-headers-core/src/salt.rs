//! Keyed hashing of audited header values.
//!
//! Values are hashed with HMAC-SHA256 using a secret salt, so that identical values produce
//! identical hashes (allowing operators to correlate requests), but the original values can not be
//! brute-forced without knowing the salt.

use std::fmt::Debug;

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use snafu::{OptionExt, ResultExt, Snafu};

/// Prefix of every hash, so that readers of an audit log can tell hashed values apart.
pub const HASH_PREFIX: &str = "hmac-sha256:";

/// Number of bytes of key material a [`Salt`] consists of.
pub const SALT_LENGTH: usize = 32;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Failed to decode base64 encoded salt"))]
    DecodeBase64Salt { source: base64::DecodeError },

    #[snafu(display("The salt must be exactly {SALT_LENGTH} bytes long, but it is {length} bytes"))]
    InvalidSaltLength { length: usize },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Salt {
    key: [u8; SALT_LENGTH],
}

impl Salt {
    pub fn generate() -> Self {
        let mut key = [0u8; SALT_LENGTH];
        rand::rng().fill(&mut key);
        Self { key }
    }

    pub fn from_bytes(key: [u8; SALT_LENGTH]) -> Self {
        Self { key }
    }

    pub fn from_slice(key: &[u8]) -> Result<Self, Error> {
        let key = <[u8; SALT_LENGTH]>::try_from(key)
            .ok()
            .context(InvalidSaltLengthSnafu { length: key.len() })?;
        Ok(Self { key })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context(DecodeBase64SaltSnafu)?;

        Self::from_slice(&decoded)
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.key)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Returns `hmac-sha256:<hex encoded HMAC of input>`.
    pub fn hash(&self, input: &str) -> String {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(input.as_bytes());

        format!("{HASH_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
    }
}

impl Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Salt").field("key", &"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_hash() {
        let salt = Salt::from_bytes([0u8; SALT_LENGTH]);

        let hashed = salt.hash("bar");
        assert!(hashed.starts_with(HASH_PREFIX));
        // 32 bytes of HMAC-SHA256 output, hex encoded
        assert_eq!(hashed.len(), HASH_PREFIX.len() + 64);
        assert_eq!(hashed, salt.hash("bar"));
        assert_ne!(hashed, salt.hash("baz"));
    }

    #[test]
    fn test_hash_depends_on_salt() {
        let salt_1 = Salt::from_bytes([1u8; SALT_LENGTH]);
        let salt_2 = Salt::from_bytes([2u8; SALT_LENGTH]);

        assert_ne!(salt_1.hash("bar"), salt_2.hash("bar"));
    }

    #[test]
    fn test_generate() {
        assert_ne!(Salt::generate(), Salt::generate());
    }

    #[test]
    fn test_base64_roundtrip() {
        let salt = Salt::generate();

        assert_eq!(Salt::from_base64(&salt.to_base64()).unwrap(), salt);
    }

    #[rstest]
    #[case::not_base64("not base64!")]
    #[case::too_short("AAAA")]
    #[case::too_long("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")]
    fn test_from_base64_rejects_invalid_input(#[case] encoded: &str) {
        assert!(Salt::from_base64(encoded).is_err());
    }

    #[test]
    fn test_from_slice_checks_length() {
        assert!(matches!(
            Salt::from_slice(&[0u8; 16]),
            Err(Error::InvalidSaltLength { length: 16 })
        ));
        assert!(Salt::from_slice(&[0u8; SALT_LENGTH]).is_ok());
    }

    #[test]
    fn test_debug_does_not_leak_key_material() {
        let salt = Salt::from_bytes([42u8; SALT_LENGTH]);

        assert_eq!(format!("{salt:?}"), r#"Salt { key: "<redacted>" }"#);
    }
}
