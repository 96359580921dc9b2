//! Management endpoints below `/v1/sys`.

use audit_headers_core::config::{AdminAuthenticationConfig, Config};
use axum_extra::headers::authorization::Basic;
use snafu::{Snafu, ensure};

pub mod audit_hash;
pub mod request_headers;

#[derive(Snafu, Debug)]
pub enum AuthenticationError {
    #[snafu(display("No admin authentication method defined"))]
    NoAdminAuthenticationMethodDefined,

    #[snafu(display("Invalid admin credentials"))]
    InvalidAdminCredentials,
}

/// All endpoints changing the audited headers (or revealing hashes) are reserved for admins.
/// Without a configured authentication method nobody is an admin.
fn authenticate_admin(config: &Config, basic_auth: &Basic) -> Result<(), AuthenticationError> {
    match &config.admin_authentication {
        Some(AdminAuthenticationConfig::BasicAuth { username, password }) => {
            // Both comparisons always run
            let username_matches = constant_time_eq(basic_auth.username(), username);
            let password_matches = constant_time_eq(basic_auth.password(), password);
            ensure!(username_matches & password_matches, InvalidAdminCredentialsSnafu);
            Ok(())
        }
        None => NoAdminAuthenticationMethodDefinedSnafu.fail(),
    }
}

/// Takes the same time for every input of a given length.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
