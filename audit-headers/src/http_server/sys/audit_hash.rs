use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use http::StatusCode;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tracing::{instrument, warn};

use super::{AuthenticationError, authenticate_admin};
use crate::{error_formatting::snafu_error_to_string, http_server::AppState};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Not authorized to compute audit hashes"), context(false))]
    Unauthorized { source: AuthenticationError },
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        warn!(error = ?self, "Error while processing audit hash request");
        let status_code = match &self {
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        };
        (status_code, snafu_error_to_string(&self)).into_response()
    }
}

#[derive(Deserialize)]
pub struct AuditHashRequest {
    input: String,
}

#[derive(Debug, Serialize)]
pub struct AuditHashResponse {
    hash: String,
}

/// Hashes `input` the same way values of audited headers with `hmac: true` are hashed, so that
/// operators can look up a known value in the audit log.
#[instrument(name = "POST /v1/sys/audit-hash", skip_all)]
pub async fn post_audit_hash(
    TypedHeader(Authorization(basic_auth)): TypedHeader<Authorization<Basic>>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<AuditHashRequest>,
) -> Result<Json<AuditHashResponse>, Error> {
    state
        .metrics
        .http_counter
        .add(1, &[KeyValue::new("resource", "post_audit_hash")]);

    authenticate_admin(&state.config, &basic_auth)?;

    Ok(Json(AuditHashResponse {
        hash: state.salt.hash(&request.input),
    }))
}
