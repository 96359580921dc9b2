use std::{collections::BTreeMap, sync::Arc};

use audit_headers_core::header_policy::HeaderPolicy;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use http::StatusCode;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{instrument, warn};

use super::{AuthenticationError, authenticate_admin};
use crate::{error_formatting::snafu_error_to_string, header_policy_store, http_server::AppState};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Not authorized to change audited headers"), context(false))]
    Unauthorized { source: AuthenticationError },

    #[snafu(display("The header {header:?} is not audited"))]
    UnknownHeader { header: String },

    #[snafu(display("Failed to parse the request body"))]
    ParseRequestBody { source: serde_json::Error },

    #[snafu(display("Failed to add audited header {header:?}"))]
    AddAuditedHeader {
        source: header_policy_store::Error,
        header: String,
    },

    #[snafu(display("Failed to remove audited header {header:?}"))]
    RemoveAuditedHeader {
        source: header_policy_store::Error,
        header: String,
    },
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        warn!(error = ?self, "Error while processing audited headers request");
        let status_code = match &self {
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::UnknownHeader { .. } => StatusCode::NOT_FOUND,
            Error::ParseRequestBody { .. } => StatusCode::BAD_REQUEST,
            Error::AddAuditedHeader {
                source: header_policy_store::Error::InvalidHeaderName { .. },
                ..
            } => StatusCode::BAD_REQUEST,
            Error::AddAuditedHeader { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::RemoveAuditedHeader { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status_code, snafu_error_to_string(&self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct AuditedHeadersResponse {
    headers: BTreeMap<String, HeaderPolicy>,
}

/// An empty body is the same as `{}`.
#[derive(Debug, Default, Deserialize)]
struct AuditedHeaderRequest {
    #[serde(default)]
    hmac: bool,
}

/// Lists all audited headers, keyed by the name they were configured with.
#[instrument(name = "GET /v1/sys/config/auditing/request-headers", skip(state))]
pub async fn get_audited_headers(State(state): State<Arc<AppState>>) -> Json<AuditedHeadersResponse> {
    state
        .metrics
        .http_counter
        .add(1, &[KeyValue::new("resource", "get_audited_headers")]);

    let headers = state
        .store
        .snapshot()
        .iter()
        .map(|(name, policy)| (name.to_owned(), *policy))
        .collect();

    Json(AuditedHeadersResponse { headers })
}

/// Looks up a single audited header. The lookup ignores casing.
#[instrument(name = "GET /v1/sys/config/auditing/request-headers/{header}", skip(state))]
pub async fn get_audited_header(
    State(state): State<Arc<AppState>>,
    Path(header): Path<String>,
) -> Result<Json<BTreeMap<String, HeaderPolicy>>, Error> {
    state
        .metrics
        .http_counter
        .add(1, &[KeyValue::new("resource", "get_audited_header")]);

    let policies = state.store.snapshot();
    let (name, policy) = policies
        .get_key_value(&header)
        .context(UnknownHeaderSnafu { header: &header })?;

    Ok(Json(BTreeMap::from([(name.to_owned(), *policy)])))
}

/// Starts auditing a header, or changes the policy of an already audited one.
///
/// Used for `PUT` as well as `POST`. The body is optional, e.g. `{"hmac": true}`.
#[instrument(
    name = "PUT /v1/sys/config/auditing/request-headers/{header}",
    skip(state, basic_auth, body)
)]
pub async fn put_audited_header(
    TypedHeader(Authorization(basic_auth)): TypedHeader<Authorization<Basic>>,
    State(state): State<Arc<AppState>>,
    Path(header): Path<String>,
    body: Bytes,
) -> Result<StatusCode, Error> {
    state
        .metrics
        .http_counter
        .add(1, &[KeyValue::new("resource", "put_audited_header")]);

    authenticate_admin(&state.config, &basic_auth)?;

    let request = if body.iter().all(u8::is_ascii_whitespace) {
        AuditedHeaderRequest::default()
    } else {
        serde_json::from_slice(&body).context(ParseRequestBodySnafu)?
    };

    state
        .store
        .add(&header, request.hmac)
        .await
        .context(AddAuditedHeaderSnafu { header: &header })?;
    state
        .metrics
        .header_policy_changes
        .add(1, &[KeyValue::new("operation", "add")]);

    Ok(StatusCode::NO_CONTENT)
}

/// Stops auditing a header. Headers that are not audited are silently ignored.
#[instrument(
    name = "DELETE /v1/sys/config/auditing/request-headers/{header}",
    skip(state, basic_auth)
)]
pub async fn delete_audited_header(
    TypedHeader(Authorization(basic_auth)): TypedHeader<Authorization<Basic>>,
    State(state): State<Arc<AppState>>,
    Path(header): Path<String>,
) -> Result<StatusCode, Error> {
    state
        .metrics
        .http_counter
        .add(1, &[KeyValue::new("resource", "delete_audited_header")]);

    authenticate_admin(&state.config, &basic_auth)?;

    state
        .store
        .remove(&header)
        .await
        .context(RemoveAuditedHeaderSnafu { header: &header })?;
    state
        .metrics
        .header_policy_changes
        .add(1, &[KeyValue::new("operation", "remove")]);

    Ok(StatusCode::NO_CONTENT)
}
