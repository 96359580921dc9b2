use std::{collections::BTreeMap, sync::Arc};

use audit_headers_core::{header_policy::HeaderPolicySet, salt::Salt, sanitization::Sanitize};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::HeaderMap;
use tracing::{info, warn};

use crate::http_server::AppState;

/// Writes one entry with the target `audit` per request.
///
/// Only audited headers show up in the entry, keyed by the name they were configured with. The
/// audited headers are determined once the request arrives, so a request changing the
/// configuration is audited according to the previous configuration.
pub async fn audit_request(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let policies = state.store.snapshot();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let headers = audited_headers(&policies, &state.salt, request.headers());

    let response = next.run(request).await;

    match serde_json::to_string(&headers) {
        Ok(headers) => info!(
            target: "audit",
            %method,
            %path,
            status = response.status().as_u16(),
            %headers,
            "Request"
        ),
        Err(error) => warn!(%error, %method, %path, "Failed to serialize audited headers"),
    }
    state.metrics.audited_requests.add(1, &[]);

    response
}

/// Sorted by header name, so entries are stable across requests.
fn audited_headers(
    policies: &HeaderPolicySet,
    salt: &Salt,
    headers: &HeaderMap,
) -> BTreeMap<String, Vec<String>> {
    headers
        .sanitize(policies, |value| salt.hash(value))
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use audit_headers_core::{header_policy::HeaderPolicy, salt::SALT_LENGTH};
    use http::HeaderValue;

    use super::*;

    #[test]
    fn test_only_audited_headers_are_kept() {
        let salt = Salt::from_bytes([3u8; SALT_LENGTH]);
        let policies = HeaderPolicySet::from_iter([
            ("X-Vault-Token", HeaderPolicy { hmac: true }),
            ("X-Request-Id", HeaderPolicy { hmac: false }),
            ("X-Not-Sent", HeaderPolicy { hmac: false }),
        ]);

        let mut headers = HeaderMap::new();
        headers.append("x-vault-token", HeaderValue::from_static("s.secret"));
        headers.append("x-request-id", HeaderValue::from_static("1"));
        headers.append("x-request-id", HeaderValue::from_static("2"));
        headers.append("authorization", HeaderValue::from_static("Basic c2VjcmV0"));

        let audited = audited_headers(&policies, &salt, &headers);

        assert_eq!(
            audited,
            BTreeMap::from([
                ("X-Request-Id".to_owned(), vec!["1".to_owned(), "2".to_owned()]),
                ("X-Vault-Token".to_owned(), vec![salt.hash("s.secret")]),
            ])
        );
        let serialized = serde_json::to_string(&audited).unwrap();
        assert!(!serialized.contains("s.secret"));
        assert!(!serialized.contains("Basic"));
    }

    #[test]
    fn test_nothing_audited_without_policies() {
        let mut headers = HeaderMap::new();
        headers.append("x-vault-token", HeaderValue::from_static("s.secret"));

        let audited = audited_headers(
            &HeaderPolicySet::new(),
            &Salt::from_bytes([3u8; SALT_LENGTH]),
            &headers,
        );

        assert!(audited.is_empty());
    }
}
