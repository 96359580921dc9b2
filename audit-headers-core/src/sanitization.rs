use crate::{RequestHeaders, filter, header_policy::HeaderPolicySet};

/// Produces the version of a header collection that can be written to an audit log.
pub trait Sanitize {
    fn sanitize<H>(&self, policies: &HeaderPolicySet, hash: H) -> RequestHeaders
    where
        H: Fn(&str) -> String;
}

impl Sanitize for RequestHeaders {
    fn sanitize<H>(&self, policies: &HeaderPolicySet, hash: H) -> RequestHeaders
    where
        H: Fn(&str) -> String,
    {
        filter::apply(policies, self, hash)
    }
}

/// Only the values of audited headers are read from the [`http::HeaderMap`], all other values
/// (e.g. `Authorization` or `Cookie`) are never copied. Values that are not valid UTF-8 are
/// converted lossy.
///
/// [`http::HeaderMap`] looks up names case-insensitively and keeps a single casing per header,
/// so the result is the same as [`filter::apply`] on the complete headers.
impl Sanitize for http::HeaderMap {
    fn sanitize<H>(&self, policies: &HeaderPolicySet, hash: H) -> RequestHeaders
    where
        H: Fn(&str) -> String,
    {
        let mut audited = RequestHeaders::new();
        for (name, policy) in policies {
            let values = self.get_all(name);
            if values.iter().next().is_none() {
                continue;
            }

            let values = values
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()));
            let audited_values = if policy.hmac {
                values.map(|value| hash(&*value)).collect()
            } else {
                values.map(|value| value.into_owned()).collect()
            };
            audited.insert(name.to_owned(), audited_values);
        }

        audited
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use http::{
        HeaderMap, HeaderValue,
        header::{AUTHORIZATION, CONTENT_LENGTH, COOKIE, HOST},
    };

    use super::*;
    use crate::header_policy::HeaderPolicy;

    #[test]
    fn test_sanitize() {
        let policies = HeaderPolicySet::from_iter([
            ("Authorization", HeaderPolicy { hmac: true }),
            ("Content-Length", HeaderPolicy { hmac: false }),
        ]);
        let mut headers = HeaderMap::new();
        headers.insert(HOST, "example.com".parse().unwrap());
        headers.insert(CONTENT_LENGTH, "123".parse().unwrap());

        let sanitized = headers.sanitize(&policies, |_| "<redacted>".to_owned());
        assert_eq!(
            sanitized,
            RequestHeaders::from([("Content-Length".to_owned(), vec!["123".to_owned()])])
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("secure"));
        let sanitized = headers.sanitize(&policies, |_| "<redacted>".to_owned());
        assert_eq!(sanitized["Authorization"], ["<redacted>"]);
        assert_eq!(sanitized.len(), 2);

        // The header map itself is left untouched
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "secure");
    }

    #[test]
    fn test_sanitize_only_reads_audited_values() {
        let policies = HeaderPolicySet::from_iter([
            ("X-Vault-Header", HeaderPolicy { hmac: true }),
            ("X-Binary", HeaderPolicy { hmac: false }),
        ]);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret-token"));
        headers.insert(COOKIE, HeaderValue::from_static("session=secret-session"));
        headers.append("x-vault-header", HeaderValue::from_static("bar"));
        headers.append("x-vault-header", HeaderValue::from_static("baz"));
        headers.insert("x-binary", HeaderValue::from_bytes(b"caf\xe9").unwrap());

        let hashed_values = RefCell::new(Vec::new());
        let sanitized = headers.sanitize(&policies, |value| {
            hashed_values.borrow_mut().push(value.to_owned());
            format!("hashed({value})")
        });

        assert_eq!(hashed_values.into_inner(), ["bar", "baz"]);
        assert_eq!(
            sanitized,
            RequestHeaders::from([
                (
                    "X-Vault-Header".to_owned(),
                    vec!["hashed(bar)".to_owned(), "hashed(baz)".to_owned()]
                ),
                ("X-Binary".to_owned(), vec!["caf\u{FFFD}".to_owned()]),
            ])
        );
    }

    #[test]
    fn test_sanitize_matches_filter() {
        let policies = HeaderPolicySet::from_iter([
            ("X-Test-Header", HeaderPolicy { hmac: false }),
            ("X-Vault-Header", HeaderPolicy { hmac: true }),
        ]);
        let mut headers = HeaderMap::new();
        headers.append("x-test-header", HeaderValue::from_static("foo"));
        headers.append("x-vault-header", HeaderValue::from_static("bar"));
        headers.append("x-vault-header", HeaderValue::from_static("baz"));
        headers.insert(HOST, HeaderValue::from_static("example.com"));

        let mut request_headers = RequestHeaders::new();
        for (name, value) in &headers {
            request_headers
                .entry(name.as_str().to_owned())
                .or_default()
                .push(value.to_str().unwrap().to_owned());
        }

        let hash = |value: &str| format!("hashed({value})");
        assert_eq!(
            headers.sanitize(&policies, hash),
            request_headers.sanitize(&policies, hash)
        );
    }
}
