use crate::{RequestHeaders, header_policy::HeaderPolicySet};

/// Reduces `request_headers` to the headers that are allowed to show up in an audit log.
///
/// * Only headers configured in `policies` are returned, keyed by the name they were configured
///   with. Headers are matched case-insensitively.
/// * Values of headers with [`HeaderPolicy::hmac`](crate::header_policy::HeaderPolicy::hmac) set
///   are replaced by `hash(value)`, one call per value, keeping their order.
/// * In case the request contains the same header in multiple casings (e.g. `x-foo` and `X-Foo`)
///   their values are concatenated, ordered by the request header name.
///
/// Neither `policies` nor `request_headers` are modified.
pub fn apply<H>(
    policies: &HeaderPolicySet,
    request_headers: &RequestHeaders,
    hash: H,
) -> RequestHeaders
where
    H: Fn(&str) -> String,
{
    let mut audited = RequestHeaders::new();
    if policies.is_empty() {
        return audited;
    }

    // Sorting makes the output independent of the iteration order of the HashMap
    let mut request_header_names = request_headers.keys().collect::<Vec<_>>();
    request_header_names.sort();

    for request_header_name in request_header_names {
        let Some((configured_name, policy)) = policies.get_key_value(request_header_name) else {
            continue;
        };
        let values = &request_headers[request_header_name];
        let audited_values = audited.entry(configured_name.to_owned()).or_default();

        if policy.hmac {
            audited_values.extend(values.iter().map(|value| hash(value.as_str())));
        } else {
            audited_values.extend(values.iter().cloned());
        }
    }

    audited
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rstest::rstest;

    use super::*;
    use crate::header_policy::HeaderPolicy;

    fn policies() -> HeaderPolicySet {
        HeaderPolicySet::from_iter([
            ("X-Test-Header", HeaderPolicy { hmac: false }),
            ("X-Vault-Header", HeaderPolicy { hmac: true }),
        ])
    }

    fn request_headers() -> RequestHeaders {
        RequestHeaders::from([
            ("X-Test-Header".to_owned(), vec!["foo".to_owned()]),
            (
                "X-Vault-Header".to_owned(),
                vec!["bar".to_owned(), "bar".to_owned()],
            ),
            ("Content-Type".to_owned(), vec!["json".to_owned()]),
        ])
    }

    fn headers<const N: usize>(headers: [(&str, Vec<&str>); N]) -> RequestHeaders {
        headers
            .into_iter()
            .map(|(name, values)| {
                (
                    name.to_owned(),
                    values.into_iter().map(str::to_owned).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_apply_config() {
        let policies = policies();
        let request_headers = request_headers();

        let result = apply(&policies, &request_headers, |_| "hashed".to_owned());

        assert_eq!(
            result,
            headers([
                ("X-Test-Header", vec!["foo"]),
                ("X-Vault-Header", vec!["hashed", "hashed"]),
            ])
        );

        // Make sure we didn't edit the inputs
        assert_eq!(request_headers, self::request_headers());
        assert_eq!(policies, self::policies());
    }

    #[test]
    fn test_hash_is_applied_per_value_in_order() {
        let calls = Cell::new(0);
        let request_headers = headers([("X-Vault-Header", vec!["a", "b", "a"])]);

        let result = apply(&policies(), &request_headers, |value| {
            calls.set(calls.get() + 1);
            format!("hash({value})")
        });

        assert_eq!(calls.get(), 3);
        assert_eq!(
            result,
            headers([("X-Vault-Header", vec!["hash(a)", "hash(b)", "hash(a)"])])
        );
    }

    #[test]
    fn test_raw_values_never_leak_for_hashed_headers() {
        let request_headers = headers([
            ("x-vault-header", vec!["secret-1"]),
            ("X-VAULT-HEADER", vec!["secret-2"]),
        ]);

        let result = apply(&policies(), &request_headers, |_| "hashed".to_owned());

        let values = &result["X-Vault-Header"];
        assert_eq!(values, &["hashed", "hashed"]);
        assert!(
            result
                .values()
                .flatten()
                .all(|value| !value.starts_with("secret"))
        );
    }

    #[rstest]
    #[case::exact("X-Test-Header")]
    #[case::lowercase("x-test-header")]
    #[case::uppercase("X-TEST-HEADER")]
    fn test_request_header_casing_is_ignored(#[case] request_header_name: &str) {
        let request_headers = headers([(request_header_name, vec!["foo"])]);

        let result = apply(&policies(), &request_headers, |_| "hashed".to_owned());

        assert_eq!(result, headers([("X-Test-Header", vec!["foo"])]));
    }

    #[test]
    fn test_multiple_casings_are_concatenated_deterministically() {
        let request_headers = headers([("x-test-header", vec!["b"]), ("X-Test-Header", vec!["a"])]);

        let result = apply(&policies(), &request_headers, |_| "hashed".to_owned());

        // "X-Test-Header" sorts before "x-test-header"
        assert_eq!(result, headers([("X-Test-Header", vec!["a", "b"])]));
    }

    #[rstest]
    #[case::no_request_headers(headers([]))]
    #[case::unrelated_request_headers(request_headers())]
    fn test_empty_policies_result_in_empty_output(#[case] request_headers: RequestHeaders) {
        let result = apply(&HeaderPolicySet::new(), &request_headers, |_| {
            "hashed".to_owned()
        });

        assert!(result.is_empty());
    }

    #[test]
    fn test_output_is_subset_of_configured_headers() {
        let request_headers = headers([
            ("Authorization", vec!["Bearer secret"]),
            ("Cookie", vec!["session=secret"]),
            ("X-Vault-Header", vec!["bar"]),
        ]);

        let result = apply(&policies(), &request_headers, |_| "hashed".to_owned());

        assert!(result.keys().all(|name| policies().contains(name)));
        assert_eq!(result, headers([("X-Vault-Header", vec!["hashed"])]));
    }

    #[test]
    fn test_present_header_without_values_is_kept() {
        let request_headers = headers([("X-Test-Header", vec![])]);

        let result = apply(&policies(), &request_headers, |_| "hashed".to_owned());

        assert_eq!(result, headers([("X-Test-Header", vec![])]));
    }
}
