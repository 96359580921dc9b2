pub fn snafu_error_to_string<E: std::error::Error>(err: &E) -> String {
    let mut result = format!("{err}");
    let mut source = err.source();
    while let Some(err) = source {
        result.push_str(format!(": {err}").as_str());
        source = err.source();
    }

    result
}

#[test]
fn test_error_formatting() {
    let err = crate::header_policy_store::Error::WriteHeaderPolicies {
        source: audit_headers_persistence::Error::RedisError {
            source: audit_headers_persistence::redis::Error::WriteToRedis {
                source: redis::RedisError::from(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "Connection to Redis was refused",
                )),
                key: "audited-headers-config/audited-headers".to_owned(),
            },
        },
    };

    assert_eq!(
        format!("{err}"),
        "Failed to write the audited headers configuration to persistence"
    );
    assert_eq!(
        snafu_error_to_string(&err),
        "Failed to write the audited headers configuration to persistence: Redis persistence error: Failed to write key \"audited-headers-config/audited-headers\" to redis: Connection to Redis was refused: Connection to Redis was refused"
    );
    assert_eq!(
        format!("{:#}", snafu::Report::from_error(err)),
        "Failed to write the audited headers configuration to persistence

Caused by these errors (recent errors listed first):
  1: Redis persistence error
  2: Failed to write key \"audited-headers-config/audited-headers\" to redis
  3: Connection to Redis was refused

NOTE: Some redundant information has been removed. Set SNAFU_RAW_ERROR_MESSAGES=1 to disable this behavior.
"
    );
}
