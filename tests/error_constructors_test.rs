use foxess_cloud::error::FoxessError;

#[test]
fn error_constructors() {
    assert!(matches!(FoxessError::auth("x"), FoxessError::Auth { .. }));
    assert!(matches!(
        FoxessError::connection("x"),
        FoxessError::Connection { .. }
    ));
    assert!(matches!(
        FoxessError::api("x"),
        FoxessError::Api { code: None, .. }
    ));
    assert!(matches!(
        FoxessError::api_code(40256, "x"),
        FoxessError::Api { code: Some(40256), .. }
    ));
    assert!(matches!(
        FoxessError::config("x"),
        FoxessError::Config { .. }
    ));
    assert!(matches!(FoxessError::io("x"), FoxessError::Io { .. }));
}

#[test]
fn conversions_from_library_errors() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    assert!(matches!(FoxessError::from(io), FoxessError::Io { .. }));

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(
        FoxessError::from(json),
        FoxessError::Serialization { .. }
    ));
}

#[test]
fn source_chain_of_refresh_failure() {
    use std::error::Error;

    let err = FoxessError::refresh_failed("scheduler", FoxessError::connection("timed out"));
    assert!(err.is_connection());
    let source = err.source().unwrap();
    assert_eq!(source.to_string(), "Connection error: timed out");
}
