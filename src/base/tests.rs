use crate::base::neterror::NetError;

#[test]
fn test_net_error_roundtrip() {
    // Standard Chromium error
    let original = NetError::ConnectionRefused;
    let code = original.as_i32();
    assert_eq!(code, -102);
    let converted = NetError::from(code);
    assert!(matches!(converted, NetError::ConnectionRefused));

    // Custom error
    let custom = NetError::InvalidHeader;
    let custom_code = custom.as_i32();
    assert_eq!(custom_code, -10003);
    assert_eq!(NetError::from(custom_code), NetError::InvalidHeader);
}

#[test]
fn test_unknown_error() {
    let err = NetError::from(-9999);
    assert!(matches!(err, NetError::Unknown(-9999)));
}

#[test]
fn test_collision_avoidance() {
    // Custom codes must stay clear of the Blob range (-900 to -906)
    let blob_range = -906..=-900;

    for err in [
        NetError::Protocol("x".into()),
        NetError::TooManyRequestRestarts(1),
        NetError::StreamReset("x".into()),
    ] {
        assert!(!blob_range.contains(&err.as_i32()));
    }
}

#[test]
fn test_fatal_classification() {
    assert!(NetError::TooManyAuthAttempts(11).is_fatal());
    assert!(NetError::TooManyRequestRestarts(33).is_fatal());
    assert!(!NetError::Protocol("missing header".into()).is_fatal());
    assert!(!NetError::ConnectionReset.is_fatal());
}

#[test]
fn test_transport_classification() {
    assert!(NetError::ConnectionReset.is_transport());
    assert!(NetError::ConnectionTimedOut.is_transport());
    assert!(!NetError::UnsupportedAuthScheme("NTLM".into()).is_transport());
}

#[test]
fn test_auth_guard_message() {
    let err = NetError::TooManyAuthAttempts(10);
    assert_eq!(
        err.to_string(),
        "Bug in authorization handling: server refused the given info 10 times"
    );
}
