use editor_presence::error::ErrorCategory;
use editor_presence::ipc::connection::read_frame;
use editor_presence::ipc::Opcode;
use editor_presence::PresenceError;

#[test]
fn error_category_matches_constructor() {
    let error = PresenceError::SocketClosed;
    assert!(error.is_connection_error());
    assert_eq!(error.category(), ErrorCategory::Connection);
    assert!(error.is_recoverable());

    let protocol_error = PresenceError::InvalidResponse("bad".into());
    assert_eq!(protocol_error.category(), ErrorCategory::Protocol);
    assert!(protocol_error.is_recoverable());

    let app_error = PresenceError::discord_error(5001, "Discord failure");
    assert_eq!(app_error.category(), ErrorCategory::Protocol);
    assert!(!app_error.is_recoverable());
    assert_eq!(app_error.to_string(), "Discord error 5001: Discord failure");
}

#[test]
fn caller_mistakes_are_configuration_errors() {
    for error in [
        PresenceError::EmptyApplicationId,
        PresenceError::EmptyUserId,
        PresenceError::NotInitialized,
        PresenceError::InvalidConfig("refresh_interval_ms must be non-zero".into()),
    ] {
        assert_eq!(error.category(), ErrorCategory::Configuration);
        assert!(!error.is_connection_error());
    }
}

#[test]
fn native_failures_keep_the_operation_name() {
    let error = PresenceError::native("update_presence", "discord-rpc returned -1");
    assert_eq!(error.category(), ErrorCategory::Native);
    assert!(error.is_recoverable());
    assert_eq!(
        error.to_string(),
        "Native call `update_presence` failed: discord-rpc returned -1"
    );

    let panic = PresenceError::NativePanic {
        operation: "shutdown",
        message: "boom".into(),
    };
    assert_eq!(panic.category(), ErrorCategory::Native);
    assert!(!panic.is_recoverable());
}

#[test]
fn io_and_json_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
    let error: PresenceError = io.into();
    assert!(matches!(error, PresenceError::ConnectionFailed(_)));
    assert!(error.is_connection_error());

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: PresenceError = json.into();
    assert_eq!(error.category(), ErrorCategory::Protocol);
}

#[test]
fn malformed_frames_are_rejected() {
    let mut unknown_opcode: &[u8] = &[9, 0, 0, 0, 0, 0, 0, 0];
    assert!(matches!(
        read_frame(&mut unknown_opcode, 1024),
        Err(PresenceError::InvalidOpcode(9))
    ));

    let mut oversized: &[u8] = &[1, 0, 0, 0, 0, 8, 0, 0];
    assert!(matches!(
        read_frame(&mut oversized, 1024),
        Err(PresenceError::PayloadTooLarge {
            size: 2048,
            limit: 1024
        })
    ));

    let mut truncated: &[u8] = &[1, 0, 0, 0, 10, 0, 0, 0, b'{'];
    assert!(matches!(
        read_frame(&mut truncated, 1024),
        Err(PresenceError::SocketClosed)
    ));

    let mut garbage: Vec<u8> = vec![1, 0, 0, 0, 3, 0, 0, 0];
    garbage.extend_from_slice(b"{{{");
    assert!(matches!(
        read_frame(&mut garbage.as_slice(), 1024),
        Err(PresenceError::InvalidResponse(_))
    ));

    assert_eq!(Opcode::try_from(2).unwrap(), Opcode::Close);
}
