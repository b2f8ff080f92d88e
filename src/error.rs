use std::io;
use thiserror::Error;

/// Broad classification of a [`PresenceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller supplied something unusable (empty ids, bad config)
    Configuration,
    /// The native layer failed or panicked
    Native,
    /// Discord answered with something we did not expect
    Protocol,
    /// Native buffer allocation failed
    Resource,
    /// The local Discord socket/pipe is unavailable or dropped
    Connection,
}

/// Errors produced by the presence client
#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("Application ID cannot be empty")]
    EmptyApplicationId,

    #[error("User ID cannot be empty")]
    EmptyUserId,

    #[error("Discord RPC not initialized")]
    NotInitialized,

    #[error("Discord RPC is shutting down")]
    ShuttingDown,

    #[error("Initialization suppressed for another {remaining_ms} ms after repeated failures")]
    CoolingDown { remaining_ms: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Native call `{operation}` failed: {message}")]
    NativeFailure {
        operation: &'static str,
        message: String,
    },

    #[error("Native call `{operation}` panicked: {message}")]
    NativePanic {
        operation: &'static str,
        message: String,
    },

    #[error("Failed to allocate {size} byte native buffer")]
    AllocationFailed { size: usize },

    #[error("Failed to connect to Discord IPC socket")]
    ConnectionFailed(#[from] io::Error),

    #[error("No Discord IPC socket found")]
    NoValidSocket,

    #[error("Socket connection was closed")]
    SocketClosed,

    #[error("Failed to serialize JSON payload")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Invalid response from Discord: {0}")]
    InvalidResponse(String),

    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u32),

    #[error("Payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u32, limit: u32 },

    #[error("Discord error {code}: {message}")]
    DiscordError { code: i32, message: String },

    #[error("Settings file error: {0}")]
    Settings(String),
}

impl PresenceError {
    /// Build a `DiscordError` from a code/message pair reported by Discord
    pub fn discord_error(code: i32, message: impl Into<String>) -> Self {
        Self::DiscordError {
            code,
            message: message.into(),
        }
    }

    /// Wrap a failure reported by a native implementation
    pub fn native(operation: &'static str, message: impl Into<String>) -> Self {
        Self::NativeFailure {
            operation,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyApplicationId
            | Self::EmptyUserId
            | Self::NotInitialized
            | Self::ShuttingDown
            | Self::CoolingDown { .. }
            | Self::InvalidConfig(_)
            | Self::Settings(_) => ErrorCategory::Configuration,
            Self::NativeFailure { .. } | Self::NativePanic { .. } => ErrorCategory::Native,
            Self::AllocationFailed { .. } => ErrorCategory::Resource,
            Self::ConnectionFailed(_) | Self::NoValidSocket | Self::SocketClosed => {
                ErrorCategory::Connection
            }
            Self::SerializationFailed(_)
            | Self::HandshakeFailed(_)
            | Self::InvalidResponse(_)
            | Self::InvalidOpcode(_)
            | Self::PayloadTooLarge { .. }
            | Self::DiscordError { .. } => ErrorCategory::Protocol,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        self.category() == ErrorCategory::Connection
    }

    /// Whether a later attempt (next tick, next reconnect) may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoValidSocket
                | Self::SocketClosed
                | Self::ConnectionFailed(_)
                | Self::InvalidResponse(_)
                | Self::NativeFailure { .. }
                | Self::CoolingDown { .. }
        )
    }
}

/// Result type for presence operations
pub type Result<T = ()> = std::result::Result<T, PresenceError>;
