use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::backoff::BackoffConfig;
use crate::dispatch::DiscordUser;
use crate::error::{PresenceError, Result};
use crate::presence::{PresenceFrame, TextField};

/// Discord IPC Opcodes
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl TryFrom<u32> for Opcode {
    type Error = PresenceError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            other => Err(PresenceError::InvalidOpcode(other)),
        }
    }
}

impl From<Opcode> for u32 {
    fn from(opcode: Opcode) -> Self {
        opcode as u32
    }
}

/// Discord IPC Commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Dispatch,
    SetActivity,
    Subscribe,
    Unsubscribe,
    SendActivityJoinInvite,
    CloseActivityJoinRequest,
}

/// Events Discord pushes to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Ready,
    Error,
    ActivityJoin,
    ActivitySpectate,
    ActivityJoinRequest,
}

impl Event {
    /// Events subscribed to right after the handshake
    pub const SUBSCRIPTIONS: [Event; 3] = [
        Event::ActivityJoin,
        Event::ActivitySpectate,
        Event::ActivityJoinRequest,
    ];
}

/// Outgoing command frame
#[derive(Debug, Clone, Serialize)]
pub struct IpcMessage {
    pub cmd: Command,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evt: Option<Event>,
    pub nonce: String,
}

impl IpcMessage {
    pub fn new(cmd: Command, args: Value) -> Self {
        Self {
            cmd,
            args: Some(args),
            evt: None,
            nonce: generate_nonce(cmd),
        }
    }

    pub fn subscribe(evt: Event) -> Self {
        Self {
            cmd: Command::Subscribe,
            args: None,
            evt: Some(evt),
            nonce: generate_nonce(Command::Subscribe),
        }
    }

    /// `SET_ACTIVITY`; `None` clears the presence
    pub fn set_activity(activity: Option<Value>) -> Self {
        Self::new(
            Command::SetActivity,
            serde_json::json!({
                "pid": std::process::id(),
                "activity": activity.unwrap_or(Value::Null),
            }),
        )
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Handshake payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub v: u32,
    pub client_id: String,
}

/// Incoming frame from Discord
#[derive(Debug, Clone, Deserialize)]
pub struct IpcResponse {
    pub cmd: Option<String>,
    pub data: Option<Value>,
    pub evt: Option<String>,
    pub nonce: Option<String>,
}

impl IpcResponse {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|err| PresenceError::InvalidResponse(err.to_string()))
    }

    pub fn event(&self) -> Option<Event> {
        let evt = self.evt.as_deref()?;
        serde_json::from_value(Value::String(evt.to_string())).ok()
    }

    /// `code`/`message` of an error payload
    pub fn error_details(&self) -> (i32, String) {
        error_details(self.data.as_ref())
    }

    pub fn user(&self) -> DiscordUser {
        self.data
            .as_ref()
            .and_then(|data| data.get("user"))
            .map(parse_user)
            .unwrap_or_default()
    }

    pub fn secret(&self) -> String {
        self.data
            .as_ref()
            .and_then(|data| data.get("secret"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// `code`/`message` from an `ERROR` event or a `Close` frame
pub fn error_details(data: Option<&Value>) -> (i32, String) {
    let code = data
        .and_then(|data| data.get("code"))
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .unwrap_or(-1);
    let message = data
        .and_then(|data| data.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    (code, message)
}

fn parse_user(user: &Value) -> DiscordUser {
    let field = |key: &str| {
        user.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    DiscordUser {
        user_id: field("id"),
        username: field("username"),
        discriminator: field("discriminator"),
        avatar: field("avatar"),
    }
}

/// Generate a unique nonce for an IPC request
pub fn generate_nonce(cmd: Command) -> String {
    let prefix = match cmd {
        Command::Dispatch => "dispatch",
        Command::SetActivity => "set-activity",
        Command::Subscribe => "subscribe",
        Command::Unsubscribe => "unsubscribe",
        Command::SendActivityJoinInvite => "join-invite",
        Command::CloseActivityJoinRequest => "join-close",
    };
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Activity JSON in the shape `SET_ACTIVITY` expects
///
/// Borrows every string from the frame it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<ActivityTimestamps>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<ActivityAssets<'a>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<ActivityParty<'a>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<ActivitySecrets<'a>>,

    pub instance: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityTimestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityAssets<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_text: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_image: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_text: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityParty<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<[i32; 2]>, // [current, max]
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivitySecrets<'a> {
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_secret: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectate: Option<&'a str>,
}

fn nonzero(value: i64) -> Option<i64> {
    (value != 0).then_some(value)
}

impl<'a> ActivityPayload<'a> {
    pub fn from_frame(frame: &PresenceFrame<'a>) -> Self {
        let text = |field| frame.text(field);

        let timestamps = (frame.start_timestamp() != 0 || frame.end_timestamp() != 0).then(|| {
            ActivityTimestamps {
                start: nonzero(frame.start_timestamp()),
                end: nonzero(frame.end_timestamp()),
            }
        });

        let assets = ActivityAssets {
            large_image: text(TextField::LargeImageKey),
            large_text: text(TextField::LargeImageText),
            small_image: text(TextField::SmallImageKey),
            small_text: text(TextField::SmallImageText),
        };
        let has_assets = assets.large_image.is_some()
            || assets.large_text.is_some()
            || assets.small_image.is_some()
            || assets.small_text.is_some();

        let party = ActivityParty {
            id: text(TextField::PartyId),
            size: (frame.party_size() > 0).then(|| [frame.party_size(), frame.party_max()]),
        };
        let has_party = party.id.is_some() || party.size.is_some();

        let secrets = ActivitySecrets {
            match_secret: text(TextField::MatchSecret),
            join: text(TextField::JoinSecret),
            spectate: text(TextField::SpectateSecret),
        };
        let has_secrets =
            secrets.match_secret.is_some() || secrets.join.is_some() || secrets.spectate.is_some();

        Self {
            state: text(TextField::State),
            details: text(TextField::Details),
            timestamps,
            assets: has_assets.then_some(assets),
            party: has_party.then_some(party),
            secrets: has_secrets.then_some(secrets),
            instance: frame.instance(),
        }
    }
}

/// Constants for the Discord IPC protocol
pub mod constants {
    /// Protocol version sent in the handshake
    pub const IPC_VERSION: u32 = 1;

    /// Discord numbers its sockets `discord-ipc-0` through `discord-ipc-9`
    pub const MAX_IPC_SOCKETS: u8 = 10;

    pub const IPC_SOCKET_PREFIX: &str = "discord-ipc-";

    /// How long to wait for the handshake `READY`
    ///
    /// Connect attempts run inside the host's tick, so this stays short.
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;

    /// Largest frame accepted from Discord (16 MB)
    pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

    /// 4 bytes opcode + 4 bytes length, both little-endian
    pub const IPC_HEADER_SIZE: usize = 8;
}

/// Configuration for the built-in IPC client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Maximum number of socket instances to scan during auto-discovery
    pub max_sockets: u8,

    /// Upper bound on waiting for the handshake reply
    pub connect_timeout_ms: u64,

    /// Maximum allowed payload size in bytes
    pub max_payload_size: u32,

    /// IPC protocol version to use in handshake
    pub ipc_version: u32,

    /// Delay between reconnect attempts
    pub reconnect: BackoffConfig,

    /// Directories to scan instead of the platform defaults (unix only)
    pub search_dirs: Vec<PathBuf>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_sockets: constants::MAX_IPC_SOCKETS,
            connect_timeout_ms: constants::DEFAULT_CONNECT_TIMEOUT_MS,
            max_payload_size: constants::MAX_PAYLOAD_SIZE,
            ipc_version: constants::IPC_VERSION,
            reconnect: BackoffConfig::default(),
            search_dirs: Vec::new(),
        }
    }
}

impl IpcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan fewer sockets and give up on the handshake sooner
    pub fn fast_connect() -> Self {
        Self {
            max_sockets: 3,
            connect_timeout_ms: 200,
            ..Default::default()
        }
    }

    pub fn with_max_sockets(mut self, max_sockets: u8) -> Self {
        self.max_sockets = max_sockets;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout_ms: u64) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: u32) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn with_reconnect(mut self, reconnect: BackoffConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    pub fn validate(&self) -> Result {
        let invalid = |msg: &str| Err(PresenceError::InvalidConfig(msg.to_string()));

        if self.max_sockets == 0 {
            return invalid("max_sockets must be greater than 0");
        }
        if self.max_sockets > 100 {
            return invalid("max_sockets exceeds reasonable limit (100)");
        }
        if self.connect_timeout_ms == 0 {
            return invalid("connect_timeout_ms must be greater than 0");
        }
        if self.max_payload_size < 1024 {
            return invalid("max_payload_size too small (minimum 1 KB)");
        }
        if self.max_payload_size > 100 * 1024 * 1024 {
            return invalid("max_payload_size too large (maximum 100 MB)");
        }
        self.reconnect
            .validate()
            .map_err(|msg| PresenceError::InvalidConfig(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::NativeBufferPool;
    use crate::presence::RichPresence;

    #[test]
    fn opcode_conversion() {
        assert_eq!(Opcode::try_from(1).unwrap(), Opcode::Frame);
        assert_eq!(u32::from(Opcode::Pong), 4);
        assert!(matches!(
            Opcode::try_from(9),
            Err(PresenceError::InvalidOpcode(9))
        ));
    }

    #[test]
    fn subscribe_message_shape() {
        let value = IpcMessage::subscribe(Event::ActivityJoinRequest)
            .to_value()
            .unwrap();
        assert_eq!(value["cmd"], "SUBSCRIBE");
        assert_eq!(value["evt"], "ACTIVITY_JOIN_REQUEST");
        assert!(value.get("args").is_none());
        assert!(value["nonce"].as_str().unwrap().starts_with("subscribe-"));
    }

    #[test]
    fn nonces_are_unique() {
        assert_ne!(
            generate_nonce(Command::SetActivity),
            generate_nonce(Command::SetActivity)
        );
    }

    #[test]
    fn activity_payload_skips_empty_sections() {
        let pool = NativeBufferPool::default();
        let mut presence = RichPresence::new();
        presence
            .set_state("Currently in Edit Mode")
            .set_details("Avatar: Kitsune")
            .set_large_image("winter")
            .set_start_timestamp(1_700_000_000);

        let frame = presence.build(&pool).unwrap();
        let value = serde_json::to_value(ActivityPayload::from_frame(&frame)).unwrap();

        assert_eq!(value["state"], "Currently in Edit Mode");
        assert_eq!(value["timestamps"]["start"], 1_700_000_000_i64);
        assert!(value["timestamps"].get("end").is_none());
        assert_eq!(value["assets"]["large_image"], "winter");
        assert!(value.get("party").is_none());
        assert!(value.get("secrets").is_none());
        assert_eq!(value["instance"], false);
    }

    #[test]
    fn activity_payload_party_and_secrets() {
        let pool = NativeBufferPool::default();
        let mut presence = RichPresence::new();
        presence
            .set_party_id("party-1")
            .set_party_size(2)
            .set_party_max(4)
            .set_join_secret("join-me")
            .set_match_secret("m1");

        let frame = presence.build(&pool).unwrap();
        let value = serde_json::to_value(ActivityPayload::from_frame(&frame)).unwrap();

        assert_eq!(value["party"]["size"], serde_json::json!([2, 4]));
        assert_eq!(value["secrets"]["match"], "m1");
        assert_eq!(value["secrets"]["join"], "join-me");
    }

    #[test]
    fn response_helpers() {
        let response = IpcResponse::from_value(serde_json::json!({
            "cmd": "DISPATCH",
            "evt": "ACTIVITY_JOIN_REQUEST",
            "data": {"user": {"id": "42", "username": "kit", "discriminator": "0", "avatar": "abc"}},
        }))
        .unwrap();
        assert_eq!(response.event(), Some(Event::ActivityJoinRequest));
        assert_eq!(response.user().user_id, "42");

        let (code, message) = error_details(Some(&serde_json::json!({"code": 4000, "message": "bad"})));
        assert_eq!((code, message.as_str()), (4000, "bad"));
        assert_eq!(error_details(None).0, -1);
    }

    #[test]
    fn config_validation() {
        assert!(IpcConfig::default().validate().is_ok());
        assert!(IpcConfig::fast_connect().validate().is_ok());
        assert!(IpcConfig::new().with_max_sockets(0).validate().is_err());
        assert!(IpcConfig::new().with_max_payload_size(10).validate().is_err());
        assert!(IpcConfig::new()
            .with_reconnect(BackoffConfig::new(0, 0, 2.0))
            .validate()
            .is_err());
    }
}
