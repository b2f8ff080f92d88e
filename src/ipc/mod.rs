//! Built-in Discord IPC client
//!
//! Talks to the local Discord client over its unix socket or Windows named
//! pipe using the documented framing: a little-endian `u32` opcode, a
//! little-endian `u32` payload length, then a JSON payload.

mod backend;
pub mod connection;
pub mod protocol;

pub use backend::IpcRpc;
pub use protocol::{Command, Event, IpcConfig, Opcode};
