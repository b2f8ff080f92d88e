//! The six-call contract with the Discord RPC implementation
//!
//! [`RpcClient`](crate::RpcClient) only ever talks to a [`NativeRpc`]. Three
//! implementations ship with the crate:
//!
//! - [`IpcRpc`](crate::ipc::IpcRpc): speaks the local Discord IPC socket/pipe
//!   protocol directly (default).
//! - `LinkedRpc` (feature `native-link`): the `discord-rpc` C library.
//! - [`LoopbackRpc`]: an in-process double that records calls.

use std::sync::Arc;

use crate::dispatch::CallbackDispatcher;
use crate::error::Result;
use crate::presence::PresenceFrame;

#[cfg(feature = "native-link")]
mod ffi;
mod loopback;

#[cfg(feature = "native-link")]
pub use ffi::LinkedRpc;
pub use loopback::{LoopbackCall, LoopbackHandle, LoopbackRpc, PresenceSnapshot};

/// Answer to an incoming join request
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    No = 0,
    Yes = 1,
    Ignore = 2,
}

impl From<Reply> for i32 {
    fn from(reply: Reply) -> Self {
        reply as i32
    }
}

/// Native Discord RPC entry points
///
/// Implementations report async events (ready, disconnect, errors, join
/// traffic) through the dispatcher handed to [`initialize`](Self::initialize),
/// from whatever thread they like.
pub trait NativeRpc: Send {
    fn initialize(
        &mut self,
        app_id: &str,
        dispatcher: Arc<CallbackDispatcher>,
        auto_register: bool,
        steam_id: Option<&str>,
    ) -> Result;

    fn shutdown(&mut self) -> Result;

    /// Deliver queued events; must return promptly
    fn run_callbacks(&mut self) -> Result;

    fn update_presence(&mut self, presence: &PresenceFrame<'_>) -> Result;

    fn clear_presence(&mut self) -> Result;

    fn respond(&mut self, user_id: &str, reply: Reply) -> Result;
}

impl<N: NativeRpc + ?Sized> NativeRpc for Box<N> {
    fn initialize(
        &mut self,
        app_id: &str,
        dispatcher: Arc<CallbackDispatcher>,
        auto_register: bool,
        steam_id: Option<&str>,
    ) -> Result {
        (**self).initialize(app_id, dispatcher, auto_register, steam_id)
    }

    fn shutdown(&mut self) -> Result {
        (**self).shutdown()
    }

    fn run_callbacks(&mut self) -> Result {
        (**self).run_callbacks()
    }

    fn update_presence(&mut self, presence: &PresenceFrame<'_>) -> Result {
        (**self).update_presence(presence)
    }

    fn clear_presence(&mut self) -> Result {
        (**self).clear_presence()
    }

    fn respond(&mut self, user_id: &str, reply: Reply) -> Result {
        (**self).respond(user_id, reply)
    }
}
