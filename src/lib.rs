//! # editor-presence
//!
//! Discord Rich Presence for editor tooling.
//!
//! The crate is layered:
//!
//! - [`RichPresence`] builds a bounded presence record and stages its strings
//!   in native buffers borrowed from a [`NativeBufferPool`].
//! - [`RpcClient`] owns the single Discord connection through a [`NativeRpc`]
//!   implementation and relays async events via a [`CallbackDispatcher`].
//! - [`PresenceController`] is ticked from the host's update loop and turns
//!   editor activity into presence updates, with failure cooldown.
//!
//! ## Example
//!
//! ```no_run
//! use editor_presence::{
//!     IpcRpc, ManualDetector, PresenceController, PresenceSettings, RpcConfig,
//! };
//!
//! # fn main() -> editor_presence::Result {
//! let settings = PresenceSettings::load("presence.json")?;
//! let mut controller = PresenceController::new(
//!     IpcRpc::new(),
//!     ManualDetector::default(),
//!     settings,
//!     RpcConfig::default(),
//! )?;
//! controller.reporter().on_error(|msg| eprintln!("presence: {msg}"));
//!
//! loop {
//!     controller.tick();
//!     std::thread::sleep(std::time::Duration::from_millis(250));
//! }
//! # }
//! ```

#[doc(hidden)]
pub mod macros;

pub mod activity;
pub mod backoff;
pub mod client;
pub mod clock;
pub mod config;
pub mod controller;
pub mod dispatch;
#[cfg(feature = "tokio-runtime")]
pub mod driver;
pub mod error;
pub mod ipc;
pub mod native;
pub mod pool;
pub mod presence;
pub mod report;
pub mod settings;

// Re-export the main public API
pub use activity::{ActivityDetector, ActivityState, ManualDetector, PresenceContext};
pub use client::{ConnectionState, RpcClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RpcConfig;
pub use controller::{PlayModeChange, PresenceController, StateEvent};
pub use dispatch::{CallbackDispatcher, DiscordUser, EventHandlers};
#[cfg(feature = "tokio-runtime")]
pub use driver::spawn_tokio_driver;
pub use error::{ErrorCategory, PresenceError, Result};
pub use ipc::{IpcConfig, IpcRpc};
#[cfg(feature = "native-link")]
pub use native::LinkedRpc;
pub use native::{LoopbackHandle, LoopbackRpc, NativeRpc, Reply};
pub use pool::{NativeBuffer, NativeBufferPool};
pub use presence::{RichPresence, TextField};
pub use report::Reporter;
pub use settings::PresenceSettings;
