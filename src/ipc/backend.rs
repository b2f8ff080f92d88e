use std::collections::VecDeque;
#[cfg(unix)]
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::backoff::Backoff;
use crate::debug_println;
use crate::dispatch::{CallbackDispatcher, DiscordUser};
use crate::error::{PresenceError, Result};
#[cfg(windows)]
use crate::ipc::connection::PipeReader;
#[cfg(unix)]
use crate::ipc::connection::{read_frame, FrameSource};
use crate::ipc::connection::IpcConnection;
use crate::ipc::protocol::{
    error_details, ActivityPayload, Command, Event, HandshakePayload, IpcConfig, IpcMessage,
    IpcResponse, Opcode,
};
use crate::native::{NativeRpc, Reply};
use crate::presence::PresenceFrame;

type Inbound = Result<(Opcode, Value)>;

/// Events waiting for the next `run_callbacks`
#[derive(Debug)]
enum Pending {
    Ready(DiscordUser),
    Disconnected(i32, String),
    Errored(i32, String),
    JoinGame(String),
    SpectateGame(String),
    JoinRequest(DiscordUser),
}

/// How often a polled pipe is checked while waiting for the handshake reply
#[cfg(windows)]
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Source of inbound frames
///
/// Unix sockets are drained by a reader thread. A synchronous Windows pipe
/// serializes all I/O on its file object, so a blocked reader would hold up
/// every write; there the pipe is peeked from the caller's thread instead.
enum Inbox {
    #[cfg(unix)]
    Thread(Receiver<Inbound>),
    #[cfg(windows)]
    Polled(PipeReader),
}

impl Inbox {
    fn open(connection: &IpcConnection, max_payload_size: u32) -> Result<Self> {
        #[cfg(unix)]
        {
            spawn_reader(connection.reader()?, max_payload_size).map(Inbox::Thread)
        }

        #[cfg(windows)]
        {
            Ok(Inbox::Polled(connection.reader(max_payload_size)?))
        }
    }

    /// A complete frame if one is waiting, `None` otherwise
    fn try_next(&mut self) -> Option<Inbound> {
        match self {
            #[cfg(unix)]
            Inbox::Thread(rx) => match rx.try_recv() {
                Ok(frame) => Some(frame),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Err(PresenceError::SocketClosed)),
            },
            #[cfg(windows)]
            Inbox::Polled(reader) => reader.try_read_frame().transpose(),
        }
    }

    /// Wait for a frame until `deadline`, `None` on timeout
    fn next_before(&mut self, deadline: Instant) -> Option<Inbound> {
        match self {
            #[cfg(unix)]
            Inbox::Thread(rx) => {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(frame) => Some(frame),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => Some(Err(PresenceError::SocketClosed)),
                }
            }
            #[cfg(windows)]
            Inbox::Polled(reader) => loop {
                match reader.try_read_frame().transpose() {
                    Some(frame) => return Some(frame),
                    None if Instant::now() >= deadline => return None,
                    None => thread::sleep(POLL_INTERVAL),
                }
            },
        }
    }
}

struct Session {
    connection: IpcConnection,
    inbox: Inbox,
}

impl Session {
    fn send(&mut self, message: &IpcMessage) -> Result {
        self.connection.send(Opcode::Frame, &message.to_value()?)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.connection.close();
    }
}

/// [`NativeRpc`] speaking the local Discord IPC protocol directly
///
/// Behaves like the C library: `initialize` only records the application and
/// the connection is made lazily from `run_callbacks`, with backoff between
/// attempts. Presence set while disconnected is sent once connected. Reading
/// never blocks `run_callbacks`: frames arrive from a reader thread on unix
/// and from a non-blocking peek of the pipe on Windows.
pub struct IpcRpc {
    config: IpcConfig,
    app_id: Option<String>,
    dispatcher: Option<Arc<CallbackDispatcher>>,
    session: Option<Session>,
    backoff: Backoff,
    next_attempt: Option<Instant>,
    activity: Option<Value>,
    events: VecDeque<Pending>,
}

impl IpcRpc {
    pub fn new() -> Self {
        Self::with_config(IpcConfig::default())
    }

    pub fn with_config(config: IpcConfig) -> Self {
        Self {
            backoff: Backoff::new(config.reconnect.clone()),
            config,
            app_id: None,
            dispatcher: None,
            session: None,
            next_attempt: None,
            activity: None,
            events: VecDeque::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn connect(&mut self, app_id: &str) -> Result<Session> {
        let connection = IpcConnection::connect(&self.config)?;
        let inbox = Inbox::open(&connection, self.config.max_payload_size)?;
        // from here on dropping the session also stops the reader
        let mut session = Session { connection, inbox };

        let handshake = HandshakePayload {
            v: self.config.ipc_version,
            client_id: app_id.to_string(),
        };
        session
            .connection
            .send(Opcode::Handshake, &serde_json::to_value(&handshake)?)?;

        let user = self.await_ready(&mut session)?;

        for evt in Event::SUBSCRIPTIONS {
            session.send(&IpcMessage::subscribe(evt))?;
        }
        if self.activity.is_some() {
            session.send(&IpcMessage::set_activity(self.activity.clone()))?;
        }
        // only a fully set up session counts as ready
        self.events.push_back(Pending::Ready(user));
        Ok(session)
    }

    fn await_ready(&self, session: &mut Session) -> Result<DiscordUser> {
        let deadline = Instant::now() + Duration::from_millis(self.config.connect_timeout_ms);

        loop {
            let Some(frame) = session.inbox.next_before(deadline) else {
                return Err(PresenceError::HandshakeFailed(
                    "timed out waiting for READY".to_string(),
                ));
            };
            let (opcode, value) = frame?;

            match opcode {
                Opcode::Close => {
                    let (code, message) = error_details(Some(&value));
                    return Err(PresenceError::HandshakeFailed(format!("{code}: {message}")));
                }
                Opcode::Frame => {
                    let response = IpcResponse::from_value(value)?;
                    match response.event() {
                        Some(Event::Ready) => return Ok(response.user()),
                        Some(Event::Error) => {
                            let (code, message) = response.error_details();
                            return Err(PresenceError::HandshakeFailed(format!(
                                "{code}: {message}"
                            )));
                        }
                        _ => continue,
                    }
                }
                _ => continue,
            }
        }
    }

    fn try_connect(&mut self) {
        let Some(app_id) = self.app_id.clone() else {
            return;
        };
        if self
            .next_attempt
            .is_some_and(|next| Instant::now() < next)
        {
            return;
        }

        match self.connect(&app_id) {
            Ok(session) => {
                log::debug!(target: "editor_presence", "Discord IPC connected");
                self.session = Some(session);
                self.backoff.reset();
                self.next_attempt = None;
            }
            Err(err) => {
                let delay = self.backoff.next_delay();
                log::debug!(
                    target: "editor_presence",
                    "Discord IPC connect failed ({err}), next attempt in {delay:?}"
                );
                self.next_attempt = Some(Instant::now() + delay);
            }
        }
    }

    fn drop_session(&mut self, code: i32, message: String) {
        self.session = None;
        self.events.push_back(Pending::Disconnected(code, message));
        self.next_attempt = Some(Instant::now() + self.backoff.next_delay());
    }

    /// Handle every frame that is already waiting
    fn drain_inbox(&mut self) -> Result {
        loop {
            let Some(session) = self.session.as_mut() else {
                return Ok(());
            };
            let Some(frame) = session.inbox.try_next() else {
                return Ok(());
            };

            match frame {
                Ok((Opcode::Frame, value)) => self.handle_frame(value),
                Ok((Opcode::Ping, value)) => session.connection.send(Opcode::Pong, &value)?,
                Ok((Opcode::Close, value)) => {
                    let (code, message) = error_details(Some(&value));
                    self.drop_session(code, message);
                }
                Ok(_) => {}
                Err(err) => {
                    self.drop_session(-1, err.to_string());
                }
            }
        }
    }

    fn handle_frame(&mut self, value: Value) {
        debug_println!("<- {}", value);
        let response = match IpcResponse::from_value(value) {
            Ok(response) => response,
            Err(err) => {
                log::warn!(target: "editor_presence", "Ignoring malformed IPC frame: {err}");
                return;
            }
        };

        let pending = match response.event() {
            Some(Event::Error) => {
                let (code, message) = response.error_details();
                Pending::Errored(code, message)
            }
            Some(Event::ActivityJoin) => Pending::JoinGame(response.secret()),
            Some(Event::ActivitySpectate) => Pending::SpectateGame(response.secret()),
            Some(Event::ActivityJoinRequest) => Pending::JoinRequest(response.user()),
            Some(Event::Ready) | None => return,
        };
        self.events.push_back(pending);
    }

    fn send(&mut self, message: &IpcMessage) -> Result {
        let Some(session) = self.session.as_mut() else {
            return Err(PresenceError::NoValidSocket);
        };
        if let Err(err) = session.send(message) {
            self.session = None;
            self.next_attempt = Some(Instant::now() + self.backoff.next_delay());
            return Err(err);
        }
        Ok(())
    }
}

impl Default for IpcRpc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn spawn_reader(mut source: FrameSource, max_payload_size: u32) -> Result<Receiver<Inbound>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("discord-ipc-reader".to_string())
        .spawn(move || loop {
            let frame = read_frame(&mut source, max_payload_size);
            let closed = frame.is_err();
            if tx.send(frame).is_err() || closed {
                break;
            }
        })?;
    Ok(rx)
}

fn deliver(dispatcher: &CallbackDispatcher, event: Pending) {
    match event {
        Pending::Ready(user) => dispatcher.on_ready(&user),
        Pending::Disconnected(code, message) => dispatcher.on_disconnected(code, &message),
        Pending::Errored(code, message) => dispatcher.on_errored(code, &message),
        Pending::JoinGame(secret) => dispatcher.on_join_game(&secret),
        Pending::SpectateGame(secret) => dispatcher.on_spectate_game(&secret),
        Pending::JoinRequest(user) => dispatcher.on_join_request(&user),
    }
}

impl NativeRpc for IpcRpc {
    fn initialize(
        &mut self,
        app_id: &str,
        dispatcher: Arc<CallbackDispatcher>,
        auto_register: bool,
        _steam_id: Option<&str>,
    ) -> Result {
        self.config.validate()?;
        if auto_register {
            log::debug!(
                target: "editor_presence",
                "URL protocol registration is not performed by the IPC client"
            );
        }

        self.app_id = Some(app_id.to_string());
        self.dispatcher = Some(dispatcher);
        self.backoff.reset();
        self.next_attempt = None;
        self.try_connect();
        Ok(())
    }

    fn shutdown(&mut self) -> Result {
        if let Some(mut session) = self.session.take() {
            let _ = session.connection.send(Opcode::Close, &Value::Object(Default::default()));
        }
        self.app_id = None;
        self.dispatcher = None;
        self.activity = None;
        self.events.clear();
        self.next_attempt = None;
        Ok(())
    }

    fn run_callbacks(&mut self) -> Result {
        if self.session.is_none() {
            self.try_connect();
        }
        let drained = self.drain_inbox();

        if let Some(dispatcher) = self.dispatcher.clone() {
            while let Some(event) = self.events.pop_front() {
                deliver(&dispatcher, event);
            }
        }
        drained
    }

    fn update_presence(&mut self, presence: &PresenceFrame<'_>) -> Result {
        let activity = serde_json::to_value(ActivityPayload::from_frame(presence))?;
        self.activity = Some(activity.clone());

        if self.session.is_none() {
            log::debug!(
                target: "editor_presence",
                "Discord not connected, presence will be sent on connect"
            );
            return Ok(());
        }
        self.send(&IpcMessage::set_activity(Some(activity)))
    }

    fn clear_presence(&mut self) -> Result {
        self.activity = None;
        if self.session.is_none() {
            return Ok(());
        }
        self.send(&IpcMessage::set_activity(None))
    }

    fn respond(&mut self, user_id: &str, reply: Reply) -> Result {
        let cmd = match reply {
            Reply::Yes => Command::SendActivityJoinInvite,
            Reply::No | Reply::Ignore => Command::CloseActivityJoinRequest,
        };
        self.send(&IpcMessage::new(cmd, serde_json::json!({ "user_id": user_id })))
    }
}
