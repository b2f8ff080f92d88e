use editor_presence::ipc::connection::{encode_frame, read_frame};
use editor_presence::ipc::{Command, Event, IpcConfig, Opcode};
use serde_json::json;

#[test]
fn ipc_config_validation_rejects_invalid_values() {
    assert!(IpcConfig::default().validate().is_ok());
    assert!(IpcConfig::fast_connect().validate().is_ok());
    assert!(IpcConfig::default().with_max_sockets(0).validate().is_err());
    assert!(IpcConfig::default()
        .with_max_payload_size(200 * 1024 * 1024)
        .validate()
        .is_err());
}

#[test]
fn commands_and_events_use_wire_names() {
    assert_eq!(
        serde_json::to_string(&Command::SendActivityJoinInvite).unwrap(),
        "\"SEND_ACTIVITY_JOIN_INVITE\""
    );
    assert_eq!(
        serde_json::to_string(&Event::ActivityJoinRequest).unwrap(),
        "\"ACTIVITY_JOIN_REQUEST\""
    );
}

#[test]
fn frame_header_is_little_endian() {
    let frame = encode_frame(Opcode::Frame, &json!({ "cmd": "DISPATCH" })).unwrap();
    assert_eq!(&frame[..4], &[1, 0, 0, 0]);
    let length = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;
    assert_eq!(length, frame.len() - 8);

    let (opcode, value) = read_frame(&mut &frame[..], 1024).unwrap();
    assert_eq!(opcode, Opcode::Frame);
    assert_eq!(value["cmd"], "DISPATCH");
}

#[cfg(unix)]
mod fake_discord {
    use std::io::Write;
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{self, Receiver};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use editor_presence::ipc::connection::{encode_frame, read_frame};
    use editor_presence::ipc::{IpcConfig, Opcode};
    use editor_presence::{
        DiscordUser, EventHandlers, IpcRpc, PresenceError, Reply, RichPresence, RpcClient,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;

    const APP_ID: &str = "956193080111923300";
    const WAIT: Duration = Duration::from_secs(5);

    /// A scripted stand-in for the Discord client's IPC socket
    struct FakeDiscord {
        _dir: TempDir,
        config: IpcConfig,
        frames: Receiver<(Opcode, Value)>,
        writer: Receiver<UnixStream>,
    }

    impl FakeDiscord {
        fn start(answer_handshake: Value, handshake_opcode: Opcode) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let listener = UnixListener::bind(dir.path().join("discord-ipc-0")).unwrap();
            let config = IpcConfig::new()
                .with_search_dir(dir.path())
                .with_max_sockets(1)
                .with_connect_timeout(2_000);

            let (frame_tx, frames) = mpsc::channel();
            let (writer_tx, writer) = mpsc::channel();
            thread::spawn(move || {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let Ok(handshake) = read_frame(&mut stream, 1 << 20) else {
                    return;
                };
                let _ = frame_tx.send(handshake);
                let reply = encode_frame(handshake_opcode, &answer_handshake).unwrap();
                if stream.write_all(&reply).is_err() {
                    return;
                }
                let _ = writer_tx.send(stream.try_clone().unwrap());

                while let Ok(frame) = read_frame(&mut stream, 1 << 20) {
                    if frame_tx.send(frame).is_err() {
                        break;
                    }
                }
            });

            Self {
                _dir: dir,
                config,
                frames,
                writer,
            }
        }

        fn ready() -> Self {
            Self::start(
                json!({
                    "cmd": "DISPATCH",
                    "evt": "READY",
                    "data": {
                        "v": 1,
                        "user": {
                            "id": "80351110224678912",
                            "username": "kit",
                            "discriminator": "0",
                            "avatar": null
                        }
                    }
                }),
                Opcode::Frame,
            )
        }

        fn next_frame(&self) -> (Opcode, Value) {
            self.frames.recv_timeout(WAIT).expect("no frame from client")
        }

        fn push(&self, opcode: Opcode, payload: Value) {
            let mut stream = self.writer.recv_timeout(WAIT).expect("client never connected");
            stream
                .write_all(&encode_frame(opcode, &payload).unwrap())
                .unwrap();
        }
    }

    /// Pump callbacks until `done` holds or the wait runs out
    fn pump_until(client: &mut RpcClient<IpcRpc>, done: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            client.run_callbacks();
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn handshake_subscribes_and_reports_ready() {
        let discord = FakeDiscord::ready();
        let ready = Arc::new(Mutex::new(None::<DiscordUser>));
        let sink = Arc::clone(&ready);

        let mut client = RpcClient::new(IpcRpc::with_config(discord.config.clone()));
        let handlers =
            EventHandlers::new().on_ready(move |user| *sink.lock().unwrap() = Some(user.clone()));
        client.initialize(APP_ID, handlers, false, None).unwrap();

        let (opcode, handshake) = discord.next_frame();
        assert_eq!(opcode, Opcode::Handshake);
        assert_eq!(handshake["v"], 1);
        assert_eq!(handshake["client_id"], APP_ID);

        let subscribed: Vec<String> = (0..3)
            .map(|_| {
                let (opcode, frame) = discord.next_frame();
                assert_eq!(opcode, Opcode::Frame);
                assert_eq!(frame["cmd"], "SUBSCRIBE");
                frame["evt"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            subscribed,
            ["ACTIVITY_JOIN", "ACTIVITY_SPECTATE", "ACTIVITY_JOIN_REQUEST"]
        );

        assert!(pump_until(&mut client, || ready.lock().unwrap().is_some()));
        let user = ready.lock().unwrap().clone().unwrap();
        assert_eq!(user.username, "kit");
        assert_eq!(user.user_id, "80351110224678912");
        assert_eq!(user.avatar, "");
    }

    #[test]
    fn presence_is_sent_as_set_activity() {
        let discord = FakeDiscord::ready();
        let mut client = RpcClient::new(IpcRpc::with_config(discord.config.clone()));
        client
            .initialize(APP_ID, EventHandlers::new(), false, None)
            .unwrap();
        for _ in 0..4 {
            discord.next_frame();
        }

        let mut presence = RichPresence::new();
        presence
            .set_state("Currently in Play Mode")
            .set_details("Avatar: Kitsune")
            .set_large_image("gold")
            .set_large_text("Shrine")
            .set_start_timestamp(1_700_000_000);
        client.update_presence(&mut presence).unwrap();

        let (opcode, frame) = discord.next_frame();
        assert_eq!(opcode, Opcode::Frame);
        assert_eq!(frame["cmd"], "SET_ACTIVITY");
        assert_eq!(frame["args"]["pid"], std::process::id());
        let activity = &frame["args"]["activity"];
        assert_eq!(activity["state"], "Currently in Play Mode");
        assert_eq!(activity["details"], "Avatar: Kitsune");
        assert_eq!(activity["assets"]["large_image"], "gold");
        assert_eq!(activity["assets"]["large_text"], "Shrine");
        assert_eq!(activity["timestamps"]["start"], 1_700_000_000);
        assert!(activity.get("party").is_none());

        client.clear_presence().unwrap();
        let (_, frame) = discord.next_frame();
        assert_eq!(frame["cmd"], "SET_ACTIVITY");
        assert!(frame["args"]["activity"].is_null());
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let discord = FakeDiscord::ready();
        let mut client = RpcClient::new(IpcRpc::with_config(discord.config.clone()));
        client
            .initialize(APP_ID, EventHandlers::new(), false, None)
            .unwrap();
        for _ in 0..4 {
            discord.next_frame();
        }

        discord.push(Opcode::Ping, json!({ "n": 7 }));

        let deadline = Instant::now() + WAIT;
        let pong = loop {
            assert!(Instant::now() < deadline, "no pong");
            client.run_callbacks();
            if let Ok(frame) = discord.frames.recv_timeout(Duration::from_millis(20)) {
                break frame;
            }
        };
        assert_eq!(pong.0, Opcode::Pong);
        assert_eq!(pong.1["n"], 7);
    }

    #[test]
    fn join_request_round_trip() {
        let discord = FakeDiscord::ready();
        let requested = Arc::new(Mutex::new(None::<String>));
        let sink = Arc::clone(&requested);

        let mut client = RpcClient::new(IpcRpc::with_config(discord.config.clone()));
        let handlers = EventHandlers::new()
            .on_join_request(move |user| *sink.lock().unwrap() = Some(user.user_id.clone()));
        client.initialize(APP_ID, handlers, false, None).unwrap();
        for _ in 0..4 {
            discord.next_frame();
        }

        discord.push(
            Opcode::Frame,
            json!({
                "cmd": "DISPATCH",
                "evt": "ACTIVITY_JOIN_REQUEST",
                "data": { "user": { "id": "4242", "username": "fox" } }
            }),
        );
        assert!(pump_until(&mut client, || requested.lock().unwrap().is_some()));

        let user_id = requested.lock().unwrap().clone().unwrap();
        client.respond(&user_id, Reply::Yes).unwrap();
        let (_, frame) = discord.next_frame();
        assert_eq!(frame["cmd"], "SEND_ACTIVITY_JOIN_INVITE");
        assert_eq!(frame["args"]["user_id"], "4242");

        client.respond(&user_id, Reply::Ignore).unwrap();
        let (_, frame) = discord.next_frame();
        assert_eq!(frame["cmd"], "CLOSE_ACTIVITY_JOIN_REQUEST");
    }

    #[test]
    fn close_frame_reports_disconnect() {
        let discord = FakeDiscord::ready();
        let closed = Arc::new(Mutex::new(None::<(i32, String)>));
        let sink = Arc::clone(&closed);

        let mut client = RpcClient::new(IpcRpc::with_config(discord.config.clone()));
        let handlers = EventHandlers::new().on_disconnected(move |code, message| {
            *sink.lock().unwrap() = Some((code, message.to_string()))
        });
        client.initialize(APP_ID, handlers, false, None).unwrap();
        for _ in 0..4 {
            discord.next_frame();
        }

        discord.push(Opcode::Close, json!({ "code": 4000, "message": "Invalid Client ID" }));
        assert!(pump_until(&mut client, || closed.lock().unwrap().is_some()));
        assert_eq!(
            closed.lock().unwrap().clone(),
            Some((4000, "Invalid Client ID".to_string()))
        );

        // still initialized; the next update waits for the reconnect
        let mut presence = RichPresence::new();
        presence.set_state("Currently in Edit Mode");
        assert!(client.update_presence(&mut presence).is_ok());
    }

    #[test]
    fn rejected_handshake_leaves_connection_pending() {
        let discord = FakeDiscord::start(
            json!({ "code": 4000, "message": "Invalid Client ID" }),
            Opcode::Close,
        );
        let connected = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&connected);

        let mut client = RpcClient::new(IpcRpc::with_config(discord.config.clone()));
        let handlers = EventHandlers::new().on_ready(move |_| flag.store(true, Ordering::SeqCst));
        client.initialize(APP_ID, handlers, false, None).unwrap();
        client.run_callbacks();

        assert_eq!(discord.next_frame().0, Opcode::Handshake);
        assert!(!connected.load(Ordering::SeqCst));
        assert!(client.is_initialized());
        assert!(matches!(
            client.respond("4242", Reply::Yes),
            Err(PresenceError::NoValidSocket)
        ));
    }
}
