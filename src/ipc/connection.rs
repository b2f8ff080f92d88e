use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;
use std::io::{Read, Write};

#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::PathBuf;

#[cfg(windows)]
use std::fs::{File, OpenOptions};

use crate::debug_println;
use crate::error::{PresenceError, Result};
use crate::ipc::protocol::{constants, IpcConfig, Opcode};

/// Encode one frame: opcode, payload length, JSON payload
pub fn encode_frame(opcode: Opcode, payload: &Value) -> Result<Bytes> {
    let raw = serde_json::to_vec(payload)?;
    let length = u32::try_from(raw.len()).map_err(|_| PresenceError::PayloadTooLarge {
        size: u32::MAX,
        limit: u32::MAX,
    })?;

    let mut buffer = BytesMut::with_capacity(constants::IPC_HEADER_SIZE + raw.len());
    buffer.put_u32_le(opcode.into());
    buffer.put_u32_le(length);
    buffer.extend_from_slice(&raw);
    Ok(buffer.freeze())
}

/// Read one frame, refusing payloads larger than `max_payload_size`
pub fn read_frame<R: Read>(reader: &mut R, max_payload_size: u32) -> Result<(Opcode, Value)> {
    let mut header = [0u8; constants::IPC_HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .map_err(|_| PresenceError::SocketClosed)?;

    let mut header_reader = &header[..];
    let opcode_raw = header_reader.read_u32::<LittleEndian>()?;
    let length = header_reader.read_u32::<LittleEndian>()?;

    let opcode = Opcode::try_from(opcode_raw)?;
    if length > max_payload_size {
        return Err(PresenceError::PayloadTooLarge {
            size: length,
            limit: max_payload_size,
        });
    }

    let mut data = vec![0u8; length as usize];
    reader
        .read_exact(&mut data)
        .map_err(|_| PresenceError::SocketClosed)?;

    let value: Value = if data.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&data)
            .map_err(|err| PresenceError::InvalidResponse(err.to_string()))?
    };
    Ok((opcode, value))
}

/// Write half of a connection to the local Discord client
#[cfg(unix)]
pub struct IpcConnection {
    stream: UnixStream,
}

#[cfg(windows)]
pub struct IpcConnection {
    pipe: File,
}

/// Read half, handed to the reader thread
#[cfg(unix)]
pub type FrameSource = Box<dyn Read + Send>;

/// Read half of a Windows pipe, polled without blocking
#[cfg(windows)]
pub struct PipeReader {
    pipe: File,
    max_payload_size: u32,
}

#[cfg(windows)]
impl PipeReader {
    /// Read the next frame only once all of it is buffered in the pipe
    pub fn try_read_frame(&mut self) -> Result<Option<(Opcode, Value)>> {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::System::Pipes::PeekNamedPipe;

        let mut header = [0u8; constants::IPC_HEADER_SIZE];
        let mut peeked = 0u32;
        let mut available = 0u32;
        // SAFETY: the handle is owned by `self.pipe` and the out pointers are
        // valid for the duration of the call
        let ok = unsafe {
            PeekNamedPipe(
                self.pipe.as_raw_handle(),
                header.as_mut_ptr().cast(),
                header.len() as u32,
                &mut peeked,
                &mut available,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(PresenceError::SocketClosed);
        }
        let peeked = &header[..(peeked as usize).min(header.len())];
        if !frame_buffered(peeked, available, self.max_payload_size) {
            return Ok(None);
        }
        read_frame(&mut self.pipe, self.max_payload_size).map(Some)
    }
}

/// Whether `read_frame` can run without blocking, given the first bytes of
/// the stream and the number of bytes available
///
/// Oversized frames count as ready so `read_frame` rejects them instead of
/// waiting for bytes that never fit.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn frame_buffered(peeked: &[u8], available: u32, max_payload_size: u32) -> bool {
    let Some(header) = peeked.get(..constants::IPC_HEADER_SIZE) else {
        return false;
    };
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if length > max_payload_size {
        return true;
    }
    u64::from(available) >= constants::IPC_HEADER_SIZE as u64 + u64::from(length)
}

impl IpcConnection {
    /// Connect to the first Discord socket/pipe that accepts
    pub fn connect(config: &IpcConfig) -> Result<Self> {
        #[cfg(unix)]
        {
            let stream = Self::connect_to_discord_unix(config)?;
            Ok(Self { stream })
        }

        #[cfg(windows)]
        {
            let pipe = Self::connect_to_discord_windows(config)?;
            Ok(Self { pipe })
        }
    }

    #[cfg(unix)]
    fn socket_dirs(config: &IpcConfig) -> Vec<PathBuf> {
        if !config.search_dirs.is_empty() {
            return config.search_dirs.clone();
        }

        let mut roots: Vec<PathBuf> = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
            .iter()
            .filter_map(|key| std::env::var_os(key))
            .map(PathBuf::from)
            .collect();

        if roots.is_empty() {
            // SAFETY: getuid has no preconditions and cannot fail
            roots.push(PathBuf::from(format!("/run/user/{}", unsafe { libc::getuid() })));
        }
        roots.push(PathBuf::from("/tmp"));

        // Sandboxed Discord builds put the socket one level down
        let mut dirs = Vec::with_capacity(roots.len() * 3);
        for root in roots {
            dirs.push(root.join("app/com.discordapp.Discord"));
            dirs.push(root.join("snap.discord"));
            dirs.push(root);
        }
        dirs.dedup();
        dirs
    }

    #[cfg(unix)]
    fn connect_to_discord_unix(config: &IpcConfig) -> Result<UnixStream> {
        let mut last_error = None;

        for dir in Self::socket_dirs(config) {
            for i in 0..config.max_sockets {
                let socket_path = dir.join(format!("{}{}", constants::IPC_SOCKET_PREFIX, i));

                match UnixStream::connect(&socket_path) {
                    Ok(stream) => {
                        if let Err(err) = stream.set_nonblocking(false) {
                            last_error = Some(err);
                            continue;
                        }
                        debug_println!("Connected to Discord IPC at {}", socket_path.display());
                        return Ok(stream);
                    }
                    Err(err) => {
                        if err.kind() != std::io::ErrorKind::NotFound {
                            last_error = Some(err);
                        }
                    }
                }
            }
        }

        match last_error {
            Some(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(PresenceError::ConnectionFailed(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "Permission denied when connecting to Discord IPC socket. Check file permissions.",
                )))
            }
            Some(err) if err.kind() != std::io::ErrorKind::ConnectionRefused => {
                Err(PresenceError::ConnectionFailed(err))
            }
            _ => Err(PresenceError::NoValidSocket),
        }
    }

    #[cfg(windows)]
    fn connect_to_discord_windows(config: &IpcConfig) -> Result<File> {
        let mut last_error = None;

        for i in 0..config.max_sockets {
            let pipe_path = format!(r"\\?\pipe\{}{}", constants::IPC_SOCKET_PREFIX, i);

            match OpenOptions::new().read(true).write(true).open(&pipe_path) {
                Ok(pipe) => {
                    debug_println!("Connected to Discord IPC at {}", pipe_path);
                    return Ok(pipe);
                }
                Err(err) => {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        last_error = Some(err);
                    }
                }
            }
        }

        match last_error {
            Some(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(PresenceError::ConnectionFailed(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "Permission denied when connecting to Discord IPC pipe. Is Discord running with the right permissions?",
                )))
            }
            Some(err) => Err(PresenceError::ConnectionFailed(err)),
            None => Err(PresenceError::NoValidSocket),
        }
    }

    /// A second handle on the socket for the reader thread
    #[cfg(unix)]
    pub fn reader(&self) -> Result<FrameSource> {
        Ok(Box::new(self.stream.try_clone()?))
    }

    /// A second handle on the pipe, read only from the polling thread
    #[cfg(windows)]
    pub fn reader(&self, max_payload_size: u32) -> Result<PipeReader> {
        Ok(PipeReader {
            pipe: self.pipe.try_clone()?,
            max_payload_size,
        })
    }

    /// Send data with opcode
    pub fn send(&mut self, opcode: Opcode, payload: &Value) -> Result<()> {
        let frame = encode_frame(opcode, payload)?;
        debug_println!("-> {:?} {}", opcode, payload);

        #[cfg(unix)]
        {
            self.stream
                .write_all(&frame)
                .map_err(|_| PresenceError::SocketClosed)?;
        }

        #[cfg(windows)]
        {
            self.pipe
                .write_all(&frame)
                .map_err(|_| PresenceError::SocketClosed)?;
            self.pipe.flush()?;
        }

        Ok(())
    }

    /// Close the connection
    ///
    /// On unix this also wakes a reader blocked on the other handle.
    pub fn close(&mut self) {
        #[cfg(unix)]
        {
            let _ = self.stream.shutdown(std::net::Shutdown::Both);
        }

        #[cfg(windows)]
        {
            // the pipe closes when the last handle drops
        }
    }
}
