//! Host side of a single plugin connection.

use crossbeam::channel;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::protocol::{
    Capability, ContentPayload, Handshake, PROTOCOL_ENV, PipelineDecl, Request, Response,
    WireAsset, read_frame, write_frame,
};
use super::{PluginConfig, PluginError};
use crate::debug;
use crate::scheduler::CancelToken;

/// How long a plugin gets to exit after `shutdown` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Spawn attempts while the executable is still open for writing elsewhere.
const SPAWN_ATTEMPTS: u32 = 5;

type BoxedReader = Box<dyn Read + Send>;
type BoxedWriter = Box<dyn Write + Send>;

/// Request side of a connection. Responses arrive from a reader thread,
/// so a wait can be bounded by a timeout and interrupted by cancellation.
struct Channel {
    writer: BufWriter<BoxedWriter>,
    responses: channel::Receiver<io::Result<Response>>,
}

/// A connected plugin.
///
/// Calls are serialized by a mutex, so one slow plugin never interleaves
/// frames. A call that fails mid-exchange closes the connection, since the
/// stream can no longer be trusted. Dropping the client shuts the plugin down.
pub struct PluginClient {
    name: String,
    path: PathBuf,
    capabilities: FxHashSet<Capability>,
    channel: Mutex<Option<Channel>>,
    child: Mutex<Option<Child>>,
    call_timeout: Duration,
    cancel: CancelToken,
}

impl std::fmt::Debug for PluginClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginClient")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl PluginClient {
    /// Start the executable at `path` and perform the handshake.
    ///
    /// The child is killed if the handshake fails.
    pub fn spawn(path: &Path, config: &PluginConfig) -> Result<Self, PluginError> {
        let mut command = Command::new(path);
        command
            .env(&config.cookie_key, &config.cookie_value)
            .env(PROTOCOL_ENV, config.protocol_version.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = spawn_retrying(&mut command).map_err(|source| PluginError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;

        let pipes = child.stdout.take().zip(child.stdin.take());
        let connected = match pipes {
            Some((stdout, stdin)) => Self::connect(path, Box::new(stdout), Box::new(stdin), config),
            None => Err(PluginError::Handshake {
                plugin: path.display().to_string(),
                reason: "stdio pipes unavailable".into(),
            }),
        };

        match connected {
            Ok(client) => {
                *client.child.lock() = Some(child);
                Ok(client)
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(e)
            }
        }
    }

    /// Perform the handshake over arbitrary streams.
    pub fn connect(
        path: &Path,
        reader: BoxedReader,
        writer: BoxedWriter,
        config: &PluginConfig,
    ) -> Result<Self, PluginError> {
        let label = path.display().to_string();
        let (hello, reader) = read_handshake(&label, reader, config.handshake_timeout)?;

        if hello.protocol_version != config.protocol_version {
            return Err(PluginError::Handshake {
                plugin: label,
                reason: format!(
                    "protocol version {} (expected {})",
                    hello.protocol_version, config.protocol_version
                ),
            });
        }
        if hello.token != config.cookie_value {
            return Err(PluginError::Handshake {
                plugin: label,
                reason: "magic cookie mismatch".into(),
            });
        }

        let name = if hello.name.is_empty() {
            path.file_stem()
                .map_or_else(|| label.clone(), |s| s.to_string_lossy().into_owned())
        } else {
            hello.name
        };
        debug!("plugin"; "connected `{name}` ({:?})", hello.capabilities);
        let responses = read_responses(&name, reader)?;

        Ok(Self {
            name,
            path: path.to_path_buf(),
            capabilities: hello.capabilities.into_iter().collect(),
            channel: Mutex::new(Some(Channel {
                writer: BufWriter::new(writer),
                responses,
            })),
            child: Mutex::new(None),
            call_timeout: config.call_timeout,
            cancel: config.cancel.clone(),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Send one request and wait for its response.
    ///
    /// The wait ends early on timeout or cancellation; either way, like an
    /// I/O failure, the connection is closed and later calls get `Closed`.
    pub fn call(&self, request: &Request) -> Result<Response, PluginError> {
        let mut guard = self.channel.lock();
        let channel = guard.as_mut().ok_or_else(|| PluginError::Closed {
            plugin: self.name.clone(),
        })?;

        let result = self.exchange(channel, request);
        if result.is_err() {
            *guard = None;
        }
        result
    }

    fn exchange(&self, channel: &mut Channel, request: &Request) -> Result<Response, PluginError> {
        write_frame(&mut channel.writer, request)
            .and_then(|()| channel.writer.flush())
            .map_err(|source| self.io_error(source))?;

        crossbeam::select! {
            recv(channel.responses) -> frame => match frame {
                Ok(frame) => frame.map_err(|source| self.io_error(source)),
                Err(_) => Err(self.io_error(io::ErrorKind::UnexpectedEof.into())),
            },
            recv(self.cancel.receiver()) -> _ => Err(PluginError::Canceled {
                plugin: self.name.clone(),
            }),
            default(self.call_timeout) => Err(PluginError::Timeout {
                plugin: self.name.clone(),
                timeout: self.call_timeout,
            }),
        }
    }

    fn io_error(&self, source: io::Error) -> PluginError {
        PluginError::Io {
            plugin: self.name.clone(),
            source,
        }
    }

    /// Run a hook that returns nothing. `unimplemented` counts as success.
    pub fn notify(&self, hook: Capability, request: &Request) -> Result<(), PluginError> {
        match self.call(request)? {
            Response::Ok | Response::Unimplemented => Ok(()),
            other => Err(self.unexpected(hook, other)),
        }
    }

    /// Run a hook that may rewrite a byte buffer.
    ///
    /// `unimplemented` (or a bare `ok`) hands the input back untouched.
    pub fn transform(&self, hook: Capability, request: Request) -> Result<Vec<u8>, PluginError> {
        match self.call(&request)? {
            Response::Bytes(bytes) => Ok(bytes),
            Response::Ok | Response::Unimplemented => Ok(request.into_content()),
            other => Err(self.unexpected(hook, other)),
        }
    }

    pub fn config_loaded(&self, config: Vec<u8>) -> Result<Vec<u8>, PluginError> {
        self.transform(Capability::ConfigLoaded, Request::ConfigLoaded { config })
    }

    /// Per-asset content hook.
    pub fn content_hook(
        &self,
        hook: Capability,
        path: &str,
        content: Vec<u8>,
    ) -> Result<Vec<u8>, PluginError> {
        let payload = ContentPayload {
            path: path.to_owned(),
            content,
        };
        match Request::content(hook, payload) {
            Some(request) => self.transform(hook, request),
            None => Err(PluginError::Protocol {
                plugin: self.name.clone(),
                message: format!("{} does not carry content", hook.hook_name()),
            }),
        }
    }

    pub fn register_pipelines(&self) -> Result<Vec<PipelineDecl>, PluginError> {
        match self.call(&Request::RegisterPipelines)? {
            Response::Pipelines(decls) => Ok(decls),
            Response::Ok | Response::Unimplemented => Ok(Vec::new()),
            other => Err(self.unexpected(Capability::Pipelines, other)),
        }
    }

    pub fn process_asset(&self, asset: WireAsset) -> Result<WireAsset, PluginError> {
        let pipeline = asset.pipeline.clone();
        match self.call(&Request::ProcessAsset(asset))? {
            Response::Asset(asset) => Ok(asset),
            Response::Error(message) => Err(PluginError::Remote {
                plugin: self.name.clone(),
                hook: format!("pipeline `{pipeline}`"),
                message,
            }),
            other => Err(PluginError::Protocol {
                plugin: self.name.clone(),
                message: format!("pipeline `{pipeline}` answered {other:?}"),
            }),
        }
    }

    /// Ask the plugin to exit, then make sure it does.
    ///
    /// Idempotent; also run on drop.
    pub fn shutdown(&self) {
        if let Some(mut channel) = self.channel.lock().take() {
            let _ = write_frame(&mut channel.writer, &Request::Shutdown)
                .and_then(|()| channel.writer.flush());
            // Dropping the channel closes the plugin's stdin.
        }

        let Some(mut child) = self.child.lock().take() else {
            return;
        };
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                _ => break,
            }
        }
        debug!("plugin"; "killing `{}` after shutdown grace period", self.name);
        let _ = child.kill();
        let _ = child.wait();
    }

    fn unexpected(&self, hook: Capability, response: Response) -> PluginError {
        match response {
            Response::Error(message) => PluginError::Remote {
                plugin: self.name.clone(),
                hook: hook.hook_name().to_owned(),
                message,
            },
            other => PluginError::Protocol {
                plugin: self.name.clone(),
                message: format!("{} answered {other:?}", hook.hook_name()),
            },
        }
    }
}

impl Drop for PluginClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read the handshake on a helper thread so a silent plugin cannot stall
/// the build past `timeout`.
fn read_handshake(
    label: &str,
    reader: BoxedReader,
    timeout: Duration,
) -> Result<(Handshake, BufReader<BoxedReader>), PluginError> {
    let (tx, rx) = channel::bounded(1);
    thread::Builder::new()
        .name("plugin-handshake".into())
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            let result = read_frame::<_, Handshake>(&mut reader);
            let _ = tx.send((result, reader));
        })
        .map_err(|source| PluginError::Io {
            plugin: label.to_owned(),
            source,
        })?;

    match rx.recv_timeout(timeout) {
        Ok((Ok(hello), reader)) => Ok((hello, reader)),
        Ok((Err(e), _)) => Err(PluginError::Handshake {
            plugin: label.to_owned(),
            reason: e.to_string(),
        }),
        Err(_) => Err(PluginError::Handshake {
            plugin: label.to_owned(),
            reason: format!("no handshake within {}ms", timeout.as_millis()),
        }),
    }
}

/// Forward every response frame to the returned channel. The thread ends
/// after the first read failure (EOF included) or once the client is gone.
fn read_responses(
    name: &str,
    mut reader: BufReader<BoxedReader>,
) -> Result<channel::Receiver<io::Result<Response>>, PluginError> {
    let (tx, rx) = channel::bounded(1);
    thread::Builder::new()
        .name(format!("plugin-{name}"))
        .spawn(move || {
            loop {
                let frame = read_frame::<_, Response>(&mut reader);
                let failed = frame.is_err();
                if tx.send(frame).is_err() || failed {
                    break;
                }
            }
        })
        .map_err(|source| PluginError::Io {
            plugin: name.to_owned(),
            source,
        })?;
    Ok(rx)
}

/// A plugin that was just (re)built can briefly fail with `ETXTBSY`.
fn spawn_retrying(command: &mut Command) -> std::io::Result<Child> {
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Err(e)
                if e.kind() == std::io::ErrorKind::ExecutableFileBusy
                    && attempt < SPAWN_ATTEMPTS =>
            {
                thread::sleep(Duration::from_millis(20 * u64::from(attempt)));
                attempt += 1;
            }
            result => return result,
        }
    }
}
