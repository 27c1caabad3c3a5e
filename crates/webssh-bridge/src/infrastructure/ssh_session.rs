//! russh adapter for the session ports.
//!
//! [`SshConnector`] dials the remote host, checks its key against the
//! configured [`HostKeyPolicy`], authenticates, and opens one session channel.
//! The resulting [`SshSession`] starts the shell and then splits into:
//!
//! ```text
//!                       ┌──────────── driver task ────────────┐
//! SshInput  ──Command──►│ channel.data / channel.window_change │
//! SshOutput ◄──stdout───│ channel.wait(): Data, ExtendedData…  │──► stderr sink
//! SshCloser ──cancel───►│ channel.close                        │
//!                       └──────────────────────────────────────┘
//! ```
//!
//! The driver task is the only owner of the russh channel, so stdin writes,
//! resize requests and output delivery never race each other.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect, Pty};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webssh_core::{Credential, HostKeyPolicy, TerminalMode, TerminalSize, TERMINAL_MODES, TERMINAL_TYPE};

use crate::application::error::{CloseError, SessionError};
use crate::application::ports::{
    RemoteSession, SessionCloser, SessionConnector, ShellInput, ShellIo, ShellOutput, StderrSink,
};
use crate::domain::target::RemoteTarget;

/// Default bound on TCP connect plus key exchange.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// SSH extended-data type code for stderr.
const EXTENDED_DATA_STDERR: u32 = 1;

/// Number of stdout chunks buffered between the driver and the reader.
const STDOUT_QUEUE: usize = 64;

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens russh client sessions.
pub struct SshConnector {
    policy: HostKeyPolicy,
    config: Arc<client::Config>,
    dial_timeout: Duration,
}

impl SshConnector {
    pub fn new(policy: HostKeyPolicy) -> Self {
        Self {
            policy,
            config: Arc::new(client::Config::default()),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    pub fn with_dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    async fn open(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>, SessionError> {
        let rejected = Arc::new(Mutex::new(None));
        let handler = HostKeyCheck {
            address: target.address.clone(),
            policy: self.policy.clone(),
            rejected: Arc::clone(&rejected),
        };

        let dial = client::connect(Arc::clone(&self.config), target.address.as_str(), handler);
        let mut handle = match timeout(self.dial_timeout, dial).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                let fingerprint = rejected.lock().ok().and_then(|mut slot| slot.take());
                return Err(match fingerprint {
                    Some(fingerprint) => SessionError::HostKeyRejected {
                        address: target.address.clone(),
                        fingerprint,
                    },
                    None => SessionError::Dial {
                        address: target.address.clone(),
                        reason: e.to_string(),
                    },
                });
            }
            Err(_) => {
                return Err(SessionError::Dial {
                    address: target.address.clone(),
                    reason: format!("timed out after {:?}", self.dial_timeout),
                })
            }
        };

        authenticate(&mut handle, target).await?;
        info!(
            target = %target.address,
            user = %target.user,
            method = target.credential.method(),
            "authenticated"
        );

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Io(format!("failed to open session channel: {e}")))?;

        Ok(Box::new(SshSession {
            handle: Some(handle),
            channel: Some(channel),
            early_stdout: Vec::new(),
            stderr: None,
            started: false,
        }))
    }
}

async fn authenticate(
    handle: &mut Handle<HostKeyCheck>,
    target: &RemoteTarget,
) -> Result<(), SessionError> {
    let accepted = match &target.credential {
        Credential::Password(password) => {
            handle
                .authenticate_password(target.user.as_str(), password.as_str())
                .await
        }
        Credential::IdentityFile { path, passphrase } => {
            let key = russh_keys::load_secret_key(path, passphrase.as_deref()).map_err(|e| {
                SessionError::IdentityFile {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
            handle
                .authenticate_publickey(target.user.as_str(), Arc::new(key))
                .await
        }
    }
    .map_err(|e| SessionError::Dial {
        address: target.address.clone(),
        reason: format!("authentication exchange failed: {e}"),
    })?;

    if accepted {
        Ok(())
    } else {
        Err(SessionError::Auth {
            user: target.user.clone(),
        })
    }
}

/// Client handler that applies the host key policy.
struct HostKeyCheck {
    address: String,
    policy: HostKeyPolicy,
    /// Fingerprint of a refused key, so the dial error can name it.
    rejected: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        if self.policy.is_insecure() {
            warn!(
                target = %self.address,
                %fingerprint,
                "accepting host key without verification"
            );
            return Ok(true);
        }
        if self.policy.accepts(&fingerprint) {
            debug!(target = %self.address, %fingerprint, "host key trusted");
            return Ok(true);
        }
        warn!(target = %self.address, %fingerprint, "host key not in trusted list");
        if let Ok(mut slot) = self.rejected.lock() {
            *slot = Some(fingerprint);
        }
        Ok(false)
    }
}

// ── Session (before split) ────────────────────────────────────────────────────

/// An authenticated session channel whose shell may not be running yet.
pub struct SshSession {
    handle: Option<Handle<HostKeyCheck>>,
    channel: Option<Channel<Msg>>,
    /// Output that arrived while waiting for request confirmations.
    early_stdout: Vec<Vec<u8>>,
    stderr: Option<StderrSink>,
    started: bool,
}

impl SshSession {
    /// Waits for the confirmation of a want-reply channel request.
    ///
    /// Data that arrives in the meantime is kept for the output reader.
    async fn await_reply(&mut self) -> Result<bool, SessionError> {
        let channel = self.channel.as_mut().ok_or(SessionError::Closed)?;
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Success) => return Ok(true),
                Some(ChannelMsg::Failure) => return Ok(false),
                Some(ChannelMsg::Data { data }) => self.early_stdout.push(data.to_vec()),
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == EXTENDED_DATA_STDERR => {
                    if let Some(sink) = self.stderr.as_mut() {
                        sink(&data[..]);
                    }
                }
                Some(ChannelMsg::Eof | ChannelMsg::Close) | None => return Err(SessionError::Closed),
                Some(_) => {}
            }
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn attach_stderr(&mut self, sink: StderrSink) {
        self.stderr = Some(sink);
    }

    async fn start_shell(&mut self, size: TerminalSize) -> Result<(), SessionError> {
        let channel = self.channel.as_mut().ok_or(SessionError::Closed)?;
        channel
            .request_pty(
                true,
                TERMINAL_TYPE,
                size.columns(),
                size.rows(),
                0,
                0,
                &pty_modes(),
            )
            .await
            .map_err(|e| SessionError::Pty(e.to_string()))?;
        if !self.await_reply().await? {
            return Err(SessionError::Pty("request refused by server".into()));
        }

        let channel = self.channel.as_mut().ok_or(SessionError::Closed)?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| SessionError::Shell(e.to_string()))?;
        if !self.await_reply().await? {
            return Err(SessionError::Shell("request refused by server".into()));
        }

        self.started = true;
        Ok(())
    }

    fn into_io(mut self: Box<Self>) -> Result<ShellIo, SessionError> {
        if !self.started {
            return Err(SessionError::NotStarted);
        }
        let (Some(channel), Some(handle)) = (self.channel.take(), self.handle.take()) else {
            return Err(SessionError::Closed);
        };

        let (command_tx, command_rx) = mpsc::channel(1);
        let (stdout_tx, stdout_rx) = mpsc::channel(STDOUT_QUEUE);
        let stop = CancellationToken::new();

        let driver = Driver {
            channel,
            commands: command_rx,
            stdout: Some(stdout_tx),
            stderr: self.stderr.take(),
            stop: stop.clone(),
        };
        let driver = tokio::spawn(driver.run());

        Ok(ShellIo {
            output: Box::new(SshOutput {
                chunks: stdout_rx,
                early: std::mem::take(&mut self.early_stdout).into(),
                leftover: Vec::new(),
                offset: 0,
            }),
            input: Box::new(SshInput {
                commands: command_tx,
            }),
            closer: Box::new(SshCloser {
                stop,
                driver: Some(driver),
                handle: Some(handle),
            }),
        })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let session = match self.channel.take() {
            Some(channel) => channel.close().await.err().map(|e| e.to_string()),
            None => None,
        };
        let transport = match self.handle.take() {
            Some(handle) => disconnect(&handle).await,
            None => None,
        };
        match CloseError::from_parts(session, transport) {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

fn pty_modes() -> Vec<(Pty, u32)> {
    TERMINAL_MODES
        .iter()
        .map(|(mode, value)| {
            let opcode = match mode {
                TerminalMode::Echo => Pty::ECHO,
                TerminalMode::InputSpeed => Pty::TTY_OP_ISPEED,
                TerminalMode::OutputSpeed => Pty::TTY_OP_OSPEED,
            };
            (opcode, *value)
        })
        .collect()
}

async fn disconnect(handle: &Handle<HostKeyCheck>) -> Option<String> {
    if handle.is_closed() {
        return None;
    }
    handle
        .disconnect(Disconnect::ByApplication, "", "English")
        .await
        .err()
        .map(|e| e.to_string())
}

// ── Driver task ───────────────────────────────────────────────────────────────

enum Command {
    Write(Vec<u8>, oneshot::Sender<Result<(), SessionError>>),
    Resize(TerminalSize, oneshot::Sender<Result<(), SessionError>>),
}

struct Driver {
    channel: Channel<Msg>,
    commands: mpsc::Receiver<Command>,
    /// Dropped at remote EOF so the reader sees end of stream.
    stdout: Option<mpsc::Sender<Vec<u8>>>,
    stderr: Option<StderrSink>,
    stop: CancellationToken,
}

impl Driver {
    /// Runs until stopped or the remote closes the channel, then closes the
    /// channel.  The result is the channel-close outcome.
    async fn run(mut self) -> Result<(), String> {
        let mut commands_open = true;
        let mut remote_closed = false;

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                cmd = self.commands.recv(), if commands_open => match cmd {
                    Some(Command::Write(bytes, reply)) => {
                        let result = self
                            .channel
                            .data(bytes.as_slice())
                            .await
                            .map_err(|e| SessionError::Io(e.to_string()));
                        let _ = reply.send(result);
                    }
                    Some(Command::Resize(size, reply)) => {
                        let result = self
                            .channel
                            .window_change(size.columns(), size.rows(), 0, 0)
                            .await
                            .map_err(|e| SessionError::Resize(e.to_string()));
                        let _ = reply.send(result);
                    }
                    None => commands_open = false,
                },
                msg = self.channel.wait() => match msg {
                    Some(ChannelMsg::Data { data }) => {
                        if let Some(stdout) = &self.stdout {
                            tokio::select! {
                                biased;
                                _ = self.stop.cancelled() => break,
                                sent = stdout.send(data.to_vec()) => if sent.is_err() {
                                    self.stdout = None;
                                },
                            }
                        }
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) if ext == EXTENDED_DATA_STDERR => {
                        if let Some(sink) = self.stderr.as_mut() {
                            sink(&data[..]);
                        }
                    }
                    Some(ChannelMsg::Eof) => {
                        debug!("remote sent EOF");
                        self.stdout = None;
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        debug!(exit_status, "remote shell exited");
                    }
                    Some(ChannelMsg::Close) | None => {
                        remote_closed = true;
                        self.stdout = None;
                        break;
                    }
                    Some(_) => {}
                },
            }
        }

        self.stdout = None;
        if remote_closed {
            return Ok(());
        }
        let _ = self.channel.eof().await;
        self.channel.close().await.map_err(|e| e.to_string())
    }
}

// ── Split halves ──────────────────────────────────────────────────────────────

/// Stdout of a running shell.
struct SshOutput {
    chunks: mpsc::Receiver<Vec<u8>>,
    early: std::collections::VecDeque<Vec<u8>>,
    leftover: Vec<u8>,
    offset: usize,
}

impl SshOutput {
    async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        loop {
            let chunk = match self.early.pop_front() {
                Some(chunk) => chunk,
                None => self.chunks.recv().await?,
            };
            if !chunk.is_empty() {
                return Some(chunk);
            }
        }
    }
}

#[async_trait]
impl ShellOutput for SshOutput {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.offset >= self.leftover.len() {
            match self.next_chunk().await {
                Some(chunk) => {
                    self.leftover = chunk;
                    self.offset = 0;
                }
                None => return Ok(0),
            }
        }
        let available = &self.leftover[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}

/// Stdin and window size of a running shell.
struct SshInput {
    commands: mpsc::Sender<Command>,
}

impl SshInput {
    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<(), SessionError>>) -> Command,
    ) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)?
    }
}

#[async_trait]
impl ShellInput for SshInput {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        let bytes = bytes.to_vec();
        self.request(|reply| Command::Write(bytes, reply)).await
    }

    async fn resize(&mut self, size: TerminalSize) -> Result<(), SessionError> {
        self.request(|reply| Command::Resize(size, reply)).await
    }
}

/// Closes the channel, then the transport.
struct SshCloser {
    stop: CancellationToken,
    driver: Option<JoinHandle<Result<(), String>>>,
    handle: Option<Handle<HostKeyCheck>>,
}

#[async_trait]
impl SessionCloser for SshCloser {
    async fn close(&mut self) -> Result<(), SessionError> {
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };
        self.stop.cancel();

        let session = match driver.await {
            Ok(result) => result.err(),
            Err(join) => Some(join.to_string()),
        };
        let transport = match self.handle.take() {
            Some(handle) => disconnect(&handle).await,
            None => None,
        };

        match CloseError::from_parts(session, transport) {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
