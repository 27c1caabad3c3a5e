//! Recording doubles for the bridge ports, shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use webssh_bridge::application::{
    ChannelHalves, FrameSink, FrameSource, RemoteSession, SessionCloser, SessionConnector,
    SessionError, ShellInput, ShellIo, ShellOutput, StderrSink, TransportError,
};
use webssh_bridge::domain::RemoteTarget;
use webssh_core::{Frame, TerminalSize};

/// Everything the doubles observed.
#[derive(Debug, Default)]
pub struct Calls {
    pub opened: u32,
    pub shell_size: Option<TerminalSize>,
    pub stdin: Vec<u8>,
    pub resizes: Vec<TerminalSize>,
    pub session_closes: u32,
    pub frames: Vec<Frame>,
    pub sink_closes: u32,
}

pub type SharedCalls = Arc<Mutex<Calls>>;

pub fn snapshot<T>(calls: &SharedCalls, f: impl FnOnce(&Calls) -> T) -> T {
    f(&calls.lock().unwrap())
}

// ── Remote side ───────────────────────────────────────────────────────────────

/// A connector whose single session's stdout is fed by the test.
pub struct FakeConnector {
    calls: SharedCalls,
    stdout: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

/// Returns the connector, the sender feeding remote stdout (drop it for EOF),
/// and the shared call record.
pub fn fake_remote(calls: &SharedCalls) -> (Arc<FakeConnector>, mpsc::UnboundedSender<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = FakeConnector {
        calls: Arc::clone(calls),
        stdout: Mutex::new(Some(rx)),
    };
    (Arc::new(connector), tx)
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn open(&self, _target: &RemoteTarget) -> Result<Box<dyn RemoteSession>, SessionError> {
        self.calls.lock().unwrap().opened += 1;
        let stdout = self
            .stdout
            .lock()
            .unwrap()
            .take()
            .ok_or(SessionError::Dial {
                address: "fake".into(),
                reason: "only one session per fake".into(),
            })?;
        Ok(Box::new(FakeSession {
            calls: Arc::clone(&self.calls),
            stdout: Some(stdout),
            started: false,
        }))
    }
}

struct FakeSession {
    calls: SharedCalls,
    stdout: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    started: bool,
}

#[async_trait]
impl RemoteSession for FakeSession {
    fn attach_stderr(&mut self, _sink: StderrSink) {}

    async fn start_shell(&mut self, size: TerminalSize) -> Result<(), SessionError> {
        self.calls.lock().unwrap().shell_size = Some(size);
        self.started = true;
        Ok(())
    }

    fn into_io(mut self: Box<Self>) -> Result<ShellIo, SessionError> {
        if !self.started {
            return Err(SessionError::NotStarted);
        }
        let stdout = self.stdout.take().ok_or(SessionError::Closed)?;
        Ok(ShellIo {
            output: Box::new(FakeOutput {
                chunks: stdout,
                leftover: Vec::new(),
            }),
            input: Box::new(FakeInput(Arc::clone(&self.calls))),
            closer: Box::new(FakeCloser(Arc::clone(&self.calls))),
        })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.calls.lock().unwrap().session_closes += 1;
        Ok(())
    }
}

struct FakeOutput {
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    leftover: Vec<u8>,
}

#[async_trait]
impl ShellOutput for FakeOutput {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        if self.leftover.is_empty() {
            match self.chunks.recv().await {
                Some(chunk) => self.leftover = chunk,
                None => return Ok(0),
            }
        }
        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

struct FakeInput(SharedCalls);

#[async_trait]
impl ShellInput for FakeInput {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.0.lock().unwrap().stdin.extend_from_slice(bytes);
        Ok(())
    }

    async fn resize(&mut self, size: TerminalSize) -> Result<(), SessionError> {
        self.0.lock().unwrap().resizes.push(size);
        Ok(())
    }
}

struct FakeCloser(SharedCalls);

#[async_trait]
impl SessionCloser for FakeCloser {
    async fn close(&mut self) -> Result<(), SessionError> {
        self.0.lock().unwrap().session_closes += 1;
        Ok(())
    }
}

// ── Browser side ──────────────────────────────────────────────────────────────

/// A channel whose inbound frames are fed by the test (drop the sender for a
/// clean close) and whose outbound frames are recorded.
pub fn fake_channel(calls: &SharedCalls) -> (ChannelHalves, mpsc::UnboundedSender<Frame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let halves = ChannelHalves::new(
        RecordingSink {
            calls: Arc::clone(calls),
            closed: false,
        },
        QueueSource(rx),
    );
    (halves, tx)
}

struct RecordingSink {
    calls: SharedCalls,
    closed: bool,
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.calls.lock().unwrap().frames.push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.calls.lock().unwrap().sink_closes += 1;
        Ok(())
    }
}

struct QueueSource(mpsc::UnboundedReceiver<Frame>);

#[async_trait]
impl FrameSource for QueueSource {
    async fn recv(&mut self) -> Result<Frame, TransportError> {
        self.0.recv().await.ok_or(TransportError::Closed)
    }
}

pub fn resize_frame(rows: u32, columns: u32) -> Frame {
    Frame::Control(format!(r#"{{"rows":{rows},"columns":{columns}}}"#).into_bytes())
}
