//! The bridge: one browser channel paired with one remote shell.
//!
//! A [`Bridge`] is built by the factory once the remote shell is running.
//! [`Bridge::run`] drives two pumps concurrently until either of them ends:
//!
//! - **Outbound** (remote → browser): each chunk read from the shell's stdout
//!   becomes exactly one text frame, sent within the message-wait deadline.
//! - **Inbound** (browser → remote): text frames are written verbatim to the
//!   shell's stdin; binary frames are decoded as resize messages and applied
//!   to the pseudo-terminal in arrival order.
//!
//! # Teardown
//!
//! The first pump to end records the root cause in a [`TeardownSignal`] and
//! cancels the shared token.  The other pump observes the token at its next
//! suspension point and exits.  Only when both have exited are the session
//! and the channel closed (once each), and only then does the state become
//! [`BridgeState::Closed`].  No byte can be pumped after either side has been
//! reported closed.
//!
//! ```text
//! Initializing ──(shell started)──► Running ──(first pump ends / close())──► Closed
//! ```

use std::net::SocketAddr;

use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webssh_core::{decode_resize, Frame};

use crate::application::error::{BridgeError, SessionError, TransportError};
use crate::application::ports::{
    ChannelHalves, FrameSink, FrameSource, SessionCloser, ShellInput, ShellIo, ShellOutput,
};
use crate::application::teardown::{Direction, TeardownSignal, Termination};
use crate::domain::config::{BridgeSettings, ResizeFailurePolicy};

/// Lifecycle of a bridge.  There is no way back from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// The pseudo-terminal and shell are not started yet.
    Initializing,
    /// Both pumps are active.
    Running,
    /// Both pumps have exited and both sides are closed.
    Closed,
}

/// Outcome of a finished bridge.
#[derive(Debug)]
pub struct BridgeReport {
    pub id: Uuid,
    /// The first termination; later errors caused by the teardown itself are
    /// not reported.
    pub cause: Termination,
    /// Failure while closing the remote session, if any.
    pub session_close: Option<SessionError>,
    /// Failure while closing the browser channel, if any.
    pub channel_close: Option<TransportError>,
}

/// A cloneable view of a bridge for code outside its task.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    id: Uuid,
    state: watch::Receiver<BridgeState>,
    shutdown: CancellationToken,
}

impl BridgeHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The current lifecycle state.
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Asks the bridge to stop.  Safe to call any number of times, including
    /// after the bridge has closed.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Waits until the bridge reaches [`BridgeState::Closed`].
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        // An Err means the bridge was dropped without running; nothing left
        // to wait for.
        let _ = state.wait_for(|s| *s == BridgeState::Closed).await;
    }
}

/// One browser channel paired with one running remote shell.
pub struct Bridge {
    id: Uuid,
    peer: Option<SocketAddr>,
    settings: BridgeSettings,
    channel: ChannelHalves,
    shell: ShellIo,
    state: watch::Sender<BridgeState>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Pairs a channel with a started shell.  The bridge is `Running` from
    /// here on; pumping starts with [`Bridge::run`].
    ///
    /// `shutdown` is the external close request: cancelling it (directly, or
    /// through a parent token) stops the bridge.  The bridge only ever cancels
    /// its own child of `shutdown`, so one token can be shared by many
    /// bridges.
    pub fn new(
        id: Uuid,
        peer: Option<SocketAddr>,
        settings: BridgeSettings,
        channel: ChannelHalves,
        shell: ShellIo,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(BridgeState::Initializing);
        state.send_replace(BridgeState::Running);
        Self {
            id,
            peer,
            settings,
            channel,
            shell,
            state,
            shutdown: shutdown.child_token(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle {
            id: self.id,
            state: self.state.subscribe(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Pumps until either direction ends or a close is requested, then closes
    /// both sides and returns why it stopped.
    pub async fn run(self) -> BridgeReport {
        let Bridge {
            id,
            peer,
            settings,
            channel,
            shell,
            state,
            shutdown,
        } = self;
        let ChannelHalves {
            mut sink,
            mut source,
        } = channel;
        let ShellIo {
            mut output,
            mut input,
            mut closer,
        } = shell;

        let signal = TeardownSignal::new(shutdown);
        info!(bridge = %id, ?peer, "bridge running");

        tokio::join!(
            pump_outbound(id, output.as_mut(), sink.as_mut(), &settings, &signal),
            pump_inbound(id, source.as_mut(), input.as_mut(), &settings, &signal),
        );

        // Both pumps have exited: nothing touches either side any more.
        let cause = signal.into_cause();
        let session_close = close_session(closer.as_mut(), &settings).await;
        let channel_close = close_channel(sink.as_mut(), &settings).await;
        drop(input);
        drop(output);
        drop(source);

        state.send_replace(BridgeState::Closed);

        match &cause {
            Termination::Failed { direction, error } => {
                warn!(bridge = %id, ?direction, "bridge closed: {error}")
            }
            other => info!(bridge = %id, cause = ?other, "bridge closed"),
        }
        if let Some(e) = &session_close {
            warn!(bridge = %id, "closing remote session: {e}");
        }
        if let Some(e) = &channel_close {
            debug!(bridge = %id, "closing browser channel: {e}");
        }

        BridgeReport {
            id,
            cause,
            session_close,
            channel_close,
        }
    }
}

// ── Pumps ─────────────────────────────────────────────────────────────────────

/// Remote stdout → browser text frames.
async fn pump_outbound(
    id: Uuid,
    output: &mut dyn ShellOutput,
    sink: &mut dyn FrameSink,
    settings: &BridgeSettings,
    signal: &TeardownSignal,
) {
    let mut buf = vec![0u8; settings.chunk_size.max(1)];

    loop {
        let read = tokio::select! {
            biased;
            _ = signal.stopped() => break,
            read = output.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => {
                debug!(bridge = %id, "remote output ended");
                signal.trigger(Termination::RemoteEnded);
                break;
            }
            Ok(n) => n,
            Err(e) => {
                fail(signal, Direction::Outbound, BridgeError::Session(e));
                break;
            }
        };

        let frame = Frame::Terminal(buf[..n].to_vec());
        let sent = tokio::select! {
            biased;
            _ = signal.stopped() => break,
            sent = timeout(settings.message_wait, sink.send(frame)) => sent,
        };

        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                fail(signal, Direction::Outbound, BridgeError::Channel(e));
                break;
            }
            Err(_) => {
                let e = TransportError::Timeout(settings.message_wait);
                fail(signal, Direction::Outbound, BridgeError::Channel(e));
                break;
            }
        }
    }
}

/// Browser frames → remote stdin and resizes.
///
/// The receive has no deadline: an idle user must not end the session.
async fn pump_inbound(
    id: Uuid,
    source: &mut dyn FrameSource,
    input: &mut dyn ShellInput,
    settings: &BridgeSettings,
    signal: &TeardownSignal,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = signal.stopped() => break,
            received = source.recv() => received,
        };

        match received {
            Err(TransportError::Closed) => {
                debug!(bridge = %id, "browser closed the channel");
                signal.trigger(Termination::ClientClosed);
                break;
            }
            Err(e) => {
                fail(signal, Direction::Inbound, BridgeError::Channel(e));
                break;
            }
            Ok(Frame::Terminal(bytes)) => {
                let written = tokio::select! {
                    biased;
                    _ = signal.stopped() => break,
                    written = input.write(&bytes) => written,
                };
                if let Err(e) = written {
                    fail(signal, Direction::Inbound, BridgeError::Session(e));
                    break;
                }
            }
            Ok(Frame::Control(payload)) => {
                let msg = match decode_resize(&payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        fail(signal, Direction::Inbound, BridgeError::MalformedControl(e));
                        break;
                    }
                };

                let resized = tokio::select! {
                    biased;
                    _ = signal.stopped() => break,
                    resized = input.resize(msg.size()) => resized,
                };
                match resized {
                    Ok(()) => debug!(bridge = %id, size = %msg.size(), "terminal resized"),
                    Err(e) => match settings.resize_failure {
                        ResizeFailurePolicy::LogAndContinue => {
                            warn!(bridge = %id, size = %msg.size(), "resize rejected: {e}");
                        }
                        ResizeFailurePolicy::Terminate => {
                            fail(signal, Direction::Inbound, BridgeError::Resize(e));
                            break;
                        }
                    },
                }
            }
        }
    }
}

fn fail(signal: &TeardownSignal, direction: Direction, error: BridgeError) {
    if signal.is_triggered() {
        // Errors after the first are usually caused by the teardown itself.
        debug!(?direction, "ignoring secondary pump error: {error}");
    }
    signal.trigger(Termination::Failed { direction, error });
}

async fn close_session(
    closer: &mut dyn SessionCloser,
    settings: &BridgeSettings,
) -> Option<SessionError> {
    match timeout(settings.message_wait, closer.close()).await {
        Ok(result) => result.err(),
        Err(_) => Some(SessionError::Io(format!(
            "close timed out after {:?}",
            settings.message_wait
        ))),
    }
}

async fn close_channel(
    sink: &mut dyn FrameSink,
    settings: &BridgeSettings,
) -> Option<TransportError> {
    match timeout(settings.message_wait, sink.close()).await {
        Ok(result) => result.err(),
        Err(_) => Some(TransportError::Timeout(settings.message_wait)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use webssh_core::TerminalSize;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Stdout that yields the scripted chunks, then either ends or blocks.
    struct ScriptedOutput {
        chunks: VecDeque<Result<Vec<u8>, SessionError>>,
        block_at_end: bool,
    }

    #[async_trait]
    impl ShellOutput for ScriptedOutput {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None if self.block_at_end => std::future::pending().await,
                None => Ok(0),
            }
        }
    }

    #[derive(Default, Clone)]
    struct Recorder {
        frames: Arc<Mutex<Vec<Frame>>>,
        stdin: Arc<Mutex<Vec<u8>>>,
        resizes: Arc<Mutex<Vec<TerminalSize>>>,
        sink_closes: Arc<Mutex<u32>>,
        session_closes: Arc<Mutex<u32>>,
    }

    struct RecordingSink(Recorder);

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
            self.0.frames.lock().unwrap().push(frame);
            Ok(())
        }
        async fn close(&mut self) -> Result<(), TransportError> {
            *self.0.sink_closes.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Frames fed by the test through an mpsc channel; dropping the sender
    /// closes the channel cleanly.
    struct ChannelSource(mpsc::UnboundedReceiver<Frame>);

    #[async_trait]
    impl FrameSource for ChannelSource {
        async fn recv(&mut self) -> Result<Frame, TransportError> {
            self.0.recv().await.ok_or(TransportError::Closed)
        }
    }

    struct RecordingInput {
        recorder: Recorder,
        reject_resize: bool,
    }

    #[async_trait]
    impl ShellInput for RecordingInput {
        async fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
            self.recorder.stdin.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
        async fn resize(&mut self, size: TerminalSize) -> Result<(), SessionError> {
            if self.reject_resize {
                return Err(SessionError::Resize("refused".into()));
            }
            self.recorder.resizes.lock().unwrap().push(size);
            Ok(())
        }
    }

    struct CountingCloser(Recorder);

    #[async_trait]
    impl SessionCloser for CountingCloser {
        async fn close(&mut self) -> Result<(), SessionError> {
            *self.0.session_closes.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn make_bridge(
        output: ScriptedOutput,
        settings: BridgeSettings,
        reject_resize: bool,
    ) -> (Bridge, Recorder, mpsc::UnboundedSender<Frame>) {
        make_bridge_under(output, settings, reject_resize, CancellationToken::new())
    }

    fn make_bridge_under(
        output: ScriptedOutput,
        settings: BridgeSettings,
        reject_resize: bool,
        shutdown: CancellationToken,
    ) -> (Bridge, Recorder, mpsc::UnboundedSender<Frame>) {
        let recorder = Recorder::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = Bridge::new(
            Uuid::new_v4(),
            None,
            settings,
            ChannelHalves::new(RecordingSink(recorder.clone()), ChannelSource(rx)),
            ShellIo {
                output: Box::new(output),
                input: Box::new(RecordingInput {
                    recorder: recorder.clone(),
                    reject_resize,
                }),
                closer: Box::new(CountingCloser(recorder.clone())),
            },
            shutdown,
        );
        (bridge, recorder, tx)
    }

    fn blocking_output() -> ScriptedOutput {
        ScriptedOutput {
            chunks: VecDeque::new(),
            block_at_end: true,
        }
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_each_stdout_chunk_becomes_one_text_frame() {
        // Arrange
        let output = ScriptedOutput {
            chunks: VecDeque::from(vec![Ok(b"hello ".to_vec()), Ok(b"world\r\n".to_vec())]),
            block_at_end: false,
        };
        let (bridge, recorder, _tx) = make_bridge(output, BridgeSettings::default(), false);

        // Act
        let report = bridge.run().await;

        // Assert
        assert!(matches!(report.cause, Termination::RemoteEnded));
        assert_eq!(
            *recorder.frames.lock().unwrap(),
            vec![
                Frame::Terminal(b"hello ".to_vec()),
                Frame::Terminal(b"world\r\n".to_vec())
            ]
        );
    }

    #[tokio::test]
    async fn test_stdout_error_is_root_cause() {
        let output = ScriptedOutput {
            chunks: VecDeque::from(vec![Err(SessionError::Io("reset".into()))]),
            block_at_end: false,
        };
        let (bridge, _recorder, _tx) = make_bridge(output, BridgeSettings::default(), false);

        let report = bridge.run().await;

        assert!(matches!(
            report.cause,
            Termination::Failed {
                direction: Direction::Outbound,
                error: BridgeError::Session(SessionError::Io(_)),
            }
        ));
    }

    #[tokio::test]
    async fn test_chunks_are_capped_at_chunk_size() {
        // A 4-byte buffer can never receive a chunk larger than 4 bytes.
        let settings = BridgeSettings {
            chunk_size: 4,
            ..BridgeSettings::default()
        };
        let output = ScriptedOutput {
            chunks: VecDeque::from(vec![Ok(b"abcd".to_vec())]),
            block_at_end: false,
        };
        let (bridge, recorder, _tx) = make_bridge(output, settings, false);

        bridge.run().await;

        assert_eq!(
            *recorder.frames.lock().unwrap(),
            vec![Frame::Terminal(b"abcd".to_vec())]
        );
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_text_frames_reach_stdin_in_order_and_resizes_apply() {
        // Arrange
        let (bridge, recorder, tx) = make_bridge(blocking_output(), BridgeSettings::default(), false);
        tx.send(Frame::Terminal(b"ls".to_vec())).unwrap();
        tx.send(Frame::Control(br#"{"rows":50,"columns":120}"#.to_vec()))
            .unwrap();
        tx.send(Frame::Terminal(b" -la\r".to_vec())).unwrap();
        drop(tx);

        // Act
        let report = bridge.run().await;

        // Assert
        assert!(matches!(report.cause, Termination::ClientClosed));
        assert_eq!(*recorder.stdin.lock().unwrap(), b"ls -la\r".to_vec());
        assert_eq!(
            *recorder.resizes.lock().unwrap(),
            vec![TerminalSize::new(50, 120).unwrap()]
        );
    }

    #[tokio::test]
    async fn test_malformed_control_terminates_without_resize() {
        let (bridge, recorder, tx) = make_bridge(blocking_output(), BridgeSettings::default(), false);
        tx.send(Frame::Control(br#"{"rows":0,"columns":80}"#.to_vec()))
            .unwrap();
        tx.send(Frame::Terminal(b"never written".to_vec())).unwrap();

        let report = bridge.run().await;

        assert!(matches!(
            report.cause,
            Termination::Failed {
                direction: Direction::Inbound,
                error: BridgeError::MalformedControl(_),
            }
        ));
        assert!(recorder.resizes.lock().unwrap().is_empty());
        assert!(recorder.stdin.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_resize_is_logged_by_default() {
        let (bridge, recorder, tx) = make_bridge(blocking_output(), BridgeSettings::default(), true);
        tx.send(Frame::Control(br#"{"rows":50,"columns":120}"#.to_vec()))
            .unwrap();
        tx.send(Frame::Terminal(b"still here".to_vec())).unwrap();
        drop(tx);

        let report = bridge.run().await;

        assert!(matches!(report.cause, Termination::ClientClosed));
        assert_eq!(*recorder.stdin.lock().unwrap(), b"still here".to_vec());
    }

    #[tokio::test]
    async fn test_rejected_resize_terminates_under_terminate_policy() {
        let settings = BridgeSettings {
            resize_failure: ResizeFailurePolicy::Terminate,
            ..BridgeSettings::default()
        };
        let (bridge, _recorder, tx) = make_bridge(blocking_output(), settings, true);
        tx.send(Frame::Control(br#"{"rows":50,"columns":120}"#.to_vec()))
            .unwrap();

        let report = bridge.run().await;

        assert!(matches!(
            report.cause,
            Termination::Failed {
                direction: Direction::Inbound,
                error: BridgeError::Resize(_),
            }
        ));
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_both_sides_closed_exactly_once() {
        let (bridge, recorder, tx) = make_bridge(blocking_output(), BridgeSettings::default(), false);
        drop(tx);

        bridge.run().await;

        assert_eq!(*recorder.sink_closes.lock().unwrap(), 1);
        assert_eq!(*recorder.session_closes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_external_close_stops_idle_bridge() {
        // Arrange: stdout and the browser are both idle forever
        let (bridge, recorder, _tx) = make_bridge(blocking_output(), BridgeSettings::default(), false);
        let handle = bridge.handle();
        assert_eq!(handle.state(), BridgeState::Running);

        // Act
        let task = tokio::spawn(bridge.run());
        handle.close();
        let report = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("bridge must stop promptly")
            .unwrap();

        // Assert
        assert!(matches!(report.cause, Termination::CloseRequested));
        assert_eq!(handle.state(), BridgeState::Closed);
        assert_eq!(*recorder.session_closes.lock().unwrap(), 1);
        handle.close(); // no-op after close
    }

    #[tokio::test]
    async fn test_handle_closed_resolves_after_run() {
        let (bridge, _recorder, tx) = make_bridge(blocking_output(), BridgeSettings::default(), false);
        let handle = bridge.handle();
        drop(tx);

        tokio::spawn(bridge.run());
        tokio::time::timeout(Duration::from_secs(5), handle.closed())
            .await
            .expect("closed() must resolve");
    }

    #[tokio::test]
    async fn test_ending_bridge_leaves_shared_token_and_sibling_running() {
        // Arrange: two bridges under one gateway-wide token
        let root = CancellationToken::new();
        let (first, _first_rec, first_tx) = make_bridge_under(
            blocking_output(),
            BridgeSettings::default(),
            false,
            root.clone(),
        );
        let (second, second_rec, second_tx) = make_bridge_under(
            blocking_output(),
            BridgeSettings::default(),
            false,
            root.clone(),
        );
        let second_handle = second.handle();
        let second_task = tokio::spawn(second.run());

        // Act: the first browser goes away
        drop(first_tx);
        let report = first.run().await;

        // Assert
        assert!(matches!(report.cause, Termination::ClientClosed));
        assert!(!root.is_cancelled());
        second_tx.send(Frame::Terminal(b"pwd\r".to_vec())).unwrap();
        for _ in 0..100 {
            if !second_rec.stdin.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*second_rec.stdin.lock().unwrap(), b"pwd\r".to_vec());
        assert_eq!(second_handle.state(), BridgeState::Running);

        root.cancel();
        let second_report = tokio::time::timeout(Duration::from_secs(5), second_task)
            .await
            .expect("parent cancel must stop the bridge")
            .unwrap();
        assert!(matches!(second_report.cause, Termination::CloseRequested));
    }

    #[tokio::test]
    async fn test_handle_close_does_not_cancel_callers_token() {
        let root = CancellationToken::new();
        let (bridge, _recorder, _tx) =
            make_bridge_under(blocking_output(), BridgeSettings::default(), false, root.clone());
        let handle = bridge.handle();

        let task = tokio::spawn(bridge.run());
        handle.close();
        let report = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("bridge must stop promptly")
            .unwrap();

        assert!(matches!(report.cause, Termination::CloseRequested));
        assert!(!root.is_cancelled());
    }
}
