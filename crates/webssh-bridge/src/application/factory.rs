//! Builds bridges from freshly upgraded browser channels.
//!
//! Setup runs strictly in this order; any failure abandons the attempt and
//! no pump is started:
//!
//! 1. wait (bounded by the message-wait deadline) for the first frame, which
//!    must be a binary resize message;
//! 2. dial and authenticate the remote session;
//! 3. route the remote stderr to the log;
//! 4. request the pseudo-terminal at the initial size and start the shell;
//! 5. split the session into streams and hand everything to a [`Bridge`].
//!
//! If step 4 fails the session is closed here.  The browser channel is
//! returned to the caller inside [`SetupFailure`] so that the caller decides
//! how to close it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webssh_core::{decode_resize, FrameKind, TerminalSize};

use crate::application::bridge::{Bridge, BridgeReport};
use crate::application::error::{SetupError, TransportError};
use crate::application::ports::{ChannelHalves, SessionConnector, ShellIo};
use crate::domain::config::BridgeSettings;
use crate::domain::target::RemoteTarget;

/// A setup failure together with the channel it was attempted on.
pub struct SetupFailure {
    pub error: SetupError,
    pub channel: ChannelHalves,
}

impl std::fmt::Debug for SetupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupFailure")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Creates one [`Bridge`] per browser connection.
///
/// The factory holds the configured target and a connector; it is shared by
/// every connection task.
///
/// # Example
///
/// ```rust,ignore
/// let factory = BridgeFactory::new(connector, config.target.clone(), config.bridge.clone());
/// let report = factory.serve(channel, None, shutdown.child_token()).await?;
/// ```
#[derive(Clone)]
pub struct BridgeFactory {
    connector: Arc<dyn SessionConnector>,
    target: RemoteTarget,
    settings: BridgeSettings,
}

impl BridgeFactory {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        target: RemoteTarget,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            connector,
            target,
            settings,
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Performs setup on `channel` and returns a running bridge.
    ///
    /// Cancelling `shutdown` during setup abandons it with
    /// [`SetupError::Cancelled`]; after setup the same token stops the bridge.
    ///
    /// # Errors
    ///
    /// Returns a [`SetupFailure`] carrying the channel, still open.
    pub async fn create(
        &self,
        mut channel: ChannelHalves,
        peer: Option<SocketAddr>,
        shutdown: CancellationToken,
    ) -> Result<Bridge, SetupFailure> {
        let id = Uuid::new_v4();
        let setup = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(SetupError::Cancelled),
            setup = self.setup(id, &mut channel) => setup,
        };

        match setup {
            Ok(shell) => Ok(Bridge::new(
                id,
                peer,
                self.settings.clone(),
                channel,
                shell,
                shutdown,
            )),
            Err(error) => Err(SetupFailure { error, channel }),
        }
    }

    /// Creates a bridge and runs it to completion.
    ///
    /// On setup failure the channel is closed before the error is returned.
    ///
    /// # Errors
    ///
    /// Only setup failures are errors; how a running bridge ended is in the
    /// returned [`BridgeReport`].
    pub async fn serve(
        &self,
        channel: ChannelHalves,
        peer: Option<SocketAddr>,
        shutdown: CancellationToken,
    ) -> Result<BridgeReport, SetupError> {
        match self.create(channel, peer, shutdown).await {
            Ok(bridge) => Ok(bridge.run().await),
            Err(SetupFailure { error, mut channel }) => {
                warn!(?peer, "bridge setup failed: {error}");
                match timeout(self.settings.message_wait, channel.sink.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(?peer, "closing channel after setup failure: {e}"),
                    Err(_) => debug!(?peer, "closing channel after setup failure timed out"),
                }
                Err(error)
            }
        }
    }

    async fn setup(
        &self,
        id: Uuid,
        channel: &mut ChannelHalves,
    ) -> Result<ShellIo, SetupError> {
        let size = self.initial_size(channel).await?;
        debug!(bridge = %id, %size, "initial terminal size received");

        let mut session = self
            .connector
            .open(&self.target)
            .await
            .map_err(SetupError::Open)?;

        session.attach_stderr(Box::new(move |bytes: &[u8]| {
            debug!(bridge = %id, stderr = %String::from_utf8_lossy(bytes), "remote stderr");
        }));

        if let Err(e) = session.start_shell(size).await {
            if let Err(close) = session.close().await {
                debug!(bridge = %id, "closing session after shell failure: {close}");
            }
            return Err(SetupError::Shell(e));
        }

        let shell = session.into_io().map_err(SetupError::Shell)?;
        info!(
            bridge = %id,
            target = %self.target.address,
            user = %self.target.user,
            %size,
            "remote shell started"
        );
        Ok(shell)
    }

    async fn initial_size(&self, channel: &mut ChannelHalves) -> Result<TerminalSize, SetupError> {
        let first = match timeout(self.settings.message_wait, channel.source.recv()).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => return Err(SetupError::InitialFrame(e)),
            Err(_) => {
                return Err(SetupError::InitialFrame(TransportError::Timeout(
                    self.settings.message_wait,
                )))
            }
        };

        match first.kind() {
            FrameKind::Binary => decode_resize(first.payload())
                .map(|msg| msg.size())
                .map_err(SetupError::InitialResize),
            FrameKind::Text => Err(SetupError::UnexpectedInitialFrame),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use webssh_core::{Credential, Frame};

    use crate::application::error::SessionError;
    use crate::application::ports::{
        FrameSink, FrameSource, RemoteSession, SessionCloser, ShellInput, ShellOutput, StderrSink,
    };

    #[derive(Default)]
    struct Calls {
        opened: u32,
        shell_sizes: Vec<TerminalSize>,
        session_closes: u32,
        sink_closes: u32,
    }

    type SharedCalls = Arc<Mutex<Calls>>;

    struct FakeConnector {
        calls: SharedCalls,
        fail_open: bool,
        fail_shell: bool,
    }

    #[async_trait]
    impl SessionConnector for FakeConnector {
        async fn open(&self, _target: &RemoteTarget) -> Result<Box<dyn RemoteSession>, SessionError> {
            self.calls.lock().unwrap().opened += 1;
            if self.fail_open {
                return Err(SessionError::Auth { user: "u".into() });
            }
            Ok(Box::new(FakeSession {
                calls: self.calls.clone(),
                fail_shell: self.fail_shell,
                started: false,
            }))
        }
    }

    struct FakeSession {
        calls: SharedCalls,
        fail_shell: bool,
        started: bool,
    }

    #[async_trait]
    impl RemoteSession for FakeSession {
        fn attach_stderr(&mut self, _sink: StderrSink) {}

        async fn start_shell(&mut self, size: TerminalSize) -> Result<(), SessionError> {
            self.calls.lock().unwrap().shell_sizes.push(size);
            if self.fail_shell {
                return Err(SessionError::Pty("denied".into()));
            }
            self.started = true;
            Ok(())
        }

        fn into_io(self: Box<Self>) -> Result<ShellIo, SessionError> {
            if !self.started {
                return Err(SessionError::NotStarted);
            }
            Ok(ShellIo {
                output: Box::new(EndedOutput),
                input: Box::new(NullInput),
                closer: Box::new(FakeCloser(self.calls.clone())),
            })
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            self.calls.lock().unwrap().session_closes += 1;
            Ok(())
        }
    }

    struct EndedOutput;

    #[async_trait]
    impl ShellOutput for EndedOutput {
        async fn read(&mut self, _buf: &mut [u8]) -> Result<usize, SessionError> {
            Ok(0)
        }
    }

    struct NullInput;

    #[async_trait]
    impl ShellInput for NullInput {
        async fn write(&mut self, _bytes: &[u8]) -> Result<(), SessionError> {
            Ok(())
        }
        async fn resize(&mut self, _size: TerminalSize) -> Result<(), SessionError> {
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

    struct CountingSink(SharedCalls);

    #[async_trait]
    impl FrameSink for CountingSink {
        async fn send(&mut self, _frame: Frame) -> Result<(), TransportError> {
            Ok(())
        }
        async fn close(&mut self) -> Result<(), TransportError> {
            self.0.lock().unwrap().sink_closes += 1;
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

    fn factory(calls: &SharedCalls, fail_open: bool, fail_shell: bool) -> BridgeFactory {
        let connector = FakeConnector {
            calls: calls.clone(),
            fail_open,
            fail_shell,
        };
        BridgeFactory::new(
            Arc::new(connector),
            RemoteTarget::new("h", 22, "u", Credential::Password("pw".into())),
            BridgeSettings {
                message_wait: Duration::from_millis(200),
                ..BridgeSettings::default()
            },
        )
    }

    fn channel(calls: &SharedCalls, first: Option<Frame>) -> (ChannelHalves, mpsc::UnboundedSender<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(frame) = first {
            tx.send(frame).unwrap();
        }
        (
            ChannelHalves::new(CountingSink(calls.clone()), QueueSource(rx)),
            tx,
        )
    }

    #[tokio::test]
    async fn test_create_starts_shell_at_initial_size() {
        // Arrange
        let calls = SharedCalls::default();
        let first = Frame::Control(br#"{"rows":24,"columns":80}"#.to_vec());
        let (ch, _tx) = channel(&calls, Some(first));

        // Act
        let bridge = factory(&calls, false, false)
            .create(ch, None, CancellationToken::new())
            .await
            .unwrap();

        // Assert
        assert_eq!(
            calls.lock().unwrap().shell_sizes,
            vec![TerminalSize::new(24, 80).unwrap()]
        );
        assert_eq!(bridge.state(), crate::application::bridge::BridgeState::Running);
    }

    #[tokio::test]
    async fn test_text_first_frame_is_rejected_before_dialing() {
        let calls = SharedCalls::default();
        let (ch, _tx) = channel(&calls, Some(Frame::Terminal(b"ls".to_vec())));

        let err = factory(&calls, false, false)
            .create(ch, None, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err.error, SetupError::UnexpectedInitialFrame));
        assert_eq!(calls.lock().unwrap().opened, 0);
    }

    #[tokio::test]
    async fn test_malformed_initial_resize_is_rejected() {
        let calls = SharedCalls::default();
        let (ch, _tx) = channel(&calls, Some(Frame::Control(b"not json".to_vec())));

        let err = factory(&calls, false, false)
            .create(ch, None, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err.error, SetupError::InitialResize(_)));
    }

    #[tokio::test]
    async fn test_missing_initial_resize_times_out() {
        let calls = SharedCalls::default();
        let (ch, _tx) = channel(&calls, None);

        let err = factory(&calls, false, false)
            .create(ch, None, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err.error,
            SetupError::InitialFrame(TransportError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_shell_failure_closes_session() {
        let calls = SharedCalls::default();
        let first = Frame::Control(br#"{"rows":24,"columns":80}"#.to_vec());
        let (ch, _tx) = channel(&calls, Some(first));

        let err = factory(&calls, false, true)
            .create(ch, None, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err.error, SetupError::Shell(SessionError::Pty(_))));
        assert_eq!(calls.lock().unwrap().session_closes, 1);
    }

    #[tokio::test]
    async fn test_serve_closes_channel_on_setup_failure() {
        let calls = SharedCalls::default();
        let first = Frame::Control(br#"{"rows":24,"columns":80}"#.to_vec());
        let (ch, _tx) = channel(&calls, Some(first));

        let err = factory(&calls, true, false)
            .serve(ch, None, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SetupError::Open(SessionError::Auth { .. })));
        assert_eq!(calls.lock().unwrap().sink_closes, 1);
    }

    #[tokio::test]
    async fn test_cancelled_setup_reports_cancelled() {
        let calls = SharedCalls::default();
        let (ch, _tx) = channel(&calls, None);
        let token = CancellationToken::new();
        token.cancel();

        let err = factory(&calls, false, false)
            .create(ch, None, token)
            .await
            .unwrap_err();

        assert!(matches!(err.error, SetupError::Cancelled));
    }
}
