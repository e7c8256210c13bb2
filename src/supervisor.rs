//! Platform session supervision.
//!
//! Owns the external platform session lifecycle: connect, resolve the
//! channel binding, serialize outbound sends, detect faults and reconnect.
//!
//! ## Reconnection
//!
//! Connect failures and session faults (a failed send, a closed event
//! stream) are logged with full detail and retried with exponential
//! backoff (1s doubling up to 60s). The backoff resets after every
//! successful connect, so a fault during a healthy session gets exactly
//! one prompt restart attempt before backoff kicks in.
//!
//! ## Outbound sends
//!
//! `write` is fire-and-forget from the caller's perspective: it queues the
//! message and returns. The run loop delivers queued messages one at a
//! time and observes each result, so a failed send drives the `Failed`
//! transition instead of being silently dropped. A message that was in
//! flight when the session faulted is logged and not re-sent — the bridge
//! never duplicates delivery.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};

use crate::error::PlatformError;
use crate::host::{PlatformClient, PlatformSession, PlatformSink};
use crate::protocol::{ChannelId, OutboundMessage, PlatformEvent, SendTarget};

/// Initial reconnect backoff.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Backoff ceiling, to stay polite toward a rate-limited platform API.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ── Session State ─────────────────────────────────────────────────────────────

/// Lifecycle states of the supervised platform session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Failed,
}

// ── Channel Binding ───────────────────────────────────────────────────────────

/// The resolved main channel and optional staff channel, re-resolved after
/// every successful connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelBinding {
    pub main: Option<ChannelId>,
    pub staff: Option<ChannelId>,
}

impl ChannelBinding {
    /// Resolve the configured channel IDs against a fresh session.
    /// Unresolved channels are logged, not fatal: the bridge keeps running
    /// and degrades.
    fn resolve(
        sink: &dyn PlatformSink,
        main: ChannelId,
        staff: Option<ChannelId>,
    ) -> Self {
        let main = if sink.resolve_channel(main) {
            Some(main)
        } else {
            tracing::error!(
                channel = main,
                "Couldn't resolve main channel; messages can't be sent. \
                 Ensure the channel ID is correct."
            );
            None
        };

        let staff = match staff {
            Some(id) if sink.resolve_channel(id) => Some(id),
            Some(id) => {
                tracing::warn!(
                    channel = id,
                    "Couldn't resolve staff channel; reports will be sent \
                     to the main channel."
                );
                None
            }
            None => None,
        };

        Self { main, staff }
    }

    /// Map a send target onto a concrete channel, applying staff→main
    /// degradation. `None` means there is nowhere to deliver.
    fn channel_for(&self, target: SendTarget) -> Option<ChannelId> {
        match target {
            SendTarget::Main => self.main,
            SendTarget::Staff => self.staff.or(self.main),
            SendTarget::Channel(id) => Some(id),
        }
    }
}

// ── Writer Handle ─────────────────────────────────────────────────────────────

/// Cheap, clonable handle for queueing outbound guild-channel messages.
#[derive(Clone)]
pub struct BridgeWriter {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl BridgeWriter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// Queue a message for delivery. Fire-and-forget; delivery is observed
    /// by the supervisor's run loop.
    pub fn write(&self, text: impl Into<String>, target: SendTarget) {
        let msg = OutboundMessage {
            text: text.into(),
            target,
        };
        if self.tx.send(msg).is_err() {
            tracing::warn!("Supervisor is gone; dropping outbound message");
        }
    }
}

// ── Supervisor ────────────────────────────────────────────────────────────────

/// Supervises the platform session: connect, channel binding, outbound
/// delivery, fault detection and restart.
pub struct Supervisor {
    client: Arc<dyn PlatformClient>,
    token: String,
    main_channel: ChannelId,
    staff_channel: Option<ChannelId>,

    binding: RwLock<ChannelBinding>,
    state_tx: watch::Sender<SessionState>,
    shutdown_tx: watch::Sender<bool>,

    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    /// Taken once by `start`.
    outbound_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<OutboundMessage>>>,

    /// Events from the live session are pushed here for the bridge's pump
    /// task.
    inbound_tx: mpsc::UnboundedSender<PlatformEvent>,
}

impl Supervisor {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        token: String,
        main_channel: ChannelId,
        staff_channel: Option<ChannelId>,
        inbound_tx: mpsc::UnboundedSender<PlatformEvent>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            client,
            token,
            main_channel,
            staff_channel,
            binding: RwLock::new(ChannelBinding::default()),
            state_tx,
            shutdown_tx,
            outbound_tx,
            outbound_rx: parking_lot::Mutex::new(Some(outbound_rx)),
            inbound_tx,
        }
    }

    /// Handle for queueing outbound messages.
    pub fn writer(&self) -> BridgeWriter {
        BridgeWriter::new(self.outbound_tx.clone())
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch session state transitions (used by callers that want to wait
    /// for `Ready`).
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to the shutdown signal.
    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Request shutdown: stop retrying and release the session. Queued
    /// messages that have not been sent yet are dropped.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Spawn the supervised connection loop. Starting twice is a no-op.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let Some(rx) = self.outbound_rx.lock().take() else {
            tracing::warn!("Supervisor already started; ignoring");
            return tokio::spawn(async {});
        };
        let sup = Arc::clone(self);
        tokio::spawn(async move { sup.run(rx).await })
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state_tx.send(state);
    }

    async fn run(&self, mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(SessionState::Connecting);
            tracing::info!("Connecting to platform...");

            match self.client.connect(&self.token).await {
                Ok(session) => {
                    backoff = INITIAL_BACKOFF;
                    let binding = ChannelBinding::resolve(
                        session.sink.as_ref(),
                        self.main_channel,
                        self.staff_channel,
                    );
                    *self.binding.write() = binding;
                    self.set_state(SessionState::Ready);
                    tracing::info!(
                        main = ?binding.main,
                        staff = ?binding.staff,
                        "Platform session ready"
                    );

                    match self
                        .run_session(session, &mut outbound_rx, &mut shutdown)
                        .await
                    {
                        Ok(()) => {
                            tracing::info!("Platform session closed cleanly");
                            break;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Platform session fault; will restart");
                            self.set_state(SessionState::Failed);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Platform connect failed");
                    self.set_state(SessionState::Failed);
                }
            }

            tracing::info!(
                backoff_secs = backoff.as_secs(),
                "Restarting platform session after backoff..."
            );
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        self.set_state(SessionState::Disconnected);
        tracing::info!("Supervisor stopped");
    }

    /// Drive one live session until shutdown or fault.
    async fn run_session(
        &self,
        session: PlatformSession,
        outbound_rx: &mut mpsc::UnboundedReceiver<OutboundMessage>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), PlatformError> {
        let PlatformSession {
            mut sink,
            mut events,
        } = session;

        loop {
            tokio::select! {
                maybe = outbound_rx.recv() => {
                    // All writers dropped: nothing left to deliver.
                    let Some(msg) = maybe else { return Ok(()) };
                    let Some(channel) = self.binding.read().channel_for(msg.target) else {
                        tracing::warn!(
                            target = ?msg.target,
                            text = msg.text.as_str(),
                            "No resolved channel for outbound message; dropping"
                        );
                        continue;
                    };
                    if let Err(e) = sink.send(channel, &msg.text).await {
                        tracing::error!(
                            channel,
                            text = msg.text.as_str(),
                            error = %e,
                            "Outbound send failed; message lost"
                        );
                        return Err(e);
                    }
                }
                ev = events.next() => {
                    match ev {
                        Some(ev) => {
                            if self.inbound_tx.send(ev).is_err() {
                                // Bridge pump is gone; treat as shutdown.
                                return Ok(());
                            }
                        }
                        None => return Err(PlatformError::StreamClosed),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PlatformEvents;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that can see every channel and fails the first `fail_sends`
    /// deliveries, recording the rest.
    struct ScriptedSink {
        fail_sends: usize,
        sends: AtomicUsize,
        delivered: mpsc::UnboundedSender<(ChannelId, String)>,
    }

    #[async_trait]
    impl PlatformSink for ScriptedSink {
        fn resolve_channel(&self, _id: ChannelId) -> bool {
            true
        }

        async fn send(&mut self, channel: ChannelId, text: &str) -> Result<(), PlatformError> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_sends {
                return Err(PlatformError::Send("scripted failure".to_string()));
            }
            let _ = self.delivered.send((channel, text.to_string()));
            Ok(())
        }
    }

    /// Event stream that stays open and silent.
    struct SilentEvents {
        _keep: mpsc::UnboundedSender<PlatformEvent>,
        rx: mpsc::UnboundedReceiver<PlatformEvent>,
    }

    impl SilentEvents {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self { _keep: tx, rx }
        }
    }

    #[async_trait]
    impl PlatformEvents for SilentEvents {
        async fn next(&mut self) -> Option<PlatformEvent> {
            self.rx.recv().await
        }
    }

    /// Client whose first session fails its first send; later sessions
    /// deliver everything.
    struct FlakyClient {
        connects: AtomicUsize,
        delivered: mpsc::UnboundedSender<(ChannelId, String)>,
    }

    #[async_trait]
    impl PlatformClient for FlakyClient {
        async fn connect(&self, _token: &str) -> Result<PlatformSession, PlatformError> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(PlatformSession {
                sink: Box::new(ScriptedSink {
                    fail_sends: if n == 0 { 1 } else { 0 },
                    sends: AtomicUsize::new(0),
                    delivered: self.delivered.clone(),
                }),
                events: Box::new(SilentEvents::new()),
            })
        }
    }

    fn make_supervisor(
        client: Arc<dyn PlatformClient>,
    ) -> (Arc<Supervisor>, mpsc::UnboundedReceiver<PlatformEvent>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let sup = Arc::new(Supervisor::new(
            client,
            "test-token".to_string(),
            100,
            Some(200),
            inbound_tx,
        ));
        (sup, inbound_rx)
    }

    async fn wait_for_state(sup: &Supervisor, want: SessionState) {
        let mut rx = sup.state_changes();
        loop {
            if *rx.borrow() == want {
                return;
            }
            rx.changed().await.expect("state channel closed");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_fault_triggers_single_restart() {
        let (delivered_tx, mut delivered_rx) = mpsc::unbounded_channel();
        let client = Arc::new(FlakyClient {
            connects: AtomicUsize::new(0),
            delivered: delivered_tx,
        });
        let (sup, _inbound) = make_supervisor(client.clone());

        let handle = sup.start();
        wait_for_state(&sup, SessionState::Ready).await;

        // First send fails, driving the Failed transition and one restart.
        let writer = sup.writer();
        writer.write("hello", SendTarget::Main);

        wait_for_state(&sup, SessionState::Failed).await;

        // The failed message is lost, not re-sent; a new message after the
        // restart goes through.
        tokio::time::sleep(Duration::from_secs(2)).await;
        wait_for_state(&sup, SessionState::Ready).await;
        assert_eq!(client.connects.load(Ordering::SeqCst), 2);

        writer.write("after restart", SendTarget::Main);
        let (channel, text) = delivered_rx.recv().await.unwrap();
        assert_eq!(channel, 100);
        assert_eq!(text, "after restart");
        assert!(delivered_rx.try_recv().is_err());

        sup.shutdown();
        handle.await.unwrap();
        assert_eq!(sup.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_backs_off() {
        struct NeverClient {
            connects: AtomicUsize,
        }

        #[async_trait]
        impl PlatformClient for NeverClient {
            async fn connect(&self, _token: &str) -> Result<PlatformSession, PlatformError> {
                self.connects.fetch_add(1, Ordering::SeqCst);
                Err(PlatformError::Connect("unreachable".to_string()))
            }
        }

        let client = Arc::new(NeverClient {
            connects: AtomicUsize::new(0),
        });
        let (sup, _inbound) = make_supervisor(client.clone());
        let handle = sup.start();

        // Backoff doubles: attempts at t=0, 1, 3, 7... advancing 8s total
        // allows exactly four attempts.
        tokio::time::sleep(Duration::from_secs(8)).await;
        let attempts = client.connects.load(Ordering::SeqCst);
        assert!(
            (3..=4).contains(&attempts),
            "expected backoff-limited attempts, got {attempts}"
        );

        sup.shutdown();
        handle.await.unwrap();
        assert_eq!(sup.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_staff_target_degrades_to_main() {
        struct NoStaffSink {
            delivered: mpsc::UnboundedSender<(ChannelId, String)>,
        }

        #[async_trait]
        impl PlatformSink for NoStaffSink {
            fn resolve_channel(&self, id: ChannelId) -> bool {
                id == 100
            }
            async fn send(&mut self, channel: ChannelId, text: &str) -> Result<(), PlatformError> {
                let _ = self.delivered.send((channel, text.to_string()));
                Ok(())
            }
        }

        struct NoStaffClient {
            delivered: mpsc::UnboundedSender<(ChannelId, String)>,
        }

        #[async_trait]
        impl PlatformClient for NoStaffClient {
            async fn connect(&self, _token: &str) -> Result<PlatformSession, PlatformError> {
                Ok(PlatformSession {
                    sink: Box::new(NoStaffSink {
                        delivered: self.delivered.clone(),
                    }),
                    events: Box::new(SilentEvents::new()),
                })
            }
        }

        let (delivered_tx, mut delivered_rx) = mpsc::unbounded_channel();
        let (sup, _inbound) = make_supervisor(Arc::new(NoStaffClient {
            delivered: delivered_tx,
        }));
        let handle = sup.start();
        wait_for_state(&sup, SessionState::Ready).await;

        sup.writer().write("report", SendTarget::Staff);
        let (channel, _) = delivered_rx.recv().await.unwrap();
        assert_eq!(channel, 100, "staff sends degrade to the main channel");

        sup.shutdown();
        handle.await.unwrap();
    }

    #[test]
    fn test_channel_for_targets() {
        let binding = ChannelBinding {
            main: Some(1),
            staff: Some(2),
        };
        assert_eq!(binding.channel_for(SendTarget::Main), Some(1));
        assert_eq!(binding.channel_for(SendTarget::Staff), Some(2));
        assert_eq!(binding.channel_for(SendTarget::Channel(9)), Some(9));

        let unbound = ChannelBinding::default();
        assert_eq!(unbound.channel_for(SendTarget::Main), None);
        assert_eq!(unbound.channel_for(SendTarget::Staff), None);
    }
}
