//! Synchronization controller
//!
//! Combines the snapshot fetcher, the stream connection manager and the
//! reducer into one live view of a match. Each subscription runs as a
//! single task that owns the `MatchState`; every transition happens on
//! that task, one input at a time:
//!
//! ```text
//! LOADING ──snapshot + stream open──▶ SYNCED ◀──reconnect──▶ DISCONNECTED
//!    │                                                           │
//!    └──────────── AUTH / NOT_FOUND from the fetcher ────────────┴──▶ FAILED
//! ```
//!
//! Observers get immutable [`SyncView`] values through a `watch` channel.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::SyncSettings;
use crate::error::{FetchResult, StreamError, SyncError};
use crate::models::{MatchState, ShareToken};
use crate::reducer::{reduce, reduce_buffered, Reduction, ResyncReason, ServerEvent};
use crate::snapshot::SnapshotFetcher;
use crate::stream::{ConnectionId, ConnectionManager, Delivery, EventTransport, StreamSignal};

/// Where a subscription is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Waiting for the first snapshot and stream
    Loading,
    /// Snapshot installed and stream live
    Synced,
    /// Repairing: stream down or snapshot being refetched
    Disconnected,
    /// Unrecoverable; see [`SyncView::error`]
    Failed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncPhase::Loading => "loading",
            SyncPhase::Synced => "synced",
            SyncPhase::Disconnected => "disconnected",
            SyncPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What observers see
#[derive(Debug, Clone, PartialEq)]
pub struct SyncView {
    pub phase: SyncPhase,
    /// `None` while loading and once failed
    pub state: Option<Arc<MatchState>>,
    /// True only while synced
    pub connected: bool,
    /// Set only for unrecoverable failures
    pub error: Option<SyncError>,
}

impl SyncView {
    fn loading() -> Self {
        Self {
            phase: SyncPhase::Loading,
            state: None,
            connected: false,
            error: None,
        }
    }
}

/// Handle to one live match subscription
///
/// Dropping the handle closes the subscription.
pub struct LiveMatch {
    view_rx: watch::Receiver<SyncView>,
    closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
    subscription: String,
}

impl LiveMatch {
    /// Start synchronizing the match addressed by `token`
    pub fn spawn<F, T>(
        token: ShareToken,
        fetcher: Arc<F>,
        transport: Arc<T>,
        settings: SyncSettings,
    ) -> Self
    where
        F: SnapshotFetcher,
        T: EventTransport,
    {
        let subscription = format!("live-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        let (view_tx, view_rx) = watch::channel(SyncView::loading());
        let closed = Arc::new(AtomicBool::new(false));
        let (manager, deliveries) = ConnectionManager::new(transport, settings.heartbeat_timeout);

        let controller = Controller {
            token,
            fetcher,
            manager,
            settings,
            view_tx,
            closed: Arc::clone(&closed),
            state: None,
            error: None,
            connection: None,
            connection_live: false,
            synced_once: false,
            buffer: VecDeque::new(),
            fetch: None,
            stale_fetch: false,
            retry: None,
        };

        let span = tracing::info_span!("live_match", subscription = %subscription);
        let task = tokio::spawn(controller.run(deliveries).instrument(span));

        Self {
            view_rx,
            closed,
            task,
            subscription,
        }
    }

    /// Identifier used in log output for this subscription
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// The latest view
    pub fn view(&self) -> SyncView {
        self.view_rx.borrow().clone()
    }

    /// A receiver of every future view
    pub fn subscribe(&self) -> watch::Receiver<SyncView> {
        self.view_rx.clone()
    }

    /// Wait for the next view. `None` once the subscription has ended.
    pub async fn changed(&mut self) -> Option<SyncView> {
        self.view_rx.changed().await.ok()?;
        let view = self.view_rx.borrow_and_update().clone();
        Some(view)
    }

    /// Wait until a view satisfies `predicate`
    pub async fn wait_until<P>(&self, predicate: P) -> Option<SyncView>
    where
        P: FnMut(&SyncView) -> bool,
    {
        let mut rx = self.view_rx.clone();
        let view = rx.wait_for(predicate).await.ok()?.clone();
        Some(view)
    }

    /// Tear down the stream and any pending retry. No view is published
    /// after this returns.
    pub fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(subscription = %self.subscription, "Closing live match");
        }
        self.task.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for LiveMatch {
    fn drop(&mut self) {
        self.close();
    }
}

type FetchFuture = Pin<Box<dyn Future<Output = FetchResult<MatchState>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryAction {
    /// Reopen the stream on the same token
    Reconnect,
    /// Fetch a fresh snapshot, then reattach
    Refetch,
}

struct Retry {
    action: RetryAction,
    timer: Pin<Box<Sleep>>,
}

struct Controller<F: SnapshotFetcher, T: EventTransport> {
    token: ShareToken,
    fetcher: Arc<F>,
    manager: ConnectionManager<T>,
    settings: SyncSettings,
    view_tx: watch::Sender<SyncView>,
    closed: Arc<AtomicBool>,

    state: Option<MatchState>,
    error: Option<SyncError>,
    connection: Option<ConnectionId>,
    /// The current connection has been accepted by the server
    connection_live: bool,
    synced_once: bool,
    /// Stream messages received while no usable base state exists
    buffer: VecDeque<ServerEvent>,
    fetch: Option<FetchFuture>,
    /// The in-flight fetch may predate a change that needs a resync
    stale_fetch: bool,
    retry: Option<Retry>,
}

impl<F: SnapshotFetcher, T: EventTransport> Controller<F, T> {
    async fn run(mut self, mut deliveries: mpsc::UnboundedReceiver<Delivery>) {
        info!("Starting live match sync");
        self.begin_fetch("initial load");
        self.publish();

        loop {
            tokio::select! {
                result = next_snapshot(&mut self.fetch) => self.on_snapshot(result),
                Some(delivery) = deliveries.recv() => self.on_delivery(delivery),
                action = next_retry(&mut self.retry) => self.on_retry(action),
                else => break,
            }

            self.publish();

            if self.error.is_some() {
                break;
            }
        }

        debug!("Live match sync stopped");
    }

    /// Start a snapshot fetch unless one is in flight or already waiting on
    /// the retry timer
    fn begin_fetch(&mut self, reason: &str) {
        if self.fetch.is_some() || self.refetch_pending() {
            return;
        }

        self.stale_fetch = false;
        info!(reason, "Fetching snapshot");
        let fetcher = Arc::clone(&self.fetcher);
        let token = self.token.clone();
        self.fetch = Some(Box::pin(async move { fetcher.fetch(&token).await }));
    }

    fn on_snapshot(&mut self, result: FetchResult<MatchState>) {
        self.fetch = None;
        let stale = std::mem::take(&mut self.stale_fetch);

        let state = match result.map_err(SyncError::from) {
            Ok(state) => state,
            Err(e) if e.is_recoverable() => {
                // Buffered messages wait for the retried snapshot.
                warn!(error = %e, "Snapshot fetch failed, will retry");
                self.schedule(RetryAction::Refetch);
                return;
            }
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        info!(
            status = %state.status,
            score_a = state.team_a_score,
            score_b = state.team_b_score,
            events = state.events.len(),
            buffered = self.buffer.len(),
            "Snapshot installed"
        );
        self.state = Some(state);
        self.replay_buffer();

        if stale {
            self.begin_fetch("change during previous fetch");
        }

        if self.connection.is_none() && self.retry.is_none() {
            self.attach();
        }
    }

    /// Apply buffered messages in arrival order on top of a fresh snapshot
    fn replay_buffer(&mut self) {
        while let Some(event) = self.buffer.pop_front() {
            let Some(state) = self.state.as_ref() else {
                return;
            };
            match reduce_buffered(state, &event) {
                Reduction::Next(next) => self.state = Some(next),
                Reduction::Unchanged => {}
                Reduction::Resync(reason) => {
                    // The rest stays buffered for the next snapshot.
                    self.resync(reason);
                    return;
                }
            }
        }
    }

    fn on_delivery(&mut self, delivery: Delivery) {
        if !self.manager.is_current(delivery.connection) {
            debug!(connection = %delivery.connection, "Dropping signal from stale connection");
            return;
        }

        match delivery.signal {
            StreamSignal::Open => {
                self.connection_live = true;
            }
            StreamSignal::Message { event_type, data } => self.on_message(&event_type, &data),
            StreamSignal::Error(err) => self.on_stream_error(err),
        }
    }

    fn on_message(&mut self, event_type: &str, data: &str) {
        let event = match ServerEvent::decode(event_type, data) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(event_type, "Ignoring unknown stream event");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed stream event");
                self.resync(ResyncReason::MalformedPayload {
                    event_type: event_type.to_string(),
                });
                return;
            }
        };

        match event {
            ServerEvent::Heartbeat => return,
            ServerEvent::Connected => self.connection_live = true,
            _ => {}
        }

        let state = match self.state.as_ref() {
            Some(state) if !self.resyncing() => state,
            _ => {
                if event != ServerEvent::Connected {
                    debug!(event = event.name(), "Buffering until snapshot lands");
                    self.buffer.push_back(event);
                }
                return;
            }
        };

        match reduce(state, &event) {
            Reduction::Next(next) => {
                debug!(event = event.name(), "Applied stream event");
                self.state = Some(next);
            }
            Reduction::Unchanged => {}
            Reduction::Resync(reason) => self.resync(reason),
        }
    }

    fn on_stream_error(&mut self, err: StreamError) {
        self.manager.close_all();
        self.connection = None;
        self.connection_live = false;

        if err.is_fatal() {
            warn!(error = %err, "Event stream rejected, resyncing");
            self.schedule(RetryAction::Refetch);
        } else {
            warn!(error = %err, "Event stream lost, reconnecting");
            self.schedule(RetryAction::Reconnect);
        }
    }

    fn on_retry(&mut self, action: RetryAction) {
        self.retry = None;
        match action {
            RetryAction::Reconnect => {
                if self.settings.resync_on_reconnect {
                    self.resync(ResyncReason::Reconnect);
                }
                self.attach();
            }
            RetryAction::Refetch => self.begin_fetch("retry"),
        }
    }

    fn resync(&mut self, reason: ResyncReason) {
        if let Some(desync) = reason.desync() {
            warn!(error = %desync, "Local state diverged");
        }
        info!(reason = %reason, "Resyncing from snapshot");

        if self.fetch.is_some() {
            self.stale_fetch = true;
        } else {
            // Waits out a pending refetch timer instead of bypassing it.
            self.begin_fetch("resync");
        }
    }

    fn refetch_pending(&self) -> bool {
        matches!(&self.retry, Some(r) if r.action == RetryAction::Refetch)
    }

    /// A snapshot is loading or due; the local state is not trusted
    fn resyncing(&self) -> bool {
        self.fetch.is_some() || self.refetch_pending()
    }

    /// Arm the single retry timer. A pending refetch is never downgraded to
    /// a plain reconnect.
    fn schedule(&mut self, action: RetryAction) {
        let action = match &self.retry {
            Some(pending) if pending.action == RetryAction::Refetch => RetryAction::Refetch,
            _ => action,
        };
        let delay = self.settings.reconnect_delay;
        debug!(?action, delay_ms = delay.as_millis() as u64, "Scheduling retry");

        self.retry = Some(Retry {
            action,
            timer: Box::pin(tokio::time::sleep(delay)),
        });
    }

    fn attach(&mut self) {
        self.retry = None;
        self.connection_live = false;
        self.connection = Some(self.manager.open(&self.token));
    }

    fn fail(&mut self, err: SyncError) {
        error!(error = %err, "Live match sync failed");
        if let Some(hint) = err.recovery_suggestion() {
            info!(hint, "Recovery");
        }

        self.manager.close_all();
        self.connection = None;
        self.connection_live = false;
        self.retry = None;
        self.fetch = None;
        self.buffer.clear();
        self.state = None;
        self.error = Some(err);
    }

    fn phase(&self) -> SyncPhase {
        if self.error.is_some() {
            SyncPhase::Failed
        } else if self.state.is_none() {
            SyncPhase::Loading
        } else if self.connection_live && !self.resyncing() {
            SyncPhase::Synced
        } else if self.synced_once {
            SyncPhase::Disconnected
        } else {
            SyncPhase::Loading
        }
    }

    fn publish(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let phase = self.phase();
        let connected = phase == SyncPhase::Synced;
        if connected {
            self.synced_once = true;
        }
        if let Some(state) = self.state.as_mut() {
            state.connected = connected;
        }

        let view = SyncView {
            phase,
            state: self.state.clone().map(Arc::new),
            connected,
            error: self.error.clone(),
        };

        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            if current.phase != view.phase {
                info!(from = %current.phase, to = %view.phase, "Sync phase changed");
            }
            *current = view;
            true
        });
    }
}

async fn next_snapshot(fetch: &mut Option<FetchFuture>) -> FetchResult<MatchState> {
    match fetch {
        Some(fut) => fut.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_retry(retry: &mut Option<Retry>) -> RetryAction {
    match retry {
        Some(retry) => {
            retry.timer.as_mut().await;
            retry.action
        }
        None => std::future::pending().await,
    }
}
