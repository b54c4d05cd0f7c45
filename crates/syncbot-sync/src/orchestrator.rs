//! Sync orchestrator - single-flight sync execution
//!
//! All trigger sources (manual requests, the auto-sync timer and the
//! external "scheduled-sync" signal) are messages into one actor task. The
//! actor is the only owner of the in-flight run and of the live
//! [`SyncStatus`], so single-flight is enforced in one place.
//!
//! ## Flow
//!
//! ```text
//! OrchestratorHandle ──→ mpsc<Command> ──┐
//! external signal   ──→ mpsc<()>      ───┼──→ actor loop ──→ spawned run ──→ ISyncEngine
//! SyncTimer deadline ────────────────────┘        │
//!                                          watch<SyncStatus>
//! ```
//!
//! Each run executes on its own task. A run that errors or panics is
//! recorded as `Failed`, so the status can never stay `Syncing`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use syncbot_core::{
    domain::{AuthError, SyncOutcome, SyncReport, SyncState, SyncStatus, SyncTrigger},
    ports::{IConfigStore, ISyncEngine, SyncRequest},
    usecases::{AuthController, TrackedPathSet},
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::scheduler::{SyncSchedule, SyncTimer};
use crate::SyncError;

/// Capacity of the command channel
const COMMAND_BUFFER: usize = 32;

type SyncReply = oneshot::Sender<Result<SyncReport, SyncError>>;

/// Collaborators of a sync run
#[derive(Clone)]
pub struct SyncDeps {
    pub auth: Arc<AuthController>,
    pub paths: Arc<TrackedPathSet>,
    pub store: Arc<dyn IConfigStore>,
    pub engine: Arc<dyn ISyncEngine>,
    /// Base for the default staging directory
    pub data_dir: PathBuf,
}

enum Command {
    RequestSync {
        trigger: SyncTrigger,
        reply: SyncReply,
    },
    Reconfigure {
        schedule: SyncSchedule,
        reply: oneshot::Sender<()>,
    },
}

/// How a run task ended
enum RunResult {
    /// The engine ran (or there was nothing to do)
    Completed(Result<SyncReport, String>),
    /// A precondition failed before the engine was contacted
    Rejected(SyncError),
}

struct InFlight {
    run_id: Uuid,
    trigger: SyncTrigger,
    previous: SyncStatus,
    task: JoinHandle<RunResult>,
    reply: Option<SyncReply>,
}

// ============================================================================
// OrchestratorHandle
// ============================================================================

/// Cloneable handle to the orchestrator actor
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SyncStatus>,
}

impl OrchestratorHandle {
    /// Requests a run and waits for its result
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyRunning`] immediately if a run is in flight
    /// - [`SyncError::NotAuthenticated`] if no session is available
    /// - [`SyncError::Failed`] if the run failed
    /// - [`SyncError::Stopped`] if the orchestrator has shut down
    pub async fn request_sync(&self, trigger: SyncTrigger) -> Result<SyncReport, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::RequestSync { trigger, reply })
            .await
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Applies a new auto-sync schedule
    pub async fn reconfigure(&self, schedule: SyncSchedule) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Reconfigure { schedule, reply })
            .await
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)
    }

    /// Latest status snapshot; never blocks
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

pub struct SyncOrchestrator {
    deps: SyncDeps,
    timer: SyncTimer,
    status: watch::Sender<SyncStatus>,
    inflight: Option<InFlight>,
}

impl SyncOrchestrator {
    /// Starts the actor
    ///
    /// `external_signals` is the process-wide "scheduled-sync" subscription;
    /// it is moved in here and consumed for the actor's lifetime. The actor
    /// stops when `shutdown` is cancelled, after the in-flight run resolves.
    pub fn spawn(
        deps: SyncDeps,
        schedule: SyncSchedule,
        external_signals: Option<mpsc::Receiver<()>>,
        shutdown: CancellationToken,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let timer = SyncTimer::new(schedule, Instant::now(), Utc::now());
        let initial = SyncStatus {
            next_sync: timer.next_sync(),
            ..SyncStatus::default()
        };
        let (status_tx, status_rx) = watch::channel(initial);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let actor = Self {
            deps,
            timer,
            status: status_tx,
            inflight: None,
        };

        info!(
            auto_sync = schedule.auto_sync,
            interval_secs = schedule.interval.as_secs(),
            "Starting sync orchestrator"
        );
        let task = tokio::spawn(actor.run(command_rx, external_signals, shutdown));

        (
            OrchestratorHandle {
                commands: command_tx,
                status: status_rx,
            },
            task,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut external: Option<mpsc::Receiver<()>>,
        shutdown: CancellationToken,
    ) {
        loop {
            // The timer only competes while nothing is in flight.
            let deadline = if self.inflight.is_none() {
                self.timer.deadline()
            } else {
                None
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,

                command = commands.recv() => match command {
                    Some(Command::RequestSync { trigger, reply }) => {
                        self.start(trigger, Some(reply));
                    }
                    Some(Command::Reconfigure { schedule, reply }) => {
                        self.reconfigure(schedule);
                        let _ = reply.send(());
                    }
                    None => break,
                },

                signal = next_signal(&mut external) => match signal {
                    Some(()) => self.start(SyncTrigger::ExternalSignal, None),
                    None => {
                        debug!("External sync signal source closed");
                        external = None;
                    }
                },

                joined = join_inflight(&mut self.inflight) => {
                    if let Some(inflight) = self.inflight.take() {
                        self.finish(inflight, joined);
                    }
                }

                _ = sleep_until(deadline) => {
                    info!("Auto-sync timer fired");
                    self.start(SyncTrigger::Timer, None);
                }
            }
        }

        if let Some(mut inflight) = self.inflight.take() {
            info!(run_id = %inflight.run_id, "Waiting for in-flight sync before shutdown");
            let joined = (&mut inflight.task).await;
            self.finish(inflight, joined);
        }
        info!("Sync orchestrator stopped");
    }

    fn start(&mut self, trigger: SyncTrigger, reply: Option<SyncReply>) {
        if let Some(current) = &self.inflight {
            if trigger == SyncTrigger::Timer {
                debug!(running = %current.trigger, "Timer sync suppressed, a run is in flight");
            } else {
                info!(%trigger, running = %current.trigger, "Sync rejected, a run is in flight");
            }
            if let Some(reply) = reply {
                let _ = reply.send(Err(SyncError::AlreadyRunning));
            }
            return;
        }

        let run_id = Uuid::new_v4();
        let previous = self.status.borrow().clone();
        self.status.send_modify(|s| {
            s.state = SyncState::Syncing;
        });
        info!(%run_id, %trigger, "Sync started");

        let span = info_span!("sync_run", %run_id, %trigger);
        let task = tokio::spawn(execute(self.deps.clone()).instrument(span));
        self.inflight = Some(InFlight {
            run_id,
            trigger,
            previous,
            task,
            reply,
        });
    }

    fn finish(&mut self, inflight: InFlight, joined: Result<RunResult, JoinError>) {
        let InFlight {
            run_id,
            trigger,
            previous,
            reply,
            ..
        } = inflight;
        let now = Utc::now();
        let now_instant = Instant::now();

        let completed = match joined {
            Ok(RunResult::Completed(result)) => result,
            Ok(RunResult::Rejected(err)) => {
                info!(%run_id, %trigger, reason = %err, "Sync rejected");
                // Keep an overdue timer from firing again immediately.
                if self.timer.is_due(now_instant) {
                    self.timer.rearm(now_instant, now);
                }
                let next_sync = self.timer.next_sync();
                self.status.send_replace(SyncStatus {
                    next_sync,
                    ..previous
                });
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err));
                }
                return;
            }
            Err(join_error) => {
                error!(%run_id, error = %join_error, "Sync task aborted");
                Err(format!("sync task aborted: {join_error}"))
            }
        };

        let (state, outcome, response) = match completed {
            Ok(report) => {
                info!(
                    %run_id,
                    %trigger,
                    files_synced = report.files_synced,
                    files_skipped = report.files_skipped,
                    "Sync succeeded"
                );
                let outcome = SyncOutcome::Synced {
                    files_synced: report.files_synced,
                };
                (SyncState::Success, outcome, Ok(report))
            }
            Err(message) => {
                warn!(%run_id, %trigger, error = %message, "Sync failed");
                let outcome = SyncOutcome::Failed {
                    error: message.clone(),
                };
                (SyncState::Failed, outcome, Err(SyncError::Failed(message)))
            }
        };

        self.timer.rearm(now_instant, now);
        self.status.send_replace(SyncStatus {
            state,
            last_sync: Some(now),
            next_sync: self.timer.next_sync(),
            last_result: Some(outcome),
            last_trigger: Some(trigger),
        });

        if let Some(reply) = reply {
            let _ = reply.send(response);
        }
    }

    fn reconfigure(&mut self, schedule: SyncSchedule) {
        self.timer.reconfigure(schedule, Instant::now(), Utc::now());
        let next_sync = self.timer.next_sync();
        self.status.send_modify(|s| s.next_sync = next_sync);
        info!(
            auto_sync = schedule.auto_sync,
            interval_secs = schedule.interval.as_secs(),
            next_sync = ?next_sync,
            "Sync schedule updated"
        );
    }
}

/// Body of one run; executes on its own task
async fn execute(deps: SyncDeps) -> RunResult {
    let paths = deps.paths.snapshot().await;
    let config = match deps.store.load_config().await {
        Ok(config) => config,
        Err(e) => {
            return RunResult::Completed(Err(format!("failed to load configuration: {e:#}")))
        }
    };

    let session = match deps.auth.acquire_session().await {
        Ok(session) => session,
        Err(AuthError::NotAuthenticated) => {
            return RunResult::Rejected(SyncError::NotAuthenticated)
        }
        Err(e) => return RunResult::Completed(Err(e.to_string())),
    };

    if paths.is_empty() {
        warn!("No tracked paths, nothing to sync");
        return RunResult::Completed(Ok(SyncReport::default()));
    }

    let request = SyncRequest {
        paths,
        staging_dir: config.resolve_staging_dir(&deps.data_dir),
        drive_folder: config.sync.drive_folder.clone(),
        token: session.token().clone(),
    };
    debug!(
        entries = request.paths.len(),
        staging_dir = %request.staging_dir.display(),
        drive_folder = %request.drive_folder,
        "Invoking sync engine"
    );

    let result = deps.engine.run(&request).await.map_err(|e| format!("{e:#}"));
    drop(session);
    RunResult::Completed(result)
}

async fn next_signal(external: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match external {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn join_inflight(inflight: &mut Option<InFlight>) -> Result<RunResult, JoinError> {
    match inflight {
        Some(current) => (&mut current.task).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use syncbot_core::{
        config::ConfigBuilder,
        domain::{AuthorizationCode, Credentials, PathKind, Token},
        ports::{IBrowserLauncher, IOAuthProvider, IRedirectListener, ListenError},
        store::InMemoryConfigStore,
    };
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;

    // -- Test doubles --

    struct NoopProvider;

    #[async_trait]
    impl IOAuthProvider for NoopProvider {
        fn authorization_url(&self, _credentials: &Credentials) -> anyhow::Result<String> {
            Ok("https://auth.example/authorize".into())
        }

        async fn exchange_code(
            &self,
            _credentials: &Credentials,
            _code: &AuthorizationCode,
        ) -> anyhow::Result<Token> {
            anyhow::bail!("not used")
        }

        async fn refresh(
            &self,
            _credentials: &Credentials,
            _refresh_token: &str,
        ) -> anyhow::Result<Token> {
            anyhow::bail!("not used")
        }
    }

    struct NoopBrowser;

    impl IBrowserLauncher for NoopBrowser {
        fn open(&self, _url: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct NoopListener;

    #[async_trait]
    impl IRedirectListener for NoopListener {
        async fn listen(&self) -> Result<AuthorizationCode, ListenError> {
            Err(ListenError::Unavailable("tests".into()))
        }
    }

    enum Behavior {
        Succeed,
        Fail,
        Panic,
    }

    /// Reports one synced file per tracked entry. Holds each run until
    /// `gate` can be locked.
    struct FakeEngine {
        behavior: Behavior,
        gate: Arc<AsyncMutex<()>>,
        calls: AtomicUsize,
        requests: StdMutex<Vec<SyncRequest>>,
    }

    impl FakeEngine {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                gate: Arc::new(AsyncMutex::new(())),
                calls: AtomicUsize::new(0),
                requests: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ISyncEngine for FakeEngine {
        async fn run(&self, request: &SyncRequest) -> anyhow::Result<SyncReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            let _gate = self.gate.lock().await;
            match self.behavior {
                Behavior::Succeed => Ok(SyncReport {
                    files_synced: request.paths.len() as u64,
                    files_skipped: 0,
                }),
                Behavior::Fail => anyhow::bail!("quota exceeded"),
                Behavior::Panic => panic!("engine crashed"),
            }
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        dir_path: PathBuf,
        engine: Arc<FakeEngine>,
        paths: Arc<TrackedPathSet>,
        handle: OrchestratorHandle,
        task: JoinHandle<()>,
        signals: mpsc::Sender<()>,
        shutdown: CancellationToken,
    }

    impl Harness {
        fn file(&self, name: &str) -> PathBuf {
            let path = self.dir_path.join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            path
        }

        async fn track(&self, name: &str) {
            let path = self.file(name);
            self.paths.add(&path, PathKind::File).await.unwrap();
        }

        async fn wait_syncing(&self) {
            let mut rx = self.handle.subscribe();
            rx.wait_for(|s| s.is_syncing()).await.unwrap();
        }
    }

    fn token() -> Token {
        Token {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Utc::now() + ChronoDuration::hours(2),
        }
    }

    async fn harness(
        behavior: Behavior,
        schedule: SyncSchedule,
        authenticated: bool,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        let config = ConfigBuilder::new()
            .auth_client_id("client")
            .auth_client_secret("secret")
            .sync_staging_dir(dir_path.join("staging"))
            .build();
        let mut store = InMemoryConfigStore::with_config(config);
        if authenticated {
            store = store.with_token(token());
        }
        let store: Arc<InMemoryConfigStore> = Arc::new(store);

        let auth = Arc::new(AuthController::new(
            store.clone(),
            Arc::new(NoopProvider),
            Arc::new(NoopBrowser),
            Arc::new(NoopListener),
        ));
        auth.restore().await.unwrap();
        let paths = Arc::new(TrackedPathSet::load(store.clone()).await.unwrap());
        let engine = Arc::new(FakeEngine::new(behavior));

        let deps = SyncDeps {
            auth,
            paths: paths.clone(),
            store,
            engine: engine.clone(),
            data_dir: dir_path.clone(),
        };
        let (signals, signal_rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let (handle, task) =
            SyncOrchestrator::spawn(deps, schedule, Some(signal_rx), shutdown.clone());

        Harness {
            _dir: dir,
            dir_path,
            engine,
            paths,
            handle,
            task,
            signals,
            shutdown,
        }
    }

    fn auto(minutes: u64) -> SyncSchedule {
        SyncSchedule::new(true, minutes).unwrap()
    }

    // -- Manual runs --

    #[tokio::test]
    async fn manual_sync_records_success() {
        let h = harness(Behavior::Succeed, SyncSchedule::manual_only(), true).await;
        h.track("a").await;

        let report = h.handle.request_sync(SyncTrigger::Manual).await.unwrap();
        assert_eq!(report.files_synced, 1);

        let status = h.handle.status();
        assert_eq!(status.state, SyncState::Success);
        assert!(status.last_sync.is_some());
        assert!(status.next_sync.is_none());
        assert_eq!(
            status.last_result,
            Some(SyncOutcome::Synced { files_synced: 1 })
        );
        assert_eq!(status.last_trigger, Some(SyncTrigger::Manual));
    }

    #[tokio::test]
    async fn next_sync_is_last_sync_plus_interval() {
        let h = harness(Behavior::Succeed, auto(15), true).await;
        h.track("a").await;
        h.track("b").await;

        let report = h.handle.request_sync(SyncTrigger::Manual).await.unwrap();
        assert_eq!(report.files_synced, 2);

        let status = h.handle.status();
        let last = status.last_sync.unwrap();
        assert_eq!(status.next_sync, Some(last + ChronoDuration::minutes(15)));
    }

    #[tokio::test]
    async fn engine_receives_snapshot_and_settings() {
        let h = harness(Behavior::Succeed, SyncSchedule::manual_only(), true).await;
        h.track("a").await;
        h.handle.request_sync(SyncTrigger::Manual).await.unwrap();

        let requests = h.engine.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.paths.len(), 1);
        assert_eq!(request.staging_dir, h.dir_path.join("staging"));
        assert_eq!(request.drive_folder, "sync-bot-backups");
        assert_eq!(request.token.access_token, "access");
    }

    #[tokio::test]
    async fn concurrent_request_is_rejected_without_affecting_the_run() {
        let h = harness(Behavior::Succeed, SyncSchedule::manual_only(), true).await;
        h.track("a").await;
        h.track("b").await;

        let gate = h.engine.gate.clone().lock_owned().await;
        let handle = h.handle.clone();
        let first = tokio::spawn(async move { handle.request_sync(SyncTrigger::Manual).await });
        h.wait_syncing().await;

        let second = h.handle.request_sync(SyncTrigger::Manual).await;
        assert_eq!(second, Err(SyncError::AlreadyRunning));
        let external = h.handle.request_sync(SyncTrigger::ExternalSignal).await;
        assert_eq!(external, Err(SyncError::AlreadyRunning));
        assert!(h.handle.status().is_syncing());

        drop(gate);
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.files_synced, 2);
        assert_eq!(h.engine.calls(), 1);
        assert_eq!(h.handle.status().state, SyncState::Success);
    }

    #[tokio::test]
    async fn unauthenticated_request_never_reaches_engine() {
        let h = harness(Behavior::Succeed, SyncSchedule::manual_only(), false).await;
        h.track("a").await;

        let result = h.handle.request_sync(SyncTrigger::Manual).await;
        assert_eq!(result, Err(SyncError::NotAuthenticated));
        assert_eq!(h.engine.calls(), 0);

        let status = h.handle.status();
        assert_eq!(status.state, SyncState::Idle);
        assert!(status.last_sync.is_none());
        assert!(status.last_result.is_none());
    }

    #[tokio::test]
    async fn engine_error_is_recorded_and_next_run_is_allowed() {
        let h = harness(Behavior::Fail, SyncSchedule::manual_only(), true).await;
        h.track("a").await;

        let result = h.handle.request_sync(SyncTrigger::Manual).await;
        assert!(matches!(result, Err(SyncError::Failed(msg)) if msg.contains("quota exceeded")));

        let status = h.handle.status();
        assert_eq!(status.state, SyncState::Failed);
        assert_eq!(
            status.last_result,
            Some(SyncOutcome::Failed {
                error: "quota exceeded".into()
            })
        );

        assert!(h.handle.request_sync(SyncTrigger::Manual).await.is_err());
        assert_eq!(h.engine.calls(), 2);
    }

    #[tokio::test]
    async fn panicking_engine_never_leaves_status_syncing() {
        let h = harness(Behavior::Panic, SyncSchedule::manual_only(), true).await;
        h.track("a").await;

        let result = h.handle.request_sync(SyncTrigger::Manual).await;
        assert!(matches!(result, Err(SyncError::Failed(msg)) if msg.contains("aborted")));
        assert_eq!(h.handle.status().state, SyncState::Failed);
    }

    #[tokio::test]
    async fn empty_set_succeeds_without_engine() {
        let h = harness(Behavior::Succeed, SyncSchedule::manual_only(), true).await;

        let report = h.handle.request_sync(SyncTrigger::Manual).await.unwrap();
        assert_eq!(report.files_synced, 0);
        assert_eq!(h.engine.calls(), 0);
        assert_eq!(h.handle.status().state, SyncState::Success);
    }

    #[tokio::test]
    async fn mutations_during_a_run_do_not_change_its_snapshot() {
        let h = harness(Behavior::Succeed, SyncSchedule::manual_only(), true).await;
        h.track("a").await;

        let gate = h.engine.gate.clone().lock_owned().await;
        let handle = h.handle.clone();
        let run = tokio::spawn(async move { handle.request_sync(SyncTrigger::Manual).await });
        h.wait_syncing().await;
        while h.engine.calls() == 0 {
            tokio::task::yield_now().await;
        }

        h.track("b").await;
        h.paths
            .remove(&h.dir_path.join("a"))
            .await
            .unwrap();
        drop(gate);

        assert_eq!(run.await.unwrap().unwrap().files_synced, 1);
        let requests = h.engine.requests.lock().unwrap();
        assert_eq!(requests[0].paths[0].path(), h.dir_path.join("a").as_path());
    }

    // -- Timer and external signal --

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_interval() {
        let h = harness(Behavior::Succeed, auto(1), true).await;
        h.track("a").await;
        let started = Instant::now();

        let mut rx = h.handle.subscribe();
        rx.wait_for(|s| s.last_result.is_some()).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(60));
        let status = h.handle.status();
        assert_eq!(status.last_trigger, Some(SyncTrigger::Timer));
        assert_eq!(
            status.next_sync,
            Some(status.last_sync.unwrap() + ChronoDuration::minutes(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_timer_run_does_not_disable_the_timer() {
        let h = harness(Behavior::Fail, auto(1), true).await;
        h.track("a").await;

        tokio::time::sleep(Duration::from_secs(60 * 3 + 30)).await;
        assert_eq!(h.engine.calls(), 3);
        assert_eq!(h.handle.status().state, SyncState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_is_suppressed_while_a_manual_run_is_in_flight() {
        let h = harness(Behavior::Succeed, auto(1), true).await;
        h.track("a").await;

        let gate = h.engine.gate.clone().lock_owned().await;
        let handle = h.handle.clone();
        let manual = tokio::spawn(async move { handle.request_sync(SyncTrigger::Manual).await });
        h.wait_syncing().await;

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(h.engine.calls(), 1);

        drop(gate);
        manual.await.unwrap().unwrap();
        let status = h.handle.status();
        assert_eq!(status.last_trigger, Some(SyncTrigger::Manual));
        assert_eq!(
            status.next_sync,
            Some(status.last_sync.unwrap() + ChronoDuration::minutes(1))
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.engine.calls(), 2);
        assert_eq!(h.handle.status().last_trigger, Some(SyncTrigger::Timer));
    }

    #[tokio::test]
    async fn external_signal_runs_a_tagged_sync() {
        let h = harness(Behavior::Succeed, SyncSchedule::manual_only(), true).await;
        h.track("a").await;
        let mut rx = h.handle.subscribe();

        h.signals.send(()).await.unwrap();
        rx.wait_for(|s| s.last_result.is_some()).await.unwrap();

        assert_eq!(h.engine.calls(), 1);
        assert_eq!(
            h.handle.status().last_trigger,
            Some(SyncTrigger::ExternalSignal)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shorter_interval_takes_effect_immediately() {
        let h = harness(Behavior::Succeed, auto(60), true).await;
        h.track("a").await;
        let started = Instant::now();

        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        assert_eq!(h.engine.calls(), 0);

        h.handle.reconfigure(auto(5)).await.unwrap();
        let mut rx = h.handle.subscribe();
        rx.wait_for(|s| s.last_result.is_some()).await.unwrap();

        assert_eq!(h.engine.calls(), 1);
        assert!(started.elapsed() < Duration::from_secs(11 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn longer_interval_pushes_the_deadline_out() {
        let h = harness(Behavior::Succeed, auto(10), true).await;
        h.track("a").await;

        h.handle.reconfigure(auto(60)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(h.engine.calls(), 0);

        tokio::time::sleep(Duration::from_secs(31 * 60)).await;
        assert_eq!(h.engine.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_auto_sync_clears_next_sync() {
        let h = harness(Behavior::Succeed, auto(1), true).await;
        h.track("a").await;
        assert!(h.handle.status().next_sync.is_some());

        h.handle
            .reconfigure(SyncSchedule::new(false, 1).unwrap())
            .await
            .unwrap();
        assert!(h.handle.status().next_sync.is_none());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.engine.calls(), 0);
    }

    // -- Shutdown --

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_run() {
        let h = harness(Behavior::Succeed, SyncSchedule::manual_only(), true).await;
        h.track("a").await;

        let gate = h.engine.gate.clone().lock_owned().await;
        let handle = h.handle.clone();
        let run = tokio::spawn(async move { handle.request_sync(SyncTrigger::Manual).await });
        h.wait_syncing().await;

        h.shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!h.task.is_finished());

        drop(gate);
        h.task.await.unwrap();
        assert!(run.await.unwrap().is_ok());
        assert_eq!(h.handle.status().state, SyncState::Success);
        assert_eq!(
            h.handle.request_sync(SyncTrigger::Manual).await,
            Err(SyncError::Stopped)
        );
    }
}
