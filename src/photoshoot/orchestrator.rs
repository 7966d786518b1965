// Photoshoot orchestrator - one pose at a time, partial results kept, single-pose regeneration

use super::MAX_POSES;
use super::service::{GenerationError, GenerationRequest, GenerationService};
use super::types::{
    GeneratedArtifact, RunPhase, RunSnapshot, RunState, ScopedError, SessionSeed, UploadedSource,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Cooperative cancellation, checked before every generation call
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Run,
    Regenerate(u32),
}

/// Everything known about the current source
#[derive(Default)]
struct Session {
    source: Option<UploadedSource>,
    seed: Option<SessionSeed>,
    state: RunState,
    busy: Option<Activity>,
    last_error: Option<ScopedError>,
}

impl Session {
    fn ensure_idle(&self) -> Result<(), OrchestratorError> {
        match self.busy {
            Some(Activity::Run) => Err(OrchestratorError::RunInProgress),
            Some(Activity::Regenerate(pose)) => Err(OrchestratorError::RegenerationInProgress(pose)),
            None => Ok(()),
        }
    }

    fn current(&self) -> Result<(UploadedSource, SessionSeed), OrchestratorError> {
        match (&self.source, &self.seed) {
            (Some(source), Some(seed)) => Ok((source.clone(), seed.clone())),
            _ => Err(OrchestratorError::NoSource),
        }
    }

    /// Replace the source, discarding every result of the previous one
    fn install(&mut self, source: UploadedSource) -> Result<SessionSeed, OrchestratorError> {
        if !source.is_image() {
            return Err(OrchestratorError::UnsupportedMediaType(
                source.media_type().to_string(),
            ));
        }

        let seed = SessionSeed::mint();
        self.source = Some(source);
        self.seed = Some(seed.clone());
        self.state.reset();
        self.last_error = None;
        Ok(seed)
    }

    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            source: self.source.as_ref().map(UploadedSource::info),
            seed: self.seed.clone(),
            phase: self.state.phase().clone(),
            cursor: self.state.cursor(),
            total: self.state.total(),
            artifacts: self.state.artifacts().cloned().collect(),
            regenerating: match self.busy {
                Some(Activity::Regenerate(pose)) => Some(pose),
                _ => None,
            },
            last_error: self.last_error.clone(),
        }
    }
}

struct Shared {
    service: Arc<dyn GenerationService>,
    session: Mutex<Session>,
    updates: watch::Sender<RunSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, session: &Session) {
        self.updates.send_replace(session.snapshot());
    }

    /// Mutate the session and publish the result
    fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.lock();
        let result = f(&mut session);
        self.publish(&session);
        result
    }
}

/// Marks the orchestrator busy until released or dropped
///
/// Dropping it without release means the operation was abandoned: a run that
/// was still going ends as cancelled with its partial results kept.
struct ActivityGuard {
    shared: Arc<Shared>,
    released: bool,
}

impl ActivityGuard {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            released: false,
        }
    }

    /// Apply the final transition and free the orchestrator in one step
    fn release<R>(mut self, f: impl FnOnce(&mut Session) -> R) -> R {
        self.released = true;
        self.shared.update(|session| {
            let result = f(session);
            session.busy = None;
            result
        })
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        self.shared.update(|session| {
            if session.state.is_running() {
                let completed = session.state.cursor();
                let total = session.state.total();
                session.state.set_phase(RunPhase::Cancelled { completed, total });
                tracing::warn!(completed, total, "Run abandoned before finishing");
            }
            session.busy = None;
        });
    }
}

/// Owns the run for the current source
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct PhotoshootOrchestrator {
    shared: Arc<Shared>,
}

impl PhotoshootOrchestrator {
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        let (updates, _) = watch::channel(RunSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                service,
                session: Mutex::new(Session::default()),
                updates,
            }),
        }
    }

    /// Receive a snapshot after every state change
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.shared.updates.subscribe()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.shared.updates.borrow().clone()
    }

    pub fn phase(&self) -> RunPhase {
        self.shared.lock().state.phase().clone()
    }

    /// Current artifacts in pose order
    pub fn artifacts(&self) -> Vec<GeneratedArtifact> {
        self.shared.lock().state.artifacts().cloned().collect()
    }

    pub fn seed(&self) -> Option<SessionSeed> {
        self.shared.lock().seed.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.lock().busy.is_some()
    }

    pub fn service_name(&self) -> String {
        self.shared.service.name().to_string()
    }

    /// Replace the source image and mint a new seed
    pub fn new_source(&self, source: UploadedSource) -> Result<SessionSeed, OrchestratorError> {
        let mut session = self.shared.lock();
        session.ensure_idle()?;
        let bytes = source.len();
        let seed = session.install(source)?;

        tracing::info!(seed = %seed, bytes, "New source uploaded");
        self.shared.publish(&session);
        Ok(seed)
    }

    /// Transition to running; the returned run must be driven to do any work
    pub fn begin_run(&self, total: u32) -> Result<PendingRun, OrchestratorError> {
        let mut session = self.shared.lock();
        session.ensure_idle()?;
        validate_pose_count(total)?;
        let pending = self.begin_run_locked(&mut session, total)?;
        self.shared.publish(&session);
        Ok(pending)
    }

    pub async fn start_run(
        &self,
        total: u32,
        cancel: CancelToken,
    ) -> Result<Vec<GeneratedArtifact>, OrchestratorError> {
        self.begin_run(total)?.drive(cancel).await
    }

    /// Upload a source and run it, with no window for another operation in between
    pub async fn shoot(
        &self,
        source: UploadedSource,
        total: u32,
        cancel: CancelToken,
    ) -> Result<Vec<GeneratedArtifact>, OrchestratorError> {
        let pending = {
            let mut session = self.shared.lock();
            session.ensure_idle()?;
            validate_pose_count(total)?;
            session.install(source)?;
            let pending = self.begin_run_locked(&mut session, total)?;
            self.shared.publish(&session);
            pending
        };

        pending.drive(cancel).await
    }

    fn begin_run_locked(
        &self,
        session: &mut Session,
        total: u32,
    ) -> Result<PendingRun, OrchestratorError> {
        let (source, seed) = session.current()?;

        session.state.begin(total);
        session.last_error = None;
        session.busy = Some(Activity::Run);

        Ok(PendingRun {
            guard: ActivityGuard::new(self.shared.clone()),
            source,
            seed,
            total,
        })
    }

    /// Mark one pose as regenerating; the returned job must be driven
    pub fn begin_regeneration(
        &self,
        pose_index: u32,
        extra_instruction: Option<String>,
    ) -> Result<PendingRegeneration, OrchestratorError> {
        let mut session = self.shared.lock();
        session.ensure_idle()?;
        if !(1..=MAX_POSES).contains(&pose_index) {
            return Err(OrchestratorError::InvalidPoseIndex(pose_index));
        }
        let (source, seed) = session.current()?;

        session.busy = Some(Activity::Regenerate(pose_index));
        self.shared.publish(&session);

        Ok(PendingRegeneration {
            guard: ActivityGuard::new(self.shared.clone()),
            source,
            seed,
            pose_index,
            extra_instruction: extra_instruction.filter(|s| !s.trim().is_empty()),
        })
    }

    pub async fn regenerate_pose(
        &self,
        pose_index: u32,
        extra_instruction: Option<&str>,
        cancel: CancelToken,
    ) -> Result<GeneratedArtifact, OrchestratorError> {
        self.begin_regeneration(pose_index, extra_instruction.map(str::to_string))?
            .drive(cancel)
            .await
    }
}

fn validate_pose_count(total: u32) -> Result<(), OrchestratorError> {
    if (1..=MAX_POSES).contains(&total) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidPoseCount(total))
    }
}

/// A run that has started but not yet generated anything
pub struct PendingRun {
    guard: ActivityGuard,
    source: UploadedSource,
    seed: SessionSeed,
    total: u32,
}

impl std::fmt::Debug for PendingRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRun")
            .field("seed", &self.seed)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl PendingRun {
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn seed(&self) -> &SessionSeed {
        &self.seed
    }

    /// Generate poses 1..=total strictly in order, stopping at the first failure
    pub async fn drive(
        self,
        cancel: CancelToken,
    ) -> Result<Vec<GeneratedArtifact>, OrchestratorError> {
        let PendingRun {
            guard,
            source,
            seed,
            total,
        } = self;
        let service = guard.shared.service.clone();

        tracing::info!(total, seed = %seed, service = service.name(), "Starting photoshoot run");

        for pose_index in 1..=total {
            if cancel.is_cancelled() {
                let completed = pose_index - 1;
                guard.release(|session| {
                    session
                        .state
                        .set_phase(RunPhase::Cancelled { completed, total });
                });
                tracing::warn!(completed, total, "Run cancelled");
                return Err(OrchestratorError::Cancelled { completed });
            }

            tracing::debug!(pose = pose_index, total, "Generating pose");

            match service
                .generate(GenerationRequest::new(&source, pose_index, &seed))
                .await
            {
                Ok(artifact) => {
                    guard.shared.update(|session| {
                        session.state.record(artifact);
                        session.state.advance(pose_index);
                    });
                    tracing::info!(pose = pose_index, total, "Pose complete");
                }
                Err(error) => {
                    tracing::error!(pose = pose_index, total, %error, "Pose failed, stopping run");
                    let message = error.to_string();
                    guard.release(|session| {
                        session.state.set_phase(RunPhase::Failed { pose_index, total });
                        session.last_error = Some(ScopedError::Run {
                            pose_index,
                            message,
                        });
                    });
                    return Err(OrchestratorError::PoseFailed {
                        pose_index,
                        source: error,
                    });
                }
            }
        }

        tracing::info!(total, "Photoshoot run complete");

        Ok(guard.release(|session| {
            session.state.set_phase(RunPhase::Completed { total });
            session.state.artifacts().cloned().collect()
        }))
    }
}

/// A single-pose regeneration that has been admitted but not yet called
pub struct PendingRegeneration {
    guard: ActivityGuard,
    source: UploadedSource,
    seed: SessionSeed,
    pose_index: u32,
    extra_instruction: Option<String>,
}

impl PendingRegeneration {
    pub fn pose_index(&self) -> u32 {
        self.pose_index
    }

    /// Call the service once; only this pose's entry can change
    pub async fn drive(self, cancel: CancelToken) -> Result<GeneratedArtifact, OrchestratorError> {
        let PendingRegeneration {
            guard,
            source,
            seed,
            pose_index,
            extra_instruction,
        } = self;

        if cancel.is_cancelled() {
            guard.release(|_| ());
            return Err(OrchestratorError::Cancelled { completed: 0 });
        }

        tracing::info!(pose = pose_index, seed = %seed, "Regenerating pose");

        let request = GenerationRequest::new(&source, pose_index, &seed)
            .with_extra_instruction(extra_instruction.as_deref());
        let service = guard.shared.service.clone();

        match service.generate(request).await {
            Ok(artifact) => {
                let stored = artifact.clone();
                guard.release(|session| {
                    session.state.record(stored);
                    if matches!(
                        &session.last_error,
                        Some(ScopedError::Pose { pose_index: p, .. }) if *p == pose_index
                    ) {
                        session.last_error = None;
                    }
                });
                tracing::info!(pose = pose_index, "Pose regenerated");
                Ok(artifact)
            }
            Err(error) => {
                tracing::error!(pose = pose_index, %error, "Regeneration failed");
                let message = error.to_string();
                guard.release(|session| {
                    session.last_error = Some(ScopedError::Pose {
                        pose_index,
                        message,
                    });
                });
                Err(OrchestratorError::PoseFailed {
                    pose_index,
                    source: error,
                })
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("A photoshoot run is already in progress")]
    RunInProgress,

    #[error("Pose {0} is being regenerated")]
    RegenerationInProgress(u32),

    #[error("No source image uploaded")]
    NoSource,

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Pose count must be between 1 and 10, got {0}")]
    InvalidPoseCount(u32),

    #[error("Pose index must be between 1 and 10, got {0}")]
    InvalidPoseIndex(u32),

    #[error("Pose {pose_index} failed: {source}")]
    PoseFailed {
        pose_index: u32,
        #[source]
        source: GenerationError,
    },

    #[error("Cancelled after {completed} poses")]
    Cancelled { completed: u32 },
}

impl OrchestratorError {
    /// Another operation holds the orchestrator
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            OrchestratorError::RunInProgress | OrchestratorError::RegenerationInProgress(_)
        )
    }

    /// Pose the error is about, when there is one
    pub fn pose_index(&self) -> Option<u32> {
        match self {
            OrchestratorError::PoseFailed { pose_index, .. } => Some(*pose_index),
            OrchestratorError::RegenerationInProgress(pose)
            | OrchestratorError::InvalidPoseIndex(pose) => Some(*pose),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photoshoot::types::ImageRef;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Call {
        pose_index: u32,
        seed: SessionSeed,
        extra: Option<String>,
    }

    /// Fake service: succeeds unless told otherwise, records every call
    #[derive(Default)]
    struct ScriptedService {
        failing: Mutex<HashSet<u32>>,
        hang_at: Option<u32>,
        cancel_on: Mutex<Option<(u32, CancelToken)>>,
        calls: Mutex<Vec<Call>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        probe: Mutex<Option<watch::Receiver<RunSnapshot>>>,
        observed: Mutex<Vec<usize>>,
    }

    impl ScriptedService {
        fn failing_at(poses: &[u32]) -> Self {
            let service = Self::default();
            service.set_failing(poses);
            service
        }

        fn set_failing(&self, poses: &[u32]) {
            *self.failing.lock().unwrap() = poses.iter().copied().collect();
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn generate(
            &self,
            request: GenerationRequest<'_>,
        ) -> Result<GeneratedArtifact, GenerationError> {
            let pose = request.pose_index;
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            self.calls.lock().unwrap().push(Call {
                pose_index: pose,
                seed: request.seed.clone(),
                extra: request.extra_instruction.map(str::to_string),
            });

            let seen = {
                let probe = self.probe.lock().unwrap();
                probe.as_ref().map(|rx| rx.borrow().artifacts.len())
            };
            if let Some(seen) = seen {
                self.observed.lock().unwrap().push(seen);
            }

            tokio::task::yield_now().await;

            if self.hang_at == Some(pose) {
                std::future::pending::<()>().await;
            }

            let cancel = self.cancel_on.lock().unwrap().clone();
            if let Some((at, token)) = cancel {
                if at == pose {
                    token.cancel();
                }
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.lock().unwrap().contains(&pose) {
                return Err(GenerationError::UpstreamUnavailable(format!(
                    "pose {} failed",
                    pose
                )));
            }

            Ok(GeneratedArtifact::new(
                pose,
                ImageRef::Remote(format!("https://img.test/{}/{}.png", request.seed, pose)),
                format!("pose {}", pose),
            ))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn source() -> UploadedSource {
        UploadedSource::new(b"saree".to_vec(), "image/jpeg")
    }

    fn orchestrator(service: ScriptedService) -> (PhotoshootOrchestrator, Arc<ScriptedService>) {
        let service = Arc::new(service);
        let orchestrator = PhotoshootOrchestrator::new(service.clone());
        (orchestrator, service)
    }

    fn indices(artifacts: &[GeneratedArtifact]) -> Vec<u32> {
        artifacts.iter().map(|a| a.pose_index).collect()
    }

    #[tokio::test]
    async fn test_full_run_yields_one_artifact_per_pose() {
        for total in 1..=MAX_POSES {
            let (orch, service) = orchestrator(ScriptedService::default());
            let seed = orch.new_source(source()).unwrap();

            let artifacts = orch.start_run(total, CancelToken::new()).await.unwrap();

            assert_eq!(indices(&artifacts), (1..=total).collect::<Vec<_>>());
            assert_eq!(orch.phase(), RunPhase::Completed { total });
            assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 1);
            assert!(service.calls().iter().all(|c| c.seed == seed));
            assert!(!orch.is_busy());
        }
    }

    #[tokio::test]
    async fn test_failure_stops_run_and_keeps_earlier_poses() {
        let (orch, service) = orchestrator(ScriptedService::failing_at(&[3]));
        orch.new_source(source()).unwrap();

        let err = orch.start_run(5, CancelToken::new()).await.unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::PoseFailed { pose_index: 3, source: GenerationError::UpstreamUnavailable(_) }
        ));
        assert_eq!(indices(&orch.artifacts()), vec![1, 2]);
        assert_eq!(orch.phase(), RunPhase::Failed { pose_index: 3, total: 5 });
        assert_eq!(service.calls().len(), 3);

        let snapshot = orch.snapshot();
        assert_eq!(snapshot.cursor, 2);
        assert_eq!(snapshot.last_error.as_ref().map(ScopedError::pose_index), Some(3));
        assert!(matches!(snapshot.last_error, Some(ScopedError::Run { .. })));
    }

    #[tokio::test]
    async fn test_regeneration_replaces_only_target_pose() {
        let (orch, service) = orchestrator(ScriptedService::default());
        let seed = orch.new_source(source()).unwrap();
        let before = orch.start_run(4, CancelToken::new()).await.unwrap();

        let fresh = orch
            .regenerate_pose(2, Some("brighter light"), CancelToken::new())
            .await
            .unwrap();

        let after = orch.artifacts();
        assert_eq!(indices(&after), vec![1, 2, 3, 4]);
        for (old, new) in before.iter().zip(&after) {
            if old.pose_index == 2 {
                assert_ne!(old.id, new.id);
                assert_eq!(new.id, fresh.id);
                assert!(new.produced_at >= old.produced_at);
            } else {
                assert_eq!(old, new);
            }
        }

        let last = service.calls().pop().unwrap();
        assert_eq!(last.pose_index, 2);
        assert_eq!(last.seed, seed);
        assert_eq!(last.extra.as_deref(), Some("brighter light"));
        assert_eq!(orch.phase(), RunPhase::Completed { total: 4 });
    }

    #[tokio::test]
    async fn test_failed_regeneration_leaves_gallery_untouched() {
        let (orch, service) = orchestrator(ScriptedService::default());
        orch.new_source(source()).unwrap();
        orch.start_run(3, CancelToken::new()).await.unwrap();
        let before = orch.artifacts();

        service.set_failing(&[2]);
        let err = orch
            .regenerate_pose(2, None, CancelToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.pose_index(), Some(2));
        assert_eq!(orch.artifacts(), before);
        assert_eq!(
            orch.snapshot().last_error,
            Some(ScopedError::Pose {
                pose_index: 2,
                message: "Upstream unavailable: pose 2 failed".to_string()
            })
        );

        service.set_failing(&[]);
        orch.regenerate_pose(2, None, CancelToken::new()).await.unwrap();
        assert!(orch.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn test_new_source_resets_and_mints_new_seed() {
        let (orch, _) = orchestrator(ScriptedService::default());
        let first = orch.new_source(source()).unwrap();
        orch.start_run(2, CancelToken::new()).await.unwrap();

        let second = orch
            .new_source(UploadedSource::new(b"other".to_vec(), "image/png"))
            .unwrap();

        assert_ne!(first, second);
        let snapshot = orch.snapshot();
        assert!(snapshot.artifacts.is_empty());
        assert_eq!(snapshot.phase, RunPhase::Idle);
        assert_eq!(snapshot.cursor, 0);
        assert_eq!(snapshot.seed, Some(second));
        assert_eq!(snapshot.source.unwrap().media_type, "image/png");
    }

    #[tokio::test]
    async fn test_second_run_rejected_while_running() {
        let (orch, service) = orchestrator(ScriptedService::default());
        orch.new_source(source()).unwrap();

        let pending = orch.begin_run(3).unwrap();
        let during = orch.snapshot();
        assert_eq!(during.phase, RunPhase::Running { cursor: 0, total: 3 });

        assert!(matches!(orch.begin_run(2), Err(OrchestratorError::RunInProgress)));
        assert!(matches!(
            orch.begin_regeneration(1, None),
            Err(OrchestratorError::RunInProgress)
        ));
        assert!(matches!(
            orch.new_source(source()),
            Err(OrchestratorError::RunInProgress)
        ));
        assert_eq!(orch.snapshot(), during);
        assert!(service.calls().is_empty());

        pending.drive(CancelToken::new()).await.unwrap();
        assert_eq!(orch.phase(), RunPhase::Completed { total: 3 });
    }

    #[tokio::test]
    async fn test_run_rejected_while_regenerating() {
        let (orch, _) = orchestrator(ScriptedService::default());
        orch.new_source(source()).unwrap();

        let pending = orch.begin_regeneration(2, Some("  ".into())).unwrap();
        assert_eq!(orch.snapshot().regenerating, Some(2));
        assert!(matches!(
            orch.begin_run(3),
            Err(OrchestratorError::RegenerationInProgress(2))
        ));

        let artifact = pending.drive(CancelToken::new()).await.unwrap();
        assert_eq!(artifact.pose_index, 2);
        let snapshot = orch.snapshot();
        assert_eq!(snapshot.regenerating, None);
        assert_eq!(snapshot.phase, RunPhase::Idle);
        assert_eq!(snapshot.pose_indices(), vec![2]);
    }

    #[tokio::test]
    async fn test_fail_then_regenerate_scenario() {
        let (orch, service) = orchestrator(ScriptedService::failing_at(&[3]));
        orch.new_source(source()).unwrap();

        assert!(orch.start_run(3, CancelToken::new()).await.is_err());
        assert_eq!(indices(&orch.artifacts()), vec![1, 2]);
        assert_eq!(orch.phase(), RunPhase::Failed { pose_index: 3, total: 3 });

        service.set_failing(&[]);
        orch.regenerate_pose(3, None, CancelToken::new()).await.unwrap();

        assert_eq!(indices(&orch.artifacts()), vec![1, 2, 3]);
        assert_eq!(orch.phase(), RunPhase::Failed { pose_index: 3, total: 3 });
    }

    #[tokio::test]
    async fn test_cancel_takes_effect_between_poses() {
        let token = CancelToken::new();
        let service = ScriptedService::default();
        *service.cancel_on.lock().unwrap() = Some((2, token.clone()));
        let (orch, service) = orchestrator(service);
        orch.new_source(source()).unwrap();

        let err = orch.start_run(4, token).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Cancelled { completed: 2 }));
        assert_eq!(indices(&orch.artifacts()), vec![1, 2]);
        assert_eq!(orch.phase(), RunPhase::Cancelled { completed: 2, total: 4 });
        assert_eq!(service.calls().len(), 2);
        assert!(!orch.is_busy());
    }

    #[tokio::test]
    async fn test_dropped_run_counts_as_cancelled() {
        let service = ScriptedService {
            hang_at: Some(2),
            ..ScriptedService::default()
        };
        let (orch, _) = orchestrator(service);
        orch.new_source(source()).unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            orch.start_run(3, CancelToken::new()),
        )
        .await;
        assert!(outcome.is_err());

        assert_eq!(orch.phase(), RunPhase::Cancelled { completed: 1, total: 3 });
        assert_eq!(indices(&orch.artifacts()), vec![1]);
        assert!(!orch.is_busy());
        assert!(orch.begin_regeneration(1, None).is_ok());
    }

    #[tokio::test]
    async fn test_progress_is_published_after_each_pose() {
        let (orch, service) = orchestrator(ScriptedService::default());
        *service.probe.lock().unwrap() = Some(orch.subscribe());
        orch.new_source(source()).unwrap();

        orch.start_run(3, CancelToken::new()).await.unwrap();

        assert_eq!(*service.observed.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(orch.subscribe().borrow().artifacts.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let (orch, _) = orchestrator(ScriptedService::default());

        assert!(matches!(orch.begin_run(3), Err(OrchestratorError::NoSource)));
        assert!(matches!(
            orch.begin_regeneration(1, None),
            Err(OrchestratorError::NoSource)
        ));
        assert!(matches!(
            orch.new_source(UploadedSource::new(b"%PDF".to_vec(), "application/pdf")),
            Err(OrchestratorError::UnsupportedMediaType(_))
        ));

        orch.new_source(source()).unwrap();
        assert!(matches!(orch.begin_run(0), Err(OrchestratorError::InvalidPoseCount(0))));
        assert!(matches!(orch.begin_run(11), Err(OrchestratorError::InvalidPoseCount(11))));
        assert!(matches!(
            orch.begin_regeneration(0, None),
            Err(OrchestratorError::InvalidPoseIndex(0))
        ));
        assert!(!orch.is_busy());
    }

    #[tokio::test]
    async fn test_shoot_with_bad_total_keeps_previous_source() {
        let (orch, _) = orchestrator(ScriptedService::default());
        let seed = orch.new_source(source()).unwrap();

        let err = orch
            .shoot(UploadedSource::new(b"new".to_vec(), "image/png"), 12, CancelToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::InvalidPoseCount(12)));
        assert_eq!(orch.seed(), Some(seed));

        let artifacts = orch
            .shoot(UploadedSource::new(b"new".to_vec(), "image/png"), 2, CancelToken::new())
            .await
            .unwrap();
        assert_eq!(indices(&artifacts), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_new_run_clears_last_error() {
        let (orch, service) = orchestrator(ScriptedService::failing_at(&[1]));
        orch.new_source(source()).unwrap();
        assert!(orch.start_run(2, CancelToken::new()).await.is_err());
        assert!(orch.snapshot().last_error.is_some());

        service.set_failing(&[]);
        orch.start_run(2, CancelToken::new()).await.unwrap();
        assert!(orch.snapshot().last_error.is_none());
    }
}
