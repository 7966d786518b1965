use crate::photoshoot::{
    CancelToken, GenerationService, OrchestratorError, PendingRegeneration, PendingRun,
    PhotoshootOrchestrator,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct AppState {
    orchestrator: PhotoshootOrchestrator,
    service: Arc<dyn GenerationService>,
    /// Token of the run in flight; None while a regeneration holds the session
    active: Mutex<Option<CancelToken>>,
    files_dir: PathBuf,
    default_poses: u32,
}

impl AppState {
    pub fn new(
        orchestrator: PhotoshootOrchestrator,
        service: Arc<dyn GenerationService>,
        files_dir: impl Into<PathBuf>,
        default_poses: u32,
    ) -> Self {
        Self {
            orchestrator,
            service,
            active: Mutex::new(None),
            files_dir: files_dir.into(),
            default_poses,
        }
    }

    pub fn orchestrator(&self) -> &PhotoshootOrchestrator {
        &self.orchestrator
    }

    pub fn service(&self) -> &dyn GenerationService {
        self.service.as_ref()
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn default_poses(&self) -> u32 {
        self.default_poses
    }

    fn active(&self) -> MutexGuard<'_, Option<CancelToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a run and install its cancel token
    ///
    /// Both happen under the token lock, so a concurrent cancel either sees
    /// no run or this run's token, never the previous one.
    pub fn admit_run(&self, total: u32) -> Result<(PendingRun, CancelToken), OrchestratorError> {
        let mut active = self.active();
        let pending = self.orchestrator.begin_run(total)?;
        let token = CancelToken::new();
        *active = Some(token.clone());
        Ok((pending, token))
    }

    /// Admit a regeneration; it is a single call and cannot be cancelled
    pub fn admit_regeneration(
        &self,
        pose_index: u32,
        extra_instruction: Option<String>,
    ) -> Result<PendingRegeneration, OrchestratorError> {
        let mut active = self.active();
        let pending = self
            .orchestrator
            .begin_regeneration(pose_index, extra_instruction)?;
        *active = None;
        Ok(pending)
    }

    /// Cancel the run in flight; false when there is none
    pub fn cancel_active(&self) -> bool {
        let active = self.active();
        match active.as_ref() {
            Some(token) if self.orchestrator.phase().is_running() => {
                token.cancel();
                tracing::info!("Cancellation requested");
                true
            }
            _ => false,
        }
    }
}
