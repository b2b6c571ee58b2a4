//! Auxiliary (MORK) build coordination.
//!
//! The auxiliary build is the same request as the primary one with a
//! different writer selector. It starts immediately, runs concurrently with
//! the primary call, and is best-effort: every failure ends up as `None`.

use std::sync::Arc;

use neurograph_atomspace::AtomspaceClient;
use neurograph_shared::{BuildId, BuildRequest, JobId, WriterType};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

/// Joinable handle to an in-flight auxiliary build.
///
/// `join` consumes the handle, so it can be joined exactly once.
#[derive(Debug)]
pub struct AuxiliaryBuild {
    build_id: BuildId,
    handle: JoinHandle<Option<JobId>>,
}

impl AuxiliaryBuild {
    /// Spawn the auxiliary call. Returns without waiting for it.
    pub fn launch(client: AtomspaceClient, request: Arc<BuildRequest>, build_id: BuildId) -> Self {
        let span = info_span!("auxiliary_build", %build_id);
        let handle = tokio::spawn(
            async move {
                match client.load(&request, WriterType::Mork).await {
                    Ok(response) => {
                        info!(aux_job_id = %response.job_id, "auxiliary build finished");
                        Some(response.job_id)
                    }
                    Err(e) => {
                        warn!(error = %e, "auxiliary build failed, continuing without it");
                        None
                    }
                }
            }
            .instrument(span),
        );

        Self { build_id, handle }
    }

    /// A handle whose outcome is already known.
    ///
    /// Must be called from within a tokio runtime.
    pub fn resolved(build_id: BuildId, result: Option<JobId>) -> Self {
        Self {
            build_id,
            handle: tokio::spawn(async move { result }),
        }
    }

    pub fn build_id(&self) -> BuildId {
        self.build_id
    }

    /// Wait for the auxiliary job id. A panicked or cancelled task yields `None`.
    pub async fn join(self) -> Option<JobId> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(build_id = %self.build_id, error = %e, "auxiliary build task did not complete");
                None
            }
        }
    }
}
