//! End-to-end workflows: build (+ auxiliary merge) → mine → retrieve.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use neurograph_atomspace::AtomspaceClient;
use neurograph_miner::MinerClient;
use neurograph_shared::{
    AuxiliaryMode, BuildId, BuildRequest, GraphType, JobId, MiningConfig, NeurographError,
    OrchestratorConfig, Result, WriterType,
};
use neurograph_storage::{FsStorage, SharedStorage};

use crate::auxiliary::AuxiliaryBuild;
use crate::layout::ARTIFACT_FILE;
use crate::materialize::ResultMaterializer;
use crate::merge::{self, MergeOutcome};
use crate::metadata;
use crate::mining::{MiningDispatcher, MiningOutcome, OutcomeStatus};
use crate::runner::BackgroundRunner;

/// What happened to the auxiliary build by the time `generate_graph` returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuxiliaryStatus {
    /// Not launched (`auxiliary.mode = "disabled"`).
    Disabled,
    /// Merge queued on the background runner.
    Scheduled,
    /// Merged before returning (`await` mode).
    Merged { auxiliary_job_id: JobId, files: usize },
    /// Nothing merged (`await` mode).
    Skipped { reason: String },
    /// Merge raised an error (`await` mode); the build still succeeded.
    Failed { error: String },
}

/// Result of a successful primary build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub build_id: BuildId,
    pub job_id: JobId,
    /// Path of the primary artifact on the shared volume.
    pub networkx_file: String,
    pub auxiliary: AuxiliaryStatus,
    pub status: OutcomeStatus,
}

/// Build followed immediately by mining.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteOutcome {
    pub build: BuildOutcome,
    pub mining: MiningOutcome,
}

/// Acknowledgement of a motif choice.
#[derive(Debug, Clone, Serialize)]
pub struct MotifSelection {
    pub job_id: JobId,
    pub status: &'static str,
    pub motif_index: u32,
    pub tenant_id: String,
    pub message: &'static str,
}

/// Owns the service clients, storage roots and background runner.
///
/// All configuration is fixed at construction.
#[derive(Debug)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    storage: Arc<dyn SharedStorage>,
    atomspace: AtomspaceClient,
    mining: MiningDispatcher,
    materializer: Arc<ResultMaterializer>,
    runner: Arc<BackgroundRunner>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, storage: Arc<dyn SharedStorage>) -> Result<Self> {
        config.validate()?;

        let atomspace = AtomspaceClient::new(&config.atomspace_url, config.timeout)?;
        let miner = MinerClient::new(&config.miner_url, config.timeout)?;
        let materializer = Arc::new(ResultMaterializer::new(
            storage.clone(),
            config.local_root.clone(),
        ));
        let mining = MiningDispatcher::new(
            miner,
            storage.clone(),
            materializer.clone(),
            config.public_base_url.clone(),
        );

        Ok(Self {
            config,
            storage,
            atomspace,
            mining,
            materializer,
            runner: Arc::new(BackgroundRunner::new()),
        })
    }

    /// Orchestrator over the filesystem at `config.shared_root`.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self> {
        let storage: Arc<dyn SharedStorage> = Arc::new(FsStorage::new(&config.shared_root));
        Self::new(config, storage)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn runner(&self) -> &Arc<BackgroundRunner> {
        &self.runner
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    /// Issue the primary build and (unless disabled) the auxiliary build
    /// concurrently, returning once the primary one completes.
    #[instrument(skip_all, fields(tenant_id = %request.tenant_id, files = request.files.len()))]
    pub async fn generate_graph(&self, request: BuildRequest) -> Result<BuildOutcome> {
        request.validate()?;
        let request = Arc::new(request);
        let build_id = BuildId::new();

        let auxiliary = match self.config.auxiliary_mode {
            AuxiliaryMode::Disabled => None,
            AuxiliaryMode::Background | AuxiliaryMode::Await => Some(AuxiliaryBuild::launch(
                self.atomspace.clone(),
                request.clone(),
                build_id,
            )),
        };

        let primary = self
            .atomspace
            .load(&request, WriterType::Networkx)
            .await
            .and_then(|response| {
                self.mining.ensure_artifact(&response.job_id)?;
                Ok(response.job_id)
            });

        let job_id = match primary {
            Ok(job_id) => job_id,
            Err(e) => {
                if let Some(aux) = auxiliary {
                    self.orphan(aux);
                }
                return Err(e);
            }
        };
        info!(%build_id, job_id = %job_id, "primary build finished");

        let auxiliary = match auxiliary {
            None => AuxiliaryStatus::Disabled,
            Some(aux) => self.fold_auxiliary(&job_id, aux).await,
        };

        Ok(BuildOutcome {
            build_id,
            networkx_file: self
                .storage
                .job_path(&job_id)
                .join(ARTIFACT_FILE)
                .display()
                .to_string(),
            job_id,
            auxiliary,
            status: OutcomeStatus::Success,
        })
    }

    async fn fold_auxiliary(&self, job_id: &JobId, aux: AuxiliaryBuild) -> AuxiliaryStatus {
        let storage = self.storage.clone();
        let primary = job_id.clone();

        if self.config.auxiliary_mode != AuxiliaryMode::Await {
            self.runner.spawn("auxiliary-merge", async move {
                merge::merge(storage, primary, aux).await.map(|_| ())
            });
            return AuxiliaryStatus::Scheduled;
        }

        // Runs on the runner so a caller that goes away mid-wait does not
        // cancel the merge.
        let merged = self
            .runner
            .spawn_with_result("auxiliary-merge", merge::merge(storage, primary, aux));
        let result = merged.await.unwrap_or_else(|_| {
            Err(NeurographError::Task("auxiliary merge did not report back".into()))
        });

        match result {
            Ok(MergeOutcome::Merged {
                auxiliary_job_id,
                report,
            }) => AuxiliaryStatus::Merged {
                auxiliary_job_id,
                files: report.copied.len() + report.renamed.len(),
            },
            Ok(MergeOutcome::Skipped { skip }) => AuxiliaryStatus::Skipped {
                reason: skip.to_string(),
            },
            Err(e) => {
                warn!(error = %e, "auxiliary merge failed");
                AuxiliaryStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// The primary build failed; let the auxiliary build finish and report
    /// what it left behind.
    fn orphan(&self, aux: AuxiliaryBuild) {
        self.runner.spawn("auxiliary-orphan", async move {
            let build_id = aux.build_id();
            if let Some(aux_job_id) = aux.join().await {
                warn!(%build_id, %aux_job_id, "primary build failed, auxiliary output left unmerged");
            }
            Ok(())
        });
    }

    // -----------------------------------------------------------------------
    // Mining
    // -----------------------------------------------------------------------

    /// Mine a built job. A missing `graph_type` is read from the job metadata.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn mine_patterns(&self, job_id: &JobId, config: MiningConfig) -> Result<MiningOutcome> {
        self.mining.ensure_artifact(job_id)?;

        let mut config = config;
        if config.graph_type.is_none() {
            let resolved = self.resolve_graph_type(job_id)?;
            info!(graph_type = %resolved, "graph type resolved from metadata");
            config.graph_type = Some(resolved);
        }

        self.mining.mine_patterns(job_id, &config).await
    }

    /// Build, then mine the new job with `mining` (orientation taken from the build).
    pub async fn execute(&self, request: BuildRequest, mining: MiningConfig) -> Result<ExecuteOutcome> {
        let graph_type = request.graph_type;
        let build = self.generate_graph(request).await?;

        let mut mining = mining;
        if mining.graph_type.is_none() {
            mining.graph_type = Some(graph_type);
        }
        let mining = self.mine_patterns(&build.job_id, mining).await?;

        Ok(ExecuteOutcome { build, mining })
    }

    pub fn resolve_graph_type(&self, job_id: &JobId) -> Result<GraphType> {
        metadata::resolve_graph_type(self.storage.as_ref(), job_id)
    }

    // -----------------------------------------------------------------------
    // Retrieval
    // -----------------------------------------------------------------------

    pub fn resolve_file_path(&self, job_id: &JobId, filename: &str) -> Result<PathBuf> {
        self.materializer.resolve_file_path(job_id, filename)
    }

    /// Zip the job's local outputs on the blocking pool.
    pub async fn archive(&self, job_id: &JobId) -> Result<PathBuf> {
        let materializer = self.materializer.clone();
        let job_id = job_id.clone();
        tokio::task::spawn_blocking(move || materializer.archive(&job_id))
            .await
            .map_err(|e| NeurographError::Task(format!("archive task: {e}")))?
    }

    /// Record a motif choice. Nothing downstream consumes it yet.
    pub fn select_motif(
        &self,
        job_id: &JobId,
        motif_index: u32,
        tenant_id: Option<String>,
    ) -> MotifSelection {
        let tenant_id = tenant_id
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.config.default_tenant.clone());
        info!(job_id = %job_id, motif_index, tenant_id = %tenant_id, "motif selected");

        MotifSelection {
            job_id: job_id.clone(),
            status: "motif_selected",
            motif_index,
            tenant_id,
            message: "Motif selection received. Ready for Phase 2 processing.",
        }
    }
}
