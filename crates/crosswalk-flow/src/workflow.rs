//! The mapping workflow orchestrator.
//!
//! One [`Orchestrator::run`] call drives a single job through the
//! six-step workflow:
//!
//! ```text
//! validate source ─► source text ─► (enrich) ─► embed / retrieve / rerank
//!                                                         │
//!        finalize ◄──────────── reasoning fan-out ◄───────┘
//! ```
//!
//! ## Failure policy
//!
//! - Enrichment failure degrades to the raw description (never fatal).
//! - Individual reasoning failures degrade to an empty rationale.
//! - Per-candidate embedding failures are retried once then dropped;
//!   dropping more than half the candidates fails the run.
//! - Exceeding the overall budget fails the run with `WorkflowTimeout`.
//!
//! The orchestrator is the **sole writer of terminal job state**. Every
//! failure is classified into the fixed [`WorkflowError`] taxonomy before
//! that write, and conflicting terminal writes from overlapping runs are
//! absorbed through the store's conditional semantics.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tracing::Instrument;
use uuid::Uuid;

use crosswalk_core::catalog::{Control, ControlCatalog};
use crosswalk_core::job::{Candidate, JobStatus, sort_candidates};
use crosswalk_core::store::{
    EmbeddingCache, EmbeddingEntry, EnrichmentCache, EnrichmentEntry, JobStore, TransitionOutcome,
};

use crate::agent::{Agent, EnrichRequest, ReasonMapping, ReasonRequest};
use crate::config::PipelineConfig;
use crate::error::{Error, Result, WorkflowError};
use crate::metrics::FlowMetrics;
use crate::queue::MappingRequest;
use crate::science::{RerankCandidate, Science};

/// How one workflow run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run wrote COMPLETED with this many mappings.
    Completed {
        /// Number of mappings in the result.
        mappings: usize,
    },
    /// The run wrote FAILED with this classification.
    Failed {
        /// The terminal classification.
        error: WorkflowError,
    },
    /// Another run had already settled the job; nothing was written.
    Superseded {
        /// The terminal status that was found.
        status: JobStatus,
    },
}

/// Report of one workflow run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The job this run drove.
    pub job_id: Uuid,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// True when enrichment fell back to the raw description.
    pub enrichment_degraded: bool,
    /// Candidates dropped after persistent embedding failure.
    pub dropped_candidates: usize,
}

#[derive(Debug, Default)]
struct ExecOutput {
    mappings: Vec<Candidate>,
    enrichment_degraded: bool,
    dropped_candidates: usize,
}

/// Coordinates the five pipeline steps plus finalization for one job.
///
/// Per-run state (source text, vectors, candidate list) lives on the
/// stack of [`Orchestrator::run`]; the orchestrator itself holds only
/// process-scoped handles and is shared freely between concurrent runs.
pub struct Orchestrator {
    jobs: Arc<dyn JobStore>,
    catalog: Arc<dyn ControlCatalog>,
    enrichment: Arc<dyn EnrichmentCache>,
    embeddings: Arc<dyn EmbeddingCache>,
    science: Arc<dyn Science>,
    agent: Arc<dyn Agent>,
    config: PipelineConfig,
    metrics: FlowMetrics,
}

impl Orchestrator {
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn ControlCatalog>,
        enrichment: Arc<dyn EnrichmentCache>,
        embeddings: Arc<dyn EmbeddingCache>,
        science: Arc<dyn Science>,
        agent: Arc<dyn Agent>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            jobs,
            catalog,
            enrichment,
            embeddings,
            science,
            agent,
            config,
            metrics: FlowMetrics::new(),
        }
    }

    /// Runs the workflow for one mapping request and writes the terminal
    /// job state exactly once.
    ///
    /// Returns `Ok` whenever the job has settled: written by this run,
    /// written identically by a concurrent run, or found already terminal.
    ///
    /// # Errors
    ///
    /// Returns an error only when the terminal write itself could not be
    /// performed (e.g. the job store is unreachable). The caller should
    /// leave the queue message unacknowledged so the run is retried.
    pub async fn run(&self, request: &MappingRequest) -> Result<RunReport> {
        let span =
            crosswalk_core::observability::workflow_span("run", &request.job_id.to_string());
        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(&self, request: &MappingRequest) -> Result<RunReport> {
        let started = Instant::now();
        let executed =
            tokio::time::timeout(self.config.workflow_budget, self.execute(request)).await;

        let report = match executed {
            Ok(Ok(output)) => {
                let outcome = self
                    .finalize_completed(request.job_id, output.mappings)
                    .await?;
                RunReport {
                    job_id: request.job_id,
                    outcome,
                    enrichment_degraded: output.enrichment_degraded,
                    dropped_candidates: output.dropped_candidates,
                }
            }
            Ok(Err(error)) => {
                let classified = WorkflowError::classify(&error);
                tracing::warn!(%error, classification = %classified, "workflow step failed");
                let outcome = self.finalize_failed(request.job_id, classified).await?;
                RunReport {
                    job_id: request.job_id,
                    outcome,
                    enrichment_degraded: false,
                    dropped_candidates: 0,
                }
            }
            Err(_elapsed) => {
                let budget_secs = self.config.workflow_budget.as_secs();
                tracing::warn!(budget_secs, "workflow exceeded its budget");
                let outcome = self
                    .finalize_failed(request.job_id, WorkflowError::WorkflowTimeout)
                    .await?;
                RunReport {
                    job_id: request.job_id,
                    outcome,
                    enrichment_degraded: false,
                    dropped_candidates: 0,
                }
            }
        };

        let outcome_label = match report.outcome {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::Failed { .. } => "failed",
            RunOutcome::Superseded { .. } => "superseded",
        };
        self.metrics
            .observe_workflow_duration(outcome_label, started.elapsed().as_secs_f64());
        if report.enrichment_degraded {
            self.metrics.record_enrichment_degraded();
        }
        self.metrics
            .record_candidates_dropped(report.dropped_candidates as u64);
        tracing::info!(
            outcome = outcome_label,
            enrichment_degraded = report.enrichment_degraded,
            dropped = report.dropped_candidates,
            "workflow run finished"
        );
        Ok(report)
    }

    /// The success-path terminal write.
    async fn finalize_completed(&self, job_id: Uuid, mappings: Vec<Candidate>) -> Result<RunOutcome> {
        let count = mappings.len();
        match self.jobs.mark_completed(job_id, mappings).await {
            Ok(TransitionOutcome::Applied) => {
                self.metrics.record_job_transition("running_to_completed");
                Ok(RunOutcome::Completed { mappings: count })
            }
            Ok(TransitionOutcome::AlreadyApplied) => Ok(RunOutcome::Completed { mappings: count }),
            Ok(TransitionOutcome::Superseded { status }) => Ok(RunOutcome::Superseded { status }),
            Err(e) if e.is_conflict() => {
                // A concurrent run settled the job with different content.
                // The first terminal write wins; record and stop.
                tracing::error!(%job_id, error = %e, "terminal write conflict on completion");
                let status = self.settled_status(job_id).await;
                Ok(RunOutcome::Superseded { status })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The error path: write FAILED with the classified message.
    async fn finalize_failed(
        &self,
        job_id: Uuid,
        error: WorkflowError,
    ) -> Result<RunOutcome> {
        match self.jobs.mark_failed(job_id, error.client_message()).await {
            Ok(TransitionOutcome::Applied) => {
                self.metrics.record_job_transition("running_to_failed");
                Ok(RunOutcome::Failed { error })
            }
            Ok(TransitionOutcome::AlreadyApplied) => Ok(RunOutcome::Failed { error }),
            Ok(TransitionOutcome::Superseded { status }) => Ok(RunOutcome::Superseded { status }),
            Err(e) if e.is_conflict() => {
                tracing::error!(%job_id, error = %e, "terminal write conflict on failure");
                let status = self.settled_status(job_id).await;
                Ok(RunOutcome::Superseded { status })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn settled_status(&self, job_id: Uuid) -> JobStatus {
        match self.jobs.get(job_id).await {
            Ok(Some(job)) => job.status,
            _ => JobStatus::Failed,
        }
    }

    /// The pipeline from validation through result assembly.
    async fn execute(&self, request: &MappingRequest) -> Result<ExecOutput> {
        // Validate the source control still exists.
        let source = self
            .catalog
            .get_control(&request.source_control_key)
            .await?
            .ok_or_else(|| Error::SourceMissing {
                key: request.source_control_key.clone(),
            })?;

        // Source text from the enrichment cache, enriching on miss.
        let (source_text, enrichment_degraded) = self.prepare_source_text(&source).await?;

        // Source embedding.
        let source_vector = self.embedding_for(&source, &source_text).await?;

        // Candidate set.
        let mut targets = self
            .catalog
            .list_framework_controls(&request.target_framework_key)
            .await?;
        if let Some(ids) = request
            .target_control_ids
            .as_deref()
            .filter(|ids| !ids.is_empty())
        {
            let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
            targets.retain(|control| wanted.contains(control.control_id.as_str()));
        }
        if targets.is_empty() {
            return Ok(ExecOutput {
                enrichment_degraded,
                ..ExecOutput::default()
            });
        }

        // Target embeddings, batched, with per-item retry-then-drop.
        let (kept, vectors, dropped_candidates) = self.embed_targets(&targets).await?;
        if kept.is_empty() {
            // All candidates dropped is by definition > 50%.
            return Err(Error::science(format!(
                "all {} candidate embeddings failed",
                targets.len()
            )));
        }

        // Retrieval.
        let top_k = self.config.top_k.min(kept.len());
        let mut hits = self
            .science
            .retrieve(&source_vector, &vectors, top_k)
            .await?;
        hits.truncate(top_k);

        // Rerank and threshold.
        let shortlist: Vec<&Control> = hits.iter().map(|hit| kept[hit.index]).collect();
        let rerank_candidates: Vec<RerankCandidate> = shortlist
            .iter()
            .map(|control| RerankCandidate {
                id: control.control_key.to_string(),
                text: control.text().to_string(),
            })
            .collect();
        let rankings = self
            .science
            .rerank(&source_text, &rerank_candidates)
            .await?;
        let rerank_scores: HashMap<&str, f64> = rankings
            .iter()
            .map(|score| (score.id.as_str(), score.score))
            .collect();

        let mut survivors = Vec::new();
        for (hit, control) in hits.iter().zip(shortlist) {
            let Some(&rerank_score) = rerank_scores.get(control.control_key.as_str()) else {
                continue;
            };
            if rerank_score < self.config.rerank_min {
                continue;
            }
            survivors.push((control.clone(), hit.similarity.clamp(0.0, 1.0), rerank_score));
        }
        if survivors.is_empty() {
            return Ok(ExecOutput {
                enrichment_degraded,
                dropped_candidates,
                ..ExecOutput::default()
            });
        }

        // Reasoning fan-out, bounded.
        let mappings = self
            .reason_candidates(&request.source_control_key.to_string(), &source_text, survivors)
            .await;

        Ok(ExecOutput {
            mappings,
            enrichment_degraded,
            dropped_candidates,
        })
    }

    /// Cached enrichment, enrich-on-miss, raw-text fallback.
    async fn prepare_source_text(&self, source: &Control) -> Result<(String, bool)> {
        if let Some(entry) = self.enrichment.get(&source.control_key).await? {
            return Ok((entry.enriched_text, false));
        }

        let request = EnrichRequest {
            framework_name: source.framework_key.name().to_string(),
            framework_version: source.framework_key.version().to_string(),
            short_id: source.control_id.clone(),
            title: source.title.clone(),
            description: source.description.clone(),
        };
        match self.agent.enrich(request).await {
            Ok(response) => {
                let entry = EnrichmentEntry::new(
                    response.enriched_text,
                    self.config.enrichment_version.clone(),
                );
                if let Err(e) = self.enrichment.put(&source.control_key, entry.clone()).await {
                    tracing::warn!(error = %e, "enrichment cache write failed");
                }
                // Re-read: if another writer raced us, either value is fine.
                let text = match self.enrichment.get(&source.control_key).await {
                    Ok(Some(current)) => current.enriched_text,
                    _ => entry.enriched_text,
                };
                Ok((text, false))
            }
            Err(e) => {
                tracing::warn!(error = %e, "enrichment unavailable, using raw description");
                Ok((source.text().to_string(), true))
            }
        }
    }

    /// Embedding for one control: cache lookup, embed on miss, populate cache.
    async fn embedding_for(&self, control: &Control, text: &str) -> Result<Vec<f32>> {
        if let Some(entry) = self
            .embeddings
            .get(&control.control_key, &self.config.model_version)
            .await?
        {
            self.metrics.record_embed_cache(true);
            return Ok(entry.vector);
        }
        self.metrics.record_embed_cache(false);

        let embedding = self
            .science
            .embed(control.control_key.as_str(), text)
            .await?;
        if let Err(e) = self
            .embeddings
            .put(
                &control.control_key,
                &self.config.model_version,
                EmbeddingEntry::new(embedding.vector.clone()),
            )
            .await
        {
            tracing::warn!(error = %e, "embedding cache write failed");
        }
        Ok(embedding.vector)
    }

    /// Embeds all targets in batches; a persistent per-item failure
    /// drops that candidate. Fails the run when more than half drop.
    async fn embed_targets<'a>(
        &self,
        targets: &'a [Control],
    ) -> Result<(Vec<&'a Control>, Vec<Vec<f32>>, usize)> {
        let mut kept = Vec::with_capacity(targets.len());
        let mut vectors = Vec::with_capacity(targets.len());
        let mut dropped = 0_usize;

        for batch in targets.chunks(self.config.embed_batch_size.max(1)) {
            let results = futures::future::join_all(batch.iter().map(|control| async move {
                let first = self.embedding_for(control, control.text()).await;
                match first {
                    Ok(vector) => Ok(vector),
                    // One workflow-level retry on top of client retries.
                    Err(_) => self.embedding_for(control, control.text()).await,
                }
            }))
            .await;

            for (control, result) in batch.iter().zip(results) {
                match result {
                    Ok(vector) => {
                        kept.push(control);
                        vectors.push(vector);
                    }
                    Err(e) => {
                        tracing::warn!(
                            control_key = %control.control_key,
                            error = %e,
                            "dropping candidate after persistent embed failure"
                        );
                        dropped += 1;
                    }
                }
            }
        }

        if dropped * 2 > targets.len() {
            return Err(Error::science(format!(
                "dropped {dropped} of {} candidate embeddings",
                targets.len()
            )));
        }
        Ok((kept, vectors, dropped))
    }

    /// Bounded-concurrency reasoning over the surviving candidates.
    async fn reason_candidates(
        &self,
        source_control_id: &str,
        source_text: &str,
        survivors: Vec<(Control, f64, f64)>,
    ) -> Vec<Candidate> {
        let concurrency = self.config.reasoning_concurrency.max(1);
        let mut stream = futures::stream::iter(survivors.into_iter().map(
            |(control, similarity_score, rerank_score)| {
                let agent = Arc::clone(&self.agent);
                let request = ReasonRequest {
                    source_control_id: source_control_id.to_string(),
                    source_text: source_text.to_string(),
                    mapping: ReasonMapping {
                        target_control_id: control.control_id.clone(),
                        target_framework: control.framework_key.to_string(),
                        text: control.text().to_string(),
                        similarity_score,
                        rerank_score,
                    },
                };
                async move {
                    let reasoning = agent.reason(request).await;
                    (control, similarity_score, rerank_score, reasoning)
                }
            },
        ))
        .buffer_unordered(concurrency);

        let mut mappings = Vec::new();
        while let Some((control, similarity_score, rerank_score, reasoning)) = stream.next().await {
            let reasoning = match reasoning {
                Ok(response) => response.reasoning,
                Err(e) => {
                    tracing::warn!(
                        control_key = %control.control_key,
                        error = %e,
                        "reasoning unavailable, leaving rationale empty"
                    );
                    self.metrics.record_reasoning_failure();
                    String::new()
                }
            };
            mappings.push(Candidate {
                target_control_id: control.control_id.clone(),
                target_control_key: control.control_key.clone(),
                similarity_score,
                rerank_score,
                reasoning,
            });
        }
        sort_candidates(&mut mappings);
        mappings
    }
}
