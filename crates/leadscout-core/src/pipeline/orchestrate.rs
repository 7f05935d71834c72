//! The pipeline orchestrator.
//!
//! Owns the [`PipelineRun`] record: wires the adapters through the four
//! stages, enforces the cost ceiling and stage timeouts, persists stage
//! artifacts as they are produced, and folds stage errors into the
//! run's terminal status. A stage that records a terminal error ends
//! the run there; later stages are reported with zero counts so a
//! partial run is distinguishable from a crash.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::artifact::{self, save_artifact, ArtifactStore};
use crate::budget::CostLedger;
use crate::error::{ErrorKind, StageError, StageName};
use crate::model::{AccountRef, Candidate, EnrichedCandidate, PipelineRun, RunStatus, StageReport};
use crate::names::{CompanyNameSet, NameNormalizer, NamesError};

use super::{acquire, enrich, rank, sink, Adapters, RunOptions};

/// Where a drive enters the stage chain.
enum StartStage {
    /// Run-all: Stage 1 through Stage 4.
    Acquire,
    /// Resume with prior Stage 1 output.
    Enrich {
        names: CompanyNameSet,
        candidates: Vec<Candidate>,
    },
    /// Resume with prior Stage 2 output.
    Rank { profiles: Vec<EnrichedCandidate> },
}

/// Outcome of a guarded stage future.
enum Guarded<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Race a stage future against cancellation and its stage timeout.
async fn guarded<T>(
    cancel: &CancellationToken,
    timeout_secs: u64,
    fut: impl std::future::Future<Output = T>,
) -> Guarded<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Guarded::Cancelled,
        result = tokio::time::timeout(Duration::from_secs(timeout_secs), fut) => match result {
            Ok(value) => Guarded::Done(value),
            Err(_) => Guarded::TimedOut,
        },
    }
}

/// Drives accounts through the discovery pipeline.
///
/// Adapters are constructed once at setup and passed in explicitly;
/// per-run state lives in the [`PipelineRun`] this type returns.
pub struct Orchestrator {
    adapters: Adapters,
    store: Arc<dyn ArtifactStore>,
}

impl Orchestrator {
    /// Create an orchestrator over the given adapters and artifact store.
    pub fn new(adapters: Adapters, store: Arc<dyn ArtifactStore>) -> Self {
        Self { adapters, store }
    }

    /// Run-all entry: resolve the account from the CRM, then run
    /// Stage 1 through Stage 4.
    pub async fn run(
        &self,
        account_id: &str,
        opts: RunOptions,
        cancel: CancellationToken,
    ) -> PipelineRun {
        let ledger = CostLedger::new(opts.cost_ceiling);
        let run_id = new_run_id(&opts);
        let started_at = Utc::now();

        let resolved = match guarded(&cancel, opts.timeouts.acquire_secs, async {
            self.resolve_account(account_id, &opts, &ledger).await
        })
        .await
        {
            Guarded::Done(resolved) => resolved,
            Guarded::TimedOut => Err(StageError::new(
                StageName::Resolve,
                ErrorKind::Timeout,
                "account resolution timed out",
            )),
            Guarded::Cancelled => Err(StageError::new(
                StageName::Resolve,
                ErrorKind::Cancelled,
                "run cancelled",
            )),
        };

        match resolved {
            Ok(account) => {
                let run = PipelineRun::new(run_id, account, started_at);
                self.drive(run, &ledger, &opts, &cancel, StartStage::Acquire)
                    .await
            }
            Err(error) => {
                // Without an account there is nothing to discover.
                let mut run = PipelineRun::new(
                    run_id,
                    AccountRef::new(account_id, account_id),
                    started_at,
                );
                run.status = RunStatus::Failed;
                run.first_error = Some(error);
                self.finalize(run, &ledger).await
            }
        }
    }

    /// Run with an already-resolved account (skips the CRM reads).
    pub async fn run_account(
        &self,
        account: AccountRef,
        opts: RunOptions,
        cancel: CancellationToken,
    ) -> PipelineRun {
        let ledger = CostLedger::new(opts.cost_ceiling);
        let run = PipelineRun::new(new_run_id(&opts), account, Utc::now());
        self.drive(run, &ledger, &opts, &cancel, StartStage::Acquire)
            .await
    }

    /// Resume from a prior Stage 1 artifact.
    pub async fn resume_from_candidates(
        &self,
        account: AccountRef,
        names: CompanyNameSet,
        candidates: Vec<Candidate>,
        opts: RunOptions,
        cancel: CancellationToken,
    ) -> PipelineRun {
        let ledger = CostLedger::new(opts.cost_ceiling);
        let run = PipelineRun::new(new_run_id(&opts), account, Utc::now());
        self.drive(
            run,
            &ledger,
            &opts,
            &cancel,
            StartStage::Enrich { names, candidates },
        )
        .await
    }

    /// Resume from a prior Stage 2 artifact.
    pub async fn resume_from_profiles(
        &self,
        account: AccountRef,
        profiles: Vec<EnrichedCandidate>,
        opts: RunOptions,
        cancel: CancellationToken,
    ) -> PipelineRun {
        let ledger = CostLedger::new(opts.cost_ceiling);
        let run = PipelineRun::new(new_run_id(&opts), account, Utc::now());
        self.drive(run, &ledger, &opts, &cancel, StartStage::Rank { profiles })
            .await
    }

    /// Fetch the account and its parent name from the CRM.
    async fn resolve_account(
        &self,
        account_id: &str,
        opts: &RunOptions,
        ledger: &CostLedger,
    ) -> Result<AccountRef, StageError> {
        ledger
            .try_charge("crm_read", opts.unit_costs.crm_read)
            .map_err(|e| {
                StageError::new(StageName::Resolve, ErrorKind::BudgetExhausted, e.to_string())
            })?;
        let record = self
            .adapters
            .crm
            .get_account(account_id)
            .await
            .map_err(|e| StageError::from_adapter(StageName::Resolve, &e))?;

        // The parent name only feeds the normalizer; a failed lookup
        // narrows the name set instead of failing the run.
        let parent_name = if record.parent_id.is_some() {
            match ledger.try_charge("crm_read", opts.unit_costs.crm_read) {
                Ok(()) => match self.adapters.crm.get_parent_name(account_id).await {
                    Ok(name) => name,
                    Err(err) => {
                        tracing::warn!(account_id, error = %err, "parent lookup failed");
                        None
                    }
                },
                Err(_) => None,
            }
        } else {
            None
        };

        Ok(AccountRef {
            account_id: record.id,
            name: record.name,
            parent_name,
            city: record.city,
            state: record.state,
            industry: record.industry,
        })
    }

    /// Build the company name set for a run, preferring the generative
    /// normalizer while the budget allows it.
    async fn normalize_names(
        &self,
        account: &AccountRef,
        opts: &RunOptions,
        ledger: &CostLedger,
    ) -> Result<CompanyNameSet, NamesError> {
        let normalizer = if ledger
            .try_charge("normalize_names", opts.unit_costs.genai_call)
            .is_ok()
        {
            NameNormalizer::new(Arc::clone(&self.adapters.genai))
        } else {
            tracing::warn!("cost ceiling leaves no room for generative normalization");
            NameNormalizer::deterministic()
        };
        normalizer.normalize(account).await
    }

    /// The stage chain. Stops at the first terminal stage error and
    /// reports the stages that never ran with zero counts.
    async fn drive(
        &self,
        mut run: PipelineRun,
        ledger: &CostLedger,
        opts: &RunOptions,
        cancel: &CancellationToken,
        start: StartStage,
    ) -> PipelineRun {
        let mut halted = false;
        let mut names_opt: Option<CompanyNameSet> = None;

        match start {
            StartStage::Acquire => {
                let t0 = std::time::Instant::now();
                let c0 = ledger.spent();
                let outcome = guarded(cancel, opts.timeouts.acquire_secs, async {
                    let names = self.normalize_names(&run.account, opts, ledger).await?;
                    let (out, err) = acquire::execute(
                        self.adapters.dataset.as_ref(),
                        self.adapters.search.as_ref(),
                        ledger,
                        &run.account,
                        &names,
                        opts,
                    )
                    .await;
                    Ok::<_, NamesError>((names, out, err))
                })
                .await;

                match outcome {
                    Guarded::Cancelled => {
                        return self.finish_cancelled(run, ledger, StageName::Acquire).await;
                    }
                    Guarded::TimedOut => {
                        run.stages
                            .push(stage_report(StageName::Acquire, t0, c0, ledger, 0, 0));
                        run.record_error(StageError::new(
                            StageName::Acquire,
                            ErrorKind::Timeout,
                            format!("stage timed out after {}s", opts.timeouts.acquire_secs),
                        ));
                        halted = true;
                    }
                    Guarded::Done(Err(names_err)) => {
                        run.status = RunStatus::Failed;
                        run.first_error = Some(StageError::new(
                            StageName::Resolve,
                            ErrorKind::BadResponse,
                            names_err.to_string(),
                        ));
                        return self.finalize(run, ledger).await;
                    }
                    Guarded::Done(Ok((names, out, stage_err))) => {
                        run.stages.push(stage_report(
                            StageName::Acquire,
                            t0,
                            c0,
                            ledger,
                            out.candidates.len() as u32,
                            0,
                        ));
                        run.snapshot_id = out.snapshot_id;
                        run.stage1_candidates = out.candidates;
                        self.persist(
                            &run.run_id,
                            artifact::names::STAGE1_CANDIDATES,
                            &run.stage1_candidates,
                        )
                        .await;
                        names_opt = Some(names);
                        if let Some(error) = stage_err {
                            if error.kind == ErrorKind::Overflow {
                                run.recommendation = Some(
                                    "dataset filter matched too many records; tighten the \
                                     company or title filters and rerun"
                                        .to_string(),
                                );
                            }
                            run.record_error(error);
                            halted = true;
                        }
                    }
                }
            }
            StartStage::Enrich { names, candidates } => {
                run.stage1_candidates = candidates;
                names_opt = Some(names);
            }
            StartStage::Rank { profiles } => {
                // A rank-entry resume has no name set and skips Stage 2.
                run.stage2_profiles = profiles;
            }
        }

        // Stage 2.
        if let Some(names) = names_opt.as_ref().filter(|_| !halted) {
            let t0 = std::time::Instant::now();
            let c0 = ledger.spent();
            let outcome = guarded(
                cancel,
                opts.timeouts.enrich_secs,
                enrich::execute(
                    &self.adapters.scraper,
                    ledger,
                    &run.account,
                    names,
                    &run.stage1_candidates,
                    opts,
                ),
            )
            .await;

            match outcome {
                Guarded::Cancelled => {
                    return self.finish_cancelled(run, ledger, StageName::Enrich).await;
                }
                Guarded::TimedOut => {
                    run.stages
                        .push(stage_report(StageName::Enrich, t0, c0, ledger, 0, 0));
                    run.record_error(StageError::new(
                        StageName::Enrich,
                        ErrorKind::Timeout,
                        format!("stage timed out after {}s", opts.timeouts.enrich_secs),
                    ));
                    halted = true;
                }
                Guarded::Done((out, stage_err)) => {
                    run.stages.push(stage_report(
                        StageName::Enrich,
                        t0,
                        c0,
                        ledger,
                        out.profiles.len() as u32,
                        out.rejections.len() as u32,
                    ));
                    run.stage2_profiles = out.profiles;
                    run.stage2_rejections = out.rejections;
                    self.persist(
                        &run.run_id,
                        artifact::names::STAGE2_PROFILES,
                        &run.stage2_profiles,
                    )
                    .await;
                    self.persist(
                        &run.run_id,
                        artifact::names::STAGE2_REJECTIONS,
                        &run.stage2_rejections,
                    )
                    .await;
                    if let Some(error) = stage_err {
                        run.record_error(error);
                        halted = true;
                    }
                }
            }
        }

        // Stage 3.
        if !halted {
            let t0 = std::time::Instant::now();
            let c0 = ledger.spent();
            let inputs = run.stage2_profiles.clone();
            let outcome = guarded(
                cancel,
                opts.timeouts.rank_secs,
                rank::execute(
                    self.adapters.genai.as_ref(),
                    ledger,
                    &run.account.name,
                    &inputs,
                    opts,
                ),
            )
            .await;

            match outcome {
                Guarded::Cancelled => {
                    return self.finish_cancelled(run, ledger, StageName::Rank).await;
                }
                Guarded::TimedOut => {
                    run.stages
                        .push(stage_report(StageName::Rank, t0, c0, ledger, 0, 0));
                    run.record_error(StageError::new(
                        StageName::Rank,
                        ErrorKind::Timeout,
                        format!("stage timed out after {}s", opts.timeouts.rank_secs),
                    ));
                    halted = true;
                }
                Guarded::Done((qualified, stage_err)) => {
                    let rejected = inputs.len().saturating_sub(qualified.len()) as u32;
                    run.stages.push(stage_report(
                        StageName::Rank,
                        t0,
                        c0,
                        ledger,
                        qualified.len() as u32,
                        rejected,
                    ));
                    run.stage3_qualified = qualified;
                    self.persist(
                        &run.run_id,
                        artifact::names::STAGE3_QUALIFIED,
                        &run.stage3_qualified,
                    )
                    .await;
                    if let Some(error) = stage_err {
                        run.record_error(error);
                        halted = true;
                    }
                }
            }
        }

        // Stage 4 (skipped entirely on dry runs).
        if !halted && !opts.dry_run {
            let t0 = std::time::Instant::now();
            let c0 = ledger.spent();
            let prospects = run.stage3_qualified.clone();
            let outcome = guarded(
                cancel,
                opts.timeouts.sink_secs,
                sink::execute(
                    self.adapters.sink.as_ref(),
                    &run.account,
                    &run.run_id,
                    &prospects,
                ),
            )
            .await;

            match outcome {
                Guarded::Cancelled => {
                    return self.finish_cancelled(run, ledger, StageName::Sink).await;
                }
                Guarded::TimedOut => {
                    run.stages
                        .push(stage_report(StageName::Sink, t0, c0, ledger, 0, 0));
                    run.record_error(StageError::new(
                        StageName::Sink,
                        ErrorKind::Timeout,
                        format!("stage timed out after {}s", opts.timeouts.sink_secs),
                    ));
                }
                Guarded::Done((queued, stage_err)) => {
                    let rejected = prospects.len().saturating_sub(queued.len()) as u32;
                    run.stages.push(stage_report(
                        StageName::Sink,
                        t0,
                        c0,
                        ledger,
                        queued.len() as u32,
                        rejected,
                    ));
                    run.queued_updates = queued;
                    if let Some(error) = stage_err {
                        run.record_error(error);
                    }
                }
            }
        }

        self.fill_missing_reports(&mut run, opts);
        self.finalize(run, ledger).await
    }

    /// Report never-run stages with zero counts so partial runs are
    /// distinguishable from crashes.
    fn fill_missing_reports(&self, run: &mut PipelineRun, opts: &RunOptions) {
        let mut expected = vec![StageName::Acquire, StageName::Enrich, StageName::Rank];
        if !opts.dry_run {
            expected.push(StageName::Sink);
        }
        // Stages before a resume entry point intentionally have no report.
        let first_present = run.stages.first().map(|s| s.stage);
        let started = expected
            .iter()
            .position(|s| Some(*s) == first_present)
            .unwrap_or(0);
        for stage in expected.into_iter().skip(started) {
            if run.stage_report(stage).is_none() {
                run.stages.push(StageReport {
                    stage,
                    duration_ms: 0,
                    found: 0,
                    rejected: 0,
                    cost: 0.0,
                });
            }
        }
    }

    async fn finish_cancelled(
        &self,
        mut run: PipelineRun,
        ledger: &CostLedger,
        stage: StageName,
    ) -> PipelineRun {
        tracing::warn!(run_id = %run.run_id, stage = %stage, "run cancelled");
        run.status = RunStatus::Failed;
        run.first_error = Some(StageError::new(stage, ErrorKind::Cancelled, "run cancelled"));
        // Cancellation enqueues nothing and keeps whatever artifacts
        // were already persisted.
        run.queued_updates.clear();
        self.finalize(run, ledger).await
    }

    async fn finalize(&self, mut run: PipelineRun, ledger: &CostLedger) -> PipelineRun {
        run.total_cost = ledger.spent();
        run.finished_at = Some(Utc::now());
        let run_id = run.run_id.clone();
        self.persist(&run_id, artifact::names::RUN, &run).await;
        tracing::info!(
            run_id = %run.run_id,
            status = ?run.status,
            cost = run.total_cost,
            qualified = run.stage3_qualified.len(),
            queued = run.queued_updates.len(),
            "pipeline run finished",
        );
        run
    }

    /// Best-effort artifact persistence; a failed save never fails the run.
    async fn persist<T: serde::Serialize>(&self, run_id: &str, name: &str, value: &T) {
        if let Err(error) = save_artifact(self.store.as_ref(), run_id, name, value).await {
            tracing::warn!(run_id, name, error = %error, "artifact save failed");
        }
    }
}

fn new_run_id(opts: &RunOptions) -> String {
    opts.run_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn stage_report(
    stage: StageName,
    started: std::time::Instant,
    cost_before: f64,
    ledger: &CostLedger,
    found: u32,
    rejected: u32,
) -> StageReport {
    StageReport {
        stage,
        duration_ms: started.elapsed().as_millis() as u64,
        found,
        rejected,
        cost: ledger.spent() - cost_before,
    }
}
