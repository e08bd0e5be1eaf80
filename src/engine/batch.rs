//! Batch refresh runner.
//!
//! One run recomputes every patient against a variant snapshot taken at
//! start. Patients are independent units of work: each is loaded,
//! evaluated, and written back atomically on a blocking worker, with a
//! bounded number in flight. A failing patient is logged and counted,
//! never fatal; only failure to take the variant snapshot aborts a run.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::{EngineConfig, RunContext};

use super::refresh::refresh_patient;
use super::snapshot::{EngineStore, VariantSnapshot};
use super::EngineError;

pub struct BatchRunner {
    store: Arc<dyn EngineStore>,
    config: EngineConfig,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub patients_processed: usize,
    pub patients_failed: usize,
    pub instances_written: usize,
    pub instances_unchanged: usize,
    pub duration_ms: u64,
}

impl BatchRunner {
    pub fn new(store: Arc<dyn EngineStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub async fn run(&self) -> Result<BatchSummary, EngineError> {
        let ctx = RunContext::start(self.config.clone());
        self.run_with_context(ctx).await
    }

    /// Run against a pinned context, for previews and tests.
    pub async fn run_with_context(&self, ctx: RunContext) -> Result<BatchSummary, EngineError> {
        let started = std::time::Instant::now();
        let variants = Arc::new(self.store.variant_snapshot()?);
        tracing::info!(
            run_id = %ctx.run_id,
            variants = variants.len(),
            today = %ctx.today,
            "Batch refresh starting"
        );

        let orphans = self.store.orphan_document_ids()?;
        if !orphans.is_empty() {
            tracing::warn!(
                count = orphans.len(),
                "Documents reference missing patients, skipping them this run"
            );
        }

        let patient_ids = self.store.patient_ids()?;
        let mut summary = BatchSummary {
            run_id: ctx.run_id,
            patients_processed: 0,
            patients_failed: 0,
            instances_written: 0,
            instances_unchanged: 0,
            duration_ms: 0,
        };

        let capacity = self.config.max_parallel_patients.max(1);
        let mut workers: JoinSet<(Uuid, Result<WorkerOutcome, EngineError>)> = JoinSet::new();

        for patient_id in patient_ids {
            if workers.len() >= capacity {
                if let Some(joined) = workers.join_next().await {
                    record(&mut summary, joined);
                }
            }
            let store = Arc::clone(&self.store);
            let variants = Arc::clone(&variants);
            let ctx = ctx.clone();
            workers.spawn_blocking(move || {
                (patient_id, process_patient(&*store, &ctx, &variants, patient_id))
            });
        }
        while let Some(joined) = workers.join_next().await {
            record(&mut summary, joined);
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            run_id = %ctx.run_id,
            processed = summary.patients_processed,
            failed = summary.patients_failed,
            written = summary.instances_written,
            unchanged = summary.instances_unchanged,
            duration_ms = summary.duration_ms,
            "Batch refresh finished"
        );
        Ok(summary)
    }
}

struct WorkerOutcome {
    written: usize,
    unchanged: usize,
}

/// Load, evaluate, write back. Runs on a blocking worker; the store
/// lock is held only inside the store calls, not during evaluation.
fn process_patient(
    store: &dyn EngineStore,
    ctx: &RunContext,
    variants: &VariantSnapshot,
    patient_id: Uuid,
) -> Result<WorkerOutcome, EngineError> {
    let snapshot = store.patient_snapshot(&patient_id)?;
    let org = store.organization(&snapshot.patient.organization_id)?;
    let tz = org.tz()?;

    let (instances, explanations) = refresh_patient(ctx, &org, tz, variants, &snapshot);
    let outcome = store.replace_instances(&patient_id, &instances, &explanations)?;

    tracing::debug!(
        patient_id = %patient_id,
        written = outcome.written,
        unchanged = outcome.unchanged,
        "Patient refreshed"
    );
    Ok(WorkerOutcome {
        written: outcome.written,
        unchanged: outcome.unchanged,
    })
}

fn record(
    summary: &mut BatchSummary,
    joined: Result<(Uuid, Result<WorkerOutcome, EngineError>), tokio::task::JoinError>,
) {
    match joined {
        Ok((_, Ok(outcome))) => {
            summary.patients_processed += 1;
            summary.instances_written += outcome.written;
            summary.instances_unchanged += outcome.unchanged;
        }
        Ok((patient_id, Err(e))) => {
            tracing::warn!(patient_id = %patient_id, error = %e, "Patient refresh failed");
            summary.patients_failed += 1;
        }
        Err(join_err) => {
            tracing::warn!(error = %join_err, "Worker task panicked");
            summary.patients_failed += 1;
        }
    }
}
