//! Engine configuration and the immutable per-run context.
//!
//! A `RunContext` is constructed once at batch start and passed into
//! every evaluation call; nothing in the engine reads mutable global
//! settings mid-run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::matching::fuzzy::ConfidenceTier;

/// Tunables that hold for one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct EngineConfig {
    /// Days before the due date during which a screening is "due soon".
    pub lookahead_days: u32,
    /// Minimum confidence tier for a document to count as evidence.
    /// The tier is recorded in the explanation either way.
    pub min_match_tier: ConfidenceTier,
    /// Patients processed concurrently by the batch runner.
    pub max_parallel_patients: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead_days: 30,
            min_match_tier: ConfidenceTier::Medium,
            max_parallel_patients: 8,
        }
    }
}

/// Frozen time and identity for one batch run. Every patient in the run
/// is evaluated against the same `today`, so a run that straddles
/// midnight stays internally consistent.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub config: EngineConfig,
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
}

impl RunContext {
    pub fn start(config: EngineConfig) -> Self {
        Self::at(config, Utc::now())
    }

    /// Context pinned to a specific instant, for previews and tests.
    pub fn at(config: EngineConfig, now: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            now,
            today: now.date_naive(),
        }
    }
}

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "recare=info"
}
