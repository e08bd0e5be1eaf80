//! The screening engine: eligibility, variant resolution, frequency
//! scheduling, relevancy windows, dormancy gating, and the per-patient
//! refresh pipeline that ties them together under one batch runner.

pub mod batch;
pub mod dormancy;
pub mod eligibility;
pub mod refresh;
pub mod relevancy;
pub mod resolver;
pub mod schedule;
pub mod snapshot;

pub use batch::{BatchRunner, BatchSummary};
pub use snapshot::{EngineStore, PatientSnapshot, SqliteEngineStore, VariantSnapshot};

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::ConfigError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("definition error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to obtain active-variant snapshot: {0}")]
    SnapshotUnavailable(String),

    #[error("unknown patient: {0}")]
    UnknownPatient(Uuid),

    #[error("schedule computation failed: {0}")]
    Schedule(#[from] schedule::ScheduleError),

    #[error("store lock poisoned by a previous panic")]
    StorePoisoned,

    #[error("worker task failed: {0}")]
    Worker(String),
}
