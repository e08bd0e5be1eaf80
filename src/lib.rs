//! recare: screening eligibility and document-matching engine.
//!
//! Determines which recurring screenings each patient needs, whether
//! their documents satisfy them, and when the next one is due. The
//! batch runner in [`engine`] recomputes every patient against a
//! variant snapshot taken at run start and records an immutable
//! explanation for each decision.

pub mod config;
pub mod db;
pub mod engine;
pub mod matching;
pub mod models;

use tracing_subscriber::EnvFilter;

/// Initialize tracing once at process start. RUST_LOG overrides the
/// built-in default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
