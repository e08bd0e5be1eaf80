//! Coded clinical conditions as supplied by EMR sync.
//!
//! Codes are opaque to the engine (ICD-10, SNOMED, or site-local);
//! only exact set membership matters for trigger-condition matching.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// A coded active condition. Uppercased and trimmed at construction so
/// that EMR feeds with inconsistent casing compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionCode(String);

impl ConditionCode {
    pub fn new(code: &str) -> Result<Self, ConfigError> {
        let canonical = code.trim().to_uppercase();
        if canonical.is_empty() {
            return Err(ConfigError::MissingField("condition code"));
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
