use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ConfigError;

/// An organization (clinic or practice) owning patients and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    /// IANA timezone name, e.g. "America/New_York". Drives the dormancy
    /// rollover clock; never a fixed UTC offset.
    pub timezone: String,
    /// Currency window for lab documents, independent of any screening's
    /// relevancy window.
    pub lab_currency_months: u32,
    /// Currency window for vitals documents.
    pub vitals_currency_months: u32,
}

impl Organization {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }
}
