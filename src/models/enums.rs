use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Gender {
    Female => "female",
    Male => "male",
    NonBinary => "non_binary",
    Unknown => "unknown",
});

str_enum!(FrequencyUnit {
    Days => "days",
    Weeks => "weeks",
    Months => "months",
    Years => "years",
});

str_enum!(VariantState {
    Draft => "draft",
    Active => "active",
    Archived => "archived",
});

str_enum!(ScreeningStatus {
    Due => "due",
    DueSoon => "due_soon",
    Compliant => "compliant",
    Overdue => "overdue",
    NotApplicable => "not_applicable",
    Unresolved => "unresolved",
    Dormant => "dormant",
});

str_enum!(DocumentType {
    LabResult => "lab_result",
    VitalsReport => "vitals_report",
    RadiologyReport => "radiology_report",
    ClinicalNote => "clinical_note",
    ProcedureNote => "procedure_note",
    DischargeSummary => "discharge_summary",
    Other => "other",
});

/// Medical-data categories with their own organization-level currency
/// settings, independent of the per-screening relevancy window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCategory {
    Labs,
    Vitals,
}

impl DocumentType {
    /// Category the organization-level currency cutoff applies to, if any.
    /// Other document types are governed only by the per-screening
    /// relevancy window.
    pub fn currency_category(&self) -> Option<DataCategory> {
        match self {
            Self::LabResult => Some(DataCategory::Labs),
            Self::VitalsReport => Some(DataCategory::Vitals),
            _ => None,
        }
    }
}

impl VariantState {
    /// Lifecycle state machine: Draft → Active → Archived.
    /// Archived is terminal; archived variants are retained for
    /// explanation replay, never deleted.
    pub fn can_transition_to(&self, next: VariantState) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Active) | (Self::Active, Self::Archived)
        )
    }
}
