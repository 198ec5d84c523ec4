use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetentionError {
    #[error("Input contract: {0}")]
    InputContract(String),

    #[error("Invalid classification rule (priority {priority}, pattern '{pattern}'): {source}")]
    InvalidRule {
        priority: u32,
        pattern:  String,
        #[source]
        source:   regex::Error,
    },

    #[error("Data quality: {0}")]
    DataQuality(String),

    #[error("Duplicate {table} id: '{id}' appears {count} times")]
    DuplicateId {
        table: &'static str,
        id:    String,
        count: usize,
    },

    #[error("Non-dense activity grid: customer={customer_id} months={} expected={}",
        fmt_months(.months), fmt_months(.expected))]
    NonDenseGrid {
        customer_id: String,
        months:      Vec<u32>,
        expected:    Vec<u32>,
    },

    #[error("continuity breach: cohort={cohort} months={} expected={}",
        fmt_months(.months), fmt_months(.expected))]
    ContinuityBreach {
        cohort:   String,
        months:   Vec<u32>,
        expected: Vec<u32>,
    },

    #[error("Family-set mismatch: only_in_scatter={only_in_scatter:?} only_in_family_table={only_in_family_table:?}")]
    FamilySetMismatch {
        only_in_scatter:      Vec<String>,
        only_in_family_table: Vec<String>,
    },

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Validity gate: {0}")]
    ValidityGate(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RetentionError {
    /// Taxonomy bucket reported alongside the diagnostic when a run aborts.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InputContract(_) | Self::InvalidRule { .. } => "InputContractError",
            Self::DataQuality(_) | Self::DuplicateId { .. } | Self::NonDenseGrid { .. } => {
                "DataQualityError"
            }
            Self::ContinuityBreach { .. }
            | Self::FamilySetMismatch { .. }
            | Self::PolicyViolation(_) => "PolicyViolationError",
            Self::ValidityGate(_) => "ValidityGateError",
            Self::Serialization(_) | Self::Io(_) | Self::Other(_) => "InternalError",
        }
    }
}

/// Renders `[0,1,2]` without spaces so diagnostics stay on one short line.
pub fn fmt_months(months: &[u32]) -> String {
    let inner: Vec<String> = months.iter().map(u32::to_string).collect();
    format!("[{}]", inner.join(","))
}

pub type RetentionResult<T> = Result<T, RetentionError>;
