use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvoicingError {
    #[error("Invalid value for {field}: {details}")]
    Validation { field: String, details: String },

    #[error("Invalid percentage {0}: must be between 0 and 100")]
    InvalidPercentage(f64),

    #[error("Invalid {field} {value}: amounts cannot be negative")]
    NegativeAmount { field: String, value: f64 },

    #[error("Invalid conversion rate {0}: must be greater than zero")]
    InvalidConversionRate(f64),

    #[error("Store error: {0}")]
    Store(String),

    #[error("No ledger entry for creator {creator_id} in week {week_start}")]
    EntryNotFound {
        creator_id: String,
        week_start: NaiveDate,
    },

    #[error("Percentage update for creator {creator_id} from {from} failed: {details}")]
    PropagationFailed {
        creator_id: String,
        from: NaiveDate,
        details: String,
    },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl InvoicingError {
    pub fn validation(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            details: details.into(),
        }
    }

    /// True for failures raised before any store call was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InvalidPercentage(_)
                | Self::NegativeAmount { .. }
                | Self::InvalidConversionRate(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, InvoicingError>;
