use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerBuilderError {
    #[error("Unknown month token: {0:?}")]
    UnknownMonthToken(String),

    #[error("Empty month token for client: {0}")]
    EmptyMonthToken(String),

    #[error("Invalid month number {0}: must be between 1 and 12")]
    InvalidMonthNumber(u32),

    #[error("No column mapping registered for client: {0}")]
    UnknownClient(String),

    #[error("Invalid column mapping for client {client}: {details}")]
    InvalidColumnMap { client: String, details: String },

    #[error("Invalid bin count {0}: must be at least 2")]
    InvalidBinCount(u8),

    #[error("Invalid monetary scale {0}: must be positive")]
    InvalidMonetaryScale(f64),

    #[error("Quantile scoring invoked with an empty customer population")]
    EmptyPopulation,

    #[error("Segment rule table has no catch-all: triplet {0} matches no rule")]
    MissingCatchAllRule(String),

    #[error("Segment rule table is empty")]
    EmptyRuleTable,

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerBuilderError>;
