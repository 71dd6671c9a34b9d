use thiserror::Error;

/// Errors produced while extracting, pricing, recording or reporting calls.
#[derive(Debug, Error)]
pub enum SpendError {
    /// The response exposes neither the OpenAI nor the Anthropic usage layout.
    #[error("response does not expose a recognised usage shape")]
    UnrecognizedUsageShape,

    /// The model has no entry in the pricing table.
    #[error("no pricing known for model '{0}'")]
    UnknownModel(String),

    #[error("spend store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row could not be decoded (bad timestamp or cost text).
    #[error("corrupt call record {id}: {reason}")]
    CorruptRecord { id: i64, reason: String },

    /// A token or duration count too large for the store's integer columns.
    #[error("{field} {value} exceeds the storable range")]
    CountOutOfRange { field: &'static str, value: u64 },

    #[error("could not determine the home directory")]
    NoHomeDirectory,
}

pub type Result<T> = std::result::Result<T, SpendError>;
