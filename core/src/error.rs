use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid scenario config '{scenario_id}': {message}")]
    InvalidConfig {
        scenario_id: String,
        message: String,
    },

    #[error("No input data: the run has no transactions to process")]
    NoInputData,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
