use thiserror::Error;

/// Failures a pipeline stage can report to its caller.
///
/// Every stage validates its own preconditions eagerly and returns one of
/// these instead of coercing invalid data; a multi-unit driver is expected
/// to catch a unit-level failure and continue with the next unit.
#[derive(Debug, Error)]
pub enum BcgError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("schema violation in {file_role}: missing required column '{column}'")]
    Schema { file_role: String, column: String },

    #[error("length mismatch: reference={reference}, estimate={estimate}")]
    LengthMismatch { reference: usize, estimate: usize },

    #[error("no overlapping timestamps between the two series")]
    EmptyOverlap,

    #[error("undefined ratio: reference value at index {index} is zero")]
    UndefinedRatio { index: usize },

    #[error("signal too short for zero-phase filtering: need more than {needed} samples, got {actual}")]
    FilterLength { needed: usize, actual: usize },
}

impl BcgError {
    pub fn input(msg: impl Into<String>) -> Self {
        BcgError::Input(msg.into())
    }

    pub fn schema(file_role: impl Into<String>, column: impl Into<String>) -> Self {
        BcgError::Schema {
            file_role: file_role.into(),
            column: column.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BcgError>;
