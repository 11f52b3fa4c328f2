//! Error taxonomy shared by every crate in the workspace.
//!
//! Functions return `anyhow::Result`; these variants are raised where a
//! caller may want to react to the specific failure and can be recovered
//! with `err.downcast_ref::<CurriculumError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CurriculumError {
    /// More examples were requested than the trajectory split holds.
    #[error("batch size {requested} exceeds the {available} samples available")]
    InvalidBatchSize { requested: usize, available: usize },

    /// A difficulty of zero was requested for the example at `index`.
    #[error("difficulty at index {index} must be positive, got {value}")]
    InvalidDifficulty { index: usize, value: usize },

    /// Malformed or inconsistent configuration; fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Run data already exists and overwriting was not confirmed.
    #[error("existing run data at {} (overwrite not confirmed)", path.display())]
    CheckpointConflict { path: PathBuf },
}

impl CurriculumError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
