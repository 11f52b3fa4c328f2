//! # trajcur-train: Curriculum Training
//!
//! Everything between the trajectory data and a trained student:
//!
//! * **[`Curriculum`]**: picks which difficulties (supervised horizon
//!   lengths) the student sees, and adapts that choice from validation loss.
//! * **[`BatchBuilder`]**: cuts one variable-length window per example and
//!   packs them into zero-padded tensors.
//! * **[`LossEvaluator`]**: masked training loss and the per-difficulty
//!   validation distribution.
//! * **[`Trainer`]**: the epoch loop: optimisation, validation, checkpoints,
//!   history and the overwrite guard.

pub mod batch;
pub mod curriculum;
pub mod history;
pub mod loss;
pub mod trainer;

pub use batch::{Batch, BatchBuilder};
pub use curriculum::{
    AdaptiveCurriculum, Curriculum, CurriculumController, IncrementalCurriculum, UniformCurriculum,
};
pub use history::History;
pub use loss::{padding_mask, LossDistribution, LossEvaluator};
pub use trainer::{
    is_validation_epoch, EarlyStop, EpochReport, RunContext, SeedStream, Trainer, TrainingSummary,
};
