//! # trajcur-core: Student Models
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`student`] | `Student` contract, `InferenceMode` guard, time grids |
//! | [`field`] | `VectorField` (linear / MLP), selected by `StudentKind` |
//! | [`model`] | `OdeStudent`: Euler rollout, checkpoints |
//! | [`init`] | seeded, order-stable parameter initialisation |
//!
//! Everything goes through `candle-core`/`candle-nn`, so the same code runs
//! on CPU, CUDA and Metal. Same seed + same inputs = same rollout.

pub mod field;
pub mod init;
pub mod model;
pub mod student;

pub use field::VectorField;
pub use init::reseed_parameters;
pub use model::OdeStudent;
pub use student::{uniform_time_grid, InferenceMode, Student};
