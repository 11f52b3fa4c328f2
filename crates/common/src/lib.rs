//! # trajcur-common: Shared Primitives
//!
//! Types and utilities shared across every crate in the workspace:
//!
//! * **[`RunConfig`]**: run hyper-parameters (serialised as JSON, dot-path overrides).
//! * **[`StudentKind`]** / **[`TeacherKind`]**: closed registries of named variants.
//! * **[`CurriculumError`]**: typed failures callers may react to.
//! * **[`TrajectoryStore`]**: fixed-shape `[time, sample, feature]` trajectories.
//! * **[`PathManager`]**: run directory layout and the overwrite guard.

pub mod config;
pub mod data;
pub mod error;
pub mod paths;

pub use config::{
    DataConfig, GeneralConfig, RunConfig, StudentConfig, StudentKind, TeacherConfig, TeacherKind,
    DEFAULT_VAL_PERIOD,
};
pub use data::TrajectoryStore;
pub use error::CurriculumError;
pub use paths::PathManager;
