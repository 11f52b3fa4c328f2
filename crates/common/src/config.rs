//! Run configuration.
//!
//! Serialised as JSON. Every field has a sensible default so a minimal `{}`
//! produces a working (if small) run. Dot-path overrides such as
//! `general.epochs=20` are applied to the JSON tree before deserialisation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CurriculumError;

/// Validation period (in epochs) used when the config does not set one.
pub const DEFAULT_VAL_PERIOD: usize = 50;

/// Top-level configuration of one training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub student: StudentConfig,
    #[serde(default)]
    pub teacher: TeacherConfig,
}

// ── Sections ────────────────────────────────────────────────────────────────

/// Loop-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Seeds every random stream of the run (batches, controller, init).
    #[serde(default)]
    pub seed_train: u64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Training examples per epoch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Validate at epoch 0, every `val_period` epochs, and on the last epoch.
    #[serde(default = "default_val_period")]
    pub val_period: usize,
    /// Integration step of the student's time grid.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    #[serde(default)]
    pub early_stopping: bool,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Overrides the run directory name derived from the config.
    #[serde(default)]
    pub run_name: Option<String>,
}

/// Where the trajectory splits live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    #[serde(default = "default_data_path")]
    pub path: PathBuf,
    #[serde(default = "default_train_key")]
    pub train_key: String,
    #[serde(default = "default_val_key")]
    pub val_key: String,
}

/// Student architecture and optimiser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudentConfig {
    #[serde(default)]
    pub kind: StudentKind,
    /// Width of each hidden layer (`mlp` only).
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    /// Number of hidden layers (`mlp` only).
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

/// Curriculum controller settings.
///
/// Only the fields relevant to the selected `kind` are read; the rest are
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeacherConfig {
    #[serde(default)]
    pub kind: TeacherKind,
    /// Largest difficulty the controller ever hands out.
    #[serde(default = "default_max_difficulty")]
    pub max_difficulty: usize,
    /// Validation examples per difficulty bucket.
    #[serde(default = "default_val_examples_per_bucket")]
    pub val_examples_per_bucket: usize,
    /// Uniform probability mass mixed into the adaptive distribution.
    #[serde(default = "default_floor")]
    pub floor: f64,
    /// Sharpness of the loss → weight mapping (`adaptive`).
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Step toward the new target distribution per validation (`adaptive`).
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
    /// Starting ceiling (`incremental`).
    #[serde(default = "default_initial_ceiling")]
    pub initial_ceiling: usize,
    /// Loss at the ceiling below which it is raised (`incremental`).
    #[serde(default = "default_promote_threshold")]
    pub promote_threshold: f64,
}

// ── Registries ──────────────────────────────────────────────────────────────

/// Closed set of student vector-field architectures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentKind {
    #[default]
    Mlp,
    Linear,
}

impl StudentKind {
    pub const ALL: [Self; 2] = [Self::Mlp, Self::Linear];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mlp => "mlp",
            Self::Linear => "linear",
        }
    }
}

/// Closed set of curriculum controllers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeacherKind {
    Uniform,
    #[default]
    Adaptive,
    Incremental,
}

impl TeacherKind {
    pub const ALL: [Self; 3] = [Self::Uniform, Self::Adaptive, Self::Incremental];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Adaptive => "adaptive",
            Self::Incremental => "incremental",
        }
    }
}

macro_rules! impl_kind_parsing {
    ($kind:ty, $label:literal) => {
        impl FromStr for $kind {
            type Err = CurriculumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$kind>::ALL
                    .into_iter()
                    .find(|k| k.name() == s)
                    .ok_or_else(|| {
                        let valid: Vec<_> = <$kind>::ALL.iter().map(|k| k.name()).collect();
                        CurriculumError::config(format!(
                            "unknown {} '{s}' (expected one of: {})",
                            $label,
                            valid.join(", ")
                        ))
                    })
            }
        }

        impl fmt::Display for $kind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

impl_kind_parsing!(StudentKind, "student kind");
impl_kind_parsing!(TeacherKind, "teacher kind");

// ── Default value functions ─────────────────────────────────────────────────

fn default_epochs() -> usize {
    1000
}
fn default_batch_size() -> usize {
    100
}
fn default_val_period() -> usize {
    DEFAULT_VAL_PERIOD
}
fn default_step_size() -> f64 {
    0.04
}
fn default_output_root() -> PathBuf {
    PathBuf::from("runs")
}
fn default_data_path() -> PathBuf {
    PathBuf::from("trajectories.safetensors")
}
fn default_train_key() -> String {
    "train".to_string()
}
fn default_val_key() -> String {
    "val".to_string()
}
fn default_hidden_size() -> usize {
    64
}
fn default_depth() -> usize {
    2
}
fn default_learning_rate() -> f64 {
    1e-3
}
fn default_max_difficulty() -> usize {
    10
}
fn default_val_examples_per_bucket() -> usize {
    100
}
fn default_floor() -> f64 {
    0.05
}
fn default_temperature() -> f64 {
    1.0
}
fn default_smoothing() -> f64 {
    0.5
}
fn default_initial_ceiling() -> usize {
    1
}
fn default_promote_threshold() -> f64 {
    0.01
}

// ── Impl ────────────────────────────────────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            seed_train: 0,
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            val_period: default_val_period(),
            step_size: default_step_size(),
            early_stopping: false,
            output_root: default_output_root(),
            run_name: None,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            train_key: default_train_key(),
            val_key: default_val_key(),
        }
    }
}

impl Default for StudentConfig {
    fn default() -> Self {
        Self {
            kind: StudentKind::default(),
            hidden_size: default_hidden_size(),
            depth: default_depth(),
            learning_rate: default_learning_rate(),
        }
    }
}

impl Default for TeacherConfig {
    fn default() -> Self {
        Self {
            kind: TeacherKind::default(),
            max_difficulty: default_max_difficulty(),
            val_examples_per_bucket: default_val_examples_per_bucket(),
            floor: default_floor(),
            temperature: default_temperature(),
            smoothing: default_smoothing(),
            initial_ceiling: default_initial_ceiling(),
            promote_threshold: default_promote_threshold(),
        }
    }
}

impl TeacherConfig {
    /// Size of one validation pass: every bucket gets the same share.
    pub fn validation_size(&self) -> usize {
        self.val_examples_per_bucket * self.max_difficulty
    }
}

impl RunConfig {
    /// Save config to a JSON file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Self::load_with_overrides(path, &[])
    }

    /// Load config from a JSON file, applying `key.path=value` overrides.
    pub fn load_with_overrides(path: &Path, overrides: &[String]) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut tree: Value = serde_json::from_str(&json)
            .map_err(|e| CurriculumError::config(format!("{}: {e}", path.display())))?;
        for raw in overrides {
            let (key, value) = parse_override(raw)?;
            apply_override(&mut tree, &key, value)?;
            tracing::info!(key = %key, "Config parameter overridden");
        }
        Self::from_value(tree)
    }

    /// Deserialise from a JSON tree, mapping failures to [`CurriculumError::Config`].
    pub fn from_value(tree: Value) -> anyhow::Result<Self> {
        let config: Self =
            serde_json::from_value(tree).map_err(|e| CurriculumError::config(e.to_string()))?;
        Ok(config)
    }

    /// Reject settings that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), CurriculumError> {
        let g = &self.general;
        let s = &self.student;
        let t = &self.teacher;
        let checks: [(bool, &str); 11] = [
            (g.epochs == 0, "general.epochs must be at least 1"),
            (g.batch_size == 0, "general.batch_size must be at least 1"),
            (g.val_period == 0, "general.val_period must be at least 1"),
            (
                !(g.step_size.is_finite() && g.step_size > 0.0),
                "general.step_size must be positive",
            ),
            (
                !(s.learning_rate.is_finite() && s.learning_rate > 0.0),
                "student.learning_rate must be positive",
            ),
            (
                s.kind == StudentKind::Mlp && (s.hidden_size == 0 || s.depth == 0),
                "student.hidden_size and student.depth must be at least 1 for mlp",
            ),
            (t.max_difficulty == 0, "teacher.max_difficulty must be at least 1"),
            (
                t.val_examples_per_bucket == 0,
                "teacher.val_examples_per_bucket must be at least 1",
            ),
            (
                !(0.0..=1.0).contains(&t.floor),
                "teacher.floor must lie in [0, 1]",
            ),
            (
                !(t.smoothing > 0.0 && t.smoothing <= 1.0) || !(t.temperature > 0.0),
                "teacher.smoothing must lie in (0, 1] and teacher.temperature must be positive",
            ),
            (
                t.initial_ceiling == 0 || t.initial_ceiling > t.max_difficulty,
                "teacher.initial_ceiling must lie in [1, max_difficulty]",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(CurriculumError::config(*msg)),
            None => Ok(()),
        }
    }
}

// ── Overrides ───────────────────────────────────────────────────────────────

/// Split `a.b.c=value`; the value is parsed as JSON, falling back to a string.
fn parse_override(raw: &str) -> Result<(String, Value), CurriculumError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| CurriculumError::config(format!("override '{raw}' is not key=value")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(CurriculumError::config(format!("override '{raw}' has an empty key")));
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

/// Set `tree[a][b][c] = value`. Intermediate sections are created when
/// absent only at the top level (sections may be omitted from the file).
fn apply_override(tree: &mut Value, key: &str, value: Value) -> Result<(), CurriculumError> {
    let parts: Vec<&str> = key.split('.').collect();
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| CurriculumError::config("empty override key"))?;
    let mut node = tree;
    for (depth, part) in parents.iter().enumerate() {
        let obj = node.as_object_mut().ok_or_else(|| {
            CurriculumError::config(format!("override '{key}': '{part}' is not inside a section"))
        })?;
        if depth == 0 && !obj.contains_key(*part) {
            if !SECTIONS.contains(part) {
                return Err(CurriculumError::config(format!(
                    "override '{key}': unknown section '{part}'"
                )));
            }
            obj.insert(part.to_string(), Value::Object(Default::default()));
        }
        node = obj.get_mut(*part).ok_or_else(|| {
            CurriculumError::config(format!("override '{key}': missing key '{part}'"))
        })?;
    }
    let obj = node.as_object_mut().ok_or_else(|| {
        CurriculumError::config(format!("override '{key}': parent is not an object"))
    })?;
    obj.insert(last.to_string(), value);
    Ok(())
}

const SECTIONS: [&str; 4] = ["general", "data", "student", "teacher"];

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.general.epochs, 1000);
        assert_eq!(config.general.batch_size, 100);
        assert_eq!(config.general.val_period, DEFAULT_VAL_PERIOD);
        assert!((config.general.step_size - 0.04).abs() < 1e-12);
        assert_eq!(config.student.kind, StudentKind::Mlp);
        assert_eq!(config.teacher.kind, TeacherKind::Adaptive);
        assert_eq!(config.teacher.validation_size(), 1000);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let json = r#"{ "teacher": { "kind": "incremental", "max_difficulty": 4 } }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.teacher.kind, TeacherKind::Incremental);
        assert_eq!(config.teacher.max_difficulty, 4);
        assert_eq!(config.teacher.initial_ceiling, 1);
        assert_eq!(config.student.depth, 2);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let json = r#"{ "student": { "kind": "transformer" } }"#;
        let err = RunConfig::from_value(serde_json::from_str(json).unwrap()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CurriculumError>(),
            Some(CurriculumError::Config(_))
        ));
        let err = "transformer".parse::<StudentKind>().unwrap_err();
        assert!(err.to_string().contains("mlp, linear"));
        assert_eq!("incremental".parse::<TeacherKind>().unwrap(), TeacherKind::Incremental);
    }

    #[test]
    fn dot_path_overrides() {
        let mut tree: Value = serde_json::from_str(r#"{ "general": { "epochs": 5 } }"#).unwrap();
        let (k, v) = parse_override("general.epochs=20").unwrap();
        apply_override(&mut tree, &k, v).unwrap();
        let (k, v) = parse_override("teacher.kind=uniform").unwrap();
        apply_override(&mut tree, &k, v).unwrap();
        let (k, v) = parse_override("student.learning_rate=0.01").unwrap();
        apply_override(&mut tree, &k, v).unwrap();

        let config = RunConfig::from_value(tree).unwrap();
        assert_eq!(config.general.epochs, 20);
        assert_eq!(config.teacher.kind, TeacherKind::Uniform);
        assert!((config.student.learning_rate - 0.01).abs() < 1e-12);
    }

    #[test]
    fn bad_overrides_are_config_errors() {
        let mut tree: Value = serde_json::from_str(r#"{ "general": { "epochs": 5 } }"#).unwrap();
        assert!(parse_override("general.epochs").is_err());
        let (k, v) = parse_override("model.depth=3").unwrap();
        assert!(apply_override(&mut tree, &k, v).is_err());
        let (k, v) = parse_override("general.epochs.inner=3").unwrap();
        assert!(apply_override(&mut tree, &k, v).is_err());

        // Typos in leaf names surface at deserialisation.
        let (k, v) = parse_override("general.epoch=3").unwrap();
        apply_override(&mut tree, &k, v).unwrap();
        assert!(RunConfig::from_value(tree).is_err());
    }

    #[test]
    fn load_applies_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        RunConfig::default().save(&path).unwrap();
        let config =
            RunConfig::load_with_overrides(&path, &["general.seed_train=7".to_string()]).unwrap();
        assert_eq!(config.general.seed_train, 7);
    }

    #[test]
    fn validation_catches_inconsistent_values() {
        let mut config = RunConfig::default();
        config.teacher.initial_ceiling = 11;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.teacher.floor = 1.5;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.general.epochs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("epochs"));

        let mut config = RunConfig::default();
        config.student.kind = StudentKind::Linear;
        config.student.depth = 0;
        config.validate().unwrap();
    }
}
