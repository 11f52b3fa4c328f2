//! Run directory layout and the pre-run overwrite guard.

use std::path::{Path, PathBuf};

use crate::config::RunConfig;
use crate::error::CurriculumError;

/// Resolves where a run keeps its checkpoints and history.
///
/// ```text
/// <output_root>/<run_name>/checkpoints/epoch_<N>.safetensors
/// <output_root>/<run_name>/history/<category>.json
/// ```
#[derive(Debug, Clone)]
pub struct PathManager {
    run_dir: PathBuf,
}

impl PathManager {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    /// Derive the run directory from the config. Runs that differ in
    /// architecture, controller, difficulty range or seed never share one.
    pub fn from_config(config: &RunConfig) -> Self {
        let name = config.general.run_name.clone().unwrap_or_else(|| {
            format!(
                "{}_{}_d{}_s{}",
                config.student.kind,
                config.teacher.kind,
                config.teacher.max_difficulty,
                config.general.seed_train
            )
        });
        Self::new(config.general.output_root.join(name))
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.run_dir.join("checkpoints")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.run_dir.join("history")
    }

    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        self.checkpoint_dir()
            .join(format!("epoch_{epoch}.safetensors"))
    }

    /// Create the run directories, refusing to reuse existing ones silently.
    ///
    /// If either directory exists, `confirm` decides: `false` returns
    /// [`CurriculumError::CheckpointConflict`] without touching anything,
    /// `true` clears both directories so no file of the previous run
    /// survives next to the new one.
    pub fn prepare(&self, confirm: impl FnOnce(&Path) -> bool) -> anyhow::Result<()> {
        let dirs = [self.checkpoint_dir(), self.history_dir()];
        if dirs.iter().any(|d| d.exists()) {
            if !confirm(&self.run_dir) {
                return Err(CurriculumError::CheckpointConflict {
                    path: self.run_dir.clone(),
                }
                .into());
            }
            tracing::warn!(run_dir = %self.run_dir.display(), "Overwriting existing run data");
            for dir in dirs.iter().filter(|d| d.exists()) {
                std::fs::remove_dir_all(dir)?;
            }
        }
        for dir in &dirs {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_name_derives_from_config() {
        let mut config = RunConfig::default();
        config.general.output_root = PathBuf::from("out");
        config.general.seed_train = 3;
        let paths = PathManager::from_config(&config);
        assert_eq!(paths.run_dir(), Path::new("out/mlp_adaptive_d10_s3"));
        assert_eq!(
            paths.checkpoint_path(50),
            Path::new("out/mlp_adaptive_d10_s3/checkpoints/epoch_50.safetensors")
        );

        config.general.run_name = Some("custom".into());
        assert_eq!(PathManager::from_config(&config).run_dir(), Path::new("out/custom"));
    }

    #[test]
    fn fresh_run_never_asks() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::new(dir.path().join("run"));
        paths
            .prepare(|_| panic!("confirmation requested for a fresh run"))
            .unwrap();
        assert!(paths.checkpoint_dir().is_dir());
        assert!(paths.history_dir().is_dir());
    }

    #[test]
    fn declined_overwrite_leaves_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::new(dir.path().join("run"));
        paths.prepare(|_| true).unwrap();
        let ckpt = paths.checkpoint_path(0);
        std::fs::write(&ckpt, b"first run").unwrap();

        let err = paths.prepare(|_| false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CurriculumError>(),
            Some(CurriculumError::CheckpointConflict { .. })
        ));
        assert_eq!(std::fs::read(&ckpt).unwrap(), b"first run");
    }

    #[test]
    fn confirmed_overwrite_clears_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::new(dir.path().join("run"));
        paths.prepare(|_| true).unwrap();
        std::fs::write(paths.checkpoint_path(100), b"stale").unwrap();

        paths.prepare(|_| true).unwrap();
        assert!(!paths.checkpoint_path(100).exists());
        assert!(paths.checkpoint_dir().is_dir());
    }
}
