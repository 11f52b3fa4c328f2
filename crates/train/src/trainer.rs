//! Trainer: the epoch loop.
//!
//! One call to [`Trainer::run_epoch`] is one transition of
//!
//! ```text
//! sample difficulties → build batch → loss → backward + AdamW
//!   [validation epoch: validate → history → checkpoint → early-stop hook]
//!   → report to curriculum
//! ```
//!
//! Validation epochs are epoch 0, every `val_period` epochs, and the last
//! epoch. The curriculum hears from the trainer exactly once per epoch.

use std::path::{Path, PathBuf};

use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use trajcur_common::{CurriculumError, PathManager, RunConfig, TrajectoryStore};
use trajcur_core::{OdeStudent, Student};

use crate::batch::BatchBuilder;
use crate::curriculum::{Curriculum, CurriculumController};
use crate::history::History;
use crate::loss::{LossDistribution, LossEvaluator};

// ── Seeds ───────────────────────────────────────────────────────────────────

/// Independent random streams of a run, all derived from `seed_train`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStream {
    /// Student parameter initialisation.
    Init,
    /// Curriculum difficulty sampling.
    Curriculum,
    /// Sample and window selection for batches.
    Batches,
}

impl SeedStream {
    pub fn derive(self, seed: u64) -> u64 {
        let stream = match self {
            Self::Init => 1u64,
            Self::Curriculum => 2,
            Self::Batches => 3,
        };
        seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }
}

/// True on epoch 0, every `val_period` epochs, and the final epoch.
pub fn is_validation_epoch(epoch: usize, epochs: usize, val_period: usize) -> bool {
    epoch % val_period.max(1) == 0 || epoch + 1 == epochs
}

// ── Run state ───────────────────────────────────────────────────────────────

/// Mutable state owned by one run: the batch RNG and the history log.
pub struct RunContext {
    pub rng: StdRng,
    pub history: History,
}

impl RunContext {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(SeedStream::Batches.derive(seed)),
            history: History::new(),
        }
    }
}

/// Decision returned by the early-stopping hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyStop {
    Continue,
    Stop,
}

/// Outcome of one epoch.
#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch: usize,
    pub train_loss: f32,
    pub mean_difficulty: f64,
    pub validation: Option<LossDistribution>,
    pub checkpoint: Option<PathBuf>,
    pub early_stop: EarlyStop,
}

/// Outcome of a full [`Trainer::train`] call.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    pub final_train_loss: f32,
    pub last_validation_mean: Option<f32>,
    pub checkpoints: Vec<PathBuf>,
    pub history_files: Vec<PathBuf>,
}

// ── Trainer ─────────────────────────────────────────────────────────────────

/// Owns the student, its optimiser, the curriculum and both data splits.
///
/// The controller defaults to the config-selected [`Curriculum`]; any
/// [`CurriculumController`] can be supplied through
/// [`with_curriculum`](Trainer::with_curriculum).
pub struct Trainer<C = Curriculum> {
    student: OdeStudent,
    optimizer: AdamW,
    curriculum: C,
    batch_builder: BatchBuilder,
    evaluator: LossEvaluator,
    train_data: TrajectoryStore,
    val_data: TrajectoryStore,
    paths: PathManager,
    context: RunContext,
    config: RunConfig,
    /// Per-difficulty loss of the most recent validation.
    last_validation: Option<Vec<f32>>,
    checkpoints: Vec<PathBuf>,
    next_epoch: usize,
    prepared: bool,
}

impl Trainer {
    /// Check the config against the data and build every component.
    pub fn new(
        config: RunConfig,
        train_data: TrajectoryStore,
        val_data: TrajectoryStore,
        device: candle_core::Device,
    ) -> anyhow::Result<Self> {
        let curriculum = Curriculum::from_config(
            &config.teacher,
            SeedStream::Curriculum.derive(config.general.seed_train),
        );
        Self::with_curriculum(config, train_data, val_data, device, curriculum)
    }
}

impl<C: CurriculumController> Trainer<C> {
    /// Like [`Trainer::new`], with a caller-supplied controller. Its
    /// `max_difficulty` must match `teacher.max_difficulty`.
    pub fn with_curriculum(
        config: RunConfig,
        train_data: TrajectoryStore,
        val_data: TrajectoryStore,
        device: candle_core::Device,
        curriculum: C,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let general = &config.general;
        let teacher = &config.teacher;

        if train_data.features() != val_data.features() {
            return Err(CurriculumError::config(format!(
                "train frames have {} features, validation frames {}",
                train_data.features(),
                val_data.features()
            ))
            .into());
        }
        if general.batch_size > train_data.num_samples() {
            return Err(CurriculumError::config(format!(
                "general.batch_size {} exceeds the {} training samples",
                general.batch_size,
                train_data.num_samples()
            ))
            .into());
        }
        if teacher.validation_size() > val_data.num_samples() {
            return Err(CurriculumError::config(format!(
                "validation needs {} samples ({} per difficulty), split has {}",
                teacher.validation_size(),
                teacher.val_examples_per_bucket,
                val_data.num_samples()
            ))
            .into());
        }
        if curriculum.max_difficulty() != teacher.max_difficulty {
            return Err(CurriculumError::config(format!(
                "controller covers difficulties up to {}, teacher.max_difficulty is {}",
                curriculum.max_difficulty(),
                teacher.max_difficulty
            ))
            .into());
        }
        let shortest = train_data.time_steps().min(val_data.time_steps());
        if teacher.max_difficulty > shortest {
            tracing::warn!(
                max_difficulty = teacher.max_difficulty,
                time_steps = shortest,
                "Difficulties beyond the trajectory length are cut at the trajectory end"
            );
        }

        let seed = general.seed_train;
        let student = OdeStudent::new(
            &config.student,
            train_data.features(),
            SeedStream::Init.derive(seed),
            &device,
        )?;
        let optimizer = AdamW::new(
            student.parameters(),
            ParamsAdamW {
                lr: student.learning_rate(),
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        Ok(Self {
            student,
            optimizer,
            curriculum,
            batch_builder: BatchBuilder::new(device),
            evaluator: LossEvaluator::new(general.step_size),
            train_data,
            val_data,
            paths: PathManager::from_config(&config),
            context: RunContext::new(seed),
            last_validation: None,
            checkpoints: Vec::new(),
            next_epoch: 0,
            prepared: false,
            config,
        })
    }

    /// Pre-run guard: create the run directories, asking `confirm` before
    /// replacing data of an earlier run. Must succeed before training.
    pub fn prepare_output(&mut self, confirm: impl FnOnce(&Path) -> bool) -> anyhow::Result<()> {
        self.paths.prepare(confirm)?;
        self.config
            .save(&self.paths.run_dir().join("config.json"))?;
        self.prepared = true;
        Ok(())
    }

    /// Run the next epoch.
    pub fn run_epoch(&mut self) -> anyhow::Result<EpochReport> {
        if !self.prepared {
            anyhow::bail!("output directories not prepared; call prepare_output first");
        }
        let epoch = self.next_epoch;
        let epochs = self.config.general.epochs;
        if epoch >= epochs {
            anyhow::bail!("all {epochs} epochs already ran");
        }
        let batch_size = self.config.general.batch_size;

        let difficulties = self.curriculum.sample_training_difficulties(batch_size);
        let batch = self.batch_builder.build(
            &self.train_data,
            batch_size,
            &difficulties,
            &mut self.context.rng,
        )?;
        let loss = self.evaluator.training_loss(&self.student, &batch)?;
        let grads = loss.backward()?;
        self.optimizer.step(&grads)?;
        let train_loss = loss.to_scalar::<f32>()?;
        if !train_loss.is_finite() {
            tracing::warn!(epoch, train_loss, "Non-finite training loss");
        }

        let is_val = is_validation_epoch(epoch, epochs, self.config.general.val_period);
        let mut validation = None;
        let mut checkpoint = None;
        let mut early_stop = EarlyStop::Continue;
        if is_val {
            let dist = self.validate()?;
            self.context.history.record(
                epoch,
                train_loss,
                self.curriculum.distribution_snapshot(),
                self.curriculum.transform_validation_loss(&dist.per_difficulty),
                dist.mean,
            );
            let path = self.save_checkpoint(epoch)?;
            early_stop = self.early_stopping_hook(epoch, &dist);
            tracing::info!(
                epoch,
                train_loss,
                train_difficulty = batch.mean_difficulty(),
                val_loss = dist.mean,
                val_difficulty = dist.mean_difficulty(),
                checkpoint = %path.display(),
                "Validation"
            );
            checkpoint = Some(path);
            self.last_validation = Some(dist.per_difficulty.clone());
            validation = Some(dist);
        } else {
            tracing::debug!(epoch, train_loss, "Epoch");
        }

        self.curriculum
            .update_distribution(epoch, self.last_validation.as_deref(), is_val);
        self.next_epoch += 1;

        Ok(EpochReport {
            epoch,
            train_loss,
            mean_difficulty: batch.mean_difficulty(),
            validation,
            checkpoint,
            early_stop,
        })
    }

    /// One stratified validation pass over the validation split.
    pub fn validate(&mut self) -> anyhow::Result<LossDistribution> {
        let size = self.config.teacher.validation_size();
        let difficulties = self.curriculum.sample_validation_difficulties(size);
        let batch =
            self.batch_builder
                .build(&self.val_data, size, &difficulties, &mut self.context.rng)?;
        self.evaluator.validation_loss(&mut self.student, &batch)
    }

    /// Run the remaining epochs, then write the history.
    pub fn train(&mut self, progress: &ProgressBar) -> anyhow::Result<TrainingSummary> {
        let epochs = self.config.general.epochs;
        progress.set_length(epochs as u64);
        progress.set_position(self.next_epoch as u64);
        tracing::info!(
            epochs,
            batch_size = self.config.general.batch_size,
            teacher = %self.config.teacher.kind,
            run_dir = %self.paths.run_dir().display(),
            "Starting training"
        );

        let mut final_train_loss = f32::NAN;
        let mut last_validation_mean = None;
        let mut epochs_run = 0;
        while self.next_epoch < epochs {
            let report = self.run_epoch()?;
            final_train_loss = report.train_loss;
            epochs_run += 1;
            if let Some(dist) = &report.validation {
                last_validation_mean = Some(dist.mean);
                progress.set_message(format!("val {:.3e}", dist.mean));
            }
            progress.inc(1);
            if report.early_stop == EarlyStop::Stop {
                tracing::info!(epoch = report.epoch, "Early stop");
                break;
            }
        }
        progress.finish_with_message("done");

        let history_files = self.context.history.flush(&self.paths.history_dir())?;
        Ok(TrainingSummary {
            epochs_run,
            final_train_loss,
            last_validation_mean,
            checkpoints: self.checkpoints.clone(),
            history_files,
        })
    }

    /// Save the student under `epoch_<N>`. Existing checkpoints are never
    /// overwritten.
    fn save_checkpoint(&mut self, epoch: usize) -> anyhow::Result<PathBuf> {
        let path = self.paths.checkpoint_path(epoch);
        if path.exists() {
            return Err(CurriculumError::CheckpointConflict { path }.into());
        }
        self.student.save_checkpoint(&path)?;
        tracing::debug!(epoch, path = %path.display(), "Checkpoint saved");
        self.checkpoints.push(path.clone());
        Ok(path)
    }

    /// No stopping policy exists yet; the hook keeps its place in the loop
    /// and says so when enabled.
    fn early_stopping_hook(&self, epoch: usize, _validation: &LossDistribution) -> EarlyStop {
        if self.config.general.early_stopping {
            tracing::warn!(epoch, "Early stopping enabled but no policy is implemented; continuing");
        }
        EarlyStop::Continue
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn student(&self) -> &OdeStudent {
        &self.student
    }

    pub fn student_mut(&mut self) -> &mut OdeStudent {
        &mut self.student
    }

    pub fn curriculum(&self) -> &C {
        &self.curriculum
    }

    /// Per-difficulty loss of the most recent validation, if any ran.
    pub fn last_validation(&self) -> Option<&[f32]> {
        self.last_validation.as_deref()
    }

    pub fn history(&self) -> &History {
        &self.context.history
    }

    pub fn paths(&self) -> &PathManager {
        &self.paths
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Index of the epoch [`run_epoch`](Self::run_epoch) runs next.
    pub fn next_epoch(&self) -> usize {
        self.next_epoch
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
