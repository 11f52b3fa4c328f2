//! Curriculum controllers ("teachers").
//!
//! A controller owns the distribution over difficulties (number of supervised
//! time steps per example). It hands out difficulties for training and
//! validation batches and, once per epoch, consumes the latest per-difficulty
//! validation loss to reshape that distribution.
//!
//! | Kind | Distribution | Update |
//! |------|--------------|--------|
//! | [`UniformCurriculum`] | uniform over `1..=max` | none |
//! | [`AdaptiveCurriculum`] | weights follow validation loss | on validation epochs |
//! | [`IncrementalCurriculum`] | uniform over `1..=ceiling` | ceiling rises when mastered |
//!
//! Sampling consumes the controller's own seeded RNG but never changes the
//! distribution; only [`CurriculumController::update_distribution`] does.

mod adaptive;
mod incremental;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use trajcur_common::{TeacherConfig, TeacherKind};

pub use adaptive::AdaptiveCurriculum;
pub use incremental::IncrementalCurriculum;

/// Contract between the training loop and a curriculum policy.
pub trait CurriculumController {
    /// Largest difficulty this controller can hand out.
    fn max_difficulty(&self) -> usize;

    /// One difficulty in `[1, max_difficulty]` per training example.
    fn sample_training_difficulties(&mut self, batch_size: usize) -> Vec<usize>;

    /// Stratified sweep: difficulties cycle through `1..=max_difficulty`, so a
    /// size of `k · max_difficulty` gives every bucket exactly `k` examples.
    fn sample_validation_difficulties(&self, validation_size: usize) -> Vec<usize> {
        let buckets = self.max_difficulty();
        (0..validation_size).map(|i| i % buckets + 1).collect()
    }

    /// Called exactly once per epoch. `validation_loss` is the most recent
    /// per-difficulty loss (index `d - 1`), if any validation has run.
    fn update_distribution(
        &mut self,
        epoch: usize,
        validation_loss: Option<&[f32]>,
        is_validation_epoch: bool,
    );

    /// Current sampling probability per difficulty (index `d - 1`).
    fn distribution_snapshot(&self) -> Vec<f32>;

    /// Controller-specific view of a raw loss vector for logging. Pure.
    fn transform_validation_loss(&self, raw: &[f32]) -> Vec<f32> {
        raw.to_vec()
    }
}

// ── Uniform ─────────────────────────────────────────────────────────────────

/// Every difficulty equally likely, forever.
pub struct UniformCurriculum {
    max_difficulty: usize,
    rng: StdRng,
}

impl UniformCurriculum {
    pub fn new(max_difficulty: usize, seed: u64) -> Self {
        Self {
            max_difficulty: max_difficulty.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl CurriculumController for UniformCurriculum {
    fn max_difficulty(&self) -> usize {
        self.max_difficulty
    }

    fn sample_training_difficulties(&mut self, batch_size: usize) -> Vec<usize> {
        (0..batch_size)
            .map(|_| self.rng.gen_range(1..=self.max_difficulty))
            .collect()
    }

    fn update_distribution(&mut self, _: usize, _: Option<&[f32]>, _: bool) {}

    fn distribution_snapshot(&self) -> Vec<f32> {
        vec![1.0 / self.max_difficulty as f32; self.max_difficulty]
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Controller selected by [`TeacherKind`].
pub enum Curriculum {
    Uniform(UniformCurriculum),
    Adaptive(AdaptiveCurriculum),
    Incremental(IncrementalCurriculum),
}

impl Curriculum {
    /// Construct from config; `seed` drives all of the controller's sampling.
    pub fn from_config(config: &TeacherConfig, seed: u64) -> Self {
        let curriculum = match config.kind {
            TeacherKind::Uniform => Self::Uniform(UniformCurriculum::new(config.max_difficulty, seed)),
            TeacherKind::Adaptive => Self::Adaptive(AdaptiveCurriculum::new(
                config.max_difficulty,
                config.floor,
                config.temperature,
                config.smoothing,
                seed,
            )),
            TeacherKind::Incremental => Self::Incremental(IncrementalCurriculum::new(
                config.max_difficulty,
                config.initial_ceiling,
                config.promote_threshold,
                seed,
            )),
        };
        tracing::info!(
            kind = %config.kind,
            max_difficulty = config.max_difficulty,
            "Teacher created"
        );
        curriculum
    }

    pub fn kind(&self) -> TeacherKind {
        match self {
            Self::Uniform(_) => TeacherKind::Uniform,
            Self::Adaptive(_) => TeacherKind::Adaptive,
            Self::Incremental(_) => TeacherKind::Incremental,
        }
    }

    fn inner(&self) -> &dyn CurriculumController {
        match self {
            Self::Uniform(c) => c,
            Self::Adaptive(c) => c,
            Self::Incremental(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CurriculumController {
        match self {
            Self::Uniform(c) => c,
            Self::Adaptive(c) => c,
            Self::Incremental(c) => c,
        }
    }
}

impl CurriculumController for Curriculum {
    fn max_difficulty(&self) -> usize {
        self.inner().max_difficulty()
    }

    fn sample_training_difficulties(&mut self, batch_size: usize) -> Vec<usize> {
        self.inner_mut().sample_training_difficulties(batch_size)
    }

    fn sample_validation_difficulties(&self, validation_size: usize) -> Vec<usize> {
        self.inner().sample_validation_difficulties(validation_size)
    }

    fn update_distribution(
        &mut self,
        epoch: usize,
        validation_loss: Option<&[f32]>,
        is_validation_epoch: bool,
    ) {
        self.inner_mut()
            .update_distribution(epoch, validation_loss, is_validation_epoch)
    }

    fn distribution_snapshot(&self) -> Vec<f32> {
        self.inner().distribution_snapshot()
    }

    fn transform_validation_loss(&self, raw: &[f32]) -> Vec<f32> {
        self.inner().transform_validation_loss(raw)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn teacher(kind: TeacherKind) -> TeacherConfig {
        TeacherConfig {
            kind,
            max_difficulty: 4,
            ..Default::default()
        }
    }

    #[test]
    fn training_samples_stay_in_range() {
        for kind in TeacherKind::ALL {
            let mut c = Curriculum::from_config(&teacher(kind), 0);
            assert_eq!(c.kind(), kind);
            let d = c.sample_training_difficulties(500);
            assert_eq!(d.len(), 500);
            assert!(d.iter().all(|&x| (1..=4).contains(&x)), "{kind}: {d:?}");
        }
    }

    #[test]
    fn validation_sweep_is_stratified() {
        let c = Curriculum::from_config(&teacher(TeacherKind::Adaptive), 0);
        let d = c.sample_validation_difficulties(12);
        for bucket in 1..=4 {
            assert_eq!(d.iter().filter(|&&x| x == bucket).count(), 3);
        }
    }

    #[test]
    fn same_seed_same_difficulties() {
        let mut a = Curriculum::from_config(&teacher(TeacherKind::Uniform), 9);
        let mut b = Curriculum::from_config(&teacher(TeacherKind::Uniform), 9);
        assert_eq!(
            a.sample_training_difficulties(64),
            b.sample_training_difficulties(64)
        );
    }

    #[test]
    fn uniform_ignores_updates() {
        let mut c = Curriculum::from_config(&teacher(TeacherKind::Uniform), 0);
        let before = c.distribution_snapshot();
        c.update_distribution(0, Some(&[1.0, 5.0, 0.1, 0.0]), true);
        assert_eq!(c.distribution_snapshot(), before);
        assert_eq!(before, vec![0.25; 4]);
        assert_eq!(c.transform_validation_loss(&[1.0, 2.0]), vec![1.0, 2.0]);
    }
}
