//! Ceiling curriculum: uniform over `1..=ceiling`, raising the ceiling once the
//! student's validation loss at the current ceiling drops below a threshold.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::CurriculumController;

pub struct IncrementalCurriculum {
    max_difficulty: usize,
    ceiling: usize,
    promote_threshold: f64,
    rng: StdRng,
}

impl IncrementalCurriculum {
    pub fn new(max_difficulty: usize, initial_ceiling: usize, promote_threshold: f64, seed: u64) -> Self {
        let max_difficulty = max_difficulty.max(1);
        Self {
            max_difficulty,
            ceiling: initial_ceiling.clamp(1, max_difficulty),
            promote_threshold,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

impl CurriculumController for IncrementalCurriculum {
    fn max_difficulty(&self) -> usize {
        self.max_difficulty
    }

    fn sample_training_difficulties(&mut self, batch_size: usize) -> Vec<usize> {
        (0..batch_size)
            .map(|_| self.rng.gen_range(1..=self.ceiling))
            .collect()
    }

    fn update_distribution(
        &mut self,
        epoch: usize,
        validation_loss: Option<&[f32]>,
        is_validation_epoch: bool,
    ) {
        if !is_validation_epoch || self.ceiling >= self.max_difficulty {
            return;
        }
        let Some(loss) = validation_loss.and_then(|l| l.get(self.ceiling - 1)) else {
            return;
        };
        if loss.is_finite() && (*loss as f64) < self.promote_threshold {
            self.ceiling += 1;
            tracing::info!(epoch, ceiling = self.ceiling, "Difficulty ceiling raised");
        }
    }

    fn distribution_snapshot(&self) -> Vec<f32> {
        let p = 1.0 / self.ceiling as f32;
        (1..=self.max_difficulty)
            .map(|d| if d <= self.ceiling { p } else { 0.0 })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_never_exceed_ceiling() {
        let mut c = IncrementalCurriculum::new(5, 2, 0.01, 0);
        let d = c.sample_training_difficulties(200);
        assert!(d.iter().all(|&x| x == 1 || x == 2));
        assert_eq!(c.distribution_snapshot(), vec![0.5, 0.5, 0.0, 0.0, 0.0]);
        // Validation still covers every bucket.
        assert_eq!(c.sample_validation_difficulties(5), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn ceiling_rises_only_when_mastered() {
        let mut c = IncrementalCurriculum::new(3, 1, 0.1, 0);
        c.update_distribution(0, Some(&[0.5, 0.0, 0.0]), true);
        assert_eq!(c.ceiling(), 1);
        c.update_distribution(1, Some(&[0.05, 0.0, 0.0]), false);
        assert_eq!(c.ceiling(), 1);
        c.update_distribution(2, Some(&[0.05, 0.9, 0.0]), true);
        assert_eq!(c.ceiling(), 2);
        c.update_distribution(3, Some(&[0.05, 0.01, 0.0]), true);
        assert_eq!(c.ceiling(), 3);
        c.update_distribution(4, Some(&[0.0, 0.0, 0.0]), true);
        assert_eq!(c.ceiling(), 3);
    }
}
