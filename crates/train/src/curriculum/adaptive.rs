//! Loss-driven curriculum: difficulties the student still gets wrong are
//! sampled more often.
//!
//! On each validation epoch the target distribution is
//!
//! ```text
//! target_d = M · ( floor / k + (1 - floor) · loss_d^(1/τ) / Σ loss^(1/τ) )
//! w_d     ← (1 - s) · w_d + s · target_d
//! ```
//!
//! where the sums run over the `k` buckets that have a usable loss and `M` is
//! the probability mass those buckets currently hold. Buckets without a loss
//! keep their weight, so a missing measurement never shifts mass.
//!
//! The loss vector comes from a stratified validation pass, which gives every
//! bucket the same number of examples; training-time sampling frequency never
//! enters the update.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::CurriculumController;

pub struct AdaptiveCurriculum {
    weights: Vec<f64>,
    floor: f64,
    temperature: f64,
    smoothing: f64,
    rng: StdRng,
}

impl AdaptiveCurriculum {
    /// Starts uniform over `1..=max_difficulty`.
    pub fn new(
        max_difficulty: usize,
        floor: f64,
        temperature: f64,
        smoothing: f64,
        seed: u64,
    ) -> Self {
        let n = max_difficulty.max(1);
        Self {
            weights: vec![1.0 / n as f64; n],
            floor: floor.clamp(0.0, 1.0),
            temperature,
            smoothing: smoothing.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Usable score per bucket: `loss^(1/τ)` for finite, non-negative losses.
    fn scores(&self, loss: &[f32]) -> Vec<Option<f64>> {
        let exponent = 1.0 / self.temperature;
        (0..self.weights.len())
            .map(|d| {
                loss.get(d)
                    .map(|&l| l as f64)
                    .filter(|l| l.is_finite() && *l >= 0.0)
                    .map(|l| l.powf(exponent))
            })
            .collect()
    }
}

impl CurriculumController for AdaptiveCurriculum {
    fn max_difficulty(&self) -> usize {
        self.weights.len()
    }

    fn sample_training_difficulties(&mut self, batch_size: usize) -> Vec<usize> {
        match WeightedIndex::new(&self.weights) {
            Ok(dist) => (0..batch_size)
                .map(|_| dist.sample(&mut self.rng) + 1)
                .collect(),
            // Weights are kept normalised; an unusable vector means every
            // update so far was degenerate, so fall back to the sweep order.
            Err(_) => self.sample_validation_difficulties(batch_size),
        }
    }

    fn update_distribution(
        &mut self,
        epoch: usize,
        validation_loss: Option<&[f32]>,
        is_validation_epoch: bool,
    ) {
        if !is_validation_epoch {
            return;
        }
        let Some(loss) = validation_loss else {
            return;
        };

        let scores = self.scores(loss);
        let known = scores.iter().flatten().count();
        if known == 0 {
            tracing::warn!(epoch, "No usable validation loss; distribution unchanged");
            return;
        }
        let score_sum: f64 = scores.iter().flatten().sum();
        let mass: f64 = scores
            .iter()
            .zip(&self.weights)
            .filter(|(s, _)| s.is_some())
            .map(|(_, w)| w)
            .sum();

        for (w, score) in self.weights.iter_mut().zip(&scores) {
            let Some(score) = score else { continue };
            let share = if score_sum > 0.0 {
                score / score_sum
            } else {
                1.0 / known as f64
            };
            let target = mass * (self.floor / known as f64 + (1.0 - self.floor) * share);
            *w = (1.0 - self.smoothing) * *w + self.smoothing * target;
        }

        tracing::debug!(epoch, weights = ?self.weights, "Difficulty distribution updated");
    }

    fn distribution_snapshot(&self) -> Vec<f32> {
        self.weights.iter().map(|&w| w as f32).collect()
    }

    /// Loss shares: each bucket's fraction of the total validation loss.
    fn transform_validation_loss(&self, raw: &[f32]) -> Vec<f32> {
        let total: f32 = raw.iter().filter(|l| l.is_finite()).sum();
        if total > 0.0 {
            raw.iter().map(|l| l / total).collect()
        } else {
            raw.to_vec()
        }
    }
}
