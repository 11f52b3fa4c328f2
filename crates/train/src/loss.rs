//! Masked trajectory losses.
//!
//! Both modes roll the student out over `max_difficulty` steps and zero every
//! output slot at or past an example's own difficulty before comparing with
//! the (already zero-padded) targets. Padding therefore contributes exactly
//! zero error.
//!
//! The mask is per example. A mask built from a single difficulty for the
//! whole batch (e.g. the easiest one) would silently drop supervised steps of
//! harder examples and skew the per-difficulty numbers.

use candle_core::{Device, Tensor};
use serde::Serialize;

use trajcur_common::CurriculumError;
use trajcur_core::{uniform_time_grid, InferenceMode, Student};

use crate::batch::Batch;

/// Mean validation loss per difficulty bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossDistribution {
    /// Index `d - 1` → mean loss per supervised step at difficulty `d`.
    pub per_difficulty: Vec<f32>,
    /// Index `d - 1` → number of examples at difficulty `d`.
    pub counts: Vec<usize>,
    /// Mean over buckets that received at least one example.
    pub mean: f32,
}

impl LossDistribution {
    /// Aggregate per-example losses into difficulty buckets.
    ///
    /// A bucket's mean is divided by `count · d`: an example at difficulty `d`
    /// is supervised on `d` steps, so this yields a per-step loss comparable
    /// across buckets. Empty buckets report zero and are left out of `mean`.
    ///
    /// Every difficulty must lie in `[1, max_difficulty]`; anything else is
    /// [`CurriculumError::InvalidDifficulty`].
    pub fn from_examples(
        losses: &[f32],
        difficulties: &[usize],
        max_difficulty: usize,
    ) -> anyhow::Result<Self> {
        if losses.len() != difficulties.len() {
            anyhow::bail!(
                "{} losses for {} difficulties",
                losses.len(),
                difficulties.len()
            );
        }
        let mut accumulated = vec![0f64; max_difficulty];
        let mut counts = vec![0usize; max_difficulty];
        for (index, (&loss, &d)) in losses.iter().zip(difficulties).enumerate() {
            if d == 0 || d > max_difficulty {
                return Err(CurriculumError::InvalidDifficulty { index, value: d }.into());
            }
            accumulated[d - 1] += loss as f64;
            counts[d - 1] += 1;
        }

        let per_difficulty: Vec<f32> = accumulated
            .iter()
            .zip(&counts)
            .enumerate()
            .map(|(bucket, (&sum, &count))| (sum / (count * (bucket + 1)).max(1) as f64) as f32)
            .collect();

        let sampled = counts.iter().filter(|&&c| c > 0).count();
        let mean = if sampled == 0 {
            0.0
        } else {
            per_difficulty.iter().sum::<f32>() / sampled as f32
        };

        Ok(Self {
            per_difficulty,
            counts,
            mean,
        })
    }

    /// Average difficulty of the examples that were scored.
    pub fn mean_difficulty(&self) -> f64 {
        let total: usize = self.counts.iter().sum();
        let weighted: usize = self
            .counts
            .iter()
            .enumerate()
            .map(|(bucket, &count)| count * (bucket + 1))
            .sum();
        weighted as f64 / total.max(1) as f64
    }
}

/// Runs the student over a [`Batch`] and scores it against the targets.
#[derive(Debug, Clone, Copy)]
pub struct LossEvaluator {
    step_size: f64,
}

impl LossEvaluator {
    pub fn new(step_size: f64) -> Self {
        Self { step_size }
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Scalar training loss, differentiable w.r.t. the student's parameters.
    ///
    /// Squared error summed over all slots, divided by the number of valid
    /// `(time step, state channel)` pairs `Σ d_i · state_width`, so batches
    /// with different difficulty mixes are on the same scale.
    pub fn training_loss<S: Student + ?Sized>(
        &self,
        student: &S,
        batch: &Batch,
    ) -> anyhow::Result<Tensor> {
        let predicted = self.masked_rollout(student, batch)?;
        let state_width = batch.targets.dim(2)?;
        let valid = (batch.total_difficulty() * state_width).max(1);
        let loss = (predicted - &batch.targets)?
            .sqr()?
            .sum_all()?
            .affine(1.0 / valid as f64, 0.0)?;
        Ok(loss)
    }

    /// Per-difficulty validation loss.
    ///
    /// The student runs in inference mode for the duration of the call and
    /// gets its previous mode back on every exit path.
    pub fn validation_loss<S: Student + ?Sized>(
        &self,
        student: &mut S,
        batch: &Batch,
    ) -> anyhow::Result<LossDistribution> {
        let student = InferenceMode::enter(student);
        let predicted = self.masked_rollout(&*student, batch)?;
        let target_width = batch.targets.dim(2)?;
        let per_example = (predicted - &batch.targets)?
            .sqr()?
            .sum(2)?
            .sum(0)?
            .affine(1.0 / target_width as f64, 0.0)?
            .to_vec1::<f32>()?;
        LossDistribution::from_examples(&per_example, &batch.difficulties, batch.max_difficulty)
    }

    /// Forward pass over the batch's time grid, masked per example and cut
    /// down to the state channels: `[max_difficulty, batch, state_width]`.
    fn masked_rollout<S: Student + ?Sized>(
        &self,
        student: &S,
        batch: &Batch,
    ) -> anyhow::Result<Tensor> {
        let device = batch.inputs.device();
        let grid = uniform_time_grid(batch.max_difficulty, self.step_size, device)?;
        let output = student.forward(&batch.inputs, &grid, self.step_size)?;

        let (steps, examples, width) = output.dims3()?;
        let state_width = batch.targets.dim(2)?;
        if steps != batch.max_difficulty || examples != batch.batch_size() || width < state_width {
            anyhow::bail!(
                "student output [{steps}, {examples}, {width}] does not cover targets [{}, {}, {state_width}]",
                batch.max_difficulty,
                batch.batch_size()
            );
        }

        let mask = padding_mask(&batch.difficulties, batch.max_difficulty, device)?;
        let masked = output.broadcast_mul(&mask)?;
        Ok(masked.narrow(2, 0, state_width)?)
    }
}

/// `[max_difficulty, batch, 1]` with 1 where `t < difficulties[i]`, else 0.
pub fn padding_mask(
    difficulties: &[usize],
    max_difficulty: usize,
    device: &Device,
) -> candle_core::Result<Tensor> {
    let batch = difficulties.len();
    let mut mask = vec![0f32; max_difficulty * batch];
    for (i, &d) in difficulties.iter().enumerate() {
        for t in 0..d.min(max_difficulty) {
            mask[t * batch + i] = 1.0;
        }
    }
    Tensor::from_vec(mask, (max_difficulty, batch, 1), device)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Var;

    /// Returns a fixed rollout regardless of its inputs.
    struct FixedStudent {
        rollout: Tensor,
        training: bool,
        calls_in_inference: std::cell::Cell<usize>,
    }

    impl FixedStudent {
        fn new(rollout: Tensor) -> Self {
            Self {
                rollout,
                training: true,
                calls_in_inference: std::cell::Cell::new(0),
            }
        }
    }

    impl Student for FixedStudent {
        fn forward(&self, _: &Tensor, _: &Tensor, _: f64) -> candle_core::Result<Tensor> {
            if !self.training {
                self.calls_in_inference.set(self.calls_in_inference.get() + 1);
            }
            Ok(self.rollout.clone())
        }
        fn learning_rate(&self) -> f64 {
            0.0
        }
        fn parameters(&self) -> Vec<Var> {
            Vec::new()
        }
        fn set_training(&mut self, training: bool) {
            self.training = training;
        }
        fn is_training(&self) -> bool {
            self.training
        }
    }

    /// Batch with zero targets and a rollout filled with `fill` everywhere
    /// (state width 1, frame width 2).
    fn constant_case(difficulties: &[usize], fill: f32) -> (Batch, FixedStudent) {
        let b = difficulties.len();
        let max_d = *difficulties.iter().max().unwrap();
        let batch = Batch {
            inputs: Tensor::zeros((b, 2), candle_core::DType::F32, &Device::Cpu).unwrap(),
            targets: Tensor::zeros((max_d, b, 1), candle_core::DType::F32, &Device::Cpu).unwrap(),
            difficulties: difficulties.to_vec(),
            max_difficulty: max_d,
            sample_indices: (0..b).collect(),
            start_steps: vec![0; b],
        };
        let rollout = Tensor::full(fill, (max_d, b, 2), &Device::Cpu).unwrap();
        (batch, FixedStudent::new(rollout))
    }

    #[test]
    fn training_loss_normalises_by_valid_positions() {
        // Unmasked slots: 1 + 2 + 3 = 6, each with error 2² = 4.
        let (batch, student) = constant_case(&[1, 2, 3], 2.0);
        let loss = LossEvaluator::new(0.04)
            .training_loss(&student, &batch)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!((loss - 4.0).abs() < 1e-6, "loss = {loss}");
    }

    #[test]
    fn training_loss_is_permutation_invariant() {
        let rollout: Vec<f32> = (0..3 * 3 * 2).map(|i| (i as f32 * 0.7).sin()).collect();
        let targets: Vec<f32> = (0..3 * 3).map(|i| (i as f32 * 0.3).cos()).collect();
        let make = |order: [usize; 3]| {
            let mut r = vec![0f32; rollout.len()];
            let mut t = vec![0f32; targets.len()];
            for step in 0..3 {
                for (dst, &src) in order.iter().enumerate() {
                    for c in 0..2 {
                        r[(step * 3 + dst) * 2 + c] = rollout[(step * 3 + src) * 2 + c];
                    }
                    t[step * 3 + dst] = targets[step * 3 + src];
                }
            }
            let difficulties = [1usize, 3, 2];
            let batch = Batch {
                inputs: Tensor::zeros((3, 2), candle_core::DType::F32, &Device::Cpu).unwrap(),
                targets: Tensor::from_vec(t, (3, 3, 1), &Device::Cpu).unwrap(),
                difficulties: order.iter().map(|&s| difficulties[s]).collect(),
                max_difficulty: 3,
                sample_indices: vec![0, 1, 2],
                start_steps: vec![0; 3],
            };
            let student = FixedStudent::new(Tensor::from_vec(r, (3, 3, 2), &Device::Cpu).unwrap());
            LossEvaluator::new(0.04)
                .training_loss(&student, &batch)
                .unwrap()
                .to_scalar::<f32>()
                .unwrap()
        };
        let base = make([0, 1, 2]);
        assert!((base - make([2, 0, 1])).abs() < 1e-6);
        assert!((base - make([1, 2, 0])).abs() < 1e-6);
    }

    #[test]
    fn masking_is_per_example() {
        let mask = padding_mask(&[1, 3, 2], 3, &Device::Cpu).unwrap();
        let mask = mask.squeeze(2).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(mask, vec![vec![1.0, 1.0, 1.0], vec![0.0, 1.0, 1.0], vec![0.0, 1.0, 0.0]]);
    }

    #[test]
    fn zero_count_buckets_are_excluded_from_mean() {
        // Difficulties {1, 3} only: bucket 2 is empty.
        let (batch, mut student) = constant_case(&[1, 3, 3, 1], 1.0);
        let dist = LossEvaluator::new(0.04)
            .validation_loss(&mut student, &batch)
            .unwrap();
        assert_eq!(dist.per_difficulty.len(), 3);
        assert_eq!(dist.counts, vec![2, 0, 2]);
        // Every supervised step has error 1 → per-step mean 1 in both buckets.
        assert!((dist.per_difficulty[0] - 1.0).abs() < 1e-6);
        assert_eq!(dist.per_difficulty[1], 0.0);
        assert!((dist.per_difficulty[2] - 1.0).abs() < 1e-6);
        assert!((dist.mean - (dist.per_difficulty[0] + dist.per_difficulty[2]) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn bucket_counts_five_zero_three() {
        let mut losses = vec![2.0f32; 5];
        losses.extend([9.0f32; 3]);
        let mut difficulties = vec![1usize; 5];
        difficulties.extend([3usize; 3]);
        let dist = LossDistribution::from_examples(&losses, &difficulties, 3).unwrap();
        assert_eq!(dist.counts, vec![5, 0, 3]);
        // bucket 1: 10 / (5·1) = 2; bucket 3: 27 / (3·3) = 3
        assert_eq!(dist.per_difficulty, vec![2.0, 0.0, 3.0]);
        assert!((dist.mean - 2.5).abs() < 1e-6);
        // (5·1 + 3·3) / 8
        assert!((dist.mean_difficulty() - 1.75).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_difficulties_are_typed_errors() {
        for (difficulty, index) in [(4usize, 1usize), (0, 1)] {
            let err = LossDistribution::from_examples(&[1.0, 1.0], &[1, difficulty], 3).unwrap_err();
            match err.downcast_ref::<CurriculumError>() {
                Some(CurriculumError::InvalidDifficulty { index: i, value }) => {
                    assert_eq!((*i, *value), (index, difficulty));
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
        assert!(LossDistribution::from_examples(&[1.0], &[1, 1], 3).is_err());
    }

    #[test]
    fn validation_runs_in_inference_mode_and_is_repeatable() {
        let (batch, mut student) = constant_case(&[2, 1, 2], 0.5);
        let evaluator = LossEvaluator::new(0.04);
        let first = evaluator.validation_loss(&mut student, &batch).unwrap();
        let second = evaluator.validation_loss(&mut student, &batch).unwrap();
        assert_eq!(first, second);
        assert_eq!(student.calls_in_inference.get(), 2);
        assert!(student.is_training());
    }

    #[test]
    fn shape_mismatch_propagates_and_restores_mode() {
        let (batch, _) = constant_case(&[2, 2], 0.0);
        let mut student =
            FixedStudent::new(Tensor::zeros((1, 2, 2), candle_core::DType::F32, &Device::Cpu).unwrap());
        assert!(LossEvaluator::new(0.04)
            .validation_loss(&mut student, &batch)
            .is_err());
        assert!(student.is_training());
    }
}
