//! Ragged batch construction.
//!
//! Each example gets its own difficulty `d_i`: the number of consecutive time
//! steps it is supervised on. Examples are packed into dense tensors:
//!
//! ```text
//! inputs  [batch, F]              frame at the window start (full width)
//! targets [max_d, batch, F / 2]   state channels of the window, zero past d_i
//! ```
//!
//! The start of every window is drawn uniformly from `[0, T - d_i]` so the
//! window fits inside the trajectory. When `d_i > T` the start collapses to 0
//! and the window is cut at the trajectory end; the remaining slots stay zero.

use candle_core::{Device, Tensor};
use rand::Rng;

use trajcur_common::{CurriculumError, TrajectoryStore};

/// Dense, zero-padded batch of variable-length supervision windows.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[batch, features]`
    pub inputs: Tensor,
    /// `[max_difficulty, batch, state_width]`
    pub targets: Tensor,
    pub difficulties: Vec<usize>,
    pub max_difficulty: usize,
    /// Trajectory chosen for each example.
    pub sample_indices: Vec<usize>,
    /// First time step of each example's window.
    pub start_steps: Vec<usize>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.difficulties.len()
    }

    /// Number of supervised time steps across the batch.
    pub fn total_difficulty(&self) -> usize {
        self.difficulties.iter().sum()
    }

    pub fn mean_difficulty(&self) -> f64 {
        self.total_difficulty() as f64 / self.batch_size().max(1) as f64
    }
}

/// Builds [`Batch`]es from a [`TrajectoryStore`] on a fixed device.
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    device: Device,
}

impl BatchBuilder {
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    /// Sample `batch_size` distinct trajectories and cut one window per
    /// example, `difficulties[i]` steps long.
    ///
    /// Fails with [`CurriculumError::InvalidBatchSize`] when the store holds
    /// fewer samples than requested (or none are requested) and with
    /// [`CurriculumError::InvalidDifficulty`] for a zero difficulty.
    pub fn build<R: Rng + ?Sized>(
        &self,
        store: &TrajectoryStore,
        batch_size: usize,
        difficulties: &[usize],
        rng: &mut R,
    ) -> anyhow::Result<Batch> {
        if batch_size == 0 || batch_size > store.num_samples() {
            return Err(CurriculumError::InvalidBatchSize {
                requested: batch_size,
                available: store.num_samples(),
            }
            .into());
        }
        if difficulties.len() != batch_size {
            anyhow::bail!(
                "expected one difficulty per example ({batch_size}), got {}",
                difficulties.len()
            );
        }
        if let Some(index) = difficulties.iter().position(|&d| d == 0) {
            return Err(CurriculumError::InvalidDifficulty { index, value: 0 }.into());
        }

        let time_steps = store.time_steps();
        let features = store.features();
        let state_width = store.state_width();
        let max_difficulty = difficulties.iter().copied().max().unwrap_or(1);

        let sample_indices =
            rand::seq::index::sample(rng, store.num_samples(), batch_size).into_vec();

        let mut inputs = vec![0f32; batch_size * features];
        let mut targets = vec![0f32; max_difficulty * batch_size * state_width];
        let mut start_steps = Vec::with_capacity(batch_size);

        for (i, (&sample, &difficulty)) in sample_indices.iter().zip(difficulties).enumerate() {
            let start = rng.gen_range(0..=time_steps.saturating_sub(difficulty));
            inputs[i * features..(i + 1) * features].copy_from_slice(store.frame(start, sample));

            let window = difficulty.min(time_steps - start);
            for k in 0..window {
                let frame = store.frame(start + k, sample);
                let offset = (k * batch_size + i) * state_width;
                targets[offset..offset + state_width].copy_from_slice(&frame[..state_width]);
            }
            start_steps.push(start);
        }

        Ok(Batch {
            inputs: Tensor::from_vec(inputs, (batch_size, features), &self.device)?,
            targets: Tensor::from_vec(
                targets,
                (max_difficulty, batch_size, state_width),
                &self.device,
            )?,
            difficulties: difficulties.to_vec(),
            max_difficulty,
            sample_indices,
            start_steps,
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
