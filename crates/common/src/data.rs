//! Trajectory storage.
//!
//! One split is a fixed-shape tensor `[time_steps, num_samples, features]`
//! held row-major on the host, so batch construction can slice single frames
//! without a device round-trip. The first half of the feature channels is the
//! *state* (what the student predicts); the second half is auxiliary input
//! that stays fixed along a trajectory.
//!
//! * **[`TrajectoryStore::from_vec`]**: wrap an existing buffer.
//! * **[`TrajectoryStore::from_tensor`]**: copy a rank-3 Candle tensor.
//! * **[`TrajectoryStore::load_safetensors`]**: read one named tensor from a file.

use std::path::Path;

use anyhow::Context;
use candle_core::{DType, Device, Tensor};

/// Fixed-shape trajectory tensor for one split (train or validation).
#[derive(Debug, Clone)]
pub struct TrajectoryStore {
    data: Vec<f32>,
    time_steps: usize,
    num_samples: usize,
    features: usize,
}

impl TrajectoryStore {
    /// Wrap a row-major `[time_steps, num_samples, features]` buffer.
    pub fn from_vec(
        data: Vec<f32>,
        time_steps: usize,
        num_samples: usize,
        features: usize,
    ) -> anyhow::Result<Self> {
        if time_steps == 0 || num_samples == 0 {
            anyhow::bail!("trajectory store needs at least one time step and one sample");
        }
        if features == 0 || features % 2 != 0 {
            anyhow::bail!(
                "feature width must be even and non-zero (state + auxiliary halves), got {features}"
            );
        }
        let expected = time_steps * num_samples * features;
        if data.len() != expected {
            anyhow::bail!(
                "trajectory buffer has {} values, shape [{time_steps}, {num_samples}, {features}] needs {expected}",
                data.len()
            );
        }
        Ok(Self {
            data,
            time_steps,
            num_samples,
            features,
        })
    }

    /// Copy a rank-3 tensor `[time_steps, num_samples, features]` to the host.
    pub fn from_tensor(tensor: &Tensor) -> anyhow::Result<Self> {
        let (time_steps, num_samples, features) = tensor
            .dims3()
            .context("trajectory tensor must be [time_steps, num_samples, features]")?;
        let data = tensor
            .to_dtype(DType::F32)?
            .to_device(&Device::Cpu)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        Self::from_vec(data, time_steps, num_samples, features)
    }

    /// Load the tensor stored under `key` in a safetensors file.
    pub fn load_safetensors(path: &Path, key: &str) -> anyhow::Result<Self> {
        let mut tensors = candle_core::safetensors::load(path, &Device::Cpu)
            .with_context(|| format!("load trajectories from {}", path.display()))?;
        let tensor = tensors.remove(key).with_context(|| {
            format!("no tensor named '{key}' in {}", path.display())
        })?;
        let store = Self::from_tensor(&tensor)?;
        tracing::info!(
            key,
            time_steps = store.time_steps,
            samples = store.num_samples,
            features = store.features,
            "Loaded trajectory split"
        );
        Ok(store)
    }

    /// Length of the time axis (`realNS`).
    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Full feature width of one frame.
    pub fn features(&self) -> usize {
        self.features
    }

    /// Number of leading channels that form the predicted state.
    pub fn state_width(&self) -> usize {
        self.features / 2
    }

    /// Feature vector of sample `sample` at time step `step`.
    ///
    /// Panics when either index is out of range; callers clamp first.
    #[inline]
    pub fn frame(&self, step: usize, sample: usize) -> &[f32] {
        assert!(
            step < self.time_steps && sample < self.num_samples,
            "frame ({step}, {sample}) outside [{}, {}]",
            self.time_steps,
            self.num_samples
        );
        let start = (step * self.num_samples + sample) * self.features;
        &self.data[start..start + self.features]
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ramp(t: usize, n: usize, f: usize) -> Vec<f32> {
        (0..t * n * f).map(|i| i as f32).collect()
    }

    #[test]
    fn frame_indexing_is_row_major() {
        let store = TrajectoryStore::from_vec(ramp(3, 2, 4), 3, 2, 4).unwrap();
        assert_eq!(store.state_width(), 2);
        // (t=1, n=1) starts at (1*2 + 1) * 4 = 12
        assert_eq!(store.frame(1, 1), &[12.0, 13.0, 14.0, 15.0]);
        assert_eq!(store.frame(0, 0), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(TrajectoryStore::from_vec(ramp(2, 2, 3), 2, 2, 3).is_err());
        assert!(TrajectoryStore::from_vec(vec![0.0; 7], 2, 2, 2).is_err());
        assert!(TrajectoryStore::from_vec(Vec::new(), 0, 2, 2).is_err());
    }

    #[test]
    fn tensor_and_safetensors_sources_agree() {
        let tensor = Tensor::from_vec(ramp(4, 3, 2), (4, 3, 2), &Device::Cpu).unwrap();
        let from_tensor = TrajectoryStore::from_tensor(&tensor).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.safetensors");
        let mut map = HashMap::new();
        map.insert("train".to_string(), tensor);
        candle_core::safetensors::save(&map, &path).unwrap();

        let loaded = TrajectoryStore::load_safetensors(&path, "train").unwrap();
        assert_eq!(loaded.time_steps(), 4);
        assert_eq!(loaded.num_samples(), 3);
        assert_eq!(loaded.frame(3, 2), from_tensor.frame(3, 2));
        assert!(TrajectoryStore::load_safetensors(&path, "val").is_err());
    }
}
