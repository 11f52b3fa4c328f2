//! The student contract and its scoped inference mode.

use std::ops::{Deref, DerefMut};

use candle_core::{DType, Device, Result, Tensor, Var};

/// A parametric sequence model trained by the curriculum.
///
/// `forward` maps initial frames `[N, F]` and a time grid `[T]` to a rollout
/// `[T, N, F]` whose first `F / 2` channels are the predicted state.
pub trait Student {
    fn forward(&self, inputs: &Tensor, time_grid: &Tensor, step_size: f64) -> Result<Tensor>;

    fn learning_rate(&self) -> f64;

    /// Trainable parameters, in a stable order.
    fn parameters(&self) -> Vec<Var>;

    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;
}

/// Scoped switch into inference mode.
///
/// Entering turns training mode off; dropping the guard restores the mode
/// the student had before, on every exit path including `?` and panics.
pub struct InferenceMode<'a, S: Student + ?Sized> {
    student: &'a mut S,
    previous: bool,
}

impl<'a, S: Student + ?Sized> InferenceMode<'a, S> {
    pub fn enter(student: &'a mut S) -> Self {
        let previous = student.is_training();
        student.set_training(false);
        Self { student, previous }
    }
}

impl<S: Student + ?Sized> Deref for InferenceMode<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.student
    }
}

impl<S: Student + ?Sized> DerefMut for InferenceMode<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.student
    }
}

impl<S: Student + ?Sized> Drop for InferenceMode<'_, S> {
    fn drop(&mut self) {
        self.student.set_training(self.previous);
    }
}

/// Uniform grid `[0, h, 2h, …, (steps-1)h]`.
pub fn uniform_time_grid(steps: usize, step_size: f64, device: &Device) -> Result<Tensor> {
    Tensor::arange(0u32, steps as u32, device)?
        .to_dtype(DType::F32)?
        .affine(step_size, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flag {
        training: bool,
    }

    impl Student for Flag {
        fn forward(&self, inputs: &Tensor, _: &Tensor, _: f64) -> Result<Tensor> {
            Ok(inputs.clone())
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

    fn failing_pass(student: &mut Flag) -> anyhow::Result<()> {
        let guard = InferenceMode::enter(student);
        assert!(!guard.is_training());
        anyhow::bail!("forward failed")
    }

    #[test]
    fn guard_restores_training_mode_on_error() {
        let mut student = Flag { training: true };
        assert!(failing_pass(&mut student).is_err());
        assert!(student.is_training());
    }

    #[test]
    fn guard_restores_previous_mode() {
        let mut student = Flag { training: false };
        {
            let _guard = InferenceMode::enter(&mut student);
        }
        assert!(!student.is_training());
    }

    #[test]
    fn time_grid_is_uniform_from_zero() {
        let grid = uniform_time_grid(4, 0.5, &Device::Cpu).unwrap();
        assert_eq!(grid.to_vec1::<f32>().unwrap(), vec![0.0, 0.5, 1.0, 1.5]);
    }
}
