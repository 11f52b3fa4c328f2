//! ODE student: explicit-Euler rollout of a learned vector field.
//!
//! A frame is `[state | auxiliary]`. Starting from the input frame, each step
//! advances the state by `h · f(frame)` while the auxiliary half is carried
//! unchanged. The rollout includes the initial frame, so `output[0]` equals
//! the input and `output[k]` is the state after `k` steps.

use std::path::Path;

use candle_core::{DType, Device, Result, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};

use trajcur_common::{StudentConfig, StudentKind};

use crate::field::VectorField;
use crate::init::reseed_parameters;
use crate::student::Student;

/// Student whose dynamics are a [`VectorField`] integrated over a time grid.
pub struct OdeStudent {
    field: VectorField,
    varmap: VarMap,
    kind: StudentKind,
    input_width: usize,
    state_width: usize,
    learning_rate: f64,
    training: bool,
}

impl OdeStudent {
    /// Build from config with parameters drawn from `seed`.
    ///
    /// `input_width` is the full frame width of the trajectory data and must
    /// be even.
    pub fn new(
        config: &StudentConfig,
        input_width: usize,
        seed: u64,
        device: &Device,
    ) -> Result<Self> {
        if input_width == 0 || input_width % 2 != 0 {
            candle_core::bail!("student input width must be even and non-zero, got {input_width}");
        }
        let state_width = input_width / 2;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let field = VectorField::new(config, input_width, state_width, vb.pp("field"))?;
        reseed_parameters(&varmap, seed)?;

        let student = Self {
            field,
            varmap,
            kind: config.kind,
            input_width,
            state_width,
            learning_rate: config.learning_rate,
            training: true,
        };
        tracing::info!(
            kind = %student.kind,
            input_width,
            parameters = student.num_parameters(),
            "Student created"
        );
        Ok(student)
    }

    pub fn kind(&self) -> StudentKind {
        self.kind
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn state_width(&self) -> usize {
        self.state_width
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Total number of scalar parameters.
    pub fn num_parameters(&self) -> usize {
        self.varmap
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum()
    }

    /// Write all parameters to a safetensors file.
    pub fn save_checkpoint(&self, path: &Path) -> Result<()> {
        self.varmap.save(path)
    }

    /// Overwrite all parameters from a safetensors file written by
    /// [`save_checkpoint`](Self::save_checkpoint).
    pub fn load_checkpoint(&mut self, path: &Path) -> Result<()> {
        self.varmap.load(path)
    }
}

impl Student for OdeStudent {
    fn forward(&self, inputs: &Tensor, time_grid: &Tensor, step_size: f64) -> Result<Tensor> {
        let (_, width) = inputs.dims2()?;
        if width != self.input_width {
            candle_core::bail!(
                "student expects frames of width {}, got {width}",
                self.input_width
            );
        }
        let steps = time_grid.dims1()?;
        if steps == 0 {
            candle_core::bail!("time grid is empty");
        }

        let aux = inputs.narrow(1, self.state_width, width - self.state_width)?;
        let mut state = inputs.narrow(1, 0, self.state_width)?;
        let mut frames = Vec::with_capacity(steps);
        frames.push(inputs.clone());
        for _ in 1..steps {
            let frame = Tensor::cat(&[&state, &aux], 1)?;
            let delta = self.field.forward(&frame)?.affine(step_size, 0.0)?;
            state = (state + delta)?;
            frames.push(Tensor::cat(&[&state, &aux], 1)?);
        }
        let rollout = Tensor::stack(&frames, 0)?;

        if self.training {
            Ok(rollout)
        } else {
            Ok(rollout.detach())
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn parameters(&self) -> Vec<Var> {
        let vars = self.varmap.data().lock();
        match vars {
            Ok(vars) => {
                let mut named: Vec<_> = vars.iter().collect();
                named.sort_by(|a, b| a.0.cmp(b.0));
                named.into_iter().map(|(_, v)| v.clone()).collect()
            }
            Err(_) => self.varmap.all_vars(),
        }
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
