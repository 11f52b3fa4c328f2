//! Learned vector fields `d(state)/dt = f(frame)`.
//!
//! | Kind     | Layers | Notes |
//! |----------|--------|-------|
//! | `linear` | `F → S` | Linear dynamics, useful as a baseline. |
//! | `mlp`    | `F → H → … → H → S` | `depth` hidden layers with tanh. |
//!
//! `F` is the full frame width and `S = F / 2` the state width.

use candle_core::{Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

use trajcur_common::{StudentConfig, StudentKind};

/// Vector field selected by [`StudentKind`].
pub enum VectorField {
    Linear(Linear),
    Mlp { hidden: Vec<Linear>, out: Linear },
}

impl VectorField {
    /// Construct from config. `vb` should be scoped to the field prefix.
    pub fn new(
        config: &StudentConfig,
        input_width: usize,
        state_width: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        match config.kind {
            StudentKind::Linear => Ok(Self::Linear(linear(
                input_width,
                state_width,
                vb.pp("out"),
            )?)),
            StudentKind::Mlp => {
                let mut hidden = Vec::with_capacity(config.depth);
                let mut width = input_width;
                for i in 0..config.depth {
                    hidden.push(linear(width, config.hidden_size, vb.pp(format!("h.{i}")))?);
                    width = config.hidden_size;
                }
                let out = linear(width, state_width, vb.pp("out"))?;
                Ok(Self::Mlp { hidden, out })
            }
        }
    }

    /// Time derivative of the state for a batch of frames `[N, F]` → `[N, S]`.
    pub fn forward(&self, frames: &Tensor) -> Result<Tensor> {
        match self {
            Self::Linear(l) => l.forward(frames),
            Self::Mlp { hidden, out } => {
                let mut x = frames.clone();
                for layer in hidden {
                    x = layer.forward(&x)?.tanh()?;
                }
                out.forward(&x)
            }
        }
    }
}
