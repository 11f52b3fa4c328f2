//! Seeded parameter initialisation.
//!
//! Candle's CPU RNG cannot be seeded, so layers are built with the default
//! initialiser and then overwritten from a `StdRng`. Variables are visited in
//! sorted name order so the same seed gives the same parameters regardless of
//! hash-map iteration order.

use candle_core::{Error, Result, Tensor};
use candle_nn::VarMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Re-initialise every variable in `varmap`.
///
/// * Rank-2 weights `[out, in]`: uniform in `±1/√in`.
/// * Everything else (biases): zero.
pub fn reseed_parameters(varmap: &VarMap, seed: u64) -> Result<()> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| Error::Msg("parameter map lock poisoned".to_string()))?;
    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();

    let mut rng = StdRng::seed_from_u64(seed);
    for name in names {
        let var = &vars[name];
        let current = var.as_tensor();
        let count = current.elem_count();
        let values: Vec<f32> = match current.dims() {
            [_, fan_in] => {
                let bound = 1.0 / (*fan_in as f32).sqrt();
                (0..count).map(|_| rng.gen_range(-bound..=bound)).collect()
            }
            _ => vec![0.0; count],
        };
        let init = Tensor::from_vec(values, current.dims().to_vec(), current.device())?
            .to_dtype(current.dtype())?;
        var.set(&init)?;
    }
    Ok(())
}
