use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{MlErr, Result};

/// How fresh parameter values are drawn.
///
/// `Normal` is the production initializer; `Const` exists for tests that need
/// predictable parameter values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamInit {
    Normal { mean: f32, std_dev: f32 },
    Const { value: f32 },
}

impl ParamInit {
    /// Samples a flat parameter vector.
    ///
    /// # Arguments
    /// * `n` - The amount of parameters to generate.
    /// * `rng` - The random number generator to sample from.
    ///
    /// # Returns
    /// The generated values, or an error if the distribution parameters are
    /// invalid (non-finite standard deviation).
    pub fn generate<R: Rng>(&self, n: usize, rng: &mut R) -> Result<Vec<f32>> {
        match *self {
            ParamInit::Const { value } => Ok(vec![value; n]),
            ParamInit::Normal { mean, std_dev } => {
                let normal = Normal::new(mean, std_dev)
                    .map_err(|e| MlErr::InvalidDistribution(e.to_string()))?;

                Ok((0..n).map(|_| normal.sample(rng)).collect())
            }
        }
    }
}
