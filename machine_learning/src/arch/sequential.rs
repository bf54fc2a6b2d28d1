use ndarray::{Array2, ArrayView2};

use super::{layers::Dense, loss::LossFn};
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and
/// backward when computing the *deltas* of its layers.
///
/// The model owns no parameters. Every pass runs against a caller-supplied
/// flat slice, so the same model can be driven by whatever replica of the
/// weights the caller currently holds.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Dense>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Dense>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The flat parameter slice for the whole model.
    /// * `x` - The input batch, one sample per row.
    ///
    /// # Returns
    /// The output batch (raw logits for a linear last layer), or a size
    /// mismatch error if `params` does not cover the model.
    pub fn forward(&mut self, params: &[f32], mut x: Array2<f32>) -> Result<Array2<f32>> {
        self.check_len("params", params.len())?;

        let mut offset = 0;
        for layer in &mut self.layers {
            let size = layer.size();
            x = layer.forward(&params[offset..offset + size], x);
            offset += size;
        }

        Ok(x)
    }

    /// Computes the gradient of the loss over one batch.
    ///
    /// The gradient lands in `grad`; the parameters are left untouched, since
    /// applying updates is the parameter server's job, not the model's.
    ///
    /// # Arguments
    /// * `params` - The flat parameter slice for the whole model.
    /// * `grad` - The flat gradient buffer, overwritten entirely.
    /// * `loss_fn` - The loss function.
    /// * `x` - The input batch.
    /// * `y` - The expected output batch.
    ///
    /// # Returns
    /// The batch loss, or a size mismatch error.
    pub fn backprop<L>(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        loss_fn: &L,
        x: Array2<f32>,
        y: ArrayView2<f32>,
    ) -> Result<f32>
    where
        L: LossFn,
    {
        self.check_len("grad", grad.len())?;

        let y_pred = self.forward(params, x)?;
        let loss = loss_fn.loss(y_pred.view(), y);

        let mut d = loss_fn.loss_prime(y_pred.view(), y);
        let mut end = params.len();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d);
            end = start;
        }

        Ok(loss)
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();

        if got != expected {
            return Err(MlErr::SizeMismatch {
                a: what,
                b: "model",
                got,
                expected,
            });
        }

        Ok(())
    }
}
