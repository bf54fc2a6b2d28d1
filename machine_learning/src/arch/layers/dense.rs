use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, linalg};

use crate::arch::activations::ActFn;

/// A fully connected layer over a flat parameter slice.
///
/// The slice layout is `[weights (input x output), biases (output)]`; the
/// layer never owns its parameters, it views whatever region of the replica
/// the model hands it. Forward inputs and pre-activations are cached for the
/// backward pass.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense`.
    ///
    /// # Arguments
    /// * `dim` - The `(input, output)` dimensions of the layer.
    /// * `act_fn` - An optional activation applied to the affine output.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: zeros.clone(),
            z: zeros,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Computes the layer output for a batch of inputs.
    ///
    /// # Arguments
    /// * `params` - This layer's region of the flat parameter slice.
    /// * `x` - The input batch, one sample per row.
    ///
    /// # Returns
    /// The activated output batch.
    pub fn forward(&mut self, params: &[f32], x: Array2<f32>) -> Array2<f32> {
        let (w, b) = self.view_params(params);

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        self.x = x;

        let Some(ref act_fn) = self.act_fn else {
            return z;
        };

        let a = z.mapv(|v| act_fn.f(v));
        self.z = z;
        a
    }

    /// Propagates the loss delta through this layer.
    ///
    /// Writes the parameter gradient of this layer into `grad` and returns the
    /// delta with respect to the layer input.
    ///
    /// # Arguments
    /// * `params` - This layer's region of the flat parameter slice.
    /// * `grad` - This layer's region of the flat gradient slice.
    /// * `d` - The delta with respect to this layer's output.
    ///
    /// # Returns
    /// The delta with respect to this layer's input.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: Array2<f32>) -> Array2<f32> {
        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad);
        linalg::general_mat_mul(1.0, &self.x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params);
        let mut d_prev = Array2::zeros((d.nrows(), self.dim.0));
        linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut d_prev);

        d_prev
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> (ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>) {
        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).unwrap();
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).unwrap();
        (dw, db)
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(&self, params: &'a [f32]) -> (ArrayView2<'a, f32>, ArrayView1<'a, f32>) {
        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size]).unwrap();
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..]).unwrap();
        (weights, biases)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn linear_forward_matches_hand_computation() {
        let mut layer = Dense::new((2, 2), None);

        // w = [[1, 2], [3, 4]], b = [10, 20]
        let params = [1.0, 2.0, 3.0, 4.0, 10.0, 20.0];
        let x = array![[1.0, 1.0]];

        let out = layer.forward(&params, x);
        assert_eq!(out, array![[14.0, 26.0]]);
    }

    #[test]
    fn backward_fills_gradient_and_propagates_delta() {
        let mut layer = Dense::new((2, 1), None);

        // w = [[2], [3]], b = [0]
        let params = [2.0, 3.0, 0.0];
        let x = array![[1.0, 4.0]];

        layer.forward(&params, x);

        let mut grad = [0.0; 3];
        let d_prev = layer.backward(&params, &mut grad, array![[1.0]]);

        // dw = x^T d, db = sum(d), d_prev = d w^T
        assert_eq!(grad, [1.0, 4.0, 1.0]);
        assert_eq!(d_prev, array![[2.0, 3.0]]);
    }

    #[test]
    fn sigmoid_layer_scales_delta_by_derivative() {
        let mut layer = Dense::new((1, 1), Some(ActFn::sigmoid()));

        // w = [[0]], b = [0] so z = 0 and df = 0.25.
        let params = [0.0, 0.0];
        let x = array![[3.0]];

        let out = layer.forward(&params, x);
        assert!((out[[0, 0]] - 0.5).abs() < 1e-6);

        let mut grad = [0.0; 2];
        layer.backward(&params, &mut grad, array![[1.0]]);

        assert!((grad[0] - 0.75).abs() < 1e-6); // dw = x * d * df
        assert!((grad[1] - 0.25).abs() < 1e-6); // db = d * df
    }
}
