use ndarray::{Array2, ArrayView2, Axis};

use super::LossFn;

/// Softmax cross-entropy over raw logits.
///
/// The softmax is folded into the loss so layers can output plain logits;
/// the log-sum-exp is stabilized by subtracting the row maximum.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftmaxCrossEntropy;

impl SoftmaxCrossEntropy {
    /// Returns a new `SoftmaxCrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    fn row_log_sum_exp(logits: ArrayView2<f32>) -> Vec<f32> {
        logits
            .axis_iter(Axis(0))
            .map(|row| {
                let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let sum: f32 = row.iter().map(|&z| (z - max).exp()).sum();
                max + sum.ln()
            })
            .collect()
    }
}

impl LossFn for SoftmaxCrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let lse = Self::row_log_sum_exp(y_pred);
        let nrows = y_pred.nrows();

        let total: f32 = y_pred
            .axis_iter(Axis(0))
            .zip(y.axis_iter(Axis(0)))
            .zip(&lse)
            .map(|((z, y), &lse)| {
                let dot: f32 = z.iter().zip(y).map(|(&z, &y)| z * y).sum();
                lse - dot
            })
            .sum();

        total / nrows as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let lse = Self::row_log_sum_exp(y_pred);
        let nrows = y_pred.nrows() as f32;

        let mut d = y_pred.to_owned();
        for (mut row, &lse) in d.axis_iter_mut(Axis(0)).zip(&lse) {
            row.mapv_inplace(|z| (z - lse).exp());
        }

        d -= &y;
        d /= nrows;
        d
    }
}
