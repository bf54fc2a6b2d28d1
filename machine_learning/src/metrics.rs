use ndarray::{ArrayView1, ArrayView2};

/// Computes the fraction of rows whose predicted class matches the label.
///
/// Works on raw logits: the argmax of the logits and of their softmax agree,
/// so no normalization is needed before comparing against the one-hot target.
///
/// # Arguments
/// * `logits` - The model output batch.
/// * `y` - The one-hot target batch.
///
/// # Returns
/// The accuracy in `[0, 1]`, or `0.0` for an empty batch.
pub fn accuracy(logits: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
    if logits.nrows() == 0 {
        return 0.0;
    }

    let correct = logits
        .outer_iter()
        .zip(y.outer_iter())
        .filter(|(z, y)| argmax(*z) == argmax(*y))
        .count();

    correct as f32 / logits.nrows() as f32
}

fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;

    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }

    best
}
