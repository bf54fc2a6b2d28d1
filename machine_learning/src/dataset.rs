use std::num::NonZeroUsize;

use ndarray::ArrayView2;
use rand::Rng;

use crate::{MlErr, Result};

/// An in-memory supervised dataset with flat row-major storage.
///
/// Inputs and targets live in separate buffers so a batch is two contiguous
/// regions, viewable without copying.
#[derive(Debug, Clone)]
pub struct Dataset {
    x_size: usize,
    y_size: usize,
    len: usize,
    xs: Vec<f32>,
    ys: Vec<f32>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `xs` - Flat input values, `x_size` per sample.
    /// * `ys` - Flat target values, `y_size` per sample.
    /// * `x_size` - The amount of input values per sample.
    /// * `y_size` - The amount of target values per sample.
    ///
    /// # Returns
    /// A new `Dataset`, or an error if either buffer is ragged or the sample
    /// counts disagree.
    pub fn new(xs: Vec<f32>, ys: Vec<f32>, x_size: usize, y_size: usize) -> Result<Self> {
        if x_size == 0 || !xs.len().is_multiple_of(x_size) {
            return Err(MlErr::RaggedDataset {
                data_len: xs.len(),
                row_size: x_size,
            });
        }

        if y_size == 0 || !ys.len().is_multiple_of(y_size) {
            return Err(MlErr::RaggedDataset {
                data_len: ys.len(),
                row_size: y_size,
            });
        }

        let len = xs.len() / x_size;
        let y_len = ys.len() / y_size;

        if len != y_len {
            return Err(MlErr::SizeMismatch {
                a: "inputs",
                b: "targets",
                got: y_len,
                expected: len,
            });
        }

        Ok(Self {
            x_size,
            y_size,
            len,
            xs,
            ys,
        })
    }

    /// Returns the amount of samples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the amount of input values per sample.
    pub fn x_size(&self) -> usize {
        self.x_size
    }

    /// Returns the amount of target values per sample.
    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// Reorders the samples in place, keeping every `(x, y)` pair intact.
    ///
    /// # Arguments
    /// * `rng` - The random number generator driving the permutation.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        for i in (1..self.len).rev() {
            let j = rng.random_range(0..=i);
            if i == j {
                continue;
            }

            for k in 0..self.x_size {
                self.xs.swap(i * self.x_size + k, j * self.x_size + k);
            }
            for k in 0..self.y_size {
                self.ys.swap(i * self.y_size + k, j * self.y_size + k);
            }
        }
    }

    /// Views the whole dataset as one `(inputs, targets)` pair of matrices.
    pub fn views(&self) -> (ArrayView2<'_, f32>, ArrayView2<'_, f32>) {
        let x = ArrayView2::from_shape((self.len, self.x_size), &self.xs).unwrap();
        let y = ArrayView2::from_shape((self.len, self.y_size), &self.ys).unwrap();
        (x, y)
    }

    /// Returns the amount of batches one epoch yields.
    ///
    /// # Arguments
    /// * `batch_size` - The maximum amount of samples per batch.
    pub fn num_batches(&self, batch_size: NonZeroUsize) -> usize {
        self.len.div_ceil(batch_size.get())
    }

    /// Returns one mini-batch by index.
    ///
    /// The final batch may be smaller than `batch_size`.
    ///
    /// # Arguments
    /// * `index` - The batch index within the epoch.
    /// * `batch_size` - The maximum amount of samples per batch.
    ///
    /// # Returns
    /// The `(inputs, targets)` views, or `None` when `index` is past the end.
    pub fn batch(
        &self,
        index: usize,
        batch_size: NonZeroUsize,
    ) -> Option<(ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let start = index * batch_size.get();
        if start >= self.len {
            return None;
        }

        let end = (start + batch_size.get()).min(self.len);
        let n = end - start;

        let x_raw = &self.xs[start * self.x_size..end * self.x_size];
        let y_raw = &self.ys[start * self.y_size..end * self.y_size];

        let x = ArrayView2::from_shape((n, self.x_size), x_raw).unwrap();
        let y = ArrayView2::from_shape((n, self.y_size), y_raw).unwrap();
        Some((x, y))
    }

    /// Iterates the dataset in order as borrowed mini-batches.
    ///
    /// The final batch may be smaller than `batch_size`.
    ///
    /// # Arguments
    /// * `batch_size` - The maximum amount of samples per batch.
    pub fn batches(&self, batch_size: NonZeroUsize) -> Batches<'_> {
        Batches {
            dataset: self,
            batch_size: batch_size.get(),
            cursor: 0,
        }
    }
}

/// A borrowing iterator over the mini-batches of one epoch.
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    dataset: &'a Dataset,
    batch_size: usize,
    cursor: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = (ArrayView2<'a, f32>, ArrayView2<'a, f32>);

    fn next(&mut self) -> Option<Self::Item> {
        let Dataset {
            x_size,
            y_size,
            len,
            xs,
            ys,
        } = self.dataset;

        if self.cursor >= *len {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(*len);
        let n = end - self.cursor;

        let x_raw = &xs[self.cursor * x_size..end * x_size];
        let y_raw = &ys[self.cursor * y_size..end * y_size];

        let x = ArrayView2::from_shape((n, *x_size), x_raw).unwrap();
        let y = ArrayView2::from_shape((n, *y_size), y_raw).unwrap();

        self.cursor = end;
        Some((x, y))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn counting_dataset(len: usize) -> Dataset {
        let xs = (0..len * 2).map(|v| v as f32).collect();
        let ys = (0..len).map(|v| v as f32 + 100.0).collect();
        Dataset::new(xs, ys, 2, 1).unwrap()
    }

    #[test]
    fn batches_respect_batch_size_and_tail() {
        let ds = counting_dataset(5);
        let batch_size = NonZeroUsize::new(2).unwrap();

        assert_eq!(ds.num_batches(batch_size), 3);

        let sizes: Vec<_> = ds.batches(batch_size).map(|(x, _)| x.nrows()).collect();
        assert_eq!(sizes, [2, 2, 1]);

        let (x, y) = ds.batches(batch_size).next().unwrap();
        assert_eq!(x.row(1).to_vec(), [2.0, 3.0]);
        assert_eq!(y.row(1).to_vec(), [101.0]);
    }

    #[test]
    fn batch_by_index_matches_iteration() {
        let ds = counting_dataset(5);
        let batch_size = NonZeroUsize::new(2).unwrap();

        for (i, (x, y)) in ds.batches(batch_size).enumerate() {
            let (bx, by) = ds.batch(i, batch_size).unwrap();
            assert_eq!(x, bx);
            assert_eq!(y, by);
        }

        assert!(ds.batch(3, batch_size).is_none());
    }

    #[test]
    fn ragged_buffers_are_rejected() {
        assert!(matches!(
            Dataset::new(vec![0.0; 5], vec![0.0; 2], 2, 1),
            Err(MlErr::RaggedDataset { .. })
        ));

        assert!(matches!(
            Dataset::new(vec![0.0; 4], vec![0.0; 3], 2, 1),
            Err(MlErr::SizeMismatch { .. })
        ));
    }

    #[test]
    fn shuffle_keeps_pairs_together() {
        let mut ds = counting_dataset(32);
        let mut rng = StdRng::seed_from_u64(3);

        ds.shuffle(&mut rng);

        let (xs, ys) = ds.views();
        for (x, y) in xs.outer_iter().zip(ys.outer_iter()) {
            // Row i started as x = [2i, 2i + 1], y = [i + 100].
            let i = y[0] - 100.0;
            assert_eq!(x.to_vec(), [2.0 * i, 2.0 * i + 1.0]);
        }
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut ds = counting_dataset(16);
        let mut rng = StdRng::seed_from_u64(9);

        ds.shuffle(&mut rng);

        let (_, ys) = ds.views();
        let mut labels: Vec<_> = ys.iter().map(|&v| v as usize).collect();
        labels.sort();
        assert_eq!(labels, (100..116).collect::<Vec<_>>());
    }
}
