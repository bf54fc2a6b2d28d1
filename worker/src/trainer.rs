use std::num::NonZeroUsize;

use machine_learning::{
    arch::{Sequential, loss::LossFn},
    dataset::Dataset,
    metrics,
};
use rand::Rng;

use crate::{Result, WorkerErr};

/// The gradient computer of a worker.
///
/// Owns the model, the loss, the data splits and the flat gradient buffer.
/// Parameters are never owned here: every pass runs against the replica slice
/// the worker hands in, so a fresh snapshot from the server takes effect on
/// the very next batch.
pub struct Trainer<L: LossFn> {
    model: Sequential,
    loss_fn: L,
    grad: Vec<f32>,
    train: Dataset,
    test: Dataset,
    batch_size: NonZeroUsize,
}

impl<L: LossFn> Trainer<L> {
    /// Creates a new `Trainer`.
    ///
    /// # Args
    /// * `model` - The model being trained.
    /// * `loss_fn` - The loss function.
    /// * `train` - The training split.
    /// * `test` - The held-out split for the final report.
    /// * `batch_size` - The amount of samples per gradient computation.
    ///
    /// # Returns
    /// A new `Trainer` instance.
    pub fn new(
        model: Sequential,
        loss_fn: L,
        train: Dataset,
        test: Dataset,
        batch_size: NonZeroUsize,
    ) -> Self {
        Self {
            grad: vec![0.0; model.size()],
            model,
            loss_fn,
            train,
            test,
            batch_size,
        }
    }

    /// Returns the amount of parameters of the model.
    pub fn num_params(&self) -> usize {
        self.grad.len()
    }

    /// Returns the amount of batches one epoch yields.
    pub fn num_batches(&self) -> usize {
        self.train.num_batches(self.batch_size)
    }

    /// Returns the gradient computed by the latest `train_batch` call.
    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    /// Reorders the training samples for a new epoch.
    ///
    /// # Args
    /// * `rng` - The random number generator driving the permutation.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.train.shuffle(rng);
    }

    /// Computes the gradient of one mini-batch against `params`.
    ///
    /// The gradient stays in the trainer's buffer (see `grad`); the replica is
    /// read, never written.
    ///
    /// # Args
    /// * `params` - The local replica of the parameters.
    /// * `index` - The batch index within the current epoch.
    ///
    /// # Returns
    /// The batch loss.
    pub fn train_batch(&mut self, params: &[f32], index: usize) -> Result<f32> {
        let (x, y) = self
            .train
            .batch(index, self.batch_size)
            .ok_or(WorkerErr::BatchOutOfRange {
                index,
                batches: self.train.num_batches(self.batch_size),
            })?;

        let loss = self
            .model
            .backprop(params, &mut self.grad, &self.loss_fn, x.to_owned(), y)?;

        Ok(loss)
    }

    /// Computes the classification accuracy of one training mini-batch.
    ///
    /// # Args
    /// * `params` - The local replica of the parameters.
    /// * `index` - The batch index within the current epoch.
    ///
    /// # Returns
    /// The fraction of the batch the model classifies correctly.
    pub fn batch_accuracy(&mut self, params: &[f32], index: usize) -> Result<f32> {
        let (x, y) = self
            .train
            .batch(index, self.batch_size)
            .ok_or(WorkerErr::BatchOutOfRange {
                index,
                batches: self.train.num_batches(self.batch_size),
            })?;

        let logits = self.model.forward(params, x.to_owned())?;
        Ok(metrics::accuracy(logits.view(), y))
    }

    /// Computes the classification accuracy over the whole held-out split.
    ///
    /// Runs batch by batch so the forward pass never materializes the whole
    /// split at once.
    ///
    /// # Args
    /// * `params` - The local replica of the parameters.
    ///
    /// # Returns
    /// The fraction of the held-out split the model classifies correctly.
    pub fn test_accuracy(&mut self, params: &[f32]) -> Result<f32> {
        let mut correct = 0.0;
        let total = self.test.len();

        if total == 0 {
            return Ok(0.0);
        }

        // The iterator borrows the split, so walk it by index instead.
        let batches = self.test.num_batches(self.batch_size);
        for index in 0..batches {
            // SAFETY: `index` stays below `num_batches`.
            let (x, y) = self.test.batch(index, self.batch_size).unwrap();
            let n = x.nrows() as f32;

            let logits = self.model.forward(params, x.to_owned())?;
            correct += metrics::accuracy(logits.view(), y) * n;
        }

        Ok(correct / total as f32)
    }
}
