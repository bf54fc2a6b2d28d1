use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use rayon::prelude::*;

use crate::{
    PsErr, Result,
    optimization::Optimizer,
    storage::ParameterShard,
};

/// The authoritative storage of the model parameters.
///
/// The flat vector is split into fixed-size shards (the last one may be
/// ragged). Applying a gradient updates every shard in parallel and bumps the
/// global step exactly once, so the step counts optimization updates across
/// all workers.
pub struct ParameterStore<O> {
    params: usize,
    step: Arc<AtomicU64>,
    shards: Arc<[ParameterShard<O>]>,
    shard_size: NonZeroUsize,
}

impl<O> Clone for ParameterStore<O> {
    fn clone(&self) -> Self {
        Self {
            params: self.params,
            step: Arc::clone(&self.step),
            shards: Arc::clone(&self.shards),
            shard_size: self.shard_size,
        }
    }
}

impl<O: Optimizer> ParameterStore<O> {
    /// Creates a new `ParameterStore`.
    ///
    /// # Arguments
    /// * `shard_size` - The maximum amount of parameters per shard.
    /// * `values` - The initial flat parameter vector.
    /// * `step` - The global step the store starts from (non-zero when
    ///            restored from a checkpoint).
    /// * `optimizer_factory` - An `Optimizer` factory closure, called once per
    ///                         shard with the shard length.
    pub fn new<F>(
        shard_size: NonZeroUsize,
        values: Vec<f32>,
        step: u64,
        mut optimizer_factory: F,
    ) -> Self
    where
        F: FnMut(usize) -> O,
    {
        let params = values.len();
        let mut shards = Vec::with_capacity(params.div_ceil(shard_size.get()));
        let mut values = values;

        while !values.is_empty() {
            let take = shard_size.get().min(values.len());
            let rest = values.split_off(take);
            let optimizer = optimizer_factory(values.len());
            shards.push(ParameterShard::new(values, optimizer));
            values = rest;
        }

        Self {
            params,
            step: Arc::new(AtomicU64::new(step)),
            shards: Arc::from(shards),
            shard_size,
        }
    }

    /// Returns the size of the storage.
    ///
    /// # Returns
    /// The amount of parameters in the storage.
    pub fn len(&self) -> usize {
        self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params == 0
    }

    /// Returns the current global step.
    pub fn global_step(&self) -> u64 {
        self.step.load(Ordering::Acquire)
    }
}

impl<O: Optimizer + Send + Sync> ParameterStore<O> {
    /// Applies one whole-model gradient and advances the global step.
    ///
    /// The update fans out over the shards in parallel; each shard applies its
    /// region under its own lock.
    ///
    /// # Arguments
    /// * `grad` - A flat slice containing a new model gradient.
    ///
    /// # Returns
    /// The global step after this update, or an error if the gradient length
    /// does not match the parameter count.
    pub fn apply(&self, grad: &[f32]) -> Result<u64> {
        if grad.len() != self.params {
            return Err(PsErr::GradientLengthMismatch {
                got: grad.len(),
                expected: self.params,
            });
        }

        self.shards
            .par_iter()
            .zip(grad.par_chunks(self.shard_size.get()))
            .for_each(|(shard, grad_slice)| shard.apply(grad_slice));

        Ok(self.step.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Gathers all the sharded parameters into a flat buffer.
    ///
    /// # Arguments
    /// * `out` - A mutable slice where the parameters will be copied.
    ///
    /// # Returns
    /// The global step at gather time, or an error if `out` does not match the
    /// parameter count.
    pub fn snapshot(&self, out: &mut [f32]) -> Result<u64> {
        if out.len() != self.params {
            return Err(PsErr::GradientLengthMismatch {
                got: out.len(),
                expected: self.params,
            });
        }

        self.shards
            .par_iter()
            .zip(out.par_chunks_mut(self.shard_size.get()))
            .for_each(|(shard, out_slice)| shard.pull(out_slice));

        Ok(self.step.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;

    struct AddOptimizer;

    impl Optimizer for AddOptimizer {
        fn update_params(&mut self, grad: &[f32], params: &mut [f32]) {
            params.iter_mut().zip(grad).for_each(|(p, g)| *p += g);
        }
    }

    fn create_test_store(params: usize, shard_size: usize) -> ParameterStore<AddOptimizer> {
        let shard_size = NonZeroUsize::new(shard_size).unwrap();
        ParameterStore::new(shard_size, vec![0.0; params], 0, |_| AddOptimizer)
    }

    #[test]
    fn test_apply_over_ragged_shards() {
        const PARAMS: usize = 15;
        const SHARD_SIZE: usize = 8;

        let store = create_test_store(PARAMS, SHARD_SIZE);
        let grad = [1.0; PARAMS];

        store.apply(&grad).unwrap();

        let mut out = [0.0; PARAMS];
        store.snapshot(&mut out).unwrap();
        assert_eq!(out, [1.0; PARAMS]);
    }

    #[test]
    fn test_step_counts_updates() {
        const PARAMS: usize = 10;

        let store = create_test_store(PARAMS, 4);
        assert_eq!(store.global_step(), 0);

        assert_eq!(store.apply(&[0.0; PARAMS]).unwrap(), 1);
        assert_eq!(store.apply(&[0.0; PARAMS]).unwrap(), 2);

        let mut out = [0.0; PARAMS];
        assert_eq!(store.snapshot(&mut out).unwrap(), 2);
    }

    #[test]
    fn test_restored_step_keeps_counting() {
        let store = ParameterStore::new(
            NonZeroUsize::new(4).unwrap(),
            vec![0.0; 8],
            100,
            |_| AddOptimizer,
        );

        assert_eq!(store.apply(&[0.0; 8]).unwrap(), 101);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let store = create_test_store(10, 4);

        assert!(matches!(
            store.apply(&[0.0; 9]),
            Err(PsErr::GradientLengthMismatch {
                got: 9,
                expected: 10,
            })
        ));

        let mut out = [0.0; 11];
        assert!(store.snapshot(&mut out).is_err());
    }

    #[test]
    fn test_concurrent_applies_all_land() {
        use std::thread;

        const PARAMS: usize = 64;
        const THREADS: usize = 4;
        const PUSHES: usize = 25;

        let store = create_test_store(PARAMS, 7);

        thread::scope(|scope| {
            for _ in 0..THREADS {
                let store = store.clone();
                scope.spawn(move || {
                    for _ in 0..PUSHES {
                        store.apply(&[1.0; PARAMS]).unwrap();
                    }
                });
            }
        });

        let mut out = [0.0; PARAMS];
        store.snapshot(&mut out).unwrap();

        assert_eq!(store.global_step(), (THREADS * PUSHES) as u64);
        assert_eq!(out, [(THREADS * PUSHES) as f32; PARAMS]);
    }

    #[test]
    fn test_initial_values_survive_sharding() {
        let values: Vec<f32> = (0..20).map(|v| v as f32).collect();
        let store = ParameterStore::new(
            NonZeroUsize::new(6).unwrap(),
            values.clone(),
            0,
            |_| AddOptimizer,
        );

        let mut out = vec![0.0; 20];
        store.snapshot(&mut out).unwrap();
        assert_eq!(out, values);
    }
}
