use std::num::NonZeroUsize;

/// Immutable execution bounds for a worker instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    worker_id: usize,
    batch_size: NonZeroUsize,
    max_epochs: NonZeroUsize,
    log_every: NonZeroUsize,
    seed: Option<u64>,
}

impl WorkerConfig {
    /// How many optimization steps pass between progress reports.
    pub const DEFAULT_LOG_EVERY: usize = 100;

    /// Creates a new worker configuration.
    ///
    /// # Args
    /// * `worker_id` - This worker's task index, used for observability.
    /// * `batch_size` - The amount of samples per gradient computation.
    /// * `max_epochs` - The amount of passes over the training set.
    ///
    /// # Returns
    /// A `WorkerConfig` instance with the default reporting cadence.
    pub fn new(worker_id: usize, batch_size: NonZeroUsize, max_epochs: NonZeroUsize) -> Self {
        // SAFETY: The default cadence is a non-zero constant.
        let log_every = NonZeroUsize::new(Self::DEFAULT_LOG_EVERY).unwrap();

        Self {
            worker_id,
            batch_size,
            max_epochs,
            log_every,
            seed: None,
        }
    }

    /// Overrides the progress reporting cadence.
    pub fn with_log_every(mut self, log_every: NonZeroUsize) -> Self {
        self.log_every = log_every;
        self
    }

    /// Fixes the shuffling seed, making epochs reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    /// Returns the amount of passes over the training set.
    pub fn max_epochs(&self) -> usize {
        self.max_epochs.get()
    }

    /// Returns the amount of steps between progress reports.
    pub fn log_every(&self) -> usize {
        self.log_every.get()
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}
