use parking_lot::Mutex;

use crate::optimization::Optimizer;

struct Inner<O> {
    params: Vec<f32>,
    optimizer: O,
}

/// One contiguous region of the parameter vector and its optimizer state.
///
/// Each shard is locked independently, so two workers pushing gradients at the
/// same time contend per region, never on the whole vector.
pub struct ParameterShard<O> {
    inner: Mutex<Inner<O>>,
    len: usize,
}

impl<O: Optimizer> ParameterShard<O> {
    /// Creates a new `ParameterShard`.
    ///
    /// # Arguments
    /// * `params` - The initial values of this region.
    /// * `optimizer` - The optimizer owning this region's update state.
    pub fn new(params: Vec<f32>, optimizer: O) -> Self {
        let len = params.len();

        Self {
            inner: Mutex::new(Inner { params, optimizer }),
            len,
        }
    }

    /// Returns the amount of parameters in this shard.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Applies one gradient region to this shard's parameters.
    ///
    /// # Arguments
    /// * `grad` - The region of the flat gradient that maps onto this shard.
    pub(super) fn apply(&self, grad: &[f32]) {
        let mut inner = self.inner.lock();
        let Inner { params, optimizer } = &mut *inner;
        optimizer.update_params(grad, params);
    }

    /// Copies this shard's parameters into the matching output region.
    ///
    /// # Arguments
    /// * `out` - The region of the flat output buffer that maps onto this shard.
    pub(super) fn pull(&self, out: &mut [f32]) {
        out.copy_from_slice(&self.inner.lock().params);
    }
}
