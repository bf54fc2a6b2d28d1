/// An update rule turning a gradient into a parameter change.
///
/// One optimizer instance lives inside each storage shard and only ever sees
/// that shard's region, so stateful rules keep per-region state without any
/// cross-shard coordination.
pub trait Optimizer {
    /// Applies one gradient to the parameters in place.
    ///
    /// Both slices are the same shard region; the caller guarantees equal
    /// lengths.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]);
}
