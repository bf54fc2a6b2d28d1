/// Marker for primitive number types with an alignment of at least 4 bytes.
///
/// Receive buffers are allocated over one of these so that `f32` payload
/// regions inside a frame can be reinterpreted in place.
pub trait Align4: bytemuck::Pod {}

impl Align4 for u32 {}
impl Align4 for i32 {}
impl Align4 for u64 {}
impl Align4 for i64 {}
impl Align4 for f32 {}
impl Align4 for f64 {}
