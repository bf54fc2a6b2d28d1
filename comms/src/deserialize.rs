use std::io;

/// Wire deserialization borrowing from the receive buffer.
///
/// The buffer is mutable so payload regions can be handed out as `&mut [f32]`
/// views and overwritten in place by the caller.
pub trait Deserialize<'a>: Sized {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self>;
}
