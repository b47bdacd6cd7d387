pub mod frame;
pub mod input;
pub mod manager;
pub mod sampler;

#[cfg(test)]
pub(crate) mod testing;

pub use frame::{EncodedImage, ImageFormat};
pub use input::{InputAction, MouseButton};
pub use manager::{SessionHandle, SessionManager};
