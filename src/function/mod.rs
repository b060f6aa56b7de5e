pub mod coordinate;
pub mod rotation;
pub mod tensor_extensions;

pub use coordinate::*;
pub use rotation::*;
pub use tensor_extensions::*;
