pub mod artifact;
pub mod case;
pub mod layout;
pub mod tensor;

pub use artifact::*;
pub use case::*;
pub use layout::*;
pub use tensor::*;
