pub mod input;
pub mod manifest;
pub mod npy;
pub mod output;
pub mod store;
pub mod volume;

pub use input::*;
pub use manifest::*;
pub use npy::*;
pub use output::*;
pub use store::*;
pub use volume::*;
