pub mod runner;
pub mod stage1_extract;
pub mod stage2_register;
pub mod stage3_normalize;
pub mod stage4_merge;
pub mod stage5_manifest;

#[cfg(all(test, unix))]
mod test_support;

pub use runner::*;
pub use stage1_extract::*;
pub use stage2_register::*;
pub use stage3_normalize::*;
pub use stage4_merge::*;
pub use stage5_manifest::*;
