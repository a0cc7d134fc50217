pub mod client;
pub mod command;

pub use client::*;
pub use command::*;
