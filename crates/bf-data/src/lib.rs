pub mod client;
pub mod rows;
pub mod sample;

pub use client::*;
pub use rows::*;
pub use sample::*;
