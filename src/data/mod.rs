//! Data sources: synthetic sample generation.

pub mod sample;

pub use sample::*;
