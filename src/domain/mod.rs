pub mod market;
pub mod strategy;

pub use market::*;
pub use strategy::*;
