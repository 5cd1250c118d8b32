//! Fixed-effects and random-effects linear models.

pub mod lm;
pub mod random;

#[cfg(test)]
pub(crate) mod fixtures;

pub use lm::LinearModel;
pub use random::{ColumnTests, RandomLm};
