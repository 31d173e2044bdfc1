//! Drydock - environment-matrix build cache and dispatcher
//!
//! Resolves a matrix of environment variants, fingerprints the inputs of
//! each variant's container image, rebuilds only the images whose inputs
//! changed, and runs commands across the matrix with bounded concurrency.

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod journal;
pub mod matrix;
pub mod pipeline;
pub mod ui;

pub use error::{DrydockError, DrydockResult};
