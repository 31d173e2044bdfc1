//! Environment matrix
//!
//! Cells are the unit of caching and dispatch. The resolver turns a
//! request (explicit values, "all", or "default" per axis) into a
//! deterministic, ordered list of cells.

pub mod cell;
pub mod resolve;

pub use cell::{AxisBinding, MatrixCell};
pub use resolve::{AxisSelector, MatrixRequest, MatrixResolver};
