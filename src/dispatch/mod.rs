//! Command dispatch across matrix cells
//!
//! A bounded worker pool runs each cell's job; results are aggregated
//! into a [`RunReport`] in resolver order.

pub mod dispatcher;
pub mod pool;
pub mod report;

pub use dispatcher::{new_run_id, CellLog, DispatchOptions, Dispatcher};
pub use pool::{FailurePolicy, WorkerPool};
pub use report::{CellStatus, DispatchResult, RunReport};
