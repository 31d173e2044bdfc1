//! Build cache
//!
//! Fingerprints the inputs of each matrix cell and records which
//! fingerprint was last built successfully, so unchanged environments
//! are reused rather than rebuilt.
//!
//! # Entry States
//!
//! | Status | Reusable | Description |
//! |--------|----------|-------------|
//! | Success | if fingerprint matches | Last build completed |
//! | Failed | no | Last build failed, or was abandoned past the staleness threshold |
//! | InProgress | no | A build holds the cell right now |

pub mod fingerprint;
pub mod inputs;
pub mod ledger;

pub use fingerprint::{fingerprint, Fingerprint, InputSet, FINGERPRINT_SCHEMA};
pub use inputs::InputCollector;
pub use ledger::{BuildStatus, BuildToken, Ledger, LedgerEntry};
