//! Terminal output helpers
//!
//! Styled symbols and an `indicatif` spinner on a terminal; bracketed
//! plain-text tags in CI and when output is piped.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, outro, remark, section, step_error_detail, step_info, step_ok,
    step_ok_detail, step_skipped, step_warn_hint,
};
pub use progress::TaskSpinner;
