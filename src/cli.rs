//! Command-line interface definitions and argument parsing.
//!
//! The CLI carries one optional flag per known setting. A flag that was not
//! given stays `None` and never takes part in the merge.

mod args;
mod duration;
mod settings;

pub use args::Cli;
pub use duration::{format_duration, parse_duration};
pub use settings::*;
