//! Diagnostics for the Whiley compiler.

extern crate term;
extern crate unicode_width;
extern crate whiley_env;

pub use report::{Kind, Stop, Result, Report, Reporter};
pub use report::{ConsoleReport, CollectedReport, NoReport, TrackMaxKind};

pub mod report;
mod dummy_term;
