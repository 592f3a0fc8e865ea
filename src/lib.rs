//
// lib.rs
// methoddiff
//
// Library entry that re-exports the structural scanner, the diff engine and the reporting layer so the binary and tests can reach them.
//
// Public crate interface: re-export modules used by the binary and tests.
pub mod cli;
pub mod diff;
pub mod pairs;
pub mod report;
pub mod scanner;
pub mod utils;

pub use cli::{build_options, Args, Options};
pub use diff::{diff_definitions, Counts, DiffResult, PairDiff};
pub use pairs::{run_method_diff, FilePair, Summary};
pub use scanner::{scan, DefinitionKind, DefinitionRecord, ScanResult};
