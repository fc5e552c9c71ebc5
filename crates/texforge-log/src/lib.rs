//! texforge-log - classified diagnostics from TeX engine output
//!
//! Turns the line-oriented, hard-wrapped console output of TeX engines and
//! their drivers into an ordered list of severity-tagged messages:
//! - [`LogParser`]: streaming state machine, one instance per output stream
//! - [`rules`]: ordered label table plus detail/ignorable patterns
//! - [`rerun`]: "run again" phrase detection over a finished log
//!
//! Message `depth` mirrors the file-inclusion nesting the engine reports with
//! parentheses, so presenters can rebuild a per-file tree.

pub mod error;
pub mod file;
pub mod message;
pub mod parser;
pub mod rerun;
pub mod rules;

pub use error::{LogError, Result};
pub use file::{parse_log_file, read_log};
pub use message::{DiagnosticMessage, MessageCounts, Severity};
pub use parser::{parse_log, LogParser, WRAP_WIDTH};
pub use rerun::{needs_rerun, rerun_reason};
