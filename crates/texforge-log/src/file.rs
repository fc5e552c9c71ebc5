//! Reading engine logs from disk.
//!
//! TeX writes logs in whatever encoding the input used, so bytes are decoded
//! lossily rather than rejected.

use std::path::Path;

use crate::error::{LogError, Result};
use crate::message::DiagnosticMessage;
use crate::parser::parse_log;

/// Read a log file as text.
pub fn read_log(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| LogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read and classify a log file.
pub fn parse_log_file(path: &Path) -> Result<Vec<DiagnosticMessage>> {
    Ok(parse_log(&read_log(path)?))
}
