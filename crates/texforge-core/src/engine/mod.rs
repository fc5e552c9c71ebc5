//! Engine planning: what to run and how.
//!
//! - [`catalog`] resolves a backend preference into an [`EngineChoice`]
//! - [`features`] derives [`EngineFeatures`] from document metadata
//! - [`command`] turns both into an [`EngineCommand`]

pub mod catalog;
pub mod command;
pub mod features;

pub use catalog::{resolve, Backend, EngineChoice, EnginePreference, EngineProgram, FAST_KEYWORD};
pub use command::{document_dir, CommandBuilder, EngineCommand, WRAPPER_BINARY};
pub use features::{BuildMetadata, EngineFeatures, FeatureProbe};
