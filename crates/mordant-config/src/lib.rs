//! Mordant Config
//!
//! This crate contains the serializable types shared by every mordant crate.
//! A workflow graph arrives as structured data (node id -> class type + inputs),
//! the scanner turns it into asset requirements, and the engine reports
//! per-asset failures using the same vocabulary.
//!
//! Configuration can be loaded from:
//! - JSON workflow files in the node-id keyed "API" format
//! - A JSON settings file (`config.json` in the data directory)
//!
//! Nothing in this crate performs network I/O.

mod asset;
mod failure;
mod graph;
mod input;
mod settings;

pub use asset::{AssetId, AssetRequirement, AssetSource, RequirementDef, RequirementSet};
pub use failure::FailureKind;
pub use graph::{GraphError, NodeDef, NodeInputs, WorkflowGraph};
pub use input::{InputValue, NodeLink};
pub use settings::{Settings, SettingsError};
