//! Mordant Scanner
//!
//! Turns a workflow graph into the de-duplicated set of assets it needs.
//!
//! Two sources contribute requirements for every node:
//! - literal inputs: URL-valued fields, and file-name-valued fields whose name
//!   carries a known asset role (see [`FieldRoles`])
//! - the node type's [`NodeHandler`], looked up in the [`HandlerTable`], which
//!   may report assets the inputs never name
//!
//! Handlers are supplied by the node installer, either in code or as a
//! declarative JSON manifest ([`HandlerManifest`]).

mod error;
mod handler;
mod manifest;
mod roles;
mod scanner;

pub use error::{ScanError, UnsupportedNode};
pub use handler::{HandlerTable, NodeHandler};
pub use manifest::{DeclaredHandler, HandlerManifest};
pub use roles::{FieldRoles, classify_text};
pub use scanner::Scanner;
