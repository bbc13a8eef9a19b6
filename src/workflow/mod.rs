//! Workflow Compilation Module
//!
//! Provides the element-tree model and the builders that turn a
//! configuration into a workflow document.
//!
//! # Structure
//!
//! - [`model`]: document model (Element, Node, WorkflowDocument)
//! - [`validator`]: structural pre-validation of the configuration
//! - [`dependency`]: dependency-tree construction
//! - [`tasks`]: task and metatask construction
//! - [`assembler`]: header, workflow root and the compile entry point
//! - [`serializer`]: indented XML rendering

pub mod assembler;
pub mod dependency;
pub mod model;
pub mod serializer;
pub mod tasks;
pub mod validator;

pub use assembler::{compile, compile_file};
pub use model::{Element, Node, WorkflowDocument};
pub use serializer::to_pretty_xml;
pub use validator::validate_config;
