//! Configuration Handling Module
//!
//! Provides loading and in-place template resolution for the nested YAML
//! configuration that describes a workflow.
//!
//! # Structure
//!
//! - [`loader`]: YAML loading and custom tag normalization
//! - [`templates`]: deferred template expression resolution

pub mod loader;
pub mod templates;

pub use loader::load_config;
pub use templates::TemplateResolver;

use serde_yaml::Value;

/// Renders a configuration scalar as the string that lands in the output
/// document.
///
/// Strings pass through untouched; numbers and booleans take their YAML
/// form; null becomes the empty string. Nested collections should not
/// reach attribute or content position, but serialize to their YAML
/// representation rather than panicking if they do.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
