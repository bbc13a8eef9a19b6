//! Dependency-Tree Builder
//!
//! Turns a nested dependency specification into typed dependency nodes
//! under a task. The specification does not follow a fixed schema: each
//! mapping key names a dependency kind (`taskdep`, `and`, `or`,
//! `timedep`, `datadep`, ...), optionally suffixed `_label` to keep
//! sibling keys unique; the label is discarded. No kind vocabulary is
//! enforced here, the consuming scheduler owns that validation.
//!
//! Traversal is read-only: the `attrs` and `text` keys recognized on a
//! node are skipped during recursion rather than removed from the
//! configuration.

use log::warn;
use serde_yaml::Value;

use crate::config::scalar_to_string;
use crate::workflow::model::{attach_content, Element};

/// Recursively builds dependency nodes from a specification mapping,
/// attaching them as children of `parent`. Non-mapping input builds
/// nothing; leaf values terminate the recursion.
pub fn build_dependency_tree(spec: &Value, parent: &mut Element) {
    let Some(map) = spec.as_mapping() else {
        return;
    };

    for (key, value) in map {
        let Some(key) = key.as_str() else {
            warn!("Ignoring non-string dependency key {:?}", key);
            continue;
        };
        add_dependency_node(key, value, parent);
    }
}

/// Builds one dependency node and its subtree.
fn add_dependency_node(key: &str, value: &Value, parent: &mut Element) {
    // The portion before the first underscore is the dependency kind;
    // the remainder only disambiguates sibling keys.
    let kind = key.split('_').next().unwrap_or(key);
    let mut node = Element::new(kind);

    match value.as_mapping() {
        Some(map) => {
            if let Some(attrs) = map.get("attrs").and_then(Value::as_mapping) {
                for (name, attr_value) in attrs {
                    node.set_attr(scalar_to_string(name), scalar_to_string(attr_value));
                }
            }
            if let Some(content) = map.get("text") {
                attach_content(&mut node, content);
            }

            for (child_key, child_value) in map {
                match child_key.as_str() {
                    Some("attrs") | Some("text") => continue,
                    Some(child_key) => add_dependency_node(child_key, child_value, &mut node),
                    None => warn!("Ignoring non-string dependency key {:?}", child_key),
                }
            }
        }
        None => attach_content(&mut node, value),
    }

    parent.push_child(node);
}
