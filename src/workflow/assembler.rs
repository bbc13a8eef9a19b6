//! Workflow Assembler
//!
//! Builds the top-level document from the configuration's `workflow`
//! section: the entity-declaration header, the `<workflow>` root with
//! its cycle definitions and log destination, and the task/metatask
//! forest.
//!
//! [`compile`] is the single entry point: two template-resolution
//! passes over the whole configuration, structural validation, then
//! tree construction. All fatal checks run before any output exists, so
//! a failed run never produces a partial document.

use std::path::Path;

use log::{debug, info};
use serde_yaml::{Mapping, Value};

use crate::config::loader::load_config;
use crate::config::scalar_to_string;
use crate::config::templates::TemplateResolver;
use crate::error::{Error, Result};
use crate::workflow::model::{cyclestr_element, Element, WorkflowDocument};
use crate::workflow::tasks::build_task_elements;
use crate::workflow::validator::validate_config;

/// Compiles a configuration into a workflow document.
///
/// Template resolution mutates the configuration in place (unresolved
/// expressions stay verbatim); everything downstream reads it without
/// consuming it.
pub fn compile(config: &mut Value, resolver: &TemplateResolver) -> Result<WorkflowDocument> {
    resolver.resolve(config);
    validate_config(config)?;

    // Validated above: `workflow` exists and is a mapping.
    let section = config
        .get("workflow")
        .and_then(Value::as_mapping)
        .ok_or_else(|| Error::missing("workflow", "configuration root"))?;

    let empty = Mapping::new();
    let entities = section
        .get("entities")
        .and_then(Value::as_mapping)
        .unwrap_or(&empty);
    let header = build_header(entities);

    let mut root = build_workflow_tree(section)?;

    if let Some(tasks) = section.get("tasks").and_then(Value::as_mapping) {
        build_task_elements(tasks, &mut root, resolver, "workflow")?;
    }

    info!(
        "Compiled workflow: {} cycledefs, {} top-level tasks",
        root.find_all("cycledef").len(),
        root.find_all("task").len() + root.find_all("metatask").len()
    );

    Ok(WorkflowDocument { header, root })
}

/// Loads a configuration file and compiles it, resolving templates
/// against a snapshot of the process environment.
///
/// # Example
///
/// ```rust,no_run
/// use cyclegen::compile_file;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let doc = compile_file("workflow.yml")?;
///     print!("{}", doc.render());
///     Ok(())
/// }
/// ```
pub fn compile_file(path: impl AsRef<Path>) -> Result<WorkflowDocument> {
    let mut config = load_config(path)?;
    let resolver = TemplateResolver::from_env();
    compile(&mut config, &resolver)
}

/// Builds the document header: XML declaration plus a DOCTYPE carrying
/// one entity declaration per configured entity, in order.
pub fn build_header(entities: &Mapping) -> String {
    let mut header = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE workflow [\n");

    for (name, value) in entities {
        header.push_str(&format!(
            "<!ENTITY {} \"{}\">\n",
            scalar_to_string(name),
            scalar_to_string(value)
        ));
    }

    header.push_str("]>");
    header
}

/// Builds the `<workflow>` root: pass-through attributes, one
/// `<cycledef>` per cycle definition, and the `<log>` destination.
pub fn build_workflow_tree(section: &Mapping) -> Result<Element> {
    let mut root = Element::new("workflow");
    if let Some(attrs) = section.get("attrs").and_then(Value::as_mapping) {
        for (name, value) in attrs {
            root.set_attr(scalar_to_string(name), scalar_to_string(value));
        }
    }

    let cycledefs = section
        .get("cycledefs")
        .and_then(Value::as_mapping)
        .ok_or_else(|| Error::missing("cycledefs", "workflow"))?;

    for (group, cycledef) in cycledefs {
        let group = scalar_to_string(group);
        let map = cycledef
            .as_mapping()
            .ok_or_else(|| Error::malformed(format!("cycledef '{}'", group), "a mapping"))?;
        let dates = map
            .get("dates")
            .ok_or_else(|| Error::missing("dates", format!("cycledef '{}'", group)))?;

        let mut element = Element::new("cycledef");
        element.set_attr("group", group.as_str());
        for (name, value) in map {
            if name.as_str() == Some("dates") {
                continue;
            }
            element.set_attr(scalar_to_string(name), scalar_to_string(value));
        }
        element.push_text(scalar_to_string(dates));

        debug!("Built cycledef '{}'", group);
        root.push_child(element);
    }

    let log = section
        .get("log")
        .ok_or_else(|| Error::missing("log", "workflow"))?;
    root.push_child(build_log(log));

    Ok(root)
}

/// Wraps the log destination in a `<log>` element. The content is
/// always cycle-aware: a structured `!cycstr` value attaches directly,
/// a plain string gets wrapped in `<cyclestr>`.
fn build_log(value: &Value) -> Element {
    let mut log = Element::new("log");

    match value {
        Value::Tagged(tagged) if tagged.tag == "cycstr" => {
            log.push_child(cyclestr_element(tagged));
        }
        other => {
            let mut cyclestr = Element::new("cyclestr");
            cyclestr.push_text(scalar_to_string(other));
            log.push_child(cyclestr);
        }
    }

    log
}
