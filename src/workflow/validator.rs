//! Configuration Validation
//!
//! Structural pre-validation of the workflow configuration. Every fatal
//! condition is checked up front so a run fails before any output is
//! produced:
//!
//! - `workflow` section present and a mapping
//! - at least one cycle definition, each carrying `dates`
//! - a log destination
//! - task specifications shaped as mappings, with mapping-shaped
//!   `envars` and `dependency` entries
//! - every metatask (recursively) carrying a `var` mapping
//!
//! Dependency kinds are deliberately not validated against a vocabulary,
//! and sibling-name uniqueness is enforced by the builders where the
//! effective names are computed.

use log::{info, warn};
use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Validates the fatal structural requirements of a configuration.
pub fn validate_config(config: &Value) -> Result<()> {
    let workflow = config
        .get("workflow")
        .ok_or_else(|| Error::missing("workflow", "configuration root"))?;
    let section = workflow
        .as_mapping()
        .ok_or_else(|| Error::malformed("workflow", "a mapping"))?;

    let cycledefs = section
        .get("cycledefs")
        .ok_or_else(|| Error::missing("cycledefs", "workflow"))?
        .as_mapping()
        .ok_or_else(|| Error::malformed("workflow.cycledefs", "a mapping"))?;
    if cycledefs.is_empty() {
        return Err(Error::malformed(
            "workflow.cycledefs",
            "at least one cycle definition",
        ));
    }

    for (name, cycledef) in cycledefs {
        let scope = format!("cycledef '{}'", name.as_str().unwrap_or("?"));
        let map = cycledef
            .as_mapping()
            .ok_or_else(|| Error::malformed(scope.clone(), "a mapping"))?;
        if map.get("dates").is_none() {
            return Err(Error::missing("dates", scope));
        }
    }

    if section.get("log").is_none() {
        return Err(Error::missing("log", "workflow"));
    }

    if let Some(attrs) = section.get("attrs") {
        if !attrs.is_mapping() {
            return Err(Error::malformed("workflow.attrs", "a mapping"));
        }
    }

    if let Some(tasks) = section.get("tasks") {
        let tasks = tasks
            .as_mapping()
            .ok_or_else(|| Error::malformed("workflow.tasks", "a mapping"))?;
        validate_task_specs(tasks)?;
    }

    info!("Configuration validated: {} cycledefs", cycledefs.len());
    Ok(())
}

/// Recursively validates task and metatask specifications.
fn validate_task_specs(specs: &Mapping) -> Result<()> {
    for (key, spec) in specs {
        let Some(key) = key.as_str() else {
            continue;
        };
        let Some((kind, name)) = key.split_once('_') else {
            continue;
        };

        match kind {
            "task" => validate_task_spec(name, spec)?,
            "metatask" => validate_metatask_spec(name, spec)?,
            _ => {}
        }
    }

    Ok(())
}

fn validate_task_spec(name: &str, spec: &Value) -> Result<()> {
    let scope = format!("task '{}'", name);
    let map = spec
        .as_mapping()
        .ok_or_else(|| Error::malformed(scope.clone(), "a mapping"))?;

    if let Some(envars) = map.get("envars") {
        if !envars.is_mapping() {
            return Err(Error::malformed(
                format!("envars of {}", scope),
                "a mapping of variable names to values",
            ));
        }
    }

    if let Some(dependency) = map.get("dependency") {
        if !dependency.is_mapping() {
            return Err(Error::malformed(
                format!("dependency of {}", scope),
                "a mapping of dependency nodes",
            ));
        }
    }

    if map.get("command").is_none() {
        warn!("Task '{}' has no command entry", name);
    }

    Ok(())
}

fn validate_metatask_spec(name: &str, spec: &Value) -> Result<()> {
    let scope = format!("metatask '{}'", name);
    let map = spec
        .as_mapping()
        .ok_or_else(|| Error::malformed(scope.clone(), "a mapping"))?;

    match map.get("var") {
        None => return Err(Error::missing("var", scope)),
        Some(var) if !var.is_mapping() => {
            return Err(Error::malformed(format!("var of {}", scope), "a mapping"));
        }
        Some(_) => {}
    }

    // The rest of the body is nested task content.
    for (key, value) in map {
        if key.as_str() == Some("attrs") || key.as_str() == Some("var") {
            continue;
        }
        if let Some(key) = key.as_str() {
            if let Some((kind, nested)) = key.split_once('_') {
                match kind {
                    "task" => validate_task_spec(nested, value)?,
                    "metatask" => validate_metatask_spec(nested, value)?,
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(yaml: &str) -> Result<()> {
        let config: Value = serde_yaml::from_str(yaml).unwrap();
        validate_config(&config)
    }

    const MINIMAL: &str = "workflow:\n  cycledefs:\n    prod:\n      dates: a b c\n  log: /logs/wf.log\n";

    #[test]
    fn test_minimal_config_valid() {
        assert!(validate(MINIMAL).is_ok());
    }

    #[test]
    fn test_missing_workflow_fatal() {
        let result = validate("other: {}\n");
        match result {
            Err(Error::MissingField { field, .. }) => assert_eq!(field, "workflow"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_cycledefs_fatal() {
        let result = validate("workflow:\n  log: /logs/wf.log\n");
        assert!(matches!(
            result,
            Err(Error::MissingField { ref field, .. }) if field == "cycledefs"
        ));
    }

    #[test]
    fn test_empty_cycledefs_fatal() {
        let result = validate("workflow:\n  cycledefs: {}\n  log: /logs/wf.log\n");
        assert!(matches!(result, Err(Error::MalformedSpec { .. })));
    }

    #[test]
    fn test_cycledef_without_dates_fatal() {
        let result =
            validate("workflow:\n  cycledefs:\n    prod:\n      activation_offset: '-06:00'\n  log: l\n");
        match result {
            Err(Error::MissingField { field, scope }) => {
                assert_eq!(field, "dates");
                assert!(scope.contains("prod"));
            }
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_log_fatal() {
        let result = validate("workflow:\n  cycledefs:\n    prod:\n      dates: a\n");
        assert!(matches!(
            result,
            Err(Error::MissingField { ref field, .. }) if field == "log"
        ));
    }

    #[test]
    fn test_metatask_without_var_fatal() {
        let yaml = format!(
            "{}  tasks:\n    metatask_ens:\n      task_run:\n        command: run.sh\n",
            MINIMAL
        );
        let result = validate(&yaml);
        assert!(matches!(
            result,
            Err(Error::MissingField { ref field, .. }) if field == "var"
        ));
    }

    #[test]
    fn test_nested_metatask_without_var_fatal() {
        let yaml = format!(
            "{}  tasks:\n    metatask_outer:\n      var:\n        grid: 'a b'\n      metatask_inner:\n        task_run:\n          command: run.sh\n",
            MINIMAL
        );
        let result = validate(&yaml);
        assert!(matches!(
            result,
            Err(Error::MissingField { ref field, ref scope }) if field == "var" && scope.contains("inner")
        ));
    }

    #[test]
    fn test_non_mapping_dependency_fatal() {
        let yaml = format!(
            "{}  tasks:\n    task_run:\n      command: run.sh\n      dependency: prep\n",
            MINIMAL
        );
        assert!(matches!(validate(&yaml), Err(Error::MalformedSpec { .. })));
    }

    #[test]
    fn test_tasks_section_optional() {
        assert!(validate(MINIMAL).is_ok());
    }
}
