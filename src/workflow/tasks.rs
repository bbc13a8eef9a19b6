//! Task and Metatask Builders
//!
//! Turns `task_<name>` and `metatask_<name>` specifications into the
//! corresponding document subtrees. Task builders work on a copy of the
//! specification so the shared configuration is never consumed
//! destructively.
//!
//! Sibling tasks and metatasks must have unique effective names within
//! their scope; a collision is a fatal configuration error. Uniqueness
//! across metatask expansion is the scheduler's concern: the variable
//! lists are passed through verbatim, instance expansion happens
//! downstream.

use std::collections::HashSet;

use log::{debug, warn};
use serde_yaml::{Mapping, Value};

use crate::config::templates::TemplateResolver;
use crate::config::scalar_to_string;
use crate::error::{Error, Result};
use crate::workflow::dependency::build_dependency_tree;
use crate::workflow::model::{attach_content, Element};

/// Dispatches a `tasks` mapping: each key splits on its first underscore
/// into a type discriminator and a name, routing to the task or metatask
/// builder. Results attach to `parent` in specification order.
pub fn build_task_elements(
    specs: &Mapping,
    parent: &mut Element,
    resolver: &TemplateResolver,
    scope: &str,
) -> Result<()> {
    let mut seen: HashSet<String> = HashSet::new();

    for (key, spec) in specs {
        let Some(key) = key.as_str() else {
            warn!("Ignoring non-string task key {:?} in {}", key, scope);
            continue;
        };
        let Some((kind, name)) = key.split_once('_') else {
            warn!("Ignoring task key '{}' without a type discriminator", key);
            continue;
        };

        match kind {
            "task" => {
                let effective = effective_task_name(name, spec);
                if !seen.insert(effective.to_string()) {
                    return Err(Error::DuplicateName {
                        name: effective.to_string(),
                        scope: scope.to_string(),
                    });
                }
                build_task(name, spec, parent, resolver)?;
            }
            "metatask" => {
                if !seen.insert(name.to_string()) {
                    return Err(Error::DuplicateName {
                        name: name.to_string(),
                        scope: scope.to_string(),
                    });
                }
                build_metatask(name, spec, parent, resolver)?;
            }
            other => {
                warn!("Ignoring unknown task type '{}' for key '{}'", other, key);
            }
        }
    }

    Ok(())
}

/// The name a task registers under: an explicit `attrs.name` wins over
/// the key-derived name.
fn effective_task_name<'a>(name: &'a str, spec: &'a Value) -> &'a str {
    spec.get("attrs")
        .and_then(|attrs| attrs.get("name"))
        .and_then(Value::as_str)
        .unwrap_or(name)
}

/// Builds one `<task>` element under `parent`.
///
/// The task's attributes come from the `attrs` entry, defaulting `name`
/// to the key-derived name. A `jobname` entry equal to the key-derived
/// name is appended to the body, then one task-local template pass runs
/// over the specification (context: the specification itself plus the
/// environment). Remaining entries emit children in specification
/// order.
pub fn build_task(
    name: &str,
    spec: &Value,
    parent: &mut Element,
    resolver: &TemplateResolver,
) -> Result<()> {
    let scope = format!("task '{}'", name);
    let Some(spec) = spec.as_mapping() else {
        return Err(Error::malformed(scope, "a mapping"));
    };

    let mut spec = spec.clone();
    spec.insert(
        Value::String("jobname".to_string()),
        Value::String(name.to_string()),
    );

    let mut spec_value = Value::Mapping(spec);
    resolver.resolve_once(&mut spec_value);
    let Some(spec) = spec_value.as_mapping() else {
        return Err(Error::malformed(scope, "a mapping"));
    };

    let mut task = Element::new("task");
    let mut named = false;
    if let Some(attrs) = spec.get("attrs").and_then(Value::as_mapping) {
        for (attr_name, attr_value) in attrs {
            let attr_name = scalar_to_string(attr_name);
            named = named || attr_name == "name";
            task.set_attr(attr_name, scalar_to_string(attr_value));
        }
    }
    if !named {
        task.set_attr("name", name);
    }

    for (key, value) in spec {
        let Some(key) = key.as_str() else {
            warn!("Ignoring non-string key {:?} in {}", key, scope);
            continue;
        };

        match key {
            "attrs" => {}
            "envars" => build_envars(value, &mut task, &scope)?,
            "entities" => build_entities(value, &mut task),
            "dependency" => {
                if !value.is_mapping() {
                    return Err(Error::malformed(
                        format!("dependency of {}", scope),
                        "a mapping of dependency nodes",
                    ));
                }
                let mut dependency = Element::new("dependency");
                build_dependency_tree(value, &mut dependency);
                task.push_child(dependency);
            }
            other => {
                let mut child = Element::new(other);
                attach_content(&mut child, value);
                task.push_child(child);
            }
        }
    }

    debug!("Built task '{}'", task.attr("name").unwrap_or(name));
    parent.push_child(task);
    Ok(())
}

/// Emits one `<envar>` child per entry, each carrying `<name>` and
/// `<value>` sub-elements, in mapping order.
fn build_envars(value: &Value, task: &mut Element, scope: &str) -> Result<()> {
    let Some(envars) = value.as_mapping() else {
        return Err(Error::malformed(
            format!("envars of {}", scope),
            "a mapping of variable names to values",
        ));
    };

    for (var, var_value) in envars {
        let mut envar = Element::new("envar");

        let mut name = Element::new("name");
        name.push_text(scalar_to_string(var));
        envar.push_child(name);

        let mut val = Element::new("value");
        attach_content(&mut val, var_value);
        envar.push_child(val);

        task.push_child(envar);
    }

    Ok(())
}

/// Appends raw entity-reference children to the task body.
fn build_entities(value: &Value, task: &mut Element) {
    match value.as_sequence() {
        Some(entities) => {
            for entity in entities {
                attach_content(task, entity);
            }
        }
        None => attach_content(task, value),
    }
}

/// Builds one `<metatask>` element under `parent`.
///
/// The required `var` mapping emits one `<var name="...">` child per
/// loop variable, carrying the scheduler-native multi-value string
/// verbatim; instance expansion is delegated downstream. The remaining
/// body dispatches through [`build_task_elements`], so metatasks nest.
pub fn build_metatask(
    name: &str,
    spec: &Value,
    parent: &mut Element,
    resolver: &TemplateResolver,
) -> Result<()> {
    let scope = format!("metatask '{}'", name);
    let Some(spec) = spec.as_mapping() else {
        return Err(Error::malformed(scope, "a mapping"));
    };

    let mut metatask = Element::new("metatask");
    if let Some(attrs) = spec.get("attrs").and_then(Value::as_mapping) {
        for (attr_name, attr_value) in attrs {
            let attr_name = scalar_to_string(attr_name);
            if attr_name == "name" {
                continue;
            }
            metatask.set_attr(attr_name, scalar_to_string(attr_value));
        }
    }
    metatask.set_attr("name", name);

    let vars = spec
        .get("var")
        .ok_or_else(|| Error::missing("var", scope.clone()))?
        .as_mapping()
        .ok_or_else(|| Error::malformed(format!("var of {}", scope), "a mapping"))?;

    for (var_name, var_values) in vars {
        let mut var = Element::new("var");
        var.set_attr("name", scalar_to_string(var_name));
        var.push_text(scalar_to_string(var_values));
        metatask.push_child(var);
    }

    // The rest of the body is ordinary task content nested under this
    // metatask.
    let mut body = Mapping::new();
    for (key, value) in spec {
        if key.as_str() == Some("attrs") || key.as_str() == Some("var") {
            continue;
        }
        body.insert(key.clone(), value.clone());
    }
    build_task_elements(&body, &mut metatask, resolver, &scope)?;

    debug!("Built metatask '{}'", name);
    parent.push_child(metatask);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolver() -> TemplateResolver {
        TemplateResolver::new(HashMap::new())
    }

    fn build_tasks(yaml: &str) -> Result<Element> {
        let specs: Value = serde_yaml::from_str(yaml).unwrap();
        let mut parent = Element::new("workflow");
        build_task_elements(
            specs.as_mapping().unwrap(),
            &mut parent,
            &resolver(),
            "workflow",
        )?;
        Ok(parent)
    }

    #[test]
    fn test_task_name_defaults_to_key() {
        let parent = build_tasks("task_run_model:\n  command: run.sh\n").unwrap();
        let task = parent.find("task").unwrap();
        assert_eq!(task.attr("name"), Some("run_model"));
    }

    #[test]
    fn test_task_attrs_name_takes_precedence() {
        let parent = build_tasks(
            "task_run_model:\n  attrs:\n    name: run_model_alt\n  command: run.sh\n",
        )
        .unwrap();
        let task = parent.find("task").unwrap();
        assert_eq!(task.attr("name"), Some("run_model_alt"));
    }

    #[test]
    fn test_task_attrs_pass_through() {
        let parent = build_tasks(
            "task_run_model:\n  attrs:\n    cycledefs: prod\n    maxtries: 2\n  command: run.sh\n",
        )
        .unwrap();
        let task = parent.find("task").unwrap();
        assert_eq!(task.attr("cycledefs"), Some("prod"));
        assert_eq!(task.attr("maxtries"), Some("2"));
    }

    #[test]
    fn test_jobname_appended_to_body() {
        let parent = build_tasks("task_run_model:\n  command: run.sh\n").unwrap();
        let task = parent.find("task").unwrap();

        let children = task.child_elements();
        let last = children.last().unwrap();
        assert_eq!(last.name, "jobname");
        assert_eq!(last.text(), "run_model");
    }

    #[test]
    fn test_envars_count_and_order() {
        let parent = build_tasks(
            "task_t:\n  envars:\n    CDATE: '2025010100'\n    MEMBER: '001'\n    RUN: prod\n",
        )
        .unwrap();
        let task = parent.find("task").unwrap();

        let envars = task.find_all("envar");
        assert_eq!(envars.len(), 3);
        let names: Vec<String> = envars
            .iter()
            .map(|e| e.find("name").unwrap().text())
            .collect();
        assert_eq!(names, vec!["CDATE", "MEMBER", "RUN"]);
        assert_eq!(envars[0].find("value").unwrap().text(), "2025010100");
    }

    #[test]
    fn test_envars_require_mapping() {
        let result = build_tasks("task_t:\n  envars: not-a-mapping\n");
        assert!(matches!(result, Err(Error::MalformedSpec { .. })));
    }

    #[test]
    fn test_entities_append_text_children() {
        let parent = build_tasks("task_t:\n  entities:\n    - '&account;'\n    - '&queue;'\n").unwrap();
        let task = parent.find("task").unwrap();
        assert_eq!(task.text(), "&account;&queue;");
    }

    #[test]
    fn test_dependency_subtree() {
        let parent = build_tasks(
            "task_t:\n  dependency:\n    taskdep:\n      attrs:\n        task: prep\n",
        )
        .unwrap();
        let task = parent.find("task").unwrap();

        let dependency = task.find("dependency").unwrap();
        let taskdep = dependency.find("taskdep").unwrap();
        assert_eq!(taskdep.attr("task"), Some("prep"));
    }

    #[test]
    fn test_dependency_requires_mapping() {
        let result = build_tasks("task_t:\n  dependency: prep\n");
        assert!(matches!(result, Err(Error::MalformedSpec { .. })));
    }

    #[test]
    fn test_simple_keys_become_child_elements() {
        let parent = build_tasks(
            "task_t:\n  command: run.sh\n  walltime: '00:30:00'\n  nodes: 4\n",
        )
        .unwrap();
        let task = parent.find("task").unwrap();

        assert_eq!(task.find("command").unwrap().text(), "run.sh");
        assert_eq!(task.find("walltime").unwrap().text(), "00:30:00");
        assert_eq!(task.find("nodes").unwrap().text(), "4");
    }

    #[test]
    fn test_children_follow_spec_order() {
        let parent = build_tasks(
            "task_t:\n  walltime: '00:30:00'\n  command: run.sh\n  nodes: 4\n",
        )
        .unwrap();
        let task = parent.find("task").unwrap();

        let names: Vec<&str> = task
            .child_elements()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["walltime", "command", "nodes", "jobname"]);
    }

    #[test]
    fn test_task_local_template_resolution() {
        let parent = build_tasks(
            "task_t:\n  member: '001'\n  command: \"run.sh {{ member }}\"\n",
        )
        .unwrap();
        let task = parent.find("task").unwrap();
        assert_eq!(task.find("command").unwrap().text(), "run.sh 001");
    }

    #[test]
    fn test_metatask_requires_var() {
        let result = build_tasks("metatask_ens:\n  task_member:\n    command: run.sh\n");
        match result {
            Err(Error::MissingField { field, scope }) => {
                assert_eq!(field, "var");
                assert!(scope.contains("ens"));
            }
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_metatask_var_elements() {
        let parent = build_tasks(
            "metatask_ens:\n  var:\n    member: '001 002 003'\n    grid: 'a b c'\n  task_run:\n    command: \"run.sh #member#\"\n",
        )
        .unwrap();
        let metatask = parent.find("metatask").unwrap();
        assert_eq!(metatask.attr("name"), Some("ens"));

        let vars = metatask.find_all("var");
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].attr("name"), Some("member"));
        assert_eq!(vars[0].text(), "001 002 003");
        assert_eq!(vars[1].attr("name"), Some("grid"));
    }

    #[test]
    fn test_metatask_nests_tasks() {
        let parent = build_tasks(
            "metatask_ens:\n  var:\n    member: '001 002'\n  task_run:\n    command: run.sh\n",
        )
        .unwrap();
        let metatask = parent.find("metatask").unwrap();
        let task = metatask.find("task").unwrap();
        assert_eq!(task.attr("name"), Some("run"));
    }

    #[test]
    fn test_metatask_nests_metatasks() {
        let parent = build_tasks(
            "metatask_outer:\n  var:\n    grid: 'a b'\n  metatask_inner:\n    var:\n      member: '001 002'\n    task_run:\n      command: run.sh\n",
        )
        .unwrap();
        let outer = parent.find("metatask").unwrap();
        let inner = outer.find("metatask").unwrap();
        assert_eq!(inner.attr("name"), Some("inner"));
        assert!(inner.find("task").is_some());
    }

    #[test]
    fn test_duplicate_task_names_fatal() {
        let result = build_tasks(
            "task_a:\n  command: one.sh\ntask_b:\n  attrs:\n    name: a\n  command: two.sh\n",
        );
        match result {
            Err(Error::DuplicateName { name, .. }) => assert_eq!(name, "a"),
            other => panic!("expected DuplicateName, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_discriminator_skipped() {
        let parent = build_tasks("chore_cleanup:\n  command: rm.sh\ntask_t:\n  command: run.sh\n")
            .unwrap();
        assert_eq!(parent.find_all("task").len(), 1);
        assert!(parent.find("chore").is_none());
    }

    #[test]
    fn test_sibling_order_preserved() {
        let parent = build_tasks(
            "task_a:\n  command: a.sh\nmetatask_b:\n  var:\n    m: '1'\ntask_c:\n  command: c.sh\n",
        )
        .unwrap();

        let names: Vec<&str> = parent
            .child_elements()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["task", "metatask", "task"]);
        assert_eq!(parent.child_elements()[0].attr("name"), Some("a"));
        assert_eq!(parent.child_elements()[1].attr("name"), Some("b"));
        assert_eq!(parent.child_elements()[2].attr("name"), Some("c"));
    }
}
