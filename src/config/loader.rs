//! Configuration Loader
//!
//! Reads a workflow configuration from a YAML file and normalizes the
//! custom tags the configuration dialect supports:
//!
//! - `!include [a.yml, b.yml]` merges the referenced files into a single
//!   mapping, later files winning on key collisions
//! - `!startstopfreq [start, stop, step]` collapses into the single
//!   space-separated schedule string the scheduler expects
//! - `!cycstr {value: ..., attr: ...}` is left in the tree as a tagged
//!   node; the tree builders turn it into a structured `<cyclestr>`
//!   element at build time

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde_yaml::{Mapping, Value};

use crate::config::scalar_to_string;
use crate::error::{Error, Result};

/// Loads a workflow configuration from a YAML file.
///
/// Parses the file and normalizes custom tags. Include paths are resolved
/// relative to the including file's directory.
///
/// # Example
///
/// ```rust,no_run
/// use cyclegen::config::load_config;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("workflow.yml")?;
///     assert!(config.get("workflow").is_some());
///     Ok(())
/// }
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let text = fs::read_to_string(path)?;
    debug!("Configuration loaded ({} bytes)", text.len());

    let mut value: Value = serde_yaml::from_str(&text)?;
    normalize_tags(&mut value, path.parent())?;

    Ok(value)
}

/// Walks the configuration and rewrites `!include` and `!startstopfreq`
/// nodes in place. `!cycstr` nodes survive untouched for the builders.
fn normalize_tags(value: &mut Value, base: Option<&Path>) -> Result<()> {
    let replacement = match value {
        Value::Tagged(tagged) if tagged.tag == "include" => {
            Some(merge_includes(&tagged.value, base)?)
        }
        Value::Tagged(tagged) if tagged.tag == "startstopfreq" => {
            Some(Value::String(join_schedule(&tagged.value)?))
        }
        _ => None,
    };

    if let Some(new_value) = replacement {
        *value = new_value;
        return Ok(());
    }

    match value {
        Value::Mapping(map) => {
            for (_, entry) in map.iter_mut() {
                normalize_tags(entry, base)?;
            }
        }
        Value::Sequence(seq) => {
            for entry in seq.iter_mut() {
                normalize_tags(entry, base)?;
            }
        }
        Value::Tagged(tagged) => normalize_tags(&mut tagged.value, base)?,
        _ => {}
    }

    Ok(())
}

/// Loads every file named by an `!include` sequence and merges the
/// resulting mappings left to right.
fn merge_includes(value: &Value, base: Option<&Path>) -> Result<Value> {
    let paths = value
        .as_sequence()
        .ok_or_else(|| Error::malformed("!include", "a sequence of file paths"))?;

    let mut merged = Mapping::new();
    for entry in paths {
        let name = entry
            .as_str()
            .ok_or_else(|| Error::malformed("!include", "a sequence of file paths"))?;

        let resolved = match base {
            Some(dir) => dir.join(name),
            None => Path::new(name).to_path_buf(),
        };

        debug!("Including configuration file: {}", resolved.display());
        let included = load_config(&resolved)?;
        let map = included
            .as_mapping()
            .ok_or_else(|| Error::malformed(name, "an included file containing a mapping"))?;

        for (key, entry) in map {
            merged.insert(key.clone(), entry.clone());
        }
    }

    Ok(Value::Mapping(merged))
}

/// Joins the items of a `!startstopfreq` sequence into one schedule string.
fn join_schedule(value: &Value) -> Result<String> {
    let items = value
        .as_sequence()
        .ok_or_else(|| Error::malformed("!startstopfreq", "a sequence of schedule fields"))?;

    Ok(items
        .iter()
        .map(scalar_to_string)
        .collect::<Vec<_>>()
        .join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/path/workflow.yml");
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_yaml() {
        let temp = tempdir().unwrap();
        let path = write_config(temp.path(), "bad.yml", "not: valid: yaml: [[[");

        let result = load_config(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_config_plain_mapping() {
        let temp = tempdir().unwrap();
        let path = write_config(
            temp.path(),
            "wf.yml",
            "workflow:\n  log: /logs/wf.log\n",
        );

        let config = load_config(&path).unwrap();
        assert_eq!(
            config["workflow"]["log"].as_str(),
            Some("/logs/wf.log")
        );
    }

    #[test]
    fn test_startstopfreq_joins_fields() {
        let temp = tempdir().unwrap();
        let path = write_config(
            temp.path(),
            "wf.yml",
            "dates: !startstopfreq [202501010000, 202501020000, '06:00:00']\n",
        );

        let config = load_config(&path).unwrap();
        assert_eq!(
            config["dates"].as_str(),
            Some("202501010000 202501020000 06:00:00")
        );
    }

    #[test]
    fn test_include_merges_files() {
        let temp = tempdir().unwrap();
        write_config(temp.path(), "base.yml", "alpha: 1\nshared: base\n");
        write_config(temp.path(), "site.yml", "shared: site\nbeta: 2\n");
        let path = write_config(
            temp.path(),
            "wf.yml",
            "settings: !include [base.yml, site.yml]\n",
        );

        let config = load_config(&path).unwrap();
        let settings = config["settings"].as_mapping().unwrap();
        assert_eq!(settings.get("alpha").unwrap().as_i64(), Some(1));
        assert_eq!(settings.get("beta").unwrap().as_i64(), Some(2));
        // Later includes win on collision
        assert_eq!(settings.get("shared").unwrap().as_str(), Some("site"));
    }

    #[test]
    fn test_include_requires_sequence() {
        let temp = tempdir().unwrap();
        let path = write_config(temp.path(), "wf.yml", "settings: !include base.yml\n");

        let result = load_config(&path);
        assert!(matches!(result, Err(Error::MalformedSpec { .. })));
    }

    #[test]
    fn test_cycstr_survives_as_tagged() {
        let temp = tempdir().unwrap();
        let path = write_config(
            temp.path(),
            "wf.yml",
            "log: !cycstr\n  value: /logs/@Y@m@d.log\n  offset: '-06:00'\n",
        );

        let config = load_config(&path).unwrap();
        match &config["log"] {
            Value::Tagged(tagged) => {
                assert!(tagged.tag == "cycstr");
                assert_eq!(
                    tagged.value["value"].as_str(),
                    Some("/logs/@Y@m@d.log")
                );
            }
            other => panic!("expected tagged value, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_tags_normalize() {
        let temp = tempdir().unwrap();
        write_config(temp.path(), "cycles.yml", "dates: !startstopfreq [a, b, c]\n");
        let path = write_config(
            temp.path(),
            "wf.yml",
            "cycledefs:\n  prod: !include [cycles.yml]\n",
        );

        let config = load_config(&path).unwrap();
        assert_eq!(
            config["cycledefs"]["prod"]["dates"].as_str(),
            Some("a b c")
        );
    }
}
