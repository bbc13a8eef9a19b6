//! Template Expression Resolution
//!
//! Configuration values may embed deferred expressions in two forms:
//!
//! - `{{ ... }}` inline expressions, resolved independently of the
//!   literal text around them
//! - `{% ... %}` block expressions, treated as one atomic template
//!   spanning the whole string
//!
//! Expressions render against the configuration document itself plus a
//! read-only snapshot of the process environment exposed under the `env`
//! namespace. An expression that references a name not yet present in
//! the context is left in place verbatim and never fails the run: such
//! values are intentionally deferred for a later, cycle-aware consumer.
//!
//! The public entry point runs exactly two full passes. Values filled in
//! by the first pass are visible to the second, which catches one level
//! of sibling chaining. This is a bounded-iteration policy, not
//! fixed-point evaluation.

use std::collections::HashMap;

use handlebars::{Context, Handlebars, Helper, HelperResult, JsonRender, Output, RenderContext};
use log::debug;
use once_cell::sync::Lazy;
use serde_json::Value as Json;
use serde_yaml::Value;

/// Shared template registry. Strict mode makes an unresolvable reference
/// a render error, which is what lets the resolver keep the source text;
/// escaping is disabled because the output is not HTML.
static REGISTRY: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry.register_escape_fn(handlebars::no_escape);
    registry.register_helper("path_join", Box::new(path_join));
    registry
});

/// Joins its arguments with `/` into a single path string.
fn path_join(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let parts: Vec<String> = h.params().iter().map(|p| p.value().render()).collect();
    out.write(&parts.join("/"))?;
    Ok(())
}

/// A string split into literal fragments and inline expressions.
#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Expression(&'a str),
}

/// Resolves deferred template expressions inside a configuration tree.
///
/// The environment snapshot is taken at construction time and merged
/// into every substitution context; templates never read ambient global
/// state.
pub struct TemplateResolver {
    env: HashMap<String, String>,
}

impl TemplateResolver {
    /// Creates a resolver with an explicit environment map.
    pub fn new(env: HashMap<String, String>) -> Self {
        Self { env }
    }

    /// Creates a resolver from a snapshot of the process environment.
    pub fn from_env() -> Self {
        Self::new(std::env::vars().collect())
    }

    /// Runs the bounded two-pass resolution over a configuration tree,
    /// mutating it in place.
    ///
    /// The second pass sees every value the first pass filled in, so a
    /// value referencing a sibling that was itself templated resolves as
    /// long as the chain is one level deep.
    pub fn resolve(&self, value: &mut Value) {
        self.resolve_once(value);
        self.resolve_once(value);
    }

    /// Runs one full resolution pass over a tree, using the tree itself
    /// (plus the environment) as the substitution context.
    pub fn resolve_once(&self, value: &mut Value) {
        let context = self.build_context(value);
        resolve_node(value, &context);
    }

    /// Builds the substitution context: the tree converted to JSON with
    /// the environment snapshot under `env`.
    fn build_context(&self, value: &Value) -> Json {
        let mut map = match yaml_to_json(value) {
            Json::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        let env: serde_json::Map<String, Json> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), Json::String(v.clone())))
            .collect();
        map.insert("env".to_string(), Json::Object(env));

        Json::Object(map)
    }
}

/// Recursively resolves every scalar string in a subtree. Mapping keys
/// are never evaluated; tagged values are reached through their content.
fn resolve_node(value: &mut Value, context: &Json) {
    match value {
        Value::Mapping(map) => {
            for (_, entry) in map.iter_mut() {
                resolve_node(entry, context);
            }
        }
        Value::Sequence(seq) => {
            for entry in seq.iter_mut() {
                resolve_node(entry, context);
            }
        }
        Value::Tagged(tagged) => resolve_node(&mut tagged.value, context),
        Value::String(text) => {
            if let Some(resolved) = resolve_string(text, context) {
                *text = resolved;
            }
        }
        _ => {}
    }
}

/// Resolves one scalar string. Returns `None` when the string holds no
/// template syntax at all.
fn resolve_string(text: &str, context: &Json) -> Option<String> {
    // Block-style expressions span the whole string and render (or are
    // preserved) as one atomic template.
    if text.contains("{%") {
        return match REGISTRY.render_template(text, context) {
            Ok(rendered) => Some(rendered),
            Err(err) => {
                debug!("Preserving block template '{}': {}", text, err);
                None
            }
        };
    }

    if !text.contains("{{") {
        return None;
    }

    let mut result = String::with_capacity(text.len());
    for segment in split_inline(text) {
        match segment {
            Segment::Literal(literal) => result.push_str(literal),
            Segment::Expression(expr) => match REGISTRY.render_template(expr, context) {
                Ok(rendered) => result.push_str(&rendered),
                Err(err) => {
                    debug!("Unresolved expression '{}': {}", expr, err);
                    result.push_str(expr);
                }
            },
        }
    }

    Some(result)
}

/// Splits a string into literal fragments and `{{ ... }}` expressions,
/// preserving every byte in original order. An unterminated opener is
/// literal text.
fn split_inline(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start..].find("}}") else {
            break;
        };
        let end = start + end + 2;

        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        segments.push(Segment::Expression(&rest[start..end]));
        rest = &rest[end..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }

    segments
}

/// Converts a configuration value into the JSON shape the template
/// engine renders against. Tagged values contribute their content;
/// non-string mapping keys are stringified.
fn yaml_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Json::from(i)
            } else if let Some(u) = n.as_u64() {
                Json::from(u)
            } else {
                n.as_f64().map(Json::from).unwrap_or(Json::Null)
            }
        }
        Value::String(s) => Json::String(s.clone()),
        Value::Sequence(seq) => Json::Array(seq.iter().map(yaml_to_json).collect()),
        Value::Mapping(map) => {
            let object = map
                .iter()
                .map(|(k, v)| (crate::config::scalar_to_string(k), yaml_to_json(v)))
                .collect();
            Json::Object(object)
        }
        Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}
