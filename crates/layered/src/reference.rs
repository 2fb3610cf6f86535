//! Reference values and their resolution
//!
//! A configuration value can point at another path instead of holding a
//! literal. Both the historical sigil strings and explicit YAML tags parse
//! into the same [`Reference`] union:
//!
//! | Sigil form         | Tag form            | Variant                      |
//! |--------------------|---------------------|------------------------------|
//! | `@a.b`             | `!ref a.b`          | [`Reference::Simple`]        |
//! | `x={@a.b}`         | `!template "x={@a.b}"` | [`Reference::Template`]   |
//! | `*$@a.b`           | `!secret a.b`       | [`Reference::Secret`]        |
//! | `*@a.b`            |                     | [`Reference::Unsupported`]   |
//! | anything else      | `!literal "@a.b"`   | [`Reference::Literal`]       |

use crate::error::{ConfigError, Result};
use regex::Regex;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Prefix of secret-file references
pub const SECRET_PREFIX: &str = "*$@";

/// Prefix of the rejected `*@` form
pub const UNSUPPORTED_PREFIX: &str = "*@";

/// Config key holding the name of the environment variable that points at
/// the secrets directory
pub const SECRETS_DIR_ENV_KEY: &str = "secrets.dir.env_key";

/// Longest reference chain followed before giving up
pub const MAX_REFERENCE_DEPTH: usize = 32;

static TEMPLATE_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{@(.*?)\}").expect("template fragment pattern is valid"));

/// A configuration value, classified
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// A plain value, returned as-is
    Literal(Value),
    /// Whole value replaced by the value at the path
    Simple(String),
    /// String with embedded `{@path}` fragments
    Template(Vec<TemplatePart>),
    /// File in the secrets directory, named by the value at the path
    Secret(String),
    /// `*@` form, always rejected
    Unsupported(String),
}

/// Piece of a template reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Text(String),
    Path(String),
}

impl Reference {
    /// Classify a raw document value
    pub fn classify(value: &Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(classify_str(text)),
            Value::Tagged(tagged) => {
                let tag = tagged.tag.to_string();
                let tag = tag.trim_start_matches('!');
                match tag {
                    "literal" => Ok(Self::Literal(tagged.value.clone())),
                    "ref" | "template" | "secret" => {
                        let Value::String(text) = &tagged.value else {
                            return Err(ConfigError::InvalidReference {
                                tag: tag.to_string(),
                            });
                        };
                        Ok(match tag {
                            "ref" => Self::Simple(text.clone()),
                            "template" => Self::Template(parse_template(text)),
                            _ => Self::Secret(text.clone()),
                        })
                    }
                    _ => Ok(Self::Literal(value.clone())),
                }
            }
            _ => Ok(Self::Literal(value.clone())),
        }
    }

    /// Whether the raw value is a secret reference (its value must not be logged)
    pub fn looks_secret(value: &Value) -> bool {
        matches!(Self::classify(value), Ok(Self::Secret(_)))
    }
}

fn classify_str(text: &str) -> Reference {
    if let Some(path) = text.strip_prefix(SECRET_PREFIX) {
        Reference::Secret(path.to_string())
    } else if text.starts_with(UNSUPPORTED_PREFIX) {
        Reference::Unsupported(text.to_string())
    } else if let Some(path) = text.strip_prefix('@') {
        Reference::Simple(path.to_string())
    } else if TEMPLATE_FRAGMENT.is_match(text) {
        Reference::Template(parse_template(text))
    } else {
        Reference::Literal(Value::String(text.to_string()))
    }
}

/// Split a template string into text and `{@path}` fragments
pub fn parse_template(text: &str) -> Vec<TemplatePart> {
    let mut parts = Vec::new();
    let mut last = 0;

    for caps in TEMPLATE_FRAGMENT.captures_iter(text) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            parts.push(TemplatePart::Text(text[last..whole.start()].to_string()));
        }
        parts.push(TemplatePart::Path(path.as_str().to_string()));
        last = whole.end();
    }

    if last < text.len() {
        parts.push(TemplatePart::Text(text[last..].to_string()));
    }
    parts
}

/// Render a value the way it appears in logs, audit lines and templates
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}

/// What the resolver needs from the configuration it resolves against
pub trait Lookup {
    /// Non-secret read of `path`, following references, at the given chain depth
    fn resolve_path(&self, path: &str, depth: usize) -> Result<Value>;
}

/// Recursive-descent resolver for one value
pub struct ReferenceResolver<'a, L: Lookup + ?Sized> {
    lookup: &'a L,
    handled_secretly: bool,
    depth: usize,
}

impl<'a, L: Lookup + ?Sized> ReferenceResolver<'a, L> {
    pub fn new(lookup: &'a L, handled_secretly: bool, depth: usize) -> Self {
        Self {
            lookup,
            handled_secretly,
            depth,
        }
    }

    /// Resolve a raw value into an owned, reference-free value
    pub fn resolve(&self, raw: &Value) -> Result<Value> {
        match Reference::classify(raw)? {
            Reference::Literal(value) => Ok(value),
            Reference::Unsupported(reference) => {
                log::error!("resolve_reference: '*@' references are not supported --> {reference}");
                Err(ConfigError::UnsupportedReference { reference })
            }
            Reference::Secret(path) => self.resolve_secret(raw, &path),
            Reference::Simple(path) => {
                let value = self.lookup.resolve_path(&path, self.depth + 1)?;
                if !self.handled_secretly {
                    log::info!(
                        "resolve_reference: {} ==> '{}'",
                        render_value(raw),
                        render_value(&value)
                    );
                }
                Ok(value)
            }
            Reference::Template(parts) => {
                let value = Value::String(self.render_template(&parts)?);
                if !self.handled_secretly {
                    log::info!(
                        "resolve_reference: {} ==> '{}'",
                        render_value(raw),
                        render_value(&value)
                    );
                }
                Ok(value)
            }
        }
    }

    fn render_template(&self, parts: &[TemplatePart]) -> Result<String> {
        let mut resolved: BTreeMap<&str, String> = BTreeMap::new();
        let mut out = String::new();

        for part in parts {
            match part {
                TemplatePart::Text(text) => out.push_str(text),
                TemplatePart::Path(path) => {
                    if !resolved.contains_key(path.as_str()) {
                        let value = self.lookup.resolve_path(path, self.depth + 1)?;
                        resolved.insert(path, render_value(&value));
                    }
                    out.push_str(&resolved[path.as_str()]);
                }
            }
        }
        Ok(out)
    }

    fn resolve_secret(&self, raw: &Value, path: &str) -> Result<Value> {
        if !self.handled_secretly {
            let reference = render_value(raw);
            log::error!(
                "{reference} is a secret dereference, but the read was not declared secret-handled. Aborting"
            );
            return Err(ConfigError::SecretNotHandled { reference });
        }

        let filename = render_value(&self.lookup.resolve_path(path, self.depth + 1)?);
        let var = render_value(
            &self
                .lookup
                .resolve_path(SECRETS_DIR_ENV_KEY, self.depth + 1)?,
        );
        let dir = std::env::var(&var).map_err(|_| ConfigError::SecretDirUnset { var })?;

        let secret_path = PathBuf::from(dir).join(filename);
        let content = std::fs::read_to_string(&secret_path).map_err(|source| ConfigError::Read {
            path: secret_path,
            source,
        })?;

        Ok(Value::String(content.trim().to_string()))
    }
}
