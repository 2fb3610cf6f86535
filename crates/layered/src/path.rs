//! JSONPath-like addressing inside the configuration document
//!
//! Supported forms: `a.b`, `a[0]`, `ci_presets["name"]`, `ci_presets['name']`,
//! `$` (the root) and `$.a.b`. Wildcards and filters are not supported.

use crate::error::{ConfigError, Result};
use serde_yaml::Value;
use std::fmt;

/// One step of a [`ConfigPath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Mapping key
    Key(String),
    /// Sequence index
    Index(usize),
}

/// A parsed configuration path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigPath {
    text: String,
    segments: Vec<Segment>,
}

impl ConfigPath {
    /// Parse a path expression
    pub fn parse(text: &str) -> Result<Self> {
        let segments = parse_segments(text).map_err(|reason| ConfigError::InvalidPath {
            path: text.to_string(),
            reason,
        })?;

        Ok(Self {
            text: text.trim().to_string(),
            segments,
        })
    }

    /// The document root (`$`)
    pub fn root() -> Self {
        Self {
            text: "$".to_string(),
            segments: Vec::new(),
        }
    }

    /// The path as written
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The key when the path names a single top-level mapping entry
    pub fn top_level_key(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Key(key)] => Some(key),
            _ => None,
        }
    }

    /// Find the value at this path
    pub fn lookup<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Mapping(map)) => map.get(key.as_str())?,
                (Segment::Index(index), Value::Sequence(seq)) => seq.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Find the value at this path, mutably
    pub fn lookup_mut<'v>(&self, root: &'v mut Value) -> Option<&'v mut Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Mapping(map)) => map.get_mut(key.as_str())?,
                (Segment::Index(index), Value::Sequence(seq)) => seq.get_mut(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Insert a new mapping entry at this path.
    ///
    /// The parent must exist and be a mapping, and the last segment must be
    /// a key. Existing entries are overwritten.
    pub fn insert(&self, root: &mut Value, value: Value) -> Result<()> {
        let Some((Segment::Key(key), parent_segments)) = self.segments.split_last() else {
            return Err(ConfigError::InvalidPath {
                path: self.text.clone(),
                reason: "only mapping keys can be created".to_string(),
            });
        };

        let parent = Self {
            text: String::new(),
            segments: parent_segments.to_vec(),
        };

        match parent.lookup_mut(root) {
            Some(Value::Mapping(map)) => {
                map.insert(Value::String(key.clone()), value);
                Ok(())
            }
            _ => Err(ConfigError::KeyNotFound {
                path: self.text.clone(),
                file: None,
            }),
        }
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn parse_segments(text: &str) -> std::result::Result<Vec<Segment>, String> {
    let mut rest = text.trim();
    if rest.is_empty() {
        return Err("empty path".to_string());
    }

    if let Some(after) = rest.strip_prefix('$') {
        rest = after;
        if rest.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(after) = rest.strip_prefix('.') {
            rest = after;
        } else if !rest.starts_with('[') {
            return Err("expected '.' or '[' after '$'".to_string());
        }
    }

    let mut segments = Vec::new();
    loop {
        if rest.is_empty() {
            return Err("path ends with a separator".to_string());
        }

        if let Some(after) = rest.strip_prefix('[') {
            let (segment, remaining) = parse_bracket(after)?;
            segments.push(segment);
            rest = remaining;
        } else {
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            let key = &rest[..end];
            if key.is_empty() {
                return Err("empty key".to_string());
            }
            if key.contains([']', '"', '\'']) {
                return Err(format!("unexpected character in key '{key}'"));
            }
            segments.push(Segment::Key(key.to_string()));
            rest = &rest[end..];
        }

        if rest.is_empty() {
            return Ok(segments);
        }
        if let Some(after) = rest.strip_prefix('.') {
            rest = after;
        } else if !rest.starts_with('[') {
            return Err(format!("unexpected '{rest}'"));
        }
    }
}

fn parse_bracket(after_open: &str) -> std::result::Result<(Segment, &str), String> {
    let first = after_open
        .chars()
        .next()
        .ok_or_else(|| "unterminated '['".to_string())?;

    if first == '"' || first == '\'' {
        let body = &after_open[1..];
        let close = body
            .find(first)
            .ok_or_else(|| "unterminated quoted key".to_string())?;
        let key = &body[..close];
        let remaining = body[close + 1..]
            .strip_prefix(']')
            .ok_or_else(|| "expected ']' after quoted key".to_string())?;
        return Ok((Segment::Key(key.to_string()), remaining));
    }

    let close = after_open
        .find(']')
        .ok_or_else(|| "unterminated '['".to_string())?;
    let inner = after_open[..close].trim();
    if inner == "*" {
        return Err("wildcards are not supported".to_string());
    }
    let index = inner
        .parse::<usize>()
        .map_err(|_| format!("invalid index '{inner}'"))?;
    Ok((Segment::Index(index), &after_open[close + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Value {
        serde_yaml::from_str(
            r#"
a:
  b: 1
  list: [x, y, {z: 3}]
ci_presets:
  "light.profile":
    a.b: 2
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_dotted() {
        let path = ConfigPath::parse("a.b.c").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Key("c".into())
            ]
        );
    }

    #[test]
    fn test_parse_brackets() {
        let path = ConfigPath::parse(r#"ci_presets["light.profile"]"#).unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("ci_presets".into()),
                Segment::Key("light.profile".into())
            ]
        );

        let path = ConfigPath::parse("a.list[2].z").unwrap();
        assert_eq!(path.segments()[2], Segment::Index(2));
        assert_eq!(path.segments()[3], Segment::Key("z".into()));

        let path = ConfigPath::parse("a['b']").unwrap();
        assert_eq!(path.segments()[1], Segment::Key("b".into()));
    }

    #[test]
    fn test_parse_root_forms() {
        assert!(ConfigPath::parse("$").unwrap().is_root());
        assert_eq!(ConfigPath::parse("$.a.b").unwrap().segments().len(), 2);
        assert_eq!(ConfigPath::parse("$['a']").unwrap().segments().len(), 1);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "a.", "a..b", ".a", "a[", "a[x]", "a[*]", "a['b'", "a[0]b", "$a"] {
            assert!(ConfigPath::parse(bad).is_err(), "expected error for {bad:?}");
        }
    }

    #[test]
    fn test_lookup() {
        let doc = doc();
        let get = |p: &str| ConfigPath::parse(p).unwrap().lookup(&doc).cloned();

        assert_eq!(get("a.b"), Some(Value::from(1)));
        assert_eq!(get("a.list[1]"), Some(Value::from("y")));
        assert_eq!(get("a.list[2].z"), Some(Value::from(3)));
        assert_eq!(get(r#"ci_presets["light.profile"]["a.b"]"#), Some(Value::from(2)));
        assert_eq!(get("a.missing"), None);
        assert_eq!(get("a.b.c"), None);
        assert_eq!(get("a.list[9]"), None);
    }

    #[test]
    fn test_top_level_key() {
        assert_eq!(ConfigPath::parse("name").unwrap().top_level_key(), Some("name"));
        assert_eq!(ConfigPath::parse("a.b").unwrap().top_level_key(), None);
        assert_eq!(ConfigPath::parse("a[0]").unwrap().top_level_key(), None);
    }

    #[test]
    fn test_insert() {
        let mut doc = doc();
        ConfigPath::parse("a.new")
            .unwrap()
            .insert(&mut doc, Value::from(true))
            .unwrap();
        assert_eq!(
            ConfigPath::parse("a.new").unwrap().lookup(&doc),
            Some(&Value::from(true))
        );

        assert!(ConfigPath::parse("nope.child")
            .unwrap()
            .insert(&mut doc, Value::Null)
            .is_err());
        assert!(ConfigPath::parse("a.list[0]")
            .unwrap()
            .insert(&mut doc, Value::Null)
            .is_err());
    }
}
