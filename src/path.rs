//! Field path handling.
//!
//! Two concerns live here:
//!
//! - `Whitelist` decides whether a traversal path is one the operator asked to
//!   translate. Paths are compared after stripping everything but ASCII
//!   letters, so array indices and separators never take part in a match:
//!   `items.text` matches `items.0.text`, `items.1.text` and so on.
//! - `FieldPath` addresses a value inside a JSON tree for reads and writes,
//!   accepting dotted (`body.0.text`) and bracket (`body[0].text`) notation.

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

static NON_LETTERS: OnceLock<Regex> = OnceLock::new();

/// Strip every character that is not an ASCII letter.
///
/// Distinct paths made of the same letters in the same order (`a.b` and `ab`)
/// normalize to the same string and cannot be told apart.
pub fn normalize(path: &str) -> String {
    let re = NON_LETTERS.get_or_init(|| Regex::new(r"[^a-zA-Z]+").expect("valid regex"));
    re.replace_all(path, "").into_owned()
}

/// Whether a whitelist entry selects the leaf at `path`.
pub fn matches(entry: &str, path: &str) -> bool {
    normalize(entry) == normalize(path)
}

/// Operator-supplied set of translatable paths, normalized once per job.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: Vec<String>,
}

impl Whitelist {
    /// Entries that normalize to the same string collapse into one.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for entry in entries {
            let n = normalize(entry.as_ref());
            if !normalized.contains(&n) {
                normalized.push(n);
            }
        }
        Self {
            entries: normalized,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any entry selects the leaf at `path`.
    pub fn selects(&self, path: &str) -> bool {
        let n = normalize(path);
        self.entries.iter().any(|e| *e == n)
    }
}

/// One step of a `FieldPath`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A location inside a JSON document.
///
/// Paths recorded by a traversal keep object keys verbatim (`"a.b"`, `"01"`,
/// `""`) and use `Index` only for array positions, so writing through them
/// always lands on the leaf that was read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse dotted or bracket notation. Purely numeric components address
    /// array elements. Empty components are ignored.
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split(['.', '[', ']'])
            .filter(|part| !part.is_empty())
            .map(|part| match part.parse::<usize>() {
                Ok(i) => Segment::Index(i),
                Err(_) => Segment::Key(part.to_string()),
            })
            .collect();
        Self { segments }
    }

    /// The document root
    pub fn root() -> Self {
        Self::default()
    }

    /// This path extended by one segment
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Look up the value at this path. Numeric segments also work as object
    /// keys, since documents may use digit-only keys.
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |current, segment| match (segment, current) {
                (Segment::Key(k), Value::Object(map)) => map.get(k),
                (Segment::Index(i), Value::Array(items)) => items.get(*i),
                (Segment::Index(i), Value::Object(map)) => map.get(&i.to_string()),
                _ => None,
            })
    }

    /// Write `value` at this path, creating missing containers along the way.
    ///
    /// Missing keys become objects or arrays depending on the next segment;
    /// arrays shorter than an index are padded with `null`. A scalar in the
    /// way is replaced by the container the path needs.
    pub fn set(&self, root: &mut Value, value: Value) {
        let mut current = root;
        for (pos, segment) in self.segments.iter().enumerate() {
            let next_is_index = matches!(self.segments.get(pos + 1), Some(Segment::Index(_)));
            let is_last = pos + 1 == self.segments.len();
            current = match segment {
                Segment::Key(key) => step_key(current, key),
                Segment::Index(i) => step_index(current, *i),
            };
            if !is_last && !current.is_object() && !current.is_array() {
                *current = empty_container(next_is_index);
            }
        }
        *current = value;
    }
}

fn empty_container(array: bool) -> Value {
    if array {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn step_key<'a>(current: &'a mut Value, key: &str) -> &'a mut Value {
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
        _ => unreachable!("container was just replaced by an object"),
    }
}

fn step_index(current: &mut Value, index: usize) -> &mut Value {
    if !current.is_object() && !current.is_array() {
        *current = Value::Array(Vec::new());
    }
    match current {
        Value::Object(map) => map.entry(index.to_string()).or_insert(Value::Null),
        Value::Array(items) => {
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        _ => unreachable!("container was just replaced by an array or is an object"),
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, segment) in self.segments.iter().enumerate() {
            if pos > 0 {
                f.write_str(".")?;
            }
            match segment {
                Segment::Key(k) => f.write_str(k)?,
                Segment::Index(i) => write!(f, "{}", i)?,
            }
        }
        Ok(())
    }
}

/// Extend a traversal path by one component, the way the tree walk records it.
pub fn join(parent: &str, component: &str) -> String {
    if parent.is_empty() {
        component.to_string()
    } else {
        format!("{}.{}", parent, component)
    }
}
