//! Path codec for field names.
//!
//! Field names address a location in the nested model: `user.name`,
//! `user.tags[0]` or the equivalent dotted-index form `user.tags.0`. Both forms
//! parse into the same [`FieldPath`], so every lookup below is form-agnostic.
//!
//! Grammar: `segment ('.' segment | '[' digits ']')*` where `segment` is
//! `[^.\[\]]+`. An index that is not a base-10 number, or is larger than
//! [`MAX_ARRAY_INDEX`], is kept as an object key.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{FormError, Result};

/// Upper bound for the number of segments in one path.
///
/// Self-similar sections (a section whose children are sections of the same
/// shape) produce ever longer names; the guard keeps `set` bounded.
pub const MAX_PATH_DEPTH: usize = 32;

/// Largest bracket or dotted index treated as an array position.
///
/// Larger numbers stay object keys, so a name like `items[4000000000]` never
/// makes `set` allocate a gigantic array.
pub const MAX_ARRAY_INDEX: usize = 10_000;

/// One step in a [`FieldPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object property.
    Key(String),
    /// Array position.
    Index(usize),
}

impl PathSegment {
    /// Classify a raw segment: plain base-10 digits up to [`MAX_ARRAY_INDEX`]
    /// become an index.
    fn classify(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Some(index) = raw.parse::<usize>().ok().filter(|i| *i <= MAX_ARRAY_INDEX) {
                return PathSegment::Index(index);
            }
        }
        PathSegment::Key(raw.to_string())
    }

    /// Array position this segment addresses, if any.
    fn array_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(index) if *index <= MAX_ARRAY_INDEX => Some(*index),
            _ => None,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, PathSegment::Index(_))
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Parsed field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// The empty path, addressing the model root.
    pub fn root() -> Self {
        FieldPath(Vec::new())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = |reason| FormError::MalformedPath {
            path: raw.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut rest = raw;
        // A dot is required between segments, except before a bracket.
        let mut expect_segment = true;

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                if segments.is_empty() {
                    return Err(malformed("path starts with an index"));
                }
                let close = after.find(']').ok_or_else(|| malformed("unclosed `[`"))?;
                let inner = &after[..close];
                if inner.is_empty() || inner.contains(['.', '[']) {
                    return Err(malformed("empty or nested index"));
                }
                segments.push(PathSegment::classify(inner));
                rest = &after[close + 1..];
                expect_segment = false;
            } else if let Some(after) = rest.strip_prefix('.') {
                if expect_segment {
                    return Err(malformed("empty segment"));
                }
                rest = after;
                expect_segment = true;
                if rest.is_empty() {
                    return Err(malformed("trailing `.`"));
                }
            } else {
                if !expect_segment {
                    return Err(malformed("missing `.` after index"));
                }
                let end = rest.find(['.', '[', ']']).unwrap_or(rest.len());
                if end == 0 {
                    return Err(malformed("unexpected `]`"));
                }
                segments.push(PathSegment::classify(&rest[..end]));
                rest = &rest[end..];
                expect_segment = false;
            }

            if segments.len() > MAX_PATH_DEPTH {
                return Err(FormError::PathTooDeep {
                    path: raw.to_string(),
                    limit: MAX_PATH_DEPTH,
                });
            }
        }

        Ok(FieldPath(segments))
    }

    /// Parse a section prefix such as `address.` or `items[2]`.
    ///
    /// A single trailing dot is accepted; an empty prefix is the root.
    pub fn parse_prefix(raw: &str) -> Result<Self> {
        let trimmed = raw.strip_suffix('.').unwrap_or(raw);
        if trimmed.is_empty() {
            return Ok(FieldPath::root());
        }
        FieldPath::parse(trimmed)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Remainder of `self` below `prefix`, aligned on segment boundaries.
    ///
    /// `address.city` relative to `address` is `city`; `addressLine1` is not
    /// below `address` at all.
    pub fn relative_to(&self, prefix: &FieldPath) -> Option<FieldPath> {
        self.0
            .strip_prefix(prefix.segments())
            .map(|rest| FieldPath(rest.to_vec()))
    }
}

impl FromStr for FieldPath {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self> {
        FieldPath::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Key(key) if i == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
            }
        }
        Ok(())
    }
}

/// [`FieldPath::relative_to`] on raw strings.
///
/// Returns `None` when either side does not parse or `full_name` is not below
/// `prefix`.
pub fn relative_path(full_name: &str, prefix: &str) -> Option<FieldPath> {
    let full = FieldPath::parse(full_name).ok()?;
    let prefix = FieldPath::parse_prefix(prefix).ok()?;
    full.relative_to(&prefix)
}

/// Read the value at `path`.
///
/// An index segment applied to an object looks up the decimal key, so
/// `a.0.b` also finds `{"a": {"0": {"b": ..}}}`.
pub fn get<'a>(root: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, segment| match (current, segment) {
            (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
            (Value::Object(map), segment) => map.get(&segment.to_string()),
            _ => None,
        })
}

/// Write `value` at `path`, creating intermediate containers.
///
/// A missing or scalar container becomes an array when the segment it must
/// hold is an index and an object otherwise. An array asked for a key is
/// converted to an object keyed by the former positions.
pub fn set(root: &mut Value, path: &FieldPath, value: Value) {
    let mut cursor = root;
    for segment in path.segments() {
        cursor = child_mut(cursor, segment);
    }
    *cursor = value;
}

fn child_mut<'a>(current: &'a mut Value, segment: &PathSegment) -> &'a mut Value {
    match (current, segment.array_index()) {
        (Value::Array(items), Some(index)) => {
            let len = index.saturating_add(1);
            if items.len() < len {
                items.resize(len, Value::Null);
            }
            &mut items[index]
        }
        (Value::Object(map), _) => map.entry(segment.to_string()).or_insert(Value::Null),
        (current, index) => {
            *current = container_for(current, index.is_some());
            child_mut(current, segment)
        }
    }
}

/// Replacement container for `current`, which is neither an object nor an
/// array matching the segment it must hold.
fn container_for(current: &Value, wants_array: bool) -> Value {
    match current {
        Value::Array(items) if !wants_array => Value::Object(
            items
                .iter()
                .enumerate()
                .filter(|(_, item)| !item.is_null())
                .map(|(i, item)| (i.to_string(), item.clone()))
                .collect(),
        ),
        _ if wants_array => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    }
}
