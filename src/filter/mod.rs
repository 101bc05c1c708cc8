//! Key-path filtering of configuration sections
//!
//! A key path is a dot-separated list of object keys (`reply.host.force4`)
//! naming either a leaf value or a whole sub-tree. [`apply`] selects the
//! parts of a section that travel to replicas:
//!
//! - [`FilterMode::Include`] starts from an empty object and grafts every
//!   resolvable path into it, creating intermediate objects as needed.
//! - [`FilterMode::Exclude`] starts from a deep copy and removes every
//!   resolvable path, pruning ancestors left empty by the removal.
//!
//! Paths that do not resolve are skipped with a warning. The transform is
//! pure apart from that log output.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::FilterError;
use crate::models::FilterMode;

/// Apply an include/exclude selection to a document
pub fn apply(
    mode: FilterMode,
    key_paths: &[String],
    document: &Map<String, Value>,
) -> Result<Map<String, Value>, FilterError> {
    let paths = key_paths
        .iter()
        .map(|path| parse_path(path))
        .collect::<Result<Vec<_>, _>>()?;

    let result = match mode {
        FilterMode::Include => include_paths(document, &paths),
        FilterMode::Exclude => exclude_paths(document, &paths),
    };

    Ok(result)
}

/// Split a key path into its segments
///
/// Empty paths and paths with empty segments (`a..b`, `.a`) are rejected.
pub fn parse_path(path: &str) -> Result<Vec<&str>, FilterError> {
    let segments: Vec<&str> = path.split('.').collect();
    if path.is_empty() || segments.iter().any(|segment| segment.is_empty()) {
        return Err(FilterError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn include_paths(document: &Map<String, Value>, paths: &[Vec<&str>]) -> Map<String, Value> {
    let mut result = Map::new();

    for segments in paths {
        match resolve(document, segments) {
            Some(value) => graft(&mut result, segments, value.clone()),
            None => {
                warn!(key = %segments.join("."), "Attempted to include missing config");
            }
        }
    }

    result
}

fn exclude_paths(document: &Map<String, Value>, paths: &[Vec<&str>]) -> Map<String, Value> {
    let mut result = document.clone();

    for segments in paths {
        if !remove(&mut result, segments) {
            warn!(key = %segments.join("."), "Attempted to exclude missing config");
        }
    }

    result
}

/// Walk the path; every segment but the last must name an object
fn resolve<'a>(document: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    let (last, parents) = segments.split_last()?;

    let mut current = document;
    for segment in parents {
        current = current.get(*segment)?.as_object()?;
    }

    current.get(*last)
}

fn graft(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = target;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(map) = entry else {
            return;
        };
        current = map;
    }

    current.insert(last.to_string(), value);
}

/// Remove the path; returns whether anything was removed
///
/// A parent emptied by the removal is removed from its own parent, one
/// level at a time, while ancestors keep becoming empty.
fn remove(target: &mut Map<String, Value>, segments: &[&str]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };

    if rest.is_empty() {
        return target.remove(*first).is_some();
    }

    let Some(Value::Object(child)) = target.get_mut(*first) else {
        return false;
    };

    let removed = remove(child, rest);
    if removed && child.is_empty() {
        target.remove(*first);
    }
    removed
}
