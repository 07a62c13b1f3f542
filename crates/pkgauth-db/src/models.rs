//! Document and query models

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A stored document: a JSON object keyed by top-level field name
pub type Document = Map<String, Value>;

/// Equality predicate on a single top-level string field
///
/// Filters are structured values bound as query parameters by the store;
/// they are never spliced into query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

impl Filter {
    /// Match documents whose `field` equals `value`
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check whether a document satisfies this filter
    pub fn matches(&self, document: &Document) -> bool {
        document
            .get(&self.field)
            .and_then(Value::as_str)
            .is_some_and(|v| v == self.value)
    }
}

/// Set of top-level fields returned by a lookup
///
/// An empty projection returns the whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    fields: BTreeSet<String>,
}

impl Projection {
    /// Project onto the given fields
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Return every field
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_all(&self) -> bool {
        self.fields.is_empty()
    }

    /// Drop every field not named by this projection
    pub fn apply(&self, mut document: Document) -> Document {
        if !self.is_all() {
            document.retain(|key, _| self.fields.contains(key));
        }
        document
    }
}

/// Numeric increment at a dot-separated path, e.g. `counts.publish`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub path: String,
    pub by: i64,
}

impl Increment {
    pub fn new(path: impl Into<String>, by: i64) -> Self {
        Self {
            path: path.into(),
            by,
        }
    }

    /// Apply the increment in place, creating intermediate objects as needed.
    /// A missing or non-numeric leaf counts as zero.
    pub fn apply(&self, document: &mut Document) {
        let mut segments = self.path.split('.').peekable();
        let mut current = document;

        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                let previous = current.get(segment).and_then(Value::as_i64).unwrap_or(0);
                current.insert(segment.to_string(), Value::from(previous + self.by));
                return;
            }

            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => return,
            };
        }
    }
}
