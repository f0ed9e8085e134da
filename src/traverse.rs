//! Entity discovery in arbitrary response payloads.
//!
//! A payload is walked depth-first. Every object that carries both a truthy
//! `id` and a `__typename` names an entity, reported as an [`EntityKey`]. The
//! walk keeps descending into the fields of an entity, so nested entities are
//! found too.
//!
//! Arrays are assumed homogeneous: by default only the first element is
//! visited. [`ArrayTraversal::AllElements`] visits every element instead, at
//! the cost of walking the whole list.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the walk descends into arrays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArrayTraversal {
    /// Visit only element `0`. Entities that appear only later in a list are
    /// not discovered.
    #[default]
    FirstElement,
    /// Visit every element.
    AllElements,
}

/// Identity of an entity: its type name and id.
///
/// Displays as `Typename:id`, which is also the dependency index key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub typename: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(typename: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            typename: typename.into(),
            id: id.into(),
        }
    }

    /// Reads the identity of an object, if it has one.
    ///
    /// `id` must be a non-empty string or a non-zero number; `__typename` must
    /// be a non-empty string. Anything else is not an entity.
    #[must_use]
    pub fn from_object(object: &serde_json::Map<String, Value>) -> Option<Self> {
        let typename = match object.get("__typename") {
            Some(Value::String(typename)) if !typename.is_empty() => typename,
            _ => return None,
        };

        let id = match object.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) if !is_zero(id) => id.to_string(),
            _ => return None,
        };

        Some(Self::new(typename.clone(), id))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.typename, self.id)
    }
}

fn is_zero(number: &serde_json::Number) -> bool {
    number.as_f64().is_some_and(|n| n == 0.0)
}

/// Walks `value` and calls `visit` for every entity found.
///
/// An entity reachable through several paths is reported once per path.
pub fn walk<F>(value: &Value, arrays: ArrayTraversal, visit: &mut F)
where
    F: FnMut(EntityKey),
{
    match value {
        Value::Array(items) => match arrays {
            ArrayTraversal::FirstElement => {
                if let Some(first) = items.first() {
                    walk(first, arrays, visit);
                }
            }
            ArrayTraversal::AllElements => {
                for item in items {
                    walk(item, arrays, visit);
                }
            }
        },
        Value::Object(object) => {
            if let Some(entity) = EntityKey::from_object(object) {
                visit(entity);
            }

            for field in object.values() {
                walk(field, arrays, visit);
            }
        }
        // Scalars carry no entities
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

/// Collects every entity found in `value`, in discovery order.
#[must_use]
pub fn entities(value: &Value, arrays: ArrayTraversal) -> Vec<EntityKey> {
    let mut found = Vec::new();
    walk(value, arrays, &mut |entity| found.push(entity));
    found
}
