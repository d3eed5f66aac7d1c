//! Declarative row filters.
//!
//! A [`Predicate`] describes which rows an actor may act on. It is pure data:
//! evaluated in memory against JSON documents via [`Predicate::matches`], or
//! translated into a store's query language by the store adapter.
//!
//! Fields are dotted paths over a record document. Traversing an array means
//! "any element", so `messages.whatsappAccountId` matches a conversation if
//! any of its messages went through the account.

use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dotted field path within a record document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Field(Cow<'static, str>);

impl Field {
    pub const fn from_static(path: &'static str) -> Self {
        Self(Cow::Borrowed(path))
    }

    pub fn new(path: impl Into<Cow<'static, str>>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl core::fmt::Display for Field {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tagged-variant row filter.
///
/// `Or(vec![])` is the canonical match-nothing predicate; `And(vec![])` matches
/// everything. Use the constructors to get normalised trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    All,
    Eq { field: Field, value: String },
    In { field: Field, values: BTreeSet<String> },
    And { clauses: Vec<Predicate> },
    Or { clauses: Vec<Predicate> },
}

impl Predicate {
    pub fn all() -> Self {
        Predicate::All
    }

    /// The empty-result predicate.
    pub fn nothing() -> Self {
        Predicate::Or { clauses: Vec::new() }
    }

    pub fn equals(field: Field, value: impl Into<String>) -> Self {
        Predicate::Eq {
            field,
            value: value.into(),
        }
    }

    /// Set membership; an empty set yields [`Predicate::nothing`].
    pub fn is_in<I, S>(field: Field, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Predicate::nothing();
        }
        Predicate::In { field, values }
    }

    /// Disjunction with set semantics; collapses trivial shapes.
    pub fn any_of(clauses: impl IntoIterator<Item = Predicate>) -> Self {
        let mut flat = Vec::new();
        for clause in clauses {
            match clause {
                Predicate::All => return Predicate::All,
                Predicate::Or { clauses } => flat.extend(clauses),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        Predicate::Or { clauses: flat }
    }

    /// Conjunction; collapses trivial shapes.
    pub fn all_of(clauses: impl IntoIterator<Item = Predicate>) -> Self {
        let mut flat = Vec::new();
        for clause in clauses {
            match clause {
                Predicate::All => {}
                p if p.is_nothing() => return Predicate::nothing(),
                Predicate::And { clauses } => flat.extend(clauses),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::All,
            1 => flat.remove(0),
            _ => Predicate::And { clauses: flat },
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Predicate::All)
    }

    /// Statically known to match no row.
    pub fn is_nothing(&self) -> bool {
        match self {
            Predicate::Or { clauses } => clauses.iter().all(Predicate::is_nothing),
            Predicate::In { values, .. } => values.is_empty(),
            Predicate::And { clauses } => clauses.iter().any(Predicate::is_nothing),
            Predicate::All | Predicate::Eq { .. } => false,
        }
    }

    /// Evaluate against a JSON record document.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq { field, value } => {
                leaves(record, field).any(|leaf| leaf_str(leaf) == Some(value.as_str()))
            }
            Predicate::In { field, values } => leaves(record, field)
                .filter_map(leaf_str)
                .any(|leaf| values.contains(leaf)),
            Predicate::And { clauses } => clauses.iter().all(|c| c.matches(record)),
            Predicate::Or { clauses } => clauses.iter().any(|c| c.matches(record)),
        }
    }
}

fn leaf_str(value: &Value) -> Option<&str> {
    value.as_str()
}

/// All values reachable at `field`, flattening arrays at every step.
fn leaves<'a>(record: &'a Value, field: &Field) -> impl Iterator<Item = &'a Value> {
    let mut current: Vec<&'a Value> = vec![record];
    for segment in field.segments() {
        let mut next = Vec::new();
        for value in current {
            collect_member(value, segment, &mut next);
        }
        current = next;
    }
    current.into_iter().flat_map(|v| match v {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        other => vec![other],
    })
}

fn collect_member<'a>(value: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(segment) {
                out.push(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_member(item, segment, out);
            }
        }
        _ => {}
    }
}
