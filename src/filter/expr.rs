//! Filter expressions: field name -> clause, all clauses ANDed.
//!
//! JSON shape (same as the route layer sends):
//!
//! ```json
//! { "owner": { "username": { "equals": "kody" } }, "title": {} }
//! ```

use crate::error::StoreError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// How a nested filter applies to the records behind a to-many relation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantifier {
    /// At least one related record matches.
    #[default]
    Some,
    /// Every related record matches (true when there are none).
    Every,
    /// No related record matches.
    None,
}

impl Quantifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantifier::Some => "some",
            Quantifier::Every => "every",
            Quantifier::None => "none",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "some" => Some(Quantifier::Some),
            "every" => Some(Quantifier::Every),
            "none" => Some(Quantifier::None),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    /// `{ "equals": V }` on a scalar field.
    Equals(Value),
    /// `{}`: no constraint.
    Any,
    /// Nested filter on a relation; to-many relations use the database's default quantifier.
    Related(Filter),
    /// `{ "some" | "every" | "none": F }` on a to-many relation.
    Quantified(Quantifier, Filter),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Clause)>,
}

impl Filter {
    /// Matches every record.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().equals("id", Value::String(id.into()))
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Clause::Equals(value.into())));
        self
    }

    pub fn any(mut self, field: impl Into<String>) -> Self {
        self.clauses.push((field.into(), Clause::Any));
        self
    }

    /// Nested filter on a relation. An empty nested filter is no constraint, the
    /// same as `{}` in JSON; use `some(relation, Filter::new())` for "has any".
    pub fn relation(mut self, relation: impl Into<String>, filter: Filter) -> Self {
        let clause = if filter.is_empty() {
            Clause::Any
        } else {
            Clause::Related(filter)
        };
        self.clauses.push((relation.into(), clause));
        self
    }

    pub fn some(self, relation: impl Into<String>, filter: Filter) -> Self {
        self.quantified(relation, Quantifier::Some, filter)
    }

    pub fn every(self, relation: impl Into<String>, filter: Filter) -> Self {
        self.quantified(relation, Quantifier::Every, filter)
    }

    pub fn none(self, relation: impl Into<String>, filter: Filter) -> Self {
        self.quantified(relation, Quantifier::None, filter)
    }

    fn quantified(mut self, relation: impl Into<String>, q: Quantifier, filter: Filter) -> Self {
        self.clauses.push((relation.into(), Clause::Quantified(q, filter)));
        self
    }

    pub fn clauses(&self) -> &[(String, Clause)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Parse the JSON filter shape. `null` is the empty filter.
    pub fn from_json(value: &Value) -> Result<Self, StoreError> {
        match value {
            Value::Null => Ok(Filter::new()),
            Value::Object(obj) => {
                let mut clauses = Vec::with_capacity(obj.len());
                for (field, v) in obj {
                    clauses.push((field.clone(), parse_clause(field, v)?));
                }
                Ok(Filter { clauses })
            }
            other => Err(StoreError::Schema(format!(
                "filter must be an object, got {}",
                other
            ))),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (field, clause) in &self.clauses {
            let v = match clause {
                Clause::Equals(v) => serde_json::json!({ "equals": v }),
                Clause::Any => Value::Object(Map::new()),
                Clause::Related(f) => f.to_json(),
                Clause::Quantified(q, f) => {
                    let mut m = Map::new();
                    m.insert(q.as_str().to_string(), f.to_json());
                    Value::Object(m)
                }
            };
            obj.insert(field.clone(), v);
        }
        Value::Object(obj)
    }
}

fn parse_clause(field: &str, value: &Value) -> Result<Clause, StoreError> {
    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(StoreError::Schema(format!(
                "clause for '{}' must be an object, got {}",
                field, other
            )))
        }
    };
    if obj.is_empty() {
        return Ok(Clause::Any);
    }
    if let Some(v) = obj.get("equals") {
        if obj.len() > 1 {
            return Err(StoreError::Schema(format!(
                "'{}': equals cannot be combined with other keys",
                field
            )));
        }
        return Ok(Clause::Equals(v.clone()));
    }
    if obj.len() == 1 {
        if let Some((key, inner)) = obj.iter().next() {
            if let Some(q) = Quantifier::from_key(key) {
                return Ok(Clause::Quantified(q, Filter::from_json(inner)?));
            }
        }
    }
    // A nested filter maps names to objects; anything else is an operator we do not support.
    if let Some((op, _)) = obj.iter().find(|(_, v)| !v.is_object()) {
        return Err(StoreError::Schema(format!(
            "unsupported operator '{}' on '{}'; only equals is supported",
            op, field
        )));
    }
    Ok(Clause::Related(Filter::from_json(value)?))
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        Filter::from_json(&v).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<Value> for Filter {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Filter::from_json(&value)
    }
}
