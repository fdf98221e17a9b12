//! Binds a filter to the entity-field registry and evaluates it over the store.
//!
//! Binding happens before any record is looked at, so a filter naming a field
//! the entity does not have fails even against an empty collection.

use crate::config::{RelationDirection, RelationSpec, ResolvedEntity, ResolvedModel, ID_FIELD};
use crate::error::StoreError;
use crate::filter::{Clause, Filter, Quantifier};
use crate::store::{Record, Store};
use serde_json::Value;

#[derive(Debug)]
pub struct Plan<'a> {
    entity: &'a ResolvedEntity,
    steps: Vec<Step<'a>>,
}

#[derive(Debug)]
enum Step<'a> {
    Equals {
        field: &'a str,
        value: &'a Value,
    },
    ToOne {
        relation: &'a RelationSpec,
        plan: Plan<'a>,
    },
    ToMany {
        relation: &'a RelationSpec,
        quantifier: Quantifier,
        plan: Plan<'a>,
    },
}

impl<'a> Plan<'a> {
    /// `default_quantifier` applies to nested filters on to-many relations that do
    /// not name one explicitly.
    pub fn bind(
        model: &'a ResolvedModel,
        entity: &'a ResolvedEntity,
        filter: &'a Filter,
        default_quantifier: Quantifier,
    ) -> Result<Self, StoreError> {
        let mut steps = Vec::with_capacity(filter.clauses().len());
        for (name, clause) in filter.clauses() {
            if entity.field(name).is_some() {
                match clause {
                    Clause::Equals(value) => steps.push(Step::Equals { field: name, value }),
                    Clause::Any => {}
                    Clause::Related(_) | Clause::Quantified(..) => {
                        return Err(StoreError::Schema(format!(
                            "{}.{} is a scalar field; use {{ \"equals\": ... }}",
                            entity.name, name
                        )))
                    }
                }
                continue;
            }

            let relation = entity.relation(name).ok_or_else(|| {
                StoreError::Schema(format!("unknown field '{}' on {}", name, entity.name))
            })?;
            let (quantifier, nested) = match clause {
                Clause::Any => continue,
                Clause::Equals(_) => {
                    return Err(StoreError::Schema(format!(
                        "{}.{} is a relation to {}; nest a filter instead of equals",
                        entity.name, name, relation.related_entity
                    )))
                }
                Clause::Related(nested) => (default_quantifier, nested),
                Clause::Quantified(q, nested) => {
                    if relation.direction == RelationDirection::ToOne {
                        return Err(StoreError::Schema(format!(
                            "{}.{} is a to-one relation; '{}' applies only to to-many relations",
                            entity.name,
                            name,
                            q.as_str()
                        )));
                    }
                    (*q, nested)
                }
            };
            let related = model.entity(&relation.related_entity).ok_or_else(|| {
                StoreError::Schema(format!("unknown entity: {}", relation.related_entity))
            })?;
            let plan = Plan::bind(model, related, nested, default_quantifier)?;
            steps.push(match relation.direction {
                RelationDirection::ToOne => Step::ToOne { relation, plan },
                RelationDirection::ToMany => Step::ToMany {
                    relation,
                    quantifier,
                    plan,
                },
            });
        }
        Ok(Plan { entity, steps })
    }

    pub fn entity(&self) -> &'a ResolvedEntity {
        self.entity
    }

    pub fn matches(&self, store: &Store, record: &Record) -> bool {
        self.steps.iter().all(|step| step.matches(store, record))
    }

    /// A top-level `id` equality lets the scan start from the id index.
    fn id_lookup(&self) -> Option<&'a str> {
        self.steps.iter().find_map(|step| match step {
            Step::Equals { field, value } if *field == ID_FIELD => (*value).as_str(),
            _ => None,
        })
    }

    /// Matching records in insertion order.
    pub fn scan<'s>(&'s self, store: &'s Store) -> Box<dyn Iterator<Item = &'s Record> + 's> {
        match self.id_lookup() {
            Some(id) => Box::new(
                store
                    .get_by_id(&self.entity.name, id)
                    .into_iter()
                    .filter(move |r| self.matches(store, r)),
            ),
            None => Box::new(
                store
                    .iter(&self.entity.name)
                    .filter(move |r| self.matches(store, r)),
            ),
        }
    }
}

impl Step<'_> {
    fn matches(&self, store: &Store, record: &Record) -> bool {
        match self {
            Step::Equals { field, value } => record.get(*field).unwrap_or(&Value::Null) == *value,
            Step::ToOne { relation, plan } => record
                .get(&relation.our_key)
                .and_then(Value::as_str)
                .and_then(|id| store.get_by_id(&relation.related_entity, id))
                .map(|related| plan.matches(store, related))
                .unwrap_or(false),
            Step::ToMany {
                relation,
                quantifier,
                plan,
            } => {
                let Some(id) = record.get(ID_FIELD).and_then(Value::as_str) else {
                    return false;
                };
                let mut related = store
                    .children(&relation.relationship_id, id)
                    .filter_map(|child| store.get_by_id(&relation.related_entity, child));
                match quantifier {
                    Quantifier::Some => related.any(|r| plan.matches(store, r)),
                    Quantifier::Every => related.all(|r| plan.matches(store, r)),
                    Quantifier::None => !related.any(|r| plan.matches(store, r)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{notes_schema, resolve};
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&notes_schema().unwrap()).unwrap()
    }

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            other => panic!("not an object: {}", other),
        }
    }

    fn populated(model: &ResolvedModel) -> Store {
        let mut store = Store::new(model);
        let user = model.entity("user").unwrap();
        let note = model.entity("note").unwrap();
        let image = model.entity("image").unwrap();
        store.insert(user, record(json!({ "id": "u1", "username": "kody", "name": null }))).unwrap();
        store.insert(user, record(json!({ "id": "u2", "username": "hannah", "name": "Hannah" }))).unwrap();
        store.insert(user, record(json!({ "id": "u3", "username": "lonely", "name": null }))).unwrap();
        for (id, title, owner) in [("n1", "koala", "u1"), ("n2", "tiger", "u1"), ("n3", "koala", "u2")] {
            store
                .insert(note, record(json!({ "id": id, "title": title, "content": "", "ownerId": owner })))
                .unwrap();
        }
        store
            .insert(
                image,
                record(json!({ "id": "i1", "altText": null, "contentType": "image/png", "content": [0], "noteId": "n1" })),
            )
            .unwrap();
        store
    }

    fn ids(model: &ResolvedModel, store: &Store, entity: &str, filter: &Filter, q: Quantifier) -> Vec<String> {
        let plan = Plan::bind(model, model.entity(entity).unwrap(), filter, q).unwrap();
        plan.scan(store)
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn to_one_relation_filter() {
        let model = model();
        let store = populated(&model);
        let f = Filter::new().relation("owner", Filter::new().equals("username", "kody"));
        assert_eq!(ids(&model, &store, "note", &f, Quantifier::Some), ["n1", "n2"]);
    }

    #[test]
    fn multi_level_nesting() {
        let model = model();
        let store = populated(&model);
        let f = Filter::new().relation(
            "note",
            Filter::new().relation("owner", Filter::new().equals("username", "kody")),
        );
        assert_eq!(ids(&model, &store, "image", &f, Quantifier::Some), ["i1"]);

        let f = Filter::new().relation("notes", Filter::new().some("images", Filter::new()));
        assert_eq!(ids(&model, &store, "user", &f, Quantifier::Some), ["u1"]);
    }

    #[test]
    fn to_many_default_quantifier_is_configurable() {
        let model = model();
        let store = populated(&model);
        let f = Filter::new().relation("notes", Filter::new().equals("title", "koala"));
        assert_eq!(ids(&model, &store, "user", &f, Quantifier::Some), ["u1", "u2"]);
        // every: kody also has "tiger"; lonely has no notes and matches vacuously.
        assert_eq!(ids(&model, &store, "user", &f, Quantifier::Every), ["u2", "u3"]);
    }

    #[test]
    fn explicit_quantifiers_override_default() {
        let model = model();
        let store = populated(&model);
        let koala = || Filter::new().equals("title", "koala");
        let none = Filter::new().none("notes", koala());
        assert_eq!(ids(&model, &store, "user", &none, Quantifier::Every), ["u3"]);
        let some = Filter::new().some("notes", koala());
        assert_eq!(ids(&model, &store, "user", &some, Quantifier::Every), ["u1", "u2"]);
    }

    #[test]
    fn equals_null_and_any() {
        let model = model();
        let store = populated(&model);
        let f = Filter::new().equals("name", Value::Null);
        assert_eq!(ids(&model, &store, "user", &f, Quantifier::Some), ["u1", "u3"]);
        let f = Filter::new().any("name");
        assert_eq!(ids(&model, &store, "user", &f, Quantifier::Some), ["u1", "u2", "u3"]);
    }

    #[test]
    fn equality_is_exact() {
        let model = model();
        let store = populated(&model);
        let f = Filter::new().equals("username", "Kody");
        assert!(ids(&model, &store, "user", &f, Quantifier::Some).is_empty());
    }

    #[test]
    fn id_lookup_respects_other_clauses() {
        let model = model();
        let store = populated(&model);
        let f = Filter::by_id("n1").equals("title", "tiger");
        assert!(ids(&model, &store, "note", &f, Quantifier::Some).is_empty());
        let f = Filter::by_id("n2").equals("title", "tiger");
        assert_eq!(ids(&model, &store, "note", &f, Quantifier::Some), ["n2"]);
    }

    #[test]
    fn serialized_filters_match_the_same_records() {
        let model = model();
        let store = populated(&model);
        let cases = [
            ("user", Filter::new().relation("notes", Filter::new())),
            ("user", Filter::new().some("notes", Filter::new())),
            ("user", Filter::new().none("notes", Filter::new())),
            ("user", Filter::new().every("notes", Filter::new().equals("title", "koala"))),
            ("note", Filter::new().relation("owner", Filter::new().equals("username", "kody"))),
            ("note", Filter::new().relation("images", Filter::new().any("altText"))),
            ("image", Filter::new().relation("note", Filter::new().relation("owner", Filter::new()))),
        ];
        for (entity, built) in &cases {
            let json = serde_json::to_value(built).unwrap();
            let parsed: Filter = serde_json::from_value(json.clone()).unwrap();
            assert_eq!(&parsed, built, "{}", json);
            for q in [Quantifier::Some, Quantifier::Every] {
                assert_eq!(
                    ids(&model, &store, entity, &parsed, q),
                    ids(&model, &store, entity, built, q),
                    "{} on {}",
                    json,
                    entity
                );
            }
        }
        let has_notes = Filter::new().some("notes", Filter::new());
        assert_eq!(ids(&model, &store, "user", &has_notes, Quantifier::Some), ["u1", "u2"]);
        let unconstrained = Filter::new().relation("notes", Filter::new());
        assert_eq!(ids(&model, &store, "user", &unconstrained, Quantifier::Some), ["u1", "u2", "u3"]);
    }

    #[test]
    fn schema_errors_surface_at_bind_time() {
        let model = model();
        let note = model.entity("note").unwrap();
        let cases = [
            Filter::new().equals("colour", "red"),
            Filter::new().relation("title", Filter::new().equals("length", 3)),
            Filter::new().equals("owner", "u1"),
            Filter::new().every("owner", Filter::new()),
            Filter::new().relation("owner", Filter::new().equals("nickname", "k")),
        ];
        for f in &cases {
            let err = Plan::bind(&model, note, f, Quantifier::Some).unwrap_err();
            assert!(matches!(err, StoreError::Schema(_)), "{}: {:?}", f, err);
        }
    }
}
