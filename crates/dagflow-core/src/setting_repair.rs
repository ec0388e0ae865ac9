//! Setting generators and updators — the schema-drift repair layer.
//!
//! Node types that reference upstream column names by value get a generator
//! (seeds settings from a bare promise) and an updator (reconciles existing
//! settings against the node's current upstream schema, called every time
//! the node is inspected). Both are pure functions over `SelectList`s so the
//! idempotence property in item 3 is straightforward to state and test.

use crate::schema::Schema;
use crate::settings::{SelectInput, SelectList, SettingsPayload};
use std::collections::HashSet;

/// Reconcile one side's `SelectList` against its current upstream schema:
/// 1. drop entries whose `old_name` is no longer upstream,
/// 2. add one new entry per upstream column missing from the settings,
/// 3. mark all surviving entries available,
/// 4. (the drop in step 1 is final — dropped entries are never re-added).
pub fn reconcile_select(existing: &SelectList, upstream: &Schema) -> SelectList {
    let mut result: SelectList = existing
        .iter()
        .filter(|si| upstream.iter().any(|f| f.name == si.old_name))
        .cloned()
        .map(|mut si| {
            si.is_available = true;
            si
        })
        .collect();

    let present: HashSet<&str> = result.iter().map(|s| s.old_name.as_str()).collect();
    for field in upstream {
        if !present.contains(field.name.as_str()) {
            result.push(SelectInput::new(&field.name));
        }
    }
    result
}

/// Resolve `new_name` collisions between a left and right select list by
/// prefixing the right side's colliding, not-yet-renamed entries with
/// `right_`. Only entries whose `new_name` still equals their `old_name`
/// are touched, so a user's explicit rename is never clobbered and
/// repeated calls are idempotent.
pub fn resolve_right_collisions(left: &SelectList, right: &mut SelectList) {
    let left_names: HashSet<&str> = left.iter().map(|s| s.new_name.as_str()).collect();
    for r in right.iter_mut() {
        if r.new_name == r.old_name && left_names.contains(r.new_name.as_str()) {
            r.new_name = format!("right_{}", r.new_name);
        }
    }
}

fn generate_select_list(schema: &Schema) -> SelectList {
    reconcile_select(&[], schema)
}

/// Generator: seed settings from a bare promise using the upstream schema(s).
/// `upstream` is in slot order: `[main]` for single-input node types,
/// `[left, right]` for `join`/`cross_join`/`fuzzy_match`.
pub fn generate(type_id: crate::node_type::NodeTypeId, upstream: &[Schema]) -> SettingsPayload {
    use crate::node_type::NodeTypeId::*;
    match type_id {
        Select | Unpivot | GroupBy => SettingsPayload::Select {
            select: generate_select_list(&upstream.first().cloned().unwrap_or_default()),
        },
        Join | CrossJoin | FuzzyMatch => {
            let left_schema = upstream.first().cloned().unwrap_or_default();
            let right_schema = upstream.get(1).cloned().unwrap_or_default();
            let left_select = generate_select_list(&left_schema);
            let mut right_select = generate_select_list(&right_schema);
            resolve_right_collisions(&left_select, &mut right_select);
            match type_id {
                CrossJoin => SettingsPayload::CrossJoin {
                    left_select,
                    right_select,
                },
                Join => SettingsPayload::Join {
                    left_select,
                    right_select,
                    join_mapping: vec![],
                    how: crate::settings::JoinHow::Inner,
                },
                _ => SettingsPayload::FuzzyMatch {
                    left_select,
                    right_select,
                    mapping: vec![],
                },
            }
        }
        Pivot => SettingsPayload::Pivot {
            index: vec![],
            pivot_column: String::new(),
            value_column: String::new(),
            agg: crate::settings::AggFn::Sum,
        },
        _ => SettingsPayload::Placeholder,
    }
}

/// Updator: reconcile existing settings in place against current upstream
/// schemas. Idempotent by construction — see `reconcile_select` above.
pub fn update(settings: &mut SettingsPayload, upstream: &[Schema]) {
    let left_schema = upstream.first().cloned().unwrap_or_default();
    let right_schema = upstream.get(1).cloned().unwrap_or_default();

    match settings {
        SettingsPayload::Select { select } => {
            *select = reconcile_select(select, &left_schema);
        }
        SettingsPayload::Join {
            left_select,
            right_select,
            ..
        }
        | SettingsPayload::CrossJoin {
            left_select,
            right_select,
        }
        | SettingsPayload::FuzzyMatch {
            left_select,
            right_select,
            ..
        } => {
            *left_select = reconcile_select(left_select, &left_schema);
            *right_select = reconcile_select(right_select, &right_schema);
            resolve_right_collisions(left_select, right_select);
        }
        SettingsPayload::Pivot { index, .. } => {
            // Drop index columns that disappeared upstream; do not re-add
            // (pivot/value columns are left to `schema_drift` validation at
            // execution time since they are not SelectInput-shaped).
            index.retain(|c| left_schema.iter().any(|f| &f.name == c));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DType, SchemaField};

    fn field(name: &str) -> SchemaField {
        SchemaField::new(name, DType::Utf8)
    }

    #[test]
    fn reconcile_drops_missing_and_adds_new() {
        let existing = vec![
            SelectInput::new("id"),
            SelectInput::new("extra"),
        ];
        let upstream = vec![field("id"), field("name")];
        let out = reconcile_select(&existing, &upstream);
        let names: Vec<&str> = out.iter().map(|s| s.old_name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let existing = vec![SelectInput::new("id")];
        let upstream = vec![field("id"), field("name")];
        let once = reconcile_select(&existing, &upstream);
        let twice = reconcile_select(&once, &upstream);
        assert_eq!(once, twice);
    }

    #[test]
    fn cross_join_collision_gets_right_prefix() {
        let left = generate_select_list(&[field("id"), field("name")]);
        let mut right = generate_select_list(&[field("name"), field("value")]);
        resolve_right_collisions(&left, &mut right);
        let renamed = right.iter().find(|s| s.old_name == "name").unwrap();
        assert_eq!(renamed.new_name, "right_name");
        let other = right.iter().find(|s| s.old_name == "value").unwrap();
        assert_eq!(other.new_name, "value");
    }

    #[test]
    fn cross_join_collision_resolution_is_idempotent() {
        let left = generate_select_list(&[field("id"), field("name")]);
        let mut right = generate_select_list(&[field("name")]);
        resolve_right_collisions(&left, &mut right);
        let after_first = right.clone();
        resolve_right_collisions(&left, &mut right);
        assert_eq!(after_first, right);
    }

    #[test]
    fn no_duplicate_old_names_after_reconcile() {
        let existing = vec![SelectInput::new("a"), SelectInput::new("b")];
        let upstream = vec![field("a"), field("b"), field("c")];
        let out = reconcile_select(&existing, &upstream);
        let mut names: Vec<&str> = out.iter().map(|s| s.old_name.as_str()).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before);
    }
}
