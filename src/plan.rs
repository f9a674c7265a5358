//! Schema-driven planning.
//!
//! Turns prior state and proposed configuration into a [`PlanResult`]:
//! fills defaults, carries computed values over from prior state, lists the
//! top-level attributes that change and flags replacement when a
//! `force_new` attribute is among them.

use serde_json::{Map, Value};

use crate::schema::{Block, BlockNestingMode, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Plan a create (`prior` is `None`), an update, or a destroy (`proposed`
/// is null).
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let prior = prior.filter(|p| !p.is_null());

    if proposed.is_null() {
        let changes = prior
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| AttributeChange::removed(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        return PlanResult::with_changes(Value::Null, changes, false);
    }

    let mut planned = proposed.clone();
    apply_defaults(&schema.block, &mut planned);

    let prior = match prior {
        None => {
            let changes = planned
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .filter(|(_, v)| !v.is_null())
                        .map(|(k, v)| AttributeChange::added(k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default();
            return PlanResult::with_changes(planned, changes, false);
        },
        Some(prior) => prior,
    };

    carry_computed(&schema.block, prior, &mut planned);

    let empty = Map::new();
    let before = prior.as_object().unwrap_or(&empty);
    let after = planned.as_object().unwrap_or(&empty);

    let mut changes = Vec::new();
    let mut requires_replace = false;
    let names = schema
        .block
        .attributes
        .keys()
        .chain(schema.block.blocks.keys());
    for name in names {
        let old = before.get(name).filter(|v| !v.is_null());
        let new = after.get(name).filter(|v| !v.is_null());
        let change = match (old, new) {
            (None, None) => continue,
            (Some(a), Some(b)) if a == b => continue,
            (Some(a), Some(b)) => AttributeChange::modified(name.clone(), a.clone(), b.clone()),
            (None, Some(b)) => AttributeChange::added(name.clone(), b.clone()),
            (Some(a), None) => AttributeChange::removed(name.clone(), a.clone()),
        };
        if schema
            .block
            .attributes
            .get(name)
            .map(|a| a.force_new)
            .unwrap_or(false)
        {
            requires_replace = true;
        }
        changes.push(change);
    }

    if changes.is_empty() {
        PlanResult::no_change(planned)
    } else {
        PlanResult::with_changes(planned, changes, requires_replace)
    }
}

/// Fill unset attributes that declare a default.
fn apply_defaults(block: &Block, value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    for (name, attr) in &block.attributes {
        if let Some(default) = &attr.default {
            let unset = obj.get(name).map(Value::is_null).unwrap_or(true);
            if unset {
                obj.insert(name.clone(), default.clone());
            }
        }
    }
    for (name, nested) in &block.blocks {
        match (nested.nesting_mode, obj.get_mut(name)) {
            (BlockNestingMode::Single, Some(child)) => apply_defaults(&nested.block, child),
            (_, Some(Value::Array(items))) => {
                for item in items {
                    apply_defaults(&nested.block, item);
                }
            },
            _ => {},
        }
    }
}

/// Copy computed values the configuration leaves unset from prior state.
fn carry_computed(block: &Block, prior: &Value, planned: &mut Value) {
    let (Some(prior), Some(planned)) = (prior.as_object(), planned.as_object_mut()) else {
        return;
    };
    for (name, attr) in &block.attributes {
        if !attr.flags.computed {
            continue;
        }
        let unset = planned.get(name).map(Value::is_null).unwrap_or(true);
        if let (true, Some(old)) = (unset, prior.get(name)) {
            planned.insert(name.clone(), old.clone());
        }
    }
    for (name, nested) in &block.blocks {
        let Some(old) = prior.get(name) else {
            continue;
        };
        match (nested.nesting_mode, planned.get_mut(name)) {
            (BlockNestingMode::Single, Some(child)) => carry_computed(&nested.block, old, child),
            (_, Some(Value::Array(items))) => {
                if let Some(old_items) = old.as_array() {
                    for (item, old_item) in items.iter_mut().zip(old_items) {
                        carry_computed(&nested.block, old_item, item);
                    }
                }
            },
            _ => {},
        }
    }
}
