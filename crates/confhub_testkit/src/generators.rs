//! Property-based test generators using proptest.
//!
//! Paths are generated with matching type and key depth so every change
//! is well formed.

use confhub_hub::{Change, Instance, PropertyBag, PropertyChange, Value};
use proptest::prelude::*;
use std::sync::Arc;

/// Strategy for a single path segment.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,5}").expect("Invalid regex")
}

/// Strategy for a `(type name, instance key)` pair of depth 1 to 3.
pub fn path_strategy() -> impl Strategy<Value = (String, String)> {
    prop::collection::vec((segment_strategy(), segment_strategy()), 1..=3).prop_map(|levels| {
        let type_name: Vec<_> = levels.iter().map(|(t, _)| t.as_str()).collect();
        let key: Vec<_> = levels.iter().map(|(_, k)| k.as_str()).collect();
        (format!("/{}", type_name.join("/")), key.join("."))
    })
}

/// Strategy for scalar property values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e6f64..1.0e6).prop_map(Value::Float),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::Text),
    ]
}

/// Strategy for property bags of scalars.
pub fn bag_strategy() -> impl Strategy<Value = PropertyBag> {
    prop::collection::btree_map(segment_strategy(), scalar_strategy(), 0..6)
}

/// Strategy for one instance-level change.
pub fn instance_change_strategy() -> impl Strategy<Value = Change> {
    (path_strategy(), bag_strategy(), 0u8..3).prop_map(|((type_name, instance_key), bag, kind)| {
        let instance = Arc::new(Instance::new(type_name.clone(), instance_key.clone(), bag.clone()));
        match kind {
            0 => Change::AddInstance {
                type_name,
                instance_key,
                instance,
            },
            1 => Change::ModifyInstance {
                original: Arc::new(Instance::new(type_name.clone(), instance_key.clone(), PropertyBag::new())),
                properties: PropertyChange::diff(&PropertyBag::new(), &bag),
                type_name,
                instance_key,
                instance,
            },
            _ => Change::RemoveInstance {
                type_name,
                instance_key,
                instance,
            },
        }
    })
}

/// Strategy for a batch of changes, including type-level noise.
pub fn change_batch_strategy() -> impl Strategy<Value = Vec<Change>> {
    let change = prop_oneof![
        8 => instance_change_strategy(),
        1 => path_strategy().prop_map(|(type_name, _)| Change::AddType { type_name }),
        1 => path_strategy().prop_map(|(type_name, _)| Change::RemoveType { type_name }),
    ];
    prop::collection::vec(change, 0..24)
}
