//! Application order for a batch of changes.
//!
//! Adds and modifies come first, ascending by `(type name, instance key)`,
//! so parents materialize before their children. Removes come last,
//! descending by the same pair, so children go before their parents.
//!
//! Adds and modifies are interleaved by path rather than grouped by
//! category: a modify of `/b` follows an add of `/a`. The category only
//! breaks ties on the same path, where a modify comes before an add.

use confhub_hub::{Change, ChangeCategory};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::trace;

/// Sort key of one instance change.
///
/// Two keys compare equal only if category, type name and instance key all
/// match, so a batch can be held in an ordered map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOrderKey {
    category: ChangeCategory,
    type_name: String,
    instance_key: String,
}

impl ChangeOrderKey {
    /// Builds the key of an instance change; `None` for other categories.
    pub fn of(change: &Change) -> Option<Self> {
        let category = change.category();
        if !category.is_instance_change() {
            return None;
        }
        Some(Self {
            category,
            type_name: change.type_name().to_string(),
            instance_key: change.instance_key().unwrap_or_default().to_string(),
        })
    }

    fn is_remove(&self) -> bool {
        self.category == ChangeCategory::RemoveInstance
    }

    fn category_rank(&self) -> u8 {
        match self.category {
            ChangeCategory::ModifyInstance => 0,
            ChangeCategory::AddInstance => 1,
            _ => 2,
        }
    }
}

impl Ord for ChangeOrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.is_remove()
            .cmp(&other.is_remove())
            .then_with(|| {
                let ascending = (&self.type_name, &self.instance_key)
                    .cmp(&(&other.type_name, &other.instance_key));
                if self.is_remove() {
                    ascending.reverse()
                } else {
                    ascending
                }
            })
            .then_with(|| self.category_rank().cmp(&other.category_rank()))
    }
}

impl PartialOrd for ChangeOrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Returns the instance changes of a batch in application order.
///
/// Type-level changes are dropped. A change repeated within the batch is
/// kept once, at its first occurrence.
pub fn order_changes(changes: &[Change]) -> Vec<&Change> {
    let mut ordered: BTreeMap<ChangeOrderKey, &Change> = BTreeMap::new();
    for change in changes {
        match ChangeOrderKey::of(change) {
            Some(key) => {
                ordered.entry(key).or_insert(change);
            }
            None => trace!(%change, "ignoring type-level change"),
        }
    }
    ordered.into_values().collect()
}
