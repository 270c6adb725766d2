//! Schema queries used while propagating changes.
//!
//! Hub properties carry generic bean names (`listenPort`); the tree uses xml
//! names (`listen-port`). Each node type gets a name table built once from
//! its model and cached here.

use crate::error::{WritebackError, WritebackResult};
use confhub_hub::{PropertyBag, Value, ValueKind};
use confhub_tree::{AttributeKind, NodeModel, PropertyModel, Schema};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The child slot that accepts an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotResolution {
    /// Bean name of the slot property.
    pub property: String,
    /// Element name the child is stored under.
    pub element_name: String,
    /// Type of the child.
    pub child_type: String,
    /// Single-valued slot.
    pub single: bool,
    /// Slot matched by child type rather than by name.
    pub wildcard: bool,
}

/// An attribute that can receive a property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetterResolution {
    /// Bean name of the matched attribute.
    pub bean_name: String,
    /// Xml name to write.
    pub xml_name: String,
    /// Declared kind of the attribute.
    pub kind: AttributeKind,
}

/// Bean name to xml name mapping of one node type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTable {
    attributes: BTreeMap<String, String>,
    elements: BTreeMap<String, String>,
}

impl NameTable {
    fn from_model(model: &NodeModel) -> Self {
        let mut table = Self::default();
        for property in &model.properties {
            let target = if property.is_attribute() {
                &mut table.attributes
            } else {
                &mut table.elements
            };
            target.insert(property.bean_name.clone(), property.xml_name.clone());
        }
        table
    }

    /// Returns the xml name of an attribute.
    pub fn attribute(&self, bean_name: &str) -> Option<&str> {
        self.attributes.get(bean_name).map(String::as_str)
    }

    /// Returns the xml name of a property, attribute or element.
    pub fn get(&self, bean_name: &str) -> Option<&str> {
        self.attribute(bean_name)
            .or_else(|| self.elements.get(bean_name).map(String::as_str))
    }
}

/// Read-only schema queries with a per-type name cache.
pub struct SchemaLookup {
    schema: Arc<Schema>,
    tables: RwLock<HashMap<String, Arc<NameTable>>>,
}

impl SchemaLookup {
    /// Creates a lookup over a schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the model of a type.
    pub fn model(&self, type_name: &str) -> Option<&NodeModel> {
        self.schema.model(type_name)
    }

    /// Resolves the slot of `parent_type` that accepts `element_name`.
    ///
    /// A named slot wins over wildcard slots. A wildcard slot matches when
    /// its child type is written under `element_name`. When `child_type` is
    /// given, only slots holding that type are considered. More than one
    /// matching wildcard slot is an error.
    pub fn resolve_child_slot(
        &self,
        parent_type: &str,
        element_name: &str,
        child_type: Option<&str>,
    ) -> WritebackResult<Option<SlotResolution>> {
        let Some(parent) = self.schema.model(parent_type) else {
            return Ok(None);
        };
        let accepts = |slot_type: Option<&str>| child_type.is_none() || slot_type == child_type;

        let named = parent
            .elements()
            .filter(|p| !p.is_wildcard())
            .find(|p| p.xml_name == element_name && accepts(p.child_type()));
        if let Some(slot) = named {
            return Ok(Some(SlotResolution {
                property: slot.bean_name.clone(),
                element_name: slot.xml_name.clone(),
                child_type: slot.child_type().unwrap_or_default().to_string(),
                single: slot.is_single(),
                wildcard: false,
            }));
        }

        let wildcards: Vec<_> = parent
            .wildcards()
            .filter(|p| accepts(p.child_type()))
            .filter(|p| {
                p.child_type()
                    .and_then(|t| self.schema.model(t))
                    .is_some_and(|m| m.element_name == element_name)
            })
            .collect();

        match wildcards.as_slice() {
            [] => Ok(None),
            [slot] => Ok(Some(SlotResolution {
                property: slot.bean_name.clone(),
                element_name: element_name.to_string(),
                child_type: slot.child_type().unwrap_or_default().to_string(),
                single: slot.is_single(),
                wildcard: true,
            })),
            many => Err(WritebackError::AmbiguousSlot {
                parent_type: parent_type.to_string(),
                element: element_name.to_string(),
                count: many.len(),
            }),
        }
    }

    /// Returns the cached name table of a type.
    pub fn names(&self, type_name: &str) -> Option<Arc<NameTable>> {
        if let Some(table) = self.tables.read().get(type_name) {
            return Some(Arc::clone(table));
        }
        let model = self.schema.model(type_name)?;
        let table = Arc::new(NameTable::from_model(model));
        self.tables
            .write()
            .insert(type_name.to_string(), Arc::clone(&table));
        Some(table)
    }

    /// Returns the tree-side name of a generic property.
    pub fn property_to_element_name(&self, type_name: &str, property: &str) -> Option<String> {
        self.names(type_name)?.get(property).map(str::to_string)
    }

    /// Converts a property bag into tree attributes.
    ///
    /// Properties without an attribute counterpart, null values and
    /// structured values are dropped.
    pub fn translate(&self, type_name: &str, bag: &PropertyBag) -> BTreeMap<String, String> {
        let Some(names) = self.names(type_name) else {
            return BTreeMap::new();
        };
        bag.iter()
            .filter_map(|(name, value)| {
                let xml = names.attribute(name)?;
                Some((xml.to_string(), value.to_attribute_string()?))
            })
            .collect()
    }

    /// Finds the attribute of `type_name` that can take `value` for `property`.
    ///
    /// The exact bean name is tried first, then names that match once the
    /// property is capitalized from the left one character at a time, then
    /// a case-insensitive match. Candidates whose kind cannot hold the value
    /// are passed over; an integer may go into a float attribute.
    pub fn resolve_setter(&self, type_name: &str, property: &str, value: &Value) -> Option<SetterResolution> {
        let model = self.schema.model(type_name)?;
        let fits = |kind: AttributeKind| kind_accepts(kind, value.kind());
        let resolved = |p: &PropertyModel| SetterResolution {
            bean_name: p.bean_name.clone(),
            xml_name: p.xml_name.clone(),
            kind: p.attribute_kind().unwrap_or_default(),
        };

        if let Some(p) = model
            .attributes()
            .find(|p| p.bean_name == property && fits(p.attribute_kind().unwrap_or_default()))
        {
            return Some(resolved(p));
        }

        for candidate in capitalizations(property) {
            let hit = model.attributes().find(|p| {
                capitalize(&p.bean_name) == candidate && fits(p.attribute_kind().unwrap_or_default())
            });
            if let Some(p) = hit {
                return Some(resolved(p));
            }
        }

        model
            .attributes()
            .find(|p| {
                p.bean_name.eq_ignore_ascii_case(property) && fits(p.attribute_kind().unwrap_or_default())
            })
            .map(resolved)
    }
}

fn kind_accepts(kind: AttributeKind, value: ValueKind) -> bool {
    match (kind, value) {
        (_, ValueKind::Null) => true,
        (AttributeKind::Text, v) => !matches!(v, ValueKind::List | ValueKind::Map),
        (AttributeKind::Bool, ValueKind::Bool) => true,
        (AttributeKind::Int, ValueKind::Integer) => true,
        (AttributeKind::Float, ValueKind::Float | ValueKind::Integer) => true,
        _ => false,
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `port` yields `Port`, `POrt`, `PORt`, `PORT`.
///
/// The walk stops at the first character that is already upper case, after
/// trying the name with the prefix before it raised.
fn capitalizations(name: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (i, c) in name.char_indices() {
        let end = if c.is_uppercase() { i } else { i + c.len_utf8() };
        let mut candidate = name[..end].to_uppercase();
        candidate.push_str(&name[end..]);
        out.push(candidate);
        if c.is_uppercase() {
            break;
        }
    }
    out
}
