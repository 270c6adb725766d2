//! Schema model for config tree nodes.
//!
//! A `NodeModel` describes one node type: the element name it is written
//! under, its scalar attributes and the child slots it exposes. Every
//! property has two names: the generic (bean) name used by the hub and the
//! xml name used inside the tree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Element name of a slot that accepts children by type rather than name.
pub const WILDCARD: &str = "*";

/// Type name of the built-in name/value property node.
pub const PROPERTY_TYPE: &str = "Property";

/// Element name under which property nodes are stored.
pub const PROPERTY_ELEMENT: &str = "property";

/// Value domain of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    /// Any text.
    #[default]
    Text,
    /// `true` or `false`.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
}

impl AttributeKind {
    /// Returns true if `raw` is a valid rendering for this kind.
    pub fn check(&self, raw: &str) -> bool {
        match self {
            AttributeKind::Text => true,
            AttributeKind::Bool => raw == "true" || raw == "false",
            AttributeKind::Int => raw.parse::<i64>().is_ok(),
            AttributeKind::Float => raw.parse::<f64>().is_ok(),
        }
    }
}

/// Whether a property is a scalar attribute or a child slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PropertyKind {
    /// Scalar attribute.
    Attribute {
        /// Value domain.
        #[serde(default, rename = "type")]
        value_type: AttributeKind,
        /// Whether the attribute must always be present.
        #[serde(default)]
        required: bool,
    },
    /// Child slot.
    Element {
        /// Type name of the children held by the slot.
        child_type: String,
        /// Single-valued slot (otherwise an ordered list).
        #[serde(default)]
        single: bool,
    },
}

/// One property of a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyModel {
    /// Generic property name (`fooBar`).
    pub bean_name: String,
    /// Name inside the tree (`foo-bar`), or `*` for wildcard slots.
    #[serde(default)]
    pub xml_name: String,
    /// Attribute or element.
    #[serde(flatten)]
    pub kind: PropertyKind,
}

impl PropertyModel {
    /// Returns true for scalar attributes.
    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, PropertyKind::Attribute { .. })
    }

    /// Returns true for child slots.
    pub fn is_element(&self) -> bool {
        matches!(self.kind, PropertyKind::Element { .. })
    }

    /// Returns true for wildcard child slots.
    pub fn is_wildcard(&self) -> bool {
        self.is_element() && self.xml_name == WILDCARD
    }

    /// Returns the attribute kind, if this is an attribute.
    pub fn attribute_kind(&self) -> Option<AttributeKind> {
        match self.kind {
            PropertyKind::Attribute { value_type, .. } => Some(value_type),
            PropertyKind::Element { .. } => None,
        }
    }

    /// Returns the child type, if this is a child slot.
    pub fn child_type(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Element { child_type, .. } => Some(child_type),
            PropertyKind::Attribute { .. } => None,
        }
    }

    /// Returns true for single-valued child slots.
    pub fn is_single(&self) -> bool {
        matches!(self.kind, PropertyKind::Element { single: true, .. })
    }

    /// Returns true for required attributes.
    pub fn is_required(&self) -> bool {
        matches!(self.kind, PropertyKind::Attribute { required: true, .. })
    }
}

/// Describes one node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeModel {
    /// Type name (`ServerConfig`).
    pub type_name: String,
    /// Element name the node is written under (`server-config`).
    #[serde(default)]
    pub element_name: String,
    /// Xml name of the attribute that keys list elements.
    #[serde(default)]
    pub key: Option<String>,
    /// Whether the node carries a `property` name/value side-table.
    #[serde(default)]
    pub property_bag: bool,
    /// Attributes and child slots, in declaration order.
    #[serde(default)]
    pub properties: Vec<PropertyModel>,
}

impl NodeModel {
    /// Creates a model whose element name is derived from the type name.
    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            element_name: camel_to_xml(&type_name),
            type_name,
            key: None,
            property_bag: false,
            properties: Vec::new(),
        }
    }

    /// Sets the element name.
    #[must_use]
    pub fn with_element_name(mut self, element_name: impl Into<String>) -> Self {
        self.element_name = element_name.into();
        self
    }

    /// Adds an optional attribute whose xml name is derived from the bean name.
    #[must_use]
    pub fn with_attribute(self, bean_name: &str, kind: AttributeKind) -> Self {
        let xml = camel_to_xml(bean_name);
        self.with_attribute_named(bean_name, &xml, kind, false)
    }

    /// Adds a required attribute whose xml name is derived from the bean name.
    #[must_use]
    pub fn with_required_attribute(self, bean_name: &str, kind: AttributeKind) -> Self {
        let xml = camel_to_xml(bean_name);
        self.with_attribute_named(bean_name, &xml, kind, true)
    }

    /// Adds an attribute with an explicit xml name.
    #[must_use]
    pub fn with_attribute_named(
        mut self,
        bean_name: &str,
        xml_name: &str,
        kind: AttributeKind,
        required: bool,
    ) -> Self {
        self.properties.push(PropertyModel {
            bean_name: bean_name.to_string(),
            xml_name: xml_name.to_string(),
            kind: PropertyKind::Attribute {
                value_type: kind,
                required,
            },
        });
        self
    }

    /// Adds a named child slot.
    #[must_use]
    pub fn with_element(mut self, bean_name: &str, xml_name: &str, child_type: &str, single: bool) -> Self {
        self.properties.push(PropertyModel {
            bean_name: bean_name.to_string(),
            xml_name: xml_name.to_string(),
            kind: PropertyKind::Element {
                child_type: child_type.to_string(),
                single,
            },
        });
        self
    }

    /// Adds a wildcard child slot matched by child type.
    #[must_use]
    pub fn with_wildcard(self, bean_name: &str, child_type: &str, single: bool) -> Self {
        self.with_element(bean_name, WILDCARD, child_type, single)
    }

    /// Sets the key attribute (xml name).
    #[must_use]
    pub fn with_key(mut self, xml_name: &str) -> Self {
        self.key = Some(xml_name.to_string());
        self
    }

    /// Enables the `property` name/value side-table.
    #[must_use]
    pub fn with_property_bag(mut self) -> Self {
        self.property_bag = true;
        self.ensure_property_slot();
        self
    }

    fn ensure_property_slot(&mut self) {
        if self.property_bag && self.element(PROPERTY_ELEMENT).is_none() {
            self.properties.push(PropertyModel {
                bean_name: PROPERTY_ELEMENT.to_string(),
                xml_name: PROPERTY_ELEMENT.to_string(),
                kind: PropertyKind::Element {
                    child_type: PROPERTY_TYPE.to_string(),
                    single: false,
                },
            });
        }
    }

    /// Returns the attribute with the given xml name.
    pub fn attribute(&self, xml_name: &str) -> Option<&PropertyModel> {
        self.properties
            .iter()
            .find(|p| p.is_attribute() && p.xml_name == xml_name)
    }

    /// Returns the child slot with the given (non-wildcard) xml name.
    pub fn element(&self, xml_name: &str) -> Option<&PropertyModel> {
        self.properties
            .iter()
            .find(|p| p.is_element() && p.xml_name == xml_name)
    }

    /// Returns the property with the given bean name.
    pub fn property(&self, bean_name: &str) -> Option<&PropertyModel> {
        self.properties.iter().find(|p| p.bean_name == bean_name)
    }

    /// Returns all attributes.
    pub fn attributes(&self) -> impl Iterator<Item = &PropertyModel> {
        self.properties.iter().filter(|p| p.is_attribute())
    }

    /// Returns all child slots.
    pub fn elements(&self) -> impl Iterator<Item = &PropertyModel> {
        self.properties.iter().filter(|p| p.is_element())
    }

    /// Returns all wildcard child slots.
    pub fn wildcards(&self) -> impl Iterator<Item = &PropertyModel> {
        self.properties.iter().filter(|p| p.is_wildcard())
    }

    /// Fills derived names left empty by deserialization.
    fn normalize(&mut self) {
        if self.element_name.is_empty() {
            self.element_name = camel_to_xml(&self.type_name);
        }
        for property in &mut self.properties {
            if property.xml_name.is_empty() {
                property.xml_name = camel_to_xml(&property.bean_name);
            }
        }
        self.ensure_property_slot();
    }
}

/// The set of node types known to a config tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    models: BTreeMap<String, NodeModel>,
}

impl Schema {
    /// Creates a schema containing only the built-in `Property` type.
    pub fn new() -> Self {
        let mut schema = Self {
            models: BTreeMap::new(),
        };
        schema.register(
            NodeModel::new(PROPERTY_TYPE)
                .with_key("name")
                .with_required_attribute("name", AttributeKind::Text)
                .with_attribute("value", AttributeKind::Text)
                .with_attribute("description", AttributeKind::Text),
        );
        schema
    }

    /// Creates a schema from a list of models.
    pub fn from_models(models: impl IntoIterator<Item = NodeModel>) -> Self {
        let mut schema = Self::new();
        for model in models {
            schema.register(model);
        }
        schema
    }

    /// Registers (or replaces) a node type.
    pub fn register(&mut self, mut model: NodeModel) {
        model.normalize();
        self.models.insert(model.type_name.clone(), model);
    }

    /// Returns the model of a type.
    pub fn model(&self, type_name: &str) -> Option<&NodeModel> {
        self.models.get(type_name)
    }

    /// Returns all models ordered by type name.
    pub fn models(&self) -> impl Iterator<Item = &NodeModel> {
        self.models.values()
    }

    /// Returns the slot of `parent` that accepts a `child_type` node under `element_name`.
    ///
    /// Named slots match on element name and type; wildcard slots match
    /// when the child type's own element name equals `element_name`.
    pub fn accepting_slot<'a>(
        &'a self,
        parent: &'a NodeModel,
        element_name: &str,
        child_type: &str,
    ) -> Option<&'a PropertyModel> {
        parent.elements().find(|slot| {
            if slot.child_type() != Some(child_type) {
                return false;
            }
            if slot.is_wildcard() {
                self.model(child_type)
                    .is_some_and(|m| m.element_name == element_name)
            } else {
                slot.xml_name == element_name
            }
        })
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a camel-case name to its dashed xml form.
///
/// `ServerConfig` becomes `server-config`, `HTTPListener` becomes
/// `http-listener`.
pub fn camel_to_xml(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                    out.push('-');
                }
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
