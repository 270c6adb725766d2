//! Writeback engine settings.

/// Hub commit phase at which changes are written into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropagationPhase {
    /// While the hub prepares the commit. A commit vetoed by another
    /// listener leaves the tree writes in place.
    #[default]
    Prepare,
    /// After the hub made the commit current.
    Commit,
}

/// Settings for a `WritebackListener`.
#[derive(Debug, Clone)]
pub struct WritebackConfig {
    /// Bean key of the name/value side-table.
    pub properties_key: String,
    /// Element name of side-table entries in the tree.
    pub property_element: String,
    /// Attribute holding an entry's name.
    pub name_attribute: String,
    /// Attribute holding an entry's value.
    pub value_attribute: String,
    /// Marker registered for writes through wildcard slots.
    pub wildcard: String,
    /// Commit phase that triggers propagation.
    pub phase: PropagationPhase,
}

impl Default for WritebackConfig {
    fn default() -> Self {
        Self {
            properties_key: "properties".to_string(),
            property_element: confhub_tree::PROPERTY_ELEMENT.to_string(),
            name_attribute: "name".to_string(),
            value_attribute: "value".to_string(),
            wildcard: confhub_tree::WILDCARD.to_string(),
            phase: PropagationPhase::Prepare,
        }
    }
}

impl WritebackConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bean key of the side-table.
    #[must_use]
    pub fn properties_key(mut self, key: impl Into<String>) -> Self {
        self.properties_key = key.into();
        self
    }

    /// Sets the element name of side-table entries.
    #[must_use]
    pub fn property_element(mut self, element: impl Into<String>) -> Self {
        self.property_element = element.into();
        self
    }

    /// Sets the name and value attributes of side-table entries.
    #[must_use]
    pub fn entry_attributes(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.name_attribute = name.into();
        self.value_attribute = value.into();
        self
    }

    /// Sets the wildcard marker.
    #[must_use]
    pub fn wildcard(mut self, marker: impl Into<String>) -> Self {
        self.wildcard = marker.into();
        self
    }

    /// Sets the propagation phase.
    #[must_use]
    pub fn phase(mut self, phase: PropagationPhase) -> Self {
        self.phase = phase;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WritebackConfig::default();
        assert_eq!(config.properties_key, "properties");
        assert_eq!(config.property_element, "property");
        assert_eq!(config.wildcard, "*");
        assert_eq!(config.phase, PropagationPhase::Prepare);
    }

    #[test]
    fn builder_pattern() {
        let config = WritebackConfig::new()
            .properties_key("props")
            .entry_attributes("key", "val")
            .phase(PropagationPhase::Commit);
        assert_eq!(config.properties_key, "props");
        assert_eq!(config.name_attribute, "key");
        assert_eq!(config.value_attribute, "val");
        assert_eq!(config.phase, PropagationPhase::Commit);
    }
}
