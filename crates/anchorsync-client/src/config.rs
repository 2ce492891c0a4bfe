//! Client configuration

use anchorsync_core::DEFAULT_TAGS;

/// Per-client identity and defaults
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Namespace partition shared by cooperating clients
    pub zone: String,
    /// This participant's name; part of every uuid it derives
    pub party: String,
    /// Tags given to entities this client creates
    pub tags: String,
}

impl ClientConfig {
    pub fn new(zone: impl Into<String>, party: impl Into<String>) -> Self {
        ClientConfig {
            zone: zone.into(),
            party: party.into(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            zone: "default".to_string(),
            party: "anonymous".to_string(),
            tags: DEFAULT_TAGS.to_string(),
        }
    }
}
