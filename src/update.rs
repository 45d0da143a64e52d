use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event published to the hub and fanned out to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl Update {
    pub fn new<T: Into<String>>(topics: impl IntoIterator<Item = T>, data: impl Into<String>) -> Self {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Gives the update a `urn:uuid:` identifier unless it already has one.
    ///
    /// Returns the identifier the update ends up with.
    pub fn assign_id(&mut self) -> &str {
        self.id
            .get_or_insert_with(|| format!("urn:uuid:{}", Uuid::new_v4()))
            .as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_id_generates_urn_uuid() {
        let mut update = Update::new(["https://example.com/books/1"], "{}");
        let id = update.assign_id().to_string();
        assert!(id.starts_with("urn:uuid:"));
        assert!(Uuid::parse_str(id.trim_start_matches("urn:uuid:")).is_ok());
    }

    #[test]
    fn assign_id_keeps_existing_identifier() {
        let mut update = Update::new(["a"], "x").with_id("custom-1");
        assert_eq!(update.assign_id(), "custom-1");
        assert_eq!(update.id.as_deref(), Some("custom-1"));
    }
}
