//! The read-only library of scripted conversations.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::domains::conversations::Conversation;
use crate::error::{EngineError, EngineResult};

/// Ordered, validated set of conversations.
///
/// An empty catalog loads fine; picking from it is the error.
#[derive(Debug, Clone, Default)]
pub struct ConversationCatalog {
    conversations: Vec<Arc<Conversation>>,
}

impl ConversationCatalog {
    pub fn new(conversations: Vec<Conversation>) -> EngineResult<Self> {
        let catalog = Self {
            conversations: conversations.into_iter().map(Arc::new).collect(),
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a JSON array of conversations.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let conversations: Vec<Conversation> = serde_json::from_str(json)?;
        Self::new(conversations)
    }

    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for conversation in &self.conversations {
            if !seen.insert(conversation.id.as_str()) {
                return Err(EngineError::InvalidCatalog(format!(
                    "duplicate conversation id '{}'",
                    conversation.id
                )));
            }
            if conversation.messages.is_empty() {
                return Err(EngineError::InvalidCatalog(format!(
                    "conversation '{}' has no messages",
                    conversation.id
                )));
            }
            if let Some(stray) = conversation
                .messages
                .iter()
                .find(|m| !conversation.participants.contains(&m.from))
            {
                return Err(EngineError::InvalidCatalog(format!(
                    "conversation '{}' has a line from '{}' who is not a participant",
                    conversation.id, stray.from
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Conversation>> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Conversation>> {
        self.conversations.iter()
    }

    /// Every username that takes part in at least one conversation, sorted.
    pub fn participants(&self) -> Vec<String> {
        self.conversations
            .iter()
            .flat_map(|c| c.participants.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {
            "id": "weekend",
            "participants": ["maya", "theo"],
            "messages": [
                {"from": "maya", "text": "any plans this weekend?"},
                {"from": "theo", "text": "hiking if it doesn't rain", "delayMs": 4000}
            ]
        }
    ]"#;

    #[test]
    fn test_parses_json_catalog() {
        let catalog = ConversationCatalog::from_json_str(CATALOG).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.participants(), vec!["maya", "theo"]);
        assert_eq!(catalog.get("weekend").unwrap().messages[1].delay_ms, 4000);
    }

    #[test]
    fn test_empty_catalog_loads() {
        let catalog = ConversationCatalog::from_json_str("[]").unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_rejects_speaker_outside_participants() {
        let json = r#"[{"id":"x","participants":["a"],"messages":[{"from":"b","text":"hi"}]}]"#;
        let err = ConversationCatalog::from_json_str(json).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCatalog(_)));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let json = r#"[
            {"id":"x","participants":["a"],"messages":[{"from":"a","text":"hi"}]},
            {"id":"x","participants":["a"],"messages":[{"from":"a","text":"hey"}]}
        ]"#;
        assert!(ConversationCatalog::from_json_str(json).is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = ConversationCatalog::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, EngineError::CatalogParse(_)));
    }
}
