//! Repeat-avoiding conversation picker.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::domains::conversations::{Conversation, ConversationCatalog};
use crate::error::{EngineError, EngineResult};
use crate::kernel::BaseRandomizer;

/// Bounded FIFO of recently picked conversation ids.
#[derive(Debug, Clone, Default)]
pub struct RecentConversations {
    ids: VecDeque<String>,
    capacity: usize,
}

impl RecentConversations {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a pick, evicting the oldest ids past capacity.
    pub fn push(&mut self, id: String) {
        self.ids.push_back(id);
        while self.ids.len() > self.capacity {
            self.ids.pop_front();
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|recent| recent == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}

/// Pick a conversation uniformly among those not played recently.
///
/// Falls back to the whole catalog when every conversation is recent. The
/// pick is recorded in `recent`.
pub fn pick_conversation(
    catalog: &ConversationCatalog,
    recent: &mut RecentConversations,
    randomizer: &dyn BaseRandomizer,
) -> EngineResult<Arc<Conversation>> {
    if catalog.is_empty() {
        return Err(EngineError::EmptyCatalog);
    }

    let mut eligible: Vec<&Arc<Conversation>> =
        catalog.iter().filter(|c| !recent.contains(&c.id)).collect();
    if eligible.is_empty() {
        eligible = catalog.iter().collect();
    }

    let chosen = eligible[randomizer.pick_index(eligible.len())].clone();
    recent.push(chosen.id.clone());
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::conversations::ScriptedMessage;
    use crate::kernel::{FastRandomizer, ScriptedRandomizer};

    fn catalog_of(size: usize) -> ConversationCatalog {
        ConversationCatalog::new(
            (0..size)
                .map(|i| Conversation {
                    id: format!("c{i}"),
                    participants: vec!["a".into()],
                    messages: vec![ScriptedMessage {
                        from: "a".into(),
                        text: format!("line {i}"),
                        delay_ms: 0,
                    }],
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_catalog_is_fatal() {
        let mut recent = RecentConversations::new(5);
        let err = pick_conversation(&catalog_of(0), &mut recent, &FastRandomizer).unwrap_err();
        assert!(matches!(err, EngineError::EmptyCatalog));
        assert!(recent.is_empty());
    }

    #[test]
    fn test_no_repeat_within_window() {
        let catalog = catalog_of(50);
        let window = 15;
        let mut recent = RecentConversations::new(window);
        let mut history: Vec<String> = Vec::new();

        for _ in 0..500 {
            let picked = pick_conversation(&catalog, &mut recent, &FastRandomizer).unwrap();
            let start = history.len().saturating_sub(window);
            assert!(
                !history[start..].contains(&picked.id),
                "{} repeated within {} picks",
                picked.id,
                window
            );
            history.push(picked.id.clone());
        }
    }

    #[test]
    fn test_falls_back_to_full_catalog_when_all_recent() {
        let catalog = catalog_of(2);
        let mut recent = RecentConversations::new(5);
        recent.push("c0".into());
        recent.push("c1".into());

        let rng = ScriptedRandomizer::new().with_indices([1]);
        let picked = pick_conversation(&catalog, &mut recent, &rng).unwrap();
        assert_eq!(picked.id, "c1");
    }

    #[test]
    fn test_recent_buffer_evicts_oldest() {
        let mut recent = RecentConversations::new(2);
        recent.push("a".into());
        recent.push("b".into());
        recent.push("c".into());
        assert_eq!(recent.ids(), vec!["b", "c"]);
        assert!(!recent.contains("a"));
    }

    #[test]
    fn test_zero_capacity_remembers_nothing() {
        let mut recent = RecentConversations::new(0);
        recent.push("a".into());
        assert!(recent.is_empty());
    }
}
