use dashmap::DashMap;

/// Cache of topic-selector match results shared across the hub.
///
/// Transports receive it at construction and hand it back to the host;
/// they never evaluate selectors themselves.
#[derive(Debug)]
pub struct TopicSelectorStore {
    matches: DashMap<(String, String), bool>,
    capacity: usize,
}

impl TopicSelectorStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            matches: DashMap::new(),
            capacity,
        }
    }

    pub fn get(&self, selector: &str, topic: &str) -> Option<bool> {
        self.matches
            .get(&(selector.to_string(), topic.to_string()))
            .map(|e| *e.value())
    }

    /// Stores a match result; ignored once the cache is full.
    pub fn insert(&self, selector: &str, topic: &str, matched: bool) {
        if self.capacity == 0 || self.matches.len() >= self.capacity {
            return;
        }
        self.matches
            .insert((selector.to_string(), topic.to_string()), matched);
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl Default for TopicSelectorStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}
