use serde::{Deserialize, Serialize};

/// One node of a to-be-ordered backlog.
///
/// Produced upstream by an LLM and consumed read-only here. Only `id`,
/// `level`, `priority_score`, `depends_on` and `parent_id` are structural;
/// `title` and `description` never affect validation, order, or hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogItem {
    pub id: String,
    pub level: String,
    #[serde(default)]
    pub priority_score: f64,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl BacklogItem {
    /// Create an item with minimal configuration.
    pub fn new(id: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            level: level.into(),
            priority_score: 0.0,
            depends_on: vec![],
            parent_id: None,
            title: String::new(),
            description: String::new(),
        }
    }

    pub fn with_priority(mut self, score: f64) -> Self {
        self.priority_score = score;
        self
    }

    pub fn with_deps(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Integer priority used for both ordering and hashing.
    ///
    /// Truncates toward zero so that two backlogs with equal hashes always
    /// order identically.
    pub fn priority_key(&self) -> i64 {
        self.priority_score as i64
    }
}

/// A fixed N-level parent/child hierarchy, top level first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    levels: Vec<String>,
}

impl Hierarchy {
    pub fn new<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }

    /// Depth of a level name (0 = top), or `None` if unknown.
    pub fn depth(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == level)
    }

    /// The level name directly above `level`.
    pub fn parent_level(&self, level: &str) -> Option<&str> {
        match self.depth(level) {
            Some(d) if d > 0 => Some(self.levels[d - 1].as_str()),
            _ => None,
        }
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::new(["epic", "feature", "story"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_key_truncates() {
        assert_eq!(BacklogItem::new("a", "story").with_priority(7.9).priority_key(), 7);
        assert_eq!(BacklogItem::new("a", "story").with_priority(-1.5).priority_key(), -1);
    }

    #[test]
    fn test_hierarchy_levels() {
        let h = Hierarchy::default();
        assert_eq!(h.depth("epic"), Some(0));
        assert_eq!(h.depth("story"), Some(2));
        assert_eq!(h.depth("task"), None);
        assert_eq!(h.parent_level("story"), Some("feature"));
        assert_eq!(h.parent_level("epic"), None);
    }

    #[test]
    fn test_deserialize_minimal_item() {
        let item: BacklogItem =
            serde_json::from_str(r#"{"id": "S1", "level": "story"}"#).unwrap();
        assert!(item.depends_on.is_empty());
        assert!(item.parent_id.is_none());
        assert_eq!(item.priority_score, 0.0);
    }
}
