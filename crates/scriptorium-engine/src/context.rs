use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Data shared between the nodes of one execution.
///
/// Task outputs are stored under their `output_key`; later tasks and QA
/// nodes read them back through `input_keys` / `target_key`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    data: BTreeMap<String, serde_json::Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: BTreeMap<String, serde_json::Value>) -> Self {
        Self { data }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    pub fn data(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.data
    }

    /// Render the values of `keys` as a context block followed by `base`.
    /// Missing keys are skipped.
    pub fn build_prompt(&self, keys: &[String], base: &str) -> String {
        let mut prompt = String::new();
        let present: Vec<(&String, &serde_json::Value)> = keys
            .iter()
            .filter_map(|k| self.data.get(k).map(|v| (k, v)))
            .collect();

        if !present.is_empty() {
            prompt.push_str("## Context\n\n");
            for (key, value) in present {
                prompt.push_str(&format!("**{}**: {}\n", key, display(value)));
            }
            prompt.push_str("\n---\n\n");
        }

        prompt.push_str(base);
        prompt
    }
}

pub(crate) fn display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let mut ctx = ExecutionContext::new();
        ctx.set_str("title", "Quarterly report");
        ctx.set("pages", json!(12));
        assert_eq!(ctx.get_str("title"), Some("Quarterly report"));
        assert_eq!(ctx.get("pages"), Some(&json!(12)));
        assert_eq!(ctx.get_str("pages"), None);
    }

    #[test]
    fn test_build_prompt_with_inputs() {
        let mut ctx = ExecutionContext::new();
        ctx.set_str("brief", "A short guide");
        ctx.set("sections", json!(["intro", "usage"]));
        let prompt = ctx.build_prompt(
            &["brief".into(), "sections".into(), "missing".into()],
            "Write the draft.",
        );
        assert!(prompt.contains("**brief**: A short guide"));
        assert!(prompt.contains("**sections**: [\"intro\",\"usage\"]"));
        assert!(!prompt.contains("missing"));
        assert!(prompt.ends_with("Write the draft."));
    }

    #[test]
    fn test_build_prompt_without_inputs() {
        let ctx = ExecutionContext::new();
        assert_eq!(ctx.build_prompt(&[], "Just do it."), "Just do it.");
    }
}
