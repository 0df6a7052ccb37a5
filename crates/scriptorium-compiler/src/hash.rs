use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CompileError;
use crate::item::BacklogItem;

/// The structural projection of an item. Field order is the serialization
/// order and must not change without bumping `GENERATOR_VERSION`.
#[derive(Serialize)]
struct CanonicalItem<'a> {
    id: &'a str,
    level: &'a str,
    priority: i64,
    depends_on: Vec<&'a str>,
    parent_id: Option<&'a str>,
}

/// SHA-256 (lowercase hex) over the structural fields of a backlog.
///
/// Titles and descriptions never influence the hash; any change to id,
/// level, integer priority, dependency set or parent does.
pub fn compute_backlog_hash(items: &[BacklogItem]) -> Result<String, CompileError> {
    let mut canonical: Vec<CanonicalItem<'_>> = items
        .iter()
        .map(|item| {
            let mut depends_on: Vec<&str> = item.depends_on.iter().map(String::as_str).collect();
            depends_on.sort_unstable();
            depends_on.dedup();
            CanonicalItem {
                id: &item.id,
                level: &item.level,
                priority: item.priority_key(),
                depends_on,
                parent_id: item.parent_id.as_deref(),
            }
        })
        .collect();
    canonical.sort_by(|a, b| a.id.cmp(b.id));

    let bytes =
        serde_json::to_vec(&canonical).map_err(|e| CompileError::Serialize(e.to_string()))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backlog() -> Vec<BacklogItem> {
        vec![
            BacklogItem::new("E1", "epic").with_priority(3.0).with_title("Onboarding"),
            BacklogItem::new("F1", "feature")
                .with_parent("E1")
                .with_priority(2.0),
            BacklogItem::new("S1", "story")
                .with_parent("F1")
                .with_deps(&["S2", "S3"]),
            BacklogItem::new("S2", "story").with_parent("F1"),
            BacklogItem::new("S3", "story").with_parent("F1"),
        ]
    }

    fn hash(items: &[BacklogItem]) -> String {
        compute_backlog_hash(items).unwrap()
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let h = hash(&backlog());
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_ignores_descriptive_fields() {
        let base = hash(&backlog());
        let mut edited = backlog();
        edited[0].title = "Renamed".into();
        edited[2].description = "A much longer description".into();
        assert_eq!(hash(&edited), base);
    }

    #[test]
    fn test_hash_ignores_input_and_dependency_order() {
        let base = hash(&backlog());
        let mut edited = backlog();
        edited.reverse();
        edited.iter_mut().for_each(|i| i.depends_on.reverse());
        assert_eq!(hash(&edited), base);
    }

    #[test]
    fn test_hash_changes_on_structural_edits() {
        let base = hash(&backlog());
        let edits: Vec<Box<dyn Fn(&mut Vec<BacklogItem>)>> = vec![
            Box::new(|b| b[4].id = "S9".into()),
            Box::new(|b| b[1].level = "story".into()),
            Box::new(|b| b[0].priority_score = 4.0),
            Box::new(|b| b[3].depends_on = vec!["S3".into()]),
            Box::new(|b| b[3].parent_id = None),
        ];
        for edit in edits {
            let mut edited = backlog();
            edit(&mut edited);
            assert_ne!(hash(&edited), base);
        }
    }

    #[test]
    fn test_hash_uses_integer_priority() {
        let base = hash(&backlog());
        let mut edited = backlog();
        edited[0].priority_score = 3.7;
        assert_eq!(hash(&edited), base);
    }
}
