//! Rules document and file persistence
//!
//! The persisted document is the same shape the control plane speaks:
//! a mapping from rule pattern to the nodes receiving matching metrics.
//! Both the in-memory merge and the on-disk file are append-only.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::node::NodeSpec;

/// The routing rules document
///
/// Patterns are kept in a sorted map so the persisted file and API
/// responses are stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesDocument {
    /// Rule pattern to the ordered list of receiving nodes
    #[serde(default)]
    pub rules: BTreeMap<String, Vec<NodeSpec>>,
}

impl RulesDocument {
    /// Parse a document from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).expect("rules document serialization cannot fail")
    }

    /// True when the document has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Merge another document into this one
    ///
    /// Unknown patterns are added; nodes not yet present under a pattern
    /// (compared by identity triple) are appended in the incoming order.
    /// Nothing is ever removed.
    pub fn merge(&mut self, incoming: &RulesDocument) {
        for (pattern, nodes) in &incoming.rules {
            let entry = self.rules.entry(pattern.clone()).or_default();
            for node in nodes {
                if !entry.contains(node) {
                    entry.push(node.clone());
                }
            }
        }
    }
}

/// Rules document bound to its backing file
///
/// Opening a store on a missing path writes an empty document first, so a
/// fresh deployment starts with a valid (if empty) rules file.
#[derive(Debug)]
pub struct RulesStore {
    path: PathBuf,
    document: RulesDocument,
}

impl RulesStore {
    /// Open the store, creating an empty rules file if none exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            let empty = RulesDocument::default();
            fs::write(&path, empty.to_json_pretty())
                .map_err(|e| ConfigError::io(path.display().to_string(), e))?;
            info!(path = %path.display(), "created empty rules file");
            return Ok(Self {
                path,
                document: empty,
            });
        }

        let bytes =
            fs::read(&path).map_err(|e| ConfigError::io(path.display().to_string(), e))?;
        let document = RulesDocument::from_slice(&bytes)?;
        debug!(
            path = %path.display(),
            rule_count = document.rules.len(),
            "loaded rules file"
        );

        Ok(Self { path, document })
    }

    /// The current document
    pub fn document(&self) -> &RulesDocument {
        &self.document
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge an incoming document and persist the result
    pub fn merge_and_save(&mut self, incoming: &RulesDocument) -> Result<()> {
        self.document.merge(incoming);
        fs::write(&self.path, self.document.to_json_pretty())
            .map_err(|e| ConfigError::io(self.path.display().to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(host: &str) -> NodeSpec {
        NodeSpec::new(host, 8125, 8126)
    }

    fn doc(entries: &[(&str, &[NodeSpec])]) -> RulesDocument {
        let mut document = RulesDocument::default();
        for (pattern, nodes) in entries {
            document
                .rules
                .insert(pattern.to_string(), nodes.to_vec());
        }
        document
    }

    #[test]
    fn test_parse_document() {
        let json = br#"{"rules": {"^foo\\.": [{"host": "a", "port": 8125, "mgmt_port": 8126}]}}"#;
        let document = RulesDocument::from_slice(json).unwrap();
        assert_eq!(document.rules["^foo\\."], vec![node("a")]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RulesDocument::from_slice(b"not json").is_err());
        assert!(RulesDocument::from_slice(br#"{"rules": [1, 2]}"#).is_err());
    }

    #[test]
    fn test_merge_adds_new_pattern() {
        let mut base = doc(&[("a", &[node("n1")])]);
        base.merge(&doc(&[("b", &[node("n2")])]));

        assert_eq!(base.rules.len(), 2);
        assert_eq!(base.rules["b"], vec![node("n2")]);
    }

    #[test]
    fn test_merge_appends_unseen_nodes() {
        let mut base = doc(&[("a", &[node("n1")])]);
        base.merge(&doc(&[("a", &[node("n1"), node("n2")])]));

        assert_eq!(base.rules["a"], vec![node("n1"), node("n2")]);
    }

    #[test]
    fn test_merge_never_removes() {
        let mut base = doc(&[("a", &[node("n1"), node("n2")])]);
        base.merge(&doc(&[("a", &[node("n2")])]));

        assert_eq!(base.rules["a"], vec![node("n1"), node("n2")]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let incoming = doc(&[("a", &[node("n1")]), ("b", &[node("n2")])]);

        let mut base = RulesDocument::default();
        base.merge(&incoming);
        let after_first = base.clone();
        base.merge(&incoming);

        assert_eq!(base, after_first);
    }

    #[test]
    fn test_open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        let store = RulesStore::open(&path).unwrap();
        assert!(store.document().is_empty());
        assert!(path.exists());

        // The created file is itself a loadable empty document
        let reopened = RulesStore::open(&path).unwrap();
        assert!(reopened.document().is_empty());
    }

    #[test]
    fn test_merge_and_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        let mut store = RulesStore::open(&path).unwrap();
        store
            .merge_and_save(&doc(&[("^foo", &[node("n1")])]))
            .unwrap();

        let reopened = RulesStore::open(&path).unwrap();
        assert_eq!(reopened.document(), store.document());
        assert_eq!(reopened.document().rules["^foo"], vec![node("n1")]);
    }

    #[test]
    fn test_open_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, b"{{{{").unwrap();

        assert!(RulesStore::open(&path).is_err());
    }
}
