//! Parses the incoming message into a tree of [`MessageModelItem`]s, keyed
//! by path so the tree has no owning pointers — children are looked up by
//! key in a flat map, the same shape the evaluation tree's arena uses.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{EngineError, Result};
use crate::types::MessageModelItem;

#[derive(Debug, Deserialize)]
struct MessageNodeDoc {
    mnemonic: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    /// Child mnemonic -> ordered list of instances. A class normally has
    /// zero or one entry per mnemonic key in practice, but the shape is
    /// uniformly one-to-many so repeating elements fall out naturally.
    #[serde(default)]
    children: HashMap<String, Vec<MessageNodeDoc>>,
    #[serde(default)]
    raw: serde_json::Value,
}

#[derive(Debug)]
pub struct MessageTree {
    pub root_key: String,
    pub root_mnemonic: String,
    items: HashMap<String, MessageModelItem>,
}

impl MessageTree {
    /// Parses `raw`, rejecting it with [`EngineError::InvalidMessage`] if
    /// its root mnemonic doesn't match `expected_root_mnemonic`.
    pub fn parse(raw: &str, expected_root_mnemonic: &str) -> Result<Self> {
        let doc: MessageNodeDoc = serde_json::from_str(raw)
            .map_err(|e| EngineError::InvalidMessage(format!("malformed message: {e}")))?;

        if doc.mnemonic != expected_root_mnemonic {
            return Err(EngineError::InvalidMessage(format!(
                "message root mnemonic {} does not match model root {}",
                doc.mnemonic, expected_root_mnemonic
            )));
        }

        let mut items = HashMap::new();
        let root_key = doc.mnemonic.clone();
        build(&doc, root_key.clone(), None, None, &mut items);

        Ok(Self {
            root_mnemonic: doc.mnemonic.clone(),
            root_key,
            items,
        })
    }

    pub fn by_key(&self, key: &str) -> Option<&MessageModelItem> {
        self.items.get(key)
    }

    pub fn root(&self) -> &MessageModelItem {
        self.items.get(&self.root_key).expect("root always inserted")
    }
}

fn build(
    doc: &MessageNodeDoc,
    key: String,
    parent_key: Option<String>,
    element_sequence: Option<u32>,
    out: &mut HashMap<String, MessageModelItem>,
) {
    let mut element_instances_by_child: HashMap<String, Vec<String>> = HashMap::new();

    for (child_mnemonic, instances) in &doc.children {
        let mut keys = Vec::with_capacity(instances.len());
        for (idx, instance) in instances.iter().enumerate() {
            let seq = (idx + 1) as u32;
            let child_key = format!("{key}.{child_mnemonic}[{seq}]");
            build(instance, child_key.clone(), Some(key.clone()), Some(seq), out);
            keys.push(child_key);
        }
        element_instances_by_child.insert(child_mnemonic.clone(), keys);
    }

    // A node's direct element-instance list (used by the class item) is the
    // flattened set of all child keys; attribute lookups go through
    // `attributes` directly rather than `element_instances`.
    let element_instances: Vec<String> = element_instances_by_child
        .values()
        .flat_map(|v| v.iter().cloned())
        .collect();

    out.insert(
        key.clone(),
        MessageModelItem {
            key,
            parent_key,
            mnemonic: doc.mnemonic.clone(),
            element_sequence,
            message_text: doc.raw.clone(),
            attributes: doc.attributes.clone(),
            element_instances,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_root() {
        let err = MessageTree::parse(r#"{"mnemonic": "OTHER"}"#, "MSG").unwrap_err();
        assert!(matches!(err, EngineError::InvalidMessage(_)));
    }

    #[test]
    fn parses_nested_elements_with_sequence() {
        let raw = r#"{
            "mnemonic": "MSG",
            "children": {
                "PID": [{
                    "mnemonic": "PID",
                    "children": {
                        "ELEMENT": [
                            {"mnemonic": "ELEMENT", "attributes": {"value": "a"}},
                            {"mnemonic": "ELEMENT", "attributes": {"value": "b"}}
                        ]
                    }
                }]
            }
        }"#;
        let tree = MessageTree::parse(raw, "MSG").unwrap();
        let pid_key = "MSG.PID[1]";
        let pid = tree.by_key(pid_key).expect("pid item present");
        assert_eq!(pid.element_instances.len(), 2);
        let first = tree.by_key(&pid.element_instances[0]).unwrap();
        assert_eq!(first.element_sequence, Some(1));
        assert_eq!(first.attributes.get("value"), Some(&"a".to_string()));
    }
}
