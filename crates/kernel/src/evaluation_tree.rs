//! Zips the entity model with the message tree into the evaluation tree:
//! root -> class -> element instances -> attributes. Held in an arena so
//! parent/child/result cross-references are plain integer handles.

use std::collections::HashMap;

use crate::message_tree::MessageTree;
use crate::reference_data::ReferenceDataIndex;
use crate::types::{EntityType, EvaluationResult, NodeId};

pub struct EvaluationItem {
    pub id: NodeId,
    pub key: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub entity_mnemonic: String,
    pub item_type: EntityType,
    pub root_mnemonic: String,
    pub class_mnemonic: Option<String>,
    pub element_mnemonic: Option<String>,
    pub element_sequence: Option<u32>,
    /// Key into the message tree, present for Root/Class/Element items
    /// whose message data exists.
    pub message_item_key: Option<String>,
    /// Inline value for Attribute items (attributes aren't separate nodes
    /// in the message tree).
    pub attribute_value: Option<String>,
    /// The raw message payload at this node (root/class/element items),
    /// so SAMs can read fields the model doesn't surface as attributes.
    pub message_text: serde_json::Value,
    /// Every result slot the planner materialized for this item, keyed by
    /// `"{samMnemonic}.{sequence}"` — including conditional/dependent
    /// slots, which the aggregator skips but a structural SAM still needs
    /// to see.
    pub criteria_results: HashMap<String, EvaluationResult>,
    /// Same keying, restricted to the slots that actually ran to
    /// completion: every non-gated result, plus conditional/dependent
    /// results that did not end up Skipped. A gate that fired and skipped
    /// its dependent is absent here even though the slot still exists in
    /// `criteria_results`.
    pub full_results: HashMap<String, EvaluationResult>,
}

impl EvaluationItem {
    pub fn criteria_result(&self, sam_mnemonic: &str, sequence: u32) -> Option<&EvaluationResult> {
        self.criteria_results.get(&format!("{sam_mnemonic}.{sequence}"))
    }
}

pub struct EvaluationTree {
    arena: Vec<EvaluationItem>,
    by_key: HashMap<String, NodeId>,
    pub root: NodeId,
}

impl EvaluationTree {
    pub fn get(&self, id: NodeId) -> &EvaluationItem {
        &self.arena[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut EvaluationItem {
        &mut self.arena[id.0]
    }

    pub fn by_key(&self, key: &str) -> Option<NodeId> {
        self.by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Post-order iteration: every descendant of a node precedes it.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.arena.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, visited_children)) = stack.pop() {
            if visited_children {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.get(id).children.iter().rev() {
                stack.push((child, false));
            }
        }
        out
    }

    fn alloc(&mut self, item: EvaluationItem) -> NodeId {
        let id = NodeId(self.arena.len());
        self.by_key.insert(item.key.clone(), id);
        self.arena.push(item);
        id
    }

    pub fn build(reference_data: &ReferenceDataIndex, message: &MessageTree) -> Self {
        let mut tree = EvaluationTree {
            arena: Vec::new(),
            by_key: HashMap::new(),
            root: NodeId(0),
        };

        let root_entity = &reference_data.root_entity;
        let root_message_key = message.by_key(&message.root_key).map(|_| message.root_key.clone());
        let root_id = tree.alloc(EvaluationItem {
            id: NodeId(0),
            key: root_entity.mnemonic.clone(),
            parent: None,
            children: Vec::new(),
            entity_mnemonic: root_entity.mnemonic.clone(),
            item_type: EntityType::Root,
            root_mnemonic: root_entity.mnemonic.clone(),
            class_mnemonic: None,
            element_mnemonic: None,
            element_sequence: None,
            message_item_key: root_message_key,
            attribute_value: None,
            message_text: message.root().message_text.clone(),
            criteria_results: HashMap::new(),
            full_results: HashMap::new(),
        });
        tree.root = root_id;

        let mut class_entities: Vec<_> = root_entity.children.iter().collect();
        class_entities.sort_by(|a, b| a.name.cmp(&b.name));

        for class_entity in class_entities {
            let class_key = format!("{}.{}[1]", root_entity.mnemonic, class_entity.mnemonic);
            let class_message_item = message.by_key(&class_key);

            let class_id = tree.alloc(EvaluationItem {
                id: NodeId(0),
                key: class_key.clone(),
                parent: Some(root_id),
                children: Vec::new(),
                entity_mnemonic: class_entity.mnemonic.clone(),
                item_type: EntityType::Class,
                root_mnemonic: root_entity.mnemonic.clone(),
                class_mnemonic: Some(class_entity.mnemonic.clone()),
                element_mnemonic: None,
                element_sequence: None,
                message_item_key: class_message_item.map(|_| class_key.clone()),
                attribute_value: None,
                message_text: class_message_item.map(|i| i.message_text.clone()).unwrap_or(serde_json::Value::Null),
                criteria_results: HashMap::new(),
                full_results: HashMap::new(),
            });
            tree.get_mut(class_id).id = class_id;
            tree.get_mut(root_id).children.push(class_id);

            let Some(class_item) = class_message_item else {
                continue;
            };
            let Some(element_template) = class_entity.first_child() else {
                continue;
            };

            let mut instances: Vec<_> = class_item
                .element_instances
                .iter()
                .filter_map(|k| message.by_key(k))
                .collect();
            instances.sort_by_key(|i| i.element_sequence.unwrap_or(0));

            for element_message_item in instances {
                let element_key = element_message_item.key.clone();
                let element_id = tree.alloc(EvaluationItem {
                    id: NodeId(0),
                    key: element_key.clone(),
                    parent: Some(class_id),
                    children: Vec::new(),
                    entity_mnemonic: element_template.mnemonic.clone(),
                    item_type: EntityType::Element,
                    root_mnemonic: root_entity.mnemonic.clone(),
                    class_mnemonic: Some(class_entity.mnemonic.clone()),
                    element_mnemonic: Some(element_template.mnemonic.clone()),
                    element_sequence: element_message_item.element_sequence,
                    message_item_key: Some(element_key.clone()),
                    attribute_value: None,
                    message_text: element_message_item.message_text.clone(),
                    criteria_results: HashMap::new(),
                    full_results: HashMap::new(),
                });
                tree.get_mut(element_id).id = element_id;
                tree.get_mut(class_id).children.push(element_id);

                let mut attr_entities: Vec<_> = element_template.children.iter().collect();
                attr_entities.sort_by(|a, b| a.name.cmp(&b.name));

                for attr_entity in attr_entities {
                    let attr_key = format!("{element_key}.{}", attr_entity.mnemonic);
                    let attr_value = element_message_item.attributes.get(&attr_entity.mnemonic).cloned();
                    let attr_id = tree.alloc(EvaluationItem {
                        id: NodeId(0),
                        key: attr_key.clone(),
                        parent: Some(element_id),
                        children: Vec::new(),
                        entity_mnemonic: attr_entity.mnemonic.clone(),
                        item_type: EntityType::Attribute,
                        root_mnemonic: root_entity.mnemonic.clone(),
                        class_mnemonic: Some(class_entity.mnemonic.clone()),
                        element_mnemonic: Some(element_template.mnemonic.clone()),
                        element_sequence: element_message_item.element_sequence,
                        message_item_key: None,
                        attribute_value: attr_value,
                        message_text: serde_json::Value::Null,
                        criteria_results: HashMap::new(),
                        full_results: HashMap::new(),
                    });
                    tree.get_mut(attr_id).id = attr_id;
                    tree.get_mut(element_id).children.push(attr_id);
                }
            }
        }

        tree
    }
}
