//! Serializable snapshots of the stored scaffold.
//!
//! `StoredNode` is the persisted shape of Title nodes and Rule chains: it
//! appears in the saved document's `template` list and inside undo entries
//! that capture deleted subtrees. Derived Group nodes never appear here.

use serde::{Deserialize, Serialize};

use grove_model::{FieldSet, SortKey};

use crate::node::{Arena, Node, NodeId, RuleNode, TitleNode};
use crate::template::ParsedLine;

/// One stored scaffold node: a heading with children, or a rule chain.
///
/// Sort-field lists are present only when the user chose them explicitly;
/// absent lists mean "derive the defaults from the rule and field set".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredNode {
    Title {
        title: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<StoredNode>,
    },
    Rule {
        rule: String,
        #[serde(
            rename = "sortfields",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        sort_fields: Option<Vec<SortKey>>,
        #[serde(
            rename = "childsortfields",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        child_sort_fields: Option<Vec<SortKey>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        child: Option<Box<StoredNode>>,
    },
}

impl StoredNode {
    /// Snapshot a stored subtree out of the arena.
    ///
    /// Returns `None` when `id` does not point at a stored node kind.
    pub fn from_arena(arena: &Arena, id: NodeId) -> Option<StoredNode> {
        match arena.get(id)? {
            Node::Title(title) => Some(StoredNode::Title {
                title: title.title.clone(),
                children: title
                    .children
                    .iter()
                    .filter_map(|&child| StoredNode::from_arena(arena, child))
                    .collect(),
            }),
            Node::Rule(rule) => Some(StoredNode::Rule {
                rule: rule.rule_line.to_template_text(),
                sort_fields: rule
                    .has_custom_sort_fields
                    .then(|| rule.sort_fields.clone()),
                child_sort_fields: rule
                    .has_custom_child_sort_fields
                    .then(|| rule.child_sort_fields.clone()),
                child: rule
                    .child_rule
                    .and_then(|child| StoredNode::from_arena(arena, child))
                    .map(Box::new),
            }),
            Node::Group(_) | Node::Leaf(_) => None,
        }
    }

    /// Rebuild this snapshot inside the arena, returning the new root id.
    ///
    /// Rule templates are parsed against the current field set; default
    /// sort fields are left empty for the engine's refresh pass to fill.
    pub fn instantiate(&self, arena: &mut Arena, fields: &FieldSet) -> NodeId {
        match self {
            StoredNode::Title { title, children } => {
                let child_ids: Vec<NodeId> = children
                    .iter()
                    .map(|child| child.instantiate(arena, fields))
                    .collect();
                let mut node = TitleNode::new(title.clone());
                node.children = child_ids;
                arena.insert(Node::Title(node))
            }
            StoredNode::Rule {
                rule,
                sort_fields,
                child_sort_fields,
                child,
            } => {
                let child_id = child
                    .as_deref()
                    .map(|nested| nested.instantiate(arena, fields));
                let mut node = RuleNode::new(ParsedLine::parse(rule, fields));
                if let Some(keys) = sort_fields {
                    node.sort_fields = keys.clone();
                    node.has_custom_sort_fields = true;
                }
                if let Some(keys) = child_sort_fields {
                    node.child_sort_fields = keys.clone();
                    node.has_custom_child_sort_fields = true;
                }
                node.child_rule = child_id;
                arena.insert(Node::Rule(node))
            }
        }
    }
}
