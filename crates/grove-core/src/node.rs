//! The node arena and the four node kinds.
//!
//! All nodes live in one slab arena addressed by stable `NodeId` indices.
//! Parent/child relations are plain id lists inside the nodes; a leaf has
//! no parent at all: group membership is a non-owning id list, so the same
//! leaf can sit under many groups at once.
//!
//! Two parallel structures share the arena:
//!
//! - the *stored* scaffold: Title nodes and Rule chains, user-authored,
//! - the *derived* view: Group nodes computed from rules, plus the shared
//!   leaves.

use grove_model::{LeafData, SortKey};

use crate::template::ParsedLine;

/// Stable arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A stored heading. Children are homogeneous: either all Title nodes or a
/// single Rule node, never a mix.
#[derive(Debug, Clone, Default)]
pub struct TitleNode {
    pub title: String,
    pub children: Vec<NodeId>,
    pub is_open: bool,
    pub is_stale: bool,
}

impl TitleNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            children: Vec::new(),
            is_open: false,
            is_stale: false,
        }
    }
}

/// A stored grouping rule. Rules chain linearly through `child_rule`; they
/// never branch and never have Rule siblings.
#[derive(Debug, Clone)]
pub struct RuleNode {
    pub rule_line: ParsedLine,
    /// Orders the groups this rule produces.
    pub sort_fields: Vec<SortKey>,
    /// Orders leaves directly under a terminal rule.
    pub child_sort_fields: Vec<SortKey>,
    /// Whether the user chose the keys explicitly (vs. derived defaults).
    pub has_custom_sort_fields: bool,
    pub has_custom_child_sort_fields: bool,
    pub child_rule: Option<NodeId>,
    /// Derived groups from the last materialization pass.
    pub groups: Vec<NodeId>,
    pub is_open: bool,
    pub is_stale: bool,
}

impl RuleNode {
    pub fn new(rule_line: ParsedLine) -> Self {
        Self {
            rule_line,
            sort_fields: Vec::new(),
            child_sort_fields: Vec::new(),
            has_custom_sort_fields: false,
            has_custom_child_sort_fields: false,
            child_rule: None,
            groups: Vec::new(),
            is_open: true,
            is_stale: false,
        }
    }
}

/// A derived bucket of leaves sharing one rendered rule text. Never
/// persisted; identity (by title within the parent context) survives
/// materialization passes so open state is retained.
#[derive(Debug, Clone, Default)]
pub struct GroupNode {
    /// The rendered rule text; group identity within its parent.
    pub title: String,
    /// Non-owning references into the shared leaf pool.
    pub matching_leaves: Vec<NodeId>,
    /// Rule-field values from the first matching leaf; seeds "new node
    /// like this group" operations.
    pub data: LeafData,
    /// Nested groups when the owning rule has a child rule.
    pub child_groups: Vec<NodeId>,
    pub is_open: bool,
    pub is_stale: bool,
}

impl GroupNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// The only persisted, data-bearing node kind.
#[derive(Debug, Clone, Default)]
pub struct LeafNode {
    pub data: LeafData,
}

impl LeafNode {
    pub fn new(data: LeafData) -> Self {
        Self { data }
    }
}

/// Closed sum over the four node kinds; every operation matches
/// exhaustively instead of dispatching virtually.
#[derive(Debug, Clone)]
pub enum Node {
    Title(TitleNode),
    Rule(RuleNode),
    Group(GroupNode),
    Leaf(LeafNode),
}

impl Node {
    pub fn is_open(&self) -> bool {
        match self {
            Node::Title(title) => title.is_open,
            Node::Rule(rule) => rule.is_open,
            Node::Group(group) => group.is_open,
            Node::Leaf(_) => false,
        }
    }

    pub fn set_open(&mut self, open: bool) {
        match self {
            Node::Title(title) => title.is_open = open,
            Node::Rule(rule) => rule.is_open = open,
            Node::Group(group) => group.is_open = open,
            Node::Leaf(_) => {}
        }
    }

    pub fn is_stale(&self) -> bool {
        match self {
            Node::Title(title) => title.is_stale,
            Node::Rule(rule) => rule.is_stale,
            Node::Group(group) => group.is_stale,
            Node::Leaf(_) => false,
        }
    }

    pub fn set_stale(&mut self, stale: bool) {
        match self {
            Node::Title(title) => title.is_stale = stale,
            Node::Rule(rule) => rule.is_stale = stale,
            Node::Group(group) => group.is_stale = stale,
            Node::Leaf(_) => {}
        }
    }
}

/// Slab arena with free-list reuse. Ids stay valid until their node is
/// removed; removed slots are recycled.
#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.slots.get_mut(id.0)?.take();
        if node.is_some() {
            self.free.push(id.0);
        }
        node
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn title(&self, id: NodeId) -> Option<&TitleNode> {
        match self.get(id)? {
            Node::Title(title) => Some(title),
            _ => None,
        }
    }

    pub fn title_mut(&mut self, id: NodeId) -> Option<&mut TitleNode> {
        match self.get_mut(id)? {
            Node::Title(title) => Some(title),
            _ => None,
        }
    }

    pub fn rule(&self, id: NodeId) -> Option<&RuleNode> {
        match self.get(id)? {
            Node::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn rule_mut(&mut self, id: NodeId) -> Option<&mut RuleNode> {
        match self.get_mut(id)? {
            Node::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn group(&self, id: NodeId) -> Option<&GroupNode> {
        match self.get(id)? {
            Node::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn group_mut(&mut self, id: NodeId) -> Option<&mut GroupNode> {
        match self.get_mut(id)? {
            Node::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn leaf(&self, id: NodeId) -> Option<&LeafNode> {
        match self.get(id)? {
            Node::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn leaf_mut(&mut self, id: NodeId) -> Option<&mut LeafNode> {
        match self.get_mut(id)? {
            Node::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
