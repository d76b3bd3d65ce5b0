//! Tree materialization engine: templates, rules, derived groups, and the
//! reversible command log over a single owning model.

pub mod engine;
pub mod materialize;
pub mod node;
pub mod sort;
pub mod stored;
pub mod template;
pub mod undo;

pub use engine::TreeModel;
pub use materialize::{GroupUpdate, create_groups};
pub use node::{Arena, GroupNode, LeafNode, Node, NodeId, RuleNode, TitleNode};
pub use sort::sort_nodes;
pub use stored::StoredNode;
pub use template::{ParsedLine, Segment};
pub use undo::{NodePath, RulePath, UndoCommand, UndoEntry, UndoLog};
