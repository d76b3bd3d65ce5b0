//! The reversible command log.
//!
//! Every structural or data mutation pushes one entry. An entry's command
//! knows how to apply its own inverse against the model and hand back the
//! inverse command. The inverse of adding a leaf is deleting it (carrying
//! the removed instance), so redo is simply "undo the inverse".
//!
//! Stored scaffold nodes are addressed by child-index paths from the root,
//! not by node reference, so recorded entries stay valid across
//! intervening structural edits. Entries older than the retention horizon
//! are dropped at persistence time only; the in-session log is never
//! pruned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use grove_model::{GroveError, LeafData, Result, SortKey};

use crate::engine::TreeModel;
use crate::stored::StoredNode;

/// Child-index path from the root title to a stored node. The addressed
/// node may be a Title node or the top of a Rule chain.
pub type NodePath = Vec<usize>;

/// Address of one rule in a chain: the path to the chain's top rule node
/// plus how many `child_rule` links to follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePath {
    pub path: NodePath,
    #[serde(default)]
    pub depth: usize,
}

/// One reversible mutation. The variant describes the operation that was
/// performed; `undo` reverses it and returns the command that would redo
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UndoCommand {
    /// A leaf was appended or restored at `pool_index`.
    AddLeaf { pool_index: usize },
    /// A leaf was removed from `pool_index`; `data` is the removed
    /// instance, kept for re-insertion at the original index.
    DeleteLeaf { pool_index: usize, data: LeafData },
    /// A leaf was edited; `data` is the pre-edit snapshot.
    EditLeaf { pool_index: usize, data: LeafData },
    /// A title node's text changed; `text` is the previous text.
    EditTitle { path: NodePath, text: String },
    /// A field's format string changed (an AutoChoice option list grew);
    /// `format` is the previous format.
    EditFieldFormat { name: String, format: String },
    /// A rule's template changed; `rule_text` is the previous template.
    EditRule { path: RulePath, rule_text: String },
    /// A rule's group sort keys were replaced.
    SetSortKeys {
        path: RulePath,
        keys: Vec<SortKey>,
        custom: bool,
    },
    /// A rule's leaf sort keys were replaced.
    SetChildSortKeys {
        path: RulePath,
        keys: Vec<SortKey>,
        custom: bool,
    },
    /// A stored node was inserted at `path`.
    AddStoredNode { path: NodePath },
    /// The stored node at `path` was deleted; `node` is its snapshot.
    DeleteStoredNode { path: NodePath, node: StoredNode },
    /// A title moved among its siblings.
    MoveTitle {
        parent: NodePath,
        from: usize,
        to: usize,
    },
    /// Commands applied together as one logical edit; undone in reverse
    /// order as a single entry.
    Batch { commands: Vec<UndoCommand> },
}

impl UndoCommand {
    /// Apply the inverse of this command and return the command that
    /// redoes it. Failures mean the log no longer matches the model: a
    /// corrupt entry, reported as a format error.
    pub fn undo(self, model: &mut TreeModel) -> Result<UndoCommand> {
        match self {
            UndoCommand::AddLeaf { pool_index } => {
                let data = model.remove_leaf_raw(pool_index)?;
                Ok(UndoCommand::DeleteLeaf { pool_index, data })
            }
            UndoCommand::DeleteLeaf { pool_index, data } => {
                model.insert_leaf_raw(pool_index, data)?;
                Ok(UndoCommand::AddLeaf { pool_index })
            }
            UndoCommand::EditLeaf { pool_index, data } => {
                let replaced = model.replace_leaf_raw(pool_index, data)?;
                Ok(UndoCommand::EditLeaf {
                    pool_index,
                    data: replaced,
                })
            }
            UndoCommand::EditTitle { path, text } => {
                let id = model
                    .resolve_path(&path)
                    .ok_or_else(|| corrupt("title path"))?;
                let title = model
                    .arena
                    .title_mut(id)
                    .ok_or_else(|| corrupt("title path"))?;
                let replaced = std::mem::replace(&mut title.title, text);
                Ok(UndoCommand::EditTitle {
                    path,
                    text: replaced,
                })
            }
            UndoCommand::EditFieldFormat { name, format } => {
                let field = model
                    .fields
                    .get_mut(&name)
                    .ok_or_else(|| corrupt("field"))?;
                let replaced = std::mem::replace(&mut field.format, format);
                Ok(UndoCommand::EditFieldFormat {
                    name,
                    format: replaced,
                })
            }
            UndoCommand::EditRule { path, rule_text } => {
                let replaced = model.set_rule_text_raw(&path, &rule_text)?;
                Ok(UndoCommand::EditRule {
                    path,
                    rule_text: replaced,
                })
            }
            UndoCommand::SetSortKeys { path, keys, custom } => {
                let id = model
                    .resolve_rule(&path)
                    .ok_or_else(|| corrupt("rule path"))?;
                let rule = model
                    .arena
                    .rule_mut(id)
                    .ok_or_else(|| corrupt("rule path"))?;
                let old_keys = std::mem::replace(&mut rule.sort_fields, keys);
                let old_custom = std::mem::replace(&mut rule.has_custom_sort_fields, custom);
                Ok(UndoCommand::SetSortKeys {
                    path,
                    keys: old_keys,
                    custom: old_custom,
                })
            }
            UndoCommand::SetChildSortKeys { path, keys, custom } => {
                let id = model
                    .resolve_rule(&path)
                    .ok_or_else(|| corrupt("rule path"))?;
                let rule = model
                    .arena
                    .rule_mut(id)
                    .ok_or_else(|| corrupt("rule path"))?;
                let old_keys = std::mem::replace(&mut rule.child_sort_fields, keys);
                let old_custom =
                    std::mem::replace(&mut rule.has_custom_child_sort_fields, custom);
                Ok(UndoCommand::SetChildSortKeys {
                    path,
                    keys: old_keys,
                    custom: old_custom,
                })
            }
            UndoCommand::AddStoredNode { path } => {
                let node = model.remove_stored_at(&path)?;
                Ok(UndoCommand::DeleteStoredNode { path, node })
            }
            UndoCommand::DeleteStoredNode { path, node } => {
                model.insert_stored_at(&path, &node)?;
                Ok(UndoCommand::AddStoredNode { path })
            }
            UndoCommand::MoveTitle { parent, from, to } => {
                model.move_title_raw(&parent, to, from)?;
                Ok(UndoCommand::MoveTitle {
                    parent,
                    from: to,
                    to: from,
                })
            }
            UndoCommand::Batch { commands } => {
                let mut inverses = Vec::with_capacity(commands.len());
                for command in commands.into_iter().rev() {
                    inverses.push(command.undo(model)?);
                }
                Ok(UndoCommand::Batch { commands: inverses })
            }
        }
    }
}

fn corrupt(what: &str) -> GroveError {
    GroveError::Format(format!("undo entry references a missing {what}"))
}

/// One log entry: a user-facing title, a timestamp, and the command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub title: String,
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub command: UndoCommand,
}

impl UndoEntry {
    pub fn new(title: impl Into<String>, command: UndoCommand) -> Self {
        Self {
            title: title.into(),
            time: Utc::now(),
            command,
        }
    }
}

/// The command log, oldest first.
#[derive(Debug, Clone, Default)]
pub struct UndoLog {
    entries: Vec<UndoEntry>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[UndoEntry] {
        &self.entries
    }

    pub fn push(&mut self, entry: UndoEntry) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries at or after the cutoff, oldest first. Used when persisting;
    /// the in-memory log itself is never pruned during a session.
    pub fn entries_since(&self, cutoff: DateTime<Utc>) -> Vec<UndoEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.time >= cutoff)
            .cloned()
            .collect()
    }
}

impl FromIterator<UndoEntry> for UndoLog {
    fn from_iter<I: IntoIterator<Item = UndoEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn entry_serializes_with_type_tag() {
        let entry = UndoEntry::new(
            "Delete leaf",
            UndoCommand::DeleteLeaf {
                pool_index: 3,
                data: LeafData::new(),
            },
        );
        let json = serde_json::to_value(&entry).expect("serialize entry");
        assert_eq!(json["type"], "DeleteLeaf");
        assert_eq!(json["title"], "Delete leaf");
        assert_eq!(json["pool_index"], 3);

        let round: UndoEntry = serde_json::from_value(json).expect("deserialize entry");
        assert_eq!(round, entry);
    }

    #[test]
    fn corrupt_record_fails_to_deserialize() {
        let bad = serde_json::json!({
            "title": "x",
            "time": "2024-01-01T00:00:00Z",
            "type": "AddLeaf"
        });
        assert!(serde_json::from_value::<UndoEntry>(bad).is_err());
    }

    #[test]
    fn entries_since_filters_by_time() {
        let mut log = UndoLog::new();
        let mut old = UndoEntry::new("old", UndoCommand::AddLeaf { pool_index: 0 });
        old.time = Utc::now() - TimeDelta::days(120);
        log.push(old);
        log.push(UndoEntry::new("new", UndoCommand::AddLeaf { pool_index: 1 }));

        let cutoff = Utc::now() - TimeDelta::days(90);
        let kept = log.entries_since(cutoff);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "new");
        // The in-memory log keeps everything.
        assert_eq!(log.len(), 2);
    }
}
