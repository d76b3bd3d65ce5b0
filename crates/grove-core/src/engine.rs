//! The top-level model owner and its edit operations.
//!
//! `TreeModel` owns the field set, the node arena, the leaf pool, the
//! stored scaffold, and the undo log; there is no global model reference,
//! every operation goes through one explicit owner.
//!
//! Every mutating operation validates first, mutates, pushes an undo
//! entry, and then re-materializes the open branches. Closed branches are
//! flagged stale instead of recomputed, so per-edit cost is bounded by the
//! visible subtree.

use grove_model::{Field, FieldSet, FieldType, GroveError, LeafData, Result, SortKey};

use crate::materialize::{self, create_groups};
use crate::node::{Arena, LeafNode, Node, NodeId, RuleNode, TitleNode};
use crate::sort;
use crate::stored::StoredNode;
use crate::template::ParsedLine;
use crate::undo::{RulePath, UndoCommand, UndoEntry, UndoLog};

/// One open document: fields, leaves, scaffold, derived view, and log.
#[derive(Debug)]
pub struct TreeModel {
    pub(crate) fields: FieldSet,
    pub(crate) arena: Arena,
    /// Global, order-preserving leaf collection. Leaves have no owning
    /// parent; groups reference them by id.
    pub(crate) leaf_pool: Vec<NodeId>,
    pub(crate) root: NodeId,
    title_line: ParsedLine,
    output_lines: Vec<ParsedLine>,
    pub(crate) undo_log: UndoLog,
    changed: bool,
    obsolete_group_titles: Vec<String>,
}

impl Default for TreeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeModel {
    /// An empty document: no fields, no leaves, one open root heading.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let mut root_node = TitleNode::new("");
        root_node.is_open = true;
        let root = arena.insert(Node::Title(root_node));
        Self {
            fields: FieldSet::new(),
            arena,
            leaf_pool: Vec::new(),
            root,
            title_line: ParsedLine::default(),
            output_lines: Vec::new(),
            undo_log: UndoLog::new(),
            changed: false,
            obsolete_group_titles: Vec::new(),
        }
    }

    /// Rebuild a model from persisted parts. Field formats are checked up
    /// front; a bad format aborts the load.
    pub fn from_parts(
        fields: FieldSet,
        template: &[StoredNode],
        title_line: &str,
        output_lines: &[String],
        leaves: Vec<LeafData>,
        undo_entries: Vec<UndoEntry>,
    ) -> Result<Self> {
        fields.check_formats()?;
        let mut model = Self::new();
        model.fields = fields;
        model.title_line = ParsedLine::parse(title_line, &model.fields);
        model.output_lines = output_lines
            .iter()
            .map(|line| ParsedLine::parse(line, &model.fields))
            .collect();

        for stored in template {
            let id = stored.instantiate(&mut model.arena, &model.fields);
            let root = model.root;
            if let Some(root_title) = model.arena.title_mut(root) {
                root_title.children.push(id);
            }
        }
        for data in leaves {
            let id = model.arena.insert(Node::Leaf(LeafNode::new(data)));
            model.leaf_pool.push(id);
        }
        model.undo_log = undo_entries.into_iter().collect();
        model.refresh_rule_defaults();
        model.update_all();
        model.changed = false;
        Ok(model)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_pool.len()
    }

    pub fn leaf_id(&self, pool_index: usize) -> Option<NodeId> {
        self.leaf_pool.get(pool_index).copied()
    }

    pub fn leaf_data(&self, pool_index: usize) -> Option<&LeafData> {
        let id = self.leaf_id(pool_index)?;
        self.arena.leaf(id).map(|leaf| &leaf.data)
    }

    pub fn title_line_text(&self) -> String {
        self.title_line.to_template_text()
    }

    pub fn output_line_texts(&self) -> Vec<String> {
        self.output_lines
            .iter()
            .map(ParsedLine::to_template_text)
            .collect()
    }

    pub fn undo_log(&self) -> &UndoLog {
        &self.undo_log
    }

    /// Snapshot of the stored scaffold, as persisted under `template`.
    pub fn stored_template(&self) -> Vec<StoredNode> {
        self.arena
            .title(self.root)
            .map(|root| {
                root.children
                    .iter()
                    .filter_map(|&child| StoredNode::from_arena(&self.arena, child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Observer hook: true once per change since the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Group titles discarded since the last call; collapsed-state
    /// bookkeeping held outside the engine can drop them.
    pub fn take_obsolete_group_titles(&mut self) -> Vec<String> {
        std::mem::take(&mut self.obsolete_group_titles)
    }

    /// Render the document title line for one leaf.
    pub fn leaf_title(&self, pool_index: usize) -> Option<String> {
        let data = self.leaf_data(pool_index)?;
        Some(self.title_line.render(&self.fields, data))
    }

    /// Render the output lines for one leaf. Lines whose field segments
    /// are all empty are suppressed; a full-line separator repeats the
    /// whole line per value.
    pub fn leaf_output(&self, pool_index: usize) -> Vec<String> {
        let Some(data) = self.leaf_data(pool_index) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for line in &self.output_lines {
            let full_line = line
                .multi_value_field(&self.fields)
                .ok()
                .flatten()
                .is_some_and(Field::is_full_line_separator);
            if full_line {
                if let Ok(rendered) = line.render_multi(&self.fields, data) {
                    out.extend(rendered);
                    continue;
                }
            }
            let rendered = line.render(&self.fields, data);
            if !rendered.is_empty() {
                out.push(rendered);
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Leaf operations
    // ------------------------------------------------------------------

    /// Append a new leaf to the pool. Returns its pool index.
    pub fn add_leaf(&mut self, data: LeafData) -> Result<usize> {
        let data = self.clean_and_validate(data)?;
        let format_restores = self.observe_auto_choices(&data);
        let id = self.arena.insert(Node::Leaf(LeafNode::new(data)));
        self.leaf_pool.push(id);
        let pool_index = self.leaf_pool.len() - 1;
        let command = batch_with(format_restores, UndoCommand::AddLeaf { pool_index });
        self.push_undo("Add node", command);
        self.after_edit();
        Ok(pool_index)
    }

    /// Replace a leaf's data in place.
    pub fn edit_leaf(&mut self, pool_index: usize, data: LeafData) -> Result<()> {
        if pool_index >= self.leaf_pool.len() {
            return Err(GroveError::Validation(format!(
                "no node at position {pool_index}"
            )));
        }
        let data = self.clean_and_validate(data)?;
        let format_restores = self.observe_auto_choices(&data);
        let previous = self.replace_leaf_raw(pool_index, data)?;
        let command = batch_with(
            format_restores,
            UndoCommand::EditLeaf {
                pool_index,
                data: previous,
            },
        );
        self.push_undo("Edit node", command);
        self.after_edit();
        Ok(())
    }

    /// Remove a leaf; the removed instance rides in the undo entry so an
    /// undo restores it at the original pool index.
    pub fn delete_leaf(&mut self, pool_index: usize) -> Result<()> {
        if pool_index >= self.leaf_pool.len() {
            return Err(GroveError::Validation(format!(
                "no node at position {pool_index}"
            )));
        }
        let data = self.remove_leaf_raw(pool_index)?;
        self.push_undo("Delete node", UndoCommand::DeleteLeaf { pool_index, data });
        self.after_edit();
        Ok(())
    }

    pub(crate) fn remove_leaf_raw(&mut self, pool_index: usize) -> Result<LeafData> {
        if pool_index >= self.leaf_pool.len() {
            return Err(GroveError::Format(format!(
                "leaf index {pool_index} out of range"
            )));
        }
        let id = self.leaf_pool.remove(pool_index);
        match self.arena.remove(id) {
            Some(Node::Leaf(leaf)) => Ok(leaf.data),
            _ => Err(GroveError::Format("leaf pool out of sync".into())),
        }
    }

    pub(crate) fn insert_leaf_raw(&mut self, pool_index: usize, data: LeafData) -> Result<()> {
        if pool_index > self.leaf_pool.len() {
            return Err(GroveError::Format(format!(
                "leaf index {pool_index} out of range"
            )));
        }
        let id = self.arena.insert(Node::Leaf(LeafNode::new(data)));
        self.leaf_pool.insert(pool_index, id);
        Ok(())
    }

    pub(crate) fn replace_leaf_raw(
        &mut self,
        pool_index: usize,
        data: LeafData,
    ) -> Result<LeafData> {
        let id = self
            .leaf_id(pool_index)
            .ok_or_else(|| GroveError::Format(format!("leaf index {pool_index} out of range")))?;
        let leaf = self
            .arena
            .leaf_mut(id)
            .ok_or_else(|| GroveError::Format("leaf pool out of sync".into()))?;
        Ok(std::mem::replace(&mut leaf.data, data))
    }

    /// Drop values for unknown fields (leftovers from deleted fields) and
    /// reject values a field's validation refuses.
    fn clean_and_validate(&self, data: LeafData) -> Result<LeafData> {
        let mut cleaned = LeafData::new();
        for (name, values) in data.iter() {
            let Some(field) = self.fields.get(name) else {
                tracing::debug!(field = name, "dropping stored value for unknown field");
                continue;
            };
            if values.len() > 1 && !field.allow_multiples {
                return Err(GroveError::Validation(format!(
                    "field \"{name}\" does not allow multiple values"
                )));
            }
            for value in values {
                if let Some(message) = field.validate_message(value) {
                    return Err(GroveError::Validation(message));
                }
            }
            cleaned.set_values(name, values.to_vec());
        }
        Ok(cleaned)
    }

    /// Grow AutoChoice option lists from values just stored. Returns a
    /// restore command per field whose format changed, for batching into
    /// the triggering edit's undo entry.
    fn observe_auto_choices(&mut self, data: &LeafData) -> Vec<UndoCommand> {
        let observed: Vec<(String, Vec<String>)> = data
            .iter()
            .map(|(name, values)| (name.to_string(), values.to_vec()))
            .collect();
        let mut restores = Vec::new();
        for (name, values) in observed {
            if let Some(field) = self.fields.get_mut(&name) {
                let before = field.format.clone();
                for value in &values {
                    field.add_observed(value);
                }
                if field.format != before {
                    restores.push(UndoCommand::EditFieldFormat {
                        name,
                        format: before,
                    });
                }
            }
        }
        restores
    }

    // ------------------------------------------------------------------
    // Field operations
    //
    // Field-set edits are not represented in the undo command set; they
    // clear the log instead, since recorded snapshots would replay stale
    // field names.
    // ------------------------------------------------------------------

    pub fn add_field(&mut self, field: Field) -> Result<()> {
        field.check_format()?;
        self.fields.add(field)?;
        self.refresh_rule_defaults();
        self.after_edit();
        Ok(())
    }

    /// Rename a field everywhere: definitions, templates, rule lines,
    /// sort keys, and every leaf's data keys.
    pub fn rename_field(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        self.fields.rename(old_name, new_name)?;
        self.title_line.rename_field(old_name, new_name);
        for line in &mut self.output_lines {
            line.rename_field(old_name, new_name);
        }
        self.rename_in_scaffold(self.root, old_name, new_name);
        for &leaf_id in &self.leaf_pool.clone() {
            if let Some(leaf) = self.arena.leaf_mut(leaf_id) {
                leaf.data.rename_key(old_name, new_name);
            }
        }
        self.undo_log.clear();
        self.refresh_rule_defaults();
        self.after_edit();
        Ok(())
    }

    fn rename_in_scaffold(&mut self, id: NodeId, old_name: &str, new_name: &str) {
        let children: Vec<NodeId> = match self.arena.get(id) {
            Some(Node::Title(title)) => title.children.clone(),
            _ => return,
        };
        for child in children {
            match self.arena.get_mut(child) {
                Some(Node::Title(_)) => self.rename_in_scaffold(child, old_name, new_name),
                Some(Node::Rule(_)) => {
                    let mut current = Some(child);
                    while let Some(rule_id) = current {
                        let Some(rule) = self.arena.rule_mut(rule_id) else {
                            break;
                        };
                        rule.rule_line.rename_field(old_name, new_name);
                        for key in rule
                            .sort_fields
                            .iter_mut()
                            .chain(rule.child_sort_fields.iter_mut())
                        {
                            if key.field_name == old_name {
                                key.field_name = new_name.to_string();
                            }
                        }
                        current = rule.child_rule;
                    }
                }
                _ => {}
            }
        }
    }

    /// Remove a field definition. Leftover stored data in leaves is kept
    /// and dropped opportunistically on the next edit of each leaf;
    /// templates referencing the field degrade to literal text.
    pub fn remove_field(&mut self, name: &str) -> Result<Field> {
        let removed = self
            .fields
            .remove(name)
            .ok_or_else(|| GroveError::UnknownField(name.to_string()))?;
        self.undo_log.clear();
        self.refresh_rule_defaults();
        self.after_edit();
        Ok(removed)
    }

    /// Change a field's type by rebuilding a fresh definition: format and
    /// affixes reset to the new type's defaults and the alternate-format
    /// list is cleared. Stored data is kept as-is.
    pub fn change_field_type(&mut self, name: &str, field_type: FieldType) -> Result<()> {
        if !self.fields.contains(name) {
            return Err(GroveError::UnknownField(name.to_string()));
        }
        self.fields.replace(name, Field::new(name, field_type))?;
        self.undo_log.clear();
        self.refresh_rule_defaults();
        self.after_edit();
        Ok(())
    }

    /// Update a field's display attributes (format, affixes, separator,
    /// alternates) without changing name or type.
    pub fn replace_field(&mut self, name: &str, field: Field) -> Result<()> {
        let existing = self
            .fields
            .get(name)
            .ok_or_else(|| GroveError::UnknownField(name.to_string()))?;
        if field.name != name || field.field_type != existing.field_type {
            return Err(GroveError::Validation(
                "replace_field cannot change name or type".into(),
            ));
        }
        field.check_format()?;
        self.fields.replace(name, field)?;
        self.after_edit();
        Ok(())
    }

    /// Set the template rendering leaf titles.
    pub fn set_title_line(&mut self, text: &str) {
        self.title_line = ParsedLine::parse(text, &self.fields);
        self.after_edit();
    }

    /// Set the templates rendering leaf output bodies.
    pub fn set_output_lines(&mut self, lines: &[String]) {
        self.output_lines = lines
            .iter()
            .map(|line| ParsedLine::parse(line, &self.fields))
            .collect();
        self.after_edit();
    }

    // ------------------------------------------------------------------
    // Stored scaffold operations
    // ------------------------------------------------------------------

    /// Resolve a child-index path from the root to a stored node.
    pub fn resolve_path(&self, path: &[usize]) -> Option<NodeId> {
        let mut id = self.root;
        for &index in path {
            let title = self.arena.title(id)?;
            id = *title.children.get(index)?;
        }
        Some(id)
    }

    /// Resolve a rule address: a stored path plus chain depth.
    pub fn resolve_rule(&self, path: &RulePath) -> Option<NodeId> {
        let mut id = self.resolve_path(&path.path)?;
        self.arena.rule(id)?;
        for _ in 0..path.depth {
            id = self.arena.rule(id)?.child_rule?;
        }
        Some(id)
    }

    /// Insert a new heading under the title node at `parent_path`.
    pub fn add_title(&mut self, parent_path: &[usize], index: usize, text: &str) -> Result<()> {
        let parent_id = self
            .resolve_path(parent_path)
            .ok_or_else(|| GroveError::Validation(format!("no heading at {parent_path:?}")))?;
        let parent = self
            .arena
            .title(parent_id)
            .ok_or_else(|| GroveError::Validation("path is not a heading".into()))?;
        if parent
            .children
            .iter()
            .any(|&child| self.arena.rule(child).is_some())
        {
            return Err(GroveError::Validation(
                "heading already holds a rule; it cannot take sub-headings".into(),
            ));
        }
        if index > parent.children.len() {
            return Err(GroveError::Validation(format!(
                "insert position {index} out of range"
            )));
        }
        let id = self.arena.insert(Node::Title(TitleNode::new(text)));
        if let Some(parent) = self.arena.title_mut(parent_id) {
            parent.children.insert(index, id);
        }
        let mut path = parent_path.to_vec();
        path.push(index);
        self.push_undo("Add heading", UndoCommand::AddStoredNode { path });
        self.after_edit();
        Ok(())
    }

    /// Delete the stored node (heading subtree or rule chain) at `path`.
    pub fn delete_stored_node(&mut self, path: &[usize]) -> Result<()> {
        if path.is_empty() {
            return Err(GroveError::Validation("cannot delete the root".into()));
        }
        let node = self.remove_stored_at(path)?;
        self.push_undo(
            "Delete branch",
            UndoCommand::DeleteStoredNode {
                path: path.to_vec(),
                node,
            },
        );
        self.after_edit();
        Ok(())
    }

    /// Change a heading's display text.
    pub fn edit_title_text(&mut self, path: &[usize], text: &str) -> Result<()> {
        let id = self
            .resolve_path(path)
            .ok_or_else(|| GroveError::Validation(format!("no heading at {path:?}")))?;
        let title = self
            .arena
            .title_mut(id)
            .ok_or_else(|| GroveError::Validation("path is not a heading".into()))?;
        let previous = std::mem::replace(&mut title.title, text.to_string());
        self.push_undo(
            "Edit heading",
            UndoCommand::EditTitle {
                path: path.to_vec(),
                text: previous,
            },
        );
        self.after_edit();
        Ok(())
    }

    /// Reorder a heading among its siblings.
    pub fn move_title(&mut self, parent_path: &[usize], from: usize, to: usize) -> Result<()> {
        self.move_title_raw(parent_path, from, to)?;
        self.push_undo(
            "Move heading",
            UndoCommand::MoveTitle {
                parent: parent_path.to_vec(),
                from,
                to,
            },
        );
        self.after_edit();
        Ok(())
    }

    pub(crate) fn move_title_raw(
        &mut self,
        parent_path: &[usize],
        from: usize,
        to: usize,
    ) -> Result<()> {
        let parent_id = self
            .resolve_path(parent_path)
            .ok_or_else(|| GroveError::Format(format!("no heading at {parent_path:?}")))?;
        let parent = self
            .arena
            .title_mut(parent_id)
            .ok_or_else(|| GroveError::Format("move parent is not a heading".into()))?;
        if from >= parent.children.len() || to >= parent.children.len() {
            return Err(GroveError::Format("move position out of range".into()));
        }
        let id = parent.children.remove(from);
        parent.children.insert(to, id);
        Ok(())
    }

    /// Attach (or replace) the rule chain under the heading at `path`.
    pub fn set_rule(&mut self, path: &[usize], rule_text: &str) -> Result<()> {
        let line = self.parse_rule_line(rule_text)?;
        let title_id = self
            .resolve_path(path)
            .ok_or_else(|| GroveError::Validation(format!("no heading at {path:?}")))?;
        let title = self
            .arena
            .title(title_id)
            .ok_or_else(|| GroveError::Validation("path is not a heading".into()))?;

        let existing_rule = title
            .children
            .first()
            .copied()
            .filter(|&child| self.arena.rule(child).is_some());
        if existing_rule.is_none() && !title.children.is_empty() {
            return Err(GroveError::Validation(
                "heading has sub-headings; it cannot take a rule".into(),
            ));
        }

        let mut rule_path = path.to_vec();
        rule_path.push(0);
        let command = match existing_rule {
            Some(_) => {
                let old = self.remove_stored_at(&rule_path)?;
                let id = self.arena.insert(Node::Rule(RuleNode::new(line)));
                if let Some(title) = self.arena.title_mut(title_id) {
                    title.children.insert(0, id);
                }
                UndoCommand::Batch {
                    commands: vec![
                        UndoCommand::DeleteStoredNode {
                            path: rule_path.clone(),
                            node: old,
                        },
                        UndoCommand::AddStoredNode { path: rule_path },
                    ],
                }
            }
            None => {
                let id = self.arena.insert(Node::Rule(RuleNode::new(line)));
                if let Some(title) = self.arena.title_mut(title_id) {
                    title.children.push(id);
                }
                UndoCommand::AddStoredNode { path: rule_path }
            }
        };
        self.push_undo("Set rule", command);
        self.refresh_rule_defaults();
        self.after_edit();
        Ok(())
    }

    /// Append a nested rule at the end of the chain under `path`.
    pub fn add_chained_rule(&mut self, path: &[usize], rule_text: &str) -> Result<()> {
        let line = self.parse_rule_line(rule_text)?;
        let top_id = self
            .resolve_path(path)
            .ok_or_else(|| GroveError::Validation(format!("no rule at {path:?}")))?;
        if self.arena.rule(top_id).is_none() {
            return Err(GroveError::Validation("path is not a rule".into()));
        }
        let old_chain = StoredNode::from_arena(&self.arena, top_id)
            .ok_or_else(|| GroveError::Format("rule chain out of sync".into()))?;

        let mut last = top_id;
        while let Some(next) = self.arena.rule(last).and_then(|rule| rule.child_rule) {
            last = next;
        }
        let nested = self.arena.insert(Node::Rule(RuleNode::new(line)));
        if let Some(rule) = self.arena.rule_mut(last) {
            rule.child_rule = Some(nested);
        }
        self.push_undo(
            "Add nested rule",
            UndoCommand::Batch {
                commands: vec![
                    UndoCommand::DeleteStoredNode {
                        path: path.to_vec(),
                        node: old_chain,
                    },
                    UndoCommand::AddStoredNode {
                        path: path.to_vec(),
                    },
                ],
            },
        );
        self.refresh_rule_defaults();
        self.after_edit();
        Ok(())
    }

    /// Change one rule's template. When the rule's default sort keys go
    /// stale, the key replacement joins the same undo entry as an atomic
    /// batch, so one logical edit stays one log entry.
    pub fn edit_rule_line(&mut self, path: &RulePath, rule_text: &str) -> Result<()> {
        let line = self.parse_rule_line(rule_text)?;
        let id = self
            .resolve_rule(path)
            .ok_or_else(|| GroveError::Validation("no rule at path".into()))?;

        let rule = self
            .arena
            .rule_mut(id)
            .ok_or_else(|| GroveError::Validation("no rule at path".into()))?;
        let old_text = rule.rule_line.to_template_text();
        let new_defaults: Vec<SortKey> = line
            .field_names()
            .into_iter()
            .map(SortKey::ascending)
            .collect();
        rule.rule_line = line;

        let mut commands = vec![UndoCommand::EditRule {
            path: path.clone(),
            rule_text: old_text,
        }];
        if !rule.has_custom_sort_fields && rule.sort_fields != new_defaults {
            let old_keys = std::mem::replace(&mut rule.sort_fields, new_defaults);
            commands.push(UndoCommand::SetSortKeys {
                path: path.clone(),
                keys: old_keys,
                custom: false,
            });
        }
        // Child sort defaults across the chain may shift with the rule's
        // consumed fields; capture any that change.
        commands.extend(self.refresh_child_sort_defaults_logged(path));

        let command = match commands.len() {
            1 => commands.remove(0),
            _ => UndoCommand::Batch { commands },
        };
        self.push_undo("Edit rule", command);
        self.after_edit();
        Ok(())
    }

    /// Replace the keys ordering a rule's groups.
    pub fn set_sort_keys(&mut self, path: &RulePath, keys: Vec<SortKey>) -> Result<()> {
        self.check_sort_keys(&keys)?;
        let id = self
            .resolve_rule(path)
            .ok_or_else(|| GroveError::Validation("no rule at path".into()))?;
        let rule = self
            .arena
            .rule_mut(id)
            .ok_or_else(|| GroveError::Validation("no rule at path".into()))?;
        let old_keys = std::mem::replace(&mut rule.sort_fields, keys);
        let old_custom = std::mem::replace(&mut rule.has_custom_sort_fields, true);
        self.push_undo(
            "Set sort keys",
            UndoCommand::SetSortKeys {
                path: path.clone(),
                keys: old_keys,
                custom: old_custom,
            },
        );
        self.after_edit();
        Ok(())
    }

    /// Replace the keys ordering leaves under a terminal rule.
    pub fn set_child_sort_keys(&mut self, path: &RulePath, keys: Vec<SortKey>) -> Result<()> {
        self.check_sort_keys(&keys)?;
        let id = self
            .resolve_rule(path)
            .ok_or_else(|| GroveError::Validation("no rule at path".into()))?;
        let rule = self
            .arena
            .rule_mut(id)
            .ok_or_else(|| GroveError::Validation("no rule at path".into()))?;
        let old_keys = std::mem::replace(&mut rule.child_sort_fields, keys);
        let old_custom = std::mem::replace(&mut rule.has_custom_child_sort_fields, true);
        self.push_undo(
            "Set child sort keys",
            UndoCommand::SetChildSortKeys {
                path: path.clone(),
                keys: old_keys,
                custom: old_custom,
            },
        );
        self.after_edit();
        Ok(())
    }

    fn check_sort_keys(&self, keys: &[SortKey]) -> Result<()> {
        for key in keys {
            if !self.fields.contains(&key.field_name) {
                return Err(GroveError::UnknownField(key.field_name.clone()));
            }
        }
        Ok(())
    }

    fn parse_rule_line(&self, rule_text: &str) -> Result<ParsedLine> {
        let line = ParsedLine::parse(rule_text, &self.fields);
        // Reject a rule that would need an undefined cross-product order.
        line.multi_value_field(&self.fields)?;
        Ok(line)
    }

    pub(crate) fn set_rule_text_raw(&mut self, path: &RulePath, text: &str) -> Result<String> {
        let line = ParsedLine::parse(text, &self.fields);
        let id = self
            .resolve_rule(path)
            .ok_or_else(|| GroveError::Format("undo entry references a missing rule".into()))?;
        let rule = self
            .arena
            .rule_mut(id)
            .ok_or_else(|| GroveError::Format("undo entry references a missing rule".into()))?;
        let old = rule.rule_line.to_template_text();
        rule.rule_line = line;
        Ok(old)
    }

    pub(crate) fn remove_stored_at(&mut self, path: &[usize]) -> Result<StoredNode> {
        let (last, parent_path) = path
            .split_last()
            .ok_or_else(|| GroveError::Format("empty stored-node path".into()))?;
        let parent_id = self
            .resolve_path(parent_path)
            .ok_or_else(|| GroveError::Format(format!("no heading at {parent_path:?}")))?;
        let parent = self
            .arena
            .title_mut(parent_id)
            .ok_or_else(|| GroveError::Format("stored-node parent is not a heading".into()))?;
        if *last >= parent.children.len() {
            return Err(GroveError::Format("stored-node position out of range".into()));
        }
        let id = parent.children.remove(*last);
        let snapshot = StoredNode::from_arena(&self.arena, id)
            .ok_or_else(|| GroveError::Format("stored-node path points at derived node".into()))?;
        self.remove_subtree(id);
        Ok(snapshot)
    }

    pub(crate) fn insert_stored_at(&mut self, path: &[usize], node: &StoredNode) -> Result<()> {
        let (last, parent_path) = path
            .split_last()
            .ok_or_else(|| GroveError::Format("empty stored-node path".into()))?;
        let parent_id = self
            .resolve_path(parent_path)
            .ok_or_else(|| GroveError::Format(format!("no heading at {parent_path:?}")))?;
        if self.arena.title(parent_id).is_none() {
            return Err(GroveError::Format("stored-node parent is not a heading".into()));
        }
        let id = node.instantiate(&mut self.arena, &self.fields);
        let parent = self
            .arena
            .title_mut(parent_id)
            .ok_or_else(|| GroveError::Format("stored-node parent is not a heading".into()))?;
        if *last > parent.children.len() {
            return Err(GroveError::Format("stored-node position out of range".into()));
        }
        parent.children.insert(*last, id);
        self.refresh_rule_defaults();
        Ok(())
    }

    /// Remove a stored subtree plus any derived groups hanging off it.
    /// Leaves are shared with the pool and stay.
    fn remove_subtree(&mut self, id: NodeId) {
        match self.arena.get(id) {
            Some(Node::Title(title)) => {
                for child in title.children.clone() {
                    self.remove_subtree(child);
                }
            }
            Some(Node::Rule(rule)) => {
                let groups = rule.groups.clone();
                let nested = rule.child_rule;
                for group in groups {
                    materialize::remove_group_subtree(&mut self.arena, group);
                }
                if let Some(nested) = nested {
                    self.remove_subtree(nested);
                }
            }
            _ => {}
        }
        self.arena.remove(id);
    }

    // ------------------------------------------------------------------
    // Default sort fields
    // ------------------------------------------------------------------

    /// Recompute derived sort-key defaults across the whole scaffold.
    ///
    /// Defaults for a rule's groups are the rule's own fields in rule
    /// order; defaults for leaves under a terminal rule are all fields in
    /// definition order minus any field consumed by the rule or an
    /// ancestor in its chain.
    pub(crate) fn refresh_rule_defaults(&mut self) {
        let chains = self.collect_rule_chains(self.root);
        for (rule_id, consumed) in chains {
            let Some(rule) = self.arena.rule(rule_id) else {
                continue;
            };
            let own_fields = rule.rule_line.field_names();
            let defaults: Vec<SortKey> =
                own_fields.iter().cloned().map(SortKey::ascending).collect();
            let child_defaults: Vec<SortKey> = self
                .fields
                .names()
                .into_iter()
                .filter(|name| !consumed.contains(name))
                .map(SortKey::ascending)
                .collect();
            let Some(rule) = self.arena.rule_mut(rule_id) else {
                continue;
            };
            if !rule.has_custom_sort_fields {
                rule.sort_fields = defaults;
            }
            if !rule.has_custom_child_sort_fields {
                rule.child_sort_fields = child_defaults;
            }
        }
    }

    /// As `refresh_rule_defaults`, but restricted to one chain and
    /// returning key-replacement commands for any default that changed.
    fn refresh_child_sort_defaults_logged(&mut self, edited: &RulePath) -> Vec<UndoCommand> {
        let mut commands = Vec::new();
        let Some(top_id) = self.resolve_path(&edited.path) else {
            return commands;
        };
        let mut consumed: Vec<String> = Vec::new();
        let mut current = Some(top_id);
        let mut depth = 0usize;
        while let Some(rule_id) = current {
            let Some(rule) = self.arena.rule(rule_id) else {
                break;
            };
            consumed.extend(rule.rule_line.field_names());
            let next = rule.child_rule;
            let custom = rule.has_custom_child_sort_fields;
            let defaults: Vec<SortKey> = self
                .fields
                .names()
                .into_iter()
                .filter(|name| !consumed.contains(name))
                .map(SortKey::ascending)
                .collect();
            if !custom {
                let Some(rule) = self.arena.rule_mut(rule_id) else {
                    break;
                };
                if rule.child_sort_fields != defaults {
                    let old = std::mem::replace(&mut rule.child_sort_fields, defaults);
                    commands.push(UndoCommand::SetChildSortKeys {
                        path: RulePath {
                            path: edited.path.clone(),
                            depth,
                        },
                        keys: old,
                        custom: false,
                    });
                }
            }
            current = next;
            depth += 1;
        }
        commands
    }

    /// Rule ids paired with the field names consumed by the rule and its
    /// chain ancestors, across the whole stored scaffold.
    fn collect_rule_chains(&self, title_id: NodeId) -> Vec<(NodeId, Vec<String>)> {
        let mut out = Vec::new();
        let Some(title) = self.arena.title(title_id) else {
            return out;
        };
        for &child in &title.children {
            match self.arena.get(child) {
                Some(Node::Title(_)) => out.extend(self.collect_rule_chains(child)),
                Some(Node::Rule(_)) => {
                    let mut consumed: Vec<String> = Vec::new();
                    let mut current = Some(child);
                    while let Some(rule_id) = current {
                        let Some(rule) = self.arena.rule(rule_id) else {
                            break;
                        };
                        consumed.extend(rule.rule_line.field_names());
                        out.push((rule_id, consumed.clone()));
                        current = rule.child_rule;
                    }
                }
                _ => {}
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // View state and lazy updates
    // ------------------------------------------------------------------

    /// Expand or collapse a node. Opening a branch flagged stale forces a
    /// full recompute of its children before it becomes visible.
    pub fn set_open(&mut self, id: NodeId, open: bool) {
        if let Some(node) = self.arena.get_mut(id) {
            node.set_open(open);
        }
        if open {
            self.update_all();
        }
    }

    /// Re-derive the view for every open branch; closed branches with
    /// children are flagged stale instead.
    pub fn update_all(&mut self) {
        let root = self.root;
        let pool = self.leaf_pool.clone();
        self.update_title(root, &pool);
    }

    fn update_title(&mut self, id: NodeId, pool: &[NodeId]) {
        let Some(title) = self.arena.title(id) else {
            return;
        };
        if !title.is_open {
            if !title.children.is_empty() {
                if let Some(node) = self.arena.get_mut(id) {
                    node.set_stale(true);
                }
            }
            return;
        }
        let children = title.children.clone();
        if let Some(node) = self.arena.get_mut(id) {
            node.set_stale(false);
        }
        for child in children {
            match self.arena.get(child) {
                Some(Node::Title(_)) => self.update_title(child, pool),
                Some(Node::Rule(_)) => self.update_rule(child, pool),
                _ => {}
            }
        }
    }

    fn update_rule(&mut self, rule_id: NodeId, pool: &[NodeId]) {
        let Some(rule) = self.arena.rule(rule_id) else {
            return;
        };
        if !rule.is_open {
            if !rule.groups.is_empty()
                && let Some(node) = self.arena.get_mut(rule_id)
            {
                node.set_stale(true);
            }
            return;
        }
        let force = rule.is_stale;
        self.materialize_rule_groups(rule_id, pool, force);
        if let Some(node) = self.arena.get_mut(rule_id) {
            node.set_stale(false);
        }

        let Some(rule) = self.arena.rule(rule_id) else {
            return;
        };
        let groups = rule.groups.clone();
        match rule.child_rule {
            Some(nested) => {
                for group in groups {
                    self.update_group(group, nested);
                }
            }
            None => {
                let keys = rule.child_sort_fields.clone();
                self.sort_group_leaves(&groups, &keys);
            }
        }
    }

    fn update_group(&mut self, group_id: NodeId, nested_rule: NodeId) {
        let Some(group) = self.arena.group(group_id) else {
            return;
        };
        if !group.is_open {
            if !group.child_groups.is_empty()
                && let Some(node) = self.arena.get_mut(group_id)
            {
                node.set_stale(true);
            }
            return;
        }
        let force = group.is_stale;
        let pool = group.matching_leaves.clone();
        self.materialize_group_children(group_id, nested_rule, &pool, force);
        if let Some(node) = self.arena.get_mut(group_id) {
            node.set_stale(false);
        }

        let Some(nested) = self.arena.rule(nested_rule) else {
            return;
        };
        let children = self
            .arena
            .group(group_id)
            .map(|group| group.child_groups.clone())
            .unwrap_or_default();
        match nested.child_rule {
            Some(deeper) => {
                for child in children {
                    self.update_group(child, deeper);
                }
            }
            None => {
                let keys = nested.child_sort_fields.clone();
                self.sort_group_leaves(&children, &keys);
            }
        }
    }

    fn sort_group_leaves(&mut self, groups: &[NodeId], keys: &[SortKey]) {
        for &group_id in groups {
            let Some(group) = self.arena.group(group_id) else {
                continue;
            };
            let mut leaves = group.matching_leaves.clone();
            sort::sort_nodes(&mut leaves, &self.arena, &self.fields, keys);
            if let Some(group) = self.arena.group_mut(group_id) {
                group.matching_leaves = leaves;
            }
        }
    }

    fn materialize_rule_groups(&mut self, rule_id: NodeId, pool: &[NodeId], force: bool) {
        let prior = self
            .arena
            .rule(rule_id)
            .map(|rule| rule.groups.clone())
            .unwrap_or_default();
        let prior = self.discard_prior_if_forced(prior, force);
        let update = create_groups(&mut self.arena, &self.fields, rule_id, pool, &prior);
        if let Some(rule) = self.arena.rule_mut(rule_id) {
            rule.groups = update.groups;
        }
        self.obsolete_group_titles.extend(update.obsolete_titles);
    }

    fn materialize_group_children(
        &mut self,
        group_id: NodeId,
        nested_rule: NodeId,
        pool: &[NodeId],
        force: bool,
    ) {
        let prior = self
            .arena
            .group(group_id)
            .map(|group| group.child_groups.clone())
            .unwrap_or_default();
        let prior = self.discard_prior_if_forced(prior, force);
        let update = create_groups(&mut self.arena, &self.fields, nested_rule, pool, &prior);
        if let Some(group) = self.arena.group_mut(group_id) {
            group.child_groups = update.groups;
        }
        self.obsolete_group_titles.extend(update.obsolete_titles);
    }

    /// A stale branch recomputes from scratch: prior groups are dropped
    /// so the identity-reuse shortcut cannot resurrect them.
    fn discard_prior_if_forced(&mut self, prior: Vec<NodeId>, force: bool) -> Vec<NodeId> {
        if !force {
            return prior;
        }
        for group_id in prior {
            if let Some(group) = self.arena.group(group_id) {
                self.obsolete_group_titles.push(group.title.clone());
            }
            materialize::remove_group_subtree(&mut self.arena, group_id);
        }
        Vec::new()
    }

    // ------------------------------------------------------------------
    // Undo / redo
    // ------------------------------------------------------------------

    fn push_undo(&mut self, title: &str, command: UndoCommand) {
        self.undo_log.push(UndoEntry::new(title, command));
    }

    fn after_edit(&mut self) {
        self.changed = true;
        self.update_all();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_log.is_empty()
    }

    /// Undo the newest log entry. The entry is replaced by its inverse, so
    /// redo is another `undo` of that inverse.
    pub fn undo(&mut self) -> Result<()> {
        if self.undo_log.is_empty() {
            return Ok(());
        }
        self.undo_to_position(self.undo_log.len() - 1)
    }

    /// Undo every entry above `position`, oldest last. The undone suffix
    /// is replaced by the generated inverses (the redo entries).
    pub fn undo_to_position(&mut self, position: usize) -> Result<()> {
        let mut inverses = Vec::new();
        while self.undo_log.len() > position {
            let Some(entry) = self.undo_log.pop() else {
                break;
            };
            let inverse = entry.command.undo(self)?;
            inverses.push(UndoEntry {
                title: entry.title,
                time: entry.time,
                command: inverse,
            });
        }
        for entry in inverses {
            self.undo_log.push(entry);
        }
        self.after_edit();
        Ok(())
    }
}

/// Wrap an edit command and its side-effect restores into one atomic
/// entry; with no restores the command goes in bare.
fn batch_with(mut restores: Vec<UndoCommand>, command: UndoCommand) -> UndoCommand {
    if restores.is_empty() {
        return command;
    }
    restores.push(command);
    UndoCommand::Batch { commands: restores }
}
