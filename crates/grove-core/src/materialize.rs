//! Rule-driven group materialization.
//!
//! A materialization pass takes one rule and a candidate leaf pool,
//! renders the rule template against every leaf (fanning out across the
//! values of a multi-valued rule field), buckets leaves by rendered text,
//! and produces sorted Group nodes. Groups keep their node identity across
//! passes when the rendered title is unchanged, so open state survives
//! edits.

use std::collections::{HashMap, HashSet};

use grove_model::FieldSet;

use crate::node::{Arena, GroupNode, Node, NodeId};
use crate::sort;

/// Result of one materialization pass.
#[derive(Debug, Default)]
pub struct GroupUpdate {
    /// The surviving and fresh groups, sorted by the rule's sort fields.
    pub groups: Vec<NodeId>,
    /// Titles of prior groups that no longer exist; collapsed-state
    /// bookkeeping kept outside the engine can discard them.
    pub obsolete_titles: Vec<String>,
}

/// Materialize the groups for `rule_id` over `leaf_ids`.
///
/// `prior` is the previous pass's group list from the same parent context;
/// pass an empty slice to force a full rebuild (the stale-branch path).
/// Nested child rules are not recursed here; the lazy update traversal
/// materializes them when their branch is visible.
pub fn create_groups(
    arena: &mut Arena,
    fields: &FieldSet,
    rule_id: NodeId,
    leaf_ids: &[NodeId],
    prior: &[NodeId],
) -> GroupUpdate {
    let Some(rule) = arena.rule(rule_id) else {
        return GroupUpdate::default();
    };
    let rule_line = rule.rule_line.clone();
    let sort_fields = rule.sort_fields.clone();
    let rule_field_names = rule_line.field_names();

    // Bucket leaves by rendered rule text, insertion order preserved.
    // Identical titles always merge; a leaf joins a bucket at most once
    // even when duplicate stored values render the same text.
    let mut bucket_order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<NodeId>> = HashMap::new();
    for &leaf_id in leaf_ids {
        let Some(leaf) = arena.leaf(leaf_id) else {
            continue;
        };
        let titles = match rule_line.render_multi(fields, &leaf.data) {
            Ok(titles) => titles,
            Err(error) => {
                // A data edit can introduce a second multi-value field
                // after the rule was authored; degrade to a single render
                // rather than dropping the leaf.
                tracing::warn!(%error, "rule fan-out failed; using inline render");
                let rendered = rule_line.render(fields, &leaf.data);
                if rendered.is_empty() {
                    Vec::new()
                } else {
                    vec![rendered]
                }
            }
        };
        let mut seen: HashSet<&str> = HashSet::new();
        for title in &titles {
            if !seen.insert(title) {
                continue;
            }
            match buckets.get_mut(title) {
                Some(members) => members.push(leaf_id),
                None => {
                    bucket_order.push(title.clone());
                    buckets.insert(title.clone(), vec![leaf_id]);
                }
            }
        }
    }

    // Reuse group identity by title so open state survives the pass.
    let mut prior_by_title: HashMap<String, NodeId> = HashMap::new();
    for &group_id in prior {
        if let Some(group) = arena.group(group_id) {
            prior_by_title.insert(group.title.clone(), group_id);
        }
    }

    let mut update = GroupUpdate::default();
    for title in bucket_order {
        let members = buckets.remove(&title).unwrap_or_default();
        let representative = representative_data(arena, &rule_field_names, &members);
        let group_id = match prior_by_title.remove(&title) {
            Some(existing) => {
                if let Some(group) = arena.group_mut(existing) {
                    group.matching_leaves = members;
                    group.data = representative;
                }
                existing
            }
            None => {
                let mut group = GroupNode::new(title);
                group.matching_leaves = members;
                group.data = representative;
                arena.insert(Node::Group(group))
            }
        };
        update.groups.push(group_id);
    }

    // Whatever was not reused is obsolete; drop its subtree. Walk the
    // prior list, not the map, so the reported order is stable.
    for &group_id in prior {
        let Some(title) = arena.group(group_id).map(|group| group.title.clone()) else {
            continue;
        };
        if prior_by_title.remove(&title).is_none() {
            continue;
        }
        remove_group_subtree(arena, group_id);
        update.obsolete_titles.push(title);
    }

    sort::sort_nodes(&mut update.groups, arena, fields, &sort_fields);
    update
}

/// The rule's field values taken from the bucket's first leaf; used to
/// pre-populate "new node like this group" operations.
fn representative_data(
    arena: &Arena,
    rule_field_names: &[String],
    members: &[NodeId],
) -> grove_model::LeafData {
    let mut data = grove_model::LeafData::new();
    let Some(first) = members.first().and_then(|&id| arena.leaf(id)) else {
        return data;
    };
    for name in rule_field_names {
        let values = first.data.values(name);
        if !values.is_empty() {
            data.set_values(name, values.to_vec());
        }
    }
    data
}

/// Remove a derived group and its nested groups from the arena. Leaves are
/// shared with the pool and are never touched.
pub fn remove_group_subtree(arena: &mut Arena, group_id: NodeId) {
    let children = match arena.group(group_id) {
        Some(group) => group.child_groups.clone(),
        None => return,
    };
    for child in children {
        remove_group_subtree(arena, child);
    }
    arena.remove(group_id);
}
