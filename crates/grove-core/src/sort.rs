//! Stable multi-key sorting of sibling nodes.
//!
//! Multi-key sorts run as single-key stable passes in reverse key order:
//! the last key sorts first, the primary key sorts last, so the primary
//! key dominates and earlier passes survive as tie-breaks. Each pass is a
//! binary-search insertion sort, stable by construction. Ties beyond the
//! last key keep their pre-sort order.

use std::cmp::Ordering;

use grove_model::{FieldSet, LeafData, SortKey};

use crate::node::{Arena, Node, NodeId};

/// The record a node contributes to comparisons: a leaf's own data, or a
/// group's representative data.
fn node_data<'a>(arena: &'a Arena, id: NodeId) -> Option<&'a LeafData> {
    match arena.get(id)? {
        Node::Leaf(leaf) => Some(&leaf.data),
        Node::Group(group) => Some(&group.data),
        Node::Title(_) | Node::Rule(_) => None,
    }
}

/// Stably sort sibling ids by a multi-key spec.
///
/// Keys naming fields that no longer exist are skipped, so a deleted field
/// degrades a sort instead of breaking it.
pub fn sort_nodes(ids: &mut [NodeId], arena: &Arena, fields: &FieldSet, keys: &[SortKey]) {
    for key in keys.iter().rev() {
        let Some(field) = fields.get(&key.field_name) else {
            continue;
        };
        insertion_sort_by(ids, |a, b| {
            let ordering = match (node_data(arena, a), node_data(arena, b)) {
                (Some(da), Some(db)) => field.compare_records(da, db),
                _ => Ordering::Equal,
            };
            if key.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }
}

/// Stable binary-search insertion sort over one key.
fn insertion_sort_by<F>(ids: &mut [NodeId], mut compare: F)
where
    F: FnMut(NodeId, NodeId) -> Ordering,
{
    for i in 1..ids.len() {
        let pos = upper_bound(&ids[..i], ids[i], &mut compare);
        ids[pos..=i].rotate_right(1);
    }
}

/// First index in the sorted prefix whose element orders strictly after
/// `target`. Inserting there keeps equal elements in arrival order.
fn upper_bound<F>(sorted: &[NodeId], target: NodeId, compare: &mut F) -> usize
where
    F: FnMut(NodeId, NodeId) -> Ordering,
{
    let mut low = 0;
    let mut high = sorted.len();
    while low < high {
        let mid = (low + high) / 2;
        if compare(sorted[mid], target) == Ordering::Greater {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    low
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::LeafNode;
    use grove_model::{Field, FieldType};

    fn setup(rows: &[(&str, &str)]) -> (Arena, FieldSet, Vec<NodeId>) {
        let mut fields = FieldSet::new();
        fields.add(Field::new("Title", FieldType::Text)).unwrap();
        fields.add(Field::new("Year", FieldType::Number)).unwrap();

        let mut arena = Arena::new();
        let ids = rows
            .iter()
            .map(|(title, year)| {
                let mut data = LeafData::new();
                data.set_value("Title", title);
                data.set_value("Year", year);
                arena.insert(Node::Leaf(LeafNode::new(data)))
            })
            .collect();
        (arena, fields, ids)
    }

    fn titles(arena: &Arena, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|&id| {
                arena
                    .leaf(id)
                    .and_then(|leaf| leaf.data.first_value("Title"))
                    .unwrap_or("")
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn primary_key_dominates() {
        let (arena, fields, mut ids) = setup(&[
            ("b", "2000"),
            ("a", "1990"),
            ("c", "1990"),
        ]);
        sort_nodes(
            &mut ids,
            &arena,
            &fields,
            &[SortKey::ascending("Year"), SortKey::ascending("Title")],
        );
        assert_eq!(titles(&arena, &ids), vec!["a", "c", "b"]);
    }

    #[test]
    fn descending_key() {
        let (arena, fields, mut ids) = setup(&[("a", "1"), ("b", "2"), ("c", "3")]);
        sort_nodes(&mut ids, &arena, &fields, &[SortKey::descending("Year")]);
        assert_eq!(titles(&arena, &ids), vec!["c", "b", "a"]);
    }

    #[test]
    fn equal_keys_keep_arrival_order() {
        let (arena, fields, mut ids) = setup(&[
            ("first", "5"),
            ("second", "5"),
            ("third", "5"),
        ]);
        let before = ids.clone();
        sort_nodes(&mut ids, &arena, &fields, &[SortKey::ascending("Year")]);
        assert_eq!(ids, before);
    }

    #[test]
    fn missing_field_key_is_skipped() {
        let (arena, fields, mut ids) = setup(&[("b", "2"), ("a", "1")]);
        sort_nodes(
            &mut ids,
            &arena,
            &fields,
            &[SortKey::ascending("Gone"), SortKey::ascending("Title")],
        );
        assert_eq!(titles(&arena, &ids), vec!["a", "b"]);
    }
}
