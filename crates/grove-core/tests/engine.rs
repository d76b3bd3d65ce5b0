//! Tests for the tree model engine: materialization, lazy updates, and
//! the undo log.

use grove_core::engine::TreeModel;
use grove_core::node::{Node, NodeId};
use grove_core::undo::RulePath;
use grove_model::{Field, FieldType, GroveError, LeafData, SortKey};

// ============================================================================
// Fixtures
// ============================================================================

fn film_model() -> TreeModel {
    let mut model = TreeModel::new();
    model
        .add_field(Field::new("Title", FieldType::Text))
        .expect("add Title");
    model
        .add_field(Field::new("Genre", FieldType::AutoChoice).with_multiples())
        .expect("add Genre");
    model.add_title(&[], 0, "Films").expect("add heading");
    model.set_rule(&[0], "{*Genre*}").expect("set rule");

    model.add_leaf(leaf("A", &["Comedy", "Drama"])).expect("add A");
    model.add_leaf(leaf("B", &["Drama"])).expect("add B");
    model
}

fn leaf(title: &str, genres: &[&str]) -> LeafData {
    let mut data = LeafData::new();
    data.set_value("Title", title);
    data.set_values("Genre", genres.iter().map(|g| (*g).to_string()).collect());
    data
}

fn open_films(model: &mut TreeModel) -> NodeId {
    let films = model.resolve_path(&[0]).expect("Films heading");
    model.set_open(films, true);
    films
}

fn rule_groups(model: &TreeModel) -> Vec<NodeId> {
    let rule_id = model.resolve_path(&[0, 0]).expect("rule node");
    match model.node(rule_id) {
        Some(Node::Rule(rule)) => rule.groups.clone(),
        _ => panic!("expected a rule at [0, 0]"),
    }
}

fn group_titles(model: &TreeModel, ids: &[NodeId]) -> Vec<String> {
    ids.iter()
        .map(|&id| match model.node(id) {
            Some(Node::Group(group)) => group.title.clone(),
            _ => panic!("expected a group"),
        })
        .collect()
}

fn leaf_titles(model: &TreeModel, ids: &[NodeId]) -> Vec<String> {
    ids.iter()
        .map(|&id| match model.node(id) {
            Some(Node::Leaf(node)) => node
                .data
                .first_value("Title")
                .unwrap_or_default()
                .to_string(),
            _ => panic!("expected a leaf"),
        })
        .collect()
}

// ============================================================================
// Materialization
// ============================================================================

#[test]
fn genre_rule_fans_out_multi_value_leaves() {
    let mut model = film_model();
    open_films(&mut model);

    let groups = rule_groups(&model);
    assert_eq!(group_titles(&model, &groups), vec!["Comedy", "Drama"]);

    let Some(Node::Group(drama)) = model.node(groups[1]) else {
        panic!("expected Drama group");
    };
    assert_eq!(leaf_titles(&model, &drama.matching_leaves), vec!["A", "B"]);
    let Some(Node::Group(comedy)) = model.node(groups[0]) else {
        panic!("expected Comedy group");
    };
    assert_eq!(leaf_titles(&model, &comedy.matching_leaves), vec!["A"]);
}

#[test]
fn leaves_under_terminal_rule_sort_by_remaining_fields() {
    let mut model = film_model();
    // Added out of title order; the default child sort is by Title since
    // Genre is consumed by the rule.
    model.add_leaf(leaf("0 Zero", &["Drama"])).expect("add leaf");
    open_films(&mut model);

    let groups = rule_groups(&model);
    let Some(Node::Group(drama)) = model.node(groups[1]) else {
        panic!("expected Drama group");
    };
    assert_eq!(
        leaf_titles(&model, &drama.matching_leaves),
        vec!["0 Zero", "A", "B"]
    );
}

#[test]
fn group_identity_and_open_state_survive_edits() {
    let mut model = film_model();
    open_films(&mut model);

    let before = rule_groups(&model);
    model.set_open(before[1], true);

    model.add_leaf(leaf("C", &["Comedy"])).expect("add leaf");
    let after = rule_groups(&model);
    assert_eq!(before, after);
    assert!(model.node(after[1]).is_some_and(Node::is_open));
}

#[test]
fn vanished_group_is_reported_obsolete() {
    let mut model = film_model();
    open_films(&mut model);
    model.take_obsolete_group_titles();

    // Re-point A's genres away from Comedy; the Comedy group disappears.
    model.edit_leaf(0, leaf("A", &["Drama"])).expect("edit leaf");
    let groups = rule_groups(&model);
    assert_eq!(group_titles(&model, &groups), vec!["Drama"]);
    assert_eq!(
        model.take_obsolete_group_titles(),
        vec!["Comedy".to_string()]
    );
}

#[test]
fn auto_choice_accumulates_observed_values() {
    let model = film_model();
    let genre = model.fields().get("Genre").expect("Genre field");
    assert_eq!(genre.options(), vec!["Comedy", "Drama"]);
}

// ============================================================================
// Lazy staleness
// ============================================================================

#[test]
fn closed_branch_goes_stale_and_recomputes_on_open() {
    let mut model = film_model();
    let films = open_films(&mut model);
    let groups = rule_groups(&model);
    assert_eq!(group_titles(&model, &groups), vec!["Comedy", "Drama"]);

    model.set_open(films, false);
    model.edit_leaf(1, leaf("B", &["Noir"])).expect("edit leaf");
    assert!(model.node(films).is_some_and(Node::is_stale));

    model.set_open(films, true);
    assert!(!model.node(films).is_some_and(Node::is_stale));
    let groups = rule_groups(&model);
    assert_eq!(
        group_titles(&model, &groups),
        vec!["Comedy", "Drama", "Noir"]
    );
}

// ============================================================================
// Field operations
// ============================================================================

#[test]
fn rename_field_cascades_everywhere() {
    let mut model = film_model();
    model.set_title_line("{*Title*}");
    model.rename_field("Genre", "Category").expect("rename");

    // Rule template, leaf data, and defaults all follow the new name.
    let rule_id = model.resolve_path(&[0, 0]).expect("rule node");
    let Some(Node::Rule(rule)) = model.node(rule_id) else {
        panic!("expected rule");
    };
    assert_eq!(rule.rule_line.to_template_text(), "{*Category*}");
    assert_eq!(rule.sort_fields, vec![SortKey::ascending("Category")]);
    assert_eq!(
        model.leaf_data(0).expect("leaf A").values("Category"),
        &["Comedy".to_string(), "Drama".to_string()]
    );
    // Recorded entries would replay the old name; the log is dropped.
    assert!(!model.can_undo());
}

#[test]
fn removing_a_field_degrades_templates_to_literals() {
    let mut model = film_model();
    model.remove_field("Genre").expect("remove field");
    open_films(&mut model);

    // "{*Genre*}" no longer resolves; every leaf renders the literal
    // template text, so all leaves land in one group.
    let groups = rule_groups(&model);
    assert_eq!(group_titles(&model, &groups), vec!["{*Genre*}"]);
}

#[test]
fn type_change_rebuilds_the_field_and_drops_alternates() {
    let mut model = TreeModel::new();
    let mut when = Field::new("When", FieldType::Date).with_format("MMM d, yyyy");
    when.add_alt_format(Field::new("When", FieldType::Date).with_format("yyyy"));
    model.add_field(when).expect("add When");
    model.set_title_line("{*When:0*}");

    let mut data = LeafData::new();
    data.set_value("When", "1999-05-04");
    model.add_leaf(data).expect("add leaf");
    assert_eq!(model.leaf_title(0).as_deref(), Some("1999"));

    model
        .change_field_type("When", FieldType::Text)
        .expect("change type");
    let field = model.fields().get("When").expect("When field");
    assert_eq!(field.field_type, FieldType::Text);
    assert!(field.alt_formats.is_empty());
    // The alternate is gone, so its reference degrades to literal text.
    assert_eq!(model.leaf_title(0).as_deref(), Some("{*When:0*}"));
    assert!(!model.can_undo());
}

#[test]
fn multi_value_data_on_single_value_field_is_rejected() {
    let mut model = film_model();
    let mut data = LeafData::new();
    data.set_values(
        "Title",
        vec!["one".to_string(), "two".to_string()],
    );
    assert!(model.add_leaf(data).is_err());
}

#[test]
fn out_of_range_leaf_index_is_a_validation_error() {
    let mut model = film_model();
    assert!(matches!(
        model.delete_leaf(99),
        Err(GroveError::Validation(_))
    ));
    assert!(matches!(
        model.edit_leaf(99, leaf("X", &[])),
        Err(GroveError::Validation(_))
    ));
    assert_eq!(model.leaf_count(), 2);
}

// ============================================================================
// Rendering
// ============================================================================

#[test]
fn title_and_output_lines_render_per_leaf() {
    let mut model = film_model();
    model.set_title_line("{*Title*}");
    model.set_output_lines(&["Genres: {*Genre*}".to_string()]);

    assert_eq!(model.leaf_title(0).as_deref(), Some("A"));
    assert_eq!(model.leaf_output(0), vec!["Genres: Comedy, Drama"]);
}

#[test]
fn all_empty_output_line_is_suppressed() {
    let mut model = film_model();
    model.set_output_lines(&["Genres: {*Genre*}".to_string()]);
    model.add_leaf(leaf("C", &[])).expect("add leaf");
    assert!(model.leaf_output(2).is_empty());
}

// ============================================================================
// Undo / redo
// ============================================================================

#[test]
fn deleted_leaf_returns_to_its_pool_position() {
    let mut model = film_model();
    model.delete_leaf(0).expect("delete A");
    assert_eq!(model.leaf_count(), 1);

    model.undo().expect("undo delete");
    assert_eq!(model.leaf_count(), 2);
    assert_eq!(
        model.leaf_data(0).expect("leaf A").first_value("Title"),
        Some("A")
    );

    // The undo left its inverse on top; undoing that redoes the delete.
    model.undo().expect("redo delete");
    assert_eq!(model.leaf_count(), 1);
    assert_eq!(
        model.leaf_data(0).expect("leaf B").first_value("Title"),
        Some("B")
    );
}

#[test]
fn undo_restores_auto_choice_options_with_the_leaf() {
    let mut model = film_model();
    let before = model.fields().clone();

    model.add_leaf(leaf("C", &["Noir"])).expect("add C");
    let genre = model.fields().get("Genre").expect("Genre field");
    assert_eq!(genre.options(), vec!["Comedy", "Drama", "Noir"]);

    // The add batched an option-list restore, so the whole field map
    // comes back along with the leaf pool.
    model.undo().expect("undo add");
    assert_eq!(model.leaf_count(), 2);
    assert_eq!(model.fields(), &before);

    model.undo().expect("redo add");
    assert_eq!(model.leaf_count(), 3);
    let genre = model.fields().get("Genre").expect("Genre field");
    assert_eq!(genre.options(), vec!["Comedy", "Drama", "Noir"]);
}

#[test]
fn undo_to_position_rolls_back_a_suffix() {
    let mut model = film_model();
    model.edit_leaf(0, leaf("A2", &["Comedy"])).expect("edit A");
    model.add_leaf(leaf("C", &["Noir"])).expect("add C");
    let depth = model.undo_log().len();

    model.undo_to_position(depth - 2).expect("undo suffix");
    assert_eq!(model.leaf_count(), 2);
    assert_eq!(
        model.leaf_data(0).expect("leaf A").first_value("Title"),
        Some("A")
    );
    // The suffix was replaced by redo entries of the same length.
    assert_eq!(model.undo_log().len(), depth);

    model.undo_to_position(depth - 2).expect("redo suffix");
    assert_eq!(model.leaf_count(), 3);
    assert_eq!(
        model.leaf_data(0).expect("leaf A").first_value("Title"),
        Some("A2")
    );
}

#[test]
fn rule_edit_restores_default_sort_keys_on_undo() {
    let mut model = film_model();
    let path = RulePath {
        path: vec![0, 0],
        depth: 0,
    };
    model.edit_rule_line(&path, "{*Title*}").expect("edit rule");

    let rule_id = model.resolve_rule(&path).expect("rule node");
    let Some(Node::Rule(rule)) = model.node(rule_id) else {
        panic!("expected rule");
    };
    assert_eq!(rule.sort_fields, vec![SortKey::ascending("Title")]);

    model.undo().expect("undo rule edit");
    let Some(Node::Rule(rule)) = model.node(rule_id) else {
        panic!("expected rule");
    };
    assert_eq!(rule.rule_line.to_template_text(), "{*Genre*}");
    assert_eq!(rule.sort_fields, vec![SortKey::ascending("Genre")]);
}

#[test]
fn deleted_branch_restores_with_custom_sort_keys() {
    let mut model = film_model();
    let path = RulePath {
        path: vec![0, 0],
        depth: 0,
    };
    model
        .set_sort_keys(&path, vec![SortKey::descending("Genre")])
        .expect("set keys");

    model.delete_stored_node(&[0]).expect("delete Films");
    assert!(model.resolve_path(&[0]).is_none());

    model.undo().expect("undo delete");
    let rule_id = model.resolve_rule(&path).expect("rule node");
    let Some(Node::Rule(rule)) = model.node(rule_id) else {
        panic!("expected rule");
    };
    assert_eq!(rule.sort_fields, vec![SortKey::descending("Genre")]);
    assert!(rule.has_custom_sort_fields);
}

#[test]
fn moved_heading_moves_back_on_undo() {
    let mut model = TreeModel::new();
    model.add_title(&[], 0, "First").expect("add heading");
    model.add_title(&[], 1, "Second").expect("add heading");
    model.move_title(&[], 0, 1).expect("move heading");

    let titles = |model: &TreeModel| -> Vec<String> {
        (0..2)
            .map(|i| match model.node(model.resolve_path(&[i]).expect("heading")) {
                Some(Node::Title(title)) => title.title.clone(),
                _ => panic!("expected heading"),
            })
            .collect()
    };
    assert_eq!(titles(&model), vec!["Second", "First"]);

    model.undo().expect("undo move");
    assert_eq!(titles(&model), vec!["First", "Second"]);
}

// ============================================================================
// Nested rules
// ============================================================================

#[test]
fn chained_rule_groups_within_groups() {
    let mut model = TreeModel::new();
    model
        .add_field(Field::new("Title", FieldType::Text))
        .expect("add Title");
    model
        .add_field(Field::new("Decade", FieldType::Text))
        .expect("add Decade");
    model
        .add_field(Field::new("Genre", FieldType::AutoChoice))
        .expect("add Genre");
    model.add_title(&[], 0, "Films").expect("add heading");
    model.set_rule(&[0], "{*Decade*}").expect("set rule");
    model.add_chained_rule(&[0, 0], "{*Genre*}").expect("chain rule");

    let mut add = |title: &str, decade: &str, genre: &str| {
        let mut data = LeafData::new();
        data.set_value("Title", title);
        data.set_value("Decade", decade);
        data.set_value("Genre", genre);
        model.add_leaf(data).expect("add leaf");
    };
    add("A", "1990s", "Comedy");
    add("B", "1990s", "Drama");
    add("C", "2000s", "Drama");

    open_films(&mut model);
    let decades = rule_groups(&model);
    assert_eq!(group_titles(&model, &decades), vec!["1990s", "2000s"]);

    // Nested groups appear once the parent group opens.
    model.set_open(decades[0], true);
    let Some(Node::Group(nineties)) = model.node(decades[0]) else {
        panic!("expected group");
    };
    assert_eq!(
        group_titles(&model, &nineties.child_groups),
        vec!["Comedy", "Drama"]
    );
}

#[test]
fn rule_with_two_multi_value_fields_is_rejected() {
    let mut model = TreeModel::new();
    model
        .add_field(Field::new("Cast", FieldType::Text).with_multiples())
        .expect("add Cast");
    model
        .add_field(Field::new("Genre", FieldType::AutoChoice).with_multiples())
        .expect("add Genre");
    model.add_title(&[], 0, "Films").expect("add heading");
    assert!(model.set_rule(&[0], "{*Cast*} / {*Genre*}").is_err());
}

#[test]
fn heading_with_rule_rejects_sub_headings() {
    let mut model = film_model();
    assert!(model.add_title(&[0], 0, "Sub").is_err());
    assert!(model.set_rule(&[], "{*Genre*}").is_err());
}

// ============================================================================
// Persistence round trip through parts
// ============================================================================

#[test]
fn model_rebuilds_from_its_parts() {
    let mut model = film_model();
    model.set_title_line("{*Title*}");
    open_films(&mut model);

    let rebuilt = TreeModel::from_parts(
        model.fields().clone(),
        &model.stored_template(),
        &model.title_line_text(),
        &model.output_line_texts(),
        (0..model.leaf_count())
            .map(|i| model.leaf_data(i).expect("leaf").clone())
            .collect(),
        model.undo_log().entries().to_vec(),
    )
    .expect("rebuild");

    assert_eq!(rebuilt.leaf_count(), 2);
    assert_eq!(rebuilt.title_line_text(), "{*Title*}");
    assert_eq!(rebuilt.stored_template(), model.stored_template());
    assert_eq!(rebuilt.undo_log().len(), model.undo_log().len());
}
