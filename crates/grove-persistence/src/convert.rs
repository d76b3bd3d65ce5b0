//! Conversions between the live model and the persisted document.

use chrono::{TimeDelta, Utc};

use grove_core::TreeModel;
use grove_model::FieldSet;

use crate::types::{Document, FieldDescriptor};

/// Undo entries older than this are dropped when a document is written
/// out. The in-session log is never pruned.
pub const UNDO_RETENTION_DAYS: i64 = 90;

impl Document {
    /// Snapshot a model into its persisted shape.
    pub fn from_model(model: &TreeModel) -> Self {
        let cutoff = Utc::now() - TimeDelta::days(UNDO_RETENTION_DAYS);
        Document {
            fields: model
                .fields()
                .iter()
                .cloned()
                .map(FieldDescriptor)
                .collect(),
            template: model.stored_template(),
            titleline: model.title_line_text(),
            outputlines: model.output_line_texts(),
            leaves: (0..model.leaf_count())
                .filter_map(|index| model.leaf_data(index).cloned())
                .collect(),
            undos: model.undo_log().entries_since(cutoff),
        }
    }

    /// Rebuild the live model. Malformed content (bad field formats,
    /// duplicate names) aborts rather than loading a partial document.
    pub fn into_model(self) -> grove_model::Result<TreeModel> {
        let mut fields = FieldSet::new();
        for FieldDescriptor(field) in self.fields {
            fields.add(field)?;
        }
        TreeModel::from_parts(
            fields,
            &self.template,
            &self.titleline,
            &self.outputlines,
            self.leaves,
            self.undos,
        )
    }
}
