//! Document file I/O.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use grove_core::TreeModel;

use crate::error::{PersistenceError, Result};
use crate::types::Document;

/// Save a model to a .grove file.
///
/// Uses atomic write (temp file + rename) to prevent data corruption on
/// crash or power loss. Undo entries past the retention horizon are
/// dropped from the written file.
pub fn save_document(model: &TreeModel, path: &Path) -> Result<()> {
    let document = Document::from_model(model);
    let bytes =
        serde_json::to_vec_pretty(&document).map_err(|e| PersistenceError::Serialization {
            source: Box::new(e),
        })?;

    let temp_path = path.with_extension("grove.tmp");
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| PersistenceError::Io {
            operation: "create directory",
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut file = File::create(&temp_path).map_err(|e| PersistenceError::Io {
        operation: "create",
        path: temp_path.clone(),
        source: e,
    })?;
    file.write_all(&bytes).map_err(|e| PersistenceError::Io {
        operation: "write",
        path: temp_path.clone(),
        source: e,
    })?;
    file.sync_all().map_err(|e| PersistenceError::Io {
        operation: "sync",
        path: temp_path.clone(),
        source: e,
    })?;

    fs::rename(&temp_path, path).map_err(|e| PersistenceError::AtomicWriteFailed {
        temp_path: temp_path.clone(),
        target_path: path.to_path_buf(),
        source: e,
    })?;

    tracing::info!("Saved document to {}", path.display());
    Ok(())
}

/// Load a model from a .grove file.
pub fn load_document(path: &Path) -> Result<TreeModel> {
    let bytes = fs::read(path).map_err(|e| PersistenceError::Io {
        operation: "read",
        path: path.to_path_buf(),
        source: e,
    })?;
    let document: Document =
        serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Deserialization {
            source: Box::new(e),
        })?;
    let model = document
        .into_model()
        .map_err(|e| PersistenceError::InvalidFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    tracing::info!("Loaded document from {}", path.display());
    Ok(model)
}
