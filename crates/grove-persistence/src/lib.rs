//! Persistent storage for Grove documents.
//!
//! This crate saves and loads `.grove` document files: field definitions,
//! the stored scaffold, the leaf pool, rendering templates, and the
//! retained portion of the undo log, all as one JSON object.
//!
//! # Example
//!
//! ```ignore
//! use grove_persistence::{load_document, save_document};
//!
//! let model = load_document(Path::new("films.grove"))?;
//! // ... edit ...
//! save_document(&model, Path::new("films.grove"))?;
//! ```

mod convert;
mod error;
mod io;
mod types;

pub use convert::UNDO_RETENTION_DAYS;
pub use error::{PersistenceError, Result};
pub use io::{load_document, save_document};
pub use types::{Document, FieldDescriptor};
