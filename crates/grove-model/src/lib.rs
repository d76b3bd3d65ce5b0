//! Field and type model for the Grove tree-view engine.
//!
//! This crate defines the typed field model: field kinds with their
//! formatting, validation, and ordering semantics; the format
//! mini-languages (digit patterns for numbers, token tables for dates and
//! times, option lists for choices); the leaf data map; and sort keys.
//!
//! It knows nothing about trees, templates, or persistence; those live in
//! `grove-core` and `grove-persistence`.

pub mod error;
pub mod field;
pub mod fieldset;
pub mod format;
pub mod leaf;
pub mod sortkey;

pub use error::{GroveError, Result};
pub use field::{FULL_LINE_SEPARATOR, Field, FieldType};
pub use fieldset::FieldSet;
pub use leaf::LeafData;
pub use sortkey::SortKey;
