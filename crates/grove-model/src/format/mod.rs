//! Format mini-languages owned by the field types.

pub mod choice;
pub mod datetime;
pub mod number;
