//! Core type definitions shared by the record store and the hash index.

pub mod locator;
pub mod schema;
pub mod value;

pub use locator::RowLocator;
pub use schema::{FieldType, Schema, TableInfo};
pub use value::Constant;
