//! Field reflection: schemas describing payload blocks, and the engine that reads and
//! writes fields by name.

mod access;
mod schema;
mod text;
mod value;

pub use access::{FieldBlock, MAX_VARARGS_BYTES};
pub use schema::{
    FieldDescriptor, FieldFlags, FieldSchema, FieldType, SchemaBuilder, StructKind,
    RECORD_NAME_LENGTH, VARARGS_DIMENSION,
};
pub use text::{parse_element, quote, tokenize, DescriptionParser};
pub use value::FieldValue;
