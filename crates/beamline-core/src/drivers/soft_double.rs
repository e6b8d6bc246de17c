use crate::driver::{Driver, RecordClass};
use crate::error::CoreResult;
use crate::field::{FieldFlags, FieldType, SchemaBuilder, StructKind};

/// Variable holding up to `num_elements` doubles.
///
/// Storage for `value` is reserved while the description is parsed, so later writes may
/// shrink the array but not grow it past the configured element count.
pub(super) fn driver() -> CoreResult<Driver> {
    let schema = SchemaBuilder::new(StructKind::Type)
        .scalar("num_elements", FieldType::UInt32, FieldFlags::IN_DESCRIPTION)
        .varargs(
            "value",
            FieldType::Double,
            "num_elements",
            FieldFlags::IN_DESCRIPTION | FieldFlags::IN_SUMMARY,
        )
        .build()?;
    Driver::builder("soft_double", RecordClass::Variable)
        .type_schema(schema)
        .build()
}
